pub mod cve;
pub mod finding;
pub mod fingerprint;
pub mod report;
pub mod request;
pub mod rule;
pub mod schedule;
pub mod session;
pub mod tool;

pub use cve::*;
pub use finding::*;
pub use fingerprint::*;
pub use report::*;
pub use request::*;
pub use rule::*;
pub use schedule::*;
pub use session::*;
pub use tool::*;
