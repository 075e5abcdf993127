pub mod types;
pub mod classification;
pub mod retry;

pub use types::RestackError;
pub use classification::ErrorClassification;
pub use retry::{poll_until, with_retry, PollPolicy, RetryConfig};
