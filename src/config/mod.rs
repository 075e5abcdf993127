pub mod parser;
pub mod schema;
pub mod security;
pub mod types;

pub use parser::{load_or_default, parse_config, parse_config_str};
pub use types::*;
