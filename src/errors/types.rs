use thiserror::Error;

#[derive(Debug, Error)]
pub enum RestackError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Normalization error: {0}")]
    Normalization(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Container error: {0}")]
    Container(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for RestackError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RestackError::Timeout(e.to_string())
        } else {
            RestackError::Network(e.to_string())
        }
    }
}

impl From<rusqlite::Error> for RestackError {
    fn from(e: rusqlite::Error) -> Self {
        RestackError::Persistence(e.to_string())
    }
}
