use super::types::RestackError;

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub retryable: bool,
}

impl RestackError {
    /// Classify this error to determine its type and whether it can be retried.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            // Retryable errors
            RestackError::Network(_) => ErrorClassification {
                error_type: "NetworkError",
                retryable: true,
            },
            RestackError::Timeout(_) => ErrorClassification {
                error_type: "TimeoutError",
                retryable: true,
            },
            RestackError::Container(_) => ErrorClassification {
                error_type: "ContainerError",
                retryable: true,
            },
            RestackError::Docker(_) => ErrorClassification {
                error_type: "DockerError",
                retryable: true,
            },
            RestackError::Io(_) => ErrorClassification {
                error_type: "IoError",
                retryable: true,
            },

            // Non-retryable errors
            RestackError::Config(_) => ErrorClassification {
                error_type: "ConfigurationError",
                retryable: false,
            },
            RestackError::InvalidTarget(_) => ErrorClassification {
                error_type: "ConfigurationError",
                retryable: false,
            },
            RestackError::ToolUnavailable(_) => ErrorClassification {
                error_type: "ToolUnavailableError",
                retryable: false,
            },
            RestackError::ToolExecution(_) => ErrorClassification {
                error_type: "ToolExecutionError",
                retryable: false,
            },
            RestackError::Normalization(_) => ErrorClassification {
                error_type: "NormalizationError",
                retryable: false,
            },
            RestackError::Persistence(_) => ErrorClassification {
                error_type: "PersistenceError",
                retryable: false,
            },
            RestackError::Cancelled(_) => ErrorClassification {
                error_type: "CancelledError",
                retryable: false,
            },
            RestackError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                retryable: false,
            },
            RestackError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                retryable: false,
            },
            RestackError::Internal(_) => ErrorClassification {
                error_type: "InternalError",
                retryable: false,
            },
        }
    }

    /// Error type recorded in a per-tool marker when an adapter's contribution
    /// is downgraded instead of failing the whole scan.
    pub fn marker_type(&self) -> &'static str {
        match self {
            RestackError::ToolUnavailable(_) => "ToolUnavailableError",
            RestackError::Normalization(_) | RestackError::Json(_) => "NormalizationError",
            _ => "ToolExecutionError",
        }
    }

    /// Errors that abort a scan request before any tool runs.
    pub fn is_request_fatal(&self) -> bool {
        matches!(self, RestackError::Config(_) | RestackError::InvalidTarget(_) | RestackError::Persistence(_))
    }
}
