use std::io;

/// Custom error type for git_eventc operations
#[derive(Debug, thiserror::Error)]
pub enum EventcError {
    #[error("git command failed: {command}\n{stderr}")]
    GitCommandFailed { command: String, stderr: String },

    #[error("git object not found: {0}")]
    ObjectNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Payload field '{field}' is {problem}")]
    PayloadField { field: String, problem: &'static str },

    #[error("Webhook validation failed: {0}")]
    WebhookValidationFailed(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Notification transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl EventcError {
    pub fn missing_field(field: impl Into<String>) -> Self {
        EventcError::PayloadField {
            field: field.into(),
            problem: "missing",
        }
    }

    pub fn wrong_type(field: impl Into<String>) -> Self {
        EventcError::PayloadField {
            field: field.into(),
            problem: "of the wrong type",
        }
    }
}

impl From<reqwest::Error> for EventcError {
    fn from(e: reqwest::Error) -> Self {
        EventcError::Http(e.to_string())
    }
}

/// Helper type for Results that use EventcError
pub type Result<T> = std::result::Result<T, EventcError>;
