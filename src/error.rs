//! Error types for the alert relay
//!
//! Nothing here ever reaches the HTTP client of the wrapped service. The
//! middleware logs these errors and keeps serving; only `try_notify` and
//! `deliver` hand them back to the caller.

use std::time::Duration;

use thiserror::Error;

use crate::alert::Severity;

/// Errors raised while building or delivering an alert
#[derive(Error, Debug)]
pub enum NotifyError {
    /// No channel (or an empty channel id) for this severity
    #[error("{0} channel not found or not properly configured")]
    NotConfigured(Severity),

    /// Detail fields must come in title/value pairs
    #[error("Invalid number of fields passed ({0}), only an even number of fields is allowed")]
    OddFieldCount(usize),

    /// The root message could not be posted, so the alert was abandoned
    #[error("Failed to send message: {0}")]
    SendFailed(#[source] Box<NotifyError>),

    /// The oversized primary text could not be uploaded as a file
    #[error("Failed to upload file: {0}")]
    UploadFailed(#[source] Box<NotifyError>),

    /// Network-related errors (connection, DNS, TLS, etc.)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Provider answered with a non-success status code
    #[error("Chat provider rejected request: HTTP {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },

    /// Provider answered 200 but reported a failure in its payload
    #[error("Chat provider returned an error: {0}")]
    Provider(String),

    #[error("Timed out after {0:?} waiting for the chat provider")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Request payload stream failed before the inner handler ran
    #[error("Failed to read request body: {0}")]
    BodyRead(String),
}

impl NotifyError {
    pub(crate) fn send_failed(cause: NotifyError) -> Self {
        NotifyError::SendFailed(Box::new(cause))
    }

    pub(crate) fn upload_failed(cause: NotifyError) -> Self {
        NotifyError::UploadFailed(Box::new(cause))
    }
}

/// Errors raised while loading configuration or building a notifier from it
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing configuration: chat provider token not provided")]
    MissingToken,

    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration value: {0}")]
    Invalid(String),

    /// The HTTP client for the provider could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
