//! Application error types

use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The credential lacks the capability the call needs.
    #[error("Permission error ({account}): {message}")]
    PermissionScope { account: String, message: String },

    /// Network failure, timeout, rate limit or 5xx.
    #[error("Transient error: {message}")]
    Transient {
        message: String,
        retry_after_ms: Option<u64>,
    },

    /// Provider returned a payload we cannot parse.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Implausible numbers in otherwise usable data.
    #[error("Data anomaly: {0}")]
    DataAnomaly(String),

    /// Missing credential, key or rule for an account.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Marketplace error: {0}")]
    Marketplace(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn transient(message: impl Into<String>) -> Self {
        AppError::Transient {
            message: message.into(),
            retry_after_ms: None,
        }
    }

    /// Whether the retry policy may attempt the call again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transient { .. })
    }

    /// Errors that end the remaining steps of an account run.
    pub fn is_account_fatal(&self) -> bool {
        matches!(
            self,
            AppError::PermissionScope { .. } | AppError::NotConfigured(_)
        )
    }

    /// Delay requested by the provider (Retry-After), if any.
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            AppError::Transient { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::ConfigFile(_) => "CONFIG_FILE_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::PermissionScope { .. } => "PERMISSION_SCOPE",
            AppError::Transient { .. } => "TRANSIENT",
            AppError::MalformedResponse(_) => "MALFORMED_RESPONSE",
            AppError::DataAnomaly(_) => "DATA_ANOMALY",
            AppError::NotConfigured(_) => "NOT_CONFIGURED",
            AppError::Marketplace(_) => "MARKETPLACE_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Transport failures are retried; anything reqwest could not decode is not.
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AppError::MalformedResponse(err.to_string())
        } else {
            AppError::transient(err.to_string())
        }
    }
}

/// Serializable error response for report consumers
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        ErrorResponse {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        ErrorResponse::from(self).serialize(serializer)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
