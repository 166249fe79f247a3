//! Errors returned by the Azure Resource Manager client.

use thiserror::Error;

/// ARM error codes that mean the resource does not exist.
const NOT_FOUND_CODES: [&str; 2] = ["NotFound", "ResourceNotFound"];

/// Errors from ARM API calls and long-running operation polling.
#[derive(Debug, Error)]
pub enum ArmError {
    /// HTTP transport failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an error status.
    #[error("ARM API error (status {status}{}): {message}", code_suffix(.code))]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Credentials were rejected (401/403).
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A long-running operation reached a failed terminal state.
    #[error("Operation {operation} finished as {status}: {message}")]
    OperationFailed {
        operation: String,
        status: String,
        code: Option<String>,
        message: String,
    },

    /// Response body could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Polling exceeded the configured timeout.
    #[error("Operation {operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// The caller cancelled the wait.
    #[error("Operation {0} was cancelled")]
    Cancelled(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl ArmError {
    /// Whether this error means the requested resource does not exist.
    ///
    /// Checks the HTTP status and ARM error code first. The message text is
    /// only consulted for API errors without a code. A transport failure
    /// without a status is never "not found".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Api {
                status,
                code,
                message,
            } => {
                *status == 404
                    || match code {
                        Some(code) => is_not_found_code(code),
                        None => mentions_not_found(message),
                    }
            }
            Self::OperationFailed { code, message, .. } => match code {
                Some(code) => is_not_found_code(code),
                None => mentions_not_found(message),
            },
            Self::Http(e) => e.status().is_some_and(|s| s.as_u16() == 404),
            Self::Other(message) => mentions_not_found(message),
            Self::Auth(_)
            | Self::Serialization(_)
            | Self::Timeout { .. }
            | Self::Cancelled(_) => false,
        }
    }

    /// Whether a poll that failed with this error may be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => matches!(status, 408 | 429 | 500..=599),
            _ => false,
        }
    }

    /// Whether the caller cancelled the operation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

#[allow(clippy::ref_option)]
fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(", code {c}"))
        .unwrap_or_default()
}

fn is_not_found_code(code: &str) -> bool {
    NOT_FOUND_CODES.iter().any(|c| c.eq_ignore_ascii_case(code))
}

fn mentions_not_found(message: &str) -> bool {
    message.to_lowercase().contains("not found")
}
