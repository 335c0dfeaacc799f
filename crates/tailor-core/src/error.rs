use std::fmt;

use thiserror::Error;

/// Why an authentication attempt was refused, when the login page tells us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    /// The site rejected the email or password.
    BadCredentials(String),
    /// A verification / two-factor checkpoint was presented.
    Challenge,
    /// The account is restricted or locked.
    AccountLocked,
    /// Login did not complete and no specific reason was visible.
    Unknown(String),
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthFailure::BadCredentials(msg) => write!(f, "bad credentials: {msg}"),
            AuthFailure::Challenge => write!(f, "verification challenge required"),
            AuthFailure::AccountLocked => write!(f, "account locked or restricted"),
            AuthFailure::Unknown(msg) => write!(f, "{msg}"),
        }
    }
}

/// Application-wide error types for tailor.
#[derive(Error, Debug)]
pub enum AppError {
    /// The browser automation engine is unavailable or misconfigured.
    #[error("Driver error: {0}")]
    DriverError(String),

    /// Login was refused.
    #[error("Authentication failed: {0}")]
    AuthError(AuthFailure),

    /// A bounded wait expired (page element, navigation).
    #[error("Transient error: {0}")]
    TransientError(String),

    /// The site served a block or anti-automation challenge page.
    #[error("Blocked by target site: {0}")]
    BlockedError(String),

    /// A stage was handed nothing to work on.
    #[error("Empty input: {0}")]
    EmptyInputError(String),

    /// Text-generation backend call failed or returned nothing usable.
    #[error("Model error (HTTP {status_code}): {message}")]
    ModelError {
        message: String,
        status_code: u16,
        retryable: bool,
    },

    /// The model's answer could not be resolved to any known job.
    #[error("No valid selection: {0}")]
    NoValidSelectionError(String),

    /// Generated markup violates the document template.
    #[error("Template validation failed: {violation} (near: {excerpt})")]
    TemplateValidationError { violation: String, excerpt: String },

    /// The pipeline was asked to make a transition its state does not allow.
    #[error("Invalid pipeline transition: {0}")]
    InvalidTransition(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Reading or writing a persisted artifact failed.
    #[error("Storage error: {0}")]
    StorageError(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::TransientError(_) => true,
            AppError::ModelError { retryable, .. } => *retryable,
            _ => false,
        }
    }

    pub fn empty_model_response() -> Self {
        AppError::ModelError {
            message: "Empty response from model".into(),
            status_code: 200,
            retryable: true,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::StorageError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(AppError::TransientError("wait for nav".into()).is_retryable());
        assert!(
            AppError::ModelError {
                message: "server error".into(),
                status_code: 503,
                retryable: true,
            }
            .is_retryable()
        );
        assert!(AppError::empty_model_response().is_retryable());
        assert!(!AppError::DriverError("no chrome".into()).is_retryable());
        assert!(!AppError::AuthError(AuthFailure::Challenge).is_retryable());
        assert!(!AppError::BlockedError("captcha".into()).is_retryable());
        assert!(!AppError::NoValidSelectionError("?".into()).is_retryable());
    }

    #[test]
    fn test_auth_failure_message_keeps_reason() {
        let err = AppError::AuthError(AuthFailure::BadCredentials("Wrong password".into()));
        assert_eq!(
            err.to_string(),
            "Authentication failed: bad credentials: Wrong password"
        );
    }
}
