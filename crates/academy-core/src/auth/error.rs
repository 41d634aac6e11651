use thiserror::Error;

use crate::api::ApiError;

/// Input rejected before any external call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Please enter a valid email address")]
    InvalidEmail,

    #[error("Password must be at least {min} characters")]
    SecretTooShort { min: usize },

    #[error("Password must include uppercase, lowercase, and numbers")]
    WeakSecret,

    #[error("Passwords do not match")]
    ConfirmationMismatch,
}

/// Failure of a session operation.
///
/// The session store absorbs every kind: the session always lands in
/// a terminal status and the caller gets this value back as the failure
/// signal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Authentication rejected: {0}")]
    Rejected(String),

    #[error("Identity service unreachable: {0}")]
    Transport(String),

    /// Local fault inside the identity backend
    #[error("Identity backend failure: {0}")]
    Internal(String),
}

impl AuthError {
    /// Message suitable for a login or registration form
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Validation(e) => e.to_string(),
            AuthError::Rejected(_) => "Invalid email or password".to_string(),
            AuthError::Transport(_) => {
                "Unable to reach the server. Please try again later.".to_string()
            }
            AuthError::Internal(_) => "Something went wrong on this device. Please try again.".to_string(),
        }
    }

    /// Only transport failures are worth re-submitting unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Transport(_))
    }
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        if err.is_transport() {
            AuthError::Transport(err.to_string())
        } else {
            AuthError::Rejected(err.to_string())
        }
    }
}
