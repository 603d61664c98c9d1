// Error types for guard resolution and the token codec

use thiserror::Error;

/// Result type alias for authentication operations
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Errors raised by the authentication core
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or invalid guard, driver or provider configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Token structure is malformed or its signature does not match
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Token signature is valid but the token is past its expiry
    #[error("Token expired")]
    TokenExpired,

    /// No principal could be resolved for the guard
    #[error("Unauthenticated ({guard})")]
    Unauthenticated { guard: String },

    /// Claim serialization failed while issuing a token
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The user provider signalled a hard failure
    #[error("User provider error: {0}")]
    Provider(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        AuthError::Configuration(msg.into())
    }

    /// Create an invalid token error
    pub fn invalid_token(msg: impl Into<String>) -> Self {
        AuthError::InvalidToken(msg.into())
    }

    /// Create an unauthenticated error for a guard
    pub fn unauthenticated(guard: impl Into<String>) -> Self {
        AuthError::Unauthenticated {
            guard: guard.into(),
        }
    }

    /// Create an encoding error
    pub fn encoding(msg: impl Into<String>) -> Self {
        AuthError::Encoding(msg.into())
    }

    /// Create a provider error
    pub fn provider(msg: impl Into<String>) -> Self {
        AuthError::Provider(msg.into())
    }

    /// Whether the error came from token verification (malformed, forged or expired)
    pub fn is_token_error(&self) -> bool {
        matches!(self, AuthError::InvalidToken(_) | AuthError::TokenExpired)
    }
}
