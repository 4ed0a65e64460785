use thiserror::Error;

/// Failures raised while signing requests or acquiring credentials.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The secret (or another credential field) cannot be used as given.
    /// Never retried.
    #[error("Invalid credential input: {0}")]
    InvalidCredentialInput(String),

    /// The vendor rejected the credentials or the signature, or answered
    /// with something that is not a usable credential.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The token cache could not be read or written. Logged by the
    /// session manager, never returned from `get_credential`.
    #[error("Token cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
