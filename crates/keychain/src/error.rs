//! Error types for credential rotation and validation

/// Errors from secure-store access and credential rotation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("credential read failed: {0}")]
    CredentialRead(String),

    #[error("credential write failed: {0}")]
    CredentialWrite(String),

    #[error("secure credential store unsupported: {0}")]
    Unsupported(String),

    #[error("identity metadata parse error: {0}")]
    IdentityParse(String),

    #[error("identity metadata missing field: {0}")]
    IdentityMissingField(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for rotation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Confident verdicts that a token is unusable.
///
/// Anything inconclusive is reported as valid instead; see `Validity`.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("token expired at {0}")]
    Expired(String),

    #[error("token rejected: {0}")]
    Rejected(String),
}
