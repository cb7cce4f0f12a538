use std::path::PathBuf;

use thiserror::Error;

use crate::provider::ApiError;

/// The interactive hand-off failed. Always fatal for the run.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Provider refused to issue a temporary token: {0}")]
    TemporaryTokenRejected(#[source] ApiError),

    #[error("Verification code was rejected: {0}")]
    VerifierRejected(#[source] ApiError),

    #[error("Newly issued credential failed validation: {0}")]
    ValidationFailed(#[source] ApiError),

    #[error("No verification code received: {0}")]
    NoVerifier(String),

    #[error("Could not persist the new credential: {0}")]
    Persist(#[source] CredentialError),
}

/// Credential file problems.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Credential file {} is not a valid credential: {source}", path.display())]
    CorruptStore {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Could not serialize credential for {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on credential file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
