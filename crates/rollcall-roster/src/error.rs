use rollcall_core::{InvalidIdentity, MatchError, ProviderError};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("embedding provider failed: {0}")]
    ProviderFailure(#[from] ProviderError),
    #[error("storage failure at {}: {source}", path.display())]
    StorageFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RosterError {
    pub(crate) fn storage(path: &Path, source: std::io::Error) -> Self {
        RosterError::StorageFailure { path: path.to_path_buf(), source }
    }

    /// Expected outcomes (bad input, no face) as opposed to system faults.
    pub fn is_expected(&self) -> bool {
        matches!(self, RosterError::InvalidInput(_) | RosterError::NoFaceDetected)
    }
}

impl From<InvalidIdentity> for RosterError {
    fn from(err: InvalidIdentity) -> Self {
        RosterError::InvalidInput(err.to_string())
    }
}

impl From<MatchError> for RosterError {
    fn from(err: MatchError) -> Self {
        RosterError::InvalidInput(err.to_string())
    }
}
