use thiserror::Error;

use crate::LocalId;

/// Local-call failures reported synchronously to the UI layer. None of these
/// mutate the job they name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("job {0} is already processing")]
    AlreadyInProgress(LocalId),
    #[error("job {0} not found")]
    NotFound(LocalId),
    #[error("{file_name} rejected: {reason}")]
    FileRejected { file_name: String, reason: String },
    #[error("session is shut down")]
    SessionClosed,
}
