//! Orchestrator-local error type: folds the lower crates' typed errors
//! into one enum so session methods have a single `Result` to return.

use wenshape_protocol::error::{AgentError, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error("no active session")]
    NoActiveSession,
    #[error("a session is already running for this process")]
    SessionAlreadyRunning,
}
