use thiserror::Error;

use crate::domain::FormId;

/// Failure reported by a form store collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("form {0} not found")]
    NotFound(FormId),
    #[error("conflicting write: {0}")]
    Conflict(String),
    #[error("store i/o failure: {0}")]
    Io(String),
}

impl StoreError {
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }
}
