//! Error taxonomy for engine operations.
//!
//! Expected outcomes (already claimed, not eligible, not generated yet) are
//! ordinary variants: the caller turns them into a user-facing message and no
//! state has changed. `Storage` is the only variant that signals a real fault.

use serde::{Deserialize, Serialize};

/// Errors returned by engine operations
#[derive(Debug, thiserror::Error)]
pub enum QuestError {
    /// Input rejected before any mutation
    #[error("{0}")]
    Validation(String),

    #[error("quest '{quest_key}' was already claimed for {period_key}")]
    AlreadyClaimed {
        quest_key: String,
        period_key: String,
    },

    #[error("quest '{quest_key}' is not available at rank {rank}")]
    NotEligible { rank: u8, quest_key: String },

    #[error("quest '{quest_key}' has not been posted for {period_key} yet")]
    NotYetGenerated {
        quest_key: String,
        period_key: String,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl QuestError {
    pub fn validation(msg: impl Into<String>) -> Self {
        QuestError::Validation(msg.into())
    }

    /// Stable machine-readable kind, used on the wire
    pub fn kind(&self) -> ErrorKind {
        match self {
            QuestError::Validation(_) => ErrorKind::Validation,
            QuestError::AlreadyClaimed { .. } => ErrorKind::AlreadyClaimed,
            QuestError::NotEligible { .. } => ErrorKind::NotEligible,
            QuestError::NotYetGenerated { .. } => ErrorKind::NotYetGenerated,
            QuestError::NotFound(_) => ErrorKind::NotFound,
            QuestError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<rusqlite::Error> for QuestError {
    fn from(e: rusqlite::Error) -> Self {
        QuestError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for QuestError {
    fn from(e: serde_json::Error) -> Self {
        QuestError::Storage(format!("encoding: {}", e))
    }
}

impl From<tokio::task::JoinError> for QuestError {
    fn from(e: tokio::task::JoinError) -> Self {
        QuestError::Storage(format!("storage task failed: {}", e))
    }
}

pub type QuestResult<T> = std::result::Result<T, QuestError>;

/// Error kind as exchanged between daemon and clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    AlreadyClaimed,
    NotEligible,
    NotYetGenerated,
    NotFound,
    Storage,
}
