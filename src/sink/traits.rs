//! Sink trait and error types
//!
//! A sink is the durable destination of artifacts and of the delivery
//! history.

use crate::delivery::Artifact;
use crate::history::HistoryIndex;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{operation} request failed: {source}")]
    Http {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} returned HTTP {status}: {body}")]
    Api {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Destination of artifacts and of the history
///
/// Implementations must be safe to share between concurrently running item
/// tasks.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &str;

    /// Verifies the backend is reachable before a run starts
    async fn check(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Stores one artifact at its destination path
    ///
    /// The working file at `artifact.path` is left in place; the caller
    /// removes it.
    async fn upload(&self, artifact: &Artifact) -> StorageResult<()>;

    /// Reads the persisted history; a missing history is an empty one
    async fn load_history(&self) -> StorageResult<HistoryIndex>;

    /// Replaces the persisted history
    async fn persist_history(&self, history: &HistoryIndex) -> StorageResult<()>;
}

pub(crate) fn decode_history(text: &str) -> StorageResult<HistoryIndex> {
    HistoryIndex::from_yaml(text).map_err(|e| StorageError::Serialization(e.to_string()))
}

pub(crate) fn encode_history(history: &HistoryIndex) -> StorageResult<String> {
    history
        .to_yaml()
        .map_err(|e| StorageError::Serialization(e.to_string()))
}
