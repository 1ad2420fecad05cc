//! PDF Concierge: an incremental document harvester
//!
//! This crate periodically lists documents (editorials, digest books) from a
//! fixed set of sources, skips everything already recorded in the delivery
//! history, converts the rest into the configured output formats and hands the
//! resulting artifacts to a storage sink. History is persisted at the end of
//! every run so the next run only picks up what is new.

pub mod config;
pub mod delivery;
pub mod engine;
pub mod history;
pub mod notify;
pub mod session;
pub mod sink;
pub mod source;

use thiserror::Error;

/// Main error type for PDF Concierge operations
#[derive(Debug, Error)]
pub enum ConciergeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] session::AuthError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] source::FetchError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] delivery::ConversionError),

    #[error("Storage error: {0}")]
    Storage(#[from] sink::StorageError),

    #[error("Invalid run transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: engine::RunPhase,
        to: engine::RunPhase,
    },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
///
/// Any of these aborts the process before network activity starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Source '{0}' is enabled but has no credentials")]
    MissingCredentials(String),

    #[error("No usable storage backend: {0}")]
    NoStorageBackend(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for PDF Concierge operations
pub type Result<T> = std::result::Result<T, ConciergeError>;

// Re-export commonly used types
pub use config::Config;
pub use delivery::{Artifact, DeliveryPipeline, FormatPolicy, OutputFormat};
pub use engine::{RunEngine, RunPhase, RunReport};
pub use history::{CandidateId, HistoryIndex, RunDigest};
pub use session::{Credentials, SessionContext, SessionManager};
pub use sink::{Sink, SinkSet};
pub use source::{Candidate, Document, FileKind, ListMode, SourceAdapter};
