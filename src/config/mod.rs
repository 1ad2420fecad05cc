//! Configuration module for PDF Concierge
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and layering `PDFC_*` environment variables on top.
//!
//! # Example
//!
//! ```no_run
//! use pdf_concierge::config::load_effective_config;
//! use std::path::Path;
//!
//! let (config, _hash) = load_effective_config(Some(Path::new("concierge.toml"))).unwrap();
//! println!("Items in flight per source: {}", config.run.concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, DigestSourceConfig, EditorialSourceConfig, NotifyConfig, RenderCommand, RenderConfig,
    RunConfig, SourcesConfig, StorageBackend, StorageConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{apply_env_overrides, compute_config_hash, load_effective_config};
pub use validation::{validate, validate_render_coverage};
