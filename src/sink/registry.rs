//! Backend registry
//!
//! Sinks are selected from the configured [`StorageBackend`] once at startup.

use crate::config::{StorageBackend, StorageConfig};
use crate::sink::{DropboxSink, LocalSink, Sink};
use crate::ConfigError;
use reqwest::Client;
use std::sync::Arc;

/// Primary sink plus the optional local backup
#[derive(Clone)]
pub struct SinkSet {
    pub primary: Arc<dyn Sink>,
    pub backup: Option<Arc<dyn Sink>>,
}

impl SinkSet {
    pub fn new(primary: Arc<dyn Sink>) -> Self {
        Self {
            primary,
            backup: None,
        }
    }

    pub fn with_backup(mut self, backup: Arc<dyn Sink>) -> Self {
        self.backup = Some(backup);
        self
    }
}

/// Builds the sinks for `config`
///
/// The local backup is only attached when the primary backend is remote;
/// backing up a local primary to the local disk adds nothing.
///
/// # Returns
///
/// * `Ok(SinkSet)` - Sinks ready for use
/// * `Err(ConfigError::NoStorageBackend)` - No backend selected, or the
///   remote backend has no token
pub fn resolve_sinks(config: &StorageConfig, client: Client) -> Result<SinkSet, ConfigError> {
    let backend = config
        .backend
        .ok_or_else(|| ConfigError::NoStorageBackend("no storage backend selected".to_string()))?;

    let set = match backend {
        StorageBackend::Local => {
            if config.allow_local_backup {
                tracing::info!("Local backup ignored: primary storage is already local");
            }
            SinkSet::new(Arc::new(LocalSink::new(&config.local_root)))
        }
        StorageBackend::Dropbox => {
            let token = config
                .token
                .as_deref()
                .filter(|token| !token.trim().is_empty())
                .ok_or_else(|| {
                    ConfigError::NoStorageBackend(
                        "dropbox backend requires an access token".to_string(),
                    )
                })?;
            let primary = DropboxSink::new(client, token, &config.remote_root)
                .with_endpoints(&config.api_base, &config.content_base);
            let set = SinkSet::new(Arc::new(primary));
            if config.allow_local_backup {
                set.with_backup(Arc::new(LocalSink::backup(&config.backup_root)))
            } else {
                set
            }
        }
    };

    tracing::info!(
        "Storage: {} (backup: {})",
        backend.as_str(),
        set.backup.as_ref().map(|b| b.name()).unwrap_or("none")
    );
    Ok(set)
}
