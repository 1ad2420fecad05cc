use crate::delivery::Artifact;
use crate::history::HistoryIndex;
use crate::sink::traits::{decode_history, encode_history};
use crate::sink::{Sink, StorageResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const HISTORY_FILE: &str = "history.yml";
const DOWNLOADS_DIR: &str = "downloads";

/// Sink on the local file system
///
/// Layout under `root`:
/// - `downloads/{kind}/{category}/{name}{ext}` for artifacts
/// - `history.yml` for the history
pub struct LocalSink {
    name: String,
    root: PathBuf,
}

impl LocalSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            name: "local".to_string(),
            root: root.into(),
        }
    }

    /// Same layout under another name, used for the local backup
    pub fn backup(root: impl Into<PathBuf>) -> Self {
        Self {
            name: "local-backup".to_string(),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn history_path(&self) -> PathBuf {
        self.root.join(HISTORY_FILE)
    }

    pub fn artifact_path(&self, artifact: &Artifact) -> PathBuf {
        self.root.join(DOWNLOADS_DIR).join(artifact.destination())
    }
}

#[async_trait]
impl Sink for LocalSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> StorageResult<()> {
        tokio::fs::create_dir_all(self.root.join(DOWNLOADS_DIR)).await?;
        Ok(())
    }

    async fn upload(&self, artifact: &Artifact) -> StorageResult<()> {
        let target = self.artifact_path(artifact);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&artifact.path, &target).await?;
        tracing::debug!("Stored {}", target.display());
        Ok(())
    }

    async fn load_history(&self) -> StorageResult<HistoryIndex> {
        match tokio::fs::read_to_string(self.history_path()).await {
            Ok(text) => decode_history(&text),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!("No history at {}, starting empty", self.history_path().display());
                Ok(HistoryIndex::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn persist_history(&self, history: &HistoryIndex) -> StorageResult<()> {
        let yaml = encode_history(history)?;
        tokio::fs::create_dir_all(&self.root).await?;

        // Staged next to the target, then renamed over it.
        let staging = self.root.join(format!("{}.tmp", HISTORY_FILE));
        tokio::fs::write(&staging, yaml).await?;
        tokio::fs::rename(&staging, self.history_path()).await?;
        Ok(())
    }
}
