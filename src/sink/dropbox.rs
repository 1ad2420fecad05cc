//! Dropbox sink
//!
//! Small files go through a single `files/upload` call. Files above the
//! chunk threshold use an upload session: `start` with the first chunk,
//! `append_v2` for the middle chunks and `finish` with the last one, which
//! also commits the file.

use crate::delivery::Artifact;
use crate::history::HistoryIndex;
use crate::sink::traits::{decode_history, encode_history};
use crate::sink::{Sink, StorageError, StorageResult};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

/// Payloads above this size are uploaded in chunks
pub const CHUNK_THRESHOLD: usize = 4 * 1024 * 1024;

pub const DROPBOX_API_BASE: &str = "https://api.dropboxapi.com";
pub const DROPBOX_CONTENT_BASE: &str = "https://content.dropboxapi.com";

const HISTORY_FILE: &str = "history.yml";

#[derive(Debug, Deserialize)]
struct SessionStart {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct CheckUser {
    result: String,
}

pub struct DropboxSink {
    client: Client,
    token: String,
    remote_root: String,
    api_base: String,
    content_base: String,
    chunk_size: usize,
}

impl DropboxSink {
    pub fn new(client: Client, token: impl Into<String>, remote_root: &str) -> Self {
        let trimmed = remote_root.trim_matches('/');
        let remote_root = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        };
        Self {
            client,
            token: token.into(),
            remote_root,
            api_base: DROPBOX_API_BASE.to_string(),
            content_base: DROPBOX_CONTENT_BASE.to_string(),
            chunk_size: CHUNK_THRESHOLD,
        }
    }

    pub fn with_endpoints(mut self, api_base: &str, content_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.content_base = content_base.trim_end_matches('/').to_string();
        self
    }

    /// Overrides the chunk threshold and chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Absolute remote path of a path relative to the remote root
    pub fn remote_path(&self, relative: &str) -> String {
        format!("{}/{}", self.remote_root, relative.trim_start_matches('/'))
    }

    fn history_path(&self) -> String {
        self.remote_path(HISTORY_FILE)
    }

    /// Calls a content endpoint: arguments in the `Dropbox-API-Arg` header,
    /// payload in the body
    async fn content_call(
        &self,
        operation: &'static str,
        arg: &Value,
        body: Vec<u8>,
    ) -> StorageResult<reqwest::Response> {
        let url = format!("{}/2/{}", self.content_base, operation);
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(CONTENT_TYPE, "application/octet-stream")
            .header("Dropbox-API-Arg", header_safe_json(arg))
            .body(body)
            .send()
            .await
            .map_err(|source| StorageError::Http { operation, source })?;
        Ok(response)
    }

    async fn expect_success(
        operation: &'static str,
        response: reqwest::Response,
    ) -> StorageResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StorageError::Api {
            operation,
            status: status.as_u16(),
            body,
        })
    }

    async fn upload_single(&self, path: &str, bytes: Vec<u8>) -> StorageResult<()> {
        let arg = json!({ "path": path, "mode": "overwrite", "autorename": false, "mute": true });
        let response = self.content_call("files/upload", &arg, bytes).await?;
        Self::expect_success("files/upload", response).await?;
        Ok(())
    }

    async fn upload_chunked(&self, path: &str, bytes: &[u8]) -> StorageResult<()> {
        let chunk = self.chunk_size;
        let total = bytes.len();

        let response = self
            .content_call(
                "files/upload_session/start",
                &json!({ "close": false }),
                bytes[..chunk].to_vec(),
            )
            .await?;
        let response = Self::expect_success("files/upload_session/start", response).await?;
        let start: SessionStart = response
            .json()
            .await
            .map_err(|e| StorageError::UnexpectedResponse(e.to_string()))?;

        let mut offset = chunk;
        while total - offset > chunk {
            let arg = json!({
                "cursor": { "session_id": start.session_id, "offset": offset },
                "close": false,
            });
            let response = self
                .content_call(
                    "files/upload_session/append_v2",
                    &arg,
                    bytes[offset..offset + chunk].to_vec(),
                )
                .await?;
            Self::expect_success("files/upload_session/append_v2", response).await?;
            offset += chunk;
            tracing::debug!("Uploaded {}/{} bytes of {}", offset, total, path);
        }

        let arg = json!({
            "cursor": { "session_id": start.session_id, "offset": offset },
            "commit": { "path": path, "mode": "overwrite", "autorename": false, "mute": true },
        });
        let response = self
            .content_call("files/upload_session/finish", &arg, bytes[offset..].to_vec())
            .await?;
        Self::expect_success("files/upload_session/finish", response).await?;
        Ok(())
    }
}

#[async_trait]
impl Sink for DropboxSink {
    fn name(&self) -> &str {
        "dropbox"
    }

    async fn check(&self) -> StorageResult<()> {
        let operation = "check/user";
        let url = format!("{}/2/{}", self.api_base, operation);
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .json(&json!({ "query": "ping" }))
            .send()
            .await
            .map_err(|source| StorageError::Http { operation, source })?;
        let response = Self::expect_success(operation, response).await?;
        let echo: CheckUser = response
            .json()
            .await
            .map_err(|e| StorageError::UnexpectedResponse(e.to_string()))?;
        if echo.result != "ping" {
            return Err(StorageError::UnexpectedResponse(format!(
                "check/user echoed '{}'",
                echo.result
            )));
        }
        Ok(())
    }

    async fn upload(&self, artifact: &Artifact) -> StorageResult<()> {
        let path = self.remote_path(&artifact.destination());
        let bytes = tokio::fs::read(&artifact.path).await?;

        if bytes.len() <= self.chunk_size {
            self.upload_single(&path, bytes).await?;
        } else {
            self.upload_chunked(&path, &bytes).await?;
        }
        tracing::debug!("Uploaded {}", path);
        Ok(())
    }

    async fn load_history(&self) -> StorageResult<HistoryIndex> {
        let operation = "files/download";
        let path = self.history_path();
        let response = self
            .content_call(operation, &json!({ "path": path }), Vec::new())
            .await?;

        if response.status() == StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            if body.contains("not_found") {
                tracing::info!("No history at {}, starting empty", path);
                return Ok(HistoryIndex::new());
            }
            return Err(StorageError::Api {
                operation,
                status: StatusCode::CONFLICT.as_u16(),
                body,
            });
        }

        let response = Self::expect_success(operation, response).await?;
        let text = response
            .text()
            .await
            .map_err(|source| StorageError::Http { operation, source })?;
        decode_history(&text)
    }

    async fn persist_history(&self, history: &HistoryIndex) -> StorageResult<()> {
        let yaml = encode_history(history)?;
        self.upload_single(&self.history_path(), yaml.into_bytes())
            .await
    }
}

/// JSON for an HTTP header: every non-ASCII character is `\u`-escaped
fn header_safe_json(value: &Value) -> String {
    let text = value.to_string();
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii() {
            escaped.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                escaped.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    escaped
}
