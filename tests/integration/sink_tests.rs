//! Integration tests for the storage sinks
//!
//! The Dropbox sink is exercised against a wiremock server; the local sink
//! against a temporary directory.

use pdf_concierge::history::CandidateId;
use pdf_concierge::sink::{DropboxSink, LocalSink, StorageError};
use pdf_concierge::{Artifact, FileKind, HistoryIndex, OutputFormat, Sink};
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{body_string, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn dropbox(server: &MockServer) -> DropboxSink {
    DropboxSink::new(reqwest::Client::new(), "tok", "/concierge")
        .with_endpoints(&server.uri(), &server.uri())
}

fn artifact(dir: &Path, payload: &[u8]) -> Artifact {
    let path = dir.join("payload.pdf");
    std::fs::write(&path, payload).unwrap();
    Artifact {
        path,
        kind: FileKind::Editorial,
        category: "asahi".to_string(),
        display_name: "2024-03-10_Budget".to_string(),
        extension: ".pdf".to_string(),
        format: OutputFormat::Original,
    }
}

#[tokio::test]
async fn test_dropbox_small_file_single_upload() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/2/files/upload"))
        .and(header("authorization", "Bearer tok"))
        .and(body_string("%PDF"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    dropbox(&server)
        .upload(&artifact(dir.path(), b"%PDF"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_dropbox_large_file_uses_upload_session() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/2/files/upload_session/start"))
        .and(body_string("0123"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"session_id": "sess-1"}"#))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/2/files/upload_session/append_v2"))
        .and(body_string("4567"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/2/files/upload_session/finish"))
        .and(body_string("89"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/2/files/upload"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    dropbox(&server)
        .with_chunk_size(4)
        .upload(&artifact(dir.path(), b"0123456789"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_dropbox_upload_rejection_is_reported() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/2/files/upload"))
        .respond_with(ResponseTemplate::new(507).set_body_string("insufficient_space"))
        .mount(&server)
        .await;

    let result = dropbox(&server).upload(&artifact(dir.path(), b"%PDF")).await;
    assert!(matches!(
        result,
        Err(StorageError::Api { status: 507, ref body, .. }) if body == "insufficient_space"
    ));
}

#[tokio::test]
async fn test_dropbox_missing_history_is_empty() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/2/files/download"))
        .respond_with(ResponseTemplate::new(409).set_body_string(
            r#"{"error_summary": "path/not_found/..", "error": {".tag": "path"}}"#,
        ))
        .mount(&server)
        .await;

    let history = dropbox(&server).load_history().await.unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_dropbox_history_conflict_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/2/files/download"))
        .respond_with(ResponseTemplate::new(409).set_body_string("restricted_content"))
        .mount(&server)
        .await;

    let result = dropbox(&server).load_history().await;
    assert!(matches!(result, Err(StorageError::Api { status: 409, .. })));
}

#[tokio::test]
async fn test_dropbox_loads_and_persists_history() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/2/files/download"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("asahi:\n  editorial:\n  - ASS10\n"),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/2/files/upload"))
        .and(body_string_contains("ASS11"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let sink = dropbox(&server);
    let mut history = sink.load_history().await.unwrap();
    assert!(history.contains("asahi", "editorial", &CandidateId::from("ASS10")));

    history.insert("asahi", "editorial", CandidateId::from("ASS11"));
    sink.persist_history(&history).await.unwrap();
}

#[tokio::test]
async fn test_dropbox_check_expects_echo() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/2/check/user"))
        .and(body_string_contains("ping"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"result": "ping"}"#))
        .expect(1)
        .mount(&server)
        .await;

    dropbox(&server).check().await.unwrap();
}

#[tokio::test]
async fn test_dropbox_check_rejected_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/2/check/user"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_access_token"))
        .mount(&server)
        .await;

    let result = dropbox(&server).check().await;
    assert!(matches!(result, Err(StorageError::Api { status: 401, .. })));
}

#[tokio::test]
async fn test_local_sink_roundtrip() {
    let root = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let sink = LocalSink::new(root.path());

    sink.check().await.unwrap();
    let artifact = artifact(work.path(), b"%PDF-1.7");
    sink.upload(&artifact).await.unwrap();

    let stored = root
        .path()
        .join("downloads/editorial/asahi/2024-03-10_Budget.pdf");
    assert_eq!(std::fs::read(stored).unwrap(), b"%PDF-1.7");
    // The working file is left for the caller
    assert!(artifact.path.exists());

    assert!(sink.load_history().await.unwrap().is_empty());

    let mut history = HistoryIndex::new();
    history.insert("digest", "book", CandidateId::from("101"));
    history.ensure_category("digest", "audiobook");
    sink.persist_history(&history).await.unwrap();

    assert_eq!(sink.load_history().await.unwrap(), history);
}
