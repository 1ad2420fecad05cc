//! End-to-end tests for the run engine
//!
//! Sources are in-memory fakes; artifacts and the history go to a local sink
//! in a temporary directory. The wiring test drives `build_engine` against a
//! wiremock login site.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use pdf_concierge::config::{Config, StorageBackend};
use pdf_concierge::delivery::{ConversionError, Renderer};
use pdf_concierge::engine::{build_engine, EngineOptions, RunEngine, SessionSlot};
use pdf_concierge::history::CandidateId;
use pdf_concierge::notify::{Notifier, NotifyError, RunSummary};
use pdf_concierge::session::{AuthError, Authenticator, CookieJar, Credentials, SessionContext};
use pdf_concierge::sink::{LocalSink, StorageError, StorageResult};
use pdf_concierge::source::{
    Attachment, Candidate, Document, FetchError, FetchResult, FileKind, ListMode, SourceAdapter,
    SourceContext,
};
use pdf_concierge::{
    Artifact, ConciergeError, DeliveryPipeline, FormatPolicy, HistoryIndex, OutputFormat,
    RunPhase, Sink, SinkSet,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 1, 0, 0).unwrap()
}

fn document(source: &str, candidate: &Candidate) -> Document {
    Document {
        source: source.to_string(),
        category: candidate.category,
        collection: source.to_string(),
        id: candidate.id.clone(),
        title: format!("Item {}", candidate.id),
        date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
        file_stem: format!("item-{}", candidate.id),
        lang: None,
        reference_url: None,
        body: Vec::new(),
        illustration: None,
        original: Some(Attachment {
            bytes: format!("%PDF {}", candidate.id).into_bytes(),
            extension: ".pdf".to_string(),
        }),
    }
}

/// In-memory source with a fixed listing
struct FakeSource {
    name: &'static str,
    listing: Vec<Candidate>,
    failing: HashSet<String>,
    delay: Option<std::time::Duration>,
    listings: AtomicUsize,
    fetches: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeSource {
    fn new(name: &'static str, ids: &[&str]) -> Self {
        Self {
            name,
            listing: ids.iter().map(|id| Candidate::new(FileKind::Book, *id)).collect(),
            failing: HashSet::new(),
            delay: None,
            listings: AtomicUsize::new(0),
            fetches: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn fetch_count(&self, id: &str) -> usize {
        self.fetches.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl SourceAdapter for FakeSource {
    fn name(&self) -> &str {
        self.name
    }

    fn categories(&self) -> &[FileKind] {
        &[FileKind::Book]
    }

    async fn list_candidates(&self, _ctx: &SourceContext<'_>) -> FetchResult<Vec<Candidate>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        Ok(self.listing.clone())
    }

    async fn fetch_one(
        &self,
        candidate: &Candidate,
        _ctx: &SourceContext<'_>,
    ) -> FetchResult<Document> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(candidate.id.to_string())
            .or_default() += 1;

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(candidate.id.as_str()) {
            return Err(FetchError::Status {
                url: format!("fake://{}", candidate.id),
                status: 500,
            });
        }
        Ok(document(self.name, candidate))
    }
}

/// Issues sessions whose cookie carries the handshake number
struct CountingAuthenticator {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingAuthenticator {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for CountingAuthenticator {
    async fn establish(&self, _credentials: &Credentials) -> Result<SessionContext, AuthError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(AuthError::NoSessionCookie);
        }
        let mut jar = CookieJar::new();
        jar.set("token", call.to_string());
        Ok(SessionContext::new(jar, now(), Duration::minutes(60)))
    }
}

/// Session-bound source that rejects sessions from handshakes listed in
/// `rejected`
struct GatedSource {
    rejected: HashSet<String>,
    fetches: AtomicUsize,
}

impl GatedSource {
    fn rejecting(tokens: &[&str]) -> Self {
        Self {
            rejected: tokens.iter().map(|t| t.to_string()).collect(),
            fetches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SourceAdapter for GatedSource {
    fn name(&self) -> &str {
        "gated"
    }

    fn categories(&self) -> &[FileKind] {
        &[FileKind::Book, FileKind::Audiobook]
    }

    fn requires_session(&self) -> bool {
        true
    }

    async fn list_candidates(&self, ctx: &SourceContext<'_>) -> FetchResult<Vec<Candidate>> {
        ctx.session
            .ok_or_else(|| FetchError::SessionRequired("gated".to_string()))?;
        Ok(vec![Candidate::new(FileKind::Book, "g1")])
    }

    async fn fetch_one(
        &self,
        candidate: &Candidate,
        ctx: &SourceContext<'_>,
    ) -> FetchResult<Document> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let session = ctx
            .session
            .ok_or_else(|| FetchError::SessionRequired("gated".to_string()))?;
        let token = session.cookies().get("token").unwrap_or_default();
        if self.rejected.contains(token) {
            return Err(FetchError::Unauthorized(format!("token {} rejected", token)));
        }
        Ok(document("gated", candidate))
    }
}

/// Records every summary it receives
#[derive(Default)]
struct RecordingNotifier {
    summaries: Arc<Mutex<Vec<RunSummary>>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, summary: &RunSummary) -> Result<(), NotifyError> {
        self.summaries.lock().unwrap().push(summary.clone());
        Ok(())
    }
}

/// Sink whose history cannot be read
struct UnreadableSink;

#[async_trait]
impl Sink for UnreadableSink {
    fn name(&self) -> &str {
        "unreadable"
    }

    async fn upload(&self, _artifact: &Artifact) -> StorageResult<()> {
        Ok(())
    }

    async fn load_history(&self) -> StorageResult<HistoryIndex> {
        Err(StorageError::UnexpectedResponse("corrupt".to_string()))
    }

    async fn persist_history(&self, _history: &HistoryIndex) -> StorageResult<()> {
        Ok(())
    }
}

/// Copies the input through, failing for documents whose payload mentions
/// `fail_on`
struct PickyRenderer {
    fail_on: &'static str,
}

#[async_trait]
impl Renderer for PickyRenderer {
    async fn render(
        &self,
        input: &Path,
        format: OutputFormat,
        output: &Path,
    ) -> Result<(), ConversionError> {
        let bytes = tokio::fs::read(input).await?;
        if String::from_utf8_lossy(&bytes).contains(self.fail_on) {
            return Err(ConversionError::RendererFailed {
                format,
                program: "picky".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "cannot render".to_string(),
            });
        }
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }
}

/// Local sink that refuses uploads whose destination mentions `refuse`
struct RefusingSink {
    inner: LocalSink,
    refuse: &'static str,
}

#[async_trait]
impl Sink for RefusingSink {
    fn name(&self) -> &str {
        "refusing"
    }

    async fn upload(&self, artifact: &Artifact) -> StorageResult<()> {
        if artifact.destination().contains(self.refuse) {
            return Err(StorageError::UnexpectedResponse("quota exceeded".to_string()));
        }
        self.inner.upload(artifact).await
    }

    async fn load_history(&self) -> StorageResult<HistoryIndex> {
        self.inner.load_history().await
    }

    async fn persist_history(&self, history: &HistoryIndex) -> StorageResult<()> {
        self.inner.persist_history(history).await
    }
}

struct Fixture {
    root: TempDir,
    work: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            root: TempDir::new().unwrap(),
            work: TempDir::new().unwrap(),
        }
    }

    fn sink(&self) -> LocalSink {
        LocalSink::new(self.root.path())
    }

    fn engine(&self, options: EngineOptions) -> RunEngine {
        RunEngine::new(
            DeliveryPipeline::new(self.work.path()),
            SinkSet::new(Arc::new(self.sink())),
            options,
        )
    }

    fn work_files(&self) -> usize {
        std::fs::read_dir(self.work.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

fn options() -> EngineOptions {
    EngineOptions {
        mode: ListMode::All,
        ..EngineOptions::default()
    }
}

fn recorded(history: &HistoryIndex, source: &str, category: &str) -> Vec<String> {
    history
        .category(source, category)
        .map(|ids| ids.iter().map(|id| id.to_string()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_run_delivers_and_records_everything_new() {
    let fixture = Fixture::new();
    let source = Arc::new(FakeSource::new("x", &["c1", "c2"]));
    let mut engine = fixture.engine(options());
    engine.register(source.clone(), None);

    let report = engine.run_at(now()).await.unwrap();

    assert_eq!(report.phase, RunPhase::Finalized);
    assert_eq!(report.delivered.len(), 2);
    assert!(report.skipped.is_empty());
    assert!(report.history_changed);
    assert!(report.persisted);
    assert_eq!(recorded(&report.history, "x", "book"), vec!["c1", "c2"]);

    let stored = fixture.root.path().join("downloads/book/x/item-c1.pdf");
    assert_eq!(std::fs::read(stored).unwrap(), b"%PDF c1");

    // The persisted history matches the in-memory one
    assert_eq!(fixture.sink().load_history().await.unwrap(), report.history);
    // Working files are gone once delivered
    assert_eq!(fixture.work_files(), 0);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let fixture = Fixture::new();
    let source = Arc::new(FakeSource::new("x", &["c1", "c2"]));
    let mut engine = fixture.engine(options());
    engine.register(source.clone(), None);

    let first = engine.run_at(now()).await.unwrap();
    let second = engine.run_at(now()).await.unwrap();

    assert!(second.delivered.is_empty());
    assert!(!second.history_changed);
    assert_eq!(second.start_digest, first.end_digest);
    assert_eq!(second.end_digest, first.end_digest);
    assert_eq!(source.total_fetches(), 2);
    assert_eq!(source.listings.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_item_is_skipped_and_retried_next_run() {
    let fixture = Fixture::new();
    let source = Arc::new(FakeSource::new("x", &["c1", "c2", "c3"]).failing("c2"));
    let mut engine = fixture.engine(options());
    engine.register(source.clone(), None);

    let report = engine.run_at(now()).await.unwrap();

    assert_eq!(recorded(&report.history, "x", "book"), vec!["c1", "c3"]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].id, CandidateId::from("c2"));
    assert_eq!(report.skipped[0].source, "x");

    let again = engine.run_at(now()).await.unwrap();
    assert_eq!(source.fetch_count("c1"), 1);
    assert_eq!(source.fetch_count("c2"), 2);
    assert_eq!(again.skipped.len(), 1);
}

#[tokio::test]
async fn test_duplicate_listing_is_fetched_once() {
    let fixture = Fixture::new();
    let source = Arc::new(FakeSource::new("x", &["c1", "c1", "c2", "c1"]));
    let mut engine = fixture.engine(options());
    engine.register(source.clone(), None);

    let report = engine.run_at(now()).await.unwrap();

    assert_eq!(source.fetch_count("c1"), 1);
    assert_eq!(report.delivered.len(), 2);
}

#[tokio::test]
async fn test_history_is_seeded_with_source_categories() {
    let fixture = Fixture::new();
    let mut engine = fixture.engine(options());
    engine.register(Arc::new(FakeSource::new("x", &[])), None);

    let report = engine.run_at(now()).await.unwrap();

    assert!(report.history.category("x", "book").is_some());
    assert!(report.delivered.is_empty());
}

#[tokio::test]
async fn test_items_in_flight_are_bounded_per_source() {
    let fixture = Fixture::new();
    let ids: Vec<String> = (0..8).map(|i| format!("c{}", i)).collect();
    let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
    let source = Arc::new(
        FakeSource::new("x", &ids).with_delay(std::time::Duration::from_millis(20)),
    );
    let mut engine = fixture.engine(EngineOptions {
        concurrency: 2,
        ..options()
    });
    engine.register(source.clone(), None);

    let report = engine.run_at(now()).await.unwrap();

    assert_eq!(report.delivered.len(), 8);
    let max = source.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 2, "{} items were in flight", max);
    assert!(max >= 1);
}

#[tokio::test]
async fn test_rejected_session_is_renewed_once() {
    let fixture = Fixture::new();
    let authenticator = Arc::new(CountingAuthenticator::new());
    let source = Arc::new(GatedSource::rejecting(&["1"]));
    let slot = SessionSlot::new("gated", authenticator.clone(), Credentials::new("u", "p"));

    let mut engine = fixture.engine(options());
    engine.register(source.clone(), Some(Arc::new(slot)));

    let report = engine.run_at(now()).await.unwrap();

    assert_eq!(authenticator.calls(), 2);
    assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    assert_eq!(recorded(&report.history, "gated", "book"), vec!["g1"]);
    assert!(report.history.category("gated", "audiobook").is_some());
}

#[tokio::test]
async fn test_session_rejected_after_renewal_skips_item() {
    let fixture = Fixture::new();
    let authenticator = Arc::new(CountingAuthenticator::new());
    let source = Arc::new(GatedSource::rejecting(&["1", "2", "3"]));
    let slot = SessionSlot::new("gated", authenticator.clone(), Credentials::new("u", "p"));

    let mut engine = fixture.engine(options());
    engine.register(source.clone(), Some(Arc::new(slot)));

    let report = engine.run_at(now()).await.unwrap();

    assert_eq!(authenticator.calls(), 2);
    assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    assert_eq!(report.skipped.len(), 1);
    assert!(recorded(&report.history, "gated", "book").is_empty());
    assert_eq!(fixture.work_files(), 0);
}

#[tokio::test]
async fn test_failed_authentication_skips_only_that_source() {
    let fixture = Fixture::new();
    let authenticator = Arc::new(CountingAuthenticator::failing());
    let gated = Arc::new(GatedSource::rejecting(&[]));
    let open = Arc::new(FakeSource::new("open", &["o1"]));
    let slot = SessionSlot::new("gated", authenticator.clone(), Credentials::new("u", "p"));

    let mut engine = fixture.engine(options());
    engine.register(gated.clone(), Some(Arc::new(slot)));
    engine.register(open.clone(), None);

    let report = engine.run_at(now()).await.unwrap();

    assert_eq!(report.failed_sources, vec!["gated".to_string()]);
    assert_eq!(gated.fetches.load(Ordering::SeqCst), 0);
    assert_eq!(recorded(&report.history, "open", "book"), vec!["o1"]);
    assert_eq!(authenticator.calls(), 1);
}

#[tokio::test]
async fn test_session_source_without_slot_is_skipped() {
    let fixture = Fixture::new();
    let gated = Arc::new(GatedSource::rejecting(&[]));
    let mut engine = fixture.engine(options());
    engine.register(gated.clone(), None);

    let report = engine.run_at(now()).await.unwrap();

    assert_eq!(report.failed_sources, vec!["gated".to_string()]);
    assert_eq!(gated.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_disabled_history_starts_empty_and_replaces_stored() {
    let fixture = Fixture::new();
    let mut stored = HistoryIndex::new();
    stored.insert("x", "book", CandidateId::from("c1"));
    stored.insert("old", "book", CandidateId::from("z9"));
    fixture.sink().persist_history(&stored).await.unwrap();

    let source = Arc::new(FakeSource::new("x", &["c1"]));
    let mut engine = fixture.engine(EngineOptions {
        use_history: false,
        ..options()
    });
    engine.register(source.clone(), None);

    let report = engine.run_at(now()).await.unwrap();

    assert_eq!(source.fetch_count("c1"), 1);
    let persisted = fixture.sink().load_history().await.unwrap();
    assert_eq!(persisted, report.history);
    assert!(persisted.category("old", "book").is_none());
}

#[tokio::test]
async fn test_unpersisted_history_leaves_store_untouched() {
    let fixture = Fixture::new();
    let source = Arc::new(FakeSource::new("x", &["c1"]));
    let mut engine = fixture.engine(EngineOptions {
        persist_history: false,
        ..options()
    });
    engine.register(source, None);

    let report = engine.run_at(now()).await.unwrap();

    assert!(!report.persisted);
    assert!(report.history_changed);
    assert!(fixture.sink().load_history().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreadable_history_aborts_run() {
    let work = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new("x", &["c1"]));
    let mut engine = RunEngine::new(
        DeliveryPipeline::new(work.path()),
        SinkSet::new(Arc::new(UnreadableSink)),
        options(),
    );
    engine.register(source.clone(), None);

    let result = engine.run_at(now()).await;

    assert!(matches!(result, Err(ConciergeError::Storage(_))));
    assert_eq!(source.listings.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_backup_receives_every_artifact() {
    let fixture = Fixture::new();
    let backup_root = TempDir::new().unwrap();
    let sinks = SinkSet::new(Arc::new(fixture.sink()))
        .with_backup(Arc::new(LocalSink::backup(backup_root.path())));
    let mut engine = RunEngine::new(DeliveryPipeline::new(fixture.work.path()), sinks, options());
    engine.register(Arc::new(FakeSource::new("x", &["c1"])), None);

    engine.run_at(now()).await.unwrap();

    assert!(backup_root.path().join("downloads/book/x/item-c1.pdf").exists());
    assert!(fixture.root.path().join("downloads/book/x/item-c1.pdf").exists());
}

#[tokio::test]
async fn test_notifier_only_hears_about_changes() {
    let fixture = Fixture::new();
    let notifier = RecordingNotifier::default();
    let summaries = notifier.summaries.clone();

    let mut engine = fixture.engine(options());
    engine.register(Arc::new(FakeSource::new("x", &["c1", "c2"])), None);
    engine.add_notifier(Box::new(notifier));

    engine.run_at(now()).await.unwrap();
    engine.run_at(now()).await.unwrap();

    let summaries = summaries.lock().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].delivered, 2);
    assert_eq!(summaries[0].diff.added_count(), 2);
    assert_ne!(summaries[0].start_digest, summaries[0].end_digest);
}

#[tokio::test]
async fn test_failed_conversion_only_skips_that_item() {
    let fixture = Fixture::new();
    let pipeline = DeliveryPipeline::new(fixture.work.path())
        .with_renderer(OutputFormat::A4, Arc::new(PickyRenderer { fail_on: "c2" }));
    let mut engine = RunEngine::new(
        pipeline,
        SinkSet::new(Arc::new(fixture.sink())),
        EngineOptions {
            policy: FormatPolicy::A4,
            ..options()
        },
    );
    let source = Arc::new(FakeSource::new("x", &["c1", "c2", "c3"]));
    engine.register(source.clone(), None);

    let report = engine.run_at(now()).await.unwrap();

    assert_eq!(recorded(&report.history, "x", "book"), vec!["c1", "c3"]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].id, CandidateId::from("c2"));
    assert!(fixture.root.path().join("downloads/book/x/item-c1_a4.pdf").exists());
    assert!(!fixture.root.path().join("downloads/book/x/item-c2_a4.pdf").exists());
    assert_eq!(fixture.work_files(), 0);
    assert_eq!(fixture.sink().load_history().await.unwrap(), report.history);
}

#[tokio::test]
async fn test_failed_upload_keeps_item_out_of_history() {
    let fixture = Fixture::new();
    let sink = RefusingSink {
        inner: fixture.sink(),
        refuse: "item-c2",
    };
    let mut engine = RunEngine::new(
        DeliveryPipeline::new(fixture.work.path()),
        SinkSet::new(Arc::new(sink)),
        options(),
    );
    let source = Arc::new(FakeSource::new("x", &["c1", "c2", "c3"]));
    engine.register(source.clone(), None);

    let report = engine.run_at(now()).await.unwrap();

    assert_eq!(recorded(&report.history, "x", "book"), vec!["c1", "c3"]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].id, CandidateId::from("c2"));
    assert_eq!(report.delivered.len(), 2);
    // The refused artifact's working file is cleaned up as well
    assert_eq!(fixture.work_files(), 0);
    assert_eq!(fixture.sink().load_history().await.unwrap(), report.history);
}

#[tokio::test]
async fn test_built_engine_reauthenticates_once_on_login_bounce() {
    let server = MockServer::start().await;
    let fixture = Fixture::new();

    Mock::given(method("POST"))
        .and(path("/member_login_process.php"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mem/v1/action.php"))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "SID=abc; Path=/"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Main/Index.asp"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/loginAction.asp"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    // Every listing request bounces to the login page.
    Mock::given(method("GET"))
        .and(path("/sub/digest/newbooklist.asp"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/login.asp"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/login.asp"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.storage.backend = Some(StorageBackend::Local);
    config.storage.local_root = fixture.root.path().display().to_string();
    config.run.working_dir = fixture.work.path().display().to_string();
    config.run.mode = ListMode::All;
    config.sources.digest.enabled = true;
    config.sources.digest.username = Some("reader".to_string());
    config.sources.digest.password = Some("secret".to_string());
    config.sources.digest.base_url = Some(server.uri());
    config.sources.digest.member_base_url = Some(server.uri());

    let engine = build_engine(&config).unwrap();
    let report = engine.run().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let hits = |p: &str| requests.iter().filter(|r| r.url.path() == p).count();

    assert_eq!(hits("/mem/v1/action.php"), 2);
    assert_eq!(hits("/sub/digest/newbooklist.asp"), 2);
    assert_eq!(hits("/login.asp"), 0);
    assert_eq!(report.failed_sources, vec!["digest".to_string()]);
    assert!(report.delivered.is_empty());
}
