//! Run coordinator
//!
//! Drives one run through its phases:
//! - INIT: load and seed the history, compute the start digest
//! - LISTING: ask every source for candidates (authenticating first if needed)
//! - DISPATCHING: submit one task per candidate missing from the history
//! - COLLECTING: merge finished tasks into the history as they complete
//! - FINALIZED: persist the history, compute the end digest, notify on change

use crate::config::RunConfig;
use crate::delivery::{Artifact, DeliveryPipeline, FormatPolicy};
use crate::engine::scheduler::{plan_dispatch, Scheduler};
use crate::engine::state::{RunPhase, RunState};
use crate::engine::SessionSlot;
use crate::history::{CandidateId, HistoryDiff, HistoryIndex, RunDigest};
use crate::notify::{notify_all, Notifier, RunSummary};
use crate::session::SessionContext;
use crate::sink::{SinkSet, StorageError};
use crate::source::{Candidate, Document, FileKind, ListMode, SourceAdapter, SourceContext};
use crate::{ConciergeError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Behavior switches of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub mode: ListMode,
    pub policy: FormatPolicy,
    /// Load the stored history; otherwise start from an empty one
    pub use_history: bool,
    /// Write the history back at the end of the run
    pub persist_history: bool,
    /// Items in flight per source
    pub concurrency: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            mode: ListMode::New,
            policy: FormatPolicy::PassThrough,
            use_history: true,
            persist_history: true,
            concurrency: super::scheduler::DEFAULT_CONCURRENCY,
        }
    }
}

impl From<&RunConfig> for EngineOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            mode: config.mode,
            policy: config.format,
            use_history: config.use_history,
            persist_history: config.persist_history,
            concurrency: config.concurrency,
        }
    }
}

/// A source adapter and, for authenticated sources, its session
#[derive(Clone)]
pub struct SourceRegistration {
    pub adapter: Arc<dyn SourceAdapter>,
    pub session: Option<Arc<SessionSlot>>,
}

/// An item that was not delivered this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub source: String,
    pub category: FileKind,
    pub id: CandidateId,
    pub reason: String,
}

/// Outcome of a run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub phase: RunPhase,
    /// Artifacts accepted by the primary sink
    pub delivered: Vec<Artifact>,
    pub skipped: Vec<SkippedItem>,
    /// Sources that produced no listing (authentication or listing failure)
    pub failed_sources: Vec<String>,
    pub start_digest: RunDigest,
    pub end_digest: RunDigest,
    pub history_changed: bool,
    pub persisted: bool,
    pub history: HistoryIndex,
}

/// Result of one item task
struct ItemOutcome {
    source: String,
    category: FileKind,
    id: CandidateId,
    result: Result<Vec<Artifact>>,
}

/// Fetch, convert and deliver one candidate
struct ItemTask {
    registration: SourceRegistration,
    candidate: Candidate,
    pipeline: Arc<DeliveryPipeline>,
    sinks: SinkSet,
    options: EngineOptions,
    now: DateTime<Utc>,
    permits: Arc<Semaphore>,
}

impl ItemTask {
    async fn run(self) -> ItemOutcome {
        let result = match self.permits.clone().acquire_owned().await {
            Ok(_permit) => self.process().await,
            Err(_) => Err(ConciergeError::Io(std::io::Error::other("scheduler closed"))),
        };
        ItemOutcome {
            source: self.registration.adapter.name().to_string(),
            category: self.candidate.category,
            id: self.candidate.id.clone(),
            result,
        }
    }

    async fn process(&self) -> Result<Vec<Artifact>> {
        let document = self.fetch().await?;
        tracing::debug!("Fetched '{}'", document.title);

        let conversion = self.pipeline.convert(&document, self.options.policy).await?;
        for (format, e) in &conversion.failures {
            tracing::warn!("Format {} dropped: {}", format, e);
        }
        drop(document);

        deliver(&self.sinks, &conversion.artifacts).await?;
        tracing::info!("Delivered {} artifact(s)", conversion.artifacts.len());
        Ok(conversion.artifacts)
    }

    /// Fetches the document, renewing the session and retrying once if the
    /// source rejects it
    async fn fetch(&self) -> Result<Document> {
        let adapter = &self.registration.adapter;
        let Some(slot) = &self.registration.session else {
            let ctx = self.context(None);
            return Ok(adapter.fetch_one(&self.candidate, &ctx).await?);
        };

        let generation = {
            let guard = slot.read().await?;
            let ctx = self.context(Some(guard.context()));
            match adapter.fetch_one(&self.candidate, &ctx).await {
                Ok(document) => return Ok(document),
                Err(e) if e.is_unauthorized() => {
                    tracing::info!("Session rejected ({}), renewing", e);
                    guard.generation()
                }
                Err(e) => return Err(e.into()),
            }
        };

        slot.renew(generation).await?;
        let guard = slot.read().await?;
        let ctx = self.context(Some(guard.context()));
        Ok(adapter.fetch_one(&self.candidate, &ctx).await?)
    }

    fn context<'a>(&self, session: Option<&'a SessionContext>) -> SourceContext<'a> {
        source_context(self.options.mode, self.now, session)
    }
}

/// Hands every artifact to the primary sink and, if configured, the backup
///
/// All artifacts are attempted even when one fails. Working files are
/// removed once every sink has been tried.
async fn deliver(sinks: &SinkSet, artifacts: &[Artifact]) -> std::result::Result<(), StorageError> {
    let mut first_error = None;

    for artifact in artifacts {
        let primary = sinks.primary.upload(artifact).await;
        if let Some(backup) = &sinks.backup {
            if let Err(e) = backup.upload(artifact).await {
                tracing::warn!("Backup of {} failed: {}", artifact.destination(), e);
            }
        }
        if let Err(e) = &primary {
            tracing::warn!("Upload of {} failed: {}", artifact.destination(), e);
        }
        if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
            tracing::debug!("Could not remove {}: {}", artifact.path.display(), e);
        }
        if let Err(e) = primary {
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn source_context(
    mode: ListMode,
    now: DateTime<Utc>,
    session: Option<&SessionContext>,
) -> SourceContext<'_> {
    SourceContext { mode, now, session }
}

/// Lists one source, authenticating first when it has a session
///
/// Returns `None` when the source has to be skipped for this run.
async fn list_source(
    registration: SourceRegistration,
    mode: ListMode,
    now: DateTime<Utc>,
) -> Option<Vec<Candidate>> {
    let adapter = &registration.adapter;

    let listed = match &registration.session {
        None if adapter.requires_session() => {
            tracing::warn!("No session available, skipping source");
            return None;
        }
        None => adapter.list_candidates(&source_context(mode, now, None)).await,
        Some(slot) => {
            if let Err(e) = slot.establish().await {
                tracing::error!("Authentication failed, skipping source: {}", e);
                return None;
            }
            let first = match slot.read().await {
                Ok(guard) => {
                    let result = adapter
                        .list_candidates(&source_context(mode, now, Some(guard.context())))
                        .await;
                    (result, guard.generation())
                }
                Err(e) => {
                    tracing::error!("Session unavailable, skipping source: {}", e);
                    return None;
                }
            };
            match first {
                (Err(e), generation) if e.is_unauthorized() => {
                    tracing::info!("Listing rejected ({}), renewing session", e);
                    if let Err(e) = slot.renew(generation).await {
                        tracing::error!("Re-authentication failed, skipping source: {}", e);
                        return None;
                    }
                    match slot.read().await {
                        Ok(guard) => {
                            adapter
                                .list_candidates(&source_context(mode, now, Some(guard.context())))
                                .await
                        }
                        Err(e) => {
                            tracing::error!("Session unavailable, skipping source: {}", e);
                            return None;
                        }
                    }
                }
                (result, _) => result,
            }
        }
    };

    match listed {
        Ok(candidates) => {
            tracing::info!("Listed {} candidate(s)", candidates.len());
            Some(candidates)
        }
        Err(e) => {
            tracing::warn!("Listing failed, skipping source: {}", e);
            None
        }
    }
}

/// Incremental fetch engine
///
/// Written once against [`SourceAdapter`]; sources are added through
/// [`RunEngine::register`].
pub struct RunEngine {
    sources: Vec<SourceRegistration>,
    pipeline: Arc<DeliveryPipeline>,
    sinks: SinkSet,
    notifiers: Vec<Box<dyn Notifier>>,
    options: EngineOptions,
}

impl RunEngine {
    pub fn new(pipeline: DeliveryPipeline, sinks: SinkSet, options: EngineOptions) -> Self {
        Self {
            sources: Vec::new(),
            pipeline: Arc::new(pipeline),
            sinks,
            notifiers: Vec::new(),
            options,
        }
    }

    /// Adds a source; authenticated sources pass their session slot
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>, session: Option<Arc<SessionSlot>>) {
        self.sources.push(SourceRegistration { adapter, session });
    }

    pub fn add_notifier(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Names of the registered sources, in registration order
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.adapter.name()).collect()
    }

    /// Executes one run at the current time
    pub async fn run(&self) -> Result<RunReport> {
        self.run_at(Utc::now()).await
    }

    /// Executes one run with `now` as the processing instant
    ///
    /// # Returns
    ///
    /// * `Ok(RunReport)` - The run reached FINALIZED; individual items or
    ///   sources may still have been skipped
    /// * `Err(ConciergeError::Storage)` - The history could not be loaded;
    ///   nothing was listed or delivered
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RunReport> {
        let span = tracing::info_span!(
            "run",
            mode = self.options.mode.as_str(),
            format = self.options.policy.as_str()
        );
        self.execute(now).instrument(span).await
    }

    async fn execute(&self, now: DateTime<Utc>) -> Result<RunReport> {
        let mut state = RunState::new();

        // INIT
        let mut history = self.load_history().await?;
        for registration in &self.sources {
            let name = registration.adapter.name();
            for category in registration.adapter.categories() {
                history.ensure_category(name, category.as_str());
            }
        }
        let start_history = history.clone();
        let start_digest = RunDigest::of(&history);
        tracing::info!(
            "Starting run with {} source(s), {} recorded item(s)",
            self.sources.len(),
            history.len()
        );

        // LISTING
        state.advance(RunPhase::Listing)?;
        let mut listings: Vec<Option<Vec<Candidate>>> = vec![None; self.sources.len()];
        let mut listing_tasks = JoinSet::new();
        for (index, registration) in self.sources.iter().enumerate() {
            let span = tracing::info_span!("source", source = registration.adapter.name());
            let registration = registration.clone();
            let mode = self.options.mode;
            listing_tasks.spawn(
                async move { (index, list_source(registration, mode, now).await) }.instrument(span),
            );
        }
        while let Some(joined) = listing_tasks.join_next().await {
            match joined {
                Ok((index, listed)) => listings[index] = listed,
                Err(e) => tracing::error!("Listing task failed: {}", e),
            }
        }

        // DISPATCHING
        state.advance(RunPhase::Dispatching)?;
        let mut scheduler = Scheduler::new(self.options.concurrency);
        let mut tasks = JoinSet::new();
        let mut failed_sources = Vec::new();

        for (registration, listed) in self.sources.iter().zip(listings) {
            let name = registration.adapter.name();
            let Some(candidates) = listed else {
                failed_sources.push(name.to_string());
                continue;
            };

            let plan = plan_dispatch(name, candidates, &history);
            tracing::info!(
                "{}: {} to fetch, {} already delivered, {} duplicate(s)",
                name,
                plan.pending.len(),
                plan.already_delivered,
                plan.duplicates
            );

            let permits = scheduler.permits_for(name);
            for candidate in plan.pending {
                let span = tracing::info_span!(
                    "item",
                    source = name,
                    category = candidate.category.as_str(),
                    candidate = candidate.id.as_str()
                );
                let task = ItemTask {
                    registration: registration.clone(),
                    candidate,
                    pipeline: self.pipeline.clone(),
                    sinks: self.sinks.clone(),
                    options: self.options,
                    now,
                    permits: permits.clone(),
                };
                tasks.spawn(task.run().instrument(span));
            }
        }

        // COLLECTING
        state.advance(RunPhase::Collecting)?;
        let mut delivered = Vec::new();
        let mut skipped = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Item task aborted: {}", e);
                    continue;
                }
            };
            match outcome.result {
                Ok(artifacts) => {
                    history.insert(&outcome.source, outcome.category.as_str(), outcome.id);
                    delivered.extend(artifacts);
                }
                Err(e) => {
                    tracing::warn!(
                        "Skipped {}/{}/{}: {}",
                        outcome.source,
                        outcome.category,
                        outcome.id,
                        e
                    );
                    skipped.push(SkippedItem {
                        source: outcome.source,
                        category: outcome.category,
                        id: outcome.id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        // FINALIZED
        state.advance(RunPhase::Finalized)?;
        let persisted = self.persist_history(&history).await;
        let end_digest = RunDigest::of(&history);
        let history_changed = start_digest != end_digest;

        if history_changed {
            let summary = RunSummary {
                start_digest: start_digest.clone(),
                end_digest: end_digest.clone(),
                delivered: delivered.len(),
                skipped: skipped.len(),
                diff: HistoryDiff::between(&start_history, &history),
            };
            notify_all(&self.notifiers, &summary).await;
        }

        tracing::info!(
            "Run finished: {} artifact(s) delivered, {} item(s) skipped, history {}",
            delivered.len(),
            skipped.len(),
            if history_changed { "changed" } else { "unchanged" }
        );

        Ok(RunReport {
            phase: state.phase(),
            delivered,
            skipped,
            failed_sources,
            start_digest,
            end_digest,
            history_changed,
            persisted,
            history,
        })
    }

    async fn load_history(&self) -> Result<HistoryIndex> {
        self.sinks.primary.check().await?;
        if !self.options.use_history {
            tracing::info!("History disabled, starting from an empty one");
            return Ok(HistoryIndex::new());
        }
        let history = self.sinks.primary.load_history().await?;
        Ok(history)
    }

    /// Persists the history if enabled; failures are logged, not raised
    async fn persist_history(&self, history: &HistoryIndex) -> bool {
        if !self.options.persist_history {
            tracing::info!("History persistence disabled");
            return false;
        }
        match self.sinks.primary.persist_history(history).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to persist history: {}", e);
                false
            }
        }
    }
}
