//! Source adapter contract and error type
//!
//! Every external source is reached through [`SourceAdapter`], so the run
//! engine is written once against this trait.

use crate::source::{Candidate, Document, FileKind, SourceContext};
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while listing or fetching
///
/// All variants are recoverable at item level: the caller skips the item and
/// it is retried on the next run. `Unauthorized` additionally lets the caller
/// renew the session and retry once.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("missing {field} in {context}")]
    MissingField { field: &'static str, context: String },

    #[error("malformed payload from {url}: {message}")]
    Malformed { url: String, message: String },

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("source '{0}' needs a session but none was provided")]
    SessionRequired(String),
}

impl FetchError {
    /// Returns true if renewing the session may fix this error
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    pub(crate) fn missing(field: &'static str, context: impl Into<String>) -> Self {
        Self::MissingField {
            field,
            context: context.into(),
        }
    }
}

/// Result type for adapter operations
pub type FetchResult<T> = Result<T, FetchError>;

/// Capability contract implemented once per external source
///
/// Adapters are stateless per call: everything call-specific arrives through
/// [`SourceContext`].
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Source name; also the top-level key in the history
    fn name(&self) -> &str;

    /// Categories this source produces, seeded into the history
    fn categories(&self) -> &[FileKind];

    /// Whether calls need an established session
    fn requires_session(&self) -> bool {
        false
    }

    /// Lists candidates in listing order
    ///
    /// An empty or unavailable listing yields zero candidates rather than an
    /// error. Pagination is followed until the source reports no further page.
    async fn list_candidates(&self, ctx: &SourceContext<'_>) -> FetchResult<Vec<Candidate>>;

    /// Fetches and assembles one complete document
    ///
    /// Raises `FetchError` instead of returning a partial document when any
    /// required field cannot be extracted.
    async fn fetch_one(
        &self,
        candidate: &Candidate,
        ctx: &SourceContext<'_>,
    ) -> FetchResult<Document>;
}
