//! Source adapters
//!
//! This module contains:
//! - The adapter contract ([`SourceAdapter`]) and its error type
//! - Listing and document types shared by all adapters
//! - HTTP client construction and article extraction helpers
//! - The concrete adapters under [`sources`]

mod article;
mod fetcher;
mod traits;
mod types;

pub mod sources;

pub use fetcher::{build_http_client, build_session_client};
pub use traits::{FetchError, FetchResult, SourceAdapter};
pub use types::{
    Attachment, Candidate, Document, FileKind, Illustration, ListMode, SourceContext,
};
