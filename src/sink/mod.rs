//! Storage sinks
//!
//! This module contains:
//! - The [`Sink`] contract and [`StorageError`]
//! - A local file system sink and a Dropbox sink
//! - The registry resolving the configured backend into a [`SinkSet`]

mod dropbox;
mod local;
mod registry;
mod traits;

pub use dropbox::{DropboxSink, CHUNK_THRESHOLD};
pub use local::LocalSink;
pub use registry::{resolve_sinks, SinkSet};
pub use traits::{Sink, StorageError, StorageResult};
