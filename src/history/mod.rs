//! History module for cross-run deduplication
//!
//! The history records every candidate that has been delivered, keyed by
//! source and category. It is loaded once at the start of a run, grows while
//! items are delivered and is written back once at the end.
//!
//! # Components
//!
//! - `HistoryIndex`: source → category → set of delivered `CandidateId`s
//! - `RunDigest`: order-independent fingerprint of a whole index
//! - `HistoryDiff`: the ids added between two snapshots of an index

mod digest;
mod index;

pub use digest::{HistoryDiff, RunDigest};
pub use index::{exclude_from_history, CandidateId, HistoryIndex};
