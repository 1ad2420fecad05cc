use crate::history::{CandidateId, HistoryIndex};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Order-independent fingerprint of a whole `HistoryIndex`
///
/// The digest walks sources, categories and ids in sorted order, so two
/// indexes with the same set membership always produce the same digest no
/// matter how they were built or loaded. Empty categories take part in the
/// digest as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RunDigest(String);

impl RunDigest {
    /// Computes the digest of a history snapshot
    pub fn of(history: &HistoryIndex) -> Self {
        let mut hasher = Sha256::new();
        for (source, category, ids) in history.entries() {
            hasher.update(source.as_bytes());
            hasher.update([0u8]);
            hasher.update(category.as_bytes());
            hasher.update([0u8]);
            for id in ids {
                hasher.update(id.as_str().as_bytes());
                hasher.update([0x1f]);
            }
            hasher.update([b'\n']);
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Hex-encoded SHA-256 value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ids present in a later snapshot that were absent from an earlier one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistoryDiff {
    pub added: BTreeMap<String, BTreeMap<String, BTreeSet<CandidateId>>>,
}

impl HistoryDiff {
    /// Structural diff between two snapshots, computed over sorted keys
    pub fn between(before: &HistoryIndex, after: &HistoryIndex) -> Self {
        let mut added: BTreeMap<String, BTreeMap<String, BTreeSet<CandidateId>>> =
            BTreeMap::new();

        for (source, category, ids) in after.entries() {
            let previous = before.category(source, category);
            let fresh: BTreeSet<CandidateId> = ids
                .iter()
                .filter(|id| !previous.map(|p| p.contains(*id)).unwrap_or(false))
                .cloned()
                .collect();

            if !fresh.is_empty() {
                added
                    .entry(source.to_string())
                    .or_default()
                    .insert(category.to_string(), fresh);
            }
        }

        Self { added }
    }

    /// Number of added ids across all categories
    pub fn added_count(&self) -> usize {
        self.added
            .values()
            .flat_map(|categories| categories.values())
            .map(BTreeSet::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
    }
}
