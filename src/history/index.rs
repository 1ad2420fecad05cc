use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// Opaque identifier of a fetchable item within a (source, category) namespace
///
/// Identifiers are stable across runs and are the deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(String);

impl CandidateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CandidateId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CandidateId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

type CategoryMap = BTreeMap<String, BTreeSet<CandidateId>>;

/// Persistent record of delivered candidates
///
/// Maps source name → category name → set of `CandidateId`. The index is
/// append-only during normal operation: the only way to drop entries is
/// [`HistoryIndex::reset_source`].
///
/// The on-disk form is a YAML mapping whose leaves are sequences of ids.
/// Sorted containers make the serialized form deterministic, but loading does
/// not depend on key or sequence order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryIndex {
    sources: BTreeMap<String, CategoryMap>,
}

impl HistoryIndex {
    /// Creates an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sure `source`/`category` exists, leaving existing ids untouched
    pub fn ensure_category(&mut self, source: &str, category: &str) {
        self.sources
            .entry(source.to_string())
            .or_default()
            .entry(category.to_string())
            .or_default();
    }

    /// Returns true if `id` was already delivered for `source`/`category`
    pub fn contains(&self, source: &str, category: &str, id: &CandidateId) -> bool {
        self.sources
            .get(source)
            .and_then(|categories| categories.get(category))
            .map(|ids| ids.contains(id))
            .unwrap_or(false)
    }

    /// Records a delivered id
    ///
    /// Returns true if the id was not present before.
    pub fn insert(&mut self, source: &str, category: &str, id: CandidateId) -> bool {
        self.sources
            .entry(source.to_string())
            .or_default()
            .entry(category.to_string())
            .or_default()
            .insert(id)
    }

    /// Gets the delivered ids of one category
    pub fn category(&self, source: &str, category: &str) -> Option<&BTreeSet<CandidateId>> {
        self.sources.get(source).and_then(|c| c.get(category))
    }

    /// Iterates over source names in sorted order
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// Iterates over `(source, category, ids)` in sorted order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &BTreeSet<CandidateId>)> {
        self.sources.iter().flat_map(|(source, categories)| {
            categories
                .iter()
                .map(move |(category, ids)| (source.as_str(), category.as_str(), ids))
        })
    }

    /// Total number of recorded ids across all sources
    pub fn len(&self) -> usize {
        self.entries().map(|(_, _, ids)| ids.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops everything recorded for a source
    ///
    /// This is the only operation that shrinks the index.
    pub fn reset_source(&mut self, source: &str) -> bool {
        self.sources.remove(source).is_some()
    }

    /// Parses the YAML history document
    ///
    /// An empty document (or an explicit YAML null) is an empty history.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::new());
        }
        let parsed: Option<BTreeMap<String, Option<BTreeMap<String, Option<Vec<CandidateId>>>>>> =
            serde_yaml::from_str(text)?;

        let mut index = Self::new();
        for (source, categories) in parsed.unwrap_or_default() {
            index.sources.entry(source.clone()).or_default();
            for (category, ids) in categories.unwrap_or_default() {
                index.ensure_category(&source, &category);
                for id in ids.unwrap_or_default() {
                    index.insert(&source, &category, id);
                }
            }
        }
        Ok(index)
    }

    /// Serializes the history to its YAML document form
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.sources)
    }
}

/// Subtracts the delivered ids from a listing, keeping listing order
///
/// Duplicate ids in the listing are dispatched only once.
pub fn exclude_from_history<'a, I>(
    listed: I,
    delivered: Option<&BTreeSet<CandidateId>>,
) -> Vec<CandidateId>
where
    I: IntoIterator<Item = &'a CandidateId>,
{
    let mut seen = HashSet::new();
    listed
        .into_iter()
        .filter(|id| !delivered.map(|d| d.contains(*id)).unwrap_or(false))
        .filter(|id| seen.insert(id.as_str().to_string()))
        .cloned()
        .collect()
}
