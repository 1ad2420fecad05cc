//! Dispatch planning and per-source concurrency limits
//!
//! This module handles:
//! - Subtracting the history from a source's listing
//! - Dropping duplicate listings of the same candidate
//! - One semaphore per source bounding the items in flight

use crate::history::{exclude_from_history, CandidateId, HistoryIndex};
use crate::source::{Candidate, FileKind};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Default number of items in flight per source
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Candidates of one source that still need delivery
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DispatchPlan {
    /// In listing order within each category
    pub pending: Vec<Candidate>,
    /// Listed but already in the history
    pub already_delivered: usize,
    /// Listed more than once
    pub duplicates: usize,
}

/// Computes the set difference between a listing and the history
pub fn plan_dispatch(source: &str, candidates: Vec<Candidate>, history: &HistoryIndex) -> DispatchPlan {
    let mut by_category: BTreeMap<FileKind, Vec<Candidate>> = BTreeMap::new();
    for candidate in candidates {
        by_category.entry(candidate.category).or_default().push(candidate);
    }

    let mut plan = DispatchPlan::default();
    for (category, listed) in by_category {
        let fresh: HashSet<CandidateId> = exclude_from_history(
            listed.iter().map(|candidate| &candidate.id),
            history.category(source, category.as_str()),
        )
        .into_iter()
        .collect();

        let mut seen = HashSet::new();
        for candidate in listed {
            if !fresh.contains(&candidate.id) {
                plan.already_delivered += 1;
            } else if seen.insert(candidate.id.clone()) {
                plan.pending.push(candidate);
            } else {
                plan.duplicates += 1;
            }
        }
    }
    plan
}

/// Hands out one semaphore per source
///
/// Sources never share permits, so a slow source cannot starve another.
pub struct Scheduler {
    width: usize,
    semaphores: HashMap<String, Arc<Semaphore>>,
}

impl Scheduler {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
            semaphores: HashMap::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Semaphore bounding the in-flight items of `source`
    pub fn permits_for(&mut self, source: &str) -> Arc<Semaphore> {
        let width = self.width;
        self.semaphores
            .entry(source.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(width)))
            .clone()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}
