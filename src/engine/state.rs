/// Run phase definitions
///
/// A run moves strictly forward through these phases, one step at a time.
use crate::ConciergeError;
use std::fmt;

/// Phase of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunPhase {
    /// History loaded and seeded, start digest computed
    Init,
    /// Sources are being asked for candidates
    Listing,
    /// Item tasks are being submitted
    Dispatching,
    /// Finished tasks are merged into the history
    Collecting,
    /// History persisted, end digest computed
    Finalized,
}

impl RunPhase {
    /// The phase that follows this one, if any
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::Listing),
            Self::Listing => Some(Self::Dispatching),
            Self::Dispatching => Some(Self::Collecting),
            Self::Collecting => Some(Self::Finalized),
            Self::Finalized => None,
        }
    }

    pub fn can_transition_to(&self, to: RunPhase) -> bool {
        self.next() == Some(to)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Listing => "listing",
            Self::Dispatching => "dispatching",
            Self::Collecting => "collecting",
            Self::Finalized => "finalized",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the current phase and rejects out-of-order transitions
#[derive(Debug)]
pub struct RunState {
    phase: RunPhase,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Init,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn advance(&mut self, to: RunPhase) -> Result<(), ConciergeError> {
        if !self.phase.can_transition_to(to) {
            return Err(ConciergeError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        tracing::debug!("Run phase {} -> {}", self.phase, to);
        self.phase = to;
        Ok(())
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
