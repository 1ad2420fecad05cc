//! Shared session of one authenticated source
//!
//! Item tasks hold a read guard for the duration of a fetch. Renewing takes
//! the write lock, so it waits for every in-flight fetch of the source to
//! finish and holds back new ones until the handshake is done.

use crate::session::{AuthError, Authenticator, Credentials, SessionContext};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};

#[derive(Debug, Default)]
struct SlotState {
    context: Option<SessionContext>,
    /// Bumped on every successful handshake
    generation: u64,
    renewals_left: u32,
    revoked: bool,
}

/// Session holder shared by all tasks of one source
pub struct SessionSlot {
    source: String,
    authenticator: Arc<dyn Authenticator>,
    credentials: Credentials,
    state: RwLock<SlotState>,
}

/// Read access to an established session
pub struct SessionGuard<'a> {
    context: RwLockReadGuard<'a, SessionContext>,
    generation: u64,
}

impl SessionGuard<'_> {
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl SessionSlot {
    /// One re-authentication is allowed per run
    pub fn new(
        source: impl Into<String>,
        authenticator: Arc<dyn Authenticator>,
        credentials: Credentials,
    ) -> Self {
        Self {
            source: source.into(),
            authenticator,
            credentials,
            state: RwLock::new(SlotState {
                renewals_left: 1,
                ..SlotState::default()
            }),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Runs the initial handshake
    ///
    /// A failure revokes the slot for the rest of the run.
    pub async fn establish(&self) -> Result<(), AuthError> {
        let mut state = self.state.write().await;
        if state.revoked {
            return Err(AuthError::Revoked(self.source.clone()));
        }
        if state.context.is_some() {
            return Ok(());
        }
        self.handshake(&mut state).await
    }

    /// Borrows the current session
    pub async fn read(&self) -> Result<SessionGuard<'_>, AuthError> {
        let state = self.state.read().await;
        if state.revoked {
            return Err(AuthError::Revoked(self.source.clone()));
        }
        let generation = state.generation;
        RwLockReadGuard::try_map(state, |state| state.context.as_ref())
            .map(|context| SessionGuard {
                context,
                generation,
            })
            .map_err(|_| AuthError::Revoked(self.source.clone()))
    }

    /// Replaces a session that was rejected
    ///
    /// `seen_generation` is the generation the caller was using. If another
    /// task already renewed past it, nothing is done. Once the renewal budget
    /// is spent, or the handshake fails, the slot is revoked and every later
    /// call fails with [`AuthError::Revoked`].
    pub async fn renew(&self, seen_generation: u64) -> Result<(), AuthError> {
        let mut state = self.state.write().await;
        if state.revoked {
            return Err(AuthError::Revoked(self.source.clone()));
        }
        if state.generation != seen_generation {
            return Ok(());
        }
        if state.renewals_left == 0 {
            tracing::error!("Session for {} rejected again after renewal, revoking", self.source);
            state.revoked = true;
            state.context = None;
            return Err(AuthError::Revoked(self.source.clone()));
        }

        state.renewals_left -= 1;
        tracing::info!("Renewing session for {}", self.source);
        self.handshake(&mut state).await
    }

    async fn handshake(&self, state: &mut SlotState) -> Result<(), AuthError> {
        match self.authenticator.establish(&self.credentials).await {
            Ok(context) => {
                state.context = Some(context);
                state.generation += 1;
                Ok(())
            }
            Err(e) => {
                state.revoked = true;
                state.context = None;
                Err(e)
            }
        }
    }
}
