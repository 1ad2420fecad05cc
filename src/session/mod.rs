//! Session module for sources behind a login
//!
//! This module contains:
//! - `CookieJar`: cumulative cookie store built from `Set-Cookie` headers
//! - `SessionContext`: an established, read-only authenticated handle
//! - `SessionManager`: the three-phase login handshake producing a context
//!
//! Sessions are never persisted and never renewed on their own. A caller that
//! sees an authorization failure re-runs [`Authenticator::establish`] and
//! retries the failed request exactly once.

mod cookies;
mod manager;

pub use cookies::CookieJar;
pub use manager::{
    AuthError, Authenticator, Credentials, HandshakePhase, SessionContext, SessionEndpoints,
    SessionManager, DEFAULT_SESSION_VALIDITY_MINUTES,
};
