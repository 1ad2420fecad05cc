use crate::session::CookieJar;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{COOKIE, REFERER};
use reqwest::{Client, Response};
use std::fmt;
use thiserror::Error;

/// How long an established session is considered usable
pub const DEFAULT_SESSION_VALIDITY_MINUTES: i64 = 60;

/// Login credentials for an authenticated source
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// The ordered steps of the login handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    /// Credentials posted to the primary login endpoint
    Login,
    /// Credentials posted to the action endpoint; its cookies start the session
    Action,
    /// Authenticated GET of the index page
    WarmUpIndex,
    /// Authenticated GET of the login confirmation page
    WarmUpConfirm,
}

impl fmt::Display for HandshakePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Login => "login phase",
            Self::Action => "login action phase",
            Self::WarmUpIndex => "index warm-up",
            Self::WarmUpConfirm => "login confirmation warm-up",
        };
        f.write_str(name)
    }
}

/// Errors raised while establishing a session
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{phase} returned HTTP {status}")]
    Status { phase: HandshakePhase, status: u16 },

    #[error("{phase} request failed: {source}")]
    Request {
        phase: HandshakePhase,
        #[source]
        source: reqwest::Error,
    },

    #[error("handshake finished without a session cookie")]
    NoSessionCookie,

    #[error("session for source '{0}' was revoked after a failed renewal")]
    Revoked(String),
}

/// Endpoints used by the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEndpoints {
    /// Primary login endpoint (phase one)
    pub login: String,
    /// Secondary action endpoint (phase two)
    pub action: String,
    /// Index page fetched first during warm-up
    pub index: String,
    /// Login confirmation page fetched second during warm-up; also sent as
    /// the post-login redirect target
    pub confirm: String,
}

impl SessionEndpoints {
    /// Endpoints for a member host and a content host
    pub fn with_hosts(member_base: &str, content_base: &str) -> Self {
        let member = member_base.trim_end_matches('/');
        let content = content_base.trim_end_matches('/');
        Self {
            login: format!("{}/member_login_process.php", member),
            action: format!("{}/mem/v1/action.php", member),
            index: format!("{}/Main/Index.asp", content),
            confirm: format!("{}/loginAction.asp", content),
        }
    }

    /// Endpoints of the book digest service
    pub fn digest_defaults() -> Self {
        Self::with_hosts("https://member.mk.co.kr", "http://digest.mk.co.kr")
    }
}

/// An authenticated handle: cookies plus a validity window
///
/// Owned by the session layer and lent by reference to adapters. It is never
/// mutated once established.
#[derive(Debug, Clone)]
pub struct SessionContext {
    cookies: CookieJar,
    established_at: DateTime<Utc>,
    valid_for: Duration,
}

impl SessionContext {
    pub fn new(cookies: CookieJar, established_at: DateTime<Utc>, valid_for: Duration) -> Self {
        Self {
            cookies,
            established_at,
            valid_for,
        }
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// Value for the `Cookie` request header
    pub fn cookie_header(&self) -> Option<String> {
        self.cookies.header_value()
    }

    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.established_at + self.valid_for
    }

    /// Returns true until the validity window has elapsed at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }
}

/// Capability that produces a session from credentials
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Runs the full handshake
    ///
    /// Fails with `AuthError` if any phase returns a non-success status or no
    /// session cookie is produced.
    async fn establish(&self, credentials: &Credentials) -> Result<SessionContext, AuthError>;
}

/// Three-phase login handshake against a member site
///
/// 1. Credentials are posted to the login endpoint; the response is only
///    checked for success.
/// 2. Credentials are posted to the action endpoint; the cookies it sets
///    become the working session.
/// 3. The index and confirmation pages are fetched in sequence with the
///    session; cookies from each response are merged in.
///
/// The client should not follow redirects, otherwise cookies set on the
/// redirecting responses are lost. Redirect statuses count as success.
pub struct SessionManager {
    client: Client,
    endpoints: SessionEndpoints,
    valid_for: Duration,
}

impl SessionManager {
    pub fn new(client: Client, endpoints: SessionEndpoints) -> Self {
        Self {
            client,
            endpoints,
            valid_for: Duration::minutes(DEFAULT_SESSION_VALIDITY_MINUTES),
        }
    }

    pub fn with_validity(mut self, valid_for: Duration) -> Self {
        self.valid_for = valid_for;
        self
    }

    pub fn endpoints(&self) -> &SessionEndpoints {
        &self.endpoints
    }

    async fn login_phase(&self, credentials: &Credentials) -> Result<(), AuthError> {
        let phase = HandshakePhase::Login;
        let response = self
            .client
            .post(&self.endpoints.login)
            .form(&[
                ("user_id", credentials.username.as_str()),
                ("password", credentials.password()),
                ("successUrl", self.endpoints.confirm.as_str()),
            ])
            .send()
            .await
            .map_err(|source| AuthError::Request { phase, source })?;
        check_phase(phase, &response)?;
        Ok(())
    }

    async fn action_phase(&self, credentials: &Credentials) -> Result<CookieJar, AuthError> {
        let phase = HandshakePhase::Action;
        let response = self
            .client
            .post(&self.endpoints.action)
            .form(&[
                ("id", credentials.username.as_str()),
                ("pw", credentials.password()),
                ("c", "login_action"),
                ("successUrl", self.endpoints.confirm.as_str()),
            ])
            .send()
            .await
            .map_err(|source| AuthError::Request { phase, source })?;
        check_phase(phase, &response)?;
        Ok(CookieJar::from_headers(response.headers()))
    }

    async fn warm_up(
        &self,
        phase: HandshakePhase,
        url: &str,
        jar: &mut CookieJar,
    ) -> Result<(), AuthError> {
        let mut request = self.client.get(url).header(REFERER, &self.endpoints.index);
        if let Some(cookie) = jar.header_value() {
            request = request.header(COOKIE, cookie);
        }
        let response = request
            .send()
            .await
            .map_err(|source| AuthError::Request { phase, source })?;
        check_phase(phase, &response)?;
        jar.absorb(response.headers());
        Ok(())
    }
}

#[async_trait]
impl Authenticator for SessionManager {
    async fn establish(&self, credentials: &Credentials) -> Result<SessionContext, AuthError> {
        tracing::debug!("Starting login handshake for {}", credentials.username);

        self.login_phase(credentials).await?;
        let mut jar = self.action_phase(credentials).await?;

        self.warm_up(HandshakePhase::WarmUpIndex, &self.endpoints.index, &mut jar)
            .await?;
        self.warm_up(
            HandshakePhase::WarmUpConfirm,
            &self.endpoints.confirm,
            &mut jar,
        )
        .await?;

        if jar.is_empty() {
            return Err(AuthError::NoSessionCookie);
        }

        tracing::info!("Session established with {} cookies", jar.len());
        Ok(SessionContext::new(jar, Utc::now(), self.valid_for))
    }
}

fn check_phase(phase: HandshakePhase, response: &Response) -> Result<(), AuthError> {
    let status = response.status();
    if status.is_success() || status.is_redirection() {
        Ok(())
    } else {
        Err(AuthError::Status {
            phase,
            status: status.as_u16(),
        })
    }
}
