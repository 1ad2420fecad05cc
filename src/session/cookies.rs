use reqwest::header::{HeaderMap, SET_COOKIE};
use std::collections::BTreeMap;

/// Cumulative cookie store
///
/// Cookies are keyed by name only; a later value for the same name overrides
/// the earlier one. Attributes (path, domain, expiry) are not tracked since a
/// session only ever talks to the hosts of its own handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: BTreeMap<String, String>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a jar from the `Set-Cookie` headers of a single response
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut jar = Self::new();
        jar.absorb(headers);
        jar
    }

    /// Merges every `Set-Cookie` header of a response into the jar
    pub fn absorb(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(SET_COOKIE) {
            let Ok(raw) = value.to_str() else {
                tracing::debug!("Ignoring non-ASCII Set-Cookie header");
                continue;
            };
            match parse_set_cookie(raw) {
                Some((name, Some(value))) => {
                    self.cookies.insert(name, value);
                }
                Some((name, None)) => {
                    self.cookies.remove(&name);
                }
                None => tracing::debug!("Ignoring malformed Set-Cookie header: {}", raw),
            }
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Renders the jar as a `Cookie` request header value
    pub fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Parses one `Set-Cookie` header into `(name, value)`
///
/// A `None` value means the server deleted the cookie (empty value or
/// `Max-Age=0`).
fn parse_set_cookie(raw: &str) -> Option<(String, Option<String>)> {
    let mut parts = raw.split(';');
    let pair = parts.next()?.trim();
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let value = value.trim().trim_matches('"');

    let expired = parts.any(|attr| {
        attr.split_once('=')
            .map(|(key, val)| key.trim().eq_ignore_ascii_case("max-age") && val.trim() == "0")
            .unwrap_or(false)
    });

    if value.is_empty() || expired {
        Some((name.to_string(), None))
    } else {
        Some((name.to_string(), Some(value.to_string())))
    }
}
