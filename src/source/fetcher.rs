//! HTTP plumbing shared by the source adapters
//!
//! This module handles:
//! - Building HTTP clients with the configured user agent
//! - GET requests returning text or bytes
//! - Mapping transport failures and non-success statuses to [`FetchError`]

use crate::config::UserAgentConfig;
use crate::source::{FetchError, FetchResult};
use reqwest::{redirect::Policy, Client, RequestBuilder, Response};
use std::time::Duration;

/// Builds the client used for public pages
///
/// Redirects are followed, since editorial sites bounce between canonical
/// hosts.
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Builds the client used for authenticated sources
///
/// Redirects are not followed so cookies set on redirecting responses can be
/// captured, and so a bounce to the login page shows up as a 3xx status.
pub fn build_session_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Sends a prepared request and requires a 2xx status
pub(crate) async fn send_checked(request: RequestBuilder, url: &str) -> FetchResult<Response> {
    let response = request.send().await.map_err(|source| FetchError::Http {
        url: url.to_string(),
        source,
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response)
}

/// GETs `url` and returns the body as text
pub(crate) async fn get_text(client: &Client, url: &str) -> FetchResult<String> {
    let response = send_checked(client.get(url), url).await?;
    read_text(response, url).await
}

/// GETs `url` and returns the raw body
pub(crate) async fn get_bytes(client: &Client, url: &str) -> FetchResult<Vec<u8>> {
    let response = send_checked(client.get(url), url).await?;
    read_bytes(response, url).await
}

pub(crate) async fn read_text(response: Response, url: &str) -> FetchResult<String> {
    response.text().await.map_err(|source| FetchError::Http {
        url: url.to_string(),
        source,
    })
}

pub(crate) async fn read_bytes(response: Response, url: &str) -> FetchResult<Vec<u8>> {
    response
        .bytes()
        .await
        .map(|bytes| bytes.to_vec())
        .map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })
}
