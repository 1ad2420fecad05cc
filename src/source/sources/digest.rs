//! Authenticated book digest source
//!
//! The "new books" listing is paginated HTML behind a member login. Each book
//! is downloaded as a ready-made file through a form POST that carries the
//! session cookie.

use crate::delivery::FormatPolicy;
use crate::source::article::selector;
use crate::source::fetcher::{read_bytes, read_text};
use crate::source::{
    Attachment, Candidate, Document, FetchError, FetchResult, FileKind, SourceAdapter,
    SourceContext,
};
use crate::session::SessionContext;
use async_trait::async_trait;
use encoding_rs::EUC_KR;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, COOKIE, REFERER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use scraper::{ElementRef, Html};
use url::Url;

pub const DIGEST_SOURCE: &str = "digest";
pub const DIGEST_BASE_URL: &str = "http://digest.mk.co.kr";

/// Content dates are stamped in Korea Standard Time
const KST_OFFSET_HOURS: i64 = 9;

const CATEGORIES: &[FileKind] = &[FileKind::Book, FileKind::Audiobook];

/// One parsed page of the "new books" listing
#[derive(Debug, Clone, PartialEq, Eq)]
struct ListingPage {
    ids: Vec<String>,
    last_page: Option<u32>,
}

pub struct DigestSource {
    client: Client,
    base_url: String,
    policy: FormatPolicy,
}

impl DigestSource {
    /// `client` must not follow redirects; see
    /// [`build_session_client`](crate::source::build_session_client).
    pub fn new(client: Client, policy: FormatPolicy) -> Self {
        Self {
            client,
            base_url: DIGEST_BASE_URL.to_string(),
            policy,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn listing_url(&self) -> String {
        format!("{}/sub/digest/newbooklist.asp", self.base_url)
    }

    fn download_url(&self) -> String {
        format!("{}/Sub/Digest/DownLoad.asp", self.base_url)
    }

    /// Book type requested from the download endpoint
    fn book_type(&self) -> &'static str {
        match self.policy {
            FormatPolicy::PassThrough => "pdf",
            _ => "doc",
        }
    }

    async fn get_listing_page(&self, url: &str, session: &SessionContext) -> FetchResult<ListingPage> {
        let response = send_authorized(self.client.get(url), url, session).await?;
        let html = read_text(response, url).await?;
        parse_listing(&html, url)
    }

    async fn list_books(&self, session: &SessionContext) -> FetchResult<Vec<Candidate>> {
        let first_url = self.listing_url();
        let first = match self.get_listing_page(&first_url, session).await {
            Ok(page) => page,
            Err(e) if e.is_unauthorized() => return Err(e),
            Err(e) => {
                tracing::warn!("Book listing unavailable, treating as empty: {}", e);
                return Ok(Vec::new());
            }
        };

        let mut ids = first.ids;
        let mut last_page = first.last_page.unwrap_or(1);
        let mut page = 1;

        while page < last_page {
            page += 1;
            let url = format!("{}?Type=T&page={}", first_url, page);
            match self.get_listing_page(&url, session).await {
                Ok(listing) => {
                    ids.extend(listing.ids);
                    if let Some(reported) = listing.last_page {
                        last_page = last_page.max(reported);
                    }
                }
                Err(e) if e.is_unauthorized() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        "Book listing truncated at page {} of {}; later pages are picked up next run: {}",
                        page,
                        last_page,
                        e
                    );
                    break;
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        Ok(ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .map(|id| Candidate::new(FileKind::Book, id))
            .collect())
    }

    async fn download_book(
        &self,
        candidate: &Candidate,
        session: &SessionContext,
        ctx: &SourceContext<'_>,
    ) -> FetchResult<Document> {
        let url = self.download_url();
        let request = self
            .client
            .post(&url)
            .header(REFERER, self.listing_url())
            .form(&[
                ("book_sno", candidate.id.as_str()),
                ("book_type", self.book_type()),
            ]);
        let response = send_authorized(request, &url, session).await?;

        let file_name = attachment_file_name(response.headers())
            .ok_or_else(|| FetchError::missing("Content-Disposition filename", &url))?;
        let (stem, extension) = split_file_name(&file_name);
        let extension = extension.unwrap_or_else(|| format!(".{}", self.book_type()));

        let bytes = read_bytes(response, &url).await?;
        if bytes.is_empty() {
            return Err(FetchError::missing("book payload", &url));
        }

        Ok(Document {
            source: DIGEST_SOURCE.to_string(),
            category: FileKind::Book,
            collection: DIGEST_SOURCE.to_string(),
            id: candidate.id.clone(),
            title: stem.clone(),
            date: ctx.today_at(KST_OFFSET_HOURS),
            file_stem: stem,
            lang: Some("ko".to_string()),
            reference_url: None,
            body: Vec::new(),
            illustration: None,
            original: Some(Attachment { bytes, extension }),
        })
    }
}

#[async_trait]
impl SourceAdapter for DigestSource {
    fn name(&self) -> &str {
        DIGEST_SOURCE
    }

    fn categories(&self) -> &[FileKind] {
        CATEGORIES
    }

    fn requires_session(&self) -> bool {
        true
    }

    async fn list_candidates(&self, ctx: &SourceContext<'_>) -> FetchResult<Vec<Candidate>> {
        let session = ctx
            .session
            .ok_or_else(|| FetchError::SessionRequired(DIGEST_SOURCE.to_string()))?;

        // The listing is the new-books list itself, so both modes page through it.
        let candidates = self.list_books(session).await?;
        tracing::debug!("Audiobook listing is not offered, yielding no candidates");
        Ok(candidates)
    }

    async fn fetch_one(
        &self,
        candidate: &Candidate,
        ctx: &SourceContext<'_>,
    ) -> FetchResult<Document> {
        let session = ctx
            .session
            .ok_or_else(|| FetchError::SessionRequired(DIGEST_SOURCE.to_string()))?;
        if !session.is_valid_at(ctx.now) {
            return Err(FetchError::Unauthorized("session expired".to_string()));
        }

        match candidate.category {
            FileKind::Book => self.download_book(candidate, session, ctx).await,
            other => Err(FetchError::Malformed {
                url: self.base_url.clone(),
                message: format!("category '{}' is not downloadable", other),
            }),
        }
    }
}

/// Sends `request` with the session cookie
///
/// A redirect (bounce to the login page), 401 or 403 means the session is no
/// longer accepted.
async fn send_authorized(
    request: RequestBuilder,
    url: &str,
    session: &SessionContext,
) -> FetchResult<Response> {
    let request = match session.cookie_header() {
        Some(cookie) => request.header(COOKIE, cookie),
        None => request,
    };
    let response = request.send().await.map_err(|source| FetchError::Http {
        url: url.to_string(),
        source,
    })?;

    let status = response.status();
    if status.is_redirection()
        || status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
    {
        return Err(FetchError::Unauthorized(format!("HTTP {} from {}", status.as_u16(), url)));
    }
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response)
}

fn parse_listing(html: &str, page_url: &str) -> FetchResult<ListingPage> {
    let document = Html::parse_document(html);
    let bodybox = selector("div.bodybox", page_url)?;
    let root = document
        .select(&bodybox)
        .next()
        .ok_or_else(|| FetchError::missing("div.bodybox", page_url))?;

    let book_title = selector("span.booktitle", page_url)?;
    let mut ids = Vec::new();
    for span in root.select(&book_title) {
        let href = span
            .parent()
            .and_then(ElementRef::wrap)
            .and_then(|parent| parent.value().attr("href"));
        match href.and_then(|href| query_param(page_url, href, "book_sno")) {
            Some(id) if !id.is_empty() => ids.push(id),
            _ => tracing::warn!("Skipping book entry without book_sno on {}", page_url),
        }
    }

    let link = selector("a", page_url)?;
    let last_page = root
        .select(&link)
        .last()
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| query_param(page_url, href, "page"))
        .and_then(|page| page.parse::<u32>().ok());

    Ok(ListingPage { ids, last_page })
}

fn query_param(base: &str, href: &str, key: &str) -> Option<String> {
    let url = Url::parse(base).ok()?.join(href).ok()?;
    url.query_pairs()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())
}

/// File name from `Content-Disposition`, decoded as UTF-8 or EUC-KR
fn attachment_file_name(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(CONTENT_DISPOSITION)?.as_bytes();
    let decoded = match std::str::from_utf8(raw) {
        Ok(text) => text.to_string(),
        Err(_) => EUC_KR.decode(raw).0.into_owned(),
    };

    let start = decoded.find("filename=")? + "filename=".len();
    let value = decoded[start..]
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches('"');
    let name = value.rsplit(['/', '\\']).next().unwrap_or(value);
    (!name.is_empty()).then(|| name.to_string())
}

/// Splits at the last dot; dots left in the stem are removed
fn split_file_name(name: &str) -> (String, Option<String>) {
    match name.rfind('.') {
        Some(index) if index > 0 => (
            name[..index].replace('.', ""),
            Some(name[index..].to_string()),
        ),
        _ => (name.replace('.', ""), None),
    }
}
