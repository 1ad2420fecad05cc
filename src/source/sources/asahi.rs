//! Asahi Shimbun editorials
//!
//! Listed through a JSON feed; each article is an HTML page whose `<main>`
//! holds the headline, lead figure and paragraphs.

use crate::source::article::{extract_article, fetch_illustration};
use crate::source::fetcher::{get_text, read_text, send_checked};
use crate::source::{
    Candidate, Document, FetchError, FetchResult, FileKind, SourceAdapter, SourceContext,
};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::header::REFERER;
use reqwest::Client;
use serde::Deserialize;

pub const ASAHI_SOURCE: &str = "asahi";
pub const ASAHI_LISTING_URL: &str = "https://www.asahicom.jp/rensai/json/da16.json";
pub const ASAHI_SITE_URL: &str = "https://www.asahi.com";

const JST_OFFSET_HOURS: i64 = 9;
const TITLE_MARKER: &str = "（社説）";

const CATEGORIES: &[FileKind] = &[FileKind::Editorial];

#[derive(Debug, Deserialize)]
struct EditorialFeed {
    #[serde(default)]
    items: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    id: Option<String>,
    release_date: Option<String>,
}

pub struct AsahiSource {
    client: Client,
    listing_url: String,
    site_url: String,
}

impl AsahiSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            listing_url: ASAHI_LISTING_URL.to_string(),
            site_url: ASAHI_SITE_URL.to_string(),
        }
    }

    /// Points both the feed and the article pages at `base_url`
    ///
    /// The feed is then expected at `{base_url}/rensai/json/da16.json`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base = base_url.into().trim_end_matches('/').to_string();
        self.listing_url = format!("{}/rensai/json/da16.json", base);
        self.site_url = base;
        self
    }

    fn article_url(&self, id: &str) -> String {
        format!(
            "{}/articles/{}.html?iref=pc_rensai_long_16_article",
            self.site_url, id
        )
    }

    async fn fetch_feed(&self) -> FetchResult<EditorialFeed> {
        let request = self.client.get(&self.listing_url).header(REFERER, &self.site_url);
        let response = send_checked(request, &self.listing_url).await?;
        let text = read_text(response, &self.listing_url).await?;
        serde_json::from_str(&text).map_err(|e| FetchError::Malformed {
            url: self.listing_url.clone(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl SourceAdapter for AsahiSource {
    fn name(&self) -> &str {
        ASAHI_SOURCE
    }

    fn categories(&self) -> &[FileKind] {
        CATEGORIES
    }

    async fn list_candidates(&self, ctx: &SourceContext<'_>) -> FetchResult<Vec<Candidate>> {
        let feed = match self.fetch_feed().await {
            Ok(feed) => feed,
            Err(e) => {
                tracing::warn!("Asahi listing unavailable, treating as empty: {}", e);
                return Ok(Vec::new());
            }
        };

        let today = ctx.today_at(JST_OFFSET_HOURS);
        let mut candidates = Vec::new();
        for item in feed.items {
            let Some(id) = item.id.filter(|id| !id.is_empty()) else {
                tracing::warn!("Skipping Asahi entry without id");
                continue;
            };
            let released = item
                .release_date
                .as_deref()
                .and_then(|date| NaiveDateTime::parse_from_str(date, "%Y%m%d%H%M%S").ok())
                .map(|datetime| datetime.date());
            let Some(released) = released else {
                tracing::warn!("Skipping Asahi entry {} with unreadable release date", id);
                continue;
            };
            if ctx.mode.admits(Some(released), today) {
                candidates.push(Candidate::new(FileKind::Editorial, id).published(released));
            }
        }
        Ok(candidates)
    }

    async fn fetch_one(
        &self,
        candidate: &Candidate,
        ctx: &SourceContext<'_>,
    ) -> FetchResult<Document> {
        let url = self.article_url(candidate.id.as_str());
        let html = get_text(&self.client, &url).await?;
        let parts = extract_article(&html, "main", &url, true, |_, text| !text.ends_with('分'))?;

        let illustration = match &parts.figure {
            Some(figure) => fetch_illustration(&self.client, figure).await,
            None => None,
        };

        let title = parts.title.replace(TITLE_MARKER, "").trim().to_string();
        if title.is_empty() {
            return Err(FetchError::missing("title", &url));
        }
        let date = candidate
            .published
            .unwrap_or_else(|| ctx.today_at(JST_OFFSET_HOURS));

        Ok(Document {
            source: ASAHI_SOURCE.to_string(),
            category: FileKind::Editorial,
            collection: ASAHI_SOURCE.to_string(),
            id: candidate.id.clone(),
            file_stem: Document::editorial_stem(date, &title),
            title,
            date,
            lang: Some("ja".to_string()),
            reference_url: Some(url),
            body: parts.body,
            illustration,
            original: None,
        })
    }
}
