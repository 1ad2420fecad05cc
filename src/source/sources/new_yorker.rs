//! The New Yorker "Daily Comment" column

use crate::source::article::{
    extract_article, fetch_illustration, last_path_segment, outside_scrap_modal,
};
use crate::source::fetcher::{get_bytes, get_text};
use crate::source::{
    Candidate, Document, FetchError, FetchResult, FileKind, SourceAdapter, SourceContext,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Client;
use rss::Channel;

pub const NEW_YORKER_SOURCE: &str = "new-yorker";
pub const NEW_YORKER_BASE_URL: &str = "https://www.newyorker.com";

/// Publication dates are judged in US Eastern daylight time
const EDT_OFFSET_HOURS: i64 = -4;

const CATEGORIES: &[FileKind] = &[FileKind::Editorial];

pub struct NewYorkerSource {
    client: Client,
    base_url: String,
}

impl NewYorkerSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: NEW_YORKER_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn feed_url(&self) -> String {
        format!("{}/feed/news/daily-comment", self.base_url)
    }

    fn article_url(&self, slug: &str) -> String {
        format!("{}/news/daily-comment/{}", self.base_url, slug)
    }

    async fn fetch_feed(&self) -> FetchResult<Channel> {
        let url = self.feed_url();
        let bytes = get_bytes(&self.client, &url).await?;
        Channel::read_from(&bytes[..]).map_err(|e| FetchError::Malformed {
            url,
            message: e.to_string(),
        })
    }
}

/// Calendar date of an RFC 2822 timestamp in the column's time zone
fn publication_date(pub_date: &str) -> Option<NaiveDate> {
    let published = DateTime::parse_from_rfc2822(pub_date.trim()).ok()?;
    Some((published.with_timezone(&Utc) + Duration::hours(EDT_OFFSET_HOURS)).date_naive())
}

#[async_trait]
impl SourceAdapter for NewYorkerSource {
    fn name(&self) -> &str {
        NEW_YORKER_SOURCE
    }

    fn categories(&self) -> &[FileKind] {
        CATEGORIES
    }

    async fn list_candidates(&self, ctx: &SourceContext<'_>) -> FetchResult<Vec<Candidate>> {
        let channel = match self.fetch_feed().await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!("New Yorker feed unavailable, treating as empty: {}", e);
                return Ok(Vec::new());
            }
        };

        let feed_url = self.feed_url();
        let today = ctx.today_at(EDT_OFFSET_HOURS);
        let mut candidates: Vec<Candidate> = Vec::new();

        for item in channel.items() {
            let slug = item
                .link()
                .and_then(|link| last_path_segment(&feed_url, link));
            let date = item.pub_date().and_then(publication_date);
            let (Some(slug), Some(date)) = (slug, date) else {
                tracing::warn!(
                    "Skipping feed entry '{}' without link or publication date",
                    item.title().unwrap_or_default()
                );
                continue;
            };
            if !ctx.mode.admits(Some(date), today) {
                continue;
            }
            if candidates.iter().all(|c| c.id.as_str() != slug) {
                candidates.push(Candidate::new(FileKind::Editorial, slug).published(date));
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
        let parts = extract_article(&html, "article", &url, true, outside_scrap_modal)?;

        let illustration = match &parts.figure {
            Some(figure) => fetch_illustration(&self.client, figure).await,
            None => None,
        };
        let date = candidate
            .published
            .unwrap_or_else(|| ctx.today_at(EDT_OFFSET_HOURS));

        Ok(Document {
            source: NEW_YORKER_SOURCE.to_string(),
            category: FileKind::Editorial,
            collection: NEW_YORKER_SOURCE.to_string(),
            id: candidate.id.clone(),
            file_stem: Document::editorial_stem(date, &parts.title.to_lowercase()),
            title: parts.title,
            date,
            lang: Some("en".to_string()),
            reference_url: Some(url),
            body: parts.body,
            illustration,
            original: None,
        })
    }
}
