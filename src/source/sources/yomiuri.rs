//! Yomiuri Shimbun editorials

use crate::source::article::{
    element_text, extract_article, last_path_segment, outside_scrap_modal, selector,
};
use crate::source::fetcher::get_text;
use crate::source::{
    Candidate, Document, FetchError, FetchResult, FileKind, SourceAdapter, SourceContext,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use scraper::{ElementRef, Html};

pub const YOMIURI_SOURCE: &str = "yomiuri";
pub const YOMIURI_BASE_URL: &str = "https://www.yomiuri.co.jp";

const JST_OFFSET_HOURS: i64 = 9;

const CATEGORIES: &[FileKind] = &[FileKind::Editorial];

pub struct YomiuriSource {
    client: Client,
    base_url: String,
}

impl YomiuriSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: YOMIURI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn listing_url(&self) -> String {
        format!("{}/editorial", self.base_url)
    }

    fn article_url(&self, id: &str) -> String {
        format!("{}/editorial/{}/", self.base_url, id)
    }
}

#[async_trait]
impl SourceAdapter for YomiuriSource {
    fn name(&self) -> &str {
        YOMIURI_SOURCE
    }

    fn categories(&self) -> &[FileKind] {
        CATEGORIES
    }

    async fn list_candidates(&self, ctx: &SourceContext<'_>) -> FetchResult<Vec<Candidate>> {
        let url = self.listing_url();
        let listed = match get_text(&self.client, &url).await {
            Ok(html) => parse_listing(&html, &url),
            Err(e) => Err(e),
        };
        let listed = match listed {
            Ok(listed) => listed,
            Err(e) => {
                tracing::warn!("Yomiuri listing unavailable, treating as empty: {}", e);
                return Ok(Vec::new());
            }
        };

        let today = ctx.today_at(JST_OFFSET_HOURS);
        Ok(listed
            .into_iter()
            .filter(|(_, date)| ctx.mode.admits(Some(*date), today))
            .map(|(id, date)| Candidate::new(FileKind::Editorial, id).published(date))
            .collect())
    }

    async fn fetch_one(
        &self,
        candidate: &Candidate,
        ctx: &SourceContext<'_>,
    ) -> FetchResult<Document> {
        let url = self.article_url(candidate.id.as_str());
        let html = get_text(&self.client, &url).await?;
        let parts = extract_article(&html, "article", &url, false, outside_scrap_modal)?;

        let date = candidate
            .published
            .unwrap_or_else(|| ctx.today_at(JST_OFFSET_HOURS));

        Ok(Document {
            source: YOMIURI_SOURCE.to_string(),
            category: FileKind::Editorial,
            collection: YOMIURI_SOURCE.to_string(),
            id: candidate.id.clone(),
            file_stem: Document::editorial_stem(date, &parts.title),
            title: parts.title,
            date,
            lang: Some("ja".to_string()),
            reference_url: Some(url),
            body: parts.body,
            illustration: None,
            original: None,
        })
    }
}

/// Extracts `(id, date)` pairs in listing order
///
/// Each `<time datetime>` in the editorial box dates one article; the link
/// sits under the time element's grandparent.
fn parse_listing(html: &str, page_url: &str) -> FetchResult<Vec<(String, NaiveDate)>> {
    let document = Html::parse_document(html);
    let container = selector("div.uni-news-editorial-jp", page_url)?;
    let root = document
        .select(&container)
        .next()
        .ok_or_else(|| FetchError::missing("div.uni-news-editorial-jp", page_url))?;

    let time = selector("time[datetime]", page_url)?;
    let link = selector("a[href]", page_url)?;
    let mut listed = Vec::new();

    for element in root.select(&time) {
        let datetime = element.value().attr("datetime").unwrap_or_default();
        let date = datetime
            .get(..10)
            .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok());
        let href = element
            .parent()
            .and_then(|parent| parent.parent())
            .and_then(ElementRef::wrap)
            .and_then(|scope| scope.select(&link).next())
            .and_then(|a| a.value().attr("href"));
        let id = href.and_then(|href| last_path_segment(page_url, href));

        match (id, date) {
            (Some(id), Some(date)) => {
                if !listed.iter().any(|(seen, _): &(String, NaiveDate)| seen == &id) {
                    listed.push((id, date));
                }
            }
            _ => tracing::warn!(
                "Skipping Yomiuri entry '{}' with unreadable link or date",
                element_text(&element)
            ),
        }
    }
    Ok(listed)
}
