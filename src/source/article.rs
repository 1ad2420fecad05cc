//! HTML article extraction
//!
//! Parsing is synchronous and returns owned data so no parsed document is
//! held across an await point.

use crate::source::{FetchError, FetchResult, Illustration};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Pieces of an article page
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ArticleParts {
    pub title: String,
    pub body: Vec<String>,
    pub figure: Option<FigureRef>,
}

/// Location of the lead image and its caption
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FigureRef {
    pub image_url: String,
    pub caption: String,
}

/// Parses a CSS selector, reporting failures against `url`
pub(crate) fn selector(css: &str, url: &str) -> FetchResult<Selector> {
    Selector::parse(css).map_err(|e| FetchError::Malformed {
        url: url.to_string(),
        message: format!("bad selector '{}': {:?}", css, e),
    })
}

/// Collapses runs of whitespace inside an element's text
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Paragraph filter dropping text inside the "scrap" modal boxes
///
/// A paragraph is dropped when its parent's first class is
/// `scrap-modal-comp`; paragraphs whose parent has no class are kept.
pub(crate) fn outside_scrap_modal(paragraph: &ElementRef<'_>, _text: &str) -> bool {
    paragraph
        .parent()
        .and_then(ElementRef::wrap)
        .and_then(|parent| parent.value().attr("class"))
        .and_then(|class| class.split_whitespace().next())
        .map(|first| first != "scrap-modal-comp")
        .unwrap_or(true)
}

/// Last non-empty path segment of `href` resolved against `base`
pub(crate) fn last_path_segment(base: &str, href: &str) -> Option<String> {
    let url = Url::parse(base).ok()?.join(href).ok()?;
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(|segment| segment.to_string())
}

/// Extracts title, paragraphs and lead figure from an article page
///
/// # Arguments
///
/// * `html` - Page content
/// * `container` - CSS selector of the element holding the article
/// * `url` - Page URL, used to resolve the image and in errors
/// * `keep` - Paragraph filter; receives the `<p>` element and its text
///
/// # Returns
///
/// * `Ok(ArticleParts)` - Title and at least one paragraph were found
/// * `Err(FetchError::MissingField)` - Container, title or body missing
pub(crate) fn extract_article<F>(
    html: &str,
    container: &str,
    url: &str,
    with_figure: bool,
    keep: F,
) -> FetchResult<ArticleParts>
where
    F: Fn(&ElementRef<'_>, &str) -> bool,
{
    let document = Html::parse_document(html);
    let container_selector = selector(container, url)?;
    let root = document
        .select(&container_selector)
        .next()
        .ok_or_else(|| FetchError::missing("article container", url))?;

    let h1 = selector("h1", url)?;
    let title = root
        .select(&h1)
        .next()
        .or_else(|| document.select(&h1).next())
        .map(|element| element_text(&element))
        .filter(|title| !title.is_empty())
        .ok_or_else(|| FetchError::missing("title", url))?;

    let paragraph = selector("p", url)?;
    let body: Vec<String> = root
        .select(&paragraph)
        .filter_map(|element| {
            let text = element_text(&element);
            (!text.is_empty() && keep(&element, &text)).then_some(text)
        })
        .collect();
    if body.is_empty() {
        return Err(FetchError::missing("body", url));
    }

    let figure = if with_figure {
        extract_figure(&root, url)?
    } else {
        None
    };

    Ok(ArticleParts {
        title,
        body,
        figure,
    })
}

fn extract_figure(root: &ElementRef<'_>, url: &str) -> FetchResult<Option<FigureRef>> {
    let figure_selector = selector("figure", url)?;
    let img = selector("img", url)?;
    let figcaption = selector("figcaption", url)?;

    let Some(figure) = root.select(&figure_selector).next() else {
        return Ok(None);
    };
    let Some(image) = figure.select(&img).next() else {
        return Ok(None);
    };
    let Some(src) = image
        .value()
        .attr("src")
        .or_else(|| image.value().attr("data-src"))
    else {
        return Ok(None);
    };

    let caption = figure
        .select(&figcaption)
        .next()
        .map(|element| element_text(&element))
        .or_else(|| image.value().attr("alt").map(|alt| alt.trim().to_string()))
        .unwrap_or_default();

    Ok(resolve_image_url(src, url).map(|image_url| FigureRef { image_url, caption }))
}

/// Resolves an image reference found on the page at `page_url`
pub(crate) fn resolve_image_url(src: &str, page_url: &str) -> Option<String> {
    let src = src.trim();
    if src.is_empty() || src.starts_with("data:") {
        return None;
    }
    if let Some(rest) = src.strip_prefix("//") {
        return Some(format!("https://{}", rest));
    }
    let base = Url::parse(page_url).ok()?;
    base.join(src).ok().map(|url| url.to_string())
}

/// Extension of the image at `url`, including the dot
pub(crate) fn image_extension(url: &str) -> String {
    let path = Url::parse(url)
        .map(|url| url.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    let extension = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some(ext @ ("jpg" | "jpeg" | "png" | "gif" | "webp")) => format!(".{}", ext),
        _ => ".jpg".to_string(),
    }
}

/// Downloads the lead image
///
/// A missing image never fails the document; the failure is logged and the
/// document is delivered without it.
pub(crate) async fn fetch_illustration(client: &Client, figure: &FigureRef) -> Option<Illustration> {
    match crate::source::fetcher::get_bytes(client, &figure.image_url).await {
        Ok(bytes) => Some(Illustration {
            bytes,
            caption: figure.caption.clone(),
            extension: image_extension(&figure.image_url),
        }),
        Err(e) => {
            tracing::warn!("Illustration {} unavailable: {}", figure.image_url, e);
            None
        }
    }
}
