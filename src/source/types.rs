use crate::history::CandidateId;
use crate::session::SessionContext;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of document a category holds
///
/// The kind doubles as the history category name and as the first segment of
/// every upload destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileKind {
    Book,
    Audiobook,
    Editorial,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Audiobook => "audiobook",
            Self::Editorial => "editorial",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "book" => Ok(Self::Book),
            "audiobook" => Ok(Self::Audiobook),
            "editorial" => Ok(Self::Editorial),
            other => Err(format!("unknown file kind '{}'", other)),
        }
    }
}

/// Which candidates a listing should return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ListMode {
    /// Only items dated at or after the current processing date
    #[default]
    New,
    /// Every item reachable through pagination
    All,
}

impl ListMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::All => "all",
        }
    }

    /// Parses a mode name, falling back to `New` for anything unknown
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Self::All,
            _ => Self::New,
        }
    }

    /// Whether an item published on `published` passes this mode's date rule
    pub fn admits(&self, published: Option<NaiveDate>, today: NaiveDate) -> bool {
        match self {
            Self::All => true,
            Self::New => published.map(|date| date >= today).unwrap_or(false),
        }
    }
}

/// A listed item that may or may not have been delivered already
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub category: FileKind,
    pub id: CandidateId,
    /// Publication date if the listing carries one
    pub published: Option<NaiveDate>,
}

impl Candidate {
    pub fn new(category: FileKind, id: impl Into<CandidateId>) -> Self {
        Self {
            category,
            id: id.into(),
            published: None,
        }
    }

    pub fn published(mut self, date: NaiveDate) -> Self {
        self.published = Some(date);
        self
    }
}

/// Per-call context handed to adapters
#[derive(Debug, Clone, Copy)]
pub struct SourceContext<'a> {
    pub mode: ListMode,
    /// Processing instant of the run
    pub now: DateTime<Utc>,
    /// Session of the adapter's source, if it has one
    pub session: Option<&'a SessionContext>,
}

impl<'a> SourceContext<'a> {
    /// Processing date in a source's fixed UTC offset
    pub fn today_at(&self, offset_hours: i64) -> NaiveDate {
        (self.now + Duration::hours(offset_hours)).date_naive()
    }
}

/// An image shown with an article
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Illustration {
    pub bytes: Vec<u8>,
    pub caption: String,
    /// Extension including the dot, e.g. `.jpg`
    pub extension: String,
}

/// A file delivered by the source as-is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub bytes: Vec<u8>,
    /// Extension including the dot, e.g. `.pdf`
    pub extension: String,
}

/// A fully assembled item, ready for conversion
///
/// Produced by an adapter, consumed once by the delivery pipeline and then
/// dropped. Adapters never hand out partially assembled documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source: String,
    pub category: FileKind,
    /// Destination category (folder) the artifacts go to
    pub collection: String,
    pub id: CandidateId,
    pub title: String,
    pub date: NaiveDate,
    /// File name without extension, before normalization
    pub file_stem: String,
    pub lang: Option<String>,
    pub reference_url: Option<String>,
    /// Ordered text blocks
    pub body: Vec<String>,
    pub illustration: Option<Illustration>,
    /// Original payload when the source serves a ready-made file
    pub original: Option<Attachment>,
}

impl Document {
    /// File stem used for editorials: `{date}_{title}` with blanks as dashes
    pub fn editorial_stem(date: NaiveDate, title: &str) -> String {
        let title = title
            .split(|c: char| c.is_whitespace() || c == '\u{3000}')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        format!("{}_{}", date.format("%Y-%m-%d"), title)
    }
}
