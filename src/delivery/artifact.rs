use crate::delivery::OutputFormat;
use crate::source::FileKind;
use std::path::PathBuf;

/// Characters never allowed in a delivered file or folder name
const UNSAFE_CHARS: &[char] = &['/', '\\', '"', '\'', ':', '*', '?', '<', '>', '|'];

/// One deliverable output file
///
/// Created by the delivery pipeline and owned by the caller until it has been
/// handed to the sinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Where the payload sits in working storage
    pub path: PathBuf,
    pub kind: FileKind,
    /// Destination category (folder)
    pub category: String,
    /// Normalized file name without extension
    pub display_name: String,
    /// Extension including the dot
    pub extension: String,
    pub format: OutputFormat,
}

impl Artifact {
    pub fn file_name(&self) -> String {
        format!("{}{}", self.display_name, self.extension)
    }

    /// Upload path relative to a sink root: `{kind}/{category}/{name}{ext}`
    pub fn destination(&self) -> String {
        format!(
            "{}/{}/{}",
            self.kind,
            normalize_filename(&self.category),
            self.file_name()
        )
    }
}

/// Strips characters unsafe for file systems and remote stores
///
/// Path separators, quotes, colons, wildcards and control characters are
/// removed. A name left empty becomes `untitled`.
pub fn normalize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !UNSAFE_CHARS.contains(c) && !c.is_control())
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').trim();
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned.to_string()
    }
}
