use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which outputs a document is delivered in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FormatPolicy {
    /// The original payload, unmodified
    #[default]
    PassThrough,
    /// A4 PDF
    A4,
    /// PDF sized for e-readers
    Kindle,
    /// Every converted format; partial success allowed
    All,
}

impl FormatPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PassThrough => "pass-through",
            Self::A4 => "a4",
            Self::Kindle => "kindle",
            Self::All => "all",
        }
    }

    /// Parses a policy name, falling back to `PassThrough` for anything unknown
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "a4" => Self::A4,
            "kindle" => Self::Kindle,
            "all" => Self::All,
            _ => Self::PassThrough,
        }
    }

    /// Output formats requested by this policy, in delivery order
    pub fn formats(&self) -> &'static [OutputFormat] {
        match self {
            Self::PassThrough => &[OutputFormat::Original],
            Self::A4 => &[OutputFormat::A4],
            Self::Kindle => &[OutputFormat::Kindle],
            Self::All => &[OutputFormat::A4, OutputFormat::Kindle],
        }
    }

    /// Whether a failing format may be dropped while others succeed
    pub fn allows_partial(&self) -> bool {
        matches!(self, Self::All)
    }
}

impl fmt::Display for FormatPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One concrete output variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutputFormat {
    Original,
    A4,
    Kindle,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::A4 => "a4",
            Self::Kindle => "kindle",
        }
    }

    /// Appended to the display name so variants of one document do not collide
    pub fn name_suffix(&self) -> &'static str {
        match self {
            Self::Original => "",
            Self::A4 => "_a4",
            Self::Kindle => "_kindle",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
