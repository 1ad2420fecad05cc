use crate::delivery::FormatPolicy;
use crate::source::ListMode;
use serde::Deserialize;
use std::str::FromStr;

/// Main configuration structure for PDF Concierge
///
/// Every section is optional; missing keys take their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub run: RunConfig,
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
    pub render: RenderConfig,
    pub sources: SourcesConfig,
    pub notify: NotifyConfig,
}

/// Run behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RunConfig {
    /// Which candidates to list (`new` or `all`)
    pub mode: ListMode,

    /// Output format policy (`pass-through`, `a4`, `kindle`, `all`)
    pub format: FormatPolicy,

    /// Load the history from storage at startup
    pub use_history: bool,

    /// Write the history back at the end of the run
    pub persist_history: bool,

    /// Maximum items in flight per source
    pub concurrency: usize,

    /// Directory for intermediate files and artifacts awaiting upload
    pub working_dir: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: ListMode::New,
            format: FormatPolicy::PassThrough,
            use_history: true,
            persist_history: true,
            concurrency: 3,
            working_dir: "./work".to_string(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    pub name: String,
    pub version: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            name: "pdf-concierge".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Formats the `User-Agent` header value
    pub fn header_value(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }
}

/// Storage backends that can be selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    Local,
    Dropbox,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Dropbox => "dropbox",
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "dropbox" => Ok(Self::Dropbox),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Primary backend; required
    pub backend: Option<StorageBackend>,

    /// Root of the local backend (`downloads/` and `history.yml` live here)
    pub local_root: String,

    /// Access token of the remote backend
    pub token: Option<String>,

    /// Folder of the remote backend that holds uploads and the history
    pub remote_root: String,

    /// Also copy every artifact to a local backup (remote primaries only)
    pub allow_local_backup: bool,

    /// Root of the local backup
    pub backup_root: String,

    /// Remote RPC endpoint base
    pub api_base: String,

    /// Remote content endpoint base
    pub content_base: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: None,
            local_root: ".".to_string(),
            token: None,
            remote_root: "/concierge".to_string(),
            allow_local_backup: false,
            backup_root: "./backup".to_string(),
            api_base: "https://api.dropboxapi.com".to_string(),
            content_base: "https://content.dropboxapi.com".to_string(),
        }
    }
}

/// External render commands, one per converted format
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RenderConfig {
    pub a4: Option<RenderCommand>,
    pub kindle: Option<RenderCommand>,
}

/// A command line with `{input}` and `{output}` placeholders
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RenderCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Per-source switches
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SourcesConfig {
    pub digest: DigestSourceConfig,
    pub asahi: EditorialSourceConfig,
    pub yomiuri: EditorialSourceConfig,
    pub new_yorker: EditorialSourceConfig,
}

/// Authenticated book digest source
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DigestSourceConfig {
    pub enabled: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Overrides the digest content host
    pub base_url: Option<String>,
    /// Overrides the member login host
    pub member_base_url: Option<String>,
}

/// Public editorial source
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EditorialSourceConfig {
    pub enabled: bool,
    /// Overrides the site host
    pub base_url: Option<String>,
}

/// Notification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NotifyConfig {
    /// POST a JSON summary here when the history changed
    pub webhook_url: Option<String>,

    /// Webhook request timeout (seconds)
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}
