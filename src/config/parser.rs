use crate::config::types::{Config, StorageBackend};
use crate::config::validation::validate;
use crate::delivery::FormatPolicy;
use crate::source::ListMode;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Reads and parses a configuration file without validating it
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Parsed configuration, defaults filled in
/// * `Err(ConfigError)` - Failed to read or parse the file
fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Builds the configuration a run actually uses
///
/// Starts from the file at `path` (or defaults when `None`), applies the
/// process environment on top and validates the result.
pub fn load_effective_config(path: Option<&Path>) -> Result<(Config, Option<String>), ConfigError> {
    let (mut config, hash) = match path {
        Some(path) => (read_config_file(path)?, Some(compute_config_hash(path)?)),
        None => (Config::default(), None),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok((config, hash))
}

/// Applies `PDFC_*` overrides using `lookup` to read variables
///
/// Unknown mode and format names fall back to `new` and `pass-through`;
/// boolean switches are true only for a case-insensitive `true`. An
/// unrecognized storage name clears the backend so validation rejects it.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(mode) = lookup("PDFC_MODE") {
        config.run.mode = ListMode::parse_lenient(&mode);
    }
    if let Some(format) = lookup("PDFC_PDF_FORMAT") {
        config.run.format = FormatPolicy::parse_lenient(&format);
    }
    if let Some(value) = lookup("PDFC_USE_HISTORY") {
        config.run.use_history = is_true(&value);
    }
    if let Some(value) = lookup("PDFC_ALLOW_LOCAL_BACKUP") {
        config.storage.allow_local_backup = is_true(&value);
    }
    if let Some(storage) = lookup("PDFC_STORAGE") {
        config.storage.backend = storage.parse::<StorageBackend>().ok();
    }
    if let Some(token) = lookup("PDFC_CLOUD_TOKEN") {
        config.storage.token = Some(token);
    }
    if let Some(id) = lookup("PDFC_MK_ID").filter(|id| !id.is_empty()) {
        config.sources.digest.enabled = true;
        config.sources.digest.username = Some(id);
    }
    if let Some(password) = lookup("PDFC_MK_PW") {
        config.sources.digest.password = Some(password);
    }
}

fn is_true(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}
