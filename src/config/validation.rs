use crate::config::types::{
    Config, NotifyConfig, RenderCommand, RunConfig, SourcesConfig, StorageBackend, StorageConfig,
    UserAgentConfig,
};
use crate::delivery::OutputFormat;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_run_config(&config.run)?;
    validate_render_coverage(config)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_storage_config(&config.storage)?;
    if let Some(command) = &config.render.a4 {
        validate_render_command("a4", command)?;
    }
    if let Some(command) = &config.render.kindle {
        validate_render_command("kindle", command)?;
    }
    validate_sources_config(&config.sources)?;
    validate_notify_config(&config.notify)?;
    Ok(())
}

/// Validates run configuration
fn validate_run_config(config: &RunConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 16 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 16, got {}",
            config.concurrency
        )));
    }

    if config.working_dir.trim().is_empty() {
        return Err(ConfigError::Validation(
            "working-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Checks that every format the policy asks for has a renderer
pub fn validate_render_coverage(config: &Config) -> Result<(), ConfigError> {
    for format in config.run.format.formats() {
        let command = match format {
            OutputFormat::Original => continue,
            OutputFormat::A4 => &config.render.a4,
            OutputFormat::Kindle => &config.render.kindle,
        };
        if command.is_none() {
            return Err(ConfigError::Validation(format!(
                "format '{}' needs a [render.{}] command",
                config.run.format, format
            )));
        }
    }
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.name.is_empty() {
        return Err(ConfigError::Validation(
            "user-agent name cannot be empty".to_string(),
        ));
    }

    if !config
        .name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "user-agent name must contain only letters, digits, hyphens and underscores, got '{}'",
            config.name
        )));
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    match config.backend {
        None => {
            return Err(ConfigError::NoStorageBackend(
                "no storage backend selected".to_string(),
            ))
        }
        Some(StorageBackend::Local) => {
            if config.local_root.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "local-root cannot be empty".to_string(),
                ));
            }
        }
        Some(StorageBackend::Dropbox) => {
            let has_token = config
                .token
                .as_deref()
                .map(|token| !token.trim().is_empty())
                .unwrap_or(false);
            if !has_token {
                return Err(ConfigError::NoStorageBackend(
                    "dropbox backend requires an access token".to_string(),
                ));
            }
            validate_url("api-base", &config.api_base)?;
            validate_url("content-base", &config.content_base)?;
        }
    }

    if config.allow_local_backup && config.backup_root.trim().is_empty() {
        return Err(ConfigError::Validation(
            "backup-root cannot be empty when local backup is enabled".to_string(),
        ));
    }

    Ok(())
}

fn validate_render_command(format: &str, command: &RenderCommand) -> Result<(), ConfigError> {
    if command.program.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "render.{} program cannot be empty",
            format
        )));
    }
    Ok(())
}

/// Validates per-source settings
fn validate_sources_config(config: &SourcesConfig) -> Result<(), ConfigError> {
    let digest = &config.digest;
    if digest.enabled {
        let filled = |value: &Option<String>| value.as_deref().map(|v| !v.is_empty()).unwrap_or(false);
        if !filled(&digest.username) || !filled(&digest.password) {
            return Err(ConfigError::MissingCredentials("digest".to_string()));
        }
    }
    for (name, base) in [
        ("sources.digest.base-url", &digest.base_url),
        ("sources.digest.member-base-url", &digest.member_base_url),
        ("sources.asahi.base-url", &config.asahi.base_url),
        ("sources.yomiuri.base-url", &config.yomiuri.base_url),
        ("sources.new-yorker.base-url", &config.new_yorker.base_url),
    ] {
        if let Some(base) = base {
            validate_url(name, base)?;
        }
    }
    Ok(())
}

fn validate_notify_config(config: &NotifyConfig) -> Result<(), ConfigError> {
    if let Some(url) = &config.webhook_url {
        validate_url("notify.webhook-url", url)?;
    }
    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "notify.timeout-secs must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("{} '{}': {}", field, value, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must be http or https, got '{}'",
            field, value
        )));
    }
    Ok(())
}
