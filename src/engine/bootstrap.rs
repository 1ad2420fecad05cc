//! Wiring a [`RunEngine`] from a validated [`Config`]

use crate::config::{Config, RenderCommand};
use crate::delivery::{CommandRenderer, DeliveryPipeline, OutputFormat};
use crate::engine::{EngineOptions, RunEngine, SessionSlot};
use crate::notify::{LogNotifier, WebhookNotifier};
use crate::session::{Credentials, SessionEndpoints, SessionManager};
use crate::sink::resolve_sinks;
use crate::source::sources::{
    AsahiSource, DigestSource, NewYorkerSource, YomiuriSource, DIGEST_BASE_URL, DIGEST_SOURCE,
};
use crate::source::{build_http_client, build_session_client};
use crate::{ConfigError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Member host of the digest service's login handshake
const DIGEST_MEMBER_URL: &str = "https://member.mk.co.kr";

/// Builds the engine for one run
///
/// Sources are registered in a fixed order: digest, asahi, yomiuri,
/// new-yorker. Disabled sources are left out.
///
/// # Arguments
///
/// * `config` - A configuration that already passed validation
///
/// # Returns
///
/// * `Ok(RunEngine)` - Engine ready to run
/// * `Err(ConciergeError)` - An HTTP client could not be built or the
///   storage backend could not be resolved
pub fn build_engine(config: &Config) -> Result<RunEngine> {
    let client = build_http_client(&config.user_agent)?;

    let mut pipeline = DeliveryPipeline::new(&config.run.working_dir);
    for (format, command) in [
        (OutputFormat::A4, &config.render.a4),
        (OutputFormat::Kindle, &config.render.kindle),
    ] {
        if let Some(command) = command {
            pipeline = pipeline.with_renderer(format, renderer(command));
        }
    }

    let sinks = resolve_sinks(&config.storage, client.clone())?;

    let mut engine = RunEngine::new(pipeline, sinks, EngineOptions::from(&config.run));

    let digest = &config.sources.digest;
    if digest.enabled {
        let (username, password) = match (&digest.username, &digest.password) {
            (Some(username), Some(password)) => (username, password),
            _ => return Err(ConfigError::MissingCredentials(DIGEST_SOURCE.to_string()).into()),
        };
        let base_url = digest.base_url.as_deref().unwrap_or(DIGEST_BASE_URL);
        let member_url = digest.member_base_url.as_deref().unwrap_or(DIGEST_MEMBER_URL);

        // Shared by the handshake and the adapter: a bounce to the login
        // page must surface as a 3xx.
        let session_client = build_session_client(&config.user_agent)?;
        let manager = SessionManager::new(
            session_client.clone(),
            SessionEndpoints::with_hosts(member_url, base_url),
        );
        let slot = SessionSlot::new(
            DIGEST_SOURCE,
            Arc::new(manager),
            Credentials::new(username.as_str(), password.as_str()),
        );
        let adapter = DigestSource::new(session_client, config.run.format).with_base_url(base_url);
        engine.register(Arc::new(adapter), Some(Arc::new(slot)));
    }

    let asahi = &config.sources.asahi;
    if asahi.enabled {
        let mut adapter = AsahiSource::new(client.clone());
        if let Some(base_url) = &asahi.base_url {
            adapter = adapter.with_base_url(base_url.as_str());
        }
        engine.register(Arc::new(adapter), None);
    }

    let yomiuri = &config.sources.yomiuri;
    if yomiuri.enabled {
        let mut adapter = YomiuriSource::new(client.clone());
        if let Some(base_url) = &yomiuri.base_url {
            adapter = adapter.with_base_url(base_url.as_str());
        }
        engine.register(Arc::new(adapter), None);
    }

    let new_yorker = &config.sources.new_yorker;
    if new_yorker.enabled {
        let mut adapter = NewYorkerSource::new(client.clone());
        if let Some(base_url) = &new_yorker.base_url {
            adapter = adapter.with_base_url(base_url.as_str());
        }
        engine.register(Arc::new(adapter), None);
    }

    if engine.source_names().is_empty() {
        tracing::warn!("No sources enabled; the run will only load and persist the history");
    }

    engine.add_notifier(Box::new(LogNotifier));
    if let Some(url) = &config.notify.webhook_url {
        let notifier = WebhookNotifier::new(client, url.as_str())
            .with_timeout(Duration::from_secs(config.notify.timeout_secs));
        engine.add_notifier(Box::new(notifier));
    }

    Ok(engine)
}

fn renderer(command: &RenderCommand) -> Arc<CommandRenderer> {
    Arc::new(CommandRenderer::new(command.clone()))
}
