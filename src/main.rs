//! PDF Concierge main entry point
//!
//! Command-line interface for a single harvesting run. Scheduling is left to
//! the caller (cron, systemd timers, CI).

use anyhow::Context;
use clap::Parser;
use pdf_concierge::config::{load_effective_config, validate_render_coverage, Config};
use pdf_concierge::engine::build_engine;
use pdf_concierge::{ConciergeError, FormatPolicy, ListMode};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// PDF Concierge: an incremental document harvester
///
/// Lists editorials and digest books from the enabled sources, skips
/// everything already delivered, converts the rest and uploads it to the
/// configured storage.
#[derive(Parser, Debug)]
#[command(name = "pdf-concierge")]
#[command(version)]
#[command(about = "An incremental document harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file; PDFC_* variables apply on top
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Listing mode
    #[arg(long, value_enum, ignore_case = true)]
    mode: Option<ListMode>,

    /// Output format policy
    #[arg(long, value_enum, ignore_case = true)]
    format: Option<FormatPolicy>,

    /// Start from an empty history instead of the stored one
    #[arg(long)]
    no_history: bool,

    /// Validate the configuration and show what would run
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = match load(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {:#}", e);
            return ExitCode::from(2);
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
        return ExitCode::SUCCESS;
    }

    match handle_run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Run aborted: {:#}", e);
            match e.downcast_ref::<ConciergeError>() {
                Some(ConciergeError::Config(_)) => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

/// Loads the configuration and applies command-line overrides
fn load(cli: &Cli) -> anyhow::Result<Config> {
    match &cli.config {
        Some(path) => tracing::info!("Loading configuration from: {}", path.display()),
        None => tracing::info!("No configuration file given, using defaults and environment"),
    }

    let (mut config, hash) = load_effective_config(cli.config.as_deref())
        .context("invalid configuration")?;
    if let Some(hash) = hash {
        tracing::info!("Configuration loaded successfully (hash: {})", hash);
    }

    if let Some(mode) = cli.mode {
        config.run.mode = mode;
    }
    if let Some(format) = cli.format {
        config.run.format = format;
        validate_render_coverage(&config).context("invalid --format")?;
    }
    if cli.no_history {
        config.run.use_history = false;
    }
    Ok(config)
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("pdf_concierge=info,warn"),
            1 => EnvFilter::new("pdf_concierge=debug,info"),
            2 => EnvFilter::new("pdf_concierge=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== PDF Concierge Dry Run ===\n");

    println!("Run:");
    println!("  Mode: {}", config.run.mode.as_str());
    println!("  Format: {}", config.run.format);
    println!("  Use history: {}", config.run.use_history);
    println!("  Persist history: {}", config.run.persist_history);
    println!("  Concurrency per source: {}", config.run.concurrency);
    println!("  Working directory: {}", config.run.working_dir);

    println!("\nStorage:");
    match config.storage.backend {
        Some(backend) => println!("  Backend: {}", backend.as_str()),
        None => println!("  Backend: (none)"),
    }
    println!("  Local backup: {}", config.storage.allow_local_backup);

    println!("\nRenderers:");
    println!("  A4: {}", describe_renderer(config.render.a4.as_ref()));
    println!("  Kindle: {}", describe_renderer(config.render.kindle.as_ref()));

    let sources = &config.sources;
    let enabled: Vec<&str> = [
        ("digest", sources.digest.enabled),
        ("asahi", sources.asahi.enabled),
        ("yomiuri", sources.yomiuri.enabled),
        ("new-yorker", sources.new_yorker.enabled),
    ]
    .into_iter()
    .filter(|(_, enabled)| *enabled)
    .map(|(name, _)| name)
    .collect();
    println!("\nSources ({}):", enabled.len());
    for name in enabled {
        println!("  - {}", name);
    }

    if let Some(url) = &config.notify.webhook_url {
        println!("\nWebhook: {}", url);
    }

    println!("\n✓ Configuration is valid");
}

fn describe_renderer(command: Option<&pdf_concierge::config::RenderCommand>) -> String {
    match command {
        Some(command) => format!("{} {}", command.program, command.args.join(" ")),
        None => "(not configured)".to_string(),
    }
}

/// Runs the engine once and reports the outcome
async fn handle_run(config: &Config) -> anyhow::Result<()> {
    let engine = build_engine(config)?;
    tracing::info!("Sources: {}", engine.source_names().join(", "));

    let report = engine.run().await?;

    println!("\n=== Run Complete ===");
    println!("Delivered: {}", report.delivered.len());
    for artifact in &report.delivered {
        println!("  + {}", artifact.destination());
    }
    if !report.skipped.is_empty() {
        println!("Skipped: {}", report.skipped.len());
        for item in &report.skipped {
            println!("  - {}/{}/{}: {}", item.source, item.category, item.id, item.reason);
        }
    }
    if !report.failed_sources.is_empty() {
        println!("Unavailable sources: {}", report.failed_sources.join(", "));
    }
    println!(
        "History: {} ({} -> {}){}",
        if report.history_changed { "changed" } else { "unchanged" },
        short(report.start_digest.as_str()),
        short(report.end_digest.as_str()),
        if report.persisted { "" } else { ", not persisted" }
    );

    Ok(())
}

fn short(digest: &str) -> &str {
    &digest[..12.min(digest.len())]
}
