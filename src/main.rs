//! PulseGuard - liveness monitor for long-lived chat-bot sessions.
//!
//! Main entry point for the PulseGuard CLI.

mod cli;
mod console;
mod tap;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pulseguard_config::{Config, ConfigError, ConfigLoader, ConfigStore, ConfigValidator};
use pulseguard_monitor::{
    AdminService, EntityId, EvidenceLog, MonitorService, MonitorSettings, StaticAdmins,
    pushplus_sink_factory,
};

use cli::{Cli, Commands};

fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pulseguard")
        .join("logs")
}

fn init_tracing(config: Option<&Config>) -> anyhow::Result<()> {
    let log_dir = config
        .and_then(|c| c.logging.dir.clone())
        .unwrap_or_else(default_log_dir);
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("cannot create log directory {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("pulseguard")
        .filename_suffix("log")
        .max_log_files(14)
        .build(&log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Keeps the background writer alive for the whole process.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let default_level = if config.is_some_and(|c| c.basic.debug) {
        "debug"
    } else {
        "info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout carries console replies, so human-readable logs go to stderr.
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(true)
                .with_writer(std::io::stderr),
        )
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let loaded = ConfigLoader::load(&cli.config);
    init_tracing(loaded.as_ref().ok())?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&cli.config, loaded).await,
        Commands::Tap { evidence } => run_tap(loaded, evidence).await,
        Commands::Check => check(&cli.config, loaded),
        Commands::NotifyTest { entity } => notify_test(loaded, entity).await,
    }
}

/// Foreground monitor: stdin feed, signal-driven reload and shutdown.
async fn run(path: &Path, loaded: Result<Config, ConfigError>) -> anyhow::Result<()> {
    info!("Starting PulseGuard v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", path.display());

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Cannot load configuration, monitoring disabled: {}", e);
            Config::default()
        }
    };
    let settings = MonitorSettings::from_config(&config).unwrap_or_else(|e| {
        error!("Configuration rejected, monitoring disabled: {}", e);
        MonitorSettings::disabled()
    });

    let service = MonitorService::launch(settings)?;
    let admin = Arc::new(
        AdminService::new(service.clone(), Arc::new(StaticAdmins::from_config(&config)))
            .with_store(ConfigStore::new(path)),
    );
    let prefix = config.basic.command_prefix.clone();

    spawn_reload_on_hangup(admin.clone());

    let feed = tokio::spawn(console::run_console(
        admin.clone(),
        prefix,
        tokio::io::BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    ));

    wait_for_shutdown().await;
    info!("Shutting down");
    feed.abort();
    service.shutdown().await;
    info!("PulseGuard stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        _ => {
            warn!("Cannot install signal handlers, falling back to Ctrl+C");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    if let Ok(()) = tokio::signal::ctrl_c().await {
        info!("Received Ctrl+C");
    }
}

#[cfg(unix)]
fn spawn_reload_on_hangup(admin: Arc<AdminService>) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sighup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            warn!("Cannot install SIGHUP handler: {}", e);
            return;
        }
    };
    tokio::spawn(async move {
        while sighup.recv().await.is_some() {
            info!("Received SIGHUP - reloading configuration");
            if let Err(e) = admin.reload_config().await {
                error!("Reload failed: {}", e);
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(_admin: Arc<AdminService>) {}

async fn run_tap(
    loaded: Result<Config, ConfigError>,
    evidence: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = loaded.unwrap_or_else(|e| {
        warn!("Using default evidence settings: {}", e);
        Config::default()
    });
    let path = evidence.unwrap_or_else(|| config.evidence.path.clone());
    let log = EvidenceLog::new(
        path,
        config.evidence.replay_lines,
        config.evidence.replay_window(),
    );

    let captured = tap::run_tap(
        tokio::io::BufReader::new(tokio::io::stdin()),
        tokio::io::stderr(),
        &log,
    )
    .await?;
    info!("Tap finished, {} failure line(s) recorded", captured);
    Ok(())
}

fn check(path: &Path, loaded: Result<Config, ConfigError>) -> anyhow::Result<()> {
    let config = loaded.with_context(|| format!("cannot load {}", path.display()))?;
    let result = ConfigValidator::validate(&config);

    for warning in &result.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for err in &result.errors {
        println!("error: {}: {}", err.path, err.message);
    }

    if !result.is_valid() {
        bail!("{} configuration error(s)", result.errors.len());
    }
    println!(
        "{} is valid ({} entities, monitoring {})",
        path.display(),
        config.entities.len(),
        if config.basic.enable { "enabled" } else { "disabled" }
    );
    Ok(())
}

async fn notify_test(
    loaded: Result<Config, ConfigError>,
    entity: Option<String>,
) -> anyhow::Result<()> {
    let config = loaded?;
    let settings = MonitorSettings::from_config(&config)?;
    let service = MonitorService::new(settings, pushplus_sink_factory())?;

    let entity = match entity {
        Some(id) => EntityId::new(id),
        None => service
            .default_entity()
            .context("no entity configured; pass one or set basic.primary_entity")?,
    };

    let receipt = service.send_test(&entity).await?;
    println!(
        "Test notification for {} delivered after {} attempt(s)",
        entity, receipt.attempts
    );
    Ok(())
}
