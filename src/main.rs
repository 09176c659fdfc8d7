//! sideline entry point
//!
//! Wires configuration, the metadata provider, sinks, and the processor
//! together, then runs the requested subcommand. Exit codes: 0 success,
//! 1 partial failure (sports skipped or files failed), 2 configuration
//! error, 3 fatal I/O error.

use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sideline::cli::{CliOptions, Command, USAGE};
use sideline::config::AppConfig;
use sideline::metadata::HttpMetadataProvider;
use sideline::models::PassStats;
use sideline::services::notifications::{NotificationEvent, RefreshTrigger, WebhookRefreshTrigger};
use sideline::services::processor::Processor;
use sideline::services::watcher;

const EXIT_PARTIAL: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_IO: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("SIDELINE_LOG")
                .unwrap_or_else(|_| "sideline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let options = CliOptions::from_args();
    if options.print_help {
        print!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    let config_path = options.resolved_config_path();
    let mut config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            error!(path = %config_path.display(), error = %err, "Configuration error");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    config.apply_env();
    if let Some(dry_run) = options.dry_run {
        config.dry_run = dry_run;
    }
    if let Some(mode) = options.link_mode {
        config.link_mode = mode;
    }
    if let Some(watch) = options.watch {
        config.watch.enabled = watch;
    }
    config.reprocess = options.reprocess;
    config.trace = options.trace;

    match options.command {
        Command::ValidateConfig => {
            info!(
                path = %config_path.display(),
                sports = config.sports.len(),
                "Configuration is valid"
            );
            ExitCode::SUCCESS
        }
        Command::TriggerRefresh => trigger_refresh(&config).await,
        Command::Run => run(config).await,
    }
}

async fn run(config: AppConfig) -> ExitCode {
    if !config.dry_run {
        for dir in [&config.destination_dir, &config.cache_dir] {
            if let Err(err) = std::fs::create_dir_all(dir) {
                error!(path = %dir.display(), error = %err, "Failed to create directory");
                return ExitCode::from(EXIT_IO);
            }
        }
    }

    let config = Arc::new(config);
    let provider = match HttpMetadataProvider::new(&config.metadata) {
        Ok(provider) => Arc::new(provider),
        Err(err) => {
            error!(error = %err, "Failed to build metadata client");
            return ExitCode::from(EXIT_IO);
        }
    };
    let refresh = config
        .post_run
        .refresh_url
        .clone()
        .map(|url| Arc::new(WebhookRefreshTrigger::new(url)) as Arc<dyn RefreshTrigger>);
    let processor = Arc::new(Processor::new(config.clone(), provider, refresh));

    let cancel = CancellationToken::new();
    spawn_shutdown_handler(cancel.clone());

    if config.watch.enabled {
        // An initial pass picks up whatever arrived while we were down,
        // then the watcher takes over.
        let stats = processor.run_pass(&cancel).await;
        log_outcome(&stats);
        match watcher::run_watch_loop(processor, config.watch.clone(), cancel).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!(error = %err, "Watcher failed");
                ExitCode::from(EXIT_IO)
            }
        }
    } else {
        let stats = processor.run_pass(&cancel).await;
        log_outcome(&stats);
        if stats.failed > 0 || !stats.sports_skipped.is_empty() {
            ExitCode::from(EXIT_PARTIAL)
        } else {
            ExitCode::SUCCESS
        }
    }
}

async fn trigger_refresh(config: &AppConfig) -> ExitCode {
    let Some(url) = config.post_run.refresh_url.clone() else {
        error!("No refresh trigger configured under [post_run]");
        return ExitCode::from(EXIT_CONFIG);
    };
    let trigger = WebhookRefreshTrigger::new(url);
    trigger
        .trigger(&NotificationEvent::RefreshRequested {
            pass_id: "manual".to_string(),
            new_links: 0,
        })
        .await;
    info!("Refresh trigger fired");
    ExitCode::SUCCESS
}

fn spawn_shutdown_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested, finishing in-flight work");
            cancel.cancel();
        }
    });
}

fn log_outcome(stats: &PassStats) {
    for warning in &stats.warnings {
        tracing::warn!("{warning}");
    }
    for error in &stats.errors {
        tracing::error!("{error}");
    }
}
