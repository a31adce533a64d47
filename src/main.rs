mod aggregator;
mod alert;
mod config;
mod error;
mod evaluator;
mod health;
mod heartbeat;
mod message;
mod model;
mod notifier;
mod scheduler;
mod source;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use aggregator::RateAggregator;
use alert::AlertStateMachine;
use config::AppConfig;
use error::ConfigError;
use heartbeat::Heartbeat;
use message::MessageTemplate;
use notifier::Notifier;
use notifier::telegram::TelegramNotifier;
use notifier::terminal::TerminalNotifier;
use scheduler::Scheduler;
use source::QuoteSource;
use source::criptoya::CriptoyaSource;

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("health endpoint error")]
    Health,
    #[display("runtime error")]
    Runtime,
}

#[derive(Parser)]
#[command(
    name = "spread-notifier",
    about = "Alerts when a venue's price gap against other venues crosses a threshold"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = config::load(Path::new(&cli.config)).change_context(AppError::Config)?;

    init_tracing(&config);

    let notifier = build_notifier(&config).change_context(AppError::Config)?;
    let health_port = config
        .general
        .health_port()
        .change_context(AppError::Config)?;

    let watchlist = config.watchlist();
    info!(
        targets = ?watchlist.targets,
        comparatives = ?watchlist.comparatives,
        threshold = watchlist.threshold,
        "watchlist loaded"
    );

    let template = MessageTemplate::new(config.display_names(), config.monitor.notional);
    let cancel = CancellationToken::new();
    let mut task_handles = Vec::new();

    // ── Liveness ──────────────────────────────────────────────────────────────
    let listener = health::bind(health_port)
        .await
        .change_context(AppError::Health)?;
    let health_cancel = cancel.clone();
    task_handles.push(tokio::spawn(async move {
        if let Err(e) = health::serve(listener, health_cancel).await {
            error!(error = ?e, "health endpoint failed");
        }
    }));

    // ── Status messages ───────────────────────────────────────────────────────
    let heartbeat = Heartbeat::new(Arc::clone(&notifier), template.clone());
    if config.notifier.startup_message {
        heartbeat.announce_startup().await;
    }
    if let Some(interval) = config.notifier.heartbeat_interval() {
        let heartbeat_cancel = cancel.clone();
        task_handles.push(tokio::spawn(async move {
            heartbeat.run(interval, heartbeat_cancel).await;
        }));
    }

    // ── Scheduler ─────────────────────────────────────────────────────────────
    let source: Arc<dyn QuoteSource> = Arc::new(CriptoyaSource::new(&config.quotes));
    let mut scheduler = Scheduler::new(
        RateAggregator::new(source, config.monitor.fetch_timeout()),
        watchlist,
        AlertStateMachine::new(template, config.monitor.missing_data_policy),
        notifier,
        config.monitor.tick_period(),
    );
    let scheduler_cancel = cancel.clone();
    let mut scheduler_task = tokio::spawn(async move {
        scheduler.run(scheduler_cancel).await;
    });

    // ── Shutdown ──────────────────────────────────────────────────────────────
    let reason = wait_for_shutdown(tokio::signal::ctrl_c(), &mut scheduler_task).await;
    cancel.cancel();

    if !matches!(reason, Shutdown::SchedulerExited) {
        task_handles.push(scheduler_task);
    }
    for handle in task_handles {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    match reason {
        Shutdown::Signal => {
            info!("shutdown complete");
            Ok(())
        }
        Shutdown::SignalFailed(e) => Err(Report::new(e).change_context(AppError::Runtime)),
        Shutdown::SchedulerExited => Err(Report::new(AppError::Runtime)
            .attach("scheduler stopped before shutdown was requested")),
    }
}

#[derive(Debug)]
enum Shutdown {
    Signal,
    SignalFailed(std::io::Error),
    SchedulerExited,
}

/// Wait for the shutdown signal, or for the scheduler task to end on its own,
/// which only happens if it panicked.
async fn wait_for_shutdown(
    signal: impl Future<Output = std::io::Result<()>>,
    scheduler: &mut JoinHandle<()>,
) -> Shutdown {
    tokio::select! {
        result = signal => match result {
            Ok(()) => {
                info!("ctrl+c received, shutting down");
                Shutdown::Signal
            }
            Err(e) => Shutdown::SignalFailed(e),
        },
        result = scheduler => {
            match result {
                Err(e) => error!(error = %e, "scheduler task failed, shutting down"),
                Ok(()) => error!("scheduler task exited before shutdown, shutting down"),
            }
            Shutdown::SchedulerExited
        }
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

fn build_notifier(config: &AppConfig) -> Result<Arc<dyn Notifier>, Report<ConfigError>> {
    match (config.notifier.kind.as_str(), &config.notifier.telegram) {
        ("telegram", Some(telegram)) => {
            let token = config::require_env(&telegram.token_env)?;
            let chat_id = config::require_env(&telegram.chat_id_env)?;
            info!(api_url = %telegram.api_url, "using telegram notifier");
            Ok(Arc::new(TelegramNotifier::new(&telegram.api_url, token, chat_id)))
        }
        ("telegram", None) => Err(Report::new(ConfigError::Validation {
            field: "notifier.telegram".into(),
        })),
        _ => {
            info!("using terminal notifier");
            Ok(Arc::new(TerminalNotifier))
        }
    }
}
