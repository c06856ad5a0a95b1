#![forbid(unsafe_code)]

//! `concierge` server binary.
//!
//! Wires the `SQLite` store, the chat platform client and the reply
//! generator into the orchestration engine, then serves platform webhooks
//! until SIGINT or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use concierge::config::{GlobalConfig, PlatformKind};
use concierge::llm::OpenAiGenerator;
use concierge::orchestrator::sweeper::spawn_state_sweeper;
use concierge::orchestrator::{Collaborators, Engine, EngineSettings};
use concierge::persistence::{db, retention, Database, SqliteStore};
use concierge::platform::{build_platform, TelegramPlatform};
use concierge::webhook::{self, WebhookState};
use concierge::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "concierge", about = "Conversational commerce bot server", version)]
struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Webhook port, overriding `http_port` from the config file.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Io(format!("tokio runtime: {err}")))?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = GlobalConfig::load_from_path(&cli.config)?;
    if let Some(port) = cli.port {
        config.http_port = port;
    }
    config.load_credentials().await?;
    info!(
        platform = config.platform.as_str(),
        port = config.http_port,
        db = %config.database_path.display(),
        "starting concierge"
    );

    let db = Arc::new(db::connect(&config.database_path).await?);
    let root = CancellationToken::new();
    let engine = build_engine(&config, &db, &root)?;

    let mut tasks: Vec<JoinHandle<()>> = vec![
        retention::spawn_retention_task(Arc::clone(&db), config.retention_days, root.clone()),
        spawn_state_sweeper(engine.clone(), config.sweep_interval(), root.clone()),
    ];

    // Telegram photos arrive as file ids and need the bot client to resolve.
    let telegram = match config.platform {
        PlatformKind::Telegram => Some(Arc::new(TelegramPlatform::new(&config.telegram)?)),
        PlatformKind::Messenger => None,
    };
    let state = Arc::new(WebhookState {
        engine: engine.clone(),
        verify_token: config.messenger.verify_token.clone(),
        telegram,
    });
    let port = config.http_port;
    let server_cancel = root.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(err) = webhook::serve(state, port, server_cancel).await {
            error!(%err, "webhook listener stopped");
        }
    }));

    wait_for_signal().await;
    info!("shutting down");
    engine.shutdown();
    root.cancel();

    for task in tasks {
        if let Err(err) = task.await {
            warn!(%err, "background task ended abnormally");
        }
    }
    db.close().await;
    info!("concierge stopped");
    Ok(())
}

fn build_engine(
    config: &GlobalConfig,
    db: &Arc<Database>,
    root: &CancellationToken,
) -> Result<Engine> {
    let collaborators = Collaborators {
        platform: build_platform(config)?,
        generator: Arc::new(OpenAiGenerator::new(&config.llm)?),
        store: Arc::new(SqliteStore::new(Arc::clone(db))),
    };
    let settings = EngineSettings::from_config(config)?;
    Ok(Engine::new(settings, collaborators, root))
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(%err, "SIGTERM unavailable; waiting for ctrl-c only");
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(%err, "ctrl-c handler failed");
            }
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "ctrl-c handler failed");
    }
}

fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| AppError::Config(format!("tracing subscriber: {err}")))
}
