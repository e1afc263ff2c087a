mod api;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use wagate_channels::WhatsAppClientFactory;
use wagate_core::{
    config::{self, Config, StoreBackend},
    report::ReportLabels,
    shellexpand,
    traits::{ReportSource, SessionStore},
};
use wagate_sessions::{SessionGateway, TriggerResponder};
use wagate_store::{MemorySessionStore, SqlReportSource, SqliteSessionStore};

#[derive(Parser)]
#[command(
    name = "wagate",
    version,
    about = "Multi-session WhatsApp gateway with an HTTP send API"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, env = "WAGATE_CONFIG", default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API and serve sessions until interrupted.
    Serve,
    /// List durable session records.
    Sessions,
    /// Delete a session record and its stored credentials.
    Forget {
        /// The session to delete.
        session_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;
    let _log_guard = init_tracing(&cfg);

    match cli.command {
        Commands::Serve => serve(cfg).await?,
        Commands::Sessions => {
            let store = SqliteSessionStore::open(&cfg.store).await?;
            let records = store.list().await?;
            if records.is_empty() {
                println!("No sessions.");
            }
            for record in records {
                println!(
                    "{}  ready={}  auth={}  updated={}",
                    record.session_id,
                    record.is_ready,
                    record.auth_state.is_some(),
                    record.updated_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        Commands::Forget { session_id } => {
            let store = SqliteSessionStore::open(&cfg.store).await?;
            if store.find(&session_id).await?.is_none() {
                anyhow::bail!("no session named '{session_id}'");
            }
            store.delete(&session_id).await?;
            println!("Session '{session_id}' deleted.");
        }
    }

    Ok(())
}

/// Console logging, plus a daily rolling file when `log_dir` is set.
///
/// The returned guard flushes the file writer and must outlive the process's
/// logging.
fn init_tracing(cfg: &Config) -> Option<WorkerGuard> {
    let level = cfg.gateway.log_level.clone();
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level))
    };

    if cfg.gateway.log_dir.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
        return None;
    }

    let log_dir = shellexpand(&cfg.gateway.log_dir);
    let appender = tracing_appender::rolling::daily(log_dir, "wagate.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

async fn serve(cfg: Config) -> anyhow::Result<()> {
    // Key material always lives in SQLite; the memory backend only changes
    // where session records go.
    let sqlite = match cfg.store.backend {
        StoreBackend::Sqlite => SqliteSessionStore::open(&cfg.store).await?,
        StoreBackend::Memory => SqliteSessionStore::in_memory().await?,
    };
    let store: Arc<dyn SessionStore> = match cfg.store.backend {
        StoreBackend::Sqlite => Arc::new(sqlite.clone()),
        StoreBackend::Memory => {
            Arc::new(MemorySessionStore::new().with_key_pool(sqlite.pool().clone()))
        }
    };

    let factory = Arc::new(
        WhatsAppClientFactory::new(sqlite.pool().clone(), &cfg.session.device_name)
            .with_terminal_qr(true),
    );

    let responder = build_responder(&cfg).await;
    let gateway = Arc::new(SessionGateway::new(
        store,
        factory,
        responder,
        &cfg.session,
    ));

    let upload_dir = PathBuf::from(shellexpand(&cfg.api.upload_dir));
    std::fs::create_dir_all(&upload_dir)
        .with_context(|| format!("failed to create upload dir {}", upload_dir.display()))?;

    let state = api::ApiState::new(
        Arc::clone(&gateway),
        cfg.phone.clone(),
        upload_dir,
        cfg.api.body_limit_bytes,
    );
    let addr = format!("{}:{}", cfg.api.host, cfg.api.port);

    api::serve(&addr, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for shutdown signal: {e}");
        }
        info!("shutdown signal received");
    })
    .await?;

    gateway.shutdown().await;
    info!("wagate stopped");
    Ok(())
}

/// The inbound auto-reply, when enabled and a report database is configured.
/// An unreachable report database disables it rather than failing startup.
async fn build_responder(cfg: &Config) -> Option<Arc<TriggerResponder>> {
    if !cfg.responder.enabled {
        return None;
    }
    if !cfg.report.is_configured() {
        info!("auto-reply disabled: no report database configured");
        return None;
    }

    let source: Arc<dyn ReportSource> = match SqlReportSource::open(&cfg.report).await {
        Ok(source) => Arc::new(source),
        Err(e) => {
            warn!("auto-reply disabled: {e}");
            return None;
        }
    };
    let labels = ReportLabels {
        group: cfg.report.group_label.clone(),
        no_class: cfg.report.no_class_label.clone(),
    };
    info!(triggers = ?cfg.responder.triggers, "auto-reply enabled");
    Some(Arc::new(TriggerResponder::new(
        &cfg.responder.triggers,
        source,
        labels,
    )))
}
