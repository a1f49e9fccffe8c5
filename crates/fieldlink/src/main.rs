//! fieldlink agent daemon
//!
//! Provisions the device, keeps a hub session alive with heartbeats and
//! answers remote commands until SIGINT or SIGTERM.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::Result;
use eyre::WrapErr;
use kameo::actor::Spawn;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fieldlink_core::{Agent, ConfigStore, SessionActor};

mod config;
mod factory;
mod logging;

use config::{CONFIG_ENV, ConfigSource, Settings};
use factory::AgentFactory;

/// Field device agent
#[derive(Parser, Debug)]
#[command(name = "fieldlink", version, about)]
struct Args {
    /// Settings file (overrides FIELDLINK_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device record path
    #[arg(long)]
    record: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let env_config = std::env::var(CONFIG_ENV).ok();
    let source = ConfigSource::locate(args.config.as_deref(), env_config.as_deref());
    let (mut settings, settings_file) = Settings::resolve(&source)?;
    if let Some(record) = args.record {
        settings.agent.record_path = record;
    }
    if let Some(level) = args.log_level {
        settings.agent.log_level = level;
    }

    let log_error = logging::init(&settings.agent.log_level, settings.agent.log_file.as_deref());
    if let Some(e) = log_error {
        warn!(error = %e, "log file unavailable, logging to stdout only");
    }
    info!(
        settings = ?settings_file,
        record = %settings.agent.record_path.display(),
        "fieldlink agent starting"
    );

    let records = ConfigStore::new(&settings.agent.record_path);
    let identity = records
        .load()
        .and_then(|record| record.identity())
        .wrap_err_with(|| {
            format!(
                "failed to load device record {}",
                settings.agent.record_path.display()
            )
        })?;

    let factory = AgentFactory::new(settings);
    let session = SessionActor::spawn(factory.session_args(identity));
    let agent = Agent::new(session.clone(), factory.dispatcher(), factory.heartbeat());

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let result = agent.run(cancel).await;

    session.stop_gracefully().await.ok();
    session.wait_for_shutdown().await;

    result.wrap_err("agent stopped")?;
    info!("fieldlink agent stopped");
    Ok(())
}

/// Cancel `cancel` on SIGINT or SIGTERM
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }

    cancel.cancel();
}
