//! fieldlink CLI
//!
//! Operator commands for a field device: one firmware update pass and
//! device key derivation.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use eyre::{WrapErr, eyre};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use fieldlink_client::BlobStore;
use fieldlink_core::{ConfigStore, DEFAULT_RECORD_PATH, derive_device_key};
use fieldlink_update::{
    DEFAULT_DESTINATION, UpdateError, UpdateOutcome, Updater, load_update_record,
};

#[derive(Parser, Debug)]
#[command(name = "fieldlink-cli", version)]
#[command(about = "Field device maintenance commands", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install the newest firmware build if it is newer than the current one
    Update {
        /// Device record path
        #[arg(long, default_value = DEFAULT_RECORD_PATH)]
        record: PathBuf,

        /// Where the executable is installed
        #[arg(long, default_value = DEFAULT_DESTINATION)]
        destination: PathBuf,
    },

    /// Print the device key derived from a group key
    #[command(name = "derive-key")]
    DeriveKey {
        /// Registration id of the device
        #[arg(long)]
        registration_id: String,

        /// Base64 group key; read from the device record when omitted
        #[arg(long)]
        group_key: Option<String>,

        /// Device record path
        #[arg(long, default_value = DEFAULT_RECORD_PATH)]
        record: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error handler: {e}");
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Update {
            record,
            destination,
        } => match run_update(record, destination).await {
            Ok(outcome) => {
                report(&outcome);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, exit_code = e.exit_code(), "update failed");
                ExitCode::from(e.exit_code())
            }
        },
        Commands::DeriveKey {
            registration_id,
            group_key,
            record,
        } => match derive_key(&registration_id, group_key, &record) {
            Ok(key) => {
                println!("{key}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {e:?}");
                ExitCode::FAILURE
            }
        },
    }
}

async fn run_update(record: PathBuf, destination: PathBuf) -> Result<UpdateOutcome, UpdateError> {
    let records = ConfigStore::new(record);
    let update = load_update_record(&records)?;
    let store = BlobStore::from_record(&update).map_err(|e| UpdateError::Client(e.to_string()))?;

    Updater::new(Arc::new(store), records)
        .with_destination(destination)
        .run(&update)
        .await
}

fn report(outcome: &UpdateOutcome) {
    match outcome {
        UpdateOutcome::NoBuilds => info!("no builds published"),
        UpdateOutcome::UpToDate { current } => info!(current = %current, "already up to date"),
        UpdateOutcome::NothingDownloadable { build } => {
            info!(build = %build, "newer build has no artifact for this device");
        }
        UpdateOutcome::Installed {
            version,
            path,
            bytes,
            record_updated,
        } => info!(
            version = %version,
            path = %path.display(),
            bytes,
            record_updated,
            "update installed"
        ),
    }
}

fn derive_key(
    registration_id: &str,
    group_key: Option<String>,
    record: &Path,
) -> eyre::Result<String> {
    let group_key = match group_key {
        Some(key) => key,
        None => ConfigStore::new(record)
            .load()
            .wrap_err_with(|| format!("failed to load {}", record.display()))?
            .group_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| eyre!("no --group-key given and {} has none", record.display()))?,
    };

    Ok(derive_device_key(&group_key, registration_id.trim())?)
}
