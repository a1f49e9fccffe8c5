//! One update pass: list, compare, locate, install, record

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use fieldlink_core::{ConfigStore, UpdateRecord};

use crate::error::UpdateError;
use crate::install::download_and_install;
use crate::resolver::{ArtifactLayout, find_newer_build, list_builds, locate_artifact};
use crate::store::ArtifactStore;

/// Where the installed executable lives
pub const DEFAULT_DESTINATION: &str = "/home/NexusRFIDReader";

/// Result of a pass that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The store holds no builds under the base path
    NoBuilds,
    /// Nothing newer than the installed version
    UpToDate { current: String },
    /// A newer build exists but carries no artifact for this device
    NothingDownloadable { build: String },
    /// A new build was installed
    Installed {
        version: String,
        path: PathBuf,
        bytes: u64,
        /// `false` if the record could not be updated after install
        record_updated: bool,
    },
}

/// Load the update sub-record from `records`
///
/// # Errors
/// `UpdateError::Config` if the record is missing, malformed or incomplete
pub fn load_update_record(records: &ConfigStore) -> Result<UpdateRecord, UpdateError> {
    Ok(records.load()?.update_record()?)
}

/// Update job over one artifact store
pub struct Updater {
    store: Arc<dyn ArtifactStore>,
    records: ConfigStore,
    layout: ArtifactLayout,
    destination: PathBuf,
}

impl Updater {
    pub fn new(store: Arc<dyn ArtifactStore>, records: ConfigStore) -> Self {
        Self {
            store,
            records,
            layout: ArtifactLayout::default(),
            destination: PathBuf::from(DEFAULT_DESTINATION),
        }
    }

    #[must_use]
    pub fn with_layout(mut self, layout: ArtifactLayout) -> Self {
        self.layout = layout;
        self
    }

    #[must_use]
    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = destination.into();
        self
    }

    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Run one pass against `record`
    ///
    /// The persisted version changes only after the artifact has been fully
    /// installed, so a failed pass can simply be run again.
    ///
    /// # Errors
    /// `Listing` if builds cannot be listed, `Download` if the transfer fails
    pub async fn run(&self, record: &UpdateRecord) -> Result<UpdateOutcome, UpdateError> {
        let base_path = record.normalized_base_path();
        let current = record.current_version.trim();

        let available = list_builds(self.store.as_ref(), base_path)
            .await
            .map_err(UpdateError::Listing)?;

        if available.is_empty() {
            info!(base_path, "no builds found");
            return Ok(UpdateOutcome::NoBuilds);
        }

        let Some(build) = find_newer_build(&available, current) else {
            info!(current, "already up to date");
            return Ok(UpdateOutcome::UpToDate {
                current: current.to_string(),
            });
        };
        info!(current, newer = %build, "newer build available");

        let Some(artifact) =
            locate_artifact(self.store.as_ref(), base_path, &build, &self.layout).await
        else {
            warn!(build = %build, "no downloadable artifact for build");
            return Ok(UpdateOutcome::NothingDownloadable { build });
        };

        let bytes = download_and_install(self.store.as_ref(), &artifact, &self.destination)
            .await
            .map_err(|source| UpdateError::Download {
                path: artifact.clone(),
                source,
            })?;

        let record_updated = match self.records.set_current_version(&build) {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    version = %build,
                    error = %e,
                    "artifact installed but the device record could not be updated"
                );
                false
            }
        };

        info!(version = %build, path = %self.destination.display(), "update installed");
        Ok(UpdateOutcome::Installed {
            version: build,
            path: self.destination.clone(),
            bytes,
            record_updated,
        })
    }
}
