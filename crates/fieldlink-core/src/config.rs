//! Persisted device record
//!
//! The record is shared by the agent (identity) and the updater (update
//! sub-record). Writers go through [`ConfigStore::update`], which holds an
//! advisory lock for the whole read-modify-write and replaces the file by
//! atomic rename.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::ConfigError;

/// Default location of the persisted record
pub const DEFAULT_RECORD_PATH: &str = "/etc/azureiotpnp/provisioning_config.json";

/// On-disk device record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    #[serde(default)]
    pub global_endpoint: String,
    #[serde(default)]
    pub id_scope: String,
    #[serde(default, rename = "group_key", skip_serializing_if = "Option::is_none")]
    pub group_key: Option<String>,
    #[serde(default)]
    pub registration_id: String,
    #[serde(default)]
    pub symmetric_key: String,
    #[serde(default)]
    pub tags: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_update: Option<UpdateRecord>,
    /// Incremented on every write through [`ConfigStore::update`]
    #[serde(default)]
    pub revision: u64,
    /// Fields this agent does not interpret, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Identity needed to provision and authenticate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub global_endpoint: String,
    pub id_scope: String,
    pub registration_id: String,
    pub symmetric_key: String,
    pub tags: Map<String, Value>,
}

/// Firmware update bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecord {
    #[serde(default)]
    pub storage_account: String,
    #[serde(default)]
    pub container_name: String,
    #[serde(default)]
    pub sas_token: String,
    #[serde(default)]
    pub blob_base_path: String,
    #[serde(default)]
    pub current_version: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UpdateRecord {
    /// Base path without leading or trailing slashes
    #[must_use]
    pub fn normalized_base_path(&self) -> &str {
        self.blob_base_path.trim_matches('/')
    }

    /// Check that every field the updater needs is present
    ///
    /// # Errors
    /// Returns `ConfigError::MissingFields` naming every empty field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing = missing_fields(&[
            ("storageAccount", &self.storage_account),
            ("containerName", &self.container_name),
            ("blobBasePath", self.normalized_base_path()),
            ("currentVersion", &self.current_version),
            ("sasToken", &self.sas_token),
        ]);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingFields(missing))
        }
    }
}

impl DeviceRecord {
    /// Extract and validate the identity sub-record
    ///
    /// # Errors
    /// Returns `ConfigError::MissingFields` naming every empty field
    pub fn identity(&self) -> Result<IdentityRecord, ConfigError> {
        let missing = missing_fields(&[
            ("globalEndpoint", &self.global_endpoint),
            ("idScope", &self.id_scope),
            ("registrationId", &self.registration_id),
            ("symmetricKey", &self.symmetric_key),
        ]);
        if !missing.is_empty() {
            return Err(ConfigError::MissingFields(missing));
        }

        Ok(IdentityRecord {
            global_endpoint: self.global_endpoint.clone(),
            id_scope: self.id_scope.clone(),
            registration_id: self.registration_id.clone(),
            symmetric_key: self.symmetric_key.clone(),
            tags: self.tags.clone(),
        })
    }

    /// Extract and validate the update sub-record
    ///
    /// # Errors
    /// Returns `ConfigError::MissingFields` if the sub-record or any of its
    /// required fields is absent
    pub fn update_record(&self) -> Result<UpdateRecord, ConfigError> {
        let record = self.device_update.clone().unwrap_or_default();
        record.validate()?;
        Ok(record)
    }
}

fn missing_fields(fields: &[(&str, &str)]) -> Vec<String> {
    fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| (*name).to_string())
        .collect()
}

/// File-backed store for the device record
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Read and parse the record
    ///
    /// # Errors
    /// `NotFound` if the file is missing, `Parse` if it is not a valid record
    pub fn load(&self) -> Result<DeviceRecord, ConfigError> {
        let content = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ConfigError::NotFound(self.path.clone()),
            _ => ConfigError::Io(e.to_string()),
        })?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read-modify-write the record under an exclusive advisory lock
    ///
    /// The closure sees the freshly re-read record. On success the revision
    /// is bumped and the file is atomically replaced.
    ///
    /// # Errors
    /// Any load, lock or write failure. The on-disk record is unchanged when
    /// an error is returned.
    pub fn update<F>(&self, apply: F) -> Result<DeviceRecord, ConfigError>
    where
        F: FnOnce(&mut DeviceRecord),
    {
        let lock_path = self.lock_path();
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| ConfigError::Lock(format!("{}: {e}", lock_path.display())))?;
        lock_file
            .lock_exclusive()
            .map_err(|e| ConfigError::Lock(format!("{}: {e}", lock_path.display())))?;

        let mut record = self.load()?;
        apply(&mut record);
        record.revision += 1;
        self.write_atomic(&record)?;

        debug!(
            path = %self.path.display(),
            revision = record.revision,
            "device record updated"
        );

        // Lock is released when `lock_file` drops.
        drop(lock_file);
        Ok(record)
    }

    /// Record a successfully installed build
    ///
    /// # Errors
    /// See [`ConfigStore::update`]
    pub fn set_current_version(&self, version: &str) -> Result<DeviceRecord, ConfigError> {
        self.update(|record| {
            record
                .device_update
                .get_or_insert_with(UpdateRecord::default)
                .current_version = version.to_string();
        })
    }

    fn write_atomic(&self, record: &DeviceRecord) -> Result<(), ConfigError> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut content =
            serde_json::to_string_pretty(record).map_err(|e| ConfigError::Parse(e.to_string()))?;
        content.push('\n');

        let mut tmp =
            tempfile::NamedTempFile::new_in(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        tmp.persist(&self.path)
            .map_err(|e| ConfigError::Io(e.to_string()))?;

        restrict_permissions(&self.path);
        Ok(())
    }
}

/// Owner read/write only; failures are logged and ignored
fn restrict_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            warn!(path = %path.display(), error = %e, "failed to restrict record permissions");
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}
