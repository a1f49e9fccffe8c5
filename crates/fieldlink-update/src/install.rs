//! Atomic artifact install

use std::path::Path;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::error::StoreError;
use crate::store::ArtifactStore;

fn io_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::Io(e.to_string())
}

/// Stream `blob_path` to `destination` and mark it executable
///
/// Bytes land in a temp file beside `destination` which is renamed into
/// place only after the transfer completed. On error the temp file is
/// removed and `destination` is untouched.
///
/// # Errors
/// Any store or local I/O error before the rename
#[instrument(skip(store, destination), fields(store = store.store_type(), destination = %destination.display()))]
pub async fn download_and_install(
    store: &dyn ArtifactStore,
    blob_path: &str,
    destination: &Path,
) -> Result<u64, StoreError> {
    let parent = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    tokio::fs::create_dir_all(parent).await.map_err(io_error)?;

    let (file, temp_path) = tempfile::NamedTempFile::new_in(parent)
        .map_err(io_error)?
        .into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let bytes = store.download(blob_path, &mut file).await?;
    file.flush().await.map_err(io_error)?;
    file.sync_all().await.map_err(io_error)?;
    drop(file);

    set_readable(&temp_path);
    temp_path
        .persist(destination)
        .map_err(|e| io_error(e.error))?;

    ensure_executable(destination);
    info!(bytes, "artifact installed");
    Ok(bytes)
}

#[cfg(unix)]
fn set_readable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)) {
        debug!(error = %e, "could not relax temp file permissions");
    }
}

#[cfg(not(unix))]
fn set_readable(_path: &Path) {}

/// Add execute permission for user, group and other; best effort
#[cfg(unix)]
pub fn ensure_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let result = std::fs::metadata(path).and_then(|meta| {
        let mut perms = meta.permissions();
        perms.set_mode(perms.mode() | 0o111);
        std::fs::set_permissions(path, perms)
    });

    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "could not mark artifact executable");
    }
}

#[cfg(not(unix))]
pub fn ensure_executable(_path: &Path) {}
