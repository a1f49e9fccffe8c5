//! Build discovery and artifact selection
//!
//! Object names are laid out as `<base>/<build>/.../<file>`. A build is the
//! path segment directly under the base path.

use std::collections::BTreeSet;

use tracing::{debug, instrument, warn};

use crate::error::StoreError;
use crate::store::ArtifactStore;
use crate::version::BuildVersion;

/// Where artifacts live inside a build and what they are called
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    /// Directory segment that marks the target platform, matched
    /// case-insensitively
    pub platform_segment: String,
    /// Executable names accepted as-is or with `platform_suffix`
    pub executable_names: Vec<String>,
    /// Suffix of the secondary platform build, ranked after bare names
    pub platform_suffix: String,
    /// Extensions that never count as artifacts
    pub checksum_extensions: Vec<String>,
    /// Path under `<base>/<build>/` tried when discovery finds nothing
    pub fallback_path: String,
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self {
            platform_segment: "RaspberryPi".to_string(),
            executable_names: vec!["NexusRFIDReader".to_string(), "NexusRFIDPOC".to_string()],
            platform_suffix: ".exe".to_string(),
            checksum_extensions: vec![".md5".to_string(), ".sha256".to_string()],
            fallback_path: "RaspberryPi/NexusRFIDReader".to_string(),
        }
    }
}

impl ArtifactLayout {
    fn is_known_executable(&self, file_name: &str) -> bool {
        let suffix = self.platform_suffix.to_lowercase();
        self.executable_names.iter().any(|name| {
            let name = name.to_lowercase();
            file_name == name || file_name.strip_suffix(suffix.as_str()) == Some(name.as_str())
        })
    }

    fn is_checksum(&self, file_name: &str) -> bool {
        self.checksum_extensions
            .iter()
            .any(|ext| file_name.ends_with(ext.to_lowercase().as_str()))
    }

    fn is_suffixed(&self, name: &str) -> bool {
        name.to_lowercase()
            .ends_with(self.platform_suffix.to_lowercase().as_str())
    }
}

/// Build segment of `blob_name` relative to `base_path`
///
/// Returns `None` for names outside the base path or directly at it.
#[must_use]
pub fn extract_build<'a>(blob_name: &'a str, base_path: &str) -> Option<&'a str> {
    let rest = if base_path.is_empty() {
        blob_name
    } else {
        blob_name.strip_prefix(base_path)?.strip_prefix('/')?
    };

    rest.split('/').next().filter(|build| !build.is_empty())
}

/// All distinct build names under `base_path`
///
/// # Errors
/// Propagates the store's listing error
#[instrument(skip(store), fields(store = store.store_type()))]
pub async fn list_builds(
    store: &dyn ArtifactStore,
    base_path: &str,
) -> Result<BTreeSet<String>, StoreError> {
    let prefix = if base_path.is_empty() {
        String::new()
    } else {
        format!("{base_path}/")
    };

    let names = store.list(&prefix).await?;
    let builds: BTreeSet<String> = names
        .iter()
        .filter_map(|name| extract_build(name, base_path))
        .map(str::to_string)
        .collect();

    debug!(objects = names.len(), builds = builds.len(), "listed builds");
    Ok(builds)
}

/// Newest build strictly newer than `current`, if any
///
/// Builds that do not parse never qualify. Ties between equal parsed values
/// go to the lexicographically greatest name.
#[must_use]
pub fn find_newer_build<'a, I>(available: I, current: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let baseline = BuildVersion::parse_lenient(current);

    available
        .into_iter()
        .map(|build| (BuildVersion::parse_lenient(build), build))
        .filter(|(version, _)| *version > baseline)
        .max()
        .map(|(_, build)| build.clone())
}

/// Object path of the artifact to install for `build`
///
/// Listing errors are logged and fall through to the fixed fallback path.
#[instrument(skip(store, layout), fields(store = store.store_type()))]
pub async fn locate_artifact(
    store: &dyn ArtifactStore,
    base_path: &str,
    build: &str,
    layout: &ArtifactLayout,
) -> Option<String> {
    let build_prefix = if base_path.is_empty() {
        format!("{build}/")
    } else {
        format!("{base_path}/{build}/")
    };

    match store.list(&build_prefix).await {
        Ok(names) => {
            if let Some(found) = select_candidate(names, layout) {
                debug!(artifact = %found, "artifact discovered");
                return Some(found);
            }
        }
        Err(e) => warn!(error = %e, prefix = %build_prefix, "artifact search failed"),
    }

    let fallback = format!("{build_prefix}{}", layout.fallback_path);
    match store.exists(&fallback).await {
        Ok(true) => {
            debug!(artifact = %fallback, "using fallback artifact path");
            Some(fallback)
        }
        Ok(false) => None,
        Err(e) => {
            warn!(error = %e, path = %fallback, "fallback artifact check failed");
            None
        }
    }
}

fn select_candidate(names: Vec<String>, layout: &ArtifactLayout) -> Option<String> {
    let platform = format!("/{}/", layout.platform_segment.to_lowercase());
    let mut known = Vec::new();
    let mut other = Vec::new();

    for name in names {
        let lower = name.to_lowercase();
        if !lower.contains(&platform) || lower.ends_with('/') {
            continue;
        }

        let file_name = lower.rsplit('/').next().unwrap_or_default();
        if layout.is_known_executable(file_name) {
            known.push(name);
        } else if !layout.is_checksum(file_name) {
            other.push(name);
        }
    }

    let candidates = if known.is_empty() { other } else { known };
    candidates
        .into_iter()
        .min_by(|a, b| (layout.is_suffixed(a), a).cmp(&(layout.is_suffixed(b), b)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use async_trait::async_trait;
    use tokio::io::AsyncWrite;

    use super::*;

    struct ListingStore {
        names: Vec<String>,
        present: HashSet<String>,
        fail_list: bool,
    }

    impl ListingStore {
        fn new(names: &[&str]) -> Self {
            Self {
                names: names.iter().map(|s| (*s).to_string()).collect(),
                present: names.iter().map(|s| (*s).to_string()).collect(),
                fail_list: false,
            }
        }
    }

    #[async_trait]
    impl ArtifactStore for ListingStore {
        async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
            if self.fail_list {
                return Err(StoreError::Request("listing refused".to_string()));
            }
            Ok(self
                .names
                .iter()
                .filter(|n| n.starts_with(prefix))
                .cloned()
                .collect())
        }

        async fn exists(&self, path: &str) -> Result<bool, StoreError> {
            Ok(self.present.contains(path))
        }

        async fn download(
            &self,
            _path: &str,
            _dest: &mut (dyn AsyncWrite + Send + Unpin),
        ) -> Result<u64, StoreError> {
            Ok(0)
        }

        fn store_type(&self) -> &'static str {
            "listing"
        }
    }

    fn builds(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_extract_build() {
        assert_eq!(extract_build("builds/20250101.1/x/y", "builds"), Some("20250101.1"));
        assert_eq!(extract_build("a/b/20250101.1/x", "a/b"), Some("20250101.1"));
        assert_eq!(extract_build("20250101.1/x", ""), Some("20250101.1"));
        assert_eq!(extract_build("other/20250101.1/x", "builds"), None);
        assert_eq!(extract_build("buildsX/20250101.1/x", "builds"), None);
        assert_eq!(extract_build("builds", "builds"), None);
        assert_eq!(extract_build("builds//x", "builds"), None);
    }

    #[test]
    fn test_maximum_ignores_bogus() {
        let available = builds(&["20250101.1", "20250101.2", "20240101.9", "bogus"]);
        assert_eq!(
            find_newer_build(&available, "").as_deref(),
            Some("20250101.2")
        );
    }

    #[test]
    fn test_no_update_when_current_is_newest() {
        let available = builds(&["20250101.1", "20250101.2", "20240101.9", "bogus"]);
        assert_eq!(find_newer_build(&available, "20250101.2"), None);
    }

    #[test]
    fn test_newer_build_selected() {
        let available = builds(&["20250101.1", "20250101.2", "20240101.9", "bogus"]);
        assert_eq!(
            find_newer_build(&available, "20240101.9").as_deref(),
            Some("20250101.2")
        );
    }

    #[test]
    fn test_long_sequence_selected() {
        let available = builds(&["20250101.18446744073709551616", "20240101.9"]);
        assert_eq!(
            find_newer_build(&available, "20240101.9").as_deref(),
            Some("20250101.18446744073709551616")
        );
        assert_eq!(
            find_newer_build(&available, "20250101.18446744073709551616"),
            None
        );
    }

    #[test]
    fn test_bogus_never_selected() {
        let available = builds(&["bogus", "junk"]);
        assert_eq!(find_newer_build(&available, ""), None);
        assert_eq!(find_newer_build(&available, "bogus"), None);
    }

    #[tokio::test]
    async fn test_list_builds_collapses_duplicates() {
        let store = ListingStore::new(&[
            "fw/20250101.1/RaspberryPi/NexusRFIDReader",
            "fw/20250101.1/RaspberryPi/NexusRFIDReader.md5",
            "fw/20250101.2/RaspberryPi/NexusRFIDReader",
            "fw/readme.txt",
            "elsewhere/20990101.1/RaspberryPi/NexusRFIDReader",
        ]);

        let found = list_builds(&store, "fw").await.unwrap();
        assert_eq!(found, builds(&["20250101.1", "20250101.2", "readme.txt"]));
    }

    #[tokio::test]
    async fn test_locate_prefers_known_bare_name() {
        let store = ListingStore::new(&[
            "fw/20250101.2/RaspberryPi/NexusRFIDReader.exe",
            "fw/20250101.2/RaspberryPi/NexusRFIDReader",
            "fw/20250101.2/RaspberryPi/NexusRFIDPOC",
            "fw/20250101.2/RaspberryPi/notes.txt",
            "fw/20250101.2/Windows/NexusRFIDReader.exe",
        ]);

        let found = locate_artifact(&store, "fw", "20250101.2", &ArtifactLayout::default()).await;
        assert_eq!(
            found.as_deref(),
            Some("fw/20250101.2/RaspberryPi/NexusRFIDPOC")
        );
    }

    #[tokio::test]
    async fn test_locate_ranks_suffixed_last() {
        let store = ListingStore::new(&[
            "fw/1/raspberrypi/NexusRFIDPOC.exe",
            "fw/1/raspberrypi/NexusRFIDReader",
        ]);

        let found = locate_artifact(&store, "fw", "1", &ArtifactLayout::default()).await;
        assert_eq!(found.as_deref(), Some("fw/1/raspberrypi/NexusRFIDReader"));
    }

    #[tokio::test]
    async fn test_locate_accepts_other_files_when_no_known_name() {
        let store = ListingStore::new(&[
            "fw/1/RaspberryPi/firmware.bin.sha256",
            "fw/1/RaspberryPi/firmware.bin",
            "fw/1/RaspberryPi/sub/",
            "fw/1/Linux/agent",
        ]);

        let found = locate_artifact(&store, "fw", "1", &ArtifactLayout::default()).await;
        assert_eq!(found.as_deref(), Some("fw/1/RaspberryPi/firmware.bin"));
    }

    #[tokio::test]
    async fn test_locate_uses_fallback_path() {
        let mut store = ListingStore::new(&["fw/1/RaspberryPi/NexusRFIDReader"]);
        store.fail_list = true;

        let found = locate_artifact(&store, "fw", "1", &ArtifactLayout::default()).await;
        assert_eq!(found.as_deref(), Some("fw/1/RaspberryPi/NexusRFIDReader"));
    }

    #[tokio::test]
    async fn test_locate_nothing_downloadable() {
        let store = ListingStore::new(&[
            "fw/1/RaspberryPi/NexusRFIDReader.md5",
            "fw/1/Windows/NexusRFIDReader.exe",
        ]);

        let found = locate_artifact(&store, "fw", "1", &ArtifactLayout::default()).await;
        assert_eq!(found, None);
    }
}
