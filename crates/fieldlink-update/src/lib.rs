//! fieldlink-update: Firmware update resolution
//!
//! Lists builds in a remote artifact store, picks the newest build that
//! supersedes the installed one, downloads its artifact and records the new
//! version in the device record.

pub mod error;
pub mod install;
pub mod resolver;
pub mod store;
pub mod updater;
pub mod version;

pub use error::{StoreError, UpdateError};
pub use resolver::{ArtifactLayout, find_newer_build, list_builds, locate_artifact};
pub use store::ArtifactStore;
pub use updater::{DEFAULT_DESTINATION, UpdateOutcome, Updater, load_update_record};
pub use version::{BuildVersion, VersionError, is_newer};
