//! fieldlink-client: Network adapters for the fieldlink agent
//!
//! Implements the transport seams of `fieldlink-core` and the artifact store
//! of `fieldlink-update` against real services:
//!
//! - [`DpsClient`]: device provisioning over HTTPS
//! - [`WsHubConnector`]: hub sessions over WebSocket
//! - [`BlobStore`]: firmware artifacts in a blob container
//!
//! # Examples
//!
//! ```no_run
//! use fieldlink_client::BlobStore;
//! use fieldlink_update::ArtifactStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = BlobStore::new("fwstore", "firmware", "sv=2024&sig=...")?;
//! for name in store.list("nexus/").await? {
//!     println!("{name}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod blob;
pub mod dps;
pub mod error;
pub mod hub;

pub use blob::BlobStore;
pub use dps::DpsClient;
pub use error::{ClientError, Result};
pub use hub::{WsHubConnector, WsHubSession};
