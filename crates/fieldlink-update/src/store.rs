//! Artifact store trait

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::error::StoreError;

/// Remote object store holding build artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Names of all objects starting with `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Whether an object exists at `path`
    async fn exists(&self, path: &str) -> Result<bool, StoreError>;

    /// Stream the object at `path` into `dest`, returning the byte count
    async fn download(
        &self,
        path: &str,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StoreError>;

    fn store_type(&self) -> &'static str;
}
