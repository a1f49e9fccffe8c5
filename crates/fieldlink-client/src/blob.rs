//! Object store client for firmware artifacts
//!
//! Container listing returns XML; only `<Name>` and `<NextMarker>` are read.

use std::sync::LazyLock;

use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use reqwest::{Client, StatusCode};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument};
use url::Url;

use fieldlink_core::UpdateRecord;
use fieldlink_update::{ArtifactStore, StoreError};

use crate::error::{ClientError, Result};

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Name>([^<]*)</Name>").expect("Invalid blob name pattern"));
static NEXT_MARKER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<NextMarker>([^<]+)</NextMarker>").expect("Invalid next marker pattern")
});

fn unescape_xml(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Object names and the continuation marker from one listing page
fn parse_listing(body: &str) -> (Vec<String>, Option<String>) {
    let names = NAME_PATTERN
        .captures_iter(body)
        .map(|c| unescape_xml(&c[1]))
        .collect();
    let marker = NEXT_MARKER_PATTERN
        .captures(body)
        .map(|c| unescape_xml(&c[1]));
    (names, marker)
}

/// Blob container accessed with a SAS token
#[derive(Debug, Clone)]
pub struct BlobStore {
    client: Client,
    endpoint: Url,
    container: String,
    sas_token: String,
}

impl BlobStore {
    /// Client for `https://<account>.blob.core.windows.net/<container>`
    ///
    /// # Errors
    /// Returns an error if any argument is empty or the account name does
    /// not form a valid host.
    pub fn new(account: &str, container: &str, sas_token: &str) -> Result<Self> {
        let account = account.trim();
        if account.is_empty() {
            return Err(ClientError::InvalidResponse(
                "storage account is empty".to_string(),
            ));
        }
        Self::with_endpoint(
            &format!("https://{account}.blob.core.windows.net"),
            container,
            sas_token,
        )
    }

    /// Client for a container under an explicit service endpoint
    ///
    /// # Errors
    /// Returns an error if the endpoint is not a URL or the container is empty.
    pub fn with_endpoint(endpoint: &str, container: &str, sas_token: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        if endpoint.cannot_be_a_base() {
            return Err(ClientError::InvalidResponse(format!(
                "'{endpoint}' cannot be a base URL"
            )));
        }

        let container = container.trim().trim_matches('/');
        if container.is_empty() {
            return Err(ClientError::InvalidResponse(
                "container name is empty".to_string(),
            ));
        }

        Ok(Self {
            client: Client::builder().build()?,
            endpoint,
            container: container.to_string(),
            sas_token: sas_token.trim().trim_start_matches('?').to_string(),
        })
    }

    /// Client for the container named in the device record
    ///
    /// # Errors
    /// See [`BlobStore::new`]
    pub fn from_record(record: &UpdateRecord) -> Result<Self> {
        Self::new(
            &record.storage_account,
            &record.container_name,
            &record.sas_token,
        )
    }

    fn container_url(&self, object: Option<&str>) -> Url {
        let mut url = self.endpoint.clone();
        // `with_endpoint` rejects cannot-be-a-base URLs.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&self.container);
            if let Some(object) = object {
                segments.extend(object.split('/'));
            }
        }
        url
    }

    fn with_sas(&self, mut url: Url, params: &[(&str, &str)]) -> Url {
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }

        if !self.sas_token.is_empty() {
            let query = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{existing}&{}", self.sas_token),
                _ => self.sas_token.clone(),
            };
            url.set_query(Some(&query));
        }
        url
    }

    fn list_url(&self, prefix: &str, marker: Option<&str>) -> Url {
        let mut params = vec![("restype", "container"), ("comp", "list"), ("prefix", prefix)];
        if let Some(marker) = marker {
            params.push(("marker", marker));
        }
        self.with_sas(self.container_url(None), &params)
    }

    fn object_url(&self, path: &str) -> Url {
        self.with_sas(self.container_url(Some(path)), &[])
    }

    async fn list_page(
        &self,
        prefix: &str,
        marker: Option<&str>,
    ) -> std::result::Result<String, StoreError> {
        let response = self
            .client
            .get(self.list_url(prefix, marker))
            .send()
            .await
            .map_err(ClientError::from)?;

        if !response.status().is_success() {
            return Err(StoreError::Status {
                status: response.status().as_u16(),
                path: prefix.to_string(),
            });
        }

        Ok(response.text().await.map_err(ClientError::from)?)
    }
}

#[async_trait]
impl ArtifactStore for BlobStore {
    #[instrument(skip(self), fields(container = %self.container))]
    async fn list(&self, prefix: &str) -> std::result::Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;
        let mut pages = 0;

        loop {
            let body = self.list_page(prefix, marker.as_deref()).await?;
            let (page, next) = parse_listing(&body);
            names.extend(page);
            pages += 1;

            match next {
                Some(next) if marker.as_deref() != Some(next.as_str()) => marker = Some(next),
                _ => break,
            }
        }

        debug!(objects = names.len(), pages, "listed objects");
        Ok(names)
    }

    async fn exists(&self, path: &str) -> std::result::Result<bool, StoreError> {
        let response = self
            .client
            .head(self.object_url(path))
            .send()
            .await
            .map_err(ClientError::from)?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(StoreError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            }),
        }
    }

    #[instrument(skip(self, dest), fields(container = %self.container))]
    async fn download(
        &self,
        path: &str,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> std::result::Result<u64, StoreError> {
        let response = self
            .client
            .get(self.object_url(path))
            .send()
            .await
            .map_err(ClientError::from)?;

        if !response.status().is_success() {
            return Err(StoreError::Status {
                status: response.status().as_u16(),
                path: path.to_string(),
            });
        }

        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(ClientError::from)?;
            dest.write_all(&chunk)
                .await
                .map_err(|e| StoreError::Io(e.to_string()))?;
            written += chunk.len() as u64;
        }
        dest.flush()
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;

        debug!(bytes = written, "download complete");
        Ok(written)
    }

    fn store_type(&self) -> &'static str {
        "blob"
    }
}
