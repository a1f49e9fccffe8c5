//! Provisioning service client
//!
//! One registration is a `PUT .../register` followed, while the service
//! answers `assigning`, by polling the returned operation at a fixed
//! interval.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use tracing::{debug, info, instrument};
use url::Url;

use fieldlink_api::requests::RegistrationRequest;
use fieldlink_api::responses::RegistrationOperation;
use fieldlink_core::credential::{REGISTRATION_KEY_NAME, sas_token_from_now};
use fieldlink_core::{IdentityRecord, ProvisioningClient, TransportError};

use crate::error::{ClientError, Result, check_status, endpoint_url};

pub const DEFAULT_API_VERSION: &str = "2021-06-01";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_POLLS: u32 = 20;

const ASSIGNING: &str = "assigning";

/// HTTP client for the device provisioning service
#[derive(Debug, Clone)]
pub struct DpsClient {
    client: Client,
    api_version: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl Default for DpsClient {
    fn default() -> Self {
        Self::with_client(Client::new())
    }
}

impl DpsClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provisioning client with a custom `reqwest::Client`
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            api_version: DEFAULT_API_VERSION.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    #[must_use]
    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls;
        self
    }

    fn url(&self, base: &Url, path: &str) -> Result<Url> {
        let mut url = base.join(path)?;
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }

    /// Register `identity` and wait for the final operation status
    ///
    /// # Errors
    /// Returns an error if a request fails, the service answers with an
    /// error status, or the operation is still assigning after `max_polls`.
    ///
    /// # Example
    /// ```no_run
    /// # use fieldlink_client::DpsClient;
    /// # use fieldlink_core::IdentityRecord;
    /// # async fn example(identity: IdentityRecord) -> Result<(), Box<dyn std::error::Error>> {
    /// let operation = DpsClient::new().register_device(&identity).await?;
    /// println!("status: {}", operation.status);
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self, identity), fields(registration_id = %identity.registration_id))]
    pub async fn register_device(&self, identity: &IdentityRecord) -> Result<RegistrationOperation> {
        let base = endpoint_url(&identity.global_endpoint, "https")?;
        let resource = format!(
            "{}/registrations/{}",
            identity.id_scope, identity.registration_id
        );
        let token = sas_token_from_now(
            &resource,
            &identity.symmetric_key,
            Some(REGISTRATION_KEY_NAME),
        )?;

        let body = RegistrationRequest {
            registration_id: identity.registration_id.clone(),
            payload: (!identity.tags.is_empty()).then(|| Value::Object(identity.tags.clone())),
        };

        let url = self.url(&base, &format!("{resource}/register"))?;
        let response = self
            .client
            .put(url)
            .header(AUTHORIZATION, &token)
            .json(&body)
            .send()
            .await?;
        let mut operation: RegistrationOperation = check_status(response).await?.json().await?;

        let mut polls = 0;
        while operation.status == ASSIGNING {
            if polls >= self.max_polls {
                return Err(ClientError::InvalidResponse(format!(
                    "registration still assigning after {polls} polls"
                )));
            }
            let Some(operation_id) = operation.operation_id.clone() else {
                return Err(ClientError::InvalidResponse(
                    "assigning operation without operationId".to_string(),
                ));
            };

            debug!(operation_id = %operation_id, poll = polls + 1, "registration assigning");
            tokio::time::sleep(self.poll_interval).await;
            polls += 1;

            let url = self.url(&base, &format!("{resource}/operations/{operation_id}"))?;
            let response = self
                .client
                .get(url)
                .header(AUTHORIZATION, &token)
                .send()
                .await?;
            operation = check_status(response).await?.json().await?;
        }

        info!(status = %operation.status, polls, "registration finished");
        Ok(operation)
    }
}

#[async_trait]
impl ProvisioningClient for DpsClient {
    async fn register(
        &self,
        identity: &IdentityRecord,
    ) -> std::result::Result<RegistrationOperation, TransportError> {
        Ok(self.register_device(identity).await?)
    }
}
