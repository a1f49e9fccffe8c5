//! Device provisioning handshake

use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::config::IdentityRecord;
use crate::error::CoreError;
use crate::state::DeviceAssignment;
use crate::transport::ProvisioningClient;

/// Status the provisioning service reports for a successful registration
pub const ASSIGNED: &str = "assigned";

/// Exchanges the device credential for a hub assignment
///
/// One call, no retries.
#[derive(Clone)]
pub struct Provisioner {
    client: Arc<dyn ProvisioningClient>,
}

impl Provisioner {
    pub fn new(client: Arc<dyn ProvisioningClient>) -> Self {
        Self { client }
    }

    /// Register the device
    ///
    /// # Errors
    /// `ProvisioningFailure` when the final status is not `assigned` or the
    /// assignment is incomplete, `Transport` when the service is unreachable
    #[instrument(skip_all, fields(registration_id = %identity.registration_id))]
    pub async fn register(&self, identity: &IdentityRecord) -> Result<DeviceAssignment, CoreError> {
        let operation = self
            .client
            .register(identity)
            .await
            .map_err(|e| CoreError::Transport(e.to_string()))?;

        if operation.status != ASSIGNED {
            error!(status = %operation.status, "provisioning failed");
            return Err(CoreError::ProvisioningFailure {
                status: operation.status,
            });
        }

        let state = operation.registration_state.unwrap_or_default();
        let (Some(assigned_hub), Some(device_id)) = (state.assigned_hub, state.device_id) else {
            error!("provisioning service returned an incomplete assignment");
            return Err(CoreError::ProvisioningFailure {
                status: format!("{ASSIGNED} without hub or device id"),
            });
        };

        info!(hub = %assigned_hub, device_id = %device_id, "provisioned");

        Ok(DeviceAssignment {
            assigned_hub,
            device_id,
        })
    }
}
