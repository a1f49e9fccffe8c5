//! Wiring from settings to the agent's collaborators

use std::sync::Arc;
use std::time::Duration;

use fieldlink_client::{DpsClient, WsHubConnector};
use fieldlink_core::{
    CommandDispatcher, HeartbeatConfig, IdentityRecord, Provisioner, SessionActorArgs,
};
use fieldlink_exec::{CommandExecutor, LocalExecutor};

use crate::config::Settings;

/// Builds the network and execution components for one agent run
pub struct AgentFactory {
    settings: Settings,
}

impl AgentFactory {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn executor(&self) -> Arc<dyn CommandExecutor> {
        Arc::new(LocalExecutor::with_mode(self.settings.commands.mode))
    }

    pub fn dispatcher(&self) -> CommandDispatcher {
        CommandDispatcher::new(self.executor())
            .with_timeout(Duration::from_secs(self.settings.commands.timeout_secs))
    }

    pub fn heartbeat(&self) -> HeartbeatConfig {
        self.settings.heartbeat.to_config()
    }

    fn provisioning_client(&self) -> DpsClient {
        let provisioning = &self.settings.provisioning;
        DpsClient::new()
            .api_version(provisioning.api_version.clone())
            .poll_interval(Duration::from_secs(provisioning.poll_interval_secs))
            .max_polls(provisioning.max_polls)
    }

    /// Spawn arguments for the `SessionActor` of `identity`
    pub fn session_args(&self, identity: IdentityRecord) -> SessionActorArgs {
        SessionActorArgs {
            identity,
            provisioner: Provisioner::new(Arc::new(self.provisioning_client())),
            connector: Arc::new(WsHubConnector::new()),
        }
    }
}
