//! Remote command dispatch
//!
//! Any holder of the hub session credential can run processes on the device
//! through this dispatcher. No further authentication happens here.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use fieldlink_api::requests::CommandRequest;
use fieldlink_api::responses::{
    CommandResponse, STATUS_BAD_REQUEST, STATUS_INTERNAL_ERROR, STATUS_OK,
};
use fieldlink_exec::CommandExecutor;

/// Wall-clock limit for a single remote command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Response document plus the transport status it travels with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodOutcome {
    pub status: u16,
    pub response: CommandResponse,
}

/// Executes inbound command requests
#[derive(Clone)]
pub struct CommandDispatcher {
    executor: Arc<dyn CommandExecutor>,
    timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Handle one request payload; blocks until the command finishes or
    /// times out
    pub async fn dispatch(&self, payload: &Value) -> MethodOutcome {
        let request = CommandRequest::from_payload(payload);

        let Some(command) = request.command() else {
            warn!("method request without a command");
            return MethodOutcome {
                status: STATUS_BAD_REQUEST,
                response: CommandResponse::error("No command provided"),
            };
        };

        let outcome = match self.executor.run_with_timeout(command, self.timeout).await {
            Ok(result) => MethodOutcome {
                status: STATUS_OK,
                response: CommandResponse::Success {
                    return_code: result.status,
                    stdout: result.stdout,
                    stderr: result.stderr,
                },
            },
            Err(e) => MethodOutcome {
                status: STATUS_INTERNAL_ERROR,
                response: CommandResponse::error(e.to_string()),
            },
        };

        info!(
            command = %command,
            executor = self.executor.executor_type(),
            status = outcome.status,
            "executed remote command"
        );

        outcome
    }
}
