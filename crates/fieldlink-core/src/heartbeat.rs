//! Heartbeat cadence and the cooperative wait between heartbeats

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use fieldlink_api::events::MethodRequest;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Heartbeat timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Time between heartbeats; also the reconnect cadence
    pub interval: Duration,
    /// Granularity of the wait; shutdown is observed at least this often
    pub tick: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_HEARTBEAT_INTERVAL,
            tick: DEFAULT_TICK,
        }
    }
}

/// What ended one tick of waiting
#[derive(Debug)]
pub enum Wake {
    /// The tick elapsed
    Tick,
    /// Shutdown was requested
    Cancelled,
    /// A method request arrived
    Inbound(MethodRequest),
    /// The session's request stream ended
    InboundClosed,
}

/// Wait until `wake_at` at the latest
///
/// Cancellation wins over an elapsed timer, which wins over a pending
/// request. Queued requests therefore never hold back a heartbeat.
pub async fn next_wake(
    wake_at: Instant,
    cancel: &CancellationToken,
    inbound: &mut Option<mpsc::Receiver<MethodRequest>>,
) -> Wake {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Wake::Cancelled,
        () = tokio::time::sleep_until(wake_at) => Wake::Tick,
        request = recv(inbound) => match request {
            Some(request) => Wake::Inbound(request),
            None => Wake::InboundClosed,
        },
    }
}

async fn recv(inbound: &mut Option<mpsc::Receiver<MethodRequest>>) -> Option<MethodRequest> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
