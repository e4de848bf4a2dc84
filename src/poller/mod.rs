//! Device Polling
//!
//! The reconnect and read sweeps that make up one tick, the bounded
//! executor they run on, and the scheduler that drives them.

mod executor;
mod scheduler;

pub use executor::{PollError, PollExecutor};
pub use scheduler::{BroadcastScheduler, SchedulerSettings, TickReport};

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::device::DeviceSupervisor;
use crate::snapshot::Snapshot;

/// Outcome of a reconnect sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconnectSummary {
    pub attempted: usize,
    pub connected: usize,
}

/// Reconnect every device that is down and out of its cooldown window
pub async fn reconnect_sweep(
    executor: &PollExecutor,
    devices: &[Arc<DeviceSupervisor>],
    now: Instant,
    cooldown: Duration,
) -> Result<ReconnectSummary, PollError> {
    let due: Vec<Arc<DeviceSupervisor>> = devices
        .iter()
        .filter(|device| device.reconnect_due(now, cooldown))
        .cloned()
        .collect();

    if due.is_empty() {
        return Ok(ReconnectSummary::default());
    }

    let attempted = due.len();
    let results = executor
        .map(due, |device| async move { device.connect_and_discover().await.is_ok() })
        .await?;

    Ok(ReconnectSummary {
        attempted,
        connected: results.into_iter().filter(|ok| *ok).count(),
    })
}

/// Read every device, one snapshot each, in device order
pub async fn read_sweep(
    executor: &PollExecutor,
    devices: &[Arc<DeviceSupervisor>],
) -> Result<Vec<Snapshot>, PollError> {
    executor
        .map(devices.to_vec(), |device| async move { device.read_all().await })
        .await
}
