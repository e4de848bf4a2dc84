//! Broadcast Scheduler
//!
//! Drives the fixed-cadence tick: reconnect sweep, read sweep, fan-out.
//! Each tick runs as its own task so a panic inside it is contained; the
//! loop only ends when the shutdown token fires.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{read_sweep, reconnect_sweep, PollError, PollExecutor, ReconnectSummary};
use crate::device::DeviceSupervisor;
use crate::snapshot::Snapshot;
use crate::websocket::{BroadcastReport, SubscriberRegistry};

/// Cadence settings for the control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub interval: Duration,
    /// Minimum time between two connection attempts on one device
    pub reconnect_cooldown: Duration,
    /// Pause after a failed tick
    pub error_backoff: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            reconnect_cooldown: Duration::from_secs(5 * 60),
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub reconnect: ReconnectSummary,
    pub devices: usize,
    pub delivery: BroadcastReport,
}

/// Periodic poll-and-broadcast loop
pub struct BroadcastScheduler {
    devices: Vec<Arc<DeviceSupervisor>>,
    executor: Arc<PollExecutor>,
    registry: Arc<SubscriberRegistry>,
    settings: SchedulerSettings,
    cancel: CancellationToken,
    latest: watch::Sender<Arc<Vec<Snapshot>>>,
    ticks: AtomicU64,
}

impl BroadcastScheduler {
    pub fn new(
        devices: Vec<Arc<DeviceSupervisor>>,
        executor: Arc<PollExecutor>,
        registry: Arc<SubscriberRegistry>,
        settings: SchedulerSettings,
        cancel: CancellationToken,
    ) -> Self {
        let (latest, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            devices,
            executor,
            registry,
            settings,
            cancel,
            latest,
            ticks: AtomicU64::new(0),
        }
    }

    /// Start the scheduler background task
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Run until the shutdown token fires
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            devices = self.devices.len(),
            interval_secs = self.settings.interval.as_secs_f64(),
            "Broadcast scheduler started"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let scheduler = Arc::clone(&self);
            match tokio::spawn(async move { scheduler.tick().await }).await {
                Ok(Ok(report)) => {
                    tracing::debug!(
                        attempted = report.reconnect.attempted,
                        connected = report.reconnect.connected,
                        delivered = report.delivery.delivered,
                        dropped = report.delivery.dropped,
                        removed = report.delivery.removed,
                        "Tick complete"
                    );
                }
                Ok(Err(PollError::ShuttingDown)) => break,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Tick failed");
                    self.backoff().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Tick panicked");
                    self.backoff().await;
                }
            }
        }

        tracing::info!("Broadcast scheduler stopped");
    }

    async fn backoff(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(self.settings.error_backoff) => {}
        }
    }

    /// One full poll-and-broadcast cycle
    pub async fn tick(&self) -> Result<TickReport, PollError> {
        let reconnect = reconnect_sweep(
            &self.executor,
            &self.devices,
            Instant::now(),
            self.settings.reconnect_cooldown,
        )
        .await?;

        let batch = read_sweep(&self.executor, &self.devices).await?;
        let delivery = self.registry.broadcast(&batch).await;

        let devices = batch.len();
        self.latest.send_replace(Arc::new(batch));
        self.ticks.fetch_add(1, Ordering::Relaxed);

        Ok(TickReport {
            reconnect,
            devices,
            delivery,
        })
    }

    /// Number of completed ticks
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Batch produced by the last completed tick
    pub fn latest(&self) -> Arc<Vec<Snapshot>> {
        self.latest.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Snapshot>>> {
        self.latest.subscribe()
    }

    pub fn devices(&self) -> &[Arc<DeviceSupervisor>] {
        &self.devices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{
        ConnectionStatus, DeviceDescriptor, SimulatedConnector, SimulatedServer, SupervisorSettings,
    };
    use crate::directory::Visibility;
    use crate::websocket::{HubConfig, ServerMessage};
    use tokio::sync::mpsc;

    const ROOT: &str = "ns=3;s=ServerInterfaces";

    struct Fixture {
        scheduler: Arc<BroadcastScheduler>,
        registry: Arc<SubscriberRegistry>,
        servers: Vec<Arc<SimulatedServer>>,
        cancel: CancellationToken,
    }

    fn fixture(names: &[&str], settings: SchedulerSettings) -> Fixture {
        let cancel = CancellationToken::new();
        let mut connector = SimulatedConnector::new();
        let mut servers = Vec::new();
        let mut descriptors = Vec::new();
        for name in names {
            let url = format!("opc.tcp://{name}:4840");
            let server = Arc::new(SimulatedServer::demo(*name, ROOT));
            connector = connector.with_server(url.clone(), Arc::clone(&server));
            servers.push(server);
            descriptors.push(DeviceDescriptor::new(*name, *name, url, ROOT));
        }

        let connector: Arc<SimulatedConnector> = Arc::new(connector);
        let devices: Vec<_> = descriptors
            .into_iter()
            .map(|d| {
                Arc::new(DeviceSupervisor::new(
                    d,
                    connector.clone(),
                    SupervisorSettings::default(),
                ))
            })
            .collect();

        let executor = Arc::new(PollExecutor::for_devices(devices.len(), cancel.clone()));
        let registry = Arc::new(SubscriberRegistry::new(HubConfig::default()));
        let scheduler = Arc::new(BroadcastScheduler::new(
            devices,
            executor,
            Arc::clone(&registry),
            settings,
            cancel.clone(),
        ));

        Fixture {
            scheduler,
            registry,
            servers,
            cancel,
        }
    }

    #[tokio::test]
    async fn test_tick_connects_and_broadcasts() {
        let fx = fixture(&["a", "b"], SchedulerSettings::default());
        let (tx, mut rx) = mpsc::channel(8);
        fx.registry
            .register("u1", Visibility::Unrestricted, tx)
            .await
            .unwrap();

        let report = fx.scheduler.tick().await.unwrap();
        assert_eq!(report.reconnect.attempted, 2);
        assert_eq!(report.reconnect.connected, 2);
        assert_eq!(report.devices, 2);
        assert_eq!(report.delivery.delivered, 1);

        match rx.recv().await.unwrap() {
            ServerMessage::TelemetryUpdate { data } => {
                assert_eq!(data.plc_clients.len(), 2);
                assert_eq!(data.plc_clients[0].url, "opc.tcp://a:4840");
                assert!(data
                    .plc_clients
                    .iter()
                    .all(|s| s.status == ConnectionStatus::Connected));
            }
            other => panic!("unexpected message: {other:?}"),
        }

        assert_eq!(fx.scheduler.ticks(), 1);
        assert_eq!(fx.scheduler.latest().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_gates_reconnects() {
        let settings = SchedulerSettings {
            reconnect_cooldown: Duration::from_secs(5 * 60),
            ..SchedulerSettings::default()
        };
        let fx = fixture(&["a"], settings);
        fx.servers[0].set_reachable(false);

        // t0: first attempt fails
        fx.scheduler.tick().await.unwrap();
        assert_eq!(fx.servers[0].connect_attempts(), 1);

        // t0 + 2 min: inside the cooldown window
        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        let report = fx.scheduler.tick().await.unwrap();
        assert_eq!(report.reconnect.attempted, 0);
        assert_eq!(fx.servers[0].connect_attempts(), 1);

        // t0 + 6 min: retried
        fx.servers[0].set_reachable(true);
        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        let report = fx.scheduler.tick().await.unwrap();
        assert_eq!(report.reconnect.attempted, 1);
        assert_eq!(report.reconnect.connected, 1);
        assert_eq!(fx.servers[0].connect_attempts(), 2);
    }

    #[tokio::test]
    async fn test_failed_device_does_not_block_others() {
        let fx = fixture(&["a", "b"], SchedulerSettings::default());
        fx.servers[1].set_reachable(false);

        fx.scheduler.tick().await.unwrap();
        let batch = fx.scheduler.latest();
        assert_eq!(batch[0].status, ConnectionStatus::Connected);
        assert!(!batch[0].nodes.is_empty());
        assert_eq!(batch[1].status, ConnectionStatus::Disconnected);
        assert!(batch[1].nodes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let fx = fixture(&["a"], SchedulerSettings::default());
        let mut updates = fx.scheduler.subscribe();
        let handle = Arc::clone(&fx.scheduler).start();

        updates.changed().await.unwrap();
        assert!(fx.scheduler.ticks() >= 1);

        fx.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }
}
