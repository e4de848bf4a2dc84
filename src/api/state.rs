//! Application State
//!
//! Shared state accessible by all API handlers, built once at startup and
//! torn down explicitly at shutdown. Wrapped in Arc for sharing across tasks.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::error::{ApiError, ApiResult};
use crate::config::{Config, DirectoryConfig, TransportKind};
use crate::device::{Connector, DeviceSupervisor, OpcuaConnector, SimulatedConnector};
use crate::directory::{Directory, HttpDirectory, StaticDirectory, VisibilityResolver};
use crate::poller::{BroadcastScheduler, PollExecutor};
use crate::websocket::SubscriberRegistry;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// One supervisor per configured device, in configuration order
    pub devices: Arc<Vec<Arc<DeviceSupervisor>>>,
    /// Bounded pool all device I/O runs on
    pub executor: Arc<PollExecutor>,
    /// Live WebSocket subscribers
    pub registry: Arc<SubscriberRegistry>,
    /// Poll-and-broadcast loop
    pub scheduler: Arc<BroadcastScheduler>,
    /// Token → principal → visibility
    pub resolver: Arc<VisibilityResolver>,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Process-wide shutdown signal
    pub cancel: CancellationToken,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Wire every component from explicit collaborators
    pub fn new(
        config: &Config,
        connector: Arc<dyn Connector>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        let descriptors = config.descriptors();
        let settings = config.supervisor_settings();
        let devices: Vec<Arc<DeviceSupervisor>> = descriptors
            .iter()
            .cloned()
            .map(|d| Arc::new(DeviceSupervisor::new(d, Arc::clone(&connector), settings)))
            .collect();

        let cancel = CancellationToken::new();
        let executor = Arc::new(PollExecutor::for_devices(devices.len(), cancel.clone()));
        let registry = Arc::new(SubscriberRegistry::new(config.hub_config()));
        let scheduler = Arc::new(BroadcastScheduler::new(
            devices.clone(),
            Arc::clone(&executor),
            Arc::clone(&registry),
            config.scheduler_settings(),
            cancel.clone(),
        ));
        let resolver = Arc::new(VisibilityResolver::new(directory, &descriptors));

        Self {
            devices: Arc::new(devices),
            executor,
            registry,
            scheduler,
            resolver,
            config: Arc::new(ApiConfig::from_config(config)),
            cancel,
            start_time: Instant::now(),
        }
    }

    /// Build the transport backend and directory named in the configuration
    pub fn from_config(config: &Config) -> ApiResult<Self> {
        let connector: Arc<dyn Connector> = match config.transport.kind {
            TransportKind::Simulated => Arc::new(SimulatedConnector::demo(&config.descriptors())),
            TransportKind::Opcua => Arc::new(
                OpcuaConnector::new(&config.opcua_settings())
                    .map_err(|e| ApiError::Internal(format!("OPC UA client: {}", e)))?,
            ),
        };

        let directory: Arc<dyn Directory> = match &config.directory {
            DirectoryConfig::Static { users } => {
                if users.is_empty() {
                    tracing::warn!(
                        "Static directory has no users; every subscriber will be rejected"
                    );
                }
                Arc::new(StaticDirectory::new(users.clone()))
            }
            DirectoryConfig::Http(http) => Arc::new(
                HttpDirectory::new(http.clone())
                    .map_err(|e| ApiError::Internal(format!("Directory client: {}", e)))?,
            ),
        };

        Ok(Self::new(config, connector, directory))
    }

    pub fn device_by_url(&self, url: &str) -> Option<&Arc<DeviceSupervisor>> {
        self.devices.iter().find(|d| d.descriptor().url == url)
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Stop the scheduler and workers, drop subscribers, close device sessions
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.executor.close();
        self.registry.close_all().await;
        for device in self.devices.iter() {
            device.disconnect().await;
        }
        tracing::info!("Application state torn down");
    }
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Allowed CORS origins; empty allows any
    pub cors_origins: Vec<String>,
    /// Interval between keepalive frames on subscriber sockets
    pub keepalive: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
            keepalive: Duration::from_secs(30),
        }
    }
}

impl ApiConfig {
    /// Create config with custom host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.api.host.clone(),
            port: config.api.port,
            cors_origins: config.api.cors_origins.clone(),
            keepalive: config.keepalive(),
        }
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::device::ConnectionStatus;

    #[tokio::test]
    async fn test_from_config_builds_opcua_backend() {
        let pki = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.transport.kind = TransportKind::Opcua;
        config.transport.pki_dir = pki.path().to_path_buf();
        config.devices = vec![DeviceConfig {
            id: Some("lab".into()),
            name: "Lab".into(),
            url: "opc.tcp://127.0.0.1:4840".into(),
            root_node_id: None,
        }];

        let state = AppState::from_config(&config).unwrap();
        assert_eq!(state.devices.len(), 1);
        assert_eq!(state.devices[0].status(), ConnectionStatus::Disconnected);

        config.transport.application_uri = String::new();
        assert!(matches!(
            AppState::from_config(&config),
            Err(ApiError::Internal(_))
        ));
    }
}
