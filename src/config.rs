//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::device::{CoercionPolicy, DeviceDescriptor, OpcuaSettings, SupervisorSettings};
use crate::directory::{HttpDirectoryConfig, StaticUser};
use crate::poller::SchedulerSettings;
use crate::websocket::HubConfig;

/// Root node the discovery walk starts from when a device does not name one
pub const DEFAULT_ROOT_NODE_ID: &str = "ns=3;s=ServerInterfaces";

/// Longest accepted tick interval (one day)
pub const MAX_INTERVAL_SECS: f64 = 86_400.0;

/// Longest accepted reconnect cooldown (one week)
pub const MAX_COOLDOWN_MINUTES: u64 = 10_080;

/// Longest accepted timeout, backoff or keepalive
pub const MAX_WAIT_SECS: u64 = 3_600;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    #[serde(default)]
    pub writes: WritesConfig,

    #[serde(default)]
    pub websocket: WebSocketConfig,

    #[serde(default)]
    pub directory: DirectoryConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
        }
    }
}

/// Tick cadence, reconnect policy and device I/O timeouts
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval", alias = "broadcast_interval_seconds")]
    pub interval_secs: f64,

    #[serde(default = "default_cooldown", alias = "plc_reconnect_delay_minutes")]
    pub reconnect_cooldown_minutes: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,

    /// Default discovery root, overridable per device
    #[serde(default = "default_root_node_id", alias = "common_root_node_id")]
    pub root_node_id: String,
}

fn default_interval() -> f64 {
    2.0
}

fn default_cooldown() -> u64 {
    5
}

fn default_connect_timeout() -> u64 {
    40
}

fn default_read_timeout() -> u64 {
    10
}

fn default_error_backoff() -> u64 {
    5
}

fn default_root_node_id() -> String {
    DEFAULT_ROOT_NODE_ID.to_string()
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            reconnect_cooldown_minutes: default_cooldown(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            error_backoff_secs: default_error_backoff(),
            root_node_id: default_root_node_id(),
        }
    }
}

/// One `[[devices]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Grant identifier; derived from the name when absent
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: String,

    pub url: String,

    #[serde(default)]
    pub root_node_id: Option<String>,
}

/// Write command policy
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WritesConfig {
    #[serde(default)]
    pub coercion: CoercionPolicy,
}

/// Subscriber channel settings
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,

    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_keepalive() -> u64 {
    30
}

fn default_outbound_buffer() -> usize {
    16
}

fn default_max_connections() -> usize {
    1000
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: default_keepalive(),
            outbound_buffer: default_outbound_buffer(),
            max_connections: default_max_connections(),
        }
    }
}

/// Where identities and grants come from
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DirectoryConfig {
    Static {
        #[serde(default)]
        users: Vec<StaticUser>,
    },
    Http(HttpDirectoryConfig),
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        DirectoryConfig::Static { users: Vec::new() }
    }
}

/// Which tag protocol backend talks to devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Simulated,
    Opcua,
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" => Ok(TransportKind::Simulated),
            "opcua" => Ok(TransportKind::Opcua),
            other => Err(format!("unknown transport kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,

    /// OPC UA client application name
    #[serde(default = "default_application_name")]
    pub application_name: String,

    #[serde(default = "default_application_uri")]
    pub application_uri: String,

    /// OPC UA certificate store
    #[serde(default = "default_pki_dir")]
    pub pki_dir: PathBuf,
}

fn default_application_name() -> String {
    "SCADA Hub".to_string()
}

fn default_application_uri() -> String {
    "urn:scada-hub".to_string()
}

fn default_pki_dir() -> PathBuf {
    PathBuf::from("./pki")
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            application_name: default_application_name(),
            application_uri: default_application_uri(),
            pki_dir: default_pki_dir(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("scada-hub").join("config.toml")),
            Some(PathBuf::from("/etc/scada-hub/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("SCADA_HUB_API_HOST") {
            self.api.host = host;
        }
        if let Ok(port) = std::env::var("SCADA_HUB_API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }
        if let Ok(origins) = std::env::var("SCADA_HUB_CORS_ORIGINS") {
            self.api.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        if let Ok(interval) = std::env::var("SCADA_HUB_INTERVAL_SECS") {
            if let Ok(v) = interval.parse() {
                self.polling.interval_secs = v;
            }
        }
        if let Ok(cooldown) = std::env::var("SCADA_HUB_RECONNECT_COOLDOWN_MINUTES") {
            if let Ok(v) = cooldown.parse() {
                self.polling.reconnect_cooldown_minutes = v;
            }
        }

        if let Ok(kind) = std::env::var("SCADA_HUB_TRANSPORT") {
            match kind.parse() {
                Ok(kind) => self.transport.kind = kind,
                Err(e) => tracing::warn!("Ignoring SCADA_HUB_TRANSPORT: {}", e),
            }
        }

        if let Ok(level) = std::env::var("SCADA_HUB_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("SCADA_HUB_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Check values that deserialize fine but cannot be run
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| Err(ConfigError::Invalid(reason));

        let interval = self.polling.interval_secs;
        if !(interval.is_finite() && interval > 0.0 && interval <= MAX_INTERVAL_SECS) {
            return invalid(format!(
                "polling.interval_secs must be in (0, {MAX_INTERVAL_SECS}], got {interval}"
            ));
        }
        if self.polling.reconnect_cooldown_minutes > MAX_COOLDOWN_MINUTES {
            return invalid(format!(
                "polling.reconnect_cooldown_minutes must be at most {MAX_COOLDOWN_MINUTES}"
            ));
        }
        for (key, secs) in [
            ("polling.connect_timeout_secs", self.polling.connect_timeout_secs),
            ("polling.read_timeout_secs", self.polling.read_timeout_secs),
            ("websocket.keepalive_secs", self.websocket.keepalive_secs),
        ] {
            if !(1..=MAX_WAIT_SECS).contains(&secs) {
                return invalid(format!("{key} must be between 1 and {MAX_WAIT_SECS}, got {secs}"));
            }
        }
        if self.polling.error_backoff_secs > MAX_WAIT_SECS {
            return invalid(format!("polling.error_backoff_secs must be at most {MAX_WAIT_SECS}"));
        }
        if self.websocket.outbound_buffer == 0 {
            return invalid("websocket.outbound_buffer must be at least 1".to_string());
        }

        let mut urls = HashSet::new();
        let mut ids = HashSet::new();
        for (index, device) in self.devices.iter().enumerate() {
            if device.url.trim().is_empty() {
                return invalid(format!("devices[{index}] has an empty url"));
            }
            if !urls.insert(device.url.as_str()) {
                return invalid(format!("duplicate device url {}", device.url));
            }
            let id = device_id(device);
            if !ids.insert(id.clone()) {
                return invalid(format!("duplicate device id {id}"));
            }
        }

        if self.transport.kind == TransportKind::Opcua {
            if let Some(device) = self.devices.iter().find(|d| !d.url.starts_with("opc.tcp://")) {
                return invalid(format!("device url {} is not an opc.tcp:// endpoint", device.url));
            }
            if self.transport.application_name.trim().is_empty()
                || self.transport.application_uri.trim().is_empty()
            {
                return invalid(
                    "transport.application_name and application_uri must be set".to_string(),
                );
            }
        }

        if let DirectoryConfig::Http(http) = &self.directory {
            if http.base_url.trim().is_empty() {
                return invalid("directory.base_url must be set".to_string());
            }
        }

        Ok(())
    }

    /// Devices in configuration order, with ids and roots filled in
    pub fn descriptors(&self) -> Vec<DeviceDescriptor> {
        self.devices
            .iter()
            .map(|device| {
                let id = device_id(device);
                let name = if device.name.trim().is_empty() {
                    id.clone()
                } else {
                    device.name.clone()
                };
                let root = device
                    .root_node_id
                    .clone()
                    .unwrap_or_else(|| self.polling.root_node_id.clone());
                DeviceDescriptor::new(id, name, device.url.clone(), root)
            })
            .collect()
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            connect_timeout: Duration::from_secs(self.polling.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.polling.read_timeout_secs),
            coercion: self.writes.coercion,
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        let interval = Duration::try_from_secs_f64(self.polling.interval_secs)
            .ok()
            .filter(|interval| !interval.is_zero())
            .unwrap_or_else(|| Duration::from_secs_f64(default_interval()));
        let reconnect_cooldown = self
            .polling
            .reconnect_cooldown_minutes
            .checked_mul(60)
            .map_or(Duration::MAX, Duration::from_secs);

        SchedulerSettings {
            interval,
            reconnect_cooldown,
            error_backoff: Duration::from_secs(self.polling.error_backoff_secs),
        }
    }

    /// OPC UA client identity; service calls share the read timeout
    pub fn opcua_settings(&self) -> OpcuaSettings {
        OpcuaSettings {
            application_name: self.transport.application_name.clone(),
            application_uri: self.transport.application_uri.clone(),
            pki_dir: self.transport.pki_dir.clone(),
            request_timeout: Duration::from_secs(self.polling.read_timeout_secs),
        }
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            max_connections: self.websocket.max_connections,
            outbound_capacity: self.websocket.outbound_buffer,
        }
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.websocket.keepalive_secs)
    }
}

fn device_id(device: &DeviceConfig) -> String {
    match &device.id {
        Some(id) if !id.trim().is_empty() => id.clone(),
        _ => slugify(&device.name),
    }
}

/// Lowercase, runs of non-alphanumerics collapsed to `_`, trimmed
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    for c in value.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "device".to_string()
    } else {
        slug.to_string()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# SCADA Hub Configuration
#
# Environment variables override these settings:
# - SCADA_HUB_API_HOST
# - SCADA_HUB_API_PORT
# - SCADA_HUB_CORS_ORIGINS (comma separated)
# - SCADA_HUB_INTERVAL_SECS
# - SCADA_HUB_RECONNECT_COOLDOWN_MINUTES
# - SCADA_HUB_LOG_LEVEL
# - SCADA_HUB_LOG_FORMAT

[api]
host = "0.0.0.0"
port = 8000
cors_origins = ["http://localhost:3000", "http://localhost:5173"]

[polling]
# Seconds between two broadcast ticks
interval_secs = 2.0

# Minutes between two connection attempts on a device that is down
reconnect_cooldown_minutes = 5

# Bound on connect + discovery, and on one batched read (seconds)
connect_timeout_secs = 40
read_timeout_secs = 10

# Pause after a failed tick (seconds)
error_backoff_secs = 5

# Discovery root used when a device does not set its own
root_node_id = "ns=3;s=ServerInterfaces"

[[devices]]
id = "north_park"
name = "North Park"
url = "opc.tcp://192.168.1.10:4840"

[[devices]]
name = "South Park"
url = "opc.tcp://192.168.1.11:4840"

[writes]
# Float written to an integer tag: "truncate" or "reject"
coercion = "truncate"

[websocket]
keepalive_secs = 30
outbound_buffer = 16
max_connections = 1000

[directory]
# "static" (users below) or "http" (base_url, service_token)
kind = "static"

[[directory.users]]
token = "change-me"
id = "admin"
email = "admin@example.com"
elevated = true

[[directory.users]]
token = "operator-token"
id = "operator"
devices = ["north_park"]

[transport]
# Tag protocol backend: "opcua" dials the devices above,
# "simulated" serves demo data at the same addresses
kind = "simulated"

# OPC UA client identity and certificate store
application_name = "SCADA Hub"
application_uri = "urn:scada-hub"
pki_dir = "./pki"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_parses_and_validates() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.writes.coercion, CoercionPolicy::Truncate);
        assert!(matches!(&config.directory, DirectoryConfig::Static { users } if users.len() == 2));

        let descriptors = config.descriptors();
        assert_eq!(descriptors[0].id, "north_park");
        assert_eq!(descriptors[1].id, "south_park");
        assert_eq!(descriptors[1].root_node_id, DEFAULT_ROOT_NODE_ID);
    }

    #[test]
    fn test_legacy_key_aliases() {
        let config: Config = toml::from_str(
            r#"
            [polling]
            broadcast_interval_seconds = 0.5
            plc_reconnect_delay_minutes = 2
            common_root_node_id = "ns=2;s=Root"
            "#,
        )
        .unwrap();

        let settings = config.scheduler_settings();
        assert_eq!(settings.interval, Duration::from_millis(500));
        assert_eq!(settings.reconnect_cooldown, Duration::from_secs(120));
        assert_eq!(config.polling.root_node_id, "ns=2;s=Root");
    }

    #[test]
    fn test_validate_rejects_bad_devices() {
        let mut config = Config::default();
        config.devices = vec![DeviceConfig {
            id: None,
            name: "A".into(),
            url: " ".into(),
            root_node_id: None,
        }];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.devices = vec![
            DeviceConfig {
                id: None,
                name: "Park A".into(),
                url: "opc.tcp://a:4840".into(),
                root_node_id: None,
            },
            DeviceConfig {
                id: None,
                name: "park-a".into(),
                url: "opc.tcp://b:4840".into(),
                root_node_id: None,
            },
        ];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate device id park_a"));
    }

    #[test]
    fn test_validate_bounds_durations() {
        let mut config = Config::default();
        config.polling.interval_secs = 1e300;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.polling.interval_secs = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.polling.interval_secs = 2.0;
        config.polling.reconnect_cooldown_minutes = u64::MAX;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.polling.reconnect_cooldown_minutes = 5;
        config.polling.connect_timeout_secs = u64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("polling.connect_timeout_secs"));

        config.polling.connect_timeout_secs = 40;
        config.websocket.keepalive_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.websocket.keepalive_secs = 30;
        config.validate().unwrap();
    }

    #[test]
    fn test_scheduler_settings_never_panic_on_unvalidated_values() {
        let mut config = Config::default();
        config.polling.interval_secs = -1.0;
        config.polling.reconnect_cooldown_minutes = u64::MAX;

        let settings = config.scheduler_settings();
        assert_eq!(settings.interval, Duration::from_secs(2));
        assert_eq!(settings.reconnect_cooldown, Duration::MAX);

        config.polling.interval_secs = 0.5;
        config.polling.reconnect_cooldown_minutes = 5;
        let settings = config.scheduler_settings();
        assert_eq!(settings.interval, Duration::from_millis(500));
        assert_eq!(settings.reconnect_cooldown, Duration::from_secs(300));
    }

    #[test]
    fn test_opcua_transport_config() {
        let config: Config = toml::from_str(
            r#"
[polling]
read_timeout_secs = 4

[transport]
kind = "opcua"
application_name = "Plant Hub"
pki_dir = "/var/lib/scada-hub/pki"
"#,
        )
        .unwrap();

        assert_eq!(config.transport.kind, TransportKind::Opcua);
        let settings = config.opcua_settings();
        assert_eq!(settings.application_name, "Plant Hub");
        assert_eq!(settings.application_uri, "urn:scada-hub");
        assert_eq!(settings.pki_dir, PathBuf::from("/var/lib/scada-hub/pki"));
        assert_eq!(settings.request_timeout, Duration::from_secs(4));

        config.validate().unwrap();

        let mut config = config;
        config.devices = vec![DeviceConfig {
            id: None,
            name: "Lab".into(),
            url: "http://lab:4840".into(),
            root_node_id: None,
        }];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("opc.tcp://"));

        assert_eq!("OPCUA".parse(), Ok(TransportKind::Opcua));
        assert!("modbus".parse::<TransportKind>().is_err());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("North Park #2"), "north_park_2");
        assert_eq!(slugify("  --Wind--  "), "wind");
        assert_eq!(slugify("!!!"), "device");
    }

    #[test]
    fn test_http_directory_config() {
        let config: Config = toml::from_str(
            r#"
            [directory]
            kind = "http"
            base_url = "http://identity:8000"
            service_token = "svc"
            "#,
        )
        .unwrap();

        match config.directory {
            DirectoryConfig::Http(http) => {
                assert_eq!(http.base_url, "http://identity:8000");
                assert_eq!(http.request_timeout_ms, 5000);
            }
            other => panic!("unexpected directory config: {other:?}"),
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [api]
            port = 9100

            [[devices]]
            name = "Lab"
            url = "opc.tcp://lab:4840"
            root_node_id = "ns=2;s=Lab"
            "#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.api.port, 9100);
        assert_eq!(config.descriptors()[0].root_node_id, "ns=2;s=Lab");

        let missing = Config::load(Path::new("/nonexistent/scada-hub.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
