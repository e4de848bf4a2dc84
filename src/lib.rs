//! # SCADA Hub
//!
//! Telemetry hub for a fleet of industrial controllers. Each controller is
//! reached over a tag-oriented protocol, its variable tree is discovered once
//! per connection, and every tick all connected controllers are read in
//! parallel. The resulting snapshots are pushed to WebSocket subscribers,
//! each of whom only ever sees the controllers granted to them.
//!
//! ## Modules
//!
//! - [`device`]: Per-controller supervision, discovery, reads and writes
//! - [`poller`]: Bounded worker pool and the poll-and-broadcast loop
//! - [`snapshot`]: Per-tick device snapshots and their wire form
//! - [`directory`]: Token authentication and device visibility
//! - [`websocket`]: Subscriber registry and socket handling
//! - [`api`]: REST API server with Axum
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scada_hub::{api, AppState, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let state = AppState::from_config(&config)?;
//!
//!     // First tick connects every device; later ticks read and broadcast
//!     let scheduler = state.scheduler.clone().start();
//!
//!     api::serve(state.clone()).await?;
//!
//!     state.shutdown().await;
//!     scheduler.await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod device;
pub mod directory;
pub mod poller;
pub mod snapshot;
pub mod websocket;

// Re-export top-level types for convenience
pub use device::{
    ConnectionStatus, Connector, DeviceDescriptor, DeviceSupervisor, Session, TagName, TagValue,
    WriteError, WriteInput,
};

pub use poller::{BroadcastScheduler, PollError, PollExecutor, SchedulerSettings};

pub use snapshot::{Snapshot, TelemetryPayload};

pub use directory::{Directory, DirectoryError, Principal, Visibility, VisibilityResolver};

pub use api::{build_router, serve, ApiConfig, ApiError, AppState};

pub use websocket::{HubConfig, HubError, ServerMessage, SubscriberRegistry};

pub use config::{Config, ConfigError, LoggingConfig};
