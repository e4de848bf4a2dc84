//! Connection Supervisor
//!
//! Owns one device's connection state. The status, session, node map and
//! server name are published together as a [`Link`] behind an `ArcSwap`, so
//! readers always see a consistent set. Connect attempts are serialized per
//! device.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use super::discovery::{discover, SkippedBranch};
use super::transport::{Connector, Session, TransportError, SERVER_NAME_NODE};
use super::write::{coerce, CoercionError, CoercionPolicy, WriteInput};
use super::{ConnectionStatus, DeviceDescriptor, NodeHandle, NodeMap, TagName, TagValue};
use crate::snapshot::Snapshot;

/// Snapshot error for a connected device that exposes no variables
pub const NO_READABLE_NODES: &str = "No readable nodes.";

/// Snapshot error for a read that failed below the protocol level
pub const TRANSIENT_READ_FAILURE: &str = "Temporary read failure.";

/// Timeouts and write policy applied by every supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Bound on dial, handshake and discovery together
    pub connect_timeout: Duration,
    /// Bound on one batched read, and on each device call of a write
    pub read_timeout: Duration,
    pub coercion: CoercionPolicy,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(40),
            read_timeout: Duration::from_secs(10),
            coercion: CoercionPolicy::default(),
        }
    }
}

/// Why a connection attempt failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectError {
    #[error("{0}")]
    Dial(TransportError),

    #[error("root node {node_id} unavailable: {source}")]
    RootNode {
        node_id: String,
        source: TransportError,
    },

    #[error("connect and discovery did not finish within {0:?}")]
    Timeout(Duration),
}

/// Summary of a successful connection
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOutcome {
    pub server_name: String,
    /// Number of tags in the new node map
    pub tags: usize,
    pub skipped: Vec<SkippedBranch>,
}

/// Why a write was refused or failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WriteError {
    #[error("device is not connected")]
    NotConnected,

    #[error("unknown tag: {0}")]
    UnknownTag(String),

    #[error(transparent)]
    Coercion(#[from] CoercionError),

    #[error("write failed: {0}")]
    Transport(TransportError),
}

#[derive(Clone)]
struct Link {
    status: ConnectionStatus,
    session: Option<Arc<dyn Session>>,
    nodes: Arc<NodeMap>,
    server_name: String,
}

impl Link {
    fn offline(status: ConnectionStatus, server_name: String) -> Self {
        Self {
            status,
            session: None,
            nodes: Arc::new(NodeMap::new()),
            server_name,
        }
    }

    fn live_session(&self) -> Option<Arc<dyn Session>> {
        match (self.status, &self.session) {
            (ConnectionStatus::Connected, Some(session)) => Some(Arc::clone(session)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Attempt {
    at: Instant,
    wall: DateTime<Utc>,
}

/// Connection state machine for one device
pub struct DeviceSupervisor {
    descriptor: DeviceDescriptor,
    connector: Arc<dyn Connector>,
    settings: SupervisorSettings,
    link: ArcSwap<Link>,
    connect_lock: tokio::sync::Mutex<()>,
    last_attempt: Mutex<Option<Attempt>>,
}

impl DeviceSupervisor {
    /// A supervisor in the `Disconnected` state
    pub fn new(
        descriptor: DeviceDescriptor,
        connector: Arc<dyn Connector>,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            descriptor,
            connector,
            settings,
            link: ArcSwap::from_pointee(Link::offline(
                ConnectionStatus::Disconnected,
                String::new(),
            )),
            connect_lock: tokio::sync::Mutex::new(()),
            last_attempt: Mutex::new(None),
        }
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn status(&self) -> ConnectionStatus {
        self.link.load().status
    }

    /// Product name reported by the device, empty if never read
    pub fn server_name(&self) -> String {
        self.link.load().server_name.clone()
    }

    pub fn tag_count(&self) -> usize {
        self.link.load().nodes.len()
    }

    /// Wall-clock time of the last connection attempt
    pub fn last_attempt(&self) -> Option<DateTime<Utc>> {
        self.attempt().map(|a| a.wall)
    }

    fn attempt(&self) -> Option<Attempt> {
        *self.last_attempt.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the reconnect sweep should try this device at `now`
    pub fn reconnect_due(&self, now: Instant, cooldown: Duration) -> bool {
        if !self.status().needs_reconnect() {
            return false;
        }
        match self.attempt() {
            None => true,
            Some(attempt) => now.saturating_duration_since(attempt.at) >= cooldown,
        }
    }

    /// Tear down any session, dial the device and rebuild the node map
    pub async fn connect_and_discover(&self) -> Result<ConnectOutcome, ConnectError> {
        let _guard = self.connect_lock.lock().await;

        *self.last_attempt.lock().unwrap_or_else(PoisonError::into_inner) = Some(Attempt {
            at: Instant::now(),
            wall: Utc::now(),
        });

        let previous = self.link.swap(Arc::new(Link::offline(
            ConnectionStatus::Connecting,
            self.server_name(),
        )));
        if let Some(session) = &previous.session {
            session.disconnect().await;
        }

        tracing::info!(device = %self.descriptor.name, url = %self.descriptor.url, "Connecting");

        let deadline = Instant::now() + self.settings.connect_timeout;
        let result = self.establish(deadline).await;

        match result {
            Ok((session, server_name, report)) => {
                let outcome = ConnectOutcome {
                    server_name: server_name.clone(),
                    tags: report.nodes.len(),
                    skipped: report.skipped,
                };
                self.link.store(Arc::new(Link {
                    status: ConnectionStatus::Connected,
                    session: Some(session),
                    nodes: Arc::new(report.nodes),
                    server_name,
                }));
                tracing::info!(
                    device = %self.descriptor.name,
                    tags = outcome.tags,
                    skipped = outcome.skipped.len(),
                    "Connected"
                );
                Ok(outcome)
            }
            Err(e) => {
                self.link.store(Arc::new(Link::offline(
                    ConnectionStatus::Disconnected,
                    previous.server_name.clone(),
                )));
                tracing::error!(device = %self.descriptor.name, error = %e, "Connection failed");
                Err(e)
            }
        }
    }

    async fn establish(
        &self,
        deadline: Instant,
    ) -> Result<(Arc<dyn Session>, String, super::DiscoveryReport), ConnectError> {
        let timed_out = ConnectError::Timeout(self.settings.connect_timeout);
        let dial = tokio::time::timeout_at(deadline, self.connector.connect(&self.descriptor.url));
        let session = match dial.await {
            Ok(dialed) => PendingSession::new(dialed.map_err(ConnectError::Dial)?),
            Err(_) => return Err(timed_out),
        };

        let prepared = tokio::time::timeout_at(deadline, self.prepare(session.get())).await;
        match prepared {
            Ok(Ok((server_name, report))) => Ok((session.keep(), server_name, report)),
            Ok(Err(e)) => {
                session.close().await;
                Err(e)
            }
            Err(_) => {
                session.close().await;
                Err(timed_out)
            }
        }
    }

    async fn prepare(
        &self,
        session: &dyn Session,
    ) -> Result<(String, super::DiscoveryReport), ConnectError> {
        let server_name = read_server_name(session).await;

        let root = session
            .resolve(&self.descriptor.root_node_id)
            .await
            .map_err(|source| ConnectError::RootNode {
                node_id: self.descriptor.root_node_id.clone(),
                source,
            })?;

        Ok((server_name, discover(session, root).await))
    }

    /// Read every tag in one batch and build this tick's snapshot
    pub async fn read_all(&self) -> Snapshot {
        let link = self.link.load_full();
        let Some(session) = link.live_session() else {
            return Snapshot::new(&self.descriptor, link.status);
        };

        let snapshot = Snapshot::new(&self.descriptor, ConnectionStatus::Connected);
        if link.nodes.is_empty() {
            return snapshot.with_error(NO_READABLE_NODES);
        }

        let (names, handles): (Vec<&TagName>, Vec<NodeHandle>) =
            link.nodes.iter().map(|(name, handle)| (name, handle.clone())).unzip();

        let read = tokio::time::timeout(self.settings.read_timeout, session.read_values(&handles));
        match read.await {
            Ok(Ok(values)) if values.len() != names.len() => {
                tracing::warn!(
                    device = %self.descriptor.name,
                    expected = names.len(),
                    received = values.len(),
                    "Read returned the wrong number of values"
                );
                snapshot.with_error(TRANSIENT_READ_FAILURE)
            }
            Ok(Ok(values)) => snapshot.with_values(names.into_iter().zip(values)),
            Ok(Err(e)) if e.is_protocol() => {
                tracing::warn!(device = %self.descriptor.name, error = %e, "Protocol read error");
                self.mark_error(&session);
                Snapshot {
                    status: ConnectionStatus::Error,
                    ..snapshot
                }
                .with_error(format!("Protocol read error: {e}"))
            }
            Ok(Err(e)) => {
                tracing::warn!(device = %self.descriptor.name, error = %e, "Read failed");
                snapshot.with_error(TRANSIENT_READ_FAILURE)
            }
            Err(_) => {
                tracing::warn!(device = %self.descriptor.name, "Read timed out");
                snapshot.with_error(TRANSIENT_READ_FAILURE)
            }
        }
    }

    /// Move to `Error`, unless the link was rebuilt since `session` was taken
    fn mark_error(&self, session: &Arc<dyn Session>) {
        let current = self.link.load();
        let same_session = current
            .session
            .as_ref()
            .is_some_and(|s| Arc::ptr_eq(s, session));
        if current.status != ConnectionStatus::Connected || !same_session {
            return;
        }

        let errored = Arc::new(Link {
            status: ConnectionStatus::Error,
            ..Link::clone(&current)
        });
        self.link.compare_and_swap(&current, errored);
    }

    /// Coerce `input` to the tag's kind and write it. Returns the value written.
    pub async fn write_one(&self, tag: &str, input: WriteInput) -> Result<TagValue, WriteError> {
        let link = self.link.load_full();
        let session = link.live_session().ok_or(WriteError::NotConnected)?;
        let handle = link
            .nodes
            .get(tag)
            .cloned()
            .ok_or_else(|| WriteError::UnknownTag(tag.to_string()))?;

        let kind = tokio::time::timeout(self.settings.read_timeout, session.value_kind(&handle))
            .await
            .map_err(|_| WriteError::Transport(TransportError::Timeout))?
            .map_err(WriteError::Transport)?;
        let value = coerce(input, kind, self.settings.coercion)?;

        tokio::time::timeout(
            self.settings.read_timeout,
            session.write_value(&handle, value.clone()),
        )
        .await
        .map_err(|_| WriteError::Transport(TransportError::Timeout))?
        .map_err(WriteError::Transport)?;

        tracing::info!(device = %self.descriptor.name, tag, value = %value, "Wrote value");
        Ok(value)
    }

    /// Close the session and drop the node map
    pub async fn disconnect(&self) {
        let _guard = self.connect_lock.lock().await;
        let previous = self.link.swap(Arc::new(Link::offline(
            ConnectionStatus::Disconnected,
            self.server_name(),
        )));
        if let Some(session) = &previous.session {
            session.disconnect().await;
            tracing::debug!(device = %self.descriptor.name, "Session closed");
        }
    }
}

/// A dialed session not yet published in a [`Link`]. Dropping it armed, as
/// when the connect future is aborted, closes the session in the background.
struct PendingSession {
    session: Arc<dyn Session>,
    armed: bool,
}

impl PendingSession {
    fn new(session: Arc<dyn Session>) -> Self {
        Self {
            session,
            armed: true,
        }
    }

    fn get(&self) -> &dyn Session {
        self.session.as_ref()
    }

    fn keep(mut self) -> Arc<dyn Session> {
        self.armed = false;
        Arc::clone(&self.session)
    }

    async fn close(mut self) {
        self.armed = false;
        self.session.disconnect().await;
    }
}

impl Drop for PendingSession {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let session = Arc::clone(&self.session);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move { session.disconnect().await });
        }
    }
}

async fn read_server_name(session: &dyn Session) -> String {
    match session.server_name().await {
        Ok(name) => name,
        Err(e) => {
            tracing::debug!(node = SERVER_NAME_NODE, error = %e, "Server name unavailable");
            String::new()
        }
    }
}
