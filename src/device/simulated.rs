//! Simulated Tag Server
//!
//! In-memory implementation of the transport traits. Backs the `simulated`
//! transport used for demos, and gives tests full control over reachability,
//! read failures and broken branches of the node tree.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::transport::{Connector, NodeClass, NodeInfo, Session, TransportError, SERVER_NAME_NODE};
use super::{DeviceDescriptor, NodeHandle, TagValue, ValueKind};

#[derive(Debug, Clone)]
struct SimNode {
    browse_name: String,
    class: NodeClass,
    children: Vec<String>,
    value: TagValue,
    kind: Option<ValueKind>,
}

#[derive(Debug)]
struct ServerState {
    product_name: String,
    nodes: HashMap<String, SimNode>,
    reachable: bool,
    connect_delay: Option<Duration>,
    browse_delay: Option<Duration>,
    kind_delay: Option<Duration>,
    read_failure: Option<TransportError>,
    read_limit: Option<usize>,
    broken_children: HashSet<String>,
    broken_describe: HashSet<String>,
    drift: bool,
    reads: u64,
    connect_attempts: usize,
    open_sessions: usize,
}

/// One simulated device
#[derive(Debug)]
pub struct SimulatedServer {
    state: Mutex<ServerState>,
}

impl SimulatedServer {
    /// An empty, reachable server
    pub fn new(product_name: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(ServerState {
                product_name: product_name.into(),
                nodes: HashMap::new(),
                reachable: true,
                connect_delay: None,
                browse_delay: None,
                kind_delay: None,
                read_failure: None,
                read_limit: None,
                broken_children: HashSet::new(),
                broken_describe: HashSet::new(),
                drift: false,
                reads: 0,
                connect_attempts: 0,
                open_sessions: 0,
            }),
        }
    }

    /// A small inverter/meter tree below `root_node_id` with drifting readings
    pub fn demo(product_name: impl Into<String>, root_node_id: &str) -> Self {
        let server = Self::new(product_name);
        let inverter = format!("{root_node_id}/Inverter");
        let meter = format!("{root_node_id}/Meter");

        server
            .object(root_node_id, "ServerInterfaces", None)
            .object(&inverter, "Inverter", Some(root_node_id))
            .variable(
                &format!("{inverter}/ActivePower"),
                "ActivePower",
                &inverter,
                TagValue::Float(512.4),
            )
            .variable(&format!("{inverter}/Setpoint"), "Setpoint", &inverter, TagValue::Int(100))
            .variable(&format!("{inverter}/Running"), "Running", &inverter, TagValue::Boolean(true))
            .object(&meter, "Meter", Some(root_node_id))
            .variable(
                &format!("{meter}/EnergyTotal"),
                "EnergyTotal",
                &meter,
                TagValue::Float(18234.7),
            )
            .variable(
                &format!("{meter}/Alarms"),
                "Alarms",
                &meter,
                TagValue::BooleanArray(vec![false, false, true]),
            )
            .variable(&format!("{meter}/Mode"), "Mode", &meter, TagValue::Text("auto".to_string()));
        server.set_drift(true);
        server
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an object node, attached under `parent` if given
    pub fn object(&self, node_id: &str, browse_name: &str, parent: Option<&str>) -> &Self {
        let mut state = self.lock();
        state.nodes.insert(
            node_id.to_string(),
            SimNode {
                browse_name: browse_name.to_string(),
                class: NodeClass::Object,
                children: Vec::new(),
                value: TagValue::Null,
                kind: None,
            },
        );
        if let Some(parent) = parent {
            attach(&mut state, parent, node_id);
        }
        drop(state);
        self
    }

    /// Add a variable node under `parent`; its kind follows the initial value
    pub fn variable(
        &self,
        node_id: &str,
        browse_name: &str,
        parent: &str,
        value: TagValue,
    ) -> &Self {
        let mut state = self.lock();
        state.nodes.insert(
            node_id.to_string(),
            SimNode {
                browse_name: browse_name.to_string(),
                class: NodeClass::Variable,
                children: Vec::new(),
                kind: value.kind(),
                value,
            },
        );
        attach(&mut state, parent, node_id);
        drop(state);
        self
    }

    /// Add an extra hierarchical reference, e.g. to build a cycle
    pub fn link(&self, parent: &str, child: &str) -> &Self {
        attach(&mut self.lock(), parent, child);
        self
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Delay every connection handshake by `delay`
    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        self.lock().connect_delay = delay;
    }

    /// Delay every child listing by `delay`
    pub fn set_browse_delay(&self, delay: Option<Duration>) {
        self.lock().browse_delay = delay;
    }

    /// Delay every data type lookup by `delay`
    pub fn set_kind_delay(&self, delay: Option<Duration>) {
        self.lock().kind_delay = delay;
    }

    /// Answer batched reads with at most `limit` values
    pub fn limit_reads(&self, limit: Option<usize>) {
        self.lock().read_limit = limit;
    }

    /// Make batched reads fail with `error` until cleared
    pub fn fail_reads(&self, error: Option<TransportError>) {
        self.lock().read_failure = error;
    }

    /// Make listing the children of `node_id` fail
    pub fn fail_children(&self, node_id: &str) {
        self.lock().broken_children.insert(node_id.to_string());
    }

    /// Make browsing `node_id` itself fail
    pub fn fail_describe(&self, node_id: &str) {
        self.lock().broken_describe.insert(node_id.to_string());
    }

    /// Let float readings wander around their stored value
    pub fn set_drift(&self, drift: bool) {
        self.lock().drift = drift;
    }

    /// Number of batched reads served
    pub fn read_count(&self) -> u64 {
        self.lock().reads
    }

    pub fn connect_attempts(&self) -> usize {
        self.lock().connect_attempts
    }

    pub fn open_sessions(&self) -> usize {
        self.lock().open_sessions
    }

    /// Stored value of a node
    pub fn value(&self, node_id: &str) -> Option<TagValue> {
        self.lock().nodes.get(node_id).map(|n| n.value.clone())
    }
}

fn attach(state: &mut ServerState, parent: &str, child: &str) {
    if let Some(node) = state.nodes.get_mut(parent) {
        node.children.push(child.to_string());
    }
}

/// Connector resolving endpoint addresses to simulated servers
#[derive(Debug, Default)]
pub struct SimulatedConnector {
    servers: HashMap<String, Arc<SimulatedServer>>,
}

impl SimulatedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `server` at `endpoint`
    pub fn with_server(
        mut self,
        endpoint: impl Into<String>,
        server: Arc<SimulatedServer>,
    ) -> Self {
        self.servers.insert(endpoint.into(), server);
        self
    }

    /// One demo server per configured device
    pub fn demo(devices: &[DeviceDescriptor]) -> Self {
        devices.iter().fold(Self::new(), |connector, device| {
            let name = format!("Simulated {}", device.name);
            let server = SimulatedServer::demo(name, &device.root_node_id);
            connector.with_server(device.url.clone(), Arc::new(server))
        })
    }

    pub fn server(&self, endpoint: &str) -> Option<Arc<SimulatedServer>> {
        self.servers.get(endpoint).cloned()
    }
}

#[async_trait]
impl Connector for SimulatedConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Session>, TransportError> {
        let server = self
            .servers
            .get(endpoint)
            .cloned()
            .ok_or_else(|| TransportError::Connect(format!("no route to {endpoint}")))?;

        let delay = {
            let mut state = server.lock();
            state.connect_attempts += 1;
            state.connect_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut state = server.lock();
            if !state.reachable {
                return Err(TransportError::Connect(format!("{endpoint} refused connection")));
            }
            state.open_sessions += 1;
        }

        Ok(Arc::new(SimulatedSession {
            server,
            open: AtomicBool::new(true),
        }))
    }
}

struct SimulatedSession {
    server: Arc<SimulatedServer>,
    open: AtomicBool,
}

impl SimulatedSession {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }
}

#[async_trait]
impl Session for SimulatedSession {
    async fn server_name(&self) -> Result<String, TransportError> {
        self.ensure_open()?;
        Ok(self.server.lock().product_name.clone())
    }

    async fn resolve(&self, node_id: &str) -> Result<NodeHandle, TransportError> {
        self.ensure_open()?;
        if node_id == SERVER_NAME_NODE || self.server.lock().nodes.contains_key(node_id) {
            Ok(NodeHandle::new(node_id))
        } else {
            Err(TransportError::UnknownNode(node_id.to_string()))
        }
    }

    async fn describe(&self, node: &NodeHandle) -> Result<NodeInfo, TransportError> {
        self.ensure_open()?;
        let state = self.server.lock();
        if state.broken_describe.contains(node.as_str()) {
            return Err(TransportError::Status("BadAttributeIdInvalid".to_string()));
        }
        state
            .nodes
            .get(node.as_str())
            .map(|n| NodeInfo::new(n.browse_name.clone(), n.class))
            .ok_or_else(|| TransportError::UnknownNode(node.to_string()))
    }

    async fn children(&self, node: &NodeHandle) -> Result<Vec<NodeHandle>, TransportError> {
        self.ensure_open()?;
        let delay = self.server.lock().browse_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.server.lock();
        if state.broken_children.contains(node.as_str()) {
            return Err(TransportError::Status("BadUserAccessDenied".to_string()));
        }
        state
            .nodes
            .get(node.as_str())
            .map(|n| n.children.iter().map(NodeHandle::new).collect())
            .ok_or_else(|| TransportError::UnknownNode(node.to_string()))
    }

    async fn read_values(&self, nodes: &[NodeHandle]) -> Result<Vec<TagValue>, TransportError> {
        self.ensure_open()?;
        let mut state = self.server.lock();
        if let Some(error) = state.read_failure.clone() {
            return Err(error);
        }
        state.reads += 1;
        let phase = state.reads as f64 / 10.0;
        let drift = state.drift;
        let limit = state.read_limit.unwrap_or(nodes.len());

        nodes
            .iter()
            .take(limit)
            .map(|handle| {
                let node = state
                    .nodes
                    .get(handle.as_str())
                    .ok_or_else(|| TransportError::UnknownNode(handle.to_string()))?;
                Ok(match &node.value {
                    TagValue::Float(v) if drift => TagValue::Float(v + phase.sin()),
                    other => other.clone(),
                })
            })
            .collect()
    }

    async fn value_kind(&self, node: &NodeHandle) -> Result<ValueKind, TransportError> {
        self.ensure_open()?;
        let delay = self.server.lock().kind_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.server.lock();
        let node = state
            .nodes
            .get(node.as_str())
            .ok_or_else(|| TransportError::UnknownNode(node.to_string()))?;
        node.kind
            .ok_or_else(|| TransportError::Status("BadNotReadable".to_string()))
    }

    async fn write_value(&self, node: &NodeHandle, value: TagValue) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut state = self.server.lock();
        let target = state
            .nodes
            .get_mut(node.as_str())
            .ok_or_else(|| TransportError::UnknownNode(node.to_string()))?;
        if target.kind.is_none() || target.kind != value.kind() {
            return Err(TransportError::Status("BadTypeMismatch".to_string()));
        }
        target.value = value;
        Ok(())
    }

    async fn disconnect(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            let mut state = self.server.lock();
            state.open_sessions = state.open_sessions.saturating_sub(1);
        }
    }
}
