//! Device Supervision
//!
//! Everything that talks to a polled controller lives here:
//!
//! - **transport**: the `Connector`/`Session` capability traits a tag protocol backend implements
//! - **discovery**: depth-first walk of the node tree that builds the tag map
//! - **supervisor**: per-device connection state machine, batched reads and writes
//! - **write**: value coercion applied before a write reaches the device
//! - **opc_ua**: OPC UA backend over `opc.tcp`
//! - **simulated**: in-memory tag server used for demo mode and tests
//!
//! ## State machine
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected ──► Error
//!      ▲               │              │           │
//!      └───────────────┴──────────────┘◄──────────┘ (after cooldown)
//! ```

mod discovery;
mod opc_ua;
mod simulated;
mod supervisor;
pub mod transport;
mod write;

pub use discovery::{discover, DiscoveryReport, SkipReason, SkippedBranch};
pub use opc_ua::{OpcuaConnector, OpcuaSettings};
pub use simulated::{SimulatedConnector, SimulatedServer};
pub use supervisor::{
    ConnectError, ConnectOutcome, DeviceSupervisor, SupervisorSettings, WriteError,
    NO_READABLE_NODES, TRANSIENT_READ_FAILURE,
};
pub use transport::{Connector, NodeClass, NodeInfo, Session, TransportError};
pub use write::{coerce, CoercionError, CoercionPolicy, WriteInput};

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Static description of one polled device, resolved from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    /// Stable identifier used by access grants
    pub id: String,
    /// Display name
    pub name: String,
    /// Endpoint address, also the key subscribers are filtered by
    pub url: String,
    /// Node the discovery walk starts from
    pub root_node_id: String,
}

impl DeviceDescriptor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        root_node_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            root_node_id: root_node_id.into(),
        }
    }
}

/// Connection status of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "DISCONNECTED",
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Connected => "CONNECTED",
            ConnectionStatus::Error => "ERROR",
        }
    }

    /// Whether the reconnect sweep may pick this device up
    pub fn needs_reconnect(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Disconnected | ConnectionStatus::Error
        )
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maximum length of a tag name in bytes
pub const MAX_TAG_NAME_LEN: usize = 256;

/// A validated, human-readable tag name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TagName(String);

impl TagName {
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidTagName> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(InvalidTagName::Empty);
        }
        if name.len() > MAX_TAG_NAME_LEN {
            return Err(InvalidTagName::TooLong(name.len()));
        }
        if name.chars().any(char::is_control) {
            return Err(InvalidTagName::ControlCharacter(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Borrow<str> for TagName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reasons a browse name is not usable as a tag name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTagName {
    #[error("tag name is empty")]
    Empty,

    #[error("tag name is {0} bytes long (limit: {MAX_TAG_NAME_LEN})")]
    TooLong(usize),

    #[error("tag name {0:?} contains control characters")]
    ControlCharacter(String),
}

/// Opaque reference to a node on the device, as understood by its session
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeHandle(String);

impl NodeHandle {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self(node_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tag name → node handle map built by discovery
///
/// Duplicate names are rejected; the first node registered under a name keeps it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeMap {
    entries: BTreeMap<TagName, NodeHandle>,
}

impl NodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tag, failing if the name is already taken
    pub fn insert(&mut self, name: TagName, handle: NodeHandle) -> Result<(), DuplicateTag> {
        if let Some(existing) = self.entries.get(&name) {
            return Err(DuplicateTag {
                name,
                existing: existing.clone(),
                rejected: handle,
            });
        }
        self.entries.insert(name, handle);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&NodeHandle> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TagName, &NodeHandle)> {
        self.entries.iter()
    }
}

/// A second node claimed a tag name that was already registered
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("duplicate tag {name}: {rejected} ignored, already bound to {existing}")]
pub struct DuplicateTag {
    pub name: TagName,
    pub existing: NodeHandle,
    pub rejected: NodeHandle,
}

/// A value read from or written to a tag
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Null,
    Boolean(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    BooleanArray(Vec<bool>),
}

impl TagValue {
    /// The kind a value of this shape is stored as, if any
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            TagValue::Null => None,
            TagValue::Boolean(_) => Some(ValueKind::Boolean),
            TagValue::Int(_) => Some(ValueKind::Int),
            TagValue::UInt(_) => Some(ValueKind::UInt),
            TagValue::Float(_) => Some(ValueKind::Float),
            TagValue::Text(_) => Some(ValueKind::Text),
            TagValue::BooleanArray(_) => Some(ValueKind::BooleanArray),
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Null => f.write_str("null"),
            TagValue::Boolean(v) => write!(f, "{v}"),
            TagValue::Int(v) => write!(f, "{v}"),
            TagValue::UInt(v) => write!(f, "{v}"),
            TagValue::Float(v) => write!(f, "{v}"),
            TagValue::Text(v) => f.write_str(v),
            TagValue::BooleanArray(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Underlying representation of a tag on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Boolean,
    Int,
    UInt,
    Float,
    Text,
    BooleanArray,
}

impl ValueKind {
    pub fn is_integral(&self) -> bool {
        matches!(self, ValueKind::Int | ValueKind::UInt)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Boolean => "boolean",
            ValueKind::Int => "signed integer",
            ValueKind::UInt => "unsigned integer",
            ValueKind::Float => "float",
            ValueKind::Text => "text",
            ValueKind::BooleanArray => "boolean array",
        };
        f.write_str(name)
    }
}
