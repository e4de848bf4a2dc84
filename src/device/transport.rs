//! Tag Protocol Transport
//!
//! Capability traits a tag-based protocol backend implements. The supervisor
//! only needs to open a session, browse nodes, batch-read values and write a
//! single value; everything protocol specific stays behind these traits.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use super::{NodeHandle, TagValue, ValueKind};

/// Node holding the server's human-readable product name
pub const SERVER_NAME_NODE: &str = "ns=0;i=2254";

/// Coarse classification of a node in the address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    Object,
    Variable,
    Method,
    Other,
}

/// What a browse of a single node returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub browse_name: String,
    pub class: NodeClass,
}

impl NodeInfo {
    pub fn new(browse_name: impl Into<String>, class: NodeClass) -> Self {
        Self {
            browse_name: browse_name.into(),
            class,
        }
    }
}

/// Opens sessions to devices
#[async_trait]
pub trait Connector: Send + Sync {
    /// Dial the endpoint and complete the protocol handshake
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Session>, TransportError>;
}

/// An open session with one device
#[async_trait]
pub trait Session: Send + Sync {
    /// Read the server's product name
    async fn server_name(&self) -> Result<String, TransportError>;

    /// Resolve a node id string to a handle on this session
    async fn resolve(&self, node_id: &str) -> Result<NodeHandle, TransportError>;

    /// Browse name and node class of a node
    async fn describe(&self, node: &NodeHandle) -> Result<NodeInfo, TransportError>;

    /// Hierarchical children of a node
    async fn children(&self, node: &NodeHandle) -> Result<Vec<NodeHandle>, TransportError>;

    /// Read current values, one per requested node, in request order
    async fn read_values(&self, nodes: &[NodeHandle]) -> Result<Vec<TagValue>, TransportError>;

    /// Underlying data type of a variable node
    async fn value_kind(&self, node: &NodeHandle) -> Result<ValueKind, TransportError>;

    /// Write a single value
    async fn write_value(&self, node: &NodeHandle, value: TagValue) -> Result<(), TransportError>;

    /// Close the session. Errors are not reported.
    async fn disconnect(&self);
}

/// Errors raised by a transport backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Dial or handshake failed
    #[error("connection failed: {0}")]
    Connect(String),

    /// The device answered with a bad status code
    #[error("bad status: {0}")]
    Status(String),

    /// The requested node does not exist on the device
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// The operation did not complete in time
    #[error("operation timed out")]
    Timeout,

    /// The session was already closed
    #[error("session closed")]
    Closed,

    /// Anything else (socket resets, decode failures, ...)
    #[error("transport failure: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether the device itself rejected the request, as opposed to a
    /// failure somewhere between us and the device
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            TransportError::Status(_) | TransportError::UnknownNode(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_classification() {
        assert!(TransportError::Status("BadNodeIdUnknown".into()).is_protocol());
        assert!(TransportError::UnknownNode("ns=3;i=9".into()).is_protocol());
        assert!(!TransportError::Timeout.is_protocol());
        assert!(!TransportError::Other("reset".into()).is_protocol());
    }
}
