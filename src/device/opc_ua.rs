//! OPC UA Transport
//!
//! [`Connector`] and [`Session`] backed by the async-opcua client. Sessions
//! use security mode `None` with an anonymous identity. The client's own
//! reconnect loop is switched off: a lost session surfaces as a bad status on
//! the next call and the supervisor decides when to dial again.

use async_trait::async_trait;
use opcua::client::{Client, ClientBuilder, ClientConfig, IdentityToken, Session as UaSession};
use opcua::types::{
    AttributeId, BrowseDescription, BrowseDirection, BrowseResultMask, DataValue, NodeId,
    ReadValueId, ReferenceTypeId, StatusCode, TimestampsToReturn, Variant, VariantScalarTypeId,
    WriteValue,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::task::AbortOnDropHandle;

use super::transport::{Connector, NodeClass, NodeInfo, Session, TransportError, SERVER_NAME_NODE};
use super::{NodeHandle, TagValue, ValueKind};

/// Bound on the close handshake when a session is torn down
const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

/// Client identity and request limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcuaSettings {
    pub application_name: String,
    pub application_uri: String,
    /// Certificate store location
    pub pki_dir: PathBuf,
    /// Bound on a single service call
    pub request_timeout: Duration,
}

impl Default for OpcuaSettings {
    fn default() -> Self {
        Self {
            application_name: "SCADA Hub".to_string(),
            application_uri: "urn:scada-hub".to_string(),
            pki_dir: PathBuf::from("./pki"),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Opens OPC UA sessions over `opc.tcp`
pub struct OpcuaConnector {
    config: ClientConfig,
}

impl OpcuaConnector {
    /// Validate the client configuration once; every connect reuses it
    pub fn new(settings: &OpcuaSettings) -> Result<Self, TransportError> {
        let builder = ClientBuilder::new()
            .application_name(settings.application_name.clone())
            .application_uri(settings.application_uri.clone())
            .product_uri(settings.application_uri.clone())
            .pki_dir(settings.pki_dir.clone())
            .create_sample_keypair(false)
            .session_retry_limit(0)
            .request_timeout(settings.request_timeout);
        let config = builder.config().clone();
        builder
            .client()
            .map_err(|errors| TransportError::Other(errors.join("; ")))?;
        Ok(Self { config })
    }
}

#[async_trait]
impl Connector for OpcuaConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Session>, TransportError> {
        let mut client = Client::new(self.config.clone());
        let (session, event_loop) = client
            .connect_to_matching_endpoint(endpoint, IdentityToken::Anonymous)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let mut event_loop = AbortOnDropHandle::new(event_loop.spawn());

        tokio::select! {
            connected = session.wait_for_connection() => {
                if !connected {
                    return Err(TransportError::Connect(format!("{endpoint} closed the session")));
                }
            }
            ended = &mut event_loop => {
                let reason = match ended {
                    Ok(status) => status.to_string(),
                    Err(e) => e.to_string(),
                };
                return Err(TransportError::Connect(format!("{endpoint}: {reason}")));
            }
        }

        tracing::debug!(endpoint, "OPC UA session activated");
        Ok(Arc::new(OpcuaSession {
            session,
            event_loop: Mutex::new(Some(event_loop)),
        }))
    }
}

struct OpcuaSession {
    session: Arc<UaSession>,
    /// Aborted when dropped
    event_loop: Mutex<Option<AbortOnDropHandle<StatusCode>>>,
}

impl OpcuaSession {
    async fn read(&self, nodes: &[ReadValueId]) -> Result<Vec<DataValue>, TransportError> {
        self.session
            .read(nodes, TimestampsToReturn::Neither, 0.0)
            .await
            .map_err(|e| status_error(e.status()))
    }

    async fn read_one(
        &self,
        node: NodeId,
        attribute: AttributeId,
    ) -> Result<Variant, TransportError> {
        let mut values = self.read(&[ReadValueId::new(node, attribute)]).await?;
        let value = values
            .pop()
            .ok_or_else(|| TransportError::Other("empty read response".to_string()))?;
        checked(value)
    }
}

#[async_trait]
impl Session for OpcuaSession {
    async fn server_name(&self) -> Result<String, TransportError> {
        let node = node_id(&NodeHandle::new(SERVER_NAME_NODE))?;
        let value = self.read_one(node, AttributeId::Value).await?;
        Ok(to_tag_value(value).to_string())
    }

    async fn resolve(&self, node_id_text: &str) -> Result<NodeHandle, TransportError> {
        let handle = NodeHandle::new(node_id_text);
        match self.read_one(node_id(&handle)?, AttributeId::NodeClass).await {
            Ok(_) => Ok(handle),
            Err(TransportError::Status(_)) => {
                Err(TransportError::UnknownNode(node_id_text.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn describe(&self, node: &NodeHandle) -> Result<NodeInfo, TransportError> {
        let id = node_id(node)?;
        let values = self
            .read(&[
                ReadValueId::new(id.clone(), AttributeId::BrowseName),
                ReadValueId::new(id, AttributeId::NodeClass),
            ])
            .await?;
        let mut values = values.into_iter().map(checked);

        let browse_name = match values.next().transpose()? {
            Some(Variant::QualifiedName(name)) => name.name.as_ref().to_string(),
            _ => return Err(TransportError::Status("BadAttributeIdInvalid".to_string())),
        };
        let class = match values.next().transpose()? {
            Some(Variant::Int32(class)) => node_class(class),
            _ => NodeClass::Other,
        };
        Ok(NodeInfo::new(browse_name, class))
    }

    async fn children(&self, node: &NodeHandle) -> Result<Vec<NodeHandle>, TransportError> {
        let description = BrowseDescription {
            node_id: node_id(node)?,
            browse_direction: BrowseDirection::Forward,
            reference_type_id: ReferenceTypeId::HierarchicalReferences.into(),
            include_subtypes: true,
            node_class_mask: 0,
            result_mask: BrowseResultMask::All as u32,
        };

        let mut results = self
            .session
            .browse(&[description], 0, None)
            .await
            .map_err(|e| status_error(e.status()))?;
        let mut children = Vec::new();
        loop {
            let result = results
                .pop()
                .ok_or_else(|| TransportError::Other("empty browse response".to_string()))?;
            if result.status_code.is_bad() {
                return Err(status_error(result.status_code));
            }
            children.extend(
                result
                    .references
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|reference| reference.node_id.server_index == 0)
                    .map(|reference| NodeHandle::new(reference.node_id.node_id.to_string())),
            );
            if result.continuation_point.is_null_or_empty() {
                return Ok(children);
            }
            results = self
                .session
                .browse_next(false, &[result.continuation_point])
                .await
                .map_err(|e| status_error(e.status()))?;
        }
    }

    async fn read_values(&self, nodes: &[NodeHandle]) -> Result<Vec<TagValue>, TransportError> {
        let ids = nodes
            .iter()
            .map(|node| node_id(node).map(ReadValueId::new_value))
            .collect::<Result<Vec<_>, _>>()?;
        self.read(&ids)
            .await?
            .into_iter()
            .map(|value| checked(value).map(to_tag_value))
            .collect()
    }

    async fn value_kind(&self, node: &NodeHandle) -> Result<ValueKind, TransportError> {
        let value = self.read_one(node_id(node)?, AttributeId::Value).await?;
        kind_of(&value).ok_or_else(|| TransportError::Status("BadTypeMismatch".to_string()))
    }

    async fn write_value(&self, node: &NodeHandle, value: TagValue) -> Result<(), TransportError> {
        let id = node_id(node)?;
        let current = self.read_one(id.clone(), AttributeId::Value).await?;
        let variant = to_variant(value, &current)?;

        let results = self
            .session
            .write(&[WriteValue::value_attr(id, variant)])
            .await
            .map_err(|e| status_error(e.status()))?;
        match results.first() {
            Some(status) if status.is_bad() => Err(status_error(*status)),
            Some(_) => Ok(()),
            None => Err(TransportError::Other("empty write response".to_string())),
        }
    }

    async fn disconnect(&self) {
        let event_loop = self
            .event_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if event_loop.is_none() {
            return;
        }
        match tokio::time::timeout(DISCONNECT_GRACE, self.session.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "OPC UA session closed uncleanly"),
            Err(_) => tracing::debug!("OPC UA session close timed out"),
        }
        drop(event_loop);
    }
}

fn node_id(node: &NodeHandle) -> Result<NodeId, TransportError> {
    NodeId::from_str(node.as_str()).map_err(|_| TransportError::UnknownNode(node.to_string()))
}

/// The value of a data value whose status is not bad
fn checked(value: DataValue) -> Result<Variant, TransportError> {
    let status = value.status();
    if status.is_bad() {
        return Err(status_error(status));
    }
    Ok(value.value.unwrap_or(Variant::Empty))
}

fn status_error(status: StatusCode) -> TransportError {
    if status == StatusCode::BadTimeout || status == StatusCode::BadRequestTimeout {
        TransportError::Timeout
    } else {
        TransportError::Status(status.to_string())
    }
}

fn node_class(raw: i32) -> NodeClass {
    match raw {
        1 => NodeClass::Object,
        2 => NodeClass::Variable,
        4 => NodeClass::Method,
        _ => NodeClass::Other,
    }
}

fn boolean_array(variant: &Variant) -> Option<Vec<bool>> {
    let Variant::Array(array) = variant else {
        return None;
    };
    if !matches!(array.value_type, VariantScalarTypeId::Boolean) {
        return None;
    }
    array
        .values
        .iter()
        .map(|value| match value {
            Variant::Boolean(b) => Some(*b),
            _ => None,
        })
        .collect()
}

fn to_tag_value(variant: Variant) -> TagValue {
    if let Some(values) = boolean_array(&variant) {
        return TagValue::BooleanArray(values);
    }
    match variant {
        Variant::Empty => TagValue::Null,
        Variant::Boolean(v) => TagValue::Boolean(v),
        Variant::SByte(v) => TagValue::Int(v.into()),
        Variant::Int16(v) => TagValue::Int(v.into()),
        Variant::Int32(v) => TagValue::Int(v.into()),
        Variant::Int64(v) => TagValue::Int(v),
        Variant::Byte(v) => TagValue::UInt(v.into()),
        Variant::UInt16(v) => TagValue::UInt(v.into()),
        Variant::UInt32(v) => TagValue::UInt(v.into()),
        Variant::UInt64(v) => TagValue::UInt(v),
        Variant::Float(v) => TagValue::Float(v.into()),
        Variant::Double(v) => TagValue::Float(v),
        Variant::String(v) => TagValue::Text(v.as_ref().to_string()),
        Variant::LocalizedText(v) => TagValue::Text(v.text.as_ref().to_string()),
        other => TagValue::Text(other.to_string()),
    }
}

/// Kind of a writable value, `None` for types writes do not support
fn kind_of(variant: &Variant) -> Option<ValueKind> {
    if boolean_array(variant).is_some() {
        return Some(ValueKind::BooleanArray);
    }
    match variant {
        Variant::Boolean(_) => Some(ValueKind::Boolean),
        Variant::SByte(_) | Variant::Int16(_) | Variant::Int32(_) | Variant::Int64(_) => {
            Some(ValueKind::Int)
        }
        Variant::Byte(_) | Variant::UInt16(_) | Variant::UInt32(_) | Variant::UInt64(_) => {
            Some(ValueKind::UInt)
        }
        Variant::Float(_) | Variant::Double(_) => Some(ValueKind::Float),
        Variant::String(_) => Some(ValueKind::Text),
        _ => None,
    }
}

/// Encode `value` with the exact scalar type the node currently holds
fn to_variant(value: TagValue, current: &Variant) -> Result<Variant, TransportError> {
    let variant = match (current, value) {
        (Variant::Boolean(_), TagValue::Boolean(v)) => Variant::Boolean(v),
        (Variant::SByte(_), TagValue::Int(v)) => Variant::SByte(narrow(v)?),
        (Variant::Int16(_), TagValue::Int(v)) => Variant::Int16(narrow(v)?),
        (Variant::Int32(_), TagValue::Int(v)) => Variant::Int32(narrow(v)?),
        (Variant::Int64(_), TagValue::Int(v)) => Variant::Int64(v),
        (Variant::Byte(_), TagValue::UInt(v)) => Variant::Byte(narrow(v)?),
        (Variant::UInt16(_), TagValue::UInt(v)) => Variant::UInt16(narrow(v)?),
        (Variant::UInt32(_), TagValue::UInt(v)) => Variant::UInt32(narrow(v)?),
        (Variant::UInt64(_), TagValue::UInt(v)) => Variant::UInt64(v),
        (Variant::Float(_), TagValue::Float(v)) => Variant::Float(v as f32),
        (Variant::Double(_), TagValue::Float(v)) => Variant::Double(v),
        (Variant::String(_), TagValue::Text(v)) => Variant::String(v.into()),
        (Variant::Array(_), TagValue::BooleanArray(v)) => Variant::from(v),
        _ => return Err(TransportError::Status("BadTypeMismatch".to_string())),
    };
    Ok(variant)
}

fn narrow<T, V: TryInto<T>>(value: V) -> Result<T, TransportError> {
    value
        .try_into()
        .map_err(|_| TransportError::Status("BadOutOfRange".to_string()))
}
