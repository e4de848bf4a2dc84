//! Telemetry Snapshots
//!
//! One immutable record per device per tick, and the payload a subscriber
//! or pull query receives after visibility filtering.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::device::{ConnectionStatus, DeviceDescriptor, TagName, TagValue};
use crate::directory::Visibility;

/// State of one device at the moment it was read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    pub status: ConnectionStatus,
    /// Endpoint address; visibility filtering keys on it
    pub url: String,
    /// Tag name → stringified value
    pub nodes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Snapshot {
    /// A snapshot without values
    pub fn new(descriptor: &DeviceDescriptor, status: ConnectionStatus) -> Self {
        Self {
            name: descriptor.name.clone(),
            status,
            url: descriptor.url.clone(),
            nodes: BTreeMap::new(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_values<'a>(
        mut self,
        values: impl IntoIterator<Item = (&'a TagName, TagValue)>,
    ) -> Self {
        self.nodes = values
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        self
    }

    pub fn is_visible_to(&self, visibility: &Visibility) -> bool {
        visibility.allows(&self.url)
    }
}

/// Body of a `telemetry_update` push and of the pull query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    pub plc_clients: Vec<Snapshot>,
}

impl TelemetryPayload {
    /// The part of `batch` a holder of `visibility` may see, in batch order
    pub fn visible(batch: &[Snapshot], visibility: &Visibility) -> Self {
        Self {
            plc_clients: batch
                .iter()
                .filter(|snapshot| snapshot.is_visible_to(visibility))
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn descriptor(id: &str) -> DeviceDescriptor {
        DeviceDescriptor::new(
            id,
            format!("Park {id}"),
            format!("opc.tcp://{id}:4840"),
            "ns=3;s=ServerInterfaces",
        )
    }

    #[test]
    fn test_error_field_omitted_when_absent() {
        let snapshot = Snapshot::new(&descriptor("a"), ConnectionStatus::Disconnected);
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["name"], "Park a");
        assert_eq!(json["status"], "DISCONNECTED");
        assert_eq!(json["url"], "opc.tcp://a:4840");
        assert!(json["nodes"].as_object().unwrap().is_empty());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_values_are_stringified() {
        let power = TagName::new("ActivePower").unwrap();
        let alarms = TagName::new("Alarms").unwrap();
        let snapshot = Snapshot::new(&descriptor("a"), ConnectionStatus::Connected).with_values([
            (&power, TagValue::Float(512.5)),
            (&alarms, TagValue::BooleanArray(vec![false, true])),
        ]);

        assert_eq!(snapshot.nodes["ActivePower"], "512.5");
        assert_eq!(snapshot.nodes["Alarms"], "[false, true]");
    }

    #[test]
    fn test_visible_filters_by_url() {
        let batch = vec![
            Snapshot::new(&descriptor("a"), ConnectionStatus::Connected),
            Snapshot::new(&descriptor("b"), ConnectionStatus::Connected),
        ];

        let only_a = Visibility::Restricted(HashSet::from(["opc.tcp://a:4840".to_string()]));
        let payload = TelemetryPayload::visible(&batch, &only_a);
        assert_eq!(payload.plc_clients.len(), 1);
        assert_eq!(payload.plc_clients[0].url, "opc.tcp://a:4840");

        let payload = TelemetryPayload::visible(&batch, &Visibility::Unrestricted);
        assert_eq!(payload.plc_clients.len(), 2);

        let payload = TelemetryPayload::visible(&batch, &Visibility::none());
        assert!(payload.plc_clients.is_empty());
    }
}
