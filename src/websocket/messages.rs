//! WebSocket Message Types
//!
//! Frames pushed from the hub to subscribers. The channel is push-only;
//! inbound frames other than close are ignored.

use serde::{Deserialize, Serialize};

use crate::snapshot::TelemetryPayload;

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Latest snapshots of the devices this subscriber may see
    TelemetryUpdate { data: TelemetryPayload },
    /// Sent periodically so intermediaries keep the socket open
    Keepalive,
}

impl ServerMessage {
    pub fn telemetry(data: TelemetryPayload) -> Self {
        ServerMessage::TelemetryUpdate { data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ConnectionStatus;
    use crate::snapshot::Snapshot;
    use std::collections::BTreeMap;

    #[test]
    fn test_keepalive_serialize() {
        let json = serde_json::to_string(&ServerMessage::Keepalive).unwrap();
        assert_eq!(json, r#"{"type":"keepalive"}"#);
    }

    #[test]
    fn test_telemetry_update_envelope() {
        let msg = ServerMessage::telemetry(TelemetryPayload {
            plc_clients: vec![Snapshot {
                name: "North Park".to_string(),
                status: ConnectionStatus::Connected,
                url: "opc.tcp://10.0.0.1:4840".to_string(),
                nodes: BTreeMap::from([("ActivePower".to_string(), "512.4".to_string())]),
                error: None,
            }],
        });

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "telemetry_update");
        let client = &json["data"]["plc_clients"][0];
        assert_eq!(client["name"], "North Park");
        assert_eq!(client["status"], "CONNECTED");
        assert_eq!(client["nodes"]["ActivePower"], "512.4");
    }
}
