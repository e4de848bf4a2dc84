//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::{ConnectionStatus, DeviceSupervisor, WriteInput};

// ============================================
// WRITE DTOs
// ============================================

/// Write command request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Endpoint address of the target device
    pub plc_url: String,
    /// Tag name as discovered
    pub node_name: String,
    /// Number, boolean, boolean sequence or string
    pub value: WriteInput,
}

/// Write command response
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteResponse {
    pub status: String,
}

impl WriteResponse {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
        }
    }
}

// ============================================
// DEVICE DTOs
// ============================================

/// One configured device as seen by the caller
#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub id: String,
    pub name: String,
    pub url: String,
    pub status: ConnectionStatus,
    /// Product name read from the device, empty until first connect
    pub server_name: String,
    /// Number of discovered tags
    pub tags: usize,
    /// Time of the last connection attempt
    pub last_attempt: Option<DateTime<Utc>>,
}

impl From<&DeviceSupervisor> for DeviceSummary {
    fn from(device: &DeviceSupervisor) -> Self {
        let descriptor = device.descriptor();
        Self {
            id: descriptor.id.clone(),
            name: descriptor.name.clone(),
            url: descriptor.url.clone(),
            status: device.status(),
            server_name: device.server_name(),
            tags: device.tag_count(),
            last_attempt: device.last_attempt(),
        }
    }
}

/// Device listing response
#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceListResponse {
    pub devices: Vec<DeviceSummary>,
    pub total: usize,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health status response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status: healthy, degraded, unhealthy
    pub status: String,
    /// Devices currently connected
    pub devices_connected: usize,
    /// Devices configured
    pub devices_total: usize,
    /// Live WebSocket subscribers
    pub subscribers: usize,
    /// Completed broadcast ticks
    pub ticks: u64,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}
