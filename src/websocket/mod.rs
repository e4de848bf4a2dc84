//! WebSocket Real-Time Streaming
//!
//! Pushes telemetry to dashboard clients via WebSocket.
//!
//! ## Architecture
//!
//! - **SubscriberRegistry**: Live subscribers grouped by user, with per-subscriber visibility
//! - **Handler**: Handshake, authentication and the per-connection writer task
//! - **Messages**: Server frame formats
//!
//! ## Usage
//!
//! Clients connect to `/ws` with a bearer token and receive a
//! `telemetry_update` frame every tick plus a `keepalive` frame every 30 s.
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket('ws://localhost:8000/ws', ['bearer', token]);
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'telemetry_update') render(msg.data.plc_clients);
//! };
//! ```

mod handler;
mod hub;
mod messages;

pub use handler::{websocket_handler, WsParams};
pub use hub::{BroadcastReport, ConnectionId, HubConfig, HubError, SubscriberRegistry};
pub use messages::ServerMessage;
