//! Subscriber Registry
//!
//! Tracks live subscribers grouped by user identity and fans each tick's
//! batch out to them. Every subscriber has a bounded outbound queue drained
//! by its connection's writer task; the fan-out never waits on it.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::messages::ServerMessage;
use crate::directory::Visibility;
use crate::snapshot::{Snapshot, TelemetryPayload};

/// Unique identifier for a WebSocket connection
pub type ConnectionId = String;

/// Configuration for the subscriber registry
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent subscribers
    pub max_connections: usize,
    /// Capacity of each subscriber's outbound queue
    pub outbound_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            outbound_capacity: 16,
        }
    }
}

struct Subscriber {
    sender: mpsc::Sender<ServerMessage>,
    visibility: Arc<Visibility>,
}

/// Delivery counts for one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Payloads enqueued
    pub delivered: usize,
    /// Payloads dropped because the subscriber's queue was full
    pub dropped: usize,
    /// Subscribers removed because their connection was gone
    pub removed: usize,
}

/// All live subscribers: user id → connection id → subscriber
pub struct SubscriberRegistry {
    subscribers: RwLock<HashMap<String, HashMap<ConnectionId, Subscriber>>>,
    config: HubConfig,
}

impl SubscriberRegistry {
    pub fn new(config: HubConfig) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Register a subscriber with the visibility it keeps for its lifetime
    pub async fn register(
        &self,
        user_id: &str,
        visibility: Visibility,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<ConnectionId, HubError> {
        let mut subscribers = self.subscribers.write().await;
        let total: usize = subscribers.values().map(HashMap::len).sum();
        if total >= self.config.max_connections {
            return Err(HubError::TooManyConnections(self.config.max_connections));
        }

        let id = Uuid::new_v4().to_string();
        subscribers.entry(user_id.to_string()).or_default().insert(
            id.clone(),
            Subscriber {
                sender,
                visibility: Arc::new(visibility),
            },
        );

        tracing::info!(connection_id = %id, user_id, "Subscriber registered");
        Ok(id)
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub async fn unregister(&self, user_id: &str, connection_id: &str) -> bool {
        let mut subscribers = self.subscribers.write().await;
        let Some(connections) = subscribers.get_mut(user_id) else {
            return false;
        };
        let removed = connections.remove(connection_id).is_some();
        if connections.is_empty() {
            subscribers.remove(user_id);
        }

        if removed {
            tracing::info!(connection_id, user_id, "Subscriber removed");
        }
        removed
    }

    /// Push the visible part of `batch` to every subscriber
    ///
    /// A full queue drops this tick's payload for that subscriber only; a
    /// closed queue removes the subscriber. Neither affects anyone else.
    pub async fn broadcast(&self, batch: &[Snapshot]) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut closed = Vec::new();

        {
            let subscribers = self.subscribers.read().await;
            for (user_id, connections) in subscribers.iter() {
                for (connection_id, subscriber) in connections {
                    let payload = TelemetryPayload::visible(batch, &subscriber.visibility);
                    match subscriber.sender.try_send(ServerMessage::telemetry(payload)) {
                        Ok(()) => report.delivered += 1,
                        Err(TrySendError::Full(_)) => {
                            tracing::warn!(
                                connection_id = %connection_id,
                                user_id = %user_id,
                                "Subscriber lagging, payload dropped"
                            );
                            report.dropped += 1;
                        }
                        Err(TrySendError::Closed(_)) => {
                            tracing::warn!(
                                connection_id = %connection_id,
                                user_id = %user_id,
                                "Subscriber channel closed"
                            );
                            closed.push((user_id.clone(), connection_id.clone()));
                        }
                    }
                }
            }
        }

        for (user_id, connection_id) in closed {
            if self.unregister(&user_id, &connection_id).await {
                report.removed += 1;
            }
        }

        report
    }

    /// Get the current subscriber count
    pub async fn connection_count(&self) -> usize {
        self.subscribers.read().await.values().map(HashMap::len).sum()
    }

    /// Number of distinct users with at least one subscriber
    pub async fn user_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Drop every subscriber; their writer tasks see the queue close
    pub async fn close_all(&self) -> usize {
        let drained: usize = self
            .subscribers
            .write()
            .await
            .drain()
            .map(|(_, connections)| connections.len())
            .sum();
        tracing::info!(subscribers = drained, "Subscriber registry closed");
        drained
    }
}

/// Errors that can occur in the subscriber registry
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ConnectionStatus, DeviceDescriptor};
    use std::collections::HashSet;

    fn snapshot(id: &str) -> Snapshot {
        let descriptor = DeviceDescriptor::new(
            id,
            id.to_uppercase(),
            format!("opc.tcp://{id}:4840"),
            "ns=3;s=ServerInterfaces",
        );
        Snapshot::new(&descriptor, ConnectionStatus::Connected)
    }

    fn only(urls: &[&str]) -> Visibility {
        Visibility::Restricted(urls.iter().map(|u| u.to_string()).collect::<HashSet<_>>())
    }

    fn urls(message: ServerMessage) -> Vec<String> {
        match message {
            ServerMessage::TelemetryUpdate { data } => {
                data.plc_clients.into_iter().map(|s| s.url).collect()
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.outbound_capacity, 16);
    }

    #[tokio::test]
    async fn test_register_unregister() {
        let registry = SubscriberRegistry::new(HubConfig::default());
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);

        let id1 = registry.register("u1", Visibility::Unrestricted, tx1).await.unwrap();
        let id2 = registry.register("u1", Visibility::Unrestricted, tx2).await.unwrap();
        assert_ne!(id1, id2);
        assert_eq!(registry.connection_count().await, 2);
        assert_eq!(registry.user_count().await, 1);

        assert!(registry.unregister("u1", &id1).await);
        assert!(!registry.unregister("u1", &id1).await);
        assert!(registry.unregister("u1", &id2).await);
        assert_eq!(registry.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let registry = SubscriberRegistry::new(HubConfig {
            max_connections: 2,
            outbound_capacity: 4,
        });

        let (tx1, _) = mpsc::channel(4);
        let (tx2, _) = mpsc::channel(4);
        let (tx3, _) = mpsc::channel(4);

        registry.register("a", Visibility::Unrestricted, tx1).await.unwrap();
        registry.register("b", Visibility::Unrestricted, tx2).await.unwrap();
        let result = registry.register("c", Visibility::Unrestricted, tx3).await;

        assert!(matches!(result, Err(HubError::TooManyConnections(2))));
    }

    #[tokio::test]
    async fn test_broadcast_filters_per_subscriber() {
        let registry = SubscriberRegistry::new(HubConfig::default());
        let (tx_x, mut rx_x) = mpsc::channel(4);
        let (tx_y, mut rx_y) = mpsc::channel(4);
        let (tx_z, mut rx_z) = mpsc::channel(4);

        registry.register("x", only(&["opc.tcp://a:4840"]), tx_x).await.unwrap();
        registry.register("y", Visibility::Unrestricted, tx_y).await.unwrap();
        registry.register("z", Visibility::none(), tx_z).await.unwrap();

        let report = registry.broadcast(&[snapshot("a"), snapshot("b")]).await;
        assert_eq!(report.delivered, 3);

        assert_eq!(urls(rx_x.recv().await.unwrap()), vec!["opc.tcp://a:4840"]);
        assert_eq!(
            urls(rx_y.recv().await.unwrap()),
            vec!["opc.tcp://a:4840", "opc.tcp://b:4840"]
        );
        assert!(urls(rx_z.recv().await.unwrap()).is_empty());
    }

    #[tokio::test]
    async fn test_closed_subscriber_removed_others_served() {
        let registry = SubscriberRegistry::new(HubConfig::default());
        let (tx_dead, rx_dead) = mpsc::channel(4);
        let (tx_live, mut rx_live) = mpsc::channel(4);

        registry.register("dead", Visibility::Unrestricted, tx_dead).await.unwrap();
        registry.register("live", Visibility::Unrestricted, tx_live).await.unwrap();
        drop(rx_dead);

        let report = registry.broadcast(&[snapshot("a")]).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(registry.connection_count().await, 1);
        assert_eq!(urls(rx_live.recv().await.unwrap()), vec!["opc.tcp://a:4840"]);
    }

    #[tokio::test]
    async fn test_full_queue_drops_payload_keeps_subscriber() {
        let registry = SubscriberRegistry::new(HubConfig::default());
        let (tx, mut rx) = mpsc::channel(1);
        registry.register("slow", Visibility::Unrestricted, tx).await.unwrap();

        let first = registry.broadcast(&[snapshot("a")]).await;
        let second = registry.broadcast(&[snapshot("b")]).await;
        assert_eq!(first.delivered, 1);
        assert_eq!(second.dropped, 1);
        assert_eq!(registry.connection_count().await, 1);

        assert_eq!(urls(rx.recv().await.unwrap()), vec!["opc.tcp://a:4840"]);
    }

    #[tokio::test]
    async fn test_close_all_closes_queues() {
        let registry = SubscriberRegistry::new(HubConfig::default());
        let (tx, mut rx) = mpsc::channel(4);
        registry.register("u", Visibility::Unrestricted, tx).await.unwrap();

        assert_eq!(registry.close_all().await, 1);
        assert!(rx.recv().await.is_none());
    }
}
