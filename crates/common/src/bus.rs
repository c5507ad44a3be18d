//! Publish capability as an explicit dependency rather than invisible
//! coupling through a global MQTT client (spec §9 redesign note). Production
//! code depends on `Publisher`; tests substitute `InMemoryBus`.

use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use tokio::sync::broadcast;

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()>;
}

/// Wraps a live `rumqttc::AsyncClient`. QoS 1, not retained — every
/// component publishes transient readings/plans/commands, never a retained
/// status (unlike the teacher's `status/hub` last-will announcement, which
/// has no counterpart here since there's no single hub process).
pub struct MqttPublisher(pub AsyncClient);

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        self.0
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }
}

/// In-memory bus used by tests in place of a real broker. Every publish is
/// broadcast to all current subscribers; a subscriber created after a
/// publish simply never sees it, matching MQTT's no-history default for a
/// non-retained message.
pub struct InMemoryBus {
    tx: broadcast::Sender<(String, Vec<u8>)>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(String, Vec<u8>)> {
        self.tx.subscribe()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for InMemoryBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        // No subscribers is not an error — mirrors a real broker accepting a
        // publish with zero matching subscriptions.
        let _ = self.tx.send((topic.to_string(), payload));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_bus_delivers_to_subscriber() {
        let bus = InMemoryBus::new();
        let mut rx = bus.subscribe();
        bus.publish("f/z/status", b"hello".to_vec()).await.unwrap();
        let (topic, payload) = rx.recv().await.unwrap();
        assert_eq!(topic, "f/z/status");
        assert_eq!(payload, b"hello");
    }

    #[tokio::test]
    async fn in_memory_bus_publish_with_no_subscribers_is_ok() {
        let bus = InMemoryBus::new();
        assert!(bus.publish("f/z/status", b"x".to_vec()).await.is_ok());
    }

    #[tokio::test]
    async fn in_memory_bus_fans_out_to_multiple_subscribers() {
        let bus = InMemoryBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish("t", b"v".to_vec()).await.unwrap();
        assert_eq!(a.recv().await.unwrap().1, b"v");
        assert_eq!(b.recv().await.unwrap().1, b"v");
    }
}
