use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

/// A named event pushed to every connected client.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub name: String,
    pub payload: Value,
}

/// Fire-and-forget publish into the realtime channel. There is no
/// acknowledgment and no per-subscriber filtering at the transport layer;
/// consumers match on fields inside the payload.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &str, payload: Value);
}

/// Process-wide broadcast channel backing the production publisher. The
/// websocket/SSE edge subscribes via [`BroadcastHub::subscribe`]; dropping
/// receivers only means the send is a no-op.
pub struct BroadcastHub {
    tx: broadcast::Sender<Event>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventPublisher for BroadcastHub {
    fn publish(&self, event: &str, payload: Value) {
        let delivered = self
            .tx
            .send(Event {
                name: event.to_string(),
                payload,
            })
            .unwrap_or(0);
        debug!(%event, subscribers = delivered, "event published");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let hub = BroadcastHub::new(8);
        let mut rx = hub.subscribe();
        hub.publish("notification", json!({ "user_id": 7 }));
        let event = rx.recv().await.expect("event delivered");
        assert_eq!(event.name, "notification");
        assert_eq!(event.payload["user_id"], json!(7));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let hub = BroadcastHub::new(8);
        hub.publish("notification", json!({}));
    }
}
