//! Lifecycle events for campaigns and segments.
//!
//! Events go to an in-process broadcast channel and, when a Redis URL is
//! configured, to the `crm_events` pub/sub channel as JSON
//! `{"event", "timestamp", "data"}`. Publishing happens after the database
//! commit and never fails the operation that triggered it.

use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Redis pub/sub channel events are published on.
pub const EVENT_CHANNEL: &str = "crm_events";

const BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    CampaignCreated,
    CampaignUpdated,
    CampaignLaunched,
    CampaignPaused,
    CampaignResumed,
    CampaignCompleted,
    SegmentRefreshed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrmEvent {
    pub event: EventKind,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

impl CrmEvent {
    pub fn new(event: EventKind, data: Value) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
            data,
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CrmEvent>,
    redis: Option<MultiplexedConnection>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// An in-process bus with no Redis publisher.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            sender,
            redis: None,
        }
    }

    /// Connect to Redis and publish every event there as well.
    pub async fn with_redis(url: &str) -> anyhow::Result<Self> {
        info!(url = %url, "Connecting to Redis");
        let client = redis::Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(response = %pong, "Redis connection established");

        Ok(Self {
            redis: Some(conn),
            ..Self::new()
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CrmEvent> {
        self.sender.subscribe()
    }

    pub async fn publish(&self, event: CrmEvent) {
        debug!(event = ?event.event, "Publishing event");

        // No receivers is fine
        let _ = self.sender.send(event.clone());

        let Some(conn) = &self.redis else {
            return;
        };
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize event");
                return;
            }
        };
        let mut conn = conn.clone();
        if let Err(e) = conn.publish::<_, _, ()>(EVENT_CHANNEL, payload).await {
            warn!(event = ?event.event, error = %e, "Failed to publish event to Redis");
        }
    }

    /// Serialize `data` and publish it under `kind`.
    pub async fn emit<T: Serialize>(&self, kind: EventKind, data: &T) {
        match serde_json::to_value(data) {
            Ok(data) => self.publish(CrmEvent::new(kind, data)).await,
            Err(e) => warn!(event = ?kind, error = %e, "Failed to serialize event data"),
        }
    }
}

/// Subscribe to the Redis channel and log every event until the connection
/// closes.
pub async fn listen(url: &str) -> anyhow::Result<()> {
    let client = redis::Client::open(url)?;
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(EVENT_CHANNEL).await?;
    info!(channel = EVENT_CHANNEL, "Listening for events");

    let messages = pubsub.on_message();
    tokio::pin!(messages);
    while let Some(msg) = messages.next().await {
        let payload: String = msg.get_payload()?;
        match serde_json::from_str::<CrmEvent>(&payload) {
            Ok(event) => info!(
                event = ?event.event,
                timestamp = %event.timestamp,
                data = %event.data,
                "Event received"
            ),
            Err(e) => warn!(error = %e, payload = %payload, "Ignoring malformed event"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_serializes_with_pascal_case_name() {
        let event = CrmEvent::new(EventKind::CampaignLaunched, json!({ "campaign_id": "abc" }));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "CampaignLaunched");
        assert_eq!(value["data"]["campaign_id"], "abc");
        assert!(value["timestamp"].is_string());
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(EventKind::SegmentRefreshed, &json!({ "count": 3 })).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, EventKind::SegmentRefreshed);
        assert_eq!(event.data["count"], 3);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.emit(EventKind::CampaignCreated, &json!({})).await;
    }
}
