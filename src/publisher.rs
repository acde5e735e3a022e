//! Outbound domain events.
//!
//! Events go out after the database work they describe has committed. A
//! failed publish is logged and otherwise ignored; it never undoes an order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::events::DomainEvent;

#[derive(Debug, Serialize)]
pub struct EventEnvelope<'a> {
    pub id: Uuid,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: &'a DomainEvent,
}

impl<'a> EventEnvelope<'a> {
    pub fn new(event: &'a DomainEvent) -> Self { Self { id: Uuid::now_v7(), occurred_at: Utc::now(), event } }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

/// Publishes each event in order, logging failures.
pub async fn publish_all(publisher: &dyn EventPublisher, events: &[DomainEvent]) {
    for event in events {
        if let Err(e) = publisher.publish(event).await {
            tracing::warn!(subject = event.subject(), error = %e, "failed to publish event");
        }
    }
}

/// NATS publisher; subjects are `<prefix>.<event subject>`.
pub struct NatsPublisher {
    client: async_nats::Client,
    prefix: String,
}

impl NatsPublisher {
    pub fn new(client: async_nats::Client, prefix: impl Into<String>) -> Self { Self { client, prefix: prefix.into() } }

    pub async fn connect(url: &str, prefix: impl Into<String>) -> anyhow::Result<Self> {
        let client = async_nats::connect(url).await?;
        Ok(Self::new(client, prefix))
    }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let subject = format!("{}.{}", self.prefix, event.subject());
        let payload = serde_json::to_vec(&EventEnvelope::new(event))?;
        self.client.publish(subject, payload.into()).await?;
        Ok(())
    }
}

/// Fallback when no broker is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let envelope = EventEnvelope::new(event);
        tracing::info!(event_id = %envelope.id, subject = event.subject(), payload = %serde_json::to_string(&envelope)?, "domain event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::InventoryEvent;
    use crate::domain::value_objects::VariantId;

    #[test]
    fn test_envelope_flattens_event() {
        let event = DomainEvent::Inventory(InventoryEvent::Reserved { variant_id: VariantId::new(9), quantity: 3 });
        let json = serde_json::to_value(EventEnvelope::new(&event)).unwrap();
        assert_eq!(json["aggregate"], "inventory");
        assert_eq!(json["event"]["quantity"], 3);
        assert!(json["id"].is_string());
    }
}
