//! Domain event publishing.
//!
//! Events are fire-and-forget: a broker outage is logged and never fails
//! the cart or checkout operation that produced the event.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::events::DomainEvent;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Broker rejected event: {0}")]
    Broker(String),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError>;
}

/// Publishes JSON-encoded events on NATS, one subject per event kind.
pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;
        self.client
            .publish(event.subject().to_string(), payload.into())
            .await
            .map_err(|e| PublishError::Broker(e.to_string()))
    }
}

/// Used when no broker is configured.
#[derive(Default)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        debug!(subject = event.subject(), "no broker configured, event dropped");
        Ok(())
    }
}

/// Keeps every event in memory; handy in tests.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingPublisher {
    pub async fn events(&self) -> Vec<DomainEvent> { self.events.lock().await.clone() }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

pub async fn publish_best_effort(publisher: &dyn EventPublisher, event: &DomainEvent) {
    if let Err(e) = publisher.publish(event).await {
        warn!(subject = event.subject(), error = %e, "failed to publish domain event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::CartEvent;
    use crate::domain::value_objects::UserId;

    struct Failing;

    #[async_trait]
    impl EventPublisher for Failing {
        async fn publish(&self, _: &DomainEvent) -> Result<(), PublishError> {
            Err(PublishError::Broker("down".into()))
        }
    }

    #[tokio::test]
    async fn test_best_effort_swallows_errors() {
        let event = DomainEvent::Cart(CartEvent::GuestCartMerged { user_id: UserId::new(), merged_lines: vec![] });
        publish_best_effort(&Failing, &event).await;
        let recorder = RecordingPublisher::default();
        publish_best_effort(&recorder, &event).await;
        assert_eq!(recorder.events().await, vec![event]);
    }

    #[test]
    fn test_event_encoding() {
        let event = DomainEvent::Cart(CartEvent::GuestCartMerged { user_id: UserId::new(), merged_lines: vec![] });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "cart");
        assert_eq!(json["event"], "guest_cart_merged");
        assert_eq!(event.subject(), "checkout.cart.merged");
    }
}
