//! Process-wide domain event bus (spec.md §4.H): best-effort in-process
//! fan-out, subscribers must be idempotent. Built on `tokio::sync::broadcast`
//! the way the teacher's reactive scheduler fans journal facts out to views.

use slicebox_core::ids::ImageId;
use slicebox_core::model::MetadataAttributes;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub enum DomainEvent {
    SourceDeleted(String),
    ImagesDeleted(Vec<ImageId>),
    MetaDataAdded(MetadataAttributes),
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }

    /// Best-effort publish. No subscribers is not an error (spec.md §4.H).
    pub fn publish(&self, event: DomainEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_does_not_error() {
        let bus = EventBus::new();
        bus.publish(DomainEvent::SourceDeleted("box-1".to_string()));
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(DomainEvent::ImagesDeleted(vec![ImageId("img-1".to_string())]));
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, DomainEvent::ImagesDeleted(ids) if ids.len() == 1));
    }
}
