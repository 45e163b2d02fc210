//! Event publication.
//!
//! Grounded on `everruns-storage`'s `EventEmitter` trait + `DbEventEmitter`:
//! a narrow async trait with one factory-constructed implementation. The bus
//! itself (subscribers such as log shippers or external observers) is out of
//! scope here — this crate only emits; the in-process broadcast
//! implementation exists so the Execution Driver has something to publish
//! through under test.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::envelope::Event;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("event channel closed")]
    ChannelClosed,
}

#[async_trait]
pub trait EventPublisher: Send + Sync + 'static {
    async fn publish(&self, event: Event) -> Result<(), PublishError>;
}

/// In-process, multi-subscriber fan-out. Mirrors the auto-incrementing
/// sequence-number role `DbEventEmitter` plays for SSE streaming, minus the
/// database: subscribers receive events in publication order, and a lagging
/// subscriber observes a `RecvError::Lagged` rather than blocking publishers.
#[derive(Clone)]
pub struct InProcessEventPublisher {
    sender: broadcast::Sender<Event>,
}

impl InProcessEventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for InProcessEventPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventPublisher for InProcessEventPublisher {
    async fn publish(&self, event: Event) -> Result<(), PublishError> {
        // No subscribers is not an error: logs/observers are optional.
        let _ = self.sender.send(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compozy_core::WorkflowExecId;

    use crate::subject::{Subject, SubjectComponent};

    #[tokio::test]
    async fn subscribers_receive_published_events_in_order() {
        let publisher = InProcessEventPublisher::new(16);
        let mut rx = publisher.subscribe();

        let wf_exec = WorkflowExecId::new();
        let subject = Subject::event("v1", wf_exec.as_str(), SubjectComponent::Workflow, wf_exec.as_str(), "started").unwrap();
        let event = Event::new(&subject, wf_exec, None, serde_json::json!({}));
        publisher.publish(event.clone()).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_id, event.event_id);
    }
}
