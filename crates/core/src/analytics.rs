use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::interaction::InteractionEvent;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("interaction log write failed: {0}")]
pub struct InteractionLogError(pub String);

/// Append-only sink for interaction events.
#[async_trait]
pub trait InteractionLog: Send + Sync {
    async fn append(&self, event: &InteractionEvent) -> Result<(), InteractionLogError>;
}

#[async_trait]
impl<T: InteractionLog + ?Sized> InteractionLog for Arc<T> {
    async fn append(&self, event: &InteractionEvent) -> Result<(), InteractionLogError> {
        (**self).append(event).await
    }
}

#[derive(Clone, Default)]
pub struct InMemoryInteractionLog {
    events: Arc<Mutex<Vec<InteractionEvent>>>,
}

impl InMemoryInteractionLog {
    pub fn events(&self) -> Vec<InteractionEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl InteractionLog for InMemoryInteractionLog {
    async fn append(&self, event: &InteractionEvent) -> Result<(), InteractionLogError> {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
        Ok(())
    }
}

/// Records shopper interactions without ever failing the action that
/// triggered them. Write failures are logged and dropped.
#[derive(Clone)]
pub struct InteractionTracker<L> {
    log: L,
}

impl<L: InteractionLog> InteractionTracker<L> {
    pub fn new(log: L) -> Self {
        Self { log }
    }

    /// Returns whether the event reached the log.
    pub async fn track(&self, event: InteractionEvent) -> bool {
        match self.log.append(&event).await {
            Ok(()) => {
                debug!(
                    event_name = "analytics.track.recorded",
                    event_id = %event.id.0,
                    event_type = %event.event_type,
                    resource_type = %event.resource_type,
                    resource_id = %event.resource_id,
                    "interaction event recorded"
                );
                true
            }
            Err(error) => {
                warn!(
                    event_name = "analytics.track.failed",
                    event_id = %event.id.0,
                    event_type = %event.event_type,
                    resource_id = %event.resource_id,
                    error = %error,
                    "interaction event dropped"
                );
                false
            }
        }
    }
}

impl<L: InteractionLog + Clone + 'static> InteractionTracker<L> {
    /// Hands the write to the runtime and returns immediately.
    pub fn track_detached(&self, event: InteractionEvent) {
        let tracker = self.clone();
        tokio::spawn(async move {
            tracker.track(event).await;
        });
    }
}
