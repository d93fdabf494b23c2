//! Event publisher for outbound session events

use crate::error::{MeetingError, Result};
use crate::types::{MeetingEvent, SessionClosed, SessionReady};
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Trait for publishing meeting events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a SessionReady event
    async fn publish_session_ready(&self, event: SessionReady) -> Result<()>;

    /// Publish a SessionClosed event
    async fn publish_session_closed(&self, event: SessionClosed) -> Result<()>;
}

/// Publisher that only writes events to the log
#[derive(Debug, Default)]
pub struct LoggingEventPublisher;

impl LoggingEventPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish_session_ready(&self, event: SessionReady) -> Result<()> {
        info!(
            "Session {} ready - males: {:?}, females: {:?}",
            event.session_id,
            event.males.iter().map(|p| &p.identity).collect::<Vec<_>>(),
            event.females.iter().map(|p| &p.identity).collect::<Vec<_>>()
        );
        Ok(())
    }

    async fn publish_session_closed(&self, event: SessionClosed) -> Result<()> {
        info!("Session {} closed", event.session_id);
        Ok(())
    }
}

/// Fan-out publisher over a tokio broadcast channel.
///
/// The surrounding application subscribes and forwards events to the matched
/// participants' connections. Publishing with no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<MeetingEvent>,
}

impl BroadcastEventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MeetingEvent> {
        self.sender.subscribe()
    }

    fn send(&self, event: MeetingEvent) -> Result<()> {
        if self.sender.receiver_count() == 0 {
            debug!("No event subscribers, dropping {:?}", event);
            return Ok(());
        }

        self.sender
            .send(event)
            .map(|receivers| debug!("Event delivered to {} subscribers", receivers))
            .map_err(|e| {
                MeetingError::InternalError {
                    message: format!("Failed to broadcast event: {}", e),
                }
                .into()
            })
    }
}

#[async_trait]
impl EventPublisher for BroadcastEventPublisher {
    async fn publish_session_ready(&self, event: SessionReady) -> Result<()> {
        self.send(MeetingEvent::SessionReady(event))
    }

    async fn publish_session_closed(&self, event: SessionClosed) -> Result<()> {
        self.send(MeetingEvent::SessionClosed(event))
    }
}

/// Mock event publisher for testing
#[derive(Debug, Default)]
pub struct MockEventPublisher {
    published_events: std::sync::Mutex<Vec<MeetingEvent>>,
}

impl MockEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All published events, oldest first
    pub fn get_published_events(&self) -> Vec<MeetingEvent> {
        self.published_events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// SessionReady events only
    pub fn ready_events(&self) -> Vec<SessionReady> {
        self.get_published_events()
            .into_iter()
            .filter_map(|event| match event {
                MeetingEvent::SessionReady(ready) => Some(ready),
                MeetingEvent::SessionClosed(_) => None,
            })
            .collect()
    }

    pub fn clear_events(&self) {
        if let Ok(mut events) = self.published_events.lock() {
            events.clear();
        }
    }

    fn record(&self, event: MeetingEvent) {
        if let Ok(mut events) = self.published_events.lock() {
            events.push(event);
        }
    }
}

#[async_trait]
impl EventPublisher for MockEventPublisher {
    async fn publish_session_ready(&self, event: SessionReady) -> Result<()> {
        self.record(MeetingEvent::SessionReady(event));
        Ok(())
    }

    async fn publish_session_closed(&self, event: SessionClosed) -> Result<()> {
        self.record(MeetingEvent::SessionClosed(event));
        Ok(())
    }
}
