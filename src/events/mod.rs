//! Outbound events
//!
//! Matched participants other than the joiner learn about their session
//! through these events.

pub mod publisher;

pub use publisher::{
    BroadcastEventPublisher, EventPublisher, LoggingEventPublisher, MockEventPublisher,
};
