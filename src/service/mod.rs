//! Service layer for the meeting matcher
//!
//! The meeting service itself, the application state that wires it up, and
//! the health checks that report on it.

pub mod app;
pub mod health;
pub mod meeting;

pub use app::{AppState, ServiceError};
pub use health::{HealthCheck, HealthContext, HealthStatus};
pub use meeting::{MeetingService, MeetingServiceStats};
