//! Meeting Matcher - friend-excluding group matchmaking for video meetings
//!
//! Participants join a male or female queue. Once both queues hold enough
//! people, a group of `K` per side is formed in which nobody is a friend of
//! anyone on the other side, and the group is placed into a video session.

pub mod config;
pub mod error;
pub mod events;
pub mod friends;
pub mod matching;
pub mod metrics;
pub mod queue;
pub mod service;
pub mod session;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MeetingError, Result};
pub use types::*;

// Re-export key components
pub use events::EventPublisher;
pub use friends::{FriendIndex, SocialGraph};
pub use queue::ParticipantQueue;
pub use service::MeetingService;
pub use session::{SessionCoordinator, VideoProvider};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
