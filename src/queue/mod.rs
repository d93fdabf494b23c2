//! Participant queues for the meeting matcher
//!
//! Two ordered, identity-deduplicated waiting lists (one per gender) behind a
//! manager that owns all mutation. Storage is pluggable: Redis lists for
//! shared deployments, an in-memory store for single-process use.

pub mod manager;
pub mod redis;
pub mod store;

// Re-export commonly used types
pub use self::redis::RedisQueueStore;
pub use manager::{AdmissionTicket, ClaimOutcome, ParticipantQueue};
pub use store::{InMemoryQueueStore, QueueStore};
