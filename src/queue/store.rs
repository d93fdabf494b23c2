//! Queue store trait and the in-memory backend
//!
//! A store keeps one ordered list of participants per gender and offers the
//! atomic primitives the queue manager is built on.

use crate::error::{MeetingError, Result};
use crate::types::{Gender, Identity, Participant};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Ordered, identity-deduplicated list storage for both queues
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Remove any entry with the same identity, then append at the tail.
    /// Returns true when a stale entry was replaced.
    async fn push_back(&self, gender: Gender, participant: Participant) -> Result<bool>;

    /// Remove the entry for `identity`; returns whether anything was removed
    async fn remove(&self, gender: Gender, identity: &str) -> Result<bool>;

    /// Atomically remove the given identities if present, returning the
    /// removed entries in queue order
    async fn dequeue_set(&self, gender: Gender, identities: &[Identity])
        -> Result<Vec<Participant>>;

    /// Ordered copy of a queue without removing anything
    async fn snapshot(&self, gender: Gender) -> Result<Vec<Participant>>;

    /// Current length of a queue
    async fn length(&self, gender: Gender) -> Result<usize>;

    /// Short backend name for logs and health output
    fn backend_name(&self) -> &'static str;
}

/// Single-process queue store
#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    queues: RwLock<HashMap<Gender, Vec<Participant>>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_error() -> MeetingError {
        MeetingError::InternalError {
            message: "Failed to acquire queue store lock".to_string(),
        }
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn push_back(&self, gender: Gender, participant: Participant) -> Result<bool> {
        let mut queues = self.queues.write().map_err(|_| Self::lock_error())?;
        let queue = queues.entry(gender).or_default();

        let before = queue.len();
        queue.retain(|p| p.identity != participant.identity);
        let replaced = queue.len() != before;
        queue.push(participant);

        Ok(replaced)
    }

    async fn remove(&self, gender: Gender, identity: &str) -> Result<bool> {
        let mut queues = self.queues.write().map_err(|_| Self::lock_error())?;
        let Some(queue) = queues.get_mut(&gender) else {
            return Ok(false);
        };

        let before = queue.len();
        queue.retain(|p| p.identity != identity);
        Ok(queue.len() != before)
    }

    async fn dequeue_set(
        &self,
        gender: Gender,
        identities: &[Identity],
    ) -> Result<Vec<Participant>> {
        let mut queues = self.queues.write().map_err(|_| Self::lock_error())?;
        let Some(queue) = queues.get_mut(&gender) else {
            return Ok(Vec::new());
        };

        let wanted: HashSet<&str> = identities.iter().map(String::as_str).collect();
        let (removed, kept): (Vec<_>, Vec<_>) = queue
            .drain(..)
            .partition(|p| wanted.contains(p.identity.as_str()));
        *queue = kept;

        Ok(removed)
    }

    async fn snapshot(&self, gender: Gender) -> Result<Vec<Participant>> {
        let queues = self.queues.read().map_err(|_| Self::lock_error())?;
        Ok(queues.get(&gender).cloned().unwrap_or_default())
    }

    async fn length(&self, gender: Gender) -> Result<usize> {
        let queues = self.queues.read().map_err(|_| Self::lock_error())?;
        Ok(queues.get(&gender).map(Vec::len).unwrap_or(0))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
