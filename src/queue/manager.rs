//! Participant queue manager
//!
//! Wraps a `QueueStore` and serializes every mutation behind a single commit
//! lock, so admission checks, claims and restores never interleave with each
//! other or with joins and leaves. The lock is only ever held for store
//! round trips, never across a matching attempt.

use crate::error::Result;
use crate::queue::store::QueueStore;
use crate::types::{Gender, Identity, MatchResult, Participant, QueuePosition, QueueSnapshot};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Result of trying to commit a match against the live queues
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// Every matched participant was still queued and has been removed.
    /// Records are the live ones, so a re-join's newer handle wins.
    Claimed(MatchResult),
    /// Some participants left after the snapshot; nothing was removed
    Stale { missing: Vec<Identity> },
}

/// Snapshot taken inside the admission critical section.
///
/// The queues cannot change while the ticket is alive; drop it as soon as
/// the attempt has been handed off.
pub struct AdmissionTicket<'a> {
    pub snapshot: QueueSnapshot,
    _guard: MutexGuard<'a, ()>,
}

/// The two gender queues behind one commit lock
pub struct ParticipantQueue {
    store: Arc<dyn QueueStore>,
    commit_lock: Mutex<()>,
}

impl ParticipantQueue {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            store,
            commit_lock: Mutex::new(()),
        }
    }

    /// Name of the backing store
    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Add a participant at the tail of its queue.
    ///
    /// An entry with the same identity is dropped from both pools first, so a
    /// re-join moves to the tail and nobody holds two slots.
    pub async fn enqueue(&self, gender: Gender, participant: Participant) -> Result<QueuePosition> {
        let _guard = self.commit_lock.lock().await;
        let identity = participant.identity.clone();

        let other = opposite(gender);
        if self.store.remove(other, &identity).await? {
            info!(
                "Participant '{}' switched pools - removed from {} queue",
                identity, other
            );
        }

        let replaced = self.store.push_back(gender, participant).await?;
        let queue_length = self.store.length(gender).await?;

        if replaced {
            debug!(
                "Participant '{}' re-joined {} queue, moved to tail",
                identity, gender
            );
        }
        debug!(
            "Enqueued '{}' - queue: {}, length: {}",
            identity, gender, queue_length
        );

        Ok(QueuePosition {
            gender,
            position: Some(queue_length.saturating_sub(1)),
            queue_length,
        })
    }

    /// Explicit leave. Removing an absent identity is a no-op.
    pub async fn remove(&self, gender: Gender, identity: &str) -> Result<bool> {
        let _guard = self.commit_lock.lock().await;
        let removed = self.store.remove(gender, identity).await?;

        if removed {
            debug!("Removed '{}' from {} queue", identity, gender);
        } else {
            debug!("Leave for '{}' ignored - not in {} queue", identity, gender);
        }
        Ok(removed)
    }

    /// Atomically remove the given identities if present, returning the subset
    /// actually removed
    pub async fn dequeue_set(
        &self,
        gender: Gender,
        identities: &[Identity],
    ) -> Result<Vec<Participant>> {
        let _guard = self.commit_lock.lock().await;
        self.store.dequeue_set(gender, identities).await
    }

    /// Ordered copy of one queue
    pub async fn snapshot(&self, gender: Gender) -> Result<Vec<Participant>> {
        self.store.snapshot(gender).await
    }

    /// Position of a participant, if queued
    pub async fn position(&self, gender: Gender, identity: &str) -> Result<QueuePosition> {
        let queue = self.store.snapshot(gender).await?;
        Ok(QueuePosition {
            gender,
            position: queue.iter().position(|p| p.identity == identity),
            queue_length: queue.len(),
        })
    }

    /// Current (male, female) queue lengths
    pub async fn lengths(&self) -> Result<(usize, usize)> {
        let males = self.store.length(Gender::Male).await?;
        let females = self.store.length(Gender::Female).await?;
        Ok((males, females))
    }

    /// Admission check and snapshot as one critical section.
    ///
    /// Returns `None` when either queue holds fewer than `group_size`
    /// participants, in which case no attempt may be made.
    pub async fn admit(&self, group_size: usize) -> Result<Option<AdmissionTicket<'_>>> {
        let guard = self.commit_lock.lock().await;

        let males = self.store.length(Gender::Male).await?;
        let females = self.store.length(Gender::Female).await?;
        if males < group_size || females < group_size {
            debug!(
                "Admission threshold not met - males: {}, females: {}, required: {}",
                males, females, group_size
            );
            return Ok(None);
        }

        let snapshot = QueueSnapshot {
            males: self.store.snapshot(Gender::Male).await?,
            females: self.store.snapshot(Gender::Female).await?,
        };

        Ok(Some(AdmissionTicket {
            snapshot,
            _guard: guard,
        }))
    }

    /// Commit a match: remove both groups or nothing.
    ///
    /// Presence is checked on both sides before anything is removed, so a
    /// stale claim leaves every queue exactly as it was.
    pub async fn claim(&self, result: &MatchResult) -> Result<ClaimOutcome> {
        let _guard = self.commit_lock.lock().await;

        let male_ids = result.male_identities();
        let female_ids = result.female_identities();

        let queued_males = self.store.snapshot(Gender::Male).await?;
        let queued_females = self.store.snapshot(Gender::Female).await?;

        let mut missing = missing_identities(&male_ids, &queued_males);
        missing.extend(missing_identities(&female_ids, &queued_females));
        if !missing.is_empty() {
            warn!("Claim aborted - no longer queued: {:?}", missing);
            return Ok(ClaimOutcome::Stale { missing });
        }

        let males = self.store.dequeue_set(Gender::Male, &male_ids).await?;
        let females = self.store.dequeue_set(Gender::Female, &female_ids).await?;

        // A store shared with other instances can still move underneath us
        if males.len() != male_ids.len() || females.len() != female_ids.len() {
            let mut missing = missing_identities(&male_ids, &males);
            missing.extend(missing_identities(&female_ids, &females));
            self.restore_locked(Gender::Male, males).await?;
            self.restore_locked(Gender::Female, females).await?;
            warn!("Claim lost a race on the shared store: {:?}", missing);
            return Ok(ClaimOutcome::Stale { missing });
        }

        info!(
            "Claimed match - males: {:?}, females: {:?}",
            male_ids, female_ids
        );
        Ok(ClaimOutcome::Claimed(MatchResult { males, females }))
    }

    /// Put previously claimed participants back at the tail of their queues
    pub async fn restore(&self, result: &MatchResult) -> Result<()> {
        let _guard = self.commit_lock.lock().await;
        self.restore_locked(Gender::Male, result.males.clone()).await?;
        self.restore_locked(Gender::Female, result.females.clone())
            .await?;

        info!(
            "Restored {} participants to the queues",
            result.males.len() + result.females.len()
        );
        Ok(())
    }

    async fn restore_locked(&self, gender: Gender, participants: Vec<Participant>) -> Result<()> {
        for participant in participants {
            self.store.push_back(gender, participant).await?;
        }
        Ok(())
    }
}

fn opposite(gender: Gender) -> Gender {
    match gender {
        Gender::Male => Gender::Female,
        Gender::Female => Gender::Male,
    }
}

fn missing_identities(requested: &[Identity], present: &[Participant]) -> Vec<Identity> {
    let present: HashSet<&str> = present.iter().map(|p| p.identity.as_str()).collect();
    requested
        .iter()
        .filter(|id| !present.contains(id.as_str()))
        .cloned()
        .collect()
}
