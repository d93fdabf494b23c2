//! Cached friend lookups
//!
//! `FriendIndex` answers `friends_of` from a moka cache and falls back to the
//! social graph on a miss. Concurrent misses for one identity share a single
//! lookup. Failed lookups are never cached.

use crate::config::FriendSettings;
use crate::error::{MeetingError, Result};
use crate::friends::provider::SocialGraph;
use crate::friends::FriendLookupPolicy;
use crate::metrics::MetricsCollector;
use crate::types::Identity;
use moka::future::Cache;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shared, immutable friend set
pub type FriendSet = Arc<HashSet<Identity>>;

pub struct FriendIndex {
    graph: Arc<dyn SocialGraph>,
    cache: Cache<Identity, FriendSet>,
    policy: FriendLookupPolicy,
    metrics: Option<Arc<MetricsCollector>>,
}

impl FriendIndex {
    pub fn new(
        graph: Arc<dyn SocialGraph>,
        capacity: u64,
        ttl: Duration,
        policy: FriendLookupPolicy,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        Self {
            graph,
            cache,
            policy,
            metrics: None,
        }
    }

    /// Build from the `[friends]` config section
    pub fn from_settings(
        graph: Arc<dyn SocialGraph>,
        settings: &FriendSettings,
        policy: FriendLookupPolicy,
    ) -> Self {
        Self::new(
            graph,
            settings.cache_capacity,
            Duration::from_secs(settings.cache_ttl_seconds),
            policy,
        )
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn policy(&self) -> FriendLookupPolicy {
        self.policy
    }

    /// Friend set of `identity`, from cache when possible.
    ///
    /// Under `FailOpen` a failed lookup yields an empty set for this call only.
    pub async fn friends_of(&self, identity: &str) -> Result<FriendSet> {
        if let Some(friends) = self.cache.get(identity).await {
            self.record_cache(true);
            return Ok(friends);
        }
        self.record_cache(false);

        let graph = self.graph.clone();
        let key = identity.to_string();
        let lookup = self
            .cache
            .try_get_with(key.clone(), async move {
                let friends = graph.friends_of(&key).await?;
                debug!("Fetched {} friends for '{}'", friends.len(), key);
                Ok::<_, anyhow::Error>(Arc::new(friends))
            })
            .await;

        match lookup {
            Ok(friends) => Ok(friends),
            Err(error) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_friend_lookup_failure(self.policy.as_str());
                }

                match self.policy {
                    FriendLookupPolicy::FailClosed => Err(MeetingError::FriendLookupFailure {
                        identity: identity.to_string(),
                        reason: error.to_string(),
                    }
                    .into()),
                    FriendLookupPolicy::FailOpen => {
                        warn!(
                            "Friend lookup failed for '{}', continuing without exclusions: {}",
                            identity, error
                        );
                        Ok(Arc::new(HashSet::new()))
                    }
                }
            }
        }
    }

    /// Drop the cached friend set of one identity
    pub async fn invalidate(&self, identity: &str) {
        self.cache.invalidate(identity).await;
        debug!("Invalidated friend cache for '{}'", identity);
    }

    /// Drop every cached friend set
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
        info!("Invalidated entire friend cache");
    }

    fn record_cache(&self, hit: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_friend_cache(hit);
        }
    }
}
