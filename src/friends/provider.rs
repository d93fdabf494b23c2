//! Social graph collaborators
//!
//! `SocialGraph` is the seam to whatever service owns friendships. Two
//! implementations ship with the crate: a static in-memory graph for tests and
//! local runs, and an HTTP client for a social graph service.

use crate::error::{MeetingError, Result};
use crate::types::Identity;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info};

/// Source of truth for who is friends with whom
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SocialGraph: Send + Sync {
    /// Identities `identity` is friends with
    async fn friends_of(&self, identity: &str) -> Result<HashSet<Identity>>;
}

/// In-memory social graph with symmetric friendships
#[derive(Debug, Default)]
pub struct StaticSocialGraph {
    friendships: RwLock<HashMap<Identity, HashSet<Identity>>>,
}

impl StaticSocialGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a list of friend pairs
    pub fn with_friendships<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut friendships: HashMap<Identity, HashSet<Identity>> = HashMap::new();
        for (a, b) in pairs {
            friendships
                .entry(a.to_string())
                .or_default()
                .insert(b.to_string());
            friendships
                .entry(b.to_string())
                .or_default()
                .insert(a.to_string());
        }

        Self {
            friendships: RwLock::new(friendships),
        }
    }

    fn lock_error() -> MeetingError {
        MeetingError::InternalError {
            message: "Failed to acquire social graph lock".to_string(),
        }
    }

    /// Make `a` and `b` friends
    pub fn add_friendship(&self, a: &str, b: &str) -> Result<()> {
        let mut friendships = self.friendships.write().map_err(|_| Self::lock_error())?;
        friendships
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string());
        friendships
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string());

        debug!("Added friendship '{}' <-> '{}'", a, b);
        Ok(())
    }

    /// End the friendship between `a` and `b`, if any
    pub fn remove_friendship(&self, a: &str, b: &str) -> Result<()> {
        let mut friendships = self.friendships.write().map_err(|_| Self::lock_error())?;
        if let Some(friends) = friendships.get_mut(a) {
            friends.remove(b);
        }
        if let Some(friends) = friendships.get_mut(b) {
            friends.remove(a);
        }

        debug!("Removed friendship '{}' <-> '{}'", a, b);
        Ok(())
    }
}

#[async_trait]
impl SocialGraph for StaticSocialGraph {
    async fn friends_of(&self, identity: &str) -> Result<HashSet<Identity>> {
        let friendships = self.friendships.read().map_err(|_| Self::lock_error())?;
        Ok(friendships.get(identity).cloned().unwrap_or_default())
    }
}

/// Social graph service client.
///
/// Expects `GET {base_url}/users/{identity}/friends` to answer with a JSON
/// array of identities. A 404 means the user has no friends on record.
pub struct HttpSocialGraph {
    base_url: Url,
    client: Client,
}

impl HttpSocialGraph {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(base_url).map_err(|e| MeetingError::ConfigurationError {
            message: format!("Invalid social graph URL '{}': {}", base_url, e),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(MeetingError::ConfigurationError {
                message: format!("Social graph URL '{}' cannot take a path", base_url),
            }
            .into());
        }

        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            MeetingError::ConfigurationError {
                message: format!("Failed to build social graph HTTP client: {}", e),
            }
        })?;

        info!("Using social graph service at {}", base_url);

        Ok(Self {
            base_url: parsed,
            client,
        })
    }

    /// The identity is a single percent-encoded path segment
    fn friends_url(&self, identity: &str) -> Result<Url> {
        if identity.is_empty() || identity == "." || identity == ".." {
            return Err(Self::lookup_error(identity, "not a usable path segment"));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Self::lookup_error(identity, "social graph URL cannot take a path"))?
            .pop_if_empty()
            .push("users")
            .push(identity)
            .push("friends");
        Ok(url)
    }

    fn lookup_error(identity: &str, reason: impl std::fmt::Display) -> anyhow::Error {
        MeetingError::FriendLookupFailure {
            identity: identity.to_string(),
            reason: reason.to_string(),
        }
        .into()
    }
}

#[async_trait]
impl SocialGraph for HttpSocialGraph {
    async fn friends_of(&self, identity: &str) -> Result<HashSet<Identity>> {
        let response = self
            .client
            .get(self.friends_url(identity)?)
            .send()
            .await
            .map_err(|e| Self::lookup_error(identity, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("Social graph has no record of '{}'", identity);
                Ok(HashSet::new())
            }
            status if status.is_success() => {
                let friends: Vec<Identity> = response
                    .json()
                    .await
                    .map_err(|e| Self::lookup_error(identity, e))?;
                Ok(friends.into_iter().collect())
            }
            status => Err(Self::lookup_error(
                identity,
                format!("social graph returned {}", status),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_graph_is_symmetric() {
        let graph = StaticSocialGraph::with_friendships([("alice", "xena")]);

        assert!(graph.friends_of("alice").await.unwrap().contains("xena"));
        assert!(graph.friends_of("xena").await.unwrap().contains("alice"));
        assert!(graph.friends_of("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_static_graph_updates() {
        let graph = StaticSocialGraph::new();
        graph.add_friendship("a", "b").unwrap();
        assert_eq!(graph.friends_of("b").await.unwrap().len(), 1);

        graph.remove_friendship("b", "a").unwrap();
        assert!(graph.friends_of("a").await.unwrap().is_empty());
        assert!(graph.friends_of("b").await.unwrap().is_empty());
    }

    #[test]
    fn test_http_friends_url() {
        let graph =
            HttpSocialGraph::new("http://social.local/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            graph.friends_url("alice").unwrap().as_str(),
            "http://social.local/api/users/alice/friends"
        );
    }

    #[test]
    fn test_http_friends_url_encodes_identity() {
        let graph = HttpSocialGraph::new("http://social.local/api", Duration::from_secs(1)).unwrap();

        assert_eq!(
            graph.friends_url("bob/../alice").unwrap().as_str(),
            "http://social.local/api/users/bob%2F..%2Falice/friends"
        );
        assert_eq!(
            graph.friends_url("a b?c#d").unwrap().as_str(),
            "http://social.local/api/users/a%20b%3Fc%23d/friends"
        );

        let error = graph.friends_url("..").unwrap_err();
        assert!(matches!(
            MeetingError::find(&error),
            Some(MeetingError::FriendLookupFailure { identity, .. }) if identity == ".."
        ));
    }

    #[test]
    fn test_http_graph_rejects_bad_base_url() {
        assert!(HttpSocialGraph::new("not a url", Duration::from_secs(1)).is_err());
        assert!(HttpSocialGraph::new("mailto:social@local", Duration::from_secs(1)).is_err());
    }
}
