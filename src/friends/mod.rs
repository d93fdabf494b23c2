//! Friend lookup for the meeting matcher
//!
//! Friend sets come from an external social graph and are cached per
//! identity. The matcher only ever sees them through `FriendIndex`.

pub mod index;
pub mod provider;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub use index::FriendIndex;
pub use provider::{HttpSocialGraph, SocialGraph, StaticSocialGraph};

#[cfg(test)]
pub use provider::MockSocialGraph;

/// What a matching attempt does when a friend lookup fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendLookupPolicy {
    /// Abort the attempt with `FriendLookupFailure`
    FailClosed,
    /// Treat the participant as having no friends for this attempt
    FailOpen,
}

impl FriendLookupPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FriendLookupPolicy::FailClosed => "fail_closed",
            FriendLookupPolicy::FailOpen => "fail_open",
        }
    }
}

impl FromStr for FriendLookupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "fail_closed" | "closed" => Ok(FriendLookupPolicy::FailClosed),
            "fail_open" | "open" => Ok(FriendLookupPolicy::FailOpen),
            other => Err(format!("Unknown friend lookup policy: {}", other)),
        }
    }
}

impl std::fmt::Display for FriendLookupPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
