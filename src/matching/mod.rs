//! Group matching for the meeting matcher
//!
//! A matching attempt turns a queue snapshot into a compatibility graph and
//! searches it for two friend-free groups of `K`. Attempts run on the match
//! worker so the combinatorial search never blocks joins or leaves.

pub mod combinations;
pub mod graph;
pub mod matcher;
pub mod worker;

// Re-export commonly used types
pub use combinations::Combinations;
pub use graph::CompatibilityGraph;
pub use matcher::{FirstValidMatcher, GroupMatcher};
pub use worker::{
    DispatchSlot, MatchRequest, MatchResponse, MatchWorker, MatchWorkerHandle, PendingMatch,
};
