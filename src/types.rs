//! Common types used throughout the meeting matcher

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a participant (user name or id)
pub type Identity = String;

/// Unique identifier for meeting sessions
pub type SessionId = Uuid;

/// Unique identifier for a single matching attempt
pub type AttemptId = Uuid;

/// Which waiting pool a participant queues in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Both pools, in the order matching iterates them
    pub const ALL: [Gender; 2] = [Gender::Male, Gender::Female];

    /// Lower-case label used for store keys and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gender::Male => write!(f, "MALE"),
            Gender::Female => write!(f, "FEMALE"),
        }
    }
}

impl std::str::FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MALE" => Ok(Gender::Male),
            "FEMALE" => Ok(Gender::Female),
            other => Err(format!("Unknown gender: {}", other)),
        }
    }
}

/// Opaque reference to a participant's client connection.
///
/// The matcher never interprets it; it is stored so the surrounding
/// application can later address the right client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionHandle(pub String);

impl ConnectionHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A participant waiting in one of the queues
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub identity: Identity,
    pub connection_handle: ConnectionHandle,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(identity: impl Into<Identity>, connection_handle: ConnectionHandle) -> Self {
        Self {
            identity: identity.into(),
            connection_handle,
            joined_at: Utc::now(),
        }
    }
}

/// Immutable copy of both queues taken for one matching attempt
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    pub males: Vec<Participant>,
    pub females: Vec<Participant>,
}

impl QueueSnapshot {
    pub fn side(&self, gender: Gender) -> &[Participant] {
        match gender {
            Gender::Male => &self.males,
            Gender::Female => &self.females,
        }
    }
}

/// Two groups of `K` participants each, found compatible by the matcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub males: Vec<Participant>,
    pub females: Vec<Participant>,
}

impl MatchResult {
    pub fn male_identities(&self) -> Vec<Identity> {
        self.males.iter().map(|p| p.identity.clone()).collect()
    }

    pub fn female_identities(&self) -> Vec<Identity> {
        self.females.iter().map(|p| p.identity.clone()).collect()
    }

    /// All matched participants paired with their pool
    pub fn members(&self) -> impl Iterator<Item = (Gender, &Participant)> {
        self.males
            .iter()
            .map(|p| (Gender::Male, p))
            .chain(self.females.iter().map(|p| (Gender::Female, p)))
    }
}

/// Where a participant stands after joining
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuePosition {
    pub gender: Gender,
    /// Zero-based position, `None` once the participant has been matched
    pub position: Option<usize>,
    pub queue_length: usize,
}

/// Session created for a successful match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedSession {
    pub session_id: SessionId,
    pub males: Vec<Participant>,
    pub females: Vec<Participant>,
}

/// Outcome of a `join_queue` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinOutcome {
    pub queue: QueuePosition,
    pub session: Option<MatchedSession>,
}

/// Event emitted when a matched group has been placed into a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReady {
    pub session_id: SessionId,
    pub males: Vec<Participant>,
    pub females: Vec<Participant>,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a session has been closed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClosed {
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
}

/// Union type for all outbound events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MeetingEvent {
    SessionReady(SessionReady),
    SessionClosed(SessionClosed),
}
