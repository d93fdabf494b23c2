//! Video sessions for matched groups

pub mod coordinator;
pub mod provider;

pub use coordinator::{Session, SessionCoordinator, SessionParticipant, SessionState};
pub use provider::{InMemoryVideoProvider, OpenViduProvider, RemoteSessionHandle, VideoProvider};
