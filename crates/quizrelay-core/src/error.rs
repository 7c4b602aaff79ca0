//! Error types for the domain layer.

use thiserror::Error;

use crate::types::{PlayerId, RoundId};

#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("keyword pattern failed to compile: {0}")]
    Pattern(#[from] regex::Error),
}

/// Failures reported by [`crate::Registry`].
///
/// `RoundNotAcceptingSubmissions` and `DuplicateSubmission` are policy
/// no-ops: callers log them and move on without telling the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("name {name:?} is already taken by another player")]
    NameConflict { name: String },

    #[error("unknown player {0}")]
    PlayerNotFound(PlayerId),

    #[error("no team matches {0:?}")]
    TeamNotFound(String),

    #[error("round {0} is not accepting submissions")]
    RoundNotAcceptingSubmissions(RoundId),

    #[error("player {player} already answered round {round}")]
    DuplicateSubmission { player: PlayerId, round: RoundId },
}

impl RegistryError {
    /// True for the outcomes that are dropped silently by policy.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            Self::RoundNotAcceptingSubmissions(_) | Self::DuplicateSubmission { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed {event} payload: {source}")]
    Malformed {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{event} payload is missing required field `{field}`")]
    MissingField { event: String, field: &'static str },

    #[error("unknown event {0:?}")]
    UnknownEvent(String),
}
