use quizrelay_core::{MatcherError, ProtocolError};
use quizrelay_link::LinkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("host configuration rejected: {0}")]
    Config(#[from] MatcherError),

    #[error(transparent)]
    Link(#[from] LinkError),
}
