//! quizrelay-core: domain types and pure state machines shared by the
//! mediator and the audience gateway.
//!
//! Nothing in this crate performs IO. Keyword matching, the round state
//! machine, the player/team registry and the wire payload shapes all live
//! here so both processes agree on them.

pub mod error;
pub mod matcher;
pub mod protocol;
pub mod registry;
pub mod round;
pub mod types;

pub use error::{MatcherError, ProtocolError, RegistryError};
pub use matcher::Matcher;
pub use registry::{Registration, Registry, TeamChoice};
pub use round::{RoundPhase, RoundState};
