//! quizrelay-relay: the mediator between the quiz host and the audience
//! gateway.
//!
//! [`Relay`] holds the whole mediator context (registry, round state and
//! one [`quizrelay_link::Link`] per side) and is only ever touched by the
//! event loop in [`driver`]. Socket tasks talk to the loop through
//! [`RelayEvent`]s.

pub mod driver;
pub mod error;
pub mod event;
pub mod relay;

pub use error::RelayError;
pub use event::{RelayEvent, Side};
pub use relay::{PendingHandshake, Relay};
