//! quizrelay-gateway: the audience-facing node.
//!
//! Receives free-text audience messages, turns them into registrations,
//! team requests and answers, and forwards them to the mediator over the
//! master link. Player records are cached in memory and persisted through
//! a [`store::KvStore`]; replies to the audience go out through an
//! [`outbox::Outbox`].

pub mod command;
pub mod driver;
pub mod error;
pub mod node;
pub mod outbox;
pub mod store;

pub use command::{AudienceCommand, AudienceMessage};
pub use driver::NodeEvent;
pub use error::StoreError;
pub use node::{GatewayNode, PendingTeam};
pub use outbox::{LogOutbox, MemoryOutbox, Notice, Outbox};
pub use store::{KvStore, MemoryStore, Persister};
