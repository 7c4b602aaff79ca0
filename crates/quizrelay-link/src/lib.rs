//! quizrelay-link: reconnect-safe peer links.
//!
//! A [`Link`] is the owner-side view of one remote peer. It buffers
//! outbound messages in an [`OfflineQueue`] while the peer is unreachable or
//! mid-handshake and replays them in order once the peer is live again.
//! The socket itself is driven by a connection task (see [`transport`])
//! that talks to the owner through [`PeerHandle`] and [`Inbound`].

pub mod backoff;
pub mod error;
pub mod frame;
pub mod link;
pub mod offline_queue;
pub mod peer;
pub mod transport;

pub use backoff::Backoff;
pub use error::LinkError;
pub use frame::Frame;
pub use link::{Link, LinkState};
pub use offline_queue::{DrainStep, OfflineQueue, QueueEntry};
pub use peer::{Inbound, Outbound, Outgoing, PeerHandle, Responder};
pub use transport::PeerConnection;
