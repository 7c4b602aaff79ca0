//! Error types for the link layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("cannot reach {url}: {reason}")]
    Connection { url: String, reason: String },

    #[error("peer connection closed")]
    Closed,

    #[error("handshake with {peer} failed: {reason}")]
    Handshake { peer: String, reason: String },

    #[error("frame codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
