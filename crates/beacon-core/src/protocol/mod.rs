//! Wire protocol
//!
//! Every message on the socket is a JSON object carrying a `type` tag plus a
//! flat payload. Both directions are closed unions; an inbound tag the
//! server does not recognize decodes to a distinct, loggable variant rather
//! than falling through silently.

mod channel;
mod client;
mod server;

pub use channel::Channel;
pub use client::ClientMessage;
pub use server::ServerMessage;

use thiserror::Error;

/// Errors raised while decoding a wire message
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON (or not a JSON object)
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The frame carried no `type` tag
    #[error("message has no type tag")]
    MissingType,
}
