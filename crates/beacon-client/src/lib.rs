//! # beacon-client
//!
//! Client side of the realtime gateway: a reconnection controller that
//! performs the auth handshake, keeps the connection warm, and resumes
//! exactly where it left off after a drop, plus a reference-counted channel
//! multiplexer letting several feature areas share one socket.

pub mod channels;
pub mod config;
pub mod controller;

pub use channels::{ChannelMultiplexer, ChannelSubscription};
pub use config::{ClientConfig, Credential};
pub use controller::{ClientStatus, RealtimeClient};
