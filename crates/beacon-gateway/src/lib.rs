//! # beacon-gateway
//!
//! WebSocket gateway pushing notification and background-job events to
//! logged-in clients, independent of the page-request cycle.

pub mod handlers;
pub mod notifier;
pub mod registry;
pub mod server;
pub mod store;

pub use server::{create_app, create_gateway_state, run, GatewayState};
