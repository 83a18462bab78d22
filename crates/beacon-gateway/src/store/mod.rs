//! Collaborator implementations
//!
//! The process-local notification store and change-signal hub wired by the
//! shipped binary and the tests. A SQL- or broker-backed deployment
//! substitutes its own implementations of the same ports.

mod memory;

pub use memory::MemoryNotificationStore;
