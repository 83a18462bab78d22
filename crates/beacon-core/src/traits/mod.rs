//! Collaborator ports (traits) - define what the gateway consumes
//!
//! The gateway defines what it needs from the surrounding application
//! (identity lookup, notification store, change signal); the infrastructure
//! layer provides the implementations.

mod collaborators;

pub use collaborators::{
    ChangeSignal, CollabResult, Identity, IdentityProvider, NotificationStore,
};
