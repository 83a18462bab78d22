//! Integration test support for the beacon workspace

pub mod helpers;
