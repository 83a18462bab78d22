//! Gateway state
//!
//! Shared dependencies for the gateway server: the registry plus the three
//! injected collaborator ports. Constructed once and cloned into every
//! handler; no module-level singletons.

use crate::registry::{ConnectionDirectory, ConnectionRegistry};
use beacon_common::AppConfig;
use beacon_core::{ChangeSignal, IdentityProvider, NotificationStore};
use std::sync::Arc;

/// Gateway application state
#[derive(Clone)]
pub struct GatewayState {
    /// Connection registry
    registry: Arc<ConnectionRegistry>,
    /// Identity lookup collaborator
    identity: Arc<dyn IdentityProvider>,
    /// Notification record store collaborator
    store: Arc<dyn NotificationStore>,
    /// Per-user change signal collaborator
    signal: Arc<dyn ChangeSignal>,
    /// Application configuration
    config: Arc<AppConfig>,
}

impl GatewayState {
    /// Create a new gateway state
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn NotificationStore>,
        signal: Arc<dyn ChangeSignal>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            registry,
            identity,
            store,
            signal,
            config,
        }
    }

    /// Get the connection registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get the registry as the directory port
    pub fn directory(&self) -> Arc<dyn ConnectionDirectory> {
        let directory: Arc<dyn ConnectionDirectory> = self.registry.clone();
        directory
    }

    /// Get the identity provider
    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.identity
    }

    /// Get the notification store
    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    /// Get the change signal
    pub fn signal(&self) -> &Arc<dyn ChangeSignal> {
        &self.signal
    }

    /// Get the application configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("registry", &self.registry)
            .finish()
    }
}
