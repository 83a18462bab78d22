//! In-memory connection registry
//!
//! All maps and the total counter live under one lock, so the quota
//! invariants hold across every interleaving of open, close, eviction, and
//! sweep. Fan-out reads clone `Arc`s out of the lock and send outside it.

use super::{Connection, ConnectionDirectory, RegisterError, RegisterOutcome};
use beacon_common::{LimitsConfig, LivenessConfig};
use beacon_core::{ConnectionId, UserId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Default)]
struct RegistryInner {
    /// User id to that user's connections
    users: HashMap<UserId, HashMap<ConnectionId, Arc<Connection>>>,

    /// Connection id to owning user, for O(1) lookup
    index: HashMap<ConnectionId, UserId>,

    /// Always equals the sum of the inner map sizes
    total: usize,
}

/// Registry of all live connections
///
/// Constructed once and passed by reference to every component that needs
/// it. `start()` launches the liveness sweep; `shutdown()` stops it and
/// closes every connection.
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
    limits: LimitsConfig,
    liveness: LivenessConfig,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionRegistry {
    /// Create a new registry
    #[must_use]
    pub fn new(limits: LimitsConfig, liveness: LivenessConfig) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            limits,
            liveness,
            sweeper: Mutex::new(None),
        }
    }

    /// Create a new registry wrapped in Arc
    #[must_use]
    pub fn new_shared(limits: LimitsConfig, liveness: LivenessConfig) -> Arc<Self> {
        Arc::new(Self::new(limits, liveness))
    }

    /// Whether the global cap leaves no room for another connection
    pub fn at_capacity(&self) -> bool {
        self.total_count() >= self.limits.max_total_connections
    }

    /// Configured limits
    pub fn limits(&self) -> LimitsConfig {
        self.limits
    }

    /// Start the periodic liveness sweep
    ///
    /// A defensive second layer behind the per-connection heartbeat: it
    /// force-closes connections idle past the ceiling or whose socket task
    /// is already gone.
    pub fn start(self: &Arc<Self>) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            tracing::warn!("Liveness sweep is already running");
            return;
        }

        let registry = Arc::clone(self);
        let period = Duration::from_secs(self.liveness.sweep_interval_secs);

        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                registry.sweep_once();
            }
        }));

        tracing::info!(
            period_secs = self.liveness.sweep_interval_secs,
            "Liveness sweep started"
        );
    }

    /// Stop the sweep and close every connection
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }

        let connections = self.snapshot();
        let count = connections.len();

        for conn in connections {
            conn.close();
            self.unregister(conn.user_id(), conn.id());
        }

        tracing::info!(closed = count, "Registry shut down");
    }

    /// One pass of the liveness sweep
    ///
    /// Returns the number of connections force-closed.
    pub fn sweep_once(&self) -> usize {
        let idle_ceiling = Duration::from_secs(self.liveness.idle_timeout_secs);
        let mut reaped = 0;

        for conn in self.snapshot() {
            let stale = conn.idle_for() > idle_ceiling;
            let gone = conn.is_closed();

            if stale || gone {
                tracing::info!(
                    connection_id = %conn.id(),
                    user_id = %conn.user_id(),
                    stale = stale,
                    "Sweep closing connection"
                );
                conn.close();
                self.unregister(conn.user_id(), conn.id());
                reaped += 1;
            }
        }

        if reaped > 0 {
            tracing::info!(reaped = reaped, remaining = self.total_count(), "Sweep pass done");
        }

        reaped
    }
}

impl ConnectionDirectory for ConnectionRegistry {
    fn register(&self, connection: Arc<Connection>) -> Result<RegisterOutcome, RegisterError> {
        let evicted = {
            let mut inner = self.inner.write();

            if inner.total >= self.limits.max_total_connections {
                return Err(RegisterError::AtCapacity(self.limits.max_total_connections));
            }

            let user_id = connection.user_id();
            let user_conns = inner.users.entry(user_id).or_default();

            // Per-user cap: free one slot by evicting the oldest first
            let evicted = if user_conns.len() >= self.limits.max_connections_per_user {
                let oldest = user_conns
                    .values()
                    .min_by_key(|c| (c.connected_at(), c.id().into_inner()))
                    .map(|c| c.id());

                oldest.and_then(|id| user_conns.remove(&id))
            } else {
                None
            };

            user_conns.insert(connection.id(), Arc::clone(&connection));
            inner.index.insert(connection.id(), user_id);
            if let Some(old) = &evicted {
                inner.index.remove(&old.id());
            } else {
                inner.total += 1;
            }

            evicted
        };

        if let Some(old) = &evicted {
            tracing::info!(
                user_id = %old.user_id(),
                evicted = %old.id(),
                admitted = %connection.id(),
                "Per-user cap reached, evicted oldest connection"
            );
            old.close();
        }

        tracing::debug!(
            connection_id = %connection.id(),
            user_id = %connection.user_id(),
            total = self.total_count(),
            "Connection registered"
        );

        Ok(RegisterOutcome { evicted })
    }

    fn unregister(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        let mut inner = self.inner.write();

        let Some(user_conns) = inner.users.get_mut(&user_id) else {
            return false;
        };

        if user_conns.remove(&connection_id).is_none() {
            return false;
        }

        // Drop the outer entry the instant it becomes empty
        if user_conns.is_empty() {
            inner.users.remove(&user_id);
        }

        inner.index.remove(&connection_id);
        inner.total -= 1;

        tracing::debug!(
            connection_id = %connection_id,
            user_id = %user_id,
            total = inner.total,
            "Connection unregistered"
        );

        true
    }

    fn get(&self, connection_id: ConnectionId) -> Option<Arc<Connection>> {
        let inner = self.inner.read();
        let user_id = inner.index.get(&connection_id)?;
        inner
            .users
            .get(user_id)
            .and_then(|conns| conns.get(&connection_id))
            .cloned()
    }

    fn connections_for_user(&self, user_id: UserId) -> Vec<Arc<Connection>> {
        self.inner
            .read()
            .users
            .get(&user_id)
            .map(|conns| conns.values().cloned().collect())
            .unwrap_or_default()
    }

    fn count_for(&self, user_id: UserId) -> usize {
        self.inner
            .read()
            .users
            .get(&user_id)
            .map_or(0, HashMap::len)
    }

    fn total_count(&self) -> usize {
        self.inner.read().total
    }

    fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.inner
            .read()
            .users
            .values()
            .flat_map(|conns| conns.values().cloned())
            .collect()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ConnectionRegistry")
            .field("total", &inner.total)
            .field("users", &inner.users.len())
            .finish()
    }
}
