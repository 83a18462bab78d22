//! In-memory notification store with a per-user change signal
//!
//! Mutations (create, mark read, delete, clear) are the API the HTTP
//! handlers call; every one of them bumps the owning user's change marker,
//! which is what the gateway's watch loops observe.

use async_trait::async_trait;
use beacon_core::{
    ChangeSignal, CollabResult, Notification, NotificationKind, NotificationStore, UserId,
};
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::watch;

/// In-memory notification store and change-signal hub
pub struct MemoryNotificationStore {
    /// Per-user notification lists, newest last
    records: RwLock<HashMap<UserId, Vec<Notification>>>,

    /// Next record id
    next_id: AtomicI64,

    /// Per-user change markers
    signals: Mutex<HashMap<UserId, watch::Sender<u64>>>,
}

impl MemoryNotificationStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            signals: Mutex::new(HashMap::new()),
        }
    }

    /// Create a notification for a user
    pub fn create(
        &self,
        user_id: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Notification {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let notification = Notification::new(id, user_id, kind, title, message);

        self.records
            .write()
            .entry(user_id)
            .or_default()
            .push(notification.clone());
        self.bump(user_id);

        tracing::debug!(user_id = %user_id, id = id, "Notification created");

        notification
    }

    /// Mark one notification read; returns whether it existed unread
    pub fn mark_read(&self, user_id: UserId, id: i64) -> bool {
        let changed = {
            let mut records = self.records.write();
            records
                .get_mut(&user_id)
                .and_then(|list| list.iter_mut().find(|n| n.id == id))
                .is_some_and(|n| {
                    if n.read {
                        false
                    } else {
                        n.mark_read();
                        true
                    }
                })
        };

        if changed {
            self.bump(user_id);
        }
        changed
    }

    /// Mark all of a user's notifications read; returns how many changed
    pub fn mark_all_read(&self, user_id: UserId) -> usize {
        let changed = {
            let mut records = self.records.write();
            records.get_mut(&user_id).map_or(0, |list| {
                let mut count = 0;
                for n in list.iter_mut().filter(|n| !n.read) {
                    n.mark_read();
                    count += 1;
                }
                count
            })
        };

        if changed > 0 {
            self.bump(user_id);
        }
        changed
    }

    /// Delete one notification; returns whether it existed
    pub fn delete(&self, user_id: UserId, id: i64) -> bool {
        let removed = {
            let mut records = self.records.write();
            records.get_mut(&user_id).is_some_and(|list| {
                let before = list.len();
                list.retain(|n| n.id != id);
                list.len() != before
            })
        };

        if removed {
            self.bump(user_id);
        }
        removed
    }

    /// Delete all of a user's notifications; returns how many were removed
    pub fn clear(&self, user_id: UserId) -> usize {
        let removed = self
            .records
            .write()
            .remove(&user_id)
            .map_or(0, |list| list.len());

        if removed > 0 {
            self.bump(user_id);
        }
        removed
    }

    fn bump(&self, user_id: UserId) {
        let mut signals = self.signals.lock();
        let sender = signals
            .entry(user_id)
            .or_insert_with(|| watch::channel(0).0);
        sender.send_modify(|marker| *marker += 1);
    }

    fn subscribe(&self, user_id: UserId) -> watch::Receiver<u64> {
        let mut signals = self.signals.lock();
        signals
            .entry(user_id)
            .or_insert_with(|| watch::channel(0).0)
            .subscribe()
    }
}

impl Default for MemoryNotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn list_recent(&self, user_id: UserId, limit: usize) -> CollabResult<Vec<Notification>> {
        let records = self.records.read();
        let list = records.get(&user_id).map(Vec::as_slice).unwrap_or_default();

        // Newest first
        Ok(list.iter().rev().take(limit).cloned().collect())
    }

    async fn count_unread(&self, user_id: UserId) -> CollabResult<u64> {
        let records = self.records.read();
        Ok(records
            .get(&user_id)
            .map_or(0, |list| list.iter().filter(|n| !n.read).count() as u64))
    }
}

impl ChangeSignal for MemoryNotificationStore {
    fn watch(&self, user_id: UserId) -> BoxStream<'static, u64> {
        let rx = self.subscribe(user_id);
        let initial = *rx.borrow();

        // First item is the state present at registration; later items are
        // genuine mutations observed through the watch channel
        futures::stream::once(async move { initial })
            .chain(futures::stream::unfold(rx, |mut rx| async move {
                match rx.changed().await {
                    Ok(()) => {
                        let marker = *rx.borrow_and_update();
                        Some((marker, rx))
                    }
                    Err(_) => None,
                }
            }))
            .boxed()
    }
}

impl std::fmt::Debug for MemoryNotificationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryNotificationStore")
            .field("users", &self.records.read().len())
            .finish()
    }
}
