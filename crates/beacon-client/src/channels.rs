//! Client half of the channel multiplexer
//!
//! N independent callers subscribing to the same channel hold one
//! process-level reference count: the wire-level subscribe goes out only on
//! the 0→1 transition, the unsubscribe only on 1→0. Membership survives a
//! drop; the controller re-issues every channel with a nonzero count when
//! the connection comes back.

use beacon_core::{Channel, ClientMessage, ServerMessage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Reference-counted channel subscriptions over one socket
pub struct ChannelMultiplexer {
    /// Per-channel subscriber handles
    subscribers: Mutex<HashMap<Channel, HashMap<u64, mpsc::UnboundedSender<ServerMessage>>>>,

    /// Next subscriber id
    next_id: AtomicU64,

    /// Wire commands for the controller to forward
    outbound: mpsc::UnboundedSender<ClientMessage>,

    /// Whether the socket is currently usable; wire traffic is suppressed
    /// while it is not (reconnect re-issues the memberships instead)
    connected: AtomicBool,
}

impl ChannelMultiplexer {
    /// Create a multiplexer; the receiver half feeds the controller
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ClientMessage>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let mux = Arc::new(Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            outbound,
            connected: AtomicBool::new(false),
        });
        (mux, rx)
    }

    /// Subscribe to a channel
    ///
    /// Dropping the returned handle (or calling its `unsubscribe`) releases
    /// the reference; the wire-level unsubscribe fires when the last local
    /// subscriber is gone.
    pub fn subscribe(self: &Arc<Self>, channel: Channel) -> ChannelSubscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();

        let first = {
            let mut subscribers = self.subscribers.lock();
            let entry = subscribers.entry(channel).or_default();
            let first = entry.is_empty();
            entry.insert(id, tx);
            first
        };

        if first {
            tracing::debug!(channel = %channel, "First local subscriber, subscribing on the wire");
            self.send_wire(ClientMessage::Subscribe(channel));
        }

        ChannelSubscription {
            channel,
            id,
            mux: Arc::clone(self),
            receiver: rx,
        }
    }

    /// Channels with at least one local subscriber
    pub fn active_channels(&self) -> Vec<Channel> {
        self.subscribers
            .lock()
            .iter()
            .filter(|(_, subs)| !subs.is_empty())
            .map(|(channel, _)| *channel)
            .collect()
    }

    /// Deliver a server message to the local subscribers of its channel
    ///
    /// Returns whether the message belonged to a channel at all.
    pub fn route(&self, message: &ServerMessage) -> bool {
        let Some(channel) = channel_of(message) else {
            return false;
        };

        let subscribers = self.subscribers.lock();
        if let Some(entry) = subscribers.get(&channel) {
            for tx in entry.values() {
                let _ = tx.send(message.clone());
            }
        }
        true
    }

    /// Mark the socket usable or not
    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn send_wire(&self, message: ClientMessage) {
        if self.connected.load(Ordering::SeqCst) {
            let _ = self.outbound.send(message);
        }
        // Not connected: membership is already recorded, and the controller
        // re-issues it during the reconnect handshake
    }

    fn release(&self, channel: Channel, id: u64) {
        let last = {
            let mut subscribers = self.subscribers.lock();
            let Some(entry) = subscribers.get_mut(&channel) else {
                return;
            };
            entry.remove(&id);
            let last = entry.is_empty();
            if last {
                subscribers.remove(&channel);
            }
            last
        };

        if last {
            tracing::debug!(channel = %channel, "Last local subscriber gone, unsubscribing on the wire");
            self.send_wire(ClientMessage::Unsubscribe(channel));
        }
    }
}

impl std::fmt::Debug for ChannelMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelMultiplexer")
            .field("channels", &self.subscribers.lock().len())
            .finish()
    }
}

/// Which channel a server message belongs to, if any
fn channel_of(message: &ServerMessage) -> Option<Channel> {
    match message {
        ServerMessage::JobsSubscribed | ServerMessage::JobUpdate { .. } => Some(Channel::Jobs),
        ServerMessage::StatsSubscribed | ServerMessage::JobStatsUpdate { .. } => {
            Some(Channel::Stats)
        }
        _ => None,
    }
}

/// One local subscription to a channel
pub struct ChannelSubscription {
    channel: Channel,
    id: u64,
    mux: Arc<ChannelMultiplexer>,
    receiver: mpsc::UnboundedReceiver<ServerMessage>,
}

impl ChannelSubscription {
    /// The subscribed channel
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Receive the next message routed to this channel
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.receiver.recv().await
    }

    /// Release the subscription explicitly (dropping does the same)
    pub fn unsubscribe(self) {}
}

impl Drop for ChannelSubscription {
    fn drop(&mut self) {
        self.mux.release(self.channel, self.id);
    }
}
