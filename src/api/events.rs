//! Subscription hub: list-changed fan-out to every live connection
//!
//! Each connection holds a [`Subscription`] with its own bounded queue.
//! Broadcasting never waits: a channel that is full or closed is dropped
//! from the registry on the spot, and its stream ends so the client can
//! reconnect. Broadcasts iterate a snapshot of the registry, so concurrent
//! subscribe/unsubscribe calls never disturb delivery.

use crate::mcp::protocol::JsonRpcNotification;
use crate::namespace::mutation_affects_prompts;
use crate::types::Mutation;
use crate::workspace::MutationObserver;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::Stream;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Method of the prompts list-changed notification
pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";

/// Method of the resources list-changed notification
pub const RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";

/// Push events sent to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notification {
    PromptsListChanged,
    ResourcesListChanged,
}

impl Notification {
    /// JSON-RPC method name
    pub fn method(&self) -> &'static str {
        match self {
            Notification::PromptsListChanged => PROMPTS_LIST_CHANGED,
            Notification::ResourcesListChanged => RESOURCES_LIST_CHANGED,
        }
    }

    /// Wire form: a JSON-RPC notification with empty params
    pub fn to_json_rpc(&self) -> JsonRpcNotification {
        JsonRpcNotification::new(self.method())
    }

    /// Notifications for one mutation, in delivery order
    ///
    /// Every mutation changes the resource view; core and agent paths also
    /// change the prompt view, which is announced first.
    pub fn for_mutation(mutation: &Mutation) -> Vec<Notification> {
        if mutation_affects_prompts(mutation) {
            vec![Notification::PromptsListChanged, Notification::ResourcesListChanged]
        } else {
            vec![Notification::ResourcesListChanged]
        }
    }
}

/// Opaque handle of a registered channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(Uuid);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

struct HubInner {
    channels: RwLock<HashMap<ChannelId, mpsc::Sender<Notification>>>,
    /// Serializes broadcasts so each channel sees events in generation order
    delivery: Mutex<()>,
    capacity: usize,
}

/// Registry of live notification channels
#[derive(Clone)]
pub struct SubscriptionHub {
    inner: Arc<HubInner>,
}

impl fmt::Debug for SubscriptionHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHub")
            .field("subscribers", &self.subscriber_count())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

impl SubscriptionHub {
    /// Create a hub whose channels buffer up to `capacity` notifications
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                channels: RwLock::new(HashMap::new()),
                delivery: Mutex::new(()),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Register a new channel
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = ChannelId(Uuid::new_v4());
        let count = {
            let mut channels = self.inner.channels.write();
            channels.insert(id, tx);
            channels.len()
        };
        info!("Notification channel {} connected. clients={}", id, count);

        Subscription {
            id,
            rx,
            hub: self.clone(),
        }
    }

    /// Remove a channel; its stream ends once drained
    pub fn unsubscribe(&self, id: ChannelId) -> bool {
        let (removed, count) = {
            let mut channels = self.inner.channels.write();
            let removed = channels.remove(&id).is_some();
            (removed, channels.len())
        };
        if removed {
            info!("Notification channel {} disconnected. clients={}", id, count);
        }
        removed
    }

    /// Number of registered channels
    pub fn subscriber_count(&self) -> usize {
        self.inner.channels.read().len()
    }

    /// Deliver notifications to every channel, returning how many channels
    /// received all of them
    pub fn broadcast(&self, notifications: &[Notification]) -> usize {
        let _order = self.inner.delivery.lock();
        let snapshot: Vec<(ChannelId, mpsc::Sender<Notification>)> = self
            .inner
            .channels
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        debug!(
            "Broadcast {:?} to {} clients",
            notifications.iter().map(Notification::method).collect::<Vec<_>>(),
            snapshot.len()
        );

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, tx) in snapshot {
            let result = notifications.iter().try_for_each(|n| tx.try_send(*n));
            match result {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Notification channel {} is not keeping up, dropping it", id);
                    failed.push(id);
                }
                Err(TrySendError::Closed(_)) => failed.push(id),
            }
        }

        for id in failed {
            self.unsubscribe(id);
        }
        delivered
    }

    /// Translate a workspace mutation into list-changed notifications
    pub fn on_mutation(&self, mutation: &Mutation) -> usize {
        self.broadcast(&Notification::for_mutation(mutation))
    }
}

impl MutationObserver for SubscriptionHub {
    fn on_mutation(&self, mutation: &Mutation) {
        SubscriptionHub::on_mutation(self, mutation);
    }
}

/// One live notification channel
///
/// Dropping it unsubscribes. Also usable as a [`Stream`].
pub struct Subscription {
    id: ChannelId,
    rx: mpsc::Receiver<Notification>,
    hub: SubscriptionHub,
}

impl Subscription {
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Next notification; `None` once the hub dropped this channel
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }

    /// Next notification if one is already queued
    pub fn try_recv(&mut self) -> Option<Notification> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Notification;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}
