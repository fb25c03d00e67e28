use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use uuid::Uuid;

use crate::events::parcel::ParcelEvent;
use crate::services::view::ParcelView;

pub const SUBSCRIBER_CHANNEL_CAPACITY: usize = 32;

pub type SubscriberId = Uuid;

/// Told about every committed parcel change. Must not block.
pub trait ParcelNotifier: Send + Sync {
    fn parcel_updated(&self, view: &ParcelView);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl ParcelNotifier for NoopNotifier {
    fn parcel_updated(&self, _: &ParcelView) {}
}

#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<ParcelEvent>,
}

#[derive(Debug, Default)]
struct Registry {
    subscribers: HashMap<SubscriberId, mpsc::Sender<ParcelEvent>>,
    rooms: HashMap<Uuid, HashSet<SubscriberId>>,
}

impl Registry {
    fn remove_subscriber(&mut self, subscriber: SubscriberId) {
        self.subscribers.remove(&subscriber);
        self.rooms.retain(|_, members| {
            members.remove(&subscriber);
            !members.is_empty()
        });
    }
}

/// Fan-out of parcel updates to the subscribers of each parcel's room.
#[derive(Debug, Clone, Default)]
pub struct ParcelBroadcaster {
    registry: Arc<RwLock<Registry>>,
}

impl ParcelBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let id = Uuid::new_v4();
        self.write().subscribers.insert(id, sender);
        debug!(subscriber = %id, "Subscriber registered");
        Subscription { id, receiver }
    }

    /// Returns `false` if the subscriber is not registered. Joining twice is a no-op.
    pub fn join(&self, parcel_id: Uuid, subscriber: SubscriberId) -> bool {
        let mut registry = self.write();
        if !registry.subscribers.contains_key(&subscriber) {
            return false;
        }
        registry.rooms.entry(parcel_id).or_default().insert(subscriber);
        true
    }

    pub fn leave(&self, parcel_id: Uuid, subscriber: SubscriberId) {
        let mut registry = self.write();
        if let Some(members) = registry.rooms.get_mut(&parcel_id) {
            members.remove(&subscriber);
            if members.is_empty() {
                registry.rooms.remove(&parcel_id);
            }
        }
    }

    pub fn disconnect(&self, subscriber: SubscriberId) {
        self.write().remove_subscriber(subscriber);
        debug!(subscriber = %subscriber, "Subscriber disconnected");
    }

    /// Push `view` to every member of its room. Returns how many channels accepted it.
    pub fn publish(&self, view: &ParcelView) -> usize {
        let event = ParcelEvent::ParcelUpdated {
            data: Arc::new(view.clone()),
        };
        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let registry = self.read();
            let Some(members) = registry.rooms.get(&view.id) else {
                return 0;
            };
            for subscriber in members {
                let Some(sender) = registry.subscribers.get(subscriber) else {
                    continue;
                };
                match sender.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        debug!(subscriber = %subscriber, parcel_id = %view.id, "Subscriber lagging, update dropped");
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*subscriber),
                }
            }
        }
        if !closed.is_empty() {
            let mut registry = self.write();
            for subscriber in closed {
                registry.remove_subscriber(subscriber);
            }
        }
        delivered
    }

    pub fn room_size(&self, parcel_id: Uuid) -> usize {
        self.read().rooms.get(&parcel_id).map_or(0, HashSet::len)
    }

    pub fn subscriber_count(&self) -> usize {
        self.read().subscribers.len()
    }
}

impl ParcelNotifier for ParcelBroadcaster {
    fn parcel_updated(&self, view: &ParcelView) {
        let delivered = self.publish(view);
        debug!(parcel_id = %view.id, delivered, "Parcel update published");
    }
}
