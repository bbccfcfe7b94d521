use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;

use geobroker_utils::{format_timestamp_millis, timestamp_millis};

use crate::geo::{Geofence, Location};
use crate::topic::Topic;
use crate::types::{ClientId, DashMap, SubscriptionId, TimestampMillis};

#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub topic: Topic,
    pub geofence: Geofence,
}

/// A connected client.
pub struct Client {
    id: ClientId,
    location: RwLock<Location>,
    heartbeat: AtomicI64,
    next_seq: AtomicU64,
    subscriptions: DashMap<Topic, Subscription>,
}

impl Client {
    fn new(id: ClientId, location: Location) -> Self {
        Self {
            id,
            location: RwLock::new(location),
            heartbeat: AtomicI64::new(timestamp_millis()),
            next_seq: AtomicU64::new(0),
            subscriptions: DashMap::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    #[inline]
    pub fn location(&self) -> Location {
        *self.location.read()
    }

    #[inline]
    pub fn heartbeat(&self) -> TimestampMillis {
        self.heartbeat.load(Ordering::SeqCst)
    }

    fn update_location(&self, location: Location) {
        *self.location.write() = location;
        self.heartbeat.store(timestamp_millis(), Ordering::SeqCst);
    }

    fn put_subscription(&self, topic: &Topic, geofence: Geofence) -> SubscriptionId {
        match self.subscriptions.entry(topic.clone()) {
            Entry::Occupied(mut o) => {
                let sub = o.get_mut();
                sub.geofence = geofence;
                sub.id.clone()
            }
            Entry::Vacant(v) => {
                let id = SubscriptionId::new(self.id.clone(), self.next_seq.fetch_add(1, Ordering::SeqCst));
                v.insert(Subscription { id: id.clone(), topic: topic.clone(), geofence });
                id
            }
        }
    }

    #[inline]
    pub fn subscription(&self, topic: &Topic) -> Option<Subscription> {
        self.subscriptions.get(topic).map(|s| s.value().clone())
    }

    #[inline]
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.iter().map(|s| s.value().clone()).collect()
    }

    #[inline]
    pub fn subscriptions_count(&self) -> usize {
        self.subscriptions.len()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Client {{ id: {}, location: {}, heartbeat: {}, subscriptions: {} }}",
            self.id,
            self.location(),
            format_timestamp_millis(self.heartbeat()),
            self.subscriptions.len()
        )
    }
}

/// Registry of the clients connected to this broker.
///
/// Every operation is safe to call concurrently. Operations on one client id are expected to be
/// serialized by the caller, which the dispatcher does by pinning each client to a worker.
#[derive(Default)]
pub struct ClientDirectory {
    clients: DashMap<ClientId, Arc<Client>>,
}

impl ClientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<Arc<Client>> {
        self.clients.get(id).map(|c| c.value().clone())
    }

    /// Returns `false` if a client with this id is already connected.
    pub fn add_client(&self, id: &ClientId, location: Location) -> bool {
        match self.clients.entry(id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(Arc::new(Client::new(id.clone(), location)));
                true
            }
        }
    }

    #[inline]
    pub fn remove_client(&self, id: &str) -> bool {
        self.take_client(id).is_some()
    }

    /// Removes the client and hands back its subscriptions.
    pub fn take_client(&self, id: &str) -> Option<Vec<Subscription>> {
        self.clients.remove(id).map(|(_, c)| {
            let subs = c.subscriptions();
            c.subscriptions.clear();
            subs
        })
    }

    pub fn update_client_location(&self, id: &str, location: Location) -> bool {
        match self.get(id) {
            Some(c) => {
                c.update_location(location);
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn get_client_location(&self, id: &str) -> Option<Location> {
        self.get(id).map(|c| c.location())
    }

    /// The id and geofence of the client's current subscription to `topic`.
    pub fn check_if_subscribed(&self, id: &str, topic: &Topic) -> Option<(SubscriptionId, Geofence)> {
        self.get(id).and_then(|c| c.subscription(topic)).map(|s| (s.id, s.geofence))
    }

    #[inline]
    pub fn get_subscription_geofence(&self, id: &str, topic: &Topic) -> Option<Geofence> {
        self.get(id).and_then(|c| c.subscription(topic)).map(|s| s.geofence)
    }

    /// Creates or replaces the client's subscription to `topic`.
    ///
    /// A replaced subscription keeps its id. Returns `None` if the client is not connected.
    pub fn put_subscription(&self, id: &str, topic: &Topic, geofence: Geofence) -> Option<SubscriptionId> {
        self.get(id).map(|c| c.put_subscription(topic, geofence))
    }

    pub fn remove_subscription(&self, id: &str, topic: &Topic) -> Option<Subscription> {
        self.get(id).and_then(|c| c.subscriptions.remove(topic)).map(|(_, s)| s)
    }

    #[inline]
    pub fn clients_count(&self) -> usize {
        self.clients.len()
    }

    #[inline]
    pub fn subscriptions_count(&self) -> usize {
        self.clients.iter().map(|c| c.value().subscriptions_count()).sum()
    }
}

impl fmt::Debug for ClientDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientDirectory {{ clients: {} }}", self.clients.len())
    }
}
