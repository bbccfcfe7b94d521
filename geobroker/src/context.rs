use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use geobroker_conf::{Settings, Strategy};

use crate::area::BrokerAreaManager;
use crate::client::ClientDirectory;
use crate::geo::{Geofence, Location};
use crate::topic::Topic;
use crate::trie::TopicTree;
use crate::types::{BrokerInfo, ClientId, HashSet, Publish, SubscriptionId};
use crate::Result;

/// Shared state of one broker, handed to every worker.
#[derive(Clone)]
pub struct BrokerContext {
    inner: Arc<BrokerContextInner>,
}

pub struct BrokerContextInner {
    pub clients: ClientDirectory,
    pub topics: TopicTree,
    pub areas: BrokerAreaManager,
}

impl Deref for BrokerContext {
    type Target = BrokerContextInner;
    #[inline]
    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl BrokerContext {
    pub fn new(granularity: u32, areas: BrokerAreaManager) -> Self {
        BrokerContext {
            inner: Arc::new(BrokerContextInner {
                clients: ClientDirectory::new(),
                topics: TopicTree::new(granularity),
                areas,
            }),
        }
    }

    /// Builds the context from settings.
    ///
    /// A geo-distributed broker needs its own entry in the area list. A standalone broker without
    /// configured areas is responsible for the whole globe.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let broker = &settings.broker;
        let areas = if broker.strategy == Strategy::Standalone && settings.areas.is_empty() {
            BrokerAreaManager::world(BrokerInfo::new(broker.id.as_str(), "localhost", 0))
        } else {
            BrokerAreaManager::from_conf(&broker.id, &settings.areas)?
        };
        Ok(Self::new(broker.granularity, areas))
    }

    #[inline]
    pub fn broker_info(&self) -> &BrokerInfo {
        self.areas.local_info()
    }

    /// Removes the client together with the raster entries of all its subscriptions.
    pub fn remove_client(&self, id: &str) -> bool {
        match self.clients.take_client(id) {
            Some(subs) => {
                for sub in subs {
                    if let Some(node) = self.topics.get_children(&sub.topic) {
                        node.raster().remove(&sub.id, &sub.geofence);
                    }
                }
                true
            }
            None => false,
        }
    }

    /// Creates or replaces a subscription and moves its raster membership to the new geofence.
    ///
    /// Returns `None` if the client is not connected.
    pub fn subscribe(&self, id: &ClientId, topic: &Topic, geofence: Geofence) -> Option<SubscriptionId> {
        let old = self.clients.check_if_subscribed(id, topic);
        let sub_id = self.clients.put_subscription(id, topic, geofence.clone())?;
        let node = self.topics.get_or_create_children(topic);
        if let Some((old_id, old_geofence)) = old {
            node.raster().remove(&old_id, &old_geofence);
        }
        node.raster().put(&sub_id, &geofence);
        Some(sub_id)
    }

    /// Returns `false` if there was no such subscription.
    pub fn unsubscribe(&self, id: &str, topic: &Topic) -> bool {
        match self.clients.remove_subscription(id, topic) {
            Some(sub) => {
                if let Some(node) = self.topics.get_children(topic) {
                    node.raster().remove(&sub.id, &sub.geofence);
                }
                true
            }
            None => false,
        }
    }

    /// Clients that must receive `publish`, sent by a client located at `publisher`.
    ///
    /// Raster hits are re-checked exactly in both directions: the subscriber has to be inside the
    /// publication geofence, and the publisher inside the subscription geofence. Every client is
    /// returned once, however many of its subscriptions match.
    pub fn matching_subscribers(&self, publish: &Publish, publisher: &Location) -> Vec<ClientId> {
        let mut receivers = HashSet::default();
        let mut out = Vec::new();
        for node in self.topics.matching_nodes(&publish.topic) {
            for sub_id in node.raster().lookup(publisher) {
                if receivers.contains(&sub_id.client_id) {
                    continue;
                }
                let client = match self.clients.get(&sub_id.client_id) {
                    Some(c) => c,
                    None => continue,
                };
                let sub = match client.subscription(node.filter()) {
                    Some(s) if s.id == sub_id => s,
                    _ => continue,
                };
                if publish.geofence.contains(&client.location()) && sub.geofence.contains(publisher) {
                    receivers.insert(sub_id.client_id.clone());
                    out.push(sub_id.client_id);
                }
            }
        }
        out
    }
}

impl fmt::Debug for BrokerContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "BrokerContext {{ broker: {}, clients: {}, topic nodes: {} }}",
            self.broker_info(),
            self.clients.clients_count(),
            self.topics.nodes_size()
        )
    }
}
