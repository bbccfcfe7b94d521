use crate::context::BrokerContext;
use crate::geo::{Geofence, Location};
use crate::topic::Topic;
use crate::types::{ClientId, Outbound, Payload, Publish, ReasonCode};

use super::MatchingLogic;

/// Geo-distributed matching at the subscriber's broker.
///
/// A client is served by the broker whose area contains its location. Publications are matched
/// locally when the local area intersects the publication geofence and are forwarded to every
/// peer whose area intersects it.
pub struct GeoDistributedLogic {
    scx: BrokerContext,
}

impl GeoDistributedLogic {
    pub fn new(scx: BrokerContext) -> Self {
        Self { scx }
    }

    fn wrong_broker(&self, client_id: &ClientId, location: &Location) -> Outbound {
        let broker = self.scx.areas.peer_for(location).cloned();
        match &broker {
            Some(peer) => log::debug!("{} at {} belongs to broker {}", client_id, location, peer),
            None => log::warn!("{} at {} is outside every broker area", client_id, location),
        }
        Outbound::client(client_id.clone(), Payload::Disconnect { reason: ReasonCode::WrongBroker, broker })
    }
}

impl MatchingLogic for GeoDistributedLogic {
    #[inline]
    fn context(&self) -> &BrokerContext {
        &self.scx
    }

    fn process_connect(&self, client_id: &ClientId, location: Location) -> Vec<Outbound> {
        if !self.scx.areas.is_responsible_for(&location) {
            return vec![self.wrong_broker(client_id, &location)];
        }
        super::connect(&self.scx, client_id, location)
    }

    #[inline]
    fn process_disconnect(&self, client_id: &ClientId, reason: ReasonCode) -> Vec<Outbound> {
        super::disconnect(&self.scx, client_id, reason)
    }

    fn process_pingreq(&self, client_id: &ClientId, location: Location) -> Vec<Outbound> {
        if !self.scx.areas.is_responsible_for(&location) {
            if self.scx.remove_client(client_id) {
                log::info!("{} left the broker area, evicted", client_id);
            }
            return vec![self.wrong_broker(client_id, &location)];
        }
        super::pingreq(&self.scx, client_id, location)
    }

    #[inline]
    fn process_subscribe(&self, client_id: &ClientId, topic: Topic, geofence: Geofence) -> Vec<Outbound> {
        super::subscribe(&self.scx, client_id, topic, geofence)
    }

    #[inline]
    fn process_unsubscribe(&self, client_id: &ClientId, topic: Topic) -> Vec<Outbound> {
        super::unsubscribe(&self.scx, client_id, topic)
    }

    fn process_publish(&self, client_id: &ClientId, publish: Publish) -> Vec<Outbound> {
        let location = match self.scx.clients.get_client_location(client_id) {
            Some(loc) => loc,
            None => {
                return vec![Outbound::client(client_id.clone(), Payload::Puback { reason: ReasonCode::NotConnected })]
            }
        };
        if !publish.topic.is_name() {
            log::info!("{} publish to topic filter {}, protocol error", client_id, publish.topic);
            return vec![Outbound::client(client_id.clone(), Payload::Puback { reason: ReasonCode::ProtocolError })];
        }

        let mut out = if self.scx.areas.local_area_intersects(&publish.geofence) {
            super::deliver(&self.scx, &publish, &location)
        } else {
            Vec::new()
        };
        let delivered = out.len();

        let peers = self.scx.areas.peers_intersecting(&publish.geofence);
        let forwarded = peers.len();
        out.extend(peers.into_iter().map(|peer| {
            Outbound::broker(
                peer.clone(),
                Payload::BrokerForwardPublish { publish: publish.clone(), publisher_location: location },
            )
        }));
        log::debug!("{} publish on {}, delivered: {}, forwarded: {}", client_id, publish.topic, delivered, forwarded);

        let reason = if delivered > 0 {
            ReasonCode::Success
        } else if forwarded > 0 {
            ReasonCode::NoMatchingSubscribersButForwarded
        } else {
            ReasonCode::NoMatchingSubscribers
        };
        out.push(Outbound::client(client_id.clone(), Payload::Puback { reason }));
        out
    }

    fn process_broker_forward_publish(
        &self,
        broker_id: &ClientId,
        publish: Publish,
        publisher_location: Location,
    ) -> Vec<Outbound> {
        super::forward_publish_ack(&self.scx, broker_id, publish, publisher_location)
    }
}
