//! Protocol state machine
//!
//! A [`MatchingLogic`] turns one inbound [`Packet`] into the packets that have to be sent in
//! response, to clients and to peer brokers. Processing never blocks and never fails: protocol
//! errors are answered with a reason code.
//!
//! Two strategies exist:
//! - [`StandaloneLogic`]: a single broker serving the whole globe.
//! - [`GeoDistributedLogic`]: one broker of a federation. Clients are only accepted while they
//!   are located inside the local broker area, and publications are forwarded to every peer
//!   whose area intersects the publication geofence; matching happens at the subscriber's broker.

use std::sync::Arc;

use geobroker_conf::Strategy;

use crate::context::BrokerContext;
use crate::geo::{Geofence, Location};
use crate::topic::Topic;
use crate::types::{ClientId, Outbound, Packet, Payload, Publish, ReasonCode};

mod distributed;
mod standalone;

pub use distributed::GeoDistributedLogic;
pub use standalone::StandaloneLogic;

pub trait MatchingLogic: Sync + Send {
    fn context(&self) -> &BrokerContext;

    fn process_connect(&self, client_id: &ClientId, location: Location) -> Vec<Outbound>;

    fn process_disconnect(&self, client_id: &ClientId, reason: ReasonCode) -> Vec<Outbound>;

    fn process_pingreq(&self, client_id: &ClientId, location: Location) -> Vec<Outbound>;

    fn process_subscribe(&self, client_id: &ClientId, topic: Topic, geofence: Geofence) -> Vec<Outbound>;

    fn process_unsubscribe(&self, client_id: &ClientId, topic: Topic) -> Vec<Outbound>;

    fn process_publish(&self, client_id: &ClientId, publish: Publish) -> Vec<Outbound>;

    /// `broker_id` is the forwarding peer, `publisher_location` the location of the client that
    /// published at that peer.
    fn process_broker_forward_publish(
        &self,
        broker_id: &ClientId,
        publish: Publish,
        publisher_location: Location,
    ) -> Vec<Outbound>;

    fn process(&self, packet: Packet) -> Vec<Outbound> {
        let Packet { sender, payload } = packet;
        match payload {
            Payload::Connect { location } => self.process_connect(&sender, location),
            Payload::Disconnect { reason, .. } => self.process_disconnect(&sender, reason),
            Payload::Pingreq { location } => self.process_pingreq(&sender, location),
            Payload::Subscribe { topic, geofence } => self.process_subscribe(&sender, topic, geofence),
            Payload::Unsubscribe { topic } => self.process_unsubscribe(&sender, topic),
            Payload::Publish(publish) => self.process_publish(&sender, publish),
            Payload::BrokerForwardPublish { publish, publisher_location } => {
                self.process_broker_forward_publish(&sender, publish, publisher_location)
            }
            payload @ (Payload::Connack { .. }
            | Payload::Pingresp { .. }
            | Payload::Suback { .. }
            | Payload::Unsuback { .. }
            | Payload::Puback { .. }) => {
                log::warn!("{} unexpected inbound packet {}, dropped", sender, payload.kind());
                Vec::new()
            }
        }
    }
}

pub fn new_logic(strategy: Strategy, scx: BrokerContext) -> Arc<dyn MatchingLogic> {
    match strategy {
        Strategy::Standalone => Arc::new(StandaloneLogic::new(scx)),
        Strategy::GeoDistributed => Arc::new(GeoDistributedLogic::new(scx)),
    }
}

//Steps shared by both strategies.

fn connect(scx: &BrokerContext, client_id: &ClientId, location: Location) -> Vec<Outbound> {
    if scx.clients.add_client(client_id, location) {
        log::debug!("{} connected at {}", client_id, location);
        vec![Outbound::client(client_id.clone(), Payload::Connack { reason: ReasonCode::Success })]
    } else {
        log::info!("{} is already connected, protocol error", client_id);
        scx.remove_client(client_id);
        vec![Outbound::client(client_id.clone(), Payload::disconnect(ReasonCode::ProtocolError))]
    }
}

fn disconnect(scx: &BrokerContext, client_id: &ClientId, reason: ReasonCode) -> Vec<Outbound> {
    if scx.remove_client(client_id) {
        log::debug!("{} disconnected, reason: {:?}", client_id, reason);
    } else {
        log::debug!("{} is not connected, disconnect ignored", client_id);
    }
    Vec::new()
}

fn pingreq(scx: &BrokerContext, client_id: &ClientId, location: Location) -> Vec<Outbound> {
    let reason = if scx.clients.update_client_location(client_id, location) {
        ReasonCode::LocationUpdated
    } else {
        ReasonCode::NotConnected
    };
    vec![Outbound::client(client_id.clone(), Payload::Pingresp { reason })]
}

fn subscribe(scx: &BrokerContext, client_id: &ClientId, topic: Topic, geofence: Geofence) -> Vec<Outbound> {
    let reason = match scx.subscribe(client_id, &topic, geofence) {
        Some(id) => {
            log::debug!("{} subscribed to {}, subscription id: {}", client_id, topic, id);
            ReasonCode::GrantedQoS0
        }
        None => ReasonCode::NotConnected,
    };
    vec![Outbound::client(client_id.clone(), Payload::Suback { reason })]
}

fn unsubscribe(scx: &BrokerContext, client_id: &ClientId, topic: Topic) -> Vec<Outbound> {
    let reason =
        if scx.unsubscribe(client_id, &topic) { ReasonCode::Success } else { ReasonCode::NoSubscriptionExisted };
    vec![Outbound::client(client_id.clone(), Payload::Unsuback { reason })]
}

/// One PUBLISH per matching subscriber.
fn deliver(scx: &BrokerContext, publish: &Publish, publisher: &Location) -> Vec<Outbound> {
    scx.matching_subscribers(publish, publisher)
        .into_iter()
        .map(|client_id| Outbound::client(client_id, Payload::Publish(publish.clone())))
        .collect()
}

fn forward_publish_ack(
    scx: &BrokerContext,
    broker_id: &ClientId,
    publish: Publish,
    publisher_location: Location,
) -> Vec<Outbound> {
    let mut out = deliver(scx, &publish, &publisher_location);
    let reason = if out.is_empty() { ReasonCode::NoMatchingSubscribers } else { ReasonCode::Success };
    log::debug!("forwarded publish on {} from broker {}, delivered: {}", publish.topic, broker_id, out.len());
    match scx.areas.peer_by_id(broker_id) {
        Some(peer) => out.push(Outbound::broker(peer.clone(), Payload::Puback { reason })),
        None => log::warn!("forwarded publish from unknown broker {}, acknowledgement dropped", broker_id),
    }
    out
}
