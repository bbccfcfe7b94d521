use crate::context::BrokerContext;
use crate::geo::{Geofence, Location};
use crate::topic::Topic;
use crate::types::{ClientId, Outbound, Payload, Publish, ReasonCode};

use super::MatchingLogic;

pub struct StandaloneLogic {
    scx: BrokerContext,
}

impl StandaloneLogic {
    pub fn new(scx: BrokerContext) -> Self {
        Self { scx }
    }
}

impl MatchingLogic for StandaloneLogic {
    #[inline]
    fn context(&self) -> &BrokerContext {
        &self.scx
    }

    #[inline]
    fn process_connect(&self, client_id: &ClientId, location: Location) -> Vec<Outbound> {
        super::connect(&self.scx, client_id, location)
    }

    #[inline]
    fn process_disconnect(&self, client_id: &ClientId, reason: ReasonCode) -> Vec<Outbound> {
        super::disconnect(&self.scx, client_id, reason)
    }

    #[inline]
    fn process_pingreq(&self, client_id: &ClientId, location: Location) -> Vec<Outbound> {
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

        let mut out = super::deliver(&self.scx, &publish, &location);
        log::debug!("{} publish on {}, delivered: {}", client_id, publish.topic, out.len());
        let reason = if out.is_empty() { ReasonCode::NoMatchingSubscribers } else { ReasonCode::Success };
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::BrokerAreaManager;
    use crate::topic;
    use crate::types::{BrokerInfo, Packet, To};

    fn logic() -> StandaloneLogic {
        let areas = BrokerAreaManager::world(BrokerInfo::new("broker", "localhost", 0));
        StandaloneLogic::new(BrokerContext::new(1, areas))
    }

    fn circle(lat: f64, lon: f64, r: f64) -> Geofence {
        Geofence::circle(Location::new(lat, lon), r).unwrap()
    }

    fn reasons(out: &[Outbound]) -> Vec<(String, Option<ReasonCode>)> {
        out.iter()
            .map(|o| match &o.to {
                To::Client(c) => (c.to_string(), o.payload.reason()),
                To::Broker(b) => (b.id.clone(), o.payload.reason()),
            })
            .collect()
    }

    fn connect(logic: &StandaloneLogic, id: &str, lat: f64, lon: f64) {
        let out = logic.process(Packet::new(id, Payload::Connect { location: Location::new(lat, lon) }));
        assert_eq!(reasons(&out), vec![(id.to_string(), Some(ReasonCode::Success))]);
    }

    #[test]
    fn test_duplicate_connect() {
        let logic = logic();
        connect(&logic, "c1", 10.0, 10.0);
        assert_eq!(logic.context().clients.clients_count(), 1);

        let out = logic.process(Packet::new("c1", Payload::Connect { location: Location::new(10.0, 10.0) }));
        assert_eq!(out, vec![Outbound::client("c1", Payload::disconnect(ReasonCode::ProtocolError))]);
        assert_eq!(logic.context().clients.clients_count(), 0);
    }

    #[test]
    fn test_basic_delivery() {
        let logic = logic();
        connect(&logic, "c1", 10.0, 10.0);

        let out = logic.process(Packet::new(
            "c1",
            Payload::Subscribe { topic: topic!("t").unwrap(), geofence: circle(10.0, 10.0, 0.4) },
        ));
        assert_eq!(out, vec![Outbound::client("c1", Payload::Suback { reason: ReasonCode::GrantedQoS0 })]);

        let publish = Publish::new(topic!("t").unwrap(), circle(10.0, 10.0, 0.4), "hi");
        let out = logic.process(Packet::new("c1", Payload::Publish(publish.clone())));
        assert_eq!(
            out,
            vec![
                Outbound::client("c1", Payload::Publish(publish)),
                Outbound::client("c1", Payload::Puback { reason: ReasonCode::Success }),
            ]
        );
    }

    #[test]
    fn test_no_match() {
        let logic = logic();
        connect(&logic, "sub", 10.0, 10.0);
        connect(&logic, "pub", 20.0, 20.0);
        logic.process(Packet::new(
            "sub",
            Payload::Subscribe { topic: topic!("t").unwrap(), geofence: circle(10.0, 10.0, 0.4) },
        ));

        //the publisher is outside the subscription geofence
        let publish = Publish::new(topic!("t").unwrap(), Geofence::world(), "hi");
        let out = logic.process(Packet::new("pub", Payload::Publish(publish)));
        assert_eq!(out, vec![Outbound::client("pub", Payload::Puback { reason: ReasonCode::NoMatchingSubscribers })]);

        //the subscriber is outside the publication geofence
        connect(&logic, "near", 10.1, 10.1);
        let publish = Publish::new(topic!("t").unwrap(), circle(30.0, 30.0, 1.0), "hi");
        let out = logic.process(Packet::new("near", Payload::Publish(publish)));
        assert_eq!(out, vec![Outbound::client("near", Payload::Puback { reason: ReasonCode::NoMatchingSubscribers })]);
    }

    #[test]
    fn test_wildcard_delivery() {
        let logic = logic();
        for (id, filter) in [("a", "sport/#"), ("b", "sport/+/score"), ("c", "news/#")] {
            connect(&logic, id, 10.0, 10.0);
            logic.process(Packet::new(
                id,
                Payload::Subscribe { topic: topic!(filter).unwrap(), geofence: circle(10.0, 10.0, 1.0) },
            ));
        }

        let publish = Publish::new(topic!("sport/tennis/score").unwrap(), circle(10.0, 10.0, 1.0), "15-0");
        let out = logic.process(Packet::new("c", Payload::Publish(publish)));
        let mut receivers = out
            .iter()
            .filter(|o| matches!(o.payload, Payload::Publish(_)))
            .map(|o| format!("{:?}", o.to))
            .collect::<Vec<_>>();
        receivers.sort();
        assert_eq!(receivers, vec![format!("{:?}", To::Client("a".into())), format!("{:?}", To::Client("b".into()))]);
        assert_eq!(out.last().and_then(|o| o.payload.reason()), Some(ReasonCode::Success));

        let publish = Publish::new(topic!("sport/+").unwrap(), circle(10.0, 10.0, 1.0), "?");
        let out = logic.process(Packet::new("c", Payload::Publish(publish)));
        assert_eq!(out, vec![Outbound::client("c", Payload::Puback { reason: ReasonCode::ProtocolError })]);
    }

    #[test]
    fn test_not_connected() {
        let logic = logic();
        let t = topic!("t").unwrap();
        let cases = vec![
            (
                Payload::Pingreq { location: Location::new(1.0, 1.0) },
                Payload::Pingresp { reason: ReasonCode::NotConnected },
            ),
            (
                Payload::Subscribe { topic: t.clone(), geofence: circle(1.0, 1.0, 1.0) },
                Payload::Suback { reason: ReasonCode::NotConnected },
            ),
            (
                Payload::Unsubscribe { topic: t.clone() },
                Payload::Unsuback { reason: ReasonCode::NoSubscriptionExisted },
            ),
            (
                Payload::Publish(Publish::new(t.clone(), circle(1.0, 1.0, 1.0), "x")),
                Payload::Puback { reason: ReasonCode::NotConnected },
            ),
        ];
        for (inbound, expected) in cases {
            assert_eq!(logic.process(Packet::new("ghost", inbound)), vec![Outbound::client("ghost", expected)]);
        }
        assert!(logic.process(Packet::new("ghost", Payload::disconnect(ReasonCode::NormalDisconnection))).is_empty());
        assert!(logic.process(Packet::new("ghost", Payload::Connack { reason: ReasonCode::Success })).is_empty());
    }

    #[test]
    fn test_ping_unsubscribe_disconnect() {
        let logic = logic();
        connect(&logic, "c1", 10.0, 10.0);
        let t = topic!("t").unwrap();
        logic.process(Packet::new("c1", Payload::Subscribe { topic: t.clone(), geofence: circle(10.0, 10.0, 0.4) }));

        let out = logic.process(Packet::new("c1", Payload::Pingreq { location: Location::new(40.0, 40.0) }));
        assert_eq!(out, vec![Outbound::client("c1", Payload::Pingresp { reason: ReasonCode::LocationUpdated })]);
        assert_eq!(logic.context().clients.get_client_location("c1"), Some(Location::new(40.0, 40.0)));

        //the subscriber moved away from the publication geofence
        let publish = Publish::new(t.clone(), circle(10.0, 10.0, 0.4), "hi");
        connect(&logic, "c2", 10.0, 10.0);
        let out = logic.process(Packet::new("c2", Payload::Publish(publish)));
        assert_eq!(out, vec![Outbound::client("c2", Payload::Puback { reason: ReasonCode::NoMatchingSubscribers })]);

        let out = logic.process(Packet::new("c1", Payload::Unsubscribe { topic: t.clone() }));
        assert_eq!(out, vec![Outbound::client("c1", Payload::Unsuback { reason: ReasonCode::Success })]);
        let out = logic.process(Packet::new("c1", Payload::Unsubscribe { topic: t.clone() }));
        assert_eq!(out, vec![Outbound::client("c1", Payload::Unsuback { reason: ReasonCode::NoSubscriptionExisted })]);

        logic.process(Packet::new("c1", Payload::Subscribe { topic: t.clone(), geofence: circle(10.0, 10.0, 0.4) }));
        assert!(logic.process(Packet::new("c1", Payload::disconnect(ReasonCode::NormalDisconnection))).is_empty());
        assert_eq!(logic.context().clients.clients_count(), 1);
        let node = logic.context().topics.get_children(&t).unwrap();
        assert_eq!(node.raster().subscription_ids_count(), 0);
    }
}
