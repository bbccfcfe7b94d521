use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::geo::{Geofence, Location};
use crate::topic::Topic;

pub use geobroker_utils::{DashMap, DashSet, HashMap, HashSet, TimestampMillis};

pub type ClientId = bytestring::ByteString;
pub type BrokerId = String;
pub type Content = String;

pub type Tx = mpsc::UnboundedSender<Outbound>;
pub type Rx = mpsc::UnboundedReceiver<Outbound>;

/// Identifies one subscription of one client.
///
/// `seq` grows monotonically per client and is never handed out twice while the client stays
/// connected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId {
    pub client_id: ClientId,
    pub seq: u64,
}

impl SubscriptionId {
    #[inline]
    pub fn new(client_id: ClientId, seq: u64) -> Self {
        Self { client_id, seq }
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.client_id, self.seq)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrokerInfo {
    pub id: BrokerId,
    pub address: String,
    pub port: u16,
}

impl BrokerInfo {
    pub fn new<I: Into<BrokerId>, A: Into<String>>(id: I, address: A, port: u16) -> Self {
        Self { id: id.into(), address: address.into(), port }
    }
}

impl fmt::Display for BrokerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.address, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasonCode {
    Success,
    NormalDisconnection,
    GrantedQoS0,
    NoMatchingSubscribers,
    NoMatchingSubscribersButForwarded,
    NoSubscriptionExisted,
    LocationUpdated,
    ProtocolError,
    NotConnected,
    WrongBroker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publish {
    pub topic: Topic,
    pub geofence: Geofence,
    pub content: Content,
}

impl Publish {
    pub fn new(topic: Topic, geofence: Geofence, content: impl Into<Content>) -> Self {
        Self { topic, geofence, content: content.into() }
    }
}

/// Control packet payload, keyed by packet kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Payload {
    Connect {
        location: Location,
    },
    Connack {
        reason: ReasonCode,
    },
    Disconnect {
        reason: ReasonCode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        broker: Option<BrokerInfo>,
    },
    Pingreq {
        location: Location,
    },
    Pingresp {
        reason: ReasonCode,
    },
    Subscribe {
        topic: Topic,
        geofence: Geofence,
    },
    Suback {
        reason: ReasonCode,
    },
    Unsubscribe {
        topic: Topic,
    },
    Unsuback {
        reason: ReasonCode,
    },
    Publish(Publish),
    Puback {
        reason: ReasonCode,
    },
    /// A publication handed over by the broker whose client published it.
    BrokerForwardPublish {
        publish: Publish,
        publisher_location: Location,
    },
}

impl Payload {
    #[inline]
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Connect { .. } => "CONNECT",
            Payload::Connack { .. } => "CONNACK",
            Payload::Disconnect { .. } => "DISCONNECT",
            Payload::Pingreq { .. } => "PINGREQ",
            Payload::Pingresp { .. } => "PINGRESP",
            Payload::Subscribe { .. } => "SUBSCRIBE",
            Payload::Suback { .. } => "SUBACK",
            Payload::Unsubscribe { .. } => "UNSUBSCRIBE",
            Payload::Unsuback { .. } => "UNSUBACK",
            Payload::Publish(_) => "PUBLISH",
            Payload::Puback { .. } => "PUBACK",
            Payload::BrokerForwardPublish { .. } => "BROKER_FORWARD_PUBLISH",
        }
    }

    #[inline]
    pub fn disconnect(reason: ReasonCode) -> Self {
        Payload::Disconnect { reason, broker: None }
    }

    /// The reason code carried by an acknowledgement or disconnect, if any.
    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            Payload::Connack { reason }
            | Payload::Disconnect { reason, .. }
            | Payload::Pingresp { reason }
            | Payload::Suback { reason }
            | Payload::Unsuback { reason }
            | Payload::Puback { reason } => Some(*reason),
            _ => None,
        }
    }
}

/// An inbound packet as decoded by the transport.
///
/// For `BrokerForwardPublish` the sender is the id of the forwarding broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub sender: ClientId,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Packet {
    #[inline]
    pub fn new<C: Into<ClientId>>(sender: C, payload: Payload) -> Self {
        Self { sender: sender.into(), payload }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum To {
    Client(ClientId),
    Broker(BrokerInfo),
}

/// A packet produced by the matching logic, addressed to a client or a peer broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outbound {
    pub to: To,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Outbound {
    #[inline]
    pub fn client<C: Into<ClientId>>(id: C, payload: Payload) -> Self {
        Self { to: To::Client(id.into()), payload }
    }

    #[inline]
    pub fn broker(info: BrokerInfo, payload: Payload) -> Self {
        Self { to: To::Broker(info), payload }
    }
}
