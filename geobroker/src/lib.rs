#![deny(unsafe_code)]

//! # Geo-aware publish/subscribe broker core
//!
//! Clients publish topic-tagged messages bounded by a geofence. A subscriber receives a message
//! when its subscription matches the topic, it is located inside the message geofence, and the
//! publisher is located inside the subscription geofence.
//!
//! ```rust
//! use geobroker::area::BrokerAreaManager;
//! use geobroker::context::BrokerContext;
//! use geobroker::geo::{Geofence, Location};
//! use geobroker::logic::{MatchingLogic, StandaloneLogic};
//! use geobroker::types::{BrokerInfo, Packet, Payload, Publish, ReasonCode};
//!
//! let scx = BrokerContext::new(1, BrokerAreaManager::world(BrokerInfo::new("broker", "localhost", 0)));
//! let logic = StandaloneLogic::new(scx);
//! let here = Location::new(10.0, 10.0);
//! let fence = Geofence::circle(here, 0.4).unwrap();
//!
//! logic.process(Packet::new("c1", Payload::Connect { location: here }));
//! logic.process(Packet::new("c1", Payload::Subscribe { topic: "t".parse().unwrap(), geofence: fence.clone() }));
//! let out = logic.process(Packet::new("c1", Payload::Publish(Publish::new("t".parse().unwrap(), fence, "hi"))));
//! assert_eq!(out.last().and_then(|o| o.payload.reason()), Some(ReasonCode::Success));
//! ```

pub use geobroker_conf as conf;
pub use geobroker_utils as utils;

pub mod area; // Broker areas and responsibility
pub mod client; // Connected clients and their subscriptions
pub mod context; // Shared broker state
pub mod geo; // Locations and geofences
pub mod logger;
pub mod logic; // Protocol state machine, standalone and geo-distributed
pub mod raster; // Spatial grid index
pub mod topic;
pub mod trie; // Topic tree
pub mod types;
pub mod worker; // Worker pool

pub type Result<T> = anyhow::Result<T>;
