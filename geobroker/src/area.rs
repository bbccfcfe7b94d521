//! Broker areas: which broker is responsible for which part of the globe.
//!
//! The area list is loaded once at startup and never changes afterwards. Areas are expected to
//! be disjoint and to cover every location; this is not verified. When areas overlap the first
//! matching peer in configuration order wins, and a location outside every area has no peer.

use geobroker_conf::AreaConf;

use crate::geo::{GeoError, Geofence, Location};
use crate::types::{BrokerId, BrokerInfo};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AreaError {
    #[error("broker `{0}` has no entry in the broker area list")]
    MissingLocalBroker(BrokerId),
    #[error("broker `{0}` appears more than once in the broker area list")]
    DuplicateBroker(BrokerId),
    #[error("invalid boundary of broker `{0}`, {1}")]
    InvalidBoundary(BrokerId, GeoError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerArea {
    pub info: BrokerInfo,
    pub area: Geofence,
}

impl BrokerArea {
    #[inline]
    pub fn new(info: BrokerInfo, area: Geofence) -> Self {
        Self { info, area }
    }

    #[inline]
    pub fn contains(&self, loc: &Location) -> bool {
        self.area.contains(loc)
    }

    #[inline]
    pub fn intersects(&self, geofence: &Geofence) -> bool {
        self.area.intersects(geofence)
    }
}

impl TryFrom<&AreaConf> for BrokerArea {
    type Error = AreaError;

    fn try_from(conf: &AreaConf) -> Result<Self, Self::Error> {
        let area = Geofence::from_wkt(&conf.boundary).map_err(|e| AreaError::InvalidBoundary(conf.id.clone(), e))?;
        Ok(Self { info: BrokerInfo::new(conf.id.as_str(), conf.address.as_str(), conf.port), area })
    }
}

#[derive(Debug, Clone)]
pub struct BrokerAreaManager {
    local: BrokerArea,
    peers: Vec<BrokerArea>,
}

impl BrokerAreaManager {
    pub fn new(local: BrokerArea, peers: Vec<BrokerArea>) -> Self {
        Self { local, peers }
    }

    /// A single broker responsible for the whole globe.
    pub fn world(info: BrokerInfo) -> Self {
        Self::new(BrokerArea::new(info, Geofence::world()), Vec::new())
    }

    /// Builds the manager for broker `broker_id` from the configured area list, keeping its order.
    pub fn from_conf(broker_id: &str, areas: &[AreaConf]) -> Result<Self, AreaError> {
        let mut local = None;
        let mut peers = Vec::with_capacity(areas.len());
        for conf in areas {
            if (conf.id == broker_id && local.is_some()) || peers.iter().any(|p: &BrokerArea| p.info.id == conf.id) {
                return Err(AreaError::DuplicateBroker(conf.id.clone()));
            }
            let area = BrokerArea::try_from(conf)?;
            if conf.id == broker_id {
                local = Some(area);
            } else {
                peers.push(area);
            }
        }
        let local = local.ok_or_else(|| AreaError::MissingLocalBroker(broker_id.into()))?;
        Ok(Self::new(local, peers))
    }

    #[inline]
    pub fn local(&self) -> &BrokerArea {
        &self.local
    }

    #[inline]
    pub fn local_info(&self) -> &BrokerInfo {
        &self.local.info
    }

    #[inline]
    pub fn peers(&self) -> &[BrokerArea] {
        &self.peers
    }

    #[inline]
    pub fn is_responsible_for(&self, loc: &Location) -> bool {
        self.local.contains(loc)
    }

    /// The first peer whose area contains `loc`.
    pub fn peer_for(&self, loc: &Location) -> Option<&BrokerInfo> {
        self.peers.iter().find(|p| p.contains(loc)).map(|p| &p.info)
    }

    pub fn peers_intersecting(&self, geofence: &Geofence) -> Vec<&BrokerInfo> {
        self.peers.iter().filter(|p| p.intersects(geofence)).map(|p| &p.info).collect()
    }

    #[inline]
    pub fn local_area_intersects(&self, geofence: &Geofence) -> bool {
        self.local.intersects(geofence)
    }

    pub fn peer_by_id(&self, broker_id: &str) -> Option<&BrokerInfo> {
        self.peers.iter().find(|p| p.info.id == broker_id).map(|p| &p.info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf(id: &str, port: u16, boundary: &str) -> AreaConf {
        AreaConf { id: id.into(), address: "localhost".into(), port, boundary: boundary.into() }
    }

    fn areas() -> Vec<AreaConf> {
        vec![
            conf("a", 5559, "POLYGON((0 0, 20 0, 20 20, 0 20, 0 0))"),
            conf("b", 5560, "POLYGON((20 0, 40 0, 40 40, 20 40, 20 0))"),
            conf("c", 5561, "POLYGON((0 20, 20 20, 20 40, 0 40, 0 20))"),
        ]
    }

    #[test]
    fn test_from_conf() {
        let manager = BrokerAreaManager::from_conf("a", &areas()).unwrap();
        assert_eq!(manager.local_info().id, "a");
        assert_eq!(manager.peers().len(), 2);
        assert_eq!(manager.peers()[0].info, BrokerInfo::new("b", "localhost", 5560));
        assert_eq!(manager.peer_by_id("c").map(|p| p.port), Some(5561));
        assert_eq!(manager.peer_by_id("a"), None);

        assert_eq!(
            BrokerAreaManager::from_conf("z", &areas()).unwrap_err(),
            AreaError::MissingLocalBroker("z".into())
        );

        let mut dup = areas();
        dup.push(conf("b", 1, "POLYGON((0 0, 1 0, 1 1, 0 0))"));
        assert_eq!(BrokerAreaManager::from_conf("a", &dup).unwrap_err(), AreaError::DuplicateBroker("b".into()));

        let bad = vec![conf("a", 1, "POINT(1 1)")];
        assert!(matches!(BrokerAreaManager::from_conf("a", &bad), Err(AreaError::InvalidBoundary(_, _))));
    }

    #[test]
    fn test_responsibility() {
        let manager = BrokerAreaManager::from_conf("a", &areas()).unwrap();
        assert!(manager.is_responsible_for(&Location::new(10.0, 10.0)));
        assert!(!manager.is_responsible_for(&Location::new(30.0, 30.0)));

        assert_eq!(manager.peer_for(&Location::new(30.0, 30.0)).map(|p| p.id.as_str()), Some("b"));
        assert_eq!(manager.peer_for(&Location::new(30.0, 10.0)).map(|p| p.id.as_str()), Some("c"));
        assert_eq!(manager.peer_for(&Location::new(-10.0, -10.0)), None);
    }

    #[test]
    fn test_intersections() {
        let manager = BrokerAreaManager::from_conf("a", &areas()).unwrap();
        let fence = Geofence::circle(Location::new(30.0, 30.0), 1.0).unwrap();
        assert!(!manager.local_area_intersects(&fence));
        assert_eq!(manager.peers_intersecting(&fence).iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), vec!["b"]);

        //lat 20, lon 20 is a corner of all three areas
        let fence = Geofence::circle(Location::new(20.0, 20.0), 1.0).unwrap();
        assert!(manager.local_area_intersects(&fence));
        assert_eq!(manager.peers_intersecting(&fence).len(), 2);
    }

    #[test]
    fn test_world() {
        let manager = BrokerAreaManager::world(BrokerInfo::new("broker", "localhost", 0));
        assert!(manager.is_responsible_for(&Location::new(-89.0, 179.0)));
        assert!(manager.peers_intersecting(&Geofence::world()).is_empty());
        assert!(manager.peer_for(&Location::new(0.0, 0.0)).is_none());
    }
}
