//! Fixed-granularity grid index from geofences to subscription ids.
//!
//! The raster divides the globe into cells of `1 / granularity` degrees. A geofence is stored in
//! every cell touched by its bounding box, so a lookup is a cheap pre-filter: the ids returned
//! for a point are the ones whose bounding box covers the point's cell, and callers that need
//! exact containment must re-check against the geofence itself.

use std::fmt;

use geobroker_utils::Counter;

use crate::geo::{BoundingBox, Geofence, Location};
use crate::types::{ClientId, DashMap, HashMap, HashSet, SubscriptionId};

/// Integer index of one raster cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    pub lat: i32,
    pub lon: i32,
}

type Bucket = HashMap<ClientId, HashSet<u64>>;

pub struct SpatialRaster {
    granularity: u32,
    buckets: DashMap<Cell, Bucket>,
    ids: Counter,
}

impl SpatialRaster {
    /// `granularity` is the number of cells per degree; zero is treated as one.
    pub fn new(granularity: u32) -> Self {
        Self { granularity: granularity.max(1), buckets: DashMap::default(), ids: Counter::new() }
    }

    #[inline]
    pub fn granularity(&self) -> u32 {
        self.granularity
    }

    #[inline]
    fn index(&self, deg: f64) -> i32 {
        (deg * self.granularity as f64).floor() as i32
    }

    /// The cell a location falls into.
    #[inline]
    pub fn cell_of(&self, loc: &Location) -> Cell {
        Cell { lat: self.index(loc.lat), lon: self.index(loc.lon) }
    }

    /// South-west corner of a cell, its canonical location.
    #[inline]
    pub fn cell_origin(&self, cell: &Cell) -> Location {
        let g = self.granularity as f64;
        Location::new(cell.lat as f64 / g, cell.lon as f64 / g)
    }

    /// Every cell covered by the bounding box.
    pub fn cells_for(&self, bbox: &BoundingBox) -> impl Iterator<Item = Cell> {
        let (lat_min, lat_max) = (self.index(bbox.min_lat), self.index(bbox.max_lat));
        let (lon_min, lon_max) = (self.index(bbox.min_lon), self.index(bbox.max_lon));
        (lat_min..=lat_max).flat_map(move |lat| (lon_min..=lon_max).map(move |lon| Cell { lat, lon }))
    }

    pub fn put(&self, id: &SubscriptionId, geofence: &Geofence) {
        for cell in self.cells_for(geofence.bounding_box()) {
            let added = self.buckets.entry(cell).or_default().entry(id.client_id.clone()).or_default().insert(id.seq);
            if added {
                self.ids.inc();
            }
        }
    }

    /// Removes `id` from the cells `geofence` was stored under. Emptied buckets stay allocated.
    pub fn remove(&self, id: &SubscriptionId, geofence: &Geofence) {
        for cell in self.cells_for(geofence.bounding_box()) {
            if let Some(mut bucket) = self.buckets.get_mut(&cell) {
                let mut emptied = false;
                if let Some(seqs) = bucket.get_mut(&id.client_id) {
                    if seqs.remove(&id.seq) {
                        self.ids.dec();
                    }
                    emptied = seqs.is_empty();
                }
                if emptied {
                    bucket.remove(&id.client_id);
                }
            }
        }
    }

    /// Ids stored in the cell of `loc`.
    pub fn lookup(&self, loc: &Location) -> Vec<SubscriptionId> {
        self.buckets
            .get(&self.cell_of(loc))
            .map(|bucket| {
                bucket
                    .iter()
                    .flat_map(|(client_id, seqs)| seqs.iter().map(|seq| SubscriptionId::new(client_id.clone(), *seq)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of (cell, id) memberships currently stored.
    #[inline]
    pub fn subscription_ids_count(&self) -> isize {
        self.ids.count()
    }

    #[inline]
    pub fn buckets_count(&self) -> usize {
        self.buckets.len()
    }
}

impl fmt::Debug for SpatialRaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SpatialRaster {{ granularity: {}, buckets: {}, ids: {:?} }}",
            self.granularity,
            self.buckets.len(),
            self.ids
        )
    }
}
