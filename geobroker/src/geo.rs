//! Location and geofence primitives
//!
//! Coordinates are degrees. Rectangles and polygons are mirrored as `geo` polygons with `x = lon`
//! and `y = lat` and tested in that plane. Circles are spherical caps: everything about them is
//! decided with great-circle distances, against the edges of the other shape when needed.
//!
//! All shapes are bounded by `[-90, 90] x [-180, 180]`; nothing wraps around the antimeridian.

use std::fmt;
use std::str::FromStr;

use geo::{Contains, Coord, Intersects, LineString, Point, Polygon};
use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6_371.0;

//Sampling step along an edge, in degrees, before refining the best sample.
const EDGE_STEP_DEG: f64 = 0.25;
const REFINE_ITERATIONS: usize = 48;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum GeoError {
    #[error("invalid location, lat: {0}, lon: {1}")]
    InvalidLocation(f64, f64),
    #[error("invalid circle radius {0}, expected (0, 180] degrees")]
    InvalidRadius(f64),
    #[error("invalid rectangle, south west corner must lie below and left of north east corner")]
    InvalidRectangle,
    #[error("a polygon needs at least 3 distinct points, got {0}")]
    TooFewPoints(usize),
    #[error("wkt parse error, {0}")]
    Wkt(String),
    #[error("unsupported geometry `{0}`, only POLYGON is supported")]
    UnsupportedGeometry(String),
}

/// A latitude/longitude point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    #[inline]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Like [`Location::new`], but rejects coordinates outside `[-90, 90] x [-180, 180]`.
    #[inline]
    pub fn try_new(lat: f64, lon: f64) -> Result<Self, GeoError> {
        let loc = Self::new(lat, lon);
        if loc.is_valid() {
            Ok(loc)
        } else {
            Err(GeoError::InvalidLocation(lat, lon))
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Great-circle distance in kilometers (haversine).
    pub fn distance_km(&self, other: &Location) -> f64 {
        EARTH_RADIUS_KM * self.central_angle(other)
    }

    /// Great-circle distance expressed as an angle in degrees.
    #[inline]
    pub fn distance_deg(&self, other: &Location) -> f64 {
        self.central_angle(other).to_degrees()
    }

    fn central_angle(&self, other: &Location) -> f64 {
        let lat1_rad = self.lat.to_radians();
        let lat2_rad = other.lat.to_radians();
        let delta_lat = (other.lat - self.lat).to_radians();
        let delta_lon = (other.lon - self.lon).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2) + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
        2.0 * a.sqrt().atan2((1.0 - a).sqrt())
    }

    #[inline]
    fn coord(&self) -> Coord<f64> {
        Coord { x: self.lon, y: self.lat }
    }

    #[inline]
    fn point(&self) -> Point<f64> {
        Point::from(self.coord())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lat, self.lon)
    }
}

/// Axis-aligned bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    #[inline]
    pub fn south_west(&self) -> Location {
        Location::new(self.min_lat, self.min_lon)
    }

    #[inline]
    pub fn north_east(&self) -> Location {
        Location::new(self.max_lat, self.max_lon)
    }

    #[inline]
    pub fn contains(&self, loc: &Location) -> bool {
        loc.lat >= self.min_lat && loc.lat <= self.max_lat && loc.lon >= self.min_lon && loc.lon <= self.max_lon
    }

    #[inline]
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
            && self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
    }

    #[inline]
    pub fn covers(&self, other: &BoundingBox) -> bool {
        self.min_lat <= other.min_lat
            && self.max_lat >= other.max_lat
            && self.min_lon <= other.min_lon
            && self.max_lon >= other.max_lon
    }

    fn of_points(points: &[Location]) -> Self {
        points.iter().fold(
            BoundingBox { min_lat: 90.0, max_lat: -90.0, min_lon: 180.0, max_lon: -180.0 },
            |b, p| BoundingBox {
                min_lat: b.min_lat.min(p.lat),
                max_lat: b.max_lat.max(p.lat),
                min_lon: b.min_lon.min(p.lon),
                max_lon: b.max_lon.max(p.lon),
            },
        )
    }
}

/// The serializable description of a geofence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    /// `radius` is a great-circle distance in degrees.
    Circle { center: Location, radius: f64 },
    Rectangle { south_west: Location, north_east: Location },
    Polygon { points: Vec<Location> },
}

#[derive(Debug, Clone, PartialEq)]
enum Region {
    Cap { center: Location, radius: f64 },
    Plane(Polygon<f64>),
}

/// A closed region used to filter publications and subscriptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Shape", into = "Shape")]
pub struct Geofence {
    shape: Shape,
    bbox: BoundingBox,
    region: Region,
}

impl Geofence {
    pub fn circle(center: Location, radius: f64) -> Result<Self, GeoError> {
        if !center.is_valid() {
            return Err(GeoError::InvalidLocation(center.lat, center.lon));
        }
        if !radius.is_finite() || radius <= 0.0 || radius > 180.0 {
            return Err(GeoError::InvalidRadius(radius));
        }

        let min_lat = (center.lat - radius).max(-90.0);
        let max_lat = (center.lat + radius).min(90.0);
        let (min_lon, max_lon) = if center.lat.abs() + radius >= 90.0 {
            //a pole lies inside the circle
            (-180.0, 180.0)
        } else {
            let d = (radius.to_radians().sin() / center.lat.to_radians().cos()).asin().to_degrees();
            ((center.lon - d).max(-180.0), (center.lon + d).min(180.0))
        };
        Ok(Self {
            shape: Shape::Circle { center, radius },
            bbox: BoundingBox { min_lat, max_lat, min_lon, max_lon },
            region: Region::Cap { center, radius },
        })
    }

    pub fn rectangle(south_west: Location, north_east: Location) -> Result<Self, GeoError> {
        for loc in [&south_west, &north_east] {
            if !loc.is_valid() {
                return Err(GeoError::InvalidLocation(loc.lat, loc.lon));
            }
        }
        if south_west.lat > north_east.lat || south_west.lon > north_east.lon {
            return Err(GeoError::InvalidRectangle);
        }

        let bbox = BoundingBox {
            min_lat: south_west.lat,
            max_lat: north_east.lat,
            min_lon: south_west.lon,
            max_lon: north_east.lon,
        };
        let ring = vec![
            south_west.coord(),
            Coord { x: north_east.lon, y: south_west.lat },
            north_east.coord(),
            Coord { x: south_west.lon, y: north_east.lat },
        ];

        Ok(Self {
            shape: Shape::Rectangle { south_west, north_east },
            bbox,
            region: Region::Plane(Polygon::new(LineString::from(ring), vec![])),
        })
    }

    pub fn polygon(mut points: Vec<Location>) -> Result<Self, GeoError> {
        if let Some(invalid) = points.iter().find(|p| !p.is_valid()) {
            return Err(GeoError::InvalidLocation(invalid.lat, invalid.lon));
        }
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        let mut distinct = points.clone();
        distinct.dedup();
        if distinct.len() < 3 {
            return Err(GeoError::TooFewPoints(distinct.len()));
        }

        let bbox = BoundingBox::of_points(&points);
        let ring = points.iter().map(Location::coord).collect::<Vec<_>>();
        let region = Region::Plane(Polygon::new(LineString::from(ring), vec![]));
        Ok(Self { shape: Shape::Polygon { points }, bbox, region })
    }

    /// The whole globe.
    pub fn world() -> Self {
        Self::rectangle(Location::new(-90.0, -180.0), Location::new(90.0, 180.0))
            .unwrap_or_else(|_| unreachable!("world bounds are valid"))
    }

    /// Parse a WKT `POLYGON`; coordinates are `lon lat` pairs.
    pub fn from_wkt(s: &str) -> Result<Self, GeoError> {
        let wkt = wkt::Wkt::<f64>::from_str(s).map_err(|e| GeoError::Wkt(e.to_string()))?;
        let geometry: geo::Geometry<f64> =
            wkt.try_into().map_err(|e: wkt::conversion::Error| GeoError::Wkt(format!("{:?}", e)))?;
        match geometry {
            geo::Geometry::Polygon(p) => {
                let points = p.exterior().coords().map(|c| Location::new(c.y, c.x)).collect::<Vec<_>>();
                Self::polygon(points)
            }
            other => Err(GeoError::UnsupportedGeometry(format!("{:?}", other))),
        }
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Exact containment test; points on the boundary are inside.
    pub fn contains(&self, loc: &Location) -> bool {
        if !self.bbox.contains(loc) {
            return false;
        }
        match (&self.shape, &self.region) {
            (_, Region::Cap { center, radius }) => center.distance_deg(loc) <= *radius,
            (Shape::Rectangle { .. }, _) => true,
            (_, Region::Plane(polygon)) => polygon.intersects(&loc.point()),
        }
    }

    pub fn intersects(&self, other: &Geofence) -> bool {
        if !self.bbox.intersects(&other.bbox) {
            return false;
        }
        match (&self.region, &other.region) {
            (Region::Cap { center: c1, radius: r1 }, Region::Cap { center: c2, radius: r2 }) => {
                c1.distance_deg(c2) <= r1 + r2
            }
            (Region::Cap { center, radius }, Region::Plane(polygon)) => {
                min_distance_to_polygon(center, polygon) <= *radius
            }
            (Region::Plane(polygon), Region::Cap { center, radius }) => {
                min_distance_to_polygon(center, polygon) <= *radius
            }
            (Region::Plane(a), Region::Plane(b)) => a.intersects(b),
        }
    }

    #[inline]
    pub fn disjoint(&self, other: &Geofence) -> bool {
        !self.intersects(other)
    }

    /// True if `other` lies completely inside this geofence.
    pub fn covers(&self, other: &Geofence) -> bool {
        match (&self.region, &other.region) {
            (Region::Cap { center: c1, radius: r1 }, Region::Cap { center: c2, radius: r2 }) => {
                c1.distance_deg(c2) + r2 <= *r1
            }
            //the farthest point of a region from the center lies on its boundary
            (Region::Cap { center, radius }, Region::Plane(polygon)) => {
                self.bbox.covers(&other.bbox)
                    && edges(polygon).all(|(a, b)| distance_to_segment(center, a, b, Extreme::Farthest) <= *radius)
            }
            (Region::Plane(polygon), Region::Cap { center, radius }) => {
                polygon.intersects(&center.point())
                    && edges(polygon)
                        .filter(|(a, b)| !is_seam(*a, *b))
                        .all(|(a, b)| distance_to_segment(center, a, b, Extreme::Closest) >= *radius)
            }
            (Region::Plane(a), Region::Plane(b)) => a.contains(b),
        }
    }
}

#[derive(Clone, Copy)]
enum Extreme {
    Closest,
    Farthest,
}

fn edges(polygon: &Polygon<f64>) -> impl Iterator<Item = (Coord<f64>, Coord<f64>)> + '_ {
    polygon.exterior().0.windows(2).map(|w| (w[0], w[1]))
}

//An edge along a pole or the antimeridian borders nothing on the other side.
fn is_seam(a: Coord<f64>, b: Coord<f64>) -> bool {
    (a.y == b.y && a.y.abs() == 90.0) || (a.x == b.x && a.x.abs() == 180.0)
}

/// Great-circle distance in degrees from `from` to the closest point of the polygon, 0 inside.
///
/// Away from `from` the distance has no local minimum, so outside the polygon the closest point
/// lies on an edge.
fn min_distance_to_polygon(from: &Location, polygon: &Polygon<f64>) -> f64 {
    if polygon.intersects(&from.point()) {
        return 0.0;
    }
    edges(polygon).map(|(a, b)| distance_to_segment(from, a, b, Extreme::Closest)).fold(f64::INFINITY, f64::min)
}

/// Great-circle distance in degrees from `from` to the closest or farthest point of the straight
/// lon/lat segment `a`-`b`.
///
/// The segment is sampled every [`EDGE_STEP_DEG`] and the best sample is refined with a
/// golden-section search between its neighbours.
fn distance_to_segment(from: &Location, a: Coord<f64>, b: Coord<f64>, extreme: Extreme) -> f64 {
    let sign = match extreme {
        Extreme::Closest => 1.0,
        Extreme::Farthest => -1.0,
    };
    let cost = |t: f64| sign * from.distance_deg(&Location::new(a.y + (b.y - a.y) * t, a.x + (b.x - a.x) * t));

    let steps = ((b.x - a.x).abs().max((b.y - a.y).abs()) / EDGE_STEP_DEG).ceil().max(1.0) as usize;
    let (best, best_cost) = (0..=steps)
        .map(|i| (i, cost(i as f64 / steps as f64)))
        .fold((0, f64::INFINITY), |acc, s| if s.1 < acc.1 { s } else { acc });

    let lo = best.saturating_sub(1) as f64 / steps as f64;
    let hi = (best + 1).min(steps) as f64 / steps as f64;
    sign * golden_section_min(cost, lo, hi).min(best_cost)
}

fn golden_section_min(f: impl Fn(f64) -> f64, mut lo: f64, mut hi: f64) -> f64 {
    const INV_PHI: f64 = 0.618_033_988_749_895;
    let mut x1 = hi - INV_PHI * (hi - lo);
    let mut x2 = lo + INV_PHI * (hi - lo);
    let (mut f1, mut f2) = (f(x1), f(x2));
    for _ in 0..REFINE_ITERATIONS {
        if f1 <= f2 {
            hi = x2;
            x2 = x1;
            f2 = f1;
            x1 = hi - INV_PHI * (hi - lo);
            f1 = f(x1);
        } else {
            lo = x1;
            x1 = x2;
            f1 = f2;
            x2 = lo + INV_PHI * (hi - lo);
            f2 = f(x2);
        }
    }
    f1.min(f2)
}

impl TryFrom<Shape> for Geofence {
    type Error = GeoError;

    fn try_from(shape: Shape) -> Result<Self, Self::Error> {
        match shape {
            Shape::Circle { center, radius } => Geofence::circle(center, radius),
            Shape::Rectangle { south_west, north_east } => Geofence::rectangle(south_west, north_east),
            Shape::Polygon { points } => Geofence::polygon(points),
        }
    }
}

impl From<Geofence> for Shape {
    fn from(g: Geofence) -> Self {
        g.shape
    }
}

impl fmt::Display for Geofence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shape {
            Shape::Circle { center, radius } => write!(f, "circle{{{}, r={}}}", center, radius),
            Shape::Rectangle { south_west, north_east } => write!(f, "rectangle{{{}, {}}}", south_west, north_east),
            Shape::Polygon { points } => {
                write!(f, "polygon{{")?;
                for (i, p) in points.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let paris = Location::new(48.8566, 2.3522);
        let london = Location::new(51.5074, -0.1278);
        let d = paris.distance_km(&london);
        assert!((d - 343.5).abs() < 2.0, "distance {}", d);
        assert_eq!(paris.distance_km(&paris), 0.0);

        let a = Location::new(0.0, 0.0);
        let b = Location::new(0.0, 1.0);
        assert!((a.distance_deg(&b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_location_validation() {
        assert!(Location::try_new(45.0, 90.0).is_ok());
        assert_eq!(Location::try_new(91.0, 0.0), Err(GeoError::InvalidLocation(91.0, 0.0)));
        assert!(Location::try_new(0.0, -180.5).is_err());
        assert!(Location::try_new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_circle() {
        let center = Location::new(10.0, 10.0);
        let circle = Geofence::circle(center, 0.4).unwrap();
        assert!(circle.contains(&center));
        assert!(circle.contains(&Location::new(10.3, 10.0)));
        assert!(!circle.contains(&Location::new(10.5, 10.0)));
        assert!(!circle.contains(&Location::new(10.35, 10.35)));

        let bbox = circle.bounding_box();
        assert!((bbox.min_lat - 9.6).abs() < 1e-9);
        assert!((bbox.max_lat - 10.4).abs() < 1e-9);
        assert!(bbox.min_lon < 9.6 && bbox.max_lon > 10.4);

        let polar = Geofence::circle(Location::new(89.0, 0.0), 2.0).unwrap();
        assert_eq!(polar.bounding_box().min_lon, -180.0);
        assert_eq!(polar.bounding_box().max_lat, 90.0);

        assert_eq!(Geofence::circle(center, 0.0), Err(GeoError::InvalidRadius(0.0)));
        assert!(Geofence::circle(center, -1.0).is_err());
    }

    #[test]
    fn test_rectangle_and_polygon() {
        let rect = Geofence::rectangle(Location::new(0.0, 0.0), Location::new(20.0, 20.0)).unwrap();
        assert!(rect.contains(&Location::new(10.0, 10.0)));
        assert!(rect.contains(&Location::new(20.0, 0.0)));
        assert!(!rect.contains(&Location::new(30.0, 30.0)));
        assert_eq!(
            Geofence::rectangle(Location::new(20.0, 0.0), Location::new(0.0, 20.0)),
            Err(GeoError::InvalidRectangle)
        );

        let triangle = Geofence::polygon(vec![
            Location::new(0.0, 0.0),
            Location::new(0.0, 10.0),
            Location::new(10.0, 0.0),
            Location::new(0.0, 0.0),
        ])
        .unwrap();
        assert!(triangle.contains(&Location::new(1.0, 1.0)));
        assert!(!triangle.contains(&Location::new(9.0, 9.0)));
        assert!(triangle.contains(&Location::new(0.0, 5.0)));

        assert_eq!(
            Geofence::polygon(vec![Location::new(0.0, 0.0), Location::new(1.0, 1.0), Location::new(0.0, 0.0)]),
            Err(GeoError::TooFewPoints(2))
        );
    }

    #[test]
    fn test_intersects() {
        let left = Geofence::rectangle(Location::new(0.0, 0.0), Location::new(20.0, 20.0)).unwrap();
        let right = Geofence::rectangle(Location::new(0.0, 25.0), Location::new(20.0, 40.0)).unwrap();
        assert!(left.disjoint(&right));

        let bridging = Geofence::circle(Location::new(10.0, 22.5), 3.0).unwrap();
        assert!(bridging.intersects(&left));
        assert!(bridging.intersects(&right));
        assert!(left.intersects(&bridging));

        let inside = Geofence::circle(Location::new(10.0, 10.0), 1.0).unwrap();
        assert!(inside.intersects(&left));
        assert!(inside.disjoint(&right));
        assert!(left.covers(&inside));
        assert!(!right.covers(&inside));

        let c1 = Geofence::circle(Location::new(0.0, 0.0), 1.0).unwrap();
        let c2 = Geofence::circle(Location::new(0.0, 1.9), 1.0).unwrap();
        let c3 = Geofence::circle(Location::new(0.0, 2.1), 1.0).unwrap();
        assert!(c1.intersects(&c2));
        assert!(c1.disjoint(&c3));

        assert!(Geofence::world().intersects(&right));
    }

    #[test]
    fn test_high_latitude_intersects() {
        //the cap bulges poleward of its center latitude
        let cap = Geofence::circle(Location::new(80.0, 0.0), 5.0).unwrap();
        let rect = Geofence::rectangle(Location::new(81.2, 29.6), Location::new(81.4, 30.0)).unwrap();
        let p = Location::new(81.3, 29.8);
        assert!(cap.contains(&p) && rect.contains(&p));
        assert!(cap.intersects(&rect));
        assert!(rect.intersects(&cap));

        let beyond = Geofence::rectangle(Location::new(81.2, 32.0), Location::new(81.4, 33.0)).unwrap();
        assert!(cap.disjoint(&beyond));
    }

    #[test]
    fn test_polar_cap() {
        let cap = Geofence::circle(Location::new(88.0, -90.0), 3.0).unwrap();
        let rect = Geofence::rectangle(Location::new(89.5, 80.0), Location::new(90.0, 100.0)).unwrap();
        let p = Location::new(89.9, 90.0);
        assert!(cap.contains(&p) && rect.contains(&p));
        assert!(cap.intersects(&rect));
        assert!(rect.intersects(&cap));

        //the whole cap lies north of lat 85, across every longitude
        let north = Geofence::rectangle(Location::new(84.0, -180.0), Location::new(90.0, 180.0)).unwrap();
        assert!(north.covers(&cap));
        assert!(cap.covers(&rect));
        let south = Geofence::rectangle(Location::new(70.0, 80.0), Location::new(84.0, 100.0)).unwrap();
        assert!(cap.disjoint(&south));
    }

    #[test]
    fn test_wkt() {
        let area = Geofence::from_wkt("POLYGON((0 0, 20 0, 20 20, 0 20, 0 0))").unwrap();
        assert!(area.contains(&Location::new(10.0, 10.0)));
        assert!(!area.contains(&Location::new(30.0, 30.0)));
        match area.shape() {
            Shape::Polygon { points } => assert_eq!(points.len(), 4),
            other => panic!("unexpected shape {:?}", other),
        }

        //x is the longitude
        let strip = Geofence::from_wkt("POLYGON((0 0, 40 0, 40 10, 0 10, 0 0))").unwrap();
        assert!(strip.contains(&Location::new(5.0, 35.0)));
        assert!(!strip.contains(&Location::new(35.0, 5.0)));

        assert!(matches!(Geofence::from_wkt("POINT(1 2)"), Err(GeoError::UnsupportedGeometry(_))));
        assert!(matches!(Geofence::from_wkt("POLYGON((0 0, 1"), Err(GeoError::Wkt(_))));
    }

    #[test]
    fn test_serde() {
        let json = r#"{"type":"circle","center":{"lat":1.0,"lon":2.0},"radius":0.5}"#;
        let fence: Geofence = serde_json::from_str(json).unwrap();
        assert_eq!(fence, Geofence::circle(Location::new(1.0, 2.0), 0.5).unwrap());
        assert_eq!(serde_json::to_string(&fence).unwrap(), json);

        let invalid = r#"{"type":"circle","center":{"lat":1.0,"lon":2.0},"radius":-3.0}"#;
        assert!(serde_json::from_str::<Geofence>(invalid).is_err());
    }
}
