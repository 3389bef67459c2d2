// src/matching/geometry.rs
//
// Geometry capability seam for the matcher. Containment, boundary distance,
// and bounds are expressed through the `BoundaryGeometry` trait so the
// computational-geometry backend can be swapped without touching matching
// logic; `ParcelShape` is the geo-crate implementation.
//
// Distances are computed in a local planar frame: an equirectangular
// projection centered on the query point, with longitude scaled by
// cos(latitude). Over the tens-of-meters ranges the buffer pass cares
// about, this tracks true ground distance to well under a meter.

use crate::types::GeoPoint;
use geo::{
    Area, BoundingRect, Contains, Coord, CoordsIter, EuclideanDistance, LineString, Point,
    Polygon, Rect,
};

/// Meters per degree of latitude (and of longitude at the equator).
pub const METERS_PER_DEGREE: f64 = 111_320.0;

pub trait BoundaryGeometry {
    fn contains_point(&self, point: GeoPoint) -> bool;
    /// Minimum ground distance (meters) from `point` to the boundary.
    fn boundary_distance_meters(&self, point: GeoPoint) -> f64;
    fn bounding_rect(&self) -> Rect<f64>;
}

/// A validated parcel boundary backed by a `geo::Polygon`.
pub struct ParcelShape {
    polygon: Polygon<f64>,
    bounds: Rect<f64>,
}

impl ParcelShape {
    /// Validate and wrap a boundary polygon. Returns `None` for degenerate
    /// geometry: non-finite coordinates, fewer than 3 distinct vertices, or
    /// zero area.
    pub fn new(polygon: Polygon<f64>) -> Option<Self> {
        let exterior = polygon.exterior();
        if exterior.coords().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
            return None;
        }
        // geo closes rings, so a real triangle has 4 stored coords.
        if exterior.coords_count() < 4 {
            return None;
        }
        if polygon.unsigned_area() <= 0.0 {
            return None;
        }
        let bounds = polygon.bounding_rect()?;
        Some(Self { polygon, bounds })
    }
}

impl BoundaryGeometry for ParcelShape {
    fn contains_point(&self, point: GeoPoint) -> bool {
        // Boundary-exclusive: a point exactly on an edge is not "inside" and
        // resolves through the buffered pass at distance zero.
        self.polygon.contains(&Point::new(point.lon, point.lat))
    }

    fn boundary_distance_meters(&self, point: GeoPoint) -> f64 {
        let projection = LocalProjection::centered_on(point);
        let origin = Point::new(0.0, 0.0);

        let mut best = ring_distance(self.polygon.exterior(), &projection, &origin);
        for ring in self.polygon.interiors() {
            best = best.min(ring_distance(ring, &projection, &origin));
        }
        best
    }

    fn bounding_rect(&self) -> Rect<f64> {
        self.bounds
    }
}

fn ring_distance(ring: &LineString<f64>, projection: &LocalProjection, origin: &Point<f64>) -> f64 {
    let planar: LineString<f64> = ring
        .coords()
        .map(|c| projection.to_planar(GeoPoint::new(c.y, c.x)))
        .collect::<Vec<Coord<f64>>>()
        .into();
    planar.euclidean_distance(origin)
}

/// Equirectangular projection into a planar frame (meters east/north of the
/// origin). Accurate over small extents, which is all the buffer pass needs.
pub struct LocalProjection {
    origin: GeoPoint,
    meters_per_degree_lon: f64,
}

impl LocalProjection {
    pub fn centered_on(origin: GeoPoint) -> Self {
        Self {
            origin,
            meters_per_degree_lon: METERS_PER_DEGREE * origin.lat.to_radians().cos(),
        }
    }

    pub fn to_planar(&self, point: GeoPoint) -> Coord<f64> {
        Coord {
            x: (point.lon - self.origin.lon) * self.meters_per_degree_lon,
            y: (point.lat - self.origin.lat) * METERS_PER_DEGREE,
        }
    }
}

/// Degrees of latitude spanning `meters`. Coarse, for index prefilters only.
pub fn meters_to_degrees_lat(meters: f64) -> f64 {
    meters / METERS_PER_DEGREE
}

/// Degrees of longitude spanning `meters` at `lat`. Coarse, for index
/// prefilters only; the cosine is floored to keep the span finite near the
/// poles.
pub fn meters_to_degrees_lon(meters: f64, lat: f64) -> f64 {
    meters / (METERS_PER_DEGREE * lat.to_radians().cos().max(0.01))
}

/// Great-circle distance in meters between two GPS coordinates.
pub fn haversine_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let dphi = (b.lat - a.lat).to_radians();
    let dlambda = (b.lon - a.lon).to_radians();
    let h = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    EARTH_RADIUS_M * 2.0 * h.sqrt().atan2((1.0 - h).sqrt())
}
