// src/matching/index.rs
//
// Per-batch spatial index over parcel boundaries. Built once, read-only
// afterwards, so parallel matching workers share it without synchronization.
// Candidate queries return hits in ascending registry order (the tie-break
// order the matcher documents) rather than whatever order the tree yields.

use crate::matching::geometry::{
    meters_to_degrees_lat, meters_to_degrees_lon, BoundaryGeometry, ParcelShape,
};
use crate::types::{GeoPoint, Parcel};
use rstar::{RTree, RTreeObject, AABB};
use tracing::warn;

pub struct ParcelEntry {
    pub id: u64,
    /// Position in registry (input) order, the documented tie-break key.
    pub slot: usize,
    pub shape: ParcelShape,
}

struct IndexedEnvelope {
    slot: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

pub struct ParcelIndex {
    tree: RTree<IndexedEnvelope>,
    entries: Vec<ParcelEntry>,
    excluded: usize,
}

impl ParcelIndex {
    /// Build the index, excluding degenerate boundaries from candidacy
    /// entirely. A bad polygon is a per-parcel data issue: it is logged and
    /// skipped, and the rest of the registry stays matchable.
    pub fn build(parcels: &[Parcel]) -> Self {
        let mut entries = Vec::with_capacity(parcels.len());
        let mut excluded = 0;

        for parcel in parcels {
            match ParcelShape::new(parcel.boundary.clone()) {
                Some(shape) => {
                    entries.push(ParcelEntry {
                        id: parcel.id,
                        slot: entries.len(),
                        shape,
                    });
                }
                None => {
                    warn!("⚠️  Parcel {} has a degenerate boundary, excluded from matching", parcel.id);
                    excluded += 1;
                }
            }
        }

        let envelopes = entries
            .iter()
            .map(|entry| {
                let rect = entry.shape.bounding_rect();
                IndexedEnvelope {
                    slot: entry.slot,
                    envelope: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                }
            })
            .collect();

        Self {
            tree: RTree::bulk_load(envelopes),
            entries,
            excluded,
        }
    }

    /// Parcels whose bounding box contains `point`, in registry order.
    pub fn candidates_at(&self, point: GeoPoint) -> Vec<&ParcelEntry> {
        let probe = AABB::from_point([point.lon, point.lat]);
        self.collect_sorted(probe)
    }

    /// Parcels whose bounding box intersects a coarse `radius_meters` search
    /// box around `point`, in registry order. The degrees-to-meters
    /// conversion here is approximate and used only to prefilter; exact
    /// distances are computed by the matcher.
    pub fn candidates_within(&self, point: GeoPoint, radius_meters: f64) -> Vec<&ParcelEntry> {
        let dlat = meters_to_degrees_lat(radius_meters);
        let dlon = meters_to_degrees_lon(radius_meters, point.lat);
        let probe = AABB::from_corners(
            [point.lon - dlon, point.lat - dlat],
            [point.lon + dlon, point.lat + dlat],
        );
        self.collect_sorted(probe)
    }

    fn collect_sorted(&self, probe: AABB<[f64; 2]>) -> Vec<&ParcelEntry> {
        let mut hits: Vec<&ParcelEntry> = self
            .tree
            .locate_in_envelope_intersecting(&probe)
            .map(|hit| &self.entries[hit.slot])
            .collect();
        hits.sort_by_key(|entry| entry.slot);
        hits
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn excluded_count(&self) -> usize {
        self.excluded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Polygon};

    fn square_parcel(id: u64, min_lon: f64, min_lat: f64, side_deg: f64) -> Parcel {
        Parcel {
            id,
            name: None,
            boundary: Polygon::new(
                LineString::from(vec![
                    (min_lon, min_lat),
                    (min_lon + side_deg, min_lat),
                    (min_lon + side_deg, min_lat + side_deg),
                    (min_lon, min_lat + side_deg),
                    (min_lon, min_lat),
                ]),
                vec![],
            ),
            recorded_classification: None,
        }
    }

    fn degenerate_parcel(id: u64) -> Parcel {
        Parcel {
            id,
            name: None,
            boundary: Polygon::new(LineString::from(vec![(0.0, 0.0), (1.0, 1.0), (0.0, 0.0)]), vec![]),
            recorded_classification: None,
        }
    }

    #[test]
    fn test_point_query_hits_enclosing_envelope() {
        let parcels = vec![
            square_parcel(10, 8.0, 47.0, 0.001),
            square_parcel(20, 8.1, 47.1, 0.001),
        ];
        let index = ParcelIndex::build(&parcels);

        let hits = index.candidates_at(GeoPoint::new(47.0005, 8.0005));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 10);
    }

    #[test]
    fn test_degenerate_boundaries_excluded_without_aborting() {
        let parcels = vec![
            degenerate_parcel(1),
            square_parcel(2, 8.0, 47.0, 0.001),
            degenerate_parcel(3),
        ];
        let index = ParcelIndex::build(&parcels);

        assert_eq!(index.len(), 1);
        assert_eq!(index.excluded_count(), 2);
        let hits = index.candidates_at(GeoPoint::new(47.0005, 8.0005));
        assert_eq!(hits[0].id, 2);
    }

    #[test]
    fn test_candidates_sorted_by_registry_order() {
        // Overlapping envelopes: both squares contain the probe point.
        let parcels = vec![
            square_parcel(30, 8.0, 47.0, 0.002),
            square_parcel(40, 8.0005, 47.0005, 0.002),
        ];
        let index = ParcelIndex::build(&parcels);

        let hits = index.candidates_at(GeoPoint::new(47.001, 8.001));
        let ids: Vec<u64> = hits.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![30, 40]);
    }

    #[test]
    fn test_radius_query_reaches_nearby_envelope() {
        let parcels = vec![square_parcel(5, 8.001, 47.0, 0.001)];
        let index = ParcelIndex::build(&parcels);

        // ~40 m west of the square's west edge at lat 47.
        let point = GeoPoint::new(47.0005, 8.001 - meters_to_degrees_lon(40.0, 47.0));
        assert!(index.candidates_at(point).is_empty());
        assert_eq!(index.candidates_within(point, 50.0).len(), 1);
        assert!(index.candidates_within(point, 20.0).is_empty());
    }
}
