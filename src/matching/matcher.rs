// src/matching/matcher.rs
//
// Two-pass resolution of an observed position to a parcel.
//
//   Pass 1: exact polygon containment over spatial-index candidates.
//           Cheap and unambiguous when the GPS fix is good.
//   Pass 2: buffered nearest-boundary fallback, entered only when no polygon
//           contains the point. Compensates for GPS drift near parcel edges
//           without matching distant parcels: the nearest boundary wins only
//           strictly inside `buffer_meters`.
//
// Tie-breaks are deterministic but arbitrary: ascending registry order for
// multiple containment hits (overlapping boundaries, a data-quality
// condition, surfaced as a warning) and for equal fallback distances.

use crate::matching::geometry::BoundaryGeometry;
use crate::matching::index::ParcelIndex;
use crate::types::{GeoPoint, Observation, Parcel};
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// How a position resolved. Callers that only need the parcel id collapse
/// this with `parcel_id()`; diagnostics keep the match strength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchOutcome {
    Exact { parcel_id: u64 },
    Buffered { parcel_id: u64, distance_meters: f64 },
    NoMatch,
}

impl MatchOutcome {
    pub fn parcel_id(&self) -> Option<u64> {
        match self {
            MatchOutcome::Exact { parcel_id } => Some(*parcel_id),
            MatchOutcome::Buffered { parcel_id, .. } => Some(*parcel_id),
            MatchOutcome::NoMatch => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOutcome::Exact { .. } => "exact",
            MatchOutcome::Buffered { .. } => "buffered",
            MatchOutcome::NoMatch => "none",
        }
    }
}

pub struct ParcelMatcher {
    index: ParcelIndex,
    buffer_meters: f64,
}

impl ParcelMatcher {
    /// Build the per-batch index and fix the matching tolerance. The index
    /// is read-only afterwards, so one matcher serves all parallel workers.
    pub fn new(parcels: &[Parcel], buffer_meters: f64) -> Self {
        Self {
            index: ParcelIndex::build(parcels),
            buffer_meters,
        }
    }

    pub fn index(&self) -> &ParcelIndex {
        &self.index
    }

    pub fn match_outcome(&self, position: GeoPoint) -> MatchOutcome {
        if !position.is_finite() {
            warn!("⚠️  Non-finite position ({}, {}), unmatched", position.lat, position.lon);
            return MatchOutcome::NoMatch;
        }

        // ── Pass 1: exact containment ────────────────────────────────────
        let containing: Vec<_> = self
            .index
            .candidates_at(position)
            .into_iter()
            .filter(|entry| entry.shape.contains_point(position))
            .collect();

        if let Some(first) = containing.first() {
            if containing.len() > 1 {
                warn!(
                    "⚠️  Point ({:.6}, {:.6}) inside {} overlapping parcels, keeping {}",
                    position.lat,
                    position.lon,
                    containing.len(),
                    first.id
                );
            }
            return MatchOutcome::Exact { parcel_id: first.id };
        }

        // ── Pass 2: buffered nearest boundary ────────────────────────────
        let mut best: Option<(f64, u64)> = None;
        for entry in self.index.candidates_within(position, self.buffer_meters) {
            let distance = entry.shape.boundary_distance_meters(position);
            if distance >= self.buffer_meters {
                continue;
            }
            // Strict < keeps the earlier registry slot on exact ties.
            let closer = match best {
                None => true,
                Some((best_distance, _)) => distance < best_distance,
            };
            if closer {
                best = Some((distance, entry.id));
            }
        }

        match best {
            Some((distance_meters, parcel_id)) => {
                debug!(
                    "Buffered match: parcel {} at {:.1} m (buffer {:.1} m)",
                    parcel_id, distance_meters, self.buffer_meters
                );
                MatchOutcome::Buffered { parcel_id, distance_meters }
            }
            None => MatchOutcome::NoMatch,
        }
    }

    /// The collapsed public form: parcel id or nothing.
    pub fn match_position(&self, position: GeoPoint) -> Option<u64> {
        self.match_outcome(position).parcel_id()
    }

    /// Match a whole batch. Equivalent to calling `match_position` once per
    /// positioned observation; observations without a position map to `None`.
    /// Parallel over observations, deterministic output ordering.
    pub fn match_many(&self, observations: &[Observation]) -> BTreeMap<u64, Option<u64>> {
        observations
            .par_iter()
            .map(|obs| (obs.id, obs.position.and_then(|p| self.match_position(p))))
            .collect()
    }

    /// Like `match_many` but keeps match strength, for diagnostics.
    pub fn match_many_outcomes(&self, observations: &[Observation]) -> BTreeMap<u64, MatchOutcome> {
        observations
            .par_iter()
            .map(|obs| {
                let outcome = match obs.position {
                    Some(p) => self.match_outcome(p),
                    None => MatchOutcome::NoMatch,
                };
                (obs.id, outcome)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::geometry::METERS_PER_DEGREE;
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

    fn obs(id: u64, position: Option<GeoPoint>) -> Observation {
        Observation {
            id,
            source: "ride_a".into(),
            timestamp: id as f64,
            position,
            position_source: None,
        }
    }

    // Square on the equator with its west edge at lon 0.001, so longitude
    // offsets convert to meters at exactly METERS_PER_DEGREE.
    fn equator_square(id: u64) -> Parcel {
        square_parcel(id, 0.001, -0.0005, 0.001)
    }

    #[test]
    fn test_containment_wins_regardless_of_buffer() {
        let parcels = vec![equator_square(1), square_parcel(2, 0.01, 0.01, 0.001)];
        let inside = GeoPoint::new(0.0, 0.0015);

        for buffer in [0.0, 5.0, 10_000.0] {
            let matcher = ParcelMatcher::new(&parcels, buffer);
            assert_eq!(
                matcher.match_outcome(inside),
                MatchOutcome::Exact { parcel_id: 1 },
                "buffer {} changed containment result",
                buffer
            );
        }
    }

    #[test]
    fn test_buffer_boundary_behavior() {
        let parcels = vec![equator_square(7)];
        // 29 m due west of the west edge.
        let point = GeoPoint::new(0.0, 0.001 - 29.0 / METERS_PER_DEGREE);

        let wide = ParcelMatcher::new(&parcels, 30.0);
        match wide.match_outcome(point) {
            MatchOutcome::Buffered { parcel_id, distance_meters } => {
                assert_eq!(parcel_id, 7);
                assert!((distance_meters - 29.0).abs() < 0.1, "distance {}", distance_meters);
            }
            other => panic!("expected buffered match, got {:?}", other),
        }

        let narrow = ParcelMatcher::new(&parcels, 20.0);
        assert_eq!(narrow.match_outcome(point), MatchOutcome::NoMatch);
    }

    #[test]
    fn test_nearest_boundary_wins_within_buffer() {
        // Two squares flanking the point at lon 0.001; the eastern one is
        // closer (10 m vs 40 m).
        let west = square_parcel(1, -(40.0 / METERS_PER_DEGREE), -0.0005, 0.001);
        let east = square_parcel(2, 0.001 + 10.0 / METERS_PER_DEGREE, -0.0005, 0.001);
        let matcher = ParcelMatcher::new(&[west, east], 60.0);

        let point = GeoPoint::new(0.0, 0.001);
        match matcher.match_outcome(point) {
            MatchOutcome::Buffered { parcel_id, .. } => assert_eq!(parcel_id, 2),
            other => panic!("expected buffered match, got {:?}", other),
        }
    }

    #[test]
    fn test_overlap_resolves_to_first_registry_slot() {
        // Identical squares: both contain the point.
        let parcels = vec![equator_square(42), equator_square(41)];
        let matcher = ParcelMatcher::new(&parcels, 30.0);
        assert_eq!(
            matcher.match_position(GeoPoint::new(0.0, 0.0015)),
            Some(42),
            "first registry slot must win the overlap tie-break"
        );
    }

    #[test]
    fn test_match_many_is_idempotent_and_skips_positionless() {
        let parcels = vec![equator_square(1)];
        let matcher = ParcelMatcher::new(&parcels, 30.0);

        let observations = vec![
            obs(100, Some(GeoPoint::new(0.0, 0.0015))),
            obs(101, None),
            obs(102, Some(GeoPoint::new(0.5, 0.5))),
        ];

        let first = matcher.match_many(&observations);
        let second = matcher.match_many(&observations);
        assert_eq!(first, second, "matching must be re-runnable");

        assert_eq!(first[&100], Some(1));
        assert_eq!(first[&101], None, "positionless observation must be unmatched");
        assert_eq!(first[&102], None);
    }

    #[test]
    fn test_batch_equals_single_calls() {
        let parcels = vec![equator_square(1)];
        let matcher = ParcelMatcher::new(&parcels, 30.0);
        let observations = vec![
            obs(1, Some(GeoPoint::new(0.0, 0.0015))),
            obs(2, Some(GeoPoint::new(0.0, 0.001 - 10.0 / METERS_PER_DEGREE))),
            obs(3, Some(GeoPoint::new(0.2, 0.2))),
        ];

        let batch = matcher.match_many(&observations);
        for o in &observations {
            let single = o.position.and_then(|p| matcher.match_position(p));
            assert_eq!(batch[&o.id], single, "batch diverged for observation {}", o.id);
        }
    }

    #[test]
    fn test_non_finite_position_unmatched() {
        let parcels = vec![equator_square(1)];
        let matcher = ParcelMatcher::new(&parcels, 30.0);
        assert_eq!(matcher.match_outcome(GeoPoint::new(f64::NAN, 0.0015)), MatchOutcome::NoMatch);
    }
}
