// src/track_interpolation.rs
//
// Recovers a continuous position estimate from a sparse, irregularly-sampled
// GPS track. Observations carry only a timestamp; the track tells us where
// the capture device was at that moment.
//
// The track is clamped, never extrapolated: a query before the first fix
// returns the first fix, a query after the last returns the last. Between
// fixes, latitude and longitude interpolate linearly and independently;
// track point spacing is small relative to Earth's radius, so great-circle
// correction would be noise.

use crate::types::{GeoPoint, Observation, PositionSource, TrackPoint};
use std::cmp::Ordering;
use tracing::{debug, warn};

/// Estimate the position at `query_time` from a time-sorted track.
///
/// Returns `None` for tracks with fewer than 2 points. The caller must sort
/// the track by time first (`prepare_track` does); this function does not
/// re-sort. O(n) linear scan; batch callers should use `TrackCursor`.
pub fn interpolate(track: &[TrackPoint], query_time: f64) -> Option<GeoPoint> {
    if track.len() < 2 {
        return None;
    }

    let first = &track[0];
    let last = &track[track.len() - 1];
    if query_time <= first.time {
        return Some(first.position());
    }
    if query_time >= last.time {
        return Some(last.position());
    }

    for pair in track.windows(2) {
        let (p0, p1) = (&pair[0], &pair[1]);
        if p0.time <= query_time && query_time <= p1.time {
            return Some(lerp(p0, p1, query_time));
        }
    }

    None
}

/// Forward-only cursor over a time-sorted track.
///
/// Produces the same results as `interpolate` provided query times are
/// non-decreasing across calls, in amortized O(1) per query instead of O(n).
pub struct TrackCursor<'a> {
    track: &'a [TrackPoint],
    idx: usize,
}

impl<'a> TrackCursor<'a> {
    pub fn new(track: &'a [TrackPoint]) -> Self {
        Self { track, idx: 0 }
    }

    pub fn position_at(&mut self, query_time: f64) -> Option<GeoPoint> {
        if self.track.len() < 2 {
            return None;
        }

        let first = &self.track[0];
        let last = &self.track[self.track.len() - 1];
        if query_time <= first.time {
            return Some(first.position());
        }
        if query_time >= last.time {
            return Some(last.position());
        }

        while self.idx + 1 < self.track.len() && self.track[self.idx + 1].time < query_time {
            self.idx += 1;
        }

        let p0 = &self.track[self.idx];
        let p1 = &self.track[self.idx + 1];
        Some(lerp(p0, p1, query_time))
    }
}

fn lerp(p0: &TrackPoint, p1: &TrackPoint, query_time: f64) -> GeoPoint {
    // Equal timestamps would divide by zero; take the earlier fix.
    let ratio = if p1.time == p0.time {
        0.0
    } else {
        (query_time - p0.time) / (p1.time - p0.time)
    };
    GeoPoint::new(
        p0.lat + ratio * (p1.lat - p0.lat),
        p0.lon + ratio * (p1.lon - p0.lon),
    )
}

/// Drop non-finite track points and sort by time, ready for interpolation.
/// Skipped points are a per-item data issue, not a batch failure.
pub fn prepare_track(points: Vec<TrackPoint>) -> Vec<TrackPoint> {
    let total = points.len();
    let mut track: Vec<TrackPoint> = points.into_iter().filter(|p| p.is_finite()).collect();
    let dropped = total - track.len();
    if dropped > 0 {
        warn!("⚠️  Dropped {} non-finite track point(s) of {}", dropped, total);
    }
    track.sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap_or(Ordering::Equal));
    track
}

/// Backfill positions for `source`'s observations from its prepared track.
/// Observations belonging to other sources are left alone.
///
/// An observation transitions at most once from position-absent to
/// position-present: device-supplied positions are never touched, and
/// backfilled ones are marked `PositionSource::Interpolated`. Returns the
/// number of positions written.
pub fn backfill_positions(observations: &mut [Observation], source: &str, track: &[TrackPoint]) -> usize {
    if track.len() < 2 {
        debug!("Track for '{}' too short to interpolate ({} point(s))", source, track.len());
        return 0;
    }

    // Drive the cursor in timestamp order; the slice itself keeps its order.
    let mut order: Vec<usize> = (0..observations.len())
        .filter(|&i| observations[i].source == source)
        .collect();
    order.sort_by(|&a, &b| {
        observations[a]
            .timestamp
            .partial_cmp(&observations[b].timestamp)
            .unwrap_or(Ordering::Equal)
    });

    let mut cursor = TrackCursor::new(track);
    let mut filled = 0;
    for i in order {
        let obs = &mut observations[i];
        if obs.position.is_some() {
            continue;
        }
        if !obs.timestamp.is_finite() {
            warn!("⚠️  Observation {} has a non-finite timestamp, skipping", obs.id);
            continue;
        }
        if let Some(position) = cursor.position_at(obs.timestamp) {
            obs.position = Some(position);
            obs.position_source = Some(PositionSource::Interpolated);
            filled += 1;
        }
    }
    filled
}
