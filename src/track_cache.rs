// src/track_cache.rs
//
// Caller-owned cache of prepared tracks, keyed by source name (one track per
// video/session). Not ambient state: the pipeline receives a reference and
// never mutates it. Inserting a track for a source that already has one
// replaces it: a new upload invalidates the old track.

use crate::track_interpolation::prepare_track;
use crate::types::TrackPoint;
use std::collections::HashMap;
use tracing::debug;

#[derive(Default)]
pub struct TrackCache {
    tracks: HashMap<String, Vec<TrackPoint>>,
}

impl TrackCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitize, sort, and store a track for `source`, replacing any
    /// previous entry.
    pub fn insert(&mut self, source: &str, points: Vec<TrackPoint>) {
        let track = prepare_track(points);
        debug!("Cached track for '{}' ({} point(s))", source, track.len());
        self.tracks.insert(source.to_string(), track);
    }

    pub fn get(&self, source: &str) -> Option<&[TrackPoint]> {
        self.tracks.get(source).map(Vec::as_slice)
    }

    pub fn invalidate(&mut self, source: &str) {
        self.tracks.remove(source);
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(time: f64, lat: f64, lon: f64) -> TrackPoint {
        TrackPoint { time, lat, lon }
    }

    #[test]
    fn test_insert_prepares_track() {
        let mut cache = TrackCache::new();
        cache.insert("ride_a", vec![pt(3.0, 1.0, 1.0), pt(1.0, 0.0, 0.0), pt(f64::NAN, 9.0, 9.0)]);

        let track = cache.get("ride_a").unwrap();
        assert_eq!(track.len(), 2);
        assert_eq!(track[0].time, 1.0);
    }

    #[test]
    fn test_new_upload_replaces_previous_track() {
        let mut cache = TrackCache::new();
        cache.insert("ride_a", vec![pt(0.0, 0.0, 0.0), pt(1.0, 1.0, 1.0)]);
        cache.insert("ride_a", vec![pt(0.0, 5.0, 5.0)]);

        let track = cache.get("ride_a").unwrap();
        assert_eq!(track.len(), 1);
        assert_eq!(track[0].lat, 5.0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let mut cache = TrackCache::new();
        cache.insert("a", vec![pt(0.0, 0.0, 0.0)]);
        cache.insert("b", vec![pt(0.0, 1.0, 1.0)]);

        cache.invalidate("a");
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());

        cache.clear();
        assert!(cache.is_empty());
    }
}
