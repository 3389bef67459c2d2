// src/types.rs

use geo::Polygon;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub labels: LabelConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Maximum distance (meters) from a parcel boundary for the buffered
    /// near-match pass. A point further than this from every boundary stays
    /// unmatched.
    pub buffer_meters: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Minimum aggregated confidence required to flag a mismatch.
    pub confidence_threshold: f64,
    /// Minimum number of classified observations per parcel before a verdict
    /// is attempted. Default is 1: a single sample is enough. That is a weak
    /// floor, kept to match field practice; raise it in config for stricter
    /// evidence requirements.
    pub min_evidence_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    /// Canonical label → accepted synonyms. Lookup is case-insensitive and
    /// whitespace-trimmed; unknown labels pass through normalized.
    pub synonyms: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub input_dir: String,
    pub output_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// A geographic position in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// One point of a GPS track. `time` is seconds from track start.
/// Tracks are sorted by `time` before use; the interpolator does not re-sort.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrackPoint {
    pub time: f64,
    pub lat: f64,
    pub lon: f64,
}

impl TrackPoint {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }

    pub fn is_finite(&self) -> bool {
        self.time.is_finite() && self.lat.is_finite() && self.lon.is_finite()
    }
}

/// Where an observation's position came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSource {
    /// Supplied by the capture device alongside the observation.
    Device,
    /// Backfilled from the source's GPS track by the interpolator.
    Interpolated,
}

/// One classified visual sample: a frame with a timestamp and, directly or
/// after backfill, a position. `source` names the track the observation
/// belongs to (one track per source video/session).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: u64,
    pub source: String,
    pub timestamp: f64,
    #[serde(default)]
    pub position: Option<GeoPoint>,
    #[serde(default)]
    pub position_source: Option<PositionSource>,
}

impl Observation {
    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }
}

/// A registered parcel with a boundary polygon in geographic coordinates
/// ((lon, lat) ordering, matching GIS convention) and an optional recorded
/// classification to compare observed evidence against.
#[derive(Debug, Clone)]
pub struct Parcel {
    pub id: u64,
    pub name: Option<String>,
    pub boundary: Polygon<f64>,
    pub recorded_classification: Option<String>,
}

/// A raw classifier output for one observation, before the parcel join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub observation_id: u64,
    pub label: String,
    pub confidence: f64,
}

/// One classification vote attached to a resolved parcel.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationSample {
    pub parcel_id: u64,
    pub observation_id: u64,
    pub label: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Recorded classification contradicted with enough confidence.
    Flagged,
    /// Evidence agrees with the record, or disagrees below the confidence
    /// threshold, or there is no record to compare against.
    Confirmed,
    /// Too few samples to decide.
    Insufficient,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Flagged => "flagged",
            Decision::Confirmed => "confirmed",
            Decision::Insufficient => "insufficient",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregated outcome for one parcel.
///
/// Invariant: `decision == Insufficient` iff
/// `samples_considered < min_evidence_count`; otherwise `Flagged` iff the
/// parcel has a recorded classification, the aggregated label differs from
/// it, and `aggregated_confidence >= confidence_threshold`; else `Confirmed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub parcel_id: u64,
    pub recorded_classification: Option<String>,
    pub aggregated_label: Option<String>,
    pub aggregated_confidence: f64,
    pub samples_considered: usize,
    pub samples_agreeing: usize,
    pub decision: Decision,
}
