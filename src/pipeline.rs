// src/pipeline.rs
//
// End-to-end evidence pipeline for one batch:
//
//   tracks → position backfill → parcel matching → sample join → verdicts
//
// Every stage is a pure function of its inputs plus the settings; re-running
// over an unchanged evidence base reproduces identical output. Matching fans
// out over observations and aggregation over parcels (both embarrassingly
// parallel; the parcel index is built once and shared read-only).

use crate::aggregation::{aggregate, decide};
use crate::labels::LabelCanonicalizer;
use crate::matching::{MatchOutcome, ParcelMatcher};
use crate::track_cache::TrackCache;
use crate::track_interpolation::backfill_positions;
use crate::types::{ClassificationSample, Config, Decision, Observation, Parcel, Prediction, Verdict};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub buffer_meters: f64,
    pub confidence_threshold: f64,
    pub min_evidence_count: usize,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            buffer_meters: config.matching.buffer_meters,
            confidence_threshold: config.aggregation.confidence_threshold,
            min_evidence_count: config.aggregation.min_evidence_count,
        }
    }
}

/// Counters for the batch report. Counts only; timing belongs to the caller.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PipelineStats {
    pub observations_total: usize,
    pub positions_backfilled: usize,
    pub observations_without_position: usize,
    pub sources_without_track: usize,
    pub matched_exact: usize,
    pub matched_buffered: usize,
    pub unmatched: usize,
    pub parcels_total: usize,
    pub parcels_degenerate: usize,
    pub samples_joined: usize,
    pub samples_skipped: usize,
    pub predictions_unresolved: usize,
    pub flagged: usize,
    pub confirmed: usize,
    pub insufficient: usize,
}

pub struct PipelineReport {
    /// observation id → parcel id (or None), the audit mapping.
    pub matches: BTreeMap<u64, Option<u64>>,
    /// One verdict per registry parcel, ordered by parcel id.
    pub verdicts: Vec<Verdict>,
    pub stats: PipelineStats,
}

/// Run the full pipeline over one batch. Mutates `observations` only to
/// backfill missing positions (each written at most once, never reverted).
pub fn run_batch(
    parcels: &[Parcel],
    observations: &mut [Observation],
    predictions: &[Prediction],
    tracks: &TrackCache,
    canonicalizer: &LabelCanonicalizer,
    settings: &PipelineSettings,
) -> PipelineReport {
    let mut stats = PipelineStats {
        observations_total: observations.len(),
        parcels_total: parcels.len(),
        ..Default::default()
    };

    // ── Stage 1: backfill positions from per-source tracks ───────────────
    let sources: BTreeSet<String> = observations.iter().map(|o| o.source.clone()).collect();
    for source in &sources {
        match tracks.get(source) {
            Some(track) => {
                let filled = backfill_positions(observations, source, track);
                stats.positions_backfilled += filled;
                debug!("Backfilled {} position(s) for source '{}'", filled, source);
            }
            None => {
                stats.sources_without_track += 1;
                debug!("No track cached for source '{}'", source);
            }
        }
    }
    stats.observations_without_position =
        observations.iter().filter(|o| !o.has_position()).count();
    if stats.observations_without_position > 0 {
        warn!(
            "⚠️  {} observation(s) still without a position after backfill",
            stats.observations_without_position
        );
    }

    // ── Stage 2: resolve observations to parcels ─────────────────────────
    let matcher = ParcelMatcher::new(parcels, settings.buffer_meters);
    stats.parcels_degenerate = matcher.index().excluded_count();

    let outcomes = matcher.match_many_outcomes(observations);
    for (id, outcome) in &outcomes {
        debug!("Observation {} → {} match", id, outcome.as_str());
        match outcome {
            MatchOutcome::Exact { .. } => stats.matched_exact += 1,
            MatchOutcome::Buffered { .. } => stats.matched_buffered += 1,
            MatchOutcome::NoMatch => stats.unmatched += 1,
        }
    }
    let matches: BTreeMap<u64, Option<u64>> = outcomes
        .iter()
        .map(|(id, outcome)| (*id, outcome.parcel_id()))
        .collect();

    // ── Stage 3: join predictions onto matched parcels ───────────────────
    let mut samples_by_parcel: BTreeMap<u64, Vec<ClassificationSample>> = BTreeMap::new();
    for prediction in predictions {
        let parcel_id = match matches.get(&prediction.observation_id) {
            Some(Some(parcel_id)) => *parcel_id,
            _ => {
                stats.predictions_unresolved += 1;
                continue;
            }
        };
        if !prediction.confidence.is_finite() || !(0.0..=1.0).contains(&prediction.confidence) {
            warn!(
                "⚠️  Prediction for observation {} has invalid confidence {}, skipped",
                prediction.observation_id, prediction.confidence
            );
            stats.samples_skipped += 1;
            continue;
        }
        samples_by_parcel.entry(parcel_id).or_default().push(ClassificationSample {
            parcel_id,
            observation_id: prediction.observation_id,
            label: canonicalizer.canonicalize(&prediction.label),
            confidence: prediction.confidence,
        });
        stats.samples_joined += 1;
    }

    // ── Stage 4: one verdict per registry parcel ─────────────────────────
    let empty: Vec<ClassificationSample> = Vec::new();
    let mut verdicts: Vec<Verdict> = parcels
        .par_iter()
        .map(|parcel| {
            let samples = samples_by_parcel.get(&parcel.id).unwrap_or(&empty);
            decide(
                parcel,
                aggregate(samples, settings.min_evidence_count),
                settings.confidence_threshold,
            )
        })
        .collect();
    verdicts.sort_by_key(|v| v.parcel_id);

    for verdict in &verdicts {
        debug!("Parcel {} verdict: {}", verdict.parcel_id, verdict.decision);
        match verdict.decision {
            Decision::Flagged => stats.flagged += 1,
            Decision::Confirmed => stats.confirmed += 1,
            Decision::Insufficient => stats.insufficient += 1,
        }
    }

    info!(
        "Batch done: {} observation(s), {} matched ({} exact / {} buffered), verdicts: {} flagged / {} confirmed / {} insufficient",
        stats.observations_total,
        stats.matched_exact + stats.matched_buffered,
        stats.matched_exact,
        stats.matched_buffered,
        stats.flagged,
        stats.confirmed,
        stats.insufficient
    );

    PipelineReport { matches, verdicts, stats }
}
