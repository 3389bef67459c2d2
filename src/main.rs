// src/main.rs

mod aggregation;
mod config;
mod labels;
mod matching;
mod pipeline;
mod track_cache;
mod track_interpolation;
mod types;

use anyhow::{Context, Result};
use geo::{LineString, Polygon};
use labels::LabelCanonicalizer;
use pipeline::{run_batch, PipelineSettings};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use track_cache::TrackCache;
use tracing::{error, info, warn};
use types::{Config, Observation, Parcel, Prediction, TrackPoint};
use walkdir::WalkDir;

/// One batch file: a parcel registry snapshot plus the collected evidence for
/// one or more survey sources. Produced upstream by the boundary/track
/// parsers and the classifier; consumed here as already-parsed structures.
#[derive(Debug, Deserialize)]
struct BatchFile {
    parcels: Vec<ParcelRecord>,
    #[serde(default)]
    tracks: BTreeMap<String, Vec<TrackPoint>>,
    observations: Vec<Observation>,
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct ParcelRecord {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    classification: Option<String>,
    /// Exterior ring, (lon, lat) pairs.
    boundary: Vec<[f64; 2]>,
}

impl ParcelRecord {
    fn into_parcel(self, canonicalizer: &LabelCanonicalizer) -> Parcel {
        let ring: Vec<(f64, f64)> = self.boundary.iter().map(|c| (c[0], c[1])).collect();
        Parcel {
            id: self.id,
            name: self.name,
            boundary: Polygon::new(LineString::from(ring), vec![]),
            recorded_classification: self
                .classification
                .map(|raw| canonicalizer.canonicalize(&raw)),
        }
    }
}

fn main() -> Result<()> {
    let config = Config::load("config.yaml").unwrap_or_else(|e| {
        eprintln!("No usable config.yaml ({}), continuing with defaults", e);
        Config::default()
    });

    tracing_subscriber::fmt()
        .with_env_filter(format!("parcel_change_detection={}", config.logging.level))
        .init();

    info!("🛰️  Parcel Change Detection starting");
    info!(
        "Settings: buffer={:.1} m, flag threshold={:.2}, evidence floor={}",
        config.matching.buffer_meters,
        config.aggregation.confidence_threshold,
        config.aggregation.min_evidence_count
    );

    let batch_files = find_batch_files(&config.batch.input_dir)?;
    if batch_files.is_empty() {
        error!("No batch files found in {}", config.batch.input_dir);
        return Ok(());
    }
    info!("Found {} batch file(s) to process", batch_files.len());

    std::fs::create_dir_all(&config.batch.output_dir)?;

    let canonicalizer = LabelCanonicalizer::from_config(&config.labels);
    let settings = PipelineSettings::from(&config);
    let mut tracks = TrackCache::new();

    let mut totals = pipeline::PipelineStats::default();
    let started = Instant::now();

    for (idx, path) in batch_files.iter().enumerate() {
        info!("========================================");
        info!("Processing batch {}/{}: {}", idx + 1, batch_files.len(), path.display());

        match process_batch(path, &config, &canonicalizer, &settings, &mut tracks) {
            Ok(stats) => {
                totals.observations_total += stats.observations_total;
                totals.positions_backfilled += stats.positions_backfilled;
                totals.matched_exact += stats.matched_exact;
                totals.matched_buffered += stats.matched_buffered;
                totals.unmatched += stats.unmatched;
                totals.samples_joined += stats.samples_joined;
                totals.samples_skipped += stats.samples_skipped;
                totals.flagged += stats.flagged;
                totals.confirmed += stats.confirmed;
                totals.insufficient += stats.insufficient;
            }
            Err(e) => {
                // One bad file never stops the rest of the batch set.
                error!("Failed to process {}: {}", path.display(), e);
            }
        }
    }

    info!("📊 Final Report:");
    info!("  Observations: {}", totals.observations_total);
    info!("  Positions backfilled from tracks: {}", totals.positions_backfilled);
    info!(
        "  Matched: {} ({} exact / {} buffered), unmatched: {}",
        totals.matched_exact + totals.matched_buffered,
        totals.matched_exact,
        totals.matched_buffered,
        totals.unmatched
    );
    info!(
        "  Samples: {} joined, {} skipped",
        totals.samples_joined, totals.samples_skipped
    );
    if totals.flagged > 0 {
        warn!("  🚩 FLAGGED PARCELS: {}", totals.flagged);
    } else {
        info!("  🚩 Flagged parcels: 0");
    }
    info!("  ✅ Confirmed: {}", totals.confirmed);
    info!("  ❔ Insufficient evidence: {}", totals.insufficient);
    info!("  Elapsed: {:.1}s", started.elapsed().as_secs_f64());

    Ok(())
}

fn find_batch_files(input_dir: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(input_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(path.to_path_buf());
        }
    }
    // Walk order is filesystem-dependent; sort so runs are reproducible.
    files.sort();
    Ok(files)
}

fn process_batch(
    path: &Path,
    config: &Config,
    canonicalizer: &LabelCanonicalizer,
    settings: &PipelineSettings,
    tracks: &mut TrackCache,
) -> Result<pipeline::PipelineStats> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let batch: BatchFile = serde_json::from_str(&contents)
        .with_context(|| format!("parsing {}", path.display()))?;

    info!(
        "Batch: {} parcel(s), {} track(s), {} observation(s), {} prediction(s)",
        batch.parcels.len(),
        batch.tracks.len(),
        batch.observations.len(),
        batch.predictions.len()
    );

    // A new upload for a source replaces its cached track.
    for (source, points) in batch.tracks {
        tracks.insert(&source, points);
    }

    let parcels: Vec<Parcel> = batch
        .parcels
        .into_iter()
        .map(|record| record.into_parcel(canonicalizer))
        .collect();
    let mut observations = batch.observations;

    let report = run_batch(
        &parcels,
        &mut observations,
        &batch.predictions,
        tracks,
        canonicalizer,
        settings,
    );

    for verdict in report.verdicts.iter().filter(|v| v.decision == types::Decision::Flagged) {
        warn!(
            "🚩 Parcel {}: recorded '{}' but observed '{}' ({:.0}% confidence over {} sample(s))",
            verdict.parcel_id,
            verdict.recorded_classification.as_deref().unwrap_or("-"),
            verdict.aggregated_label.as_deref().unwrap_or("-"),
            verdict.aggregated_confidence * 100.0,
            verdict.samples_considered
        );
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("batch");
    write_verdicts(&report.verdicts, &config.batch.output_dir, stem)?;
    write_matches(&report.matches, &config.batch.output_dir, stem)?;

    Ok(report.stats)
}

fn write_verdicts(verdicts: &[types::Verdict], output_dir: &str, stem: &str) -> Result<()> {
    let path = Path::new(output_dir).join(format!("{}_verdicts.jsonl", stem));
    let mut file = std::fs::File::create(&path)?;
    for verdict in verdicts {
        writeln!(file, "{}", serde_json::to_string(verdict)?)?;
    }
    file.flush()?;
    info!("💾 {} verdict(s) written to {}", verdicts.len(), path.display());
    Ok(())
}

fn write_matches(matches: &BTreeMap<u64, Option<u64>>, output_dir: &str, stem: &str) -> Result<()> {
    let path = Path::new(output_dir).join(format!("{}_matches.jsonl", stem));
    let mut file = std::fs::File::create(&path)?;
    for (observation_id, parcel_id) in matches {
        let line = serde_json::json!({
            "observation_id": observation_id,
            "parcel_id": parcel_id,
        });
        writeln!(file, "{}", line)?;
    }
    file.flush()?;
    info!("💾 Match audit written to {}", path.display());
    Ok(())
}
