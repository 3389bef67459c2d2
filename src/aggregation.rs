// src/aggregation.rs
//
// Confidence-weighted voting over the classification samples resolved to one
// parcel, and the flag/confirm decision against the parcel's recorded
// classification.
//
// The aggregated confidence is the winner's summed confidence divided by the
// summed confidence across all labels: a normalized share of classification
// mass, not a calibrated probability. Downstream thresholds are tuned to
// that quantity; do not swap in a plain average or a vote fraction.

use crate::types::{ClassificationSample, Decision, Parcel, Verdict};

/// Aggregate of one parcel's samples: winning label, its mass share, and
/// vote counts.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOutcome {
    pub label: String,
    pub confidence: f64,
    pub considered: usize,
    pub agreeing: usize,
}

/// Confidence-weighted vote over `samples`. Returns `None` when fewer than
/// `min_evidence_count` samples are available (insufficient evidence, a
/// normal outcome).
///
/// Labels accumulate in first-encountered order and a strictly greater mass
/// is required to take the lead, so equal-mass ties keep the earlier label.
pub fn aggregate(samples: &[ClassificationSample], min_evidence_count: usize) -> Option<AggregateOutcome> {
    if samples.len() < min_evidence_count {
        return None;
    }

    // Few distinct labels per parcel in practice; a vec scan keeps
    // first-encounter order without hashing.
    let mut tallies: Vec<(&str, f64, usize)> = Vec::new();
    for sample in samples {
        match tallies.iter_mut().find(|(label, _, _)| *label == sample.label) {
            Some((_, mass, count)) => {
                *mass += sample.confidence;
                *count += 1;
            }
            None => tallies.push((sample.label.as_str(), sample.confidence, 1)),
        }
    }

    let total_mass: f64 = tallies.iter().map(|(_, mass, _)| mass).sum();
    let (label, winner_mass, agreeing) = tallies
        .iter()
        .fold(None::<(&str, f64, usize)>, |best, &(label, mass, count)| match best {
            Some((_, best_mass, _)) if mass <= best_mass => best,
            _ => Some((label, mass, count)),
        })?;

    let confidence = if total_mass > 0.0 { winner_mass / total_mass } else { 0.0 };

    Some(AggregateOutcome {
        label: label.to_string(),
        confidence,
        considered: samples.len(),
        agreeing,
    })
}

/// Combine an aggregate with the parcel's recorded classification.
///
/// `Insufficient` iff aggregation returned `None`. `Flagged` iff there is a
/// recorded classification, the winner differs from it, and the aggregated
/// confidence reaches `confidence_threshold`. Everything else is `Confirmed`:
/// agreement, no record to compare against, or a low-confidence
/// disagreement, which is never promoted.
pub fn decide(parcel: &Parcel, aggregate: Option<AggregateOutcome>, confidence_threshold: f64) -> Verdict {
    match aggregate {
        None => Verdict {
            parcel_id: parcel.id,
            recorded_classification: parcel.recorded_classification.clone(),
            aggregated_label: None,
            aggregated_confidence: 0.0,
            samples_considered: 0,
            samples_agreeing: 0,
            decision: Decision::Insufficient,
        },
        Some(agg) => {
            let mismatch = parcel
                .recorded_classification
                .as_deref()
                .map(|recorded| recorded != agg.label)
                .unwrap_or(false);

            let decision = if mismatch && agg.confidence >= confidence_threshold {
                Decision::Flagged
            } else {
                Decision::Confirmed
            };

            Verdict {
                parcel_id: parcel.id,
                recorded_classification: parcel.recorded_classification.clone(),
                aggregated_label: Some(agg.label),
                aggregated_confidence: agg.confidence,
                samples_considered: agg.considered,
                samples_agreeing: agg.agreeing,
                decision,
            }
        }
    }
}
