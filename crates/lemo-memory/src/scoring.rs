//! Confidence calibration for raw similarity scores
//!
//! Inner-product scores from an embedding model cluster near a nonzero floor
//! even for unrelated text. The scorer rescales `[baseline, 1]` linearly onto
//! `[0, 1]` so the result can be compared against fixed tier thresholds.

use serde::{Deserialize, Serialize};

/// Converts raw similarity scores into calibrated confidences
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScorer {
    baseline: f32,
}

impl ConfidenceScorer {
    pub fn new(baseline: f32) -> Self {
        Self { baseline }
    }

    pub fn baseline(&self) -> f32 {
        self.baseline
    }

    /// Calibrated confidence in `[0, 1]` for a raw similarity score
    pub fn score(&self, raw_score: f32) -> f32 {
        score(raw_score, self.baseline)
    }

    /// Confidence of the best match, or 0 when there is none
    pub fn best(&self, raw_scores: impl IntoIterator<Item = f32>) -> f32 {
        raw_scores
            .into_iter()
            .map(|raw| self.score(raw))
            .fold(0.0, f32::max)
    }
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new(lemo_common::DEFAULT_BASELINE)
    }
}

/// `(raw - baseline) / (1 - baseline)` clamped to `[0, 1]`; 0 below the baseline.
pub fn score(raw_score: f32, baseline: f32) -> f32 {
    if raw_score.is_nan() || raw_score < baseline {
        return 0.0;
    }
    let span = 1.0 - baseline;
    if span <= 0.0 {
        return if raw_score >= 1.0 { 1.0 } else { 0.0 };
    }
    ((raw_score - baseline) / span).clamp(0.0, 1.0)
}
