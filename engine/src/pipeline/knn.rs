//! k-nearest-neighbour sign classifier.
//!
//! Majority vote among the `k` closest reference samples, with ties broken
//! by the smaller total neighbour distance.  When even the single nearest
//! sample is farther than the rejection distance, the result is the neutral
//! label with zero confidence no matter how the neighbours agree.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::dataset::ReferenceDataset;
use super::features::FeatureVector;

/// Label reported when no sign is recognized.
pub const NEUTRAL_LABEL: &str = "idle";

// ── Config ─────────────────────────────────────────────────

/// Classifier tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Number of neighbours consulted.
    pub k: usize,
    /// Nearest distance above which the result is forced neutral.
    pub reject_distance: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            k: 3,
            reject_distance: 1.8,
        }
    }
}

// ── Result ─────────────────────────────────────────────────

/// Per-tick classifier output.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub label: String,
    /// Agreement-and-distance confidence in [0, 1].
    pub confidence: f32,
    /// Distance to the single nearest sample (infinite when none exist).
    pub nearest_distance: f32,
}

impl ClassificationResult {
    /// Neutral result carrying the observed nearest distance.
    pub fn neutral(nearest_distance: f32) -> Self {
        Self {
            label: NEUTRAL_LABEL.to_string(),
            confidence: 0.0,
            nearest_distance,
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.label == NEUTRAL_LABEL
    }
}

// ── Classifier ─────────────────────────────────────────────

/// Nearest-neighbour classifier over a shared reference dataset.
#[derive(Debug, Clone)]
pub struct KnnClassifier {
    pub config: ClassifierConfig,
    dataset: Arc<ReferenceDataset>,
}

/// Per-label tally among the selected neighbours.
struct LabelTally<'a> {
    label: &'a str,
    votes: usize,
    distance_sum: f32,
}

impl KnnClassifier {
    pub fn new(dataset: Arc<ReferenceDataset>, config: ClassifierConfig) -> Self {
        Self { config, dataset }
    }

    pub fn dataset(&self) -> &ReferenceDataset {
        &self.dataset
    }

    /// Classify a feature vector.
    pub fn classify(&self, features: &FeatureVector) -> ClassificationResult {
        let samples = self.dataset.samples();
        if samples.is_empty() {
            return ClassificationResult::neutral(f32::INFINITY);
        }

        let mut neighbours: Vec<(f32, usize)> = samples
            .iter()
            .enumerate()
            .map(|(i, s)| (features.distance(&s.features), i))
            .collect();

        let k = self.config.k.max(1).min(neighbours.len());
        if k < neighbours.len() {
            neighbours.select_nth_unstable_by(k - 1, |a, b| a.0.total_cmp(&b.0));
            neighbours.truncate(k);
        }
        neighbours.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let nearest = neighbours[0].0;
        if nearest > self.config.reject_distance {
            return ClassificationResult::neutral(nearest);
        }

        // Tallies keep first-seen (nearest-first) order for determinism.
        let mut tallies: Vec<LabelTally> = Vec::new();
        for &(distance, idx) in &neighbours {
            let label = samples[idx].label.as_str();
            match tallies.iter_mut().find(|t| t.label == label) {
                Some(t) => {
                    t.votes += 1;
                    t.distance_sum += distance;
                }
                None => tallies.push(LabelTally {
                    label,
                    votes: 1,
                    distance_sum: distance,
                }),
            }
        }

        let Some(winner) = tallies.iter().reduce(|best, t| {
            if t.votes > best.votes || (t.votes == best.votes && t.distance_sum < best.distance_sum)
            {
                t
            } else {
                best
            }
        }) else {
            return ClassificationResult::neutral(nearest);
        };

        let agreement = winner.votes as f32 / self.config.k.max(1) as f32;
        let mean_distance = winner.distance_sum / winner.votes as f32;
        let confidence = (agreement * (1.0 / (1.0 + mean_distance))).clamp(0.0, 1.0);

        ClassificationResult {
            label: winner.label.to_string(),
            confidence,
            nearest_distance: nearest,
        }
    }

    /// Generate s-expression for IPC config.
    pub fn config_sexp(&self) -> String {
        format!(
            "(:k {} :reject-distance {:.2} :samples {} :labels {})",
            self.config.k,
            self.config.reject_distance,
            self.dataset.len(),
            self.dataset.labels().len(),
        )
    }
}

// ── Tests ──────────────────────────────────────────────────
