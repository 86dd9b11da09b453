//! Sign session controller.
//!
//! Owns every mutable piece of the recognition pipeline for one camera
//! session: classifier, lighting gate, vote window, detection cadence and
//! frame-rate counter.  `tick` is driven from each animation callback;
//! detection only runs when the detection interval has elapsed.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::consensus::{ConsensusVoter, StabilizedSign};
use super::features::normalize_hands;
use super::frame_rate::FrameRate;
use super::knn::{ClassificationResult, KnnClassifier};
use super::landmarks::{usable_hand_count, DetectedHand};
use super::lighting::{FrameSample, LightingGate, LightingStatus};

/// Session cadence and quorum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Minimum time between detection passes (ms).
    pub detect_interval_ms: f64,
    /// Usable hands needed before a classification may count.
    pub required_hands: usize,
    /// Frame intervals kept for FPS statistics.
    pub fps_window: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            detect_interval_ms: 65.0,
            required_hands: 2,
            fps_window: 120,
        }
    }
}

/// Result of one detection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    /// Classifier output before any gating.
    pub raw: ClassificationResult,
    /// Classifier output after the lighting gate and hand quorum.
    pub gated: ClassificationResult,
    /// Voter output.
    pub stabilized: StabilizedSign,
    pub lighting: LightingStatus,
    /// Usable hands seen this pass.
    pub hands: usize,
}

/// Owned recognition pipeline for one session.
pub struct SignSession {
    pub config: SessionConfig,
    pub classifier: KnnClassifier,
    pub lighting: LightingGate,
    pub voter: ConsensusVoter,
    pub frame_rate: FrameRate,
    last_detect_ms: Option<f64>,
    last_outcome: Option<TickOutcome>,
}

impl SignSession {
    pub fn new(
        config: SessionConfig,
        classifier: KnnClassifier,
        lighting: LightingGate,
        voter: ConsensusVoter,
    ) -> Self {
        let frame_rate = FrameRate::new(config.fps_window);
        Self {
            config,
            classifier,
            lighting,
            voter,
            frame_rate,
            last_detect_ms: None,
            last_outcome: None,
        }
    }

    /// Whether a detection pass is due at `now_ms`.
    pub fn detection_due(&self, now_ms: f64) -> bool {
        match self.last_detect_ms {
            None => true,
            Some(last) => now_ms - last >= self.config.detect_interval_ms,
        }
    }

    /// Process one animation frame.
    ///
    /// Returns `None` when detection was throttled on this frame.
    pub fn tick(
        &mut self,
        now_ms: f64,
        hands: &[DetectedHand],
        frame: Option<FrameSample<'_>>,
    ) -> Option<TickOutcome> {
        self.frame_rate.record_frame(now_ms);
        if let Some(frame) = frame {
            self.lighting.maybe_sample(now_ms, &frame);
        }

        if !self.detection_due(now_ms) {
            return None;
        }
        self.last_detect_ms = Some(now_ms);
        self.frame_rate.record_detection();

        let lighting = self.lighting.status();
        let usable = usable_hand_count(hands);

        let outcome = if usable < self.config.required_hands {
            debug!(
                "Hand quorum not met ({} of {}), vote window reset",
                usable, self.config.required_hands
            );
            self.voter.reset();
            let raw = ClassificationResult::neutral(f32::INFINITY);
            TickOutcome {
                gated: raw.clone(),
                raw,
                stabilized: StabilizedSign::neutral(),
                lighting,
                hands: usable,
            }
        } else {
            let features = normalize_hands(hands);
            let raw = self.classifier.classify(&features);
            let allowed = self.lighting.passes();
            let gated = if allowed {
                raw.clone()
            } else {
                debug!("Lighting gate {}: forcing neutral", lighting.as_str());
                ClassificationResult::neutral(raw.nearest_distance)
            };
            let stabilized = self
                .voter
                .observe(&gated.label, gated.confidence, allowed, now_ms);
            TickOutcome {
                raw,
                gated,
                stabilized,
                lighting,
                hands: usable,
            }
        };

        self.last_outcome = Some(outcome.clone());
        Some(outcome)
    }

    pub fn last_outcome(&self) -> Option<&TickOutcome> {
        self.last_outcome.as_ref()
    }

    /// Restore a fresh session state.  Configuration and dataset are kept.
    pub fn reset(&mut self) {
        self.lighting.reset();
        self.voter.reset();
        self.frame_rate.reset();
        self.last_detect_ms = None;
        self.last_outcome = None;
        debug!("Sign session reset");
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        let (label, confidence, hands, sign) = match &self.last_outcome {
            Some(o) => (
                o.gated.label.as_str(),
                o.gated.confidence,
                o.hands,
                o.stabilized.label.as_str(),
            ),
            None => ("none", 0.0, 0, "none"),
        };
        format!(
            "(:label \"{}\" :confidence {:.2} :sign \"{}\" :hands {} :lighting :{} :window-len {} :frames {})",
            label,
            confidence,
            sign,
            hands,
            self.lighting.status().as_str(),
            self.voter.window_len(),
            self.frame_rate.stats_sexp(),
        )
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::consensus::ConsensusConfig;
    use super::super::dataset::{ReferenceDataset, TrainingSample};
    use super::super::features::make_hand;
    use super::super::knn::ClassifierConfig;
    use super::super::landmarks::HandSide;
    use super::super::lighting::{LightingConfig, OwnedFrame};
    use super::*;

    fn two_hands() -> Vec<DetectedHand> {
        vec![
            make_hand(Some(HandSide::Left), (0.3, 0.6, 0.0), 0.1),
            make_hand(Some(HandSide::Right), (0.7, 0.6, 0.0), 0.1),
        ]
    }

    fn session() -> SignSession {
        let features = normalize_hands(&two_hands());
        let dataset = ReferenceDataset::from_samples(vec![
            TrainingSample {
                label: "tiger".to_string(),
                features,
            };
            3
        ]);
        SignSession::new(
            SessionConfig::default(),
            KnnClassifier::new(Arc::new(dataset), ClassifierConfig::default()),
            LightingGate::new(LightingConfig::default()),
            ConsensusVoter::new(ConsensusConfig::default()),
        )
    }

    fn bright() -> OwnedFrame {
        let mut rgba = Vec::new();
        for y in 0..8 {
            for x in 0..8 {
                let v = if (x / 2 + y / 2) % 2 == 0 { 80 } else { 180 };
                rgba.extend_from_slice(&[v, v, v, 255]);
            }
        }
        OwnedFrame {
            width: 8,
            height: 8,
            rgba,
        }
    }

    #[test]
    fn test_detection_throttled() {
        let mut s = session();
        let hands = two_hands();
        assert!(s.tick(0.0, &hands, None).is_some());
        assert!(s.tick(16.0, &hands, None).is_none());
        assert!(s.tick(48.0, &hands, None).is_none());
        assert!(s.tick(65.0, &hands, None).is_some());
        assert_eq!(s.frame_rate.total_frames, 4);
        assert_eq!(s.frame_rate.detect_frames, 2);
    }

    #[test]
    fn test_stabilizes_after_three_passes() {
        let mut s = session();
        let hands = two_hands();
        let frame = bright();
        let mut last = None;
        for i in 0..3 {
            last = s.tick(i as f64 * 65.0, &hands, Some(frame.as_sample()));
        }
        let outcome = last.unwrap();
        assert_eq!(outcome.raw.label, "tiger");
        assert_eq!(outcome.stabilized.label, "tiger");
        assert_eq!(outcome.hands, 2);
        assert_eq!(outcome.lighting, LightingStatus::Good);
    }

    #[test]
    fn test_single_hand_resets_window() {
        let mut s = session();
        let hands = two_hands();
        s.tick(0.0, &hands, None);
        s.tick(65.0, &hands, None);
        assert_eq!(s.voter.window_len(), 2);

        let outcome = s.tick(130.0, &hands[..1], None).unwrap();
        assert_eq!(outcome.hands, 1);
        assert!(outcome.gated.is_neutral());
        assert!(outcome.raw.nearest_distance.is_infinite());
        assert_eq!(s.voter.window_len(), 0);
    }

    #[test]
    fn test_low_light_gates_to_neutral() {
        let mut s = session();
        let hands = two_hands();
        let dark = OwnedFrame::solid(16, 12, [30, 30, 30]);
        for i in 0..6 {
            let outcome = s
                .tick(i as f64 * 65.0, &hands, Some(dark.as_sample()))
                .unwrap();
            assert_eq!(outcome.lighting, LightingStatus::LowLight);
            assert_eq!(outcome.raw.label, "tiger");
            assert!(outcome.gated.is_neutral());
            assert!(outcome.stabilized.is_neutral());
        }
        assert_eq!(s.voter.window_len(), 0);
    }

    #[test]
    fn test_reset_restores_fresh_state() {
        let mut s = session();
        let hands = two_hands();
        let dark = OwnedFrame::solid(8, 8, [10, 10, 10]);
        s.tick(0.0, &hands, Some(dark.as_sample()));
        s.tick(10.0, &hands, None);
        s.reset();
        assert!(s.last_outcome().is_none());
        assert!(s.lighting.passes());
        assert_eq!(s.voter.window_len(), 0);
        assert_eq!(s.frame_rate.total_frames, 0);
        assert!(s.detection_due(10.0));
    }

    #[test]
    fn test_status_sexp() {
        let mut s = session();
        assert!(s.status_sexp().contains(":label \"none\""));
        s.tick(0.0, &two_hands(), None);
        let sexp = s.status_sexp();
        assert!(sexp.contains(":label \"tiger\""));
        assert!(sexp.contains(":hands 2"));
        assert!(sexp.contains(":lighting :good"));
    }
}
