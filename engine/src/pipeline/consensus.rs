//! Temporal consensus voting over classifier output.
//!
//! Keeps a short, time-decayed window of recent labels and only emits a
//! sign once enough recent ticks agree on it.  The window is bounded both
//! by entry count and by age; stale entries are pruned before every tally.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::knn::NEUTRAL_LABEL;

// ── Config ─────────────────────────────────────────────────

/// Voting window tuning.  `required_hits` and `min_confidence` are
/// declared in every run proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Maximum live entries.
    pub window_size: usize,
    /// Entries older than this (ms) are dropped.
    pub ttl_ms: f64,
    /// Hits needed for a confidence-qualified accept.
    pub required_hits: usize,
    /// Minimum average confidence for a confidence-qualified accept.
    pub min_confidence: f32,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            window_size: 5,
            ttl_ms: 700.0,
            required_hits: 3,
            min_confidence: 0.45,
        }
    }
}

// ── Entries and output ─────────────────────────────────────

/// One observed classification.
#[derive(Debug, Clone, PartialEq)]
struct VoteEntry {
    pub label: String,
    pub confidence: f32,
    pub observed_at_ms: f64,
}

/// Voter output for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilizedSign {
    pub label: String,
    /// Average confidence of the winning label's entries.
    pub confidence: f32,
    /// Number of window entries agreeing with the label.
    pub hits: usize,
}

impl StabilizedSign {
    pub fn neutral() -> Self {
        Self {
            label: NEUTRAL_LABEL.to_string(),
            confidence: 0.0,
            hits: 0,
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.label == NEUTRAL_LABEL
    }
}

// ── ConsensusVoter ─────────────────────────────────────────

/// Bounded, time-decayed vote window.
#[derive(Debug)]
pub struct ConsensusVoter {
    pub config: ConsensusConfig,
    window: VecDeque<VoteEntry>,
}

impl ConsensusVoter {
    pub fn new(config: ConsensusConfig) -> Self {
        Self {
            window: VecDeque::with_capacity(config.window_size),
            config,
        }
    }

    /// Feed one classification and return the stabilized sign.
    ///
    /// `allowed` is false when detection is gated (lighting, hand quorum);
    /// a gated or neutral observation clears the window.
    pub fn observe(
        &mut self,
        label: &str,
        confidence: f32,
        allowed: bool,
        now_ms: f64,
    ) -> StabilizedSign {
        self.prune(now_ms);

        if !allowed || label == NEUTRAL_LABEL {
            if !self.window.is_empty() {
                debug!("Vote window cleared (allowed={}, label={})", allowed, label);
            }
            self.window.clear();
            return StabilizedSign::neutral();
        }

        self.window.push_back(VoteEntry {
            label: label.to_string(),
            confidence,
            observed_at_ms: now_ms,
        });
        while self.window.len() > self.config.window_size.max(1) {
            self.window.pop_front();
        }

        self.tally()
    }

    /// Drop entries older than the TTL.
    fn prune(&mut self, now_ms: f64) {
        let ttl = self.config.ttl_ms;
        self.window.retain(|e| now_ms - e.observed_at_ms <= ttl);
    }

    fn tally(&self) -> StabilizedSign {
        // (label, hits, confidence sum) in first-seen order.
        let mut counts: Vec<(&str, usize, f32)> = Vec::new();
        for entry in &self.window {
            match counts.iter_mut().find(|c| c.0 == entry.label) {
                Some(c) => {
                    c.1 += 1;
                    c.2 += entry.confidence;
                }
                None => counts.push((entry.label.as_str(), 1, entry.confidence)),
            }
        }

        let Some(&(label, hits, sum)) = counts.iter().reduce(|best, c| {
            if c.1 > best.1 || (c.1 == best.1 && c.2 > best.2) {
                c
            } else {
                best
            }
        }) else {
            return StabilizedSign::neutral();
        };

        let average = sum / hits as f32;
        let qualified = hits >= self.config.required_hits && average >= self.config.min_confidence;
        let saturated = hits >= self.config.window_size.max(1);

        if qualified || saturated {
            StabilizedSign {
                label: label.to_string(),
                confidence: average,
                hits,
            }
        } else {
            StabilizedSign::neutral()
        }
    }

    /// Clear the window.
    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        let labels: Vec<&str> = self.window.iter().map(|e| e.label.as_str()).collect();
        format!(
            "(:window-len {} :labels ({}))",
            self.window.len(),
            labels
                .iter()
                .map(|l| format!("\"{}\"", l))
                .collect::<Vec<_>>()
                .join(" "),
        )
    }

    /// Generate s-expression for IPC config.
    pub fn config_sexp(&self) -> String {
        format!(
            "(:window-size {} :ttl-ms {:.0} :required-hits {} :min-confidence {:.2})",
            self.config.window_size,
            self.config.ttl_ms,
            self.config.required_hits,
            self.config.min_confidence,
        )
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn voter() -> ConsensusVoter {
        ConsensusVoter::new(ConsensusConfig::default())
    }

    #[test]
    fn test_default_config() {
        let c = ConsensusConfig::default();
        assert_eq!(c.window_size, 5);
        assert_eq!(c.ttl_ms, 700.0);
        assert_eq!(c.required_hits, 3);
        assert!((c.min_confidence - 0.45).abs() < f32::EPSILON);
    }

    #[test]
    fn test_three_confident_hits_accept() {
        let mut v = voter();
        assert!(v.observe("tiger", 0.8, true, 0.0).is_neutral());
        assert!(v.observe("tiger", 0.8, true, 65.0).is_neutral());
        let out = v.observe("tiger", 0.8, true, 130.0);
        assert_eq!(out.label, "tiger");
        assert_eq!(out.hits, 3);
        assert!((out.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_low_confidence_needs_full_window() {
        let mut v = voter();
        for i in 0..4 {
            let out = v.observe("ram", 0.3, true, i as f64 * 65.0);
            assert!(out.is_neutral(), "tick {} should not accept", i);
        }
        let out = v.observe("ram", 0.3, true, 260.0);
        assert_eq!(out.label, "ram");
        assert_eq!(out.hits, 5);
    }

    #[test]
    fn test_window_bounded() {
        let mut v = voter();
        for i in 0..12 {
            v.observe("ox", 0.9, true, i as f64 * 10.0);
            assert!(v.window_len() <= 5);
        }
        assert_eq!(v.window_len(), 5);
    }

    #[test]
    fn test_stale_entries_pruned() {
        let mut v = voter();
        v.observe("dog", 0.9, true, 0.0);
        v.observe("dog", 0.9, true, 50.0);
        // Both prior entries are older than 700 ms.
        let out = v.observe("dog", 0.9, true, 800.0);
        assert!(out.is_neutral());
        assert_eq!(v.window_len(), 1);
    }

    #[test]
    fn test_entry_at_exact_ttl_survives() {
        let mut v = voter();
        v.observe("dog", 0.9, true, 0.0);
        v.observe("dog", 0.9, true, 100.0);
        let out = v.observe("dog", 0.9, true, 700.0);
        assert_eq!(out.label, "dog");
    }

    #[test]
    fn test_disallowed_clears_window() {
        let mut v = voter();
        v.observe("hare", 0.9, true, 0.0);
        v.observe("hare", 0.9, true, 65.0);
        let out = v.observe("hare", 0.9, false, 130.0);
        assert!(out.is_neutral());
        assert_eq!(v.window_len(), 0);
    }

    #[test]
    fn test_neutral_label_clears_window() {
        let mut v = voter();
        v.observe("hare", 0.9, true, 0.0);
        v.observe("hare", 0.9, true, 65.0);
        assert!(v.observe(NEUTRAL_LABEL, 0.0, true, 130.0).is_neutral());
        assert_eq!(v.window_len(), 0);
    }

    #[test]
    fn test_majority_by_count_then_confidence() {
        let mut v = voter();
        v.observe("bird", 0.5, true, 0.0);
        v.observe("snake", 0.9, true, 10.0);
        v.observe("bird", 0.5, true, 20.0);
        v.observe("snake", 0.6, true, 30.0);
        // Snake has the larger confidence sum but bird has more hits.
        let out = v.observe("bird", 0.5, true, 40.0);
        assert_eq!(out.label, "bird");
        assert_eq!(out.hits, 3);
    }

    #[test]
    fn test_tie_on_count_uses_confidence_sum() {
        let mut config = ConsensusConfig::default();
        config.required_hits = 2;
        let mut v = ConsensusVoter::new(config);
        v.observe("bird", 0.5, true, 0.0);
        v.observe("snake", 0.9, true, 10.0);
        v.observe("bird", 0.5, true, 20.0);
        let out = v.observe("snake", 0.9, true, 30.0);
        assert_eq!(out.label, "snake");
        assert_eq!(out.hits, 2);
    }

    #[test]
    fn test_reset() {
        let mut v = voter();
        v.observe("rat", 0.9, true, 0.0);
        v.reset();
        assert_eq!(v.window_len(), 0);
    }

    #[test]
    fn test_sexp() {
        let mut v = voter();
        v.observe("rat", 0.9, true, 0.0);
        assert!(v.status_sexp().contains(":window-len 1"));
        assert!(v.status_sexp().contains("\"rat\""));
        let config = v.config_sexp();
        assert!(config.contains(":window-size 5"));
        assert!(config.contains(":ttl-ms 700"));
        assert!(config.contains(":min-confidence 0.45"));
    }
}
