//! Client-side run recorder.
//!
//! Builds the append-only event log for one timed run.  Times are seconds
//! since the run started, rounded to milliseconds and never decreasing.
//! The log is capped: past the cap, signs are dropped and a single
//! overflow marker is written, but the finish event is always appended.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info, warn};

use super::chain::ProofChain;
use super::events::{ProofEvent, ProofTunables, RunProof};
use crate::pipeline::NEUTRAL_LABEL;

/// Event count past which signs are no longer recorded.
pub const MAX_EVENTS: usize = 256;

/// In-progress proof for one run.
#[derive(Debug)]
pub struct RunRecorder {
    mode: String,
    run_token: String,
    tunables: ProofTunables,
    client_started_at: DateTime<Utc>,
    started_ms: f64,
    events: Vec<ProofEvent>,
    chain: ProofChain,
    sign_count: u32,
    last_sign: Option<String>,
    last_t: f64,
    overflow: bool,
}

impl RunRecorder {
    /// Start recording; appends `run_start` at t = 0.
    pub fn start(
        mode: &str,
        expected_signs: usize,
        run_token: &str,
        tunables: ProofTunables,
        now_ms: f64,
        client_started_at: DateTime<Utc>,
    ) -> Self {
        let mut recorder = Self {
            mode: mode.to_string(),
            run_token: run_token.to_string(),
            tunables,
            client_started_at,
            started_ms: now_ms,
            events: Vec::with_capacity(expected_signs + 2),
            chain: ProofChain::new(),
            sign_count: 0,
            last_sign: None,
            last_t: 0.0,
            overflow: false,
        };
        recorder.push(ProofEvent::run_start(mode, expected_signs));
        info!(
            "Run recording started: mode={} expected_signs={} token={}",
            mode, expected_signs, run_token
        );
        recorder
    }

    /// Seconds since start, millisecond-rounded and clamped non-decreasing.
    fn event_time(&mut self, now_ms: f64) -> f64 {
        let raw = ((now_ms - self.started_ms).round() / 1000.0).max(0.0);
        let t = if raw.is_finite() { raw.max(self.last_t) } else { self.last_t };
        self.last_t = t;
        t
    }

    fn push(&mut self, event: ProofEvent) {
        self.chain.append(&event);
        self.events.push(event);
    }

    /// Record a stabilized sign.
    ///
    /// Returns the step number when a `sign_ok` event was appended.  Neutral
    /// labels, repeats of the last recorded sign and signs past the event cap
    /// are not recorded.
    pub fn record_sign(&mut self, now_ms: f64, sign: &str) -> Option<u32> {
        if sign.is_empty() || sign == NEUTRAL_LABEL {
            return None;
        }
        if self.last_sign.as_deref() == Some(sign) {
            return None;
        }
        if self.overflow {
            return None;
        }

        let t = self.event_time(now_ms);
        if self.events.len() >= MAX_EVENTS {
            warn!(
                "Run event log full ({} events), further signs suppressed",
                self.events.len()
            );
            self.overflow = true;
            self.push(ProofEvent::overflow(t));
            return None;
        }

        self.sign_count += 1;
        self.last_sign = Some(sign.to_string());
        self.push(ProofEvent::sign_ok(t, self.sign_count, sign));
        debug!("Recorded sign {} at step {} (t={:.3})", sign, self.sign_count, t);
        Some(self.sign_count)
    }

    /// Append `run_finish` and seal the proof.
    pub fn finish(mut self, now_ms: f64) -> RunProof {
        let t = self.event_time(now_ms);
        self.push(ProofEvent::run_finish(t));
        info!(
            "Run recording finished: {} signs in {:.3}s ({} events)",
            self.sign_count,
            t,
            self.events.len()
        );
        RunProof {
            chain_digest: Some(self.chain.head_hex()),
            events: self.events,
            client_started_at_iso: Some(
                self.client_started_at
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            cooldown_ms: self.tunables.cooldown_ms,
            vote_required_hits: self.tunables.vote_required_hits as f64,
            vote_min_confidence: self.tunables.vote_min_confidence as f64,
            run_token: self.run_token,
            event_overflow: self.overflow,
        }
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn run_token(&self) -> &str {
        &self.run_token
    }

    pub fn sign_count(&self) -> u32 {
        self.sign_count
    }

    pub fn events(&self) -> &[ProofEvent] {
        &self.events
    }

    pub fn is_overflowed(&self) -> bool {
        self.overflow
    }

    /// Seconds since start at `now_ms`, without recording anything.
    pub fn elapsed_secs(&self, now_ms: f64) -> f64 {
        ((now_ms - self.started_ms) / 1000.0).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::events::ProofEventType;
    use super::*;

    fn tunables() -> ProofTunables {
        ProofTunables {
            cooldown_ms: 350.0,
            vote_required_hits: 3,
            vote_min_confidence: 0.45,
        }
    }

    fn recorder(expected: usize) -> RunRecorder {
        RunRecorder::start("rank", expected, "tok-1", tunables(), 1000.0, Utc::now())
    }

    #[test]
    fn test_start_event() {
        let rec = recorder(3);
        let events = rec.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ProofEventType::RunStart);
        assert_eq!(events[0].t, 0.0);
        assert_eq!(events[0].mode.as_deref(), Some("rank"));
        assert_eq!(events[0].expected_signs, Some(3.0));
    }

    #[test]
    fn test_signs_get_consecutive_steps() {
        let mut rec = recorder(3);
        assert_eq!(rec.record_sign(1400.0, "ox"), Some(1));
        assert_eq!(rec.record_sign(1800.0, "hare"), Some(2));
        assert_eq!(rec.record_sign(2300.0, "monkey"), Some(3));
        let proof = rec.finish(2500.0);
        let steps: Vec<f64> = proof.events.iter().filter_map(|e| e.step).collect();
        assert_eq!(steps, vec![1.0, 2.0, 3.0]);
        assert_eq!(proof.events.last().unwrap().kind, ProofEventType::RunFinish);
        assert_eq!(proof.events.last().unwrap().t, 1.5);
    }

    #[test]
    fn test_repeat_and_neutral_ignored() {
        let mut rec = recorder(2);
        assert_eq!(rec.record_sign(1100.0, "ox"), Some(1));
        assert_eq!(rec.record_sign(1200.0, "ox"), None);
        assert_eq!(rec.record_sign(1300.0, NEUTRAL_LABEL), None);
        assert_eq!(rec.record_sign(1400.0, "ox"), None);
        assert_eq!(rec.record_sign(1500.0, "dog"), Some(2));
        assert_eq!(rec.sign_count(), 2);
    }

    #[test]
    fn test_times_rounded_to_millis() {
        let mut rec = recorder(1);
        rec.record_sign(1000.0 + 1234.4, "ox");
        assert_eq!(rec.events()[1].t, 1.234);
    }

    #[test]
    fn test_times_never_decrease() {
        let mut rec = recorder(2);
        rec.record_sign(2000.0, "ox");
        rec.record_sign(1500.0, "dog");
        assert_eq!(rec.events()[2].t, 1.0);
        let proof = rec.finish(900.0);
        assert_eq!(proof.events.last().unwrap().t, 1.0);
    }

    #[test]
    fn test_overflow_marker_and_finish() {
        let mut rec = recorder(64);
        let mut now = 1000.0;
        for i in 0..400 {
            now += 10.0;
            rec.record_sign(now, if i % 2 == 0 { "ox" } else { "dog" });
        }
        assert!(rec.is_overflowed());
        let proof = rec.finish(now + 10.0);
        assert!(proof.event_overflow);
        assert_eq!(proof.events.len(), MAX_EVENTS + 2);
        let markers = proof
            .events
            .iter()
            .filter(|e| e.kind == ProofEventType::EventOverflow)
            .count();
        assert_eq!(markers, 1);
        assert_eq!(proof.events.last().unwrap().kind, ProofEventType::RunFinish);
    }

    #[test]
    fn test_proof_declares_tunables_and_digest() {
        let mut rec = recorder(1);
        rec.record_sign(1500.0, "ox");
        let proof = rec.finish(2000.0);
        assert_eq!(proof.cooldown_ms, 350.0);
        assert_eq!(proof.vote_required_hits, 3.0);
        assert!((proof.vote_min_confidence - 0.45).abs() < 1e-6);
        assert_eq!(proof.run_token, "tok-1");
        assert!(!proof.event_overflow);
        let digest = proof.chain_digest.clone().unwrap();
        assert!(ProofChain::digest_events(&proof.events).matches_hex(&digest));
        assert!(proof
            .client_started_at_iso
            .as_deref()
            .is_some_and(|s| s.ends_with('Z')));
    }
}
