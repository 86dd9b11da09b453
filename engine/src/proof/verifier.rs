//! Server-side run proof verification.
//!
//! A pure function of the submitted result, the jutsu catalog and the
//! current time.  Rules are checked in a fixed order and the first
//! violation short-circuits with a stable reason string.  Malformed input
//! is never an error: every problem is a `Verdict::Rejected`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::events::{ProofEventType, ProofTunables, RunProof, RunResult};
use crate::catalog::{Jutsu, JutsuCatalog};

/// Slack for comparisons on millisecond-rounded times.
const EPSILON: f64 = 1e-9;

// ── Config ─────────────────────────────────────────────────

/// Verification bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Allowed backwards step between consecutive event times (s).
    pub time_tolerance_sec: f64,
    /// How far in the future the client start may be (s).
    pub max_clock_skew_sec: f64,
    /// Oldest acceptable client start (s).
    pub max_run_age_sec: f64,
    pub min_cooldown_ms: f64,
    pub max_cooldown_ms: f64,
    pub min_vote_hits: f64,
    pub max_vote_hits: f64,
    pub min_vote_confidence: f64,
    pub max_vote_confidence: f64,
    /// Allowed |run_finish - elapsedSeconds| (s).
    pub finish_tolerance_sec: f64,
    pub max_expected_signs: f64,
    /// Event count above which an overflow marker is mandatory.
    pub max_events: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            time_tolerance_sec: 0.05,
            max_clock_skew_sec: 60.0,
            max_run_age_sec: 2.0 * 60.0 * 60.0,
            min_cooldown_ms: 120.0,
            max_cooldown_ms: 1200.0,
            min_vote_hits: 2.0,
            max_vote_hits: 3.0,
            min_vote_confidence: 0.2,
            max_vote_confidence: 0.95,
            finish_tolerance_sec: 1.15,
            max_expected_signs: crate::catalog::MAX_SIGNS as f64,
            max_events: super::recorder::MAX_EVENTS,
        }
    }
}

impl VerifierConfig {
    /// Check that tunables a recorder would declare fall inside the bounds
    /// this verifier accepts.
    pub fn admits(&self, tunables: &ProofTunables) -> Result<(), String> {
        if !in_range(tunables.cooldown_ms, self.min_cooldown_ms, self.max_cooldown_ms) {
            return Err(format!(
                "sign cooldown {} ms outside {}-{}",
                tunables.cooldown_ms, self.min_cooldown_ms, self.max_cooldown_ms
            ));
        }
        let hits = tunables.vote_required_hits as f64;
        if !in_range(hits, self.min_vote_hits, self.max_vote_hits) {
            return Err(format!(
                "required hits {} outside {}-{}",
                hits, self.min_vote_hits, self.max_vote_hits
            ));
        }
        let confidence = f64::from(tunables.vote_min_confidence);
        if !in_range(confidence, self.min_vote_confidence, self.max_vote_confidence) {
            return Err(format!(
                "min confidence {} outside {}-{}",
                tunables.vote_min_confidence, self.min_vote_confidence, self.max_vote_confidence
            ));
        }
        Ok(())
    }
}

// ── Reasons ────────────────────────────────────────────────

/// Stable rejection reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingProof,
    NoEvents,
    EventOverflowUnflagged,
    InvalidExpectedSigns,
    ExpectedSignsMismatch,
    InvalidElapsedTime,
    InvalidClientStart,
    ClientStartInFuture,
    StaleRun,
    InvalidCooldown,
    InvalidVoteHits,
    InvalidVoteConfidence,
    InvalidEventTime,
    NonMonotonicTime,
    InvalidEventType,
    DuplicateRunStart,
    RunModeMismatch,
    SignBeforeRunStart,
    SignAfterRunFinish,
    SignStepMismatch,
    TooManySignEvents,
    SignSequenceMismatch,
    SignGapTooShort,
    InvalidRunFinish,
    DuplicateRunFinish,
    FinishBeforeLastSign,
    UnexpectedOverflowMarker,
    MissingRunStart,
    InsufficientSignEvents,
    SignsLandedMismatch,
    ElapsedTimeMismatch,
    /// Claimed chain digest does not match the events (submission layer).
    ProofHashMismatch,
    /// Run token missing, unknown or already used (submission layer).
    InvalidRunToken,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingProof => "missing_proof",
            Self::NoEvents => "no_events",
            Self::EventOverflowUnflagged => "event_overflow_unflagged",
            Self::InvalidExpectedSigns => "invalid_expected_signs",
            Self::ExpectedSignsMismatch => "expected_signs_mismatch",
            Self::InvalidElapsedTime => "invalid_elapsed_time",
            Self::InvalidClientStart => "invalid_client_start",
            Self::ClientStartInFuture => "client_start_in_future",
            Self::StaleRun => "stale_run",
            Self::InvalidCooldown => "invalid_cooldown",
            Self::InvalidVoteHits => "invalid_vote_hits",
            Self::InvalidVoteConfidence => "invalid_vote_confidence",
            Self::InvalidEventTime => "invalid_event_time",
            Self::NonMonotonicTime => "non_monotonic_time",
            Self::InvalidEventType => "invalid_event_type",
            Self::DuplicateRunStart => "duplicate_run_start",
            Self::RunModeMismatch => "run_mode_mismatch",
            Self::SignBeforeRunStart => "sign_before_run_start",
            Self::SignAfterRunFinish => "sign_after_run_finish",
            Self::SignStepMismatch => "sign_step_mismatch",
            Self::TooManySignEvents => "too_many_sign_events",
            Self::SignSequenceMismatch => "sign_sequence_mismatch",
            Self::SignGapTooShort => "sign_gap_too_short",
            Self::InvalidRunFinish => "invalid_run_finish",
            Self::DuplicateRunFinish => "duplicate_run_finish",
            Self::FinishBeforeLastSign => "finish_before_last_sign",
            Self::UnexpectedOverflowMarker => "unexpected_overflow_marker",
            Self::MissingRunStart => "missing_run_start",
            Self::InsufficientSignEvents => "insufficient_sign_events",
            Self::SignsLandedMismatch => "signs_landed_mismatch",
            Self::ElapsedTimeMismatch => "elapsed_time_mismatch",
            Self::ProofHashMismatch => "proof_hash_mismatch",
            Self::InvalidRunToken => "invalid_run_token",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejection with human-readable detail.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub reason: RejectReason,
    pub detail: String,
}

impl Rejection {
    pub fn new(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

fn reject<T>(reason: RejectReason, detail: impl Into<String>) -> Result<T, Rejection> {
    Err(Rejection::new(reason, detail))
}

// ── Output ─────────────────────────────────────────────────

/// Timing summary of an accepted proof.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofSummary {
    pub hits: u32,
    pub run_start_sec: f64,
    pub run_finish_sec: f64,
    pub last_sign_sec: f64,
}

/// Verification outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted(ProofSummary),
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(r) => Some(r.reason),
        }
    }

    /// Wire representation.
    pub fn to_output(&self) -> VerifierOutput {
        match self {
            Self::Accepted(summary) => VerifierOutput {
                accepted: true,
                reason: None,
                detail: None,
                summary: Some(*summary),
            },
            Self::Rejected(r) => VerifierOutput {
                accepted: false,
                reason: Some(r.reason.as_str().to_string()),
                detail: Some(r.detail.clone()),
                summary: None,
            },
        }
    }
}

/// `{accepted, reason?, detail?, summary?}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifierOutput {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ProofSummary>,
}

// ── Verifier ───────────────────────────────────────────────

/// Stateless proof verifier.
#[derive(Debug, Clone, Default)]
pub struct RunVerifier {
    pub config: VerifierConfig,
}

/// Scan state over the event list.
#[derive(Default)]
struct Scan {
    prev_t: Option<f64>,
    run_start: Option<f64>,
    run_finish: Option<f64>,
    signs: u32,
    last_sign: Option<f64>,
}

impl RunVerifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    /// Verify a submitted run.
    pub fn verify(&self, result: &RunResult, catalog: &JutsuCatalog, now: DateTime<Utc>) -> Verdict {
        match self.check(result, catalog, now) {
            Ok(summary) => Verdict::Accepted(summary),
            Err(rejection) => Verdict::Rejected(rejection),
        }
    }

    fn check(
        &self,
        result: &RunResult,
        catalog: &JutsuCatalog,
        now: DateTime<Utc>,
    ) -> Result<ProofSummary, Rejection> {
        let proof = self.check_shape(result)?;
        let jutsu = catalog.get(&result.jutsu_name);
        let expected = self.check_expected(result, jutsu)?;
        self.check_client_start(proof, now)?;
        self.check_tunables(proof)?;
        let scan = self.scan(result, proof, jutsu, expected)?;

        let Some(run_start) = scan.run_start else {
            return reject(RejectReason::MissingRunStart, "no run_start event");
        };
        let Some(run_finish) = scan.run_finish else {
            return reject(RejectReason::InvalidRunFinish, "no run_finish event");
        };
        if scan.signs != expected {
            return reject(
                RejectReason::InsufficientSignEvents,
                format!("counted {} sign events, expected {}", scan.signs, expected),
            );
        }
        if result.signs_landed != scan.signs as f64 {
            return reject(
                RejectReason::SignsLandedMismatch,
                format!(
                    "signsLanded {} but counted {} sign events",
                    result.signs_landed, scan.signs
                ),
            );
        }
        let drift = (run_finish - result.elapsed_seconds).abs();
        if drift > self.config.finish_tolerance_sec + EPSILON {
            return reject(
                RejectReason::ElapsedTimeMismatch,
                format!(
                    "run_finish at {:.3}s but elapsedSeconds {:.3}",
                    run_finish, result.elapsed_seconds
                ),
            );
        }

        Ok(ProofSummary {
            hits: scan.signs,
            run_start_sec: run_start,
            run_finish_sec: run_finish,
            last_sign_sec: scan.last_sign.unwrap_or(run_start),
        })
    }

    fn check_shape<'a>(&self, result: &'a RunResult) -> Result<&'a RunProof, Rejection> {
        let Some(proof) = result.proof.as_ref() else {
            return reject(RejectReason::MissingProof, "result carries no proof");
        };
        if proof.events.is_empty() {
            return reject(RejectReason::NoEvents, "proof has no events");
        }
        if proof.events.len() > self.config.max_events {
            let marker = proof
                .events
                .iter()
                .any(|e| e.kind == ProofEventType::EventOverflow);
            if !(proof.event_overflow && marker) {
                return reject(
                    RejectReason::EventOverflowUnflagged,
                    format!(
                        "{} events exceed {} without an overflow marker",
                        proof.events.len(),
                        self.config.max_events
                    ),
                );
            }
        }
        Ok(proof)
    }

    fn check_expected(&self, result: &RunResult, jutsu: Option<&Jutsu>) -> Result<u32, Rejection> {
        let n = result.expected_signs;
        if !n.is_finite() || n.fract() != 0.0 || n < 1.0 || n > self.config.max_expected_signs {
            return reject(
                RejectReason::InvalidExpectedSigns,
                format!("expectedSigns {} is not a positive integer", n),
            );
        }
        let expected = n as u32;
        if let Some(jutsu) = jutsu {
            if jutsu.len() != expected as usize {
                return reject(
                    RejectReason::ExpectedSignsMismatch,
                    format!(
                        "{} has {} signs, result declares {}",
                        jutsu.name,
                        jutsu.len(),
                        expected
                    ),
                );
            }
        }
        let elapsed = result.elapsed_seconds;
        if !elapsed.is_finite() || elapsed <= 0.0 {
            return reject(
                RejectReason::InvalidElapsedTime,
                format!("elapsedSeconds {} is not positive", elapsed),
            );
        }
        Ok(expected)
    }

    fn check_client_start(&self, proof: &RunProof, now: DateTime<Utc>) -> Result<(), Rejection> {
        let raw = proof.client_started_at_iso.as_deref().unwrap_or("").trim();
        let Ok(started) = DateTime::parse_from_rfc3339(raw) else {
            return reject(
                RejectReason::InvalidClientStart,
                format!("clientStartedAtIso {:?} is not RFC 3339", raw),
            );
        };
        let offset_sec = (started.with_timezone(&Utc) - now).num_milliseconds() as f64 / 1000.0;
        if offset_sec > self.config.max_clock_skew_sec {
            return reject(
                RejectReason::ClientStartInFuture,
                format!("client start is {:.0}s in the future", offset_sec),
            );
        }
        if -offset_sec > self.config.max_run_age_sec {
            return reject(
                RejectReason::StaleRun,
                format!("client start is {:.0}s old", -offset_sec),
            );
        }
        Ok(())
    }

    fn check_tunables(&self, proof: &RunProof) -> Result<(), Rejection> {
        let c = &self.config;
        if !in_range(proof.cooldown_ms, c.min_cooldown_ms, c.max_cooldown_ms) {
            return reject(
                RejectReason::InvalidCooldown,
                format!("cooldownMs {} outside {}-{}", proof.cooldown_ms, c.min_cooldown_ms, c.max_cooldown_ms),
            );
        }
        let hits = proof.vote_required_hits;
        if !in_range(hits, c.min_vote_hits, c.max_vote_hits) || hits.fract() != 0.0 {
            return reject(
                RejectReason::InvalidVoteHits,
                format!("voteRequiredHits {} outside {}-{}", hits, c.min_vote_hits, c.max_vote_hits),
            );
        }
        let confidence = proof.vote_min_confidence;
        if !in_range(confidence, c.min_vote_confidence, c.max_vote_confidence) {
            return reject(
                RejectReason::InvalidVoteConfidence,
                format!(
                    "voteMinConfidence {} outside {}-{}",
                    confidence, c.min_vote_confidence, c.max_vote_confidence
                ),
            );
        }
        Ok(())
    }

    fn scan(
        &self,
        result: &RunResult,
        proof: &RunProof,
        jutsu: Option<&Jutsu>,
        expected: u32,
    ) -> Result<Scan, Rejection> {
        let min_gap = proof.cooldown_ms / 2.0 / 1000.0;
        let mut scan = Scan::default();

        for (i, event) in proof.events.iter().enumerate() {
            let t = event.t;
            if !t.is_finite() || t < 0.0 {
                return reject(
                    RejectReason::InvalidEventTime,
                    format!("event {} has invalid time {}", i, t),
                );
            }
            if let Some(prev) = scan.prev_t {
                if t < prev - self.config.time_tolerance_sec - EPSILON {
                    return reject(
                        RejectReason::NonMonotonicTime,
                        format!("event {} at {:.3}s precedes {:.3}s", i, t, prev),
                    );
                }
            }
            scan.prev_t = Some(scan.prev_t.map_or(t, |prev| prev.max(t)));

            match event.kind {
                ProofEventType::Unknown => {
                    return reject(
                        RejectReason::InvalidEventType,
                        format!("event {} has an unknown type", i),
                    );
                }
                ProofEventType::RunStart => {
                    if scan.run_start.is_some() {
                        return reject(
                            RejectReason::DuplicateRunStart,
                            format!("second run_start at event {}", i),
                        );
                    }
                    if let Some(mode) = event.mode.as_deref() {
                        if mode != result.mode {
                            return reject(
                                RejectReason::RunModeMismatch,
                                format!("run_start mode {:?}, result mode {:?}", mode, result.mode),
                            );
                        }
                    }
                    if let Some(declared) = event.expected_signs {
                        if declared != expected as f64 {
                            return reject(
                                RejectReason::ExpectedSignsMismatch,
                                format!("run_start declares {} signs, result {}", declared, expected),
                            );
                        }
                    }
                    scan.run_start = Some(t);
                }
                ProofEventType::SignOk => {
                    if scan.run_start.is_none() {
                        return reject(
                            RejectReason::SignBeforeRunStart,
                            format!("sign_ok at event {} before run_start", i),
                        );
                    }
                    if scan.run_finish.is_some() {
                        return reject(
                            RejectReason::SignAfterRunFinish,
                            format!("sign_ok at event {} after run_finish", i),
                        );
                    }
                    let step = scan.signs + 1;
                    if event.step != Some(step as f64) {
                        return reject(
                            RejectReason::SignStepMismatch,
                            format!("event {} step {:?}, expected {}", i, event.step, step),
                        );
                    }
                    if step > expected {
                        return reject(
                            RejectReason::TooManySignEvents,
                            format!("sign step {} exceeds expected {}", step, expected),
                        );
                    }
                    let sign = event.sign.as_deref().unwrap_or("").trim();
                    let sign_ok = match jutsu {
                        Some(j) => j.signs[(step - 1) as usize].eq_ignore_ascii_case(sign),
                        None => !sign.is_empty(),
                    };
                    if !sign_ok {
                        return reject(
                            RejectReason::SignSequenceMismatch,
                            format!("step {} sign {:?} does not match the sequence", step, sign),
                        );
                    }
                    if let Some(last) = scan.last_sign {
                        if t - last + EPSILON < min_gap {
                            return reject(
                                RejectReason::SignGapTooShort,
                                format!(
                                    "step {} only {:.3}s after the previous sign (min {:.3}s)",
                                    step,
                                    t - last,
                                    min_gap
                                ),
                            );
                        }
                    }
                    scan.signs = step;
                    scan.last_sign = Some(t);
                }
                ProofEventType::RunFinish => {
                    if scan.run_start.is_none() {
                        return reject(
                            RejectReason::InvalidRunFinish,
                            format!("run_finish at event {} before run_start", i),
                        );
                    }
                    if scan.run_finish.is_some() {
                        return reject(
                            RejectReason::DuplicateRunFinish,
                            format!("second run_finish at event {}", i),
                        );
                    }
                    if let Some(last) = scan.last_sign {
                        if t < last {
                            return reject(
                                RejectReason::FinishBeforeLastSign,
                                format!("run_finish {:.3}s before last sign {:.3}s", t, last),
                            );
                        }
                    }
                    scan.run_finish = Some(t);
                }
                ProofEventType::EventOverflow => {
                    if !proof.event_overflow {
                        return reject(
                            RejectReason::UnexpectedOverflowMarker,
                            format!("overflow marker at event {} without eventOverflow", i),
                        );
                    }
                }
            }
        }

        Ok(scan)
    }
}

fn in_range(value: f64, min: f64, max: f64) -> bool {
    value.is_finite() && value >= min && value <= max
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::super::events::ProofEvent;
    use super::*;

    fn catalog() -> JutsuCatalog {
        let mut c = JutsuCatalog::builtin();
        c.insert(Jutsu::new("ram_seal", &["ram"])).unwrap();
        c
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn proof(events: Vec<ProofEvent>) -> RunProof {
        RunProof {
            events,
            client_started_at_iso: Some("2026-03-01T11:59:50Z".to_string()),
            cooldown_ms: 350.0,
            vote_required_hits: 3.0,
            vote_min_confidence: 0.45,
            run_token: "tok".to_string(),
            event_overflow: false,
            chain_digest: None,
        }
    }

    /// Scenario one: a single-sign jutsu performed cleanly.
    fn ram_result() -> RunResult {
        let mut start = ProofEvent::run_start("rank", 1);
        start.mode = None;
        RunResult {
            jutsu_name: "ram_seal".to_string(),
            mode: "rank".to_string(),
            elapsed_seconds: 0.65,
            expected_signs: 1.0,
            signs_landed: 1.0,
            proof: Some(proof(vec![
                start,
                ProofEvent::sign_ok(0.6, 1, "ram"),
                ProofEvent::run_finish(0.65),
            ])),
        }
    }

    fn chidori_result(times: [f64; 3], finish: f64) -> RunResult {
        RunResult {
            jutsu_name: "chidori".to_string(),
            mode: "rank".to_string(),
            elapsed_seconds: finish,
            expected_signs: 3.0,
            signs_landed: 3.0,
            proof: Some(proof(vec![
                ProofEvent::run_start("rank", 3),
                ProofEvent::sign_ok(times[0], 1, "ox"),
                ProofEvent::sign_ok(times[1], 2, "hare"),
                ProofEvent::sign_ok(times[2], 3, "monkey"),
                ProofEvent::run_finish(finish),
            ])),
        }
    }

    fn events_mut(result: &mut RunResult) -> &mut Vec<ProofEvent> {
        &mut result.proof.as_mut().unwrap().events
    }

    fn verify(result: &RunResult) -> Verdict {
        RunVerifier::default().verify(result, &catalog(), now())
    }

    fn reason(result: &RunResult) -> Option<&'static str> {
        verify(result).reason().map(|r| r.as_str())
    }

    #[test]
    fn test_scenario_single_sign_accepted() {
        let verdict = verify(&ram_result());
        match verdict {
            Verdict::Accepted(summary) => {
                assert_eq!(summary.hits, 1);
                assert_eq!(summary.run_start_sec, 0.0);
                assert_eq!(summary.last_sign_sec, 0.6);
                assert_eq!(summary.run_finish_sec, 0.65);
            }
            other => panic!("expected acceptance, got {:?}", other),
        }
    }

    #[test]
    fn test_scenario_wrong_sign() {
        let mut result = ram_result();
        events_mut(&mut result)[1].sign = Some("boar".to_string());
        assert_eq!(reason(&result), Some("sign_sequence_mismatch"));
    }

    #[test]
    fn test_scenario_missing_finish() {
        let mut result = ram_result();
        events_mut(&mut result).pop();
        assert_eq!(reason(&result), Some("invalid_run_finish"));
    }

    #[test]
    fn test_scenario_gap_too_short() {
        let result = chidori_result([0.40, 0.45, 1.0], 1.2);
        assert_eq!(reason(&result), Some("sign_gap_too_short"));
    }

    #[test]
    fn test_gap_exactly_half_cooldown_accepted() {
        let result = chidori_result([0.400, 0.575, 0.750], 0.9);
        assert!(verify(&result).is_accepted());
    }

    #[test]
    fn test_full_sequence_accepted() {
        let result = chidori_result([0.5, 1.1, 1.8], 2.0);
        assert!(verify(&result).is_accepted());
    }

    #[test]
    fn test_missing_and_empty_proof() {
        let mut result = ram_result();
        result.proof = None;
        assert_eq!(reason(&result), Some("missing_proof"));

        let mut result = ram_result();
        events_mut(&mut result).clear();
        assert_eq!(reason(&result), Some("no_events"));
    }

    #[test]
    fn test_oversized_log_needs_flag_and_marker() {
        let mut result = ram_result();
        let finish = events_mut(&mut result).pop().unwrap();
        for _ in 0..300 {
            events_mut(&mut result).push(ProofEvent::run_finish(0.65));
        }
        events_mut(&mut result).push(finish);
        assert_eq!(reason(&result), Some("event_overflow_unflagged"));

        result.proof.as_mut().unwrap().event_overflow = true;
        assert_eq!(reason(&result), Some("event_overflow_unflagged"));

        events_mut(&mut result).insert(3, ProofEvent::overflow(0.6));
        // Past the overflow gate; the padding is caught by the scan.
        assert_eq!(reason(&result), Some("duplicate_run_finish"));
    }

    #[test]
    fn test_expected_signs_rules() {
        let mut result = ram_result();
        result.expected_signs = 1.5;
        assert_eq!(reason(&result), Some("invalid_expected_signs"));
        result.expected_signs = 0.0;
        assert_eq!(reason(&result), Some("invalid_expected_signs"));
        result.expected_signs = f64::NAN;
        assert_eq!(reason(&result), Some("invalid_expected_signs"));
        result.expected_signs = 65.0;
        assert_eq!(reason(&result), Some("invalid_expected_signs"));
        result.expected_signs = 2.0;
        assert_eq!(reason(&result), Some("expected_signs_mismatch"));
    }

    #[test]
    fn test_run_start_declared_count_must_match() {
        let mut result = ram_result();
        result.jutsu_name = "unlisted".to_string();
        events_mut(&mut result)[0].expected_signs = Some(2.0);
        assert_eq!(reason(&result), Some("expected_signs_mismatch"));
    }

    #[test]
    fn test_invalid_elapsed() {
        let mut result = ram_result();
        result.elapsed_seconds = -1.0;
        assert_eq!(reason(&result), Some("invalid_elapsed_time"));
    }

    #[test]
    fn test_client_start_rules() {
        let mut result = ram_result();
        result.proof.as_mut().unwrap().client_started_at_iso = Some("yesterday".to_string());
        assert_eq!(reason(&result), Some("invalid_client_start"));

        result.proof.as_mut().unwrap().client_started_at_iso = None;
        assert_eq!(reason(&result), Some("invalid_client_start"));

        let future = (now() + Duration::seconds(120)).to_rfc3339();
        result.proof.as_mut().unwrap().client_started_at_iso = Some(future);
        assert_eq!(reason(&result), Some("client_start_in_future"));

        let skewed = (now() + Duration::seconds(30)).to_rfc3339();
        result.proof.as_mut().unwrap().client_started_at_iso = Some(skewed);
        assert!(verify(&result).is_accepted());

        let stale = (now() - Duration::hours(3)).to_rfc3339();
        result.proof.as_mut().unwrap().client_started_at_iso = Some(stale);
        assert_eq!(reason(&result), Some("stale_run"));
    }

    #[test]
    fn test_tunable_ranges() {
        let mut result = ram_result();
        result.proof.as_mut().unwrap().cooldown_ms = 100.0;
        assert_eq!(reason(&result), Some("invalid_cooldown"));
        result.proof.as_mut().unwrap().cooldown_ms = f64::NAN;
        assert_eq!(reason(&result), Some("invalid_cooldown"));

        let mut result = ram_result();
        result.proof.as_mut().unwrap().vote_required_hits = 4.0;
        assert_eq!(reason(&result), Some("invalid_vote_hits"));
        result.proof.as_mut().unwrap().vote_required_hits = 2.5;
        assert_eq!(reason(&result), Some("invalid_vote_hits"));

        let mut result = ram_result();
        result.proof.as_mut().unwrap().vote_min_confidence = 0.99;
        assert_eq!(reason(&result), Some("invalid_vote_confidence"));
    }

    #[test]
    fn test_non_monotonic_rejected() {
        let result = chidori_result([0.5, 1.2, 1.0], 2.0);
        assert_eq!(reason(&result), Some("non_monotonic_time"));
    }

    #[test]
    fn test_small_backstep_tolerated_then_gap_checked() {
        // 0.03s backwards is inside tolerance but is still a too-short gap.
        let result = chidori_result([0.5, 1.0, 0.97], 2.0);
        assert_eq!(reason(&result), Some("sign_gap_too_short"));
    }

    #[test]
    fn test_invalid_event_time_and_type() {
        let mut result = ram_result();
        events_mut(&mut result)[1].t = f64::NAN;
        assert_eq!(reason(&result), Some("invalid_event_time"));

        let mut result = ram_result();
        events_mut(&mut result)[1].t = -0.1;
        assert_eq!(reason(&result), Some("invalid_event_time"));

        let mut result = ram_result();
        events_mut(&mut result)[1].kind = ProofEventType::Unknown;
        assert_eq!(reason(&result), Some("invalid_event_type"));
    }

    #[test]
    fn test_run_start_rules() {
        let mut result = ram_result();
        events_mut(&mut result).insert(1, ProofEvent::run_start("rank", 1));
        assert_eq!(reason(&result), Some("duplicate_run_start"));

        let mut result = ram_result();
        events_mut(&mut result)[0].mode = Some("practice".to_string());
        assert_eq!(reason(&result), Some("run_mode_mismatch"));

        let mut result = ram_result();
        events_mut(&mut result).remove(0);
        assert_eq!(reason(&result), Some("sign_before_run_start"));
    }

    #[test]
    fn test_missing_run_start_without_signs() {
        let mut result = ram_result();
        result.proof.as_mut().unwrap().events = vec![ProofEvent::overflow(0.1)];
        result.proof.as_mut().unwrap().event_overflow = true;
        assert_eq!(reason(&result), Some("missing_run_start"));
    }

    #[test]
    fn test_sign_rules() {
        let mut result = ram_result();
        events_mut(&mut result)[1].step = Some(2.0);
        assert_eq!(reason(&result), Some("sign_step_mismatch"));

        let mut result = ram_result();
        events_mut(&mut result).insert(2, ProofEvent::sign_ok(0.62, 2, "ram"));
        assert_eq!(reason(&result), Some("too_many_sign_events"));

        let mut result = ram_result();
        events_mut(&mut result).push(ProofEvent::sign_ok(0.7, 2, "ram"));
        assert_eq!(reason(&result), Some("sign_after_run_finish"));
    }

    #[test]
    fn test_unknown_jutsu_needs_nonempty_signs() {
        let mut result = ram_result();
        result.jutsu_name = "secret_technique".to_string();
        assert!(verify(&result).is_accepted());
        events_mut(&mut result)[1].sign = Some("  ".to_string());
        assert_eq!(reason(&result), Some("sign_sequence_mismatch"));
    }

    #[test]
    fn test_finish_rules() {
        let mut result = ram_result();
        events_mut(&mut result).push(ProofEvent::run_finish(0.66));
        assert_eq!(reason(&result), Some("duplicate_run_finish"));

        let mut result = ram_result();
        events_mut(&mut result)[2].t = 0.58;
        result.elapsed_seconds = 0.58;
        assert_eq!(reason(&result), Some("finish_before_last_sign"));

        let mut result = ram_result();
        let finish = events_mut(&mut result).remove(2);
        events_mut(&mut result).insert(0, finish);
        events_mut(&mut result)[0].t = 0.0;
        assert_eq!(reason(&result), Some("invalid_run_finish"));
    }

    #[test]
    fn test_unflagged_overflow_marker() {
        let mut result = ram_result();
        events_mut(&mut result).insert(2, ProofEvent::overflow(0.6));
        assert_eq!(reason(&result), Some("unexpected_overflow_marker"));
    }

    #[test]
    fn test_sign_count_must_equal_expected() {
        let mut result = chidori_result([0.5, 1.1, 1.8], 2.0);
        events_mut(&mut result).remove(3);
        assert_eq!(reason(&result), Some("insufficient_sign_events"));
    }

    #[test]
    fn test_signs_landed_must_match_count() {
        let mut result = ram_result();
        result.signs_landed = 2.0;
        assert_eq!(reason(&result), Some("signs_landed_mismatch"));
    }

    #[test]
    fn test_elapsed_tolerance() {
        let mut result = ram_result();
        result.elapsed_seconds = 0.65 + 1.15;
        assert!(verify(&result).is_accepted());
        result.elapsed_seconds = 0.65 + 1.2;
        assert_eq!(reason(&result), Some("elapsed_time_mismatch"));
    }

    #[test]
    fn test_output_shape() {
        let accepted = serde_json::to_value(verify(&ram_result()).to_output()).unwrap();
        assert_eq!(accepted["accepted"], true);
        assert_eq!(accepted["summary"]["hits"], 1);
        assert_eq!(accepted["summary"]["runFinishSec"], 0.65);
        assert!(accepted.get("reason").is_none());

        let mut result = ram_result();
        result.proof = None;
        let rejected = serde_json::to_value(verify(&result).to_output()).unwrap();
        assert_eq!(rejected["accepted"], false);
        assert_eq!(rejected["reason"], "missing_proof");
        assert!(rejected.get("summary").is_none());
    }

    #[test]
    fn test_garbage_json_never_panics() {
        for raw in [
            "{}",
            r#"{"proof": 5}"#,
            r#"{"proof": {"events": "x"}}"#,
            r#"{"expectedSigns": "3", "proof": {"events": [null, {"t": "x"}]}}"#,
            r#"{"jutsuName": "chidori", "expectedSigns": 3, "elapsedSeconds": 1, "proof": {"events": [{"t": 0, "type": "run_start"}], "clientStartedAtIso": "2026-03-01T11:59:00Z", "cooldownMs": "350", "voteRequiredHits": 3, "voteMinConfidence": 0.5}}"#,
        ] {
            let result = RunResult::from_json(raw).unwrap();
            assert!(!verify(&result).is_accepted(), "{} accepted", raw);
        }
    }

    #[test]
    fn test_admits_tunable_bounds() {
        let config = VerifierConfig::default();
        let tunables = |cooldown_ms: f64, hits: usize, confidence: f32| ProofTunables {
            cooldown_ms,
            vote_required_hits: hits,
            vote_min_confidence: confidence,
        };
        assert!(config.admits(&tunables(350.0, 3, 0.45)).is_ok());
        assert!(config.admits(&tunables(120.0, 2, 0.2)).is_ok());
        assert!(config.admits(&tunables(1200.0, 3, 0.95)).is_ok());

        assert!(config.admits(&tunables(119.0, 3, 0.45)).is_err());
        assert!(config.admits(&tunables(1201.0, 3, 0.45)).is_err());
        assert!(config.admits(&tunables(350.0, 1, 0.45)).is_err());
        assert!(config.admits(&tunables(350.0, 4, 0.45)).is_err());
        assert!(config.admits(&tunables(350.0, 3, 0.19)).is_err());
        assert!(config.admits(&tunables(350.0, 3, 0.96)).is_err());
        assert!(config.admits(&tunables(f64::NAN, 3, 0.45)).is_err());
    }
}
