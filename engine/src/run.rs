//! Competitive run driver.
//!
//! A run walks a jutsu's sign sequence.  A stabilized sign lands only when
//! it is the next expected sign and the sign cooldown has elapsed since the
//! previous landed sign.  Every landed sign is written to the run recorder;
//! `finish` seals the proof into a submittable `RunResult`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::Jutsu;
use crate::pipeline::consensus::{ConsensusConfig, StabilizedSign};
use crate::proof::{ProofTunables, RunRecorder, RunResult};

/// Run parameters.  `sign_cooldown_ms` is declared in the proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub sign_cooldown_ms: f64,
    pub mode: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            sign_cooldown_ms: 350.0,
            mode: "rank".to_string(),
        }
    }
}

/// One timed attempt at a jutsu.
#[derive(Debug)]
pub struct CompetitiveRun {
    jutsu: Jutsu,
    recorder: RunRecorder,
    cooldown_ms: f64,
    started_ms: f64,
    landed: usize,
    last_landed_ms: Option<f64>,
}

impl CompetitiveRun {
    pub fn start(
        jutsu: &Jutsu,
        config: &RunConfig,
        consensus: &ConsensusConfig,
        run_token: &str,
        now_ms: f64,
        client_started_at: DateTime<Utc>,
    ) -> Self {
        let tunables = ProofTunables {
            cooldown_ms: config.sign_cooldown_ms,
            vote_required_hits: consensus.required_hits,
            vote_min_confidence: consensus.min_confidence,
        };
        let recorder = RunRecorder::start(
            &config.mode,
            jutsu.len(),
            run_token,
            tunables,
            now_ms,
            client_started_at,
        );
        info!("Run started: {} ({} signs)", jutsu.name, jutsu.len());
        Self {
            jutsu: jutsu.clone(),
            recorder,
            cooldown_ms: config.sign_cooldown_ms,
            started_ms: now_ms,
            landed: 0,
            last_landed_ms: None,
        }
    }

    /// Sign the run is waiting for, if any.
    pub fn next_sign(&self) -> Option<&str> {
        self.jutsu.signs.get(self.landed).map(String::as_str)
    }

    /// Feed a stabilized sign.  Returns the step number when it landed.
    pub fn on_stabilized(&mut self, sign: &StabilizedSign, now_ms: f64) -> Option<u32> {
        if sign.is_neutral() {
            return None;
        }
        let expected = self.next_sign()?;
        if !sign.label.eq_ignore_ascii_case(expected) {
            return None;
        }
        if let Some(last) = self.last_landed_ms {
            if now_ms - last < self.cooldown_ms {
                debug!("Sign {} inside cooldown, ignored", sign.label);
                return None;
            }
        }

        let expected = expected.to_string();
        let step = self.recorder.record_sign(now_ms, &expected)?;
        self.landed += 1;
        self.last_landed_ms = Some(now_ms);
        info!(
            "Sign landed: {} ({}/{})",
            expected,
            self.landed,
            self.jutsu.len()
        );
        Some(step)
    }

    pub fn is_complete(&self) -> bool {
        self.landed >= self.jutsu.len()
    }

    /// (landed, total)
    pub fn progress(&self) -> (usize, usize) {
        (self.landed, self.jutsu.len())
    }

    pub fn jutsu(&self) -> &Jutsu {
        &self.jutsu
    }

    pub fn run_token(&self) -> &str {
        self.recorder.run_token()
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self, now_ms: f64) -> String {
        format!(
            "(:jutsu \"{}\" :landed {} :total {} :next \"{}\" :elapsed {:.3} :complete {} :token \"{}\")",
            self.jutsu.name,
            self.landed,
            self.jutsu.len(),
            self.next_sign().unwrap_or(""),
            self.recorder.elapsed_secs(now_ms),
            if self.is_complete() { "t" } else { "nil" },
            self.run_token(),
        )
    }

    /// Seal the run into a result for submission.
    pub fn finish(self, now_ms: f64) -> RunResult {
        let mode = self.recorder.mode().to_string();
        let proof = self.recorder.finish(now_ms);
        let elapsed = proof
            .events
            .last()
            .map(|e| e.t)
            .unwrap_or_else(|| ((now_ms - self.started_ms) / 1000.0).max(0.0));
        info!(
            "Run finished: {} {}/{} in {:.3}s",
            self.jutsu.name,
            self.landed,
            self.jutsu.len(),
            elapsed
        );
        RunResult {
            jutsu_name: self.jutsu.name.clone(),
            mode,
            elapsed_seconds: elapsed,
            expected_signs: self.jutsu.len() as f64,
            signs_landed: self.landed as f64,
            proof: Some(proof),
        }
    }
}
