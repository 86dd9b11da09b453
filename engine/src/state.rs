//! Engine state: the single struct owning the pipeline, the active run and
//! the submission queue.
//!
//! Everything is mutated from one execution context (the tick loop or the
//! control surface), passed around as `&mut EngineState`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::JutsuCatalog;
use crate::config::{ConfigError, EngineConfig};
use crate::pipeline::{
    ConsensusVoter, DetectedHand, FrameSample, KnnClassifier, LightingGate, ReferenceDataset,
    SignSession, TickOutcome,
};
use crate::proof::{MemorySink, RunVerifier, SubmissionQueue, SubmissionStatus};
use crate::run::CompetitiveRun;

/// Errors from run control.
#[derive(Debug, Error, PartialEq)]
pub enum RunError {
    #[error("unknown jutsu: {0}")]
    UnknownJutsu(String),
    #[error("a run is already in progress ({0})")]
    AlreadyRunning(String),
    #[error("no run in progress")]
    NotRunning,
}

/// Central engine state.
pub struct EngineState {
    pub config: EngineConfig,
    pub session: SignSession,
    pub catalog: Arc<JutsuCatalog>,
    pub run: Option<CompetitiveRun>,
    pub submissions: SubmissionQueue<MemorySink>,
    /// Timestamp of the most recent tick (ms).
    pub clock_ms: f64,
    /// Token of the most recently finished run.
    pub last_token: Option<String>,
}

impl EngineState {
    pub fn new(config: EngineConfig, dataset: Arc<ReferenceDataset>) -> Result<Self, ConfigError> {
        let catalog = Arc::new(config.catalog()?);
        let session = SignSession::new(
            config.session.clone(),
            KnnClassifier::new(dataset, config.classifier.clone()),
            LightingGate::new(config.lighting.clone()),
            ConsensusVoter::new(config.consensus.clone()),
        );
        let submissions = SubmissionQueue::new(
            RunVerifier::new(config.verifier.clone()),
            Arc::clone(&catalog),
            MemorySink::default(),
        );
        info!(
            "Engine state initialized: {} jutsu, {} reference samples",
            catalog.len(),
            session.classifier.dataset().len()
        );
        Ok(Self {
            config,
            session,
            catalog,
            run: None,
            submissions,
            clock_ms: 0.0,
            last_token: None,
        })
    }

    /// Drive one animation frame through the pipeline and the active run.
    ///
    /// A run that completes on this tick is finished and enqueued.
    pub fn process_tick(
        &mut self,
        now_ms: f64,
        hands: &[DetectedHand],
        frame: Option<FrameSample<'_>>,
    ) -> Option<TickOutcome> {
        self.clock_ms = now_ms;
        let outcome = self.session.tick(now_ms, hands, frame)?;

        let completed = match self.run.as_mut() {
            Some(run) => {
                run.on_stabilized(&outcome.stabilized, now_ms);
                run.is_complete()
            }
            None => false,
        };
        if completed {
            self.finish_run(now_ms);
        }
        Some(outcome)
    }

    /// Start a run; returns its token.
    pub fn start_run(
        &mut self,
        jutsu_name: &str,
        now_ms: f64,
        wall_clock: DateTime<Utc>,
    ) -> Result<String, RunError> {
        if let Some(run) = &self.run {
            return Err(RunError::AlreadyRunning(run.jutsu().name.clone()));
        }
        let jutsu = self
            .catalog
            .get(jutsu_name)
            .ok_or_else(|| RunError::UnknownJutsu(jutsu_name.to_string()))?
            .clone();

        let token = self.submissions.issue_token();
        self.session.voter.reset();
        self.run = Some(CompetitiveRun::start(
            &jutsu,
            &self.config.run,
            &self.session.voter.config,
            &token,
            now_ms,
            wall_clock,
        ));
        Ok(token)
    }

    /// Finish the active run and enqueue its result.
    pub fn finish_run(&mut self, now_ms: f64) -> Option<SubmissionStatus> {
        let run = self.run.take()?;
        let result = run.finish(now_ms);
        let token = result.run_token().map(str::to_string);
        let status = self.submissions.enqueue(result);
        self.last_token = token;
        Some(status)
    }

    /// Discard the active run without submitting it.
    pub fn abort_run(&mut self) -> Result<(), RunError> {
        match self.run.take() {
            Some(run) => {
                warn!("Run aborted: {}", run.jutsu().name);
                self.submissions.revoke(run.run_token());
                Ok(())
            }
            None => Err(RunError::NotRunning),
        }
    }

    /// Verify every pending submission.
    pub fn drain_submissions(&mut self, now: DateTime<Utc>) -> Vec<(String, SubmissionStatus)> {
        self.submissions.drain(now)
    }

    /// Reset the recognition session and drop any active run.
    pub fn reset(&mut self) {
        self.session.reset();
        if let Some(run) = self.run.take() {
            self.submissions.revoke(run.run_token());
            info!("Active run discarded on session reset");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::features::make_hand;
    use crate::pipeline::{normalize_hands, HandSide, TrainingSample};

    fn hands() -> Vec<DetectedHand> {
        vec![
            make_hand(Some(HandSide::Left), (0.3, 0.6, 0.0), 0.1),
            make_hand(Some(HandSide::Right), (0.7, 0.6, 0.0), 0.1),
        ]
    }

    fn state() -> EngineState {
        let features = normalize_hands(&hands());
        let dataset = ReferenceDataset::from_samples(vec![
            TrainingSample {
                label: "ram".to_string(),
                features,
            };
            3
        ]);
        let mut config = EngineConfig::default();
        config
            .jutsu
            .push(crate::catalog::Jutsu::new("ram_seal", &["ram"]));
        EngineState::new(config, Arc::new(dataset)).unwrap()
    }

    #[test]
    fn test_start_run_rules() {
        let mut s = state();
        assert_eq!(
            s.start_run("rasengan", 0.0, Utc::now()),
            Err(RunError::UnknownJutsu("rasengan".to_string()))
        );
        let token = s.start_run("ram_seal", 0.0, Utc::now()).unwrap();
        assert!(!token.is_empty());
        assert!(matches!(
            s.start_run("chidori", 0.0, Utc::now()),
            Err(RunError::AlreadyRunning(_))
        ));
    }

    #[test]
    fn test_run_completes_from_ticks() {
        let mut s = state();
        let started = Utc::now();
        let token = s.start_run("ram_seal", 0.0, started).unwrap();
        let hands = hands();
        let mut t = 0.0;
        while s.run.is_some() && t < 2000.0 {
            s.process_tick(t, &hands, None);
            t += 16.0;
        }
        assert!(s.run.is_none());
        assert_eq!(s.last_token.as_deref(), Some(token.as_str()));
        assert_eq!(s.submissions.status(&token), Some(&SubmissionStatus::Pending));

        let settled = s.drain_submissions(started + chrono::Duration::seconds(1));
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].1.as_str(), "accepted");
        assert_eq!(s.submissions.sink().entries.len(), 1);
    }

    #[test]
    fn test_abort_and_reset() {
        let mut s = state();
        assert_eq!(s.abort_run(), Err(RunError::NotRunning));
        let aborted = s.start_run("ram_seal", 0.0, Utc::now()).unwrap();
        assert!(s.abort_run().is_ok());
        assert!(s.run.is_none());
        assert!(!s.submissions.revoke(&aborted));

        let discarded = s.start_run("ram_seal", 0.0, Utc::now()).unwrap();
        s.reset();
        assert!(s.run.is_none());
        assert!(s.session.last_outcome().is_none());
        assert!(!s.submissions.revoke(&discarded));
    }
}
