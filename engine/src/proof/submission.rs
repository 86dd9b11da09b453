//! Idempotent run submission.
//!
//! Run tokens are issued when a run starts and are single-use.  A finished
//! result is `enqueue`d (never verified inline) and later `drain`ed through
//! the verifier.  Resubmitting a token returns its existing status, so a
//! retried submission is never counted twice.  Only accepted runs reach the
//! leaderboard sink.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::chain::ProofChain;
use super::events::{ProofEvent, RunResult};
use super::verifier::{ProofSummary, RejectReason, Rejection, RunVerifier, Verdict, VerifierOutput};
use crate::catalog::JutsuCatalog;

// ── Leaderboard boundary ───────────────────────────────────

/// Errors from a leaderboard backend.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("leaderboard unavailable: {0}")]
    Unavailable(String),
}

/// Descriptive fields stored next to a leaderboard score.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    pub jutsu_name: String,
    pub expected_signs: u32,
    pub summary: ProofSummary,
    pub client_started_at_iso: Option<String>,
    pub verified_at: DateTime<Utc>,
}

/// One verified leaderboard write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub mode: String,
    /// Verified run time in seconds.
    pub score_time: f64,
    pub run_token: String,
    pub events: Vec<ProofEvent>,
    /// Hex hash-chain digest recomputed over `events`.
    pub proof_hash: String,
    pub metadata: EntryMetadata,
}

/// Leaderboard write boundary.
pub trait LeaderboardSink {
    fn write(&mut self, entry: LeaderboardEntry) -> Result<(), SinkError>;
}

/// In-memory sink.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub entries: Vec<LeaderboardEntry>,
}

impl LeaderboardSink for MemorySink {
    fn write(&mut self, entry: LeaderboardEntry) -> Result<(), SinkError> {
        self.entries.push(entry);
        Ok(())
    }
}

// ── Status ─────────────────────────────────────────────────

/// Lifecycle of one submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionStatus {
    Pending,
    Accepted {
        summary: ProofSummary,
        proof_hash: String,
    },
    Rejected {
        reason: RejectReason,
        detail: String,
    },
}

impl SubmissionStatus {
    fn rejected(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self::Rejected {
            reason,
            detail: detail.into(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted { .. } => "accepted",
            Self::Rejected { .. } => "rejected",
        }
    }

    /// Verifier-shaped output for a settled submission.
    pub fn to_output(&self) -> Option<VerifierOutput> {
        match self {
            Self::Pending => None,
            Self::Accepted { summary, .. } => Some(Verdict::Accepted(*summary).to_output()),
            Self::Rejected { reason, detail } => Some(
                Verdict::Rejected(Rejection {
                    reason: *reason,
                    detail: detail.clone(),
                })
                .to_output(),
            ),
        }
    }

    /// Generate s-expression for IPC status.
    pub fn sexp(&self) -> String {
        match self {
            Self::Pending => "(:state :pending)".to_string(),
            Self::Accepted {
                summary,
                proof_hash,
            } => format!(
                "(:state :accepted :hits {} :time {:.3} :proof-hash \"{}\")",
                summary.hits,
                summary.run_finish_sec - summary.run_start_sec,
                proof_hash
            ),
            Self::Rejected { reason, detail } => format!(
                "(:state :rejected :reason \"{}\" :detail \"{}\")",
                reason,
                detail.replace('\\', "\\\\").replace('"', "\\\"")
            ),
        }
    }
}

// ── Queue ──────────────────────────────────────────────────

/// Token-keyed submission queue in front of the verifier and sink.
pub struct SubmissionQueue<S> {
    verifier: RunVerifier,
    catalog: Arc<JutsuCatalog>,
    sink: S,
    issued: HashSet<String>,
    statuses: HashMap<String, SubmissionStatus>,
    pending: VecDeque<(String, RunResult)>,
}

impl<S: LeaderboardSink> SubmissionQueue<S> {
    pub fn new(verifier: RunVerifier, catalog: Arc<JutsuCatalog>, sink: S) -> Self {
        Self {
            verifier,
            catalog,
            sink,
            issued: HashSet::new(),
            statuses: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    /// Issue a fresh single-use run token.
    pub fn issue_token(&mut self) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        self.issued.insert(token.clone());
        token
    }

    /// Withdraw an issued token whose run will never be submitted.
    pub fn revoke(&mut self, token: &str) -> bool {
        let revoked = self.issued.remove(token);
        if revoked {
            debug!("Run token {} revoked", token);
        }
        revoked
    }

    /// Accept a finished run for later verification.
    ///
    /// Returns the existing status when the token was already submitted.
    pub fn enqueue(&mut self, result: RunResult) -> SubmissionStatus {
        let Some(token) = result.run_token().map(str::to_string) else {
            warn!("Submission without a run token rejected");
            return SubmissionStatus::rejected(RejectReason::InvalidRunToken, "missing run token");
        };
        if let Some(existing) = self.statuses.get(&token) {
            info!("Duplicate submission for {} ({})", token, existing.as_str());
            return existing.clone();
        }
        if !self.issued.remove(&token) {
            warn!("Submission with unknown run token {} rejected", token);
            return SubmissionStatus::rejected(RejectReason::InvalidRunToken, "unknown run token");
        }
        self.statuses.insert(token.clone(), SubmissionStatus::Pending);
        self.pending.push_back((token, result));
        SubmissionStatus::Pending
    }

    /// Verify every pending submission.  Returns the settled statuses.
    pub fn drain(&mut self, now: DateTime<Utc>) -> Vec<(String, SubmissionStatus)> {
        let mut settled = Vec::with_capacity(self.pending.len());
        while let Some((token, result)) = self.pending.pop_front() {
            let status = self.settle(&token, &result, now);
            self.statuses.insert(token.clone(), status.clone());
            settled.push((token, status));
        }
        settled
    }

    fn settle(&mut self, token: &str, result: &RunResult, now: DateTime<Utc>) -> SubmissionStatus {
        let chain = result
            .proof
            .as_ref()
            .map(|p| ProofChain::digest_events(&p.events))
            .unwrap_or_default();

        if let Some(claimed) = result.proof.as_ref().and_then(|p| p.chain_digest.as_deref()) {
            if !chain.matches_hex(claimed) {
                warn!("Run {} rejected: proof_hash_mismatch", token);
                return SubmissionStatus::rejected(
                    RejectReason::ProofHashMismatch,
                    "claimed chain digest does not match events",
                );
            }
        }

        match self.verifier.verify(result, &self.catalog, now) {
            Verdict::Rejected(rejection) => {
                warn!(
                    "Run {} rejected: {} ({})",
                    token, rejection.reason, rejection.detail
                );
                SubmissionStatus::Rejected {
                    reason: rejection.reason,
                    detail: rejection.detail,
                }
            }
            Verdict::Accepted(summary) => {
                let proof_hash = chain.head_hex();
                let entry = LeaderboardEntry {
                    mode: result.mode.clone(),
                    score_time: summary.run_finish_sec - summary.run_start_sec,
                    run_token: token.to_string(),
                    events: result
                        .proof
                        .as_ref()
                        .map(|p| p.events.clone())
                        .unwrap_or_default(),
                    proof_hash: proof_hash.clone(),
                    metadata: EntryMetadata {
                        jutsu_name: result.jutsu_name.clone(),
                        expected_signs: result.expected_signs as u32,
                        summary,
                        client_started_at_iso: result
                            .proof
                            .as_ref()
                            .and_then(|p| p.client_started_at_iso.clone()),
                        verified_at: now,
                    },
                };
                info!(
                    "Run {} accepted: {} in {:.3}s",
                    token, result.jutsu_name, entry.score_time
                );
                if let Err(e) = self.sink.write(entry) {
                    warn!("Leaderboard write for {} failed: {}", token, e);
                }
                SubmissionStatus::Accepted {
                    summary,
                    proof_hash,
                }
            }
        }
    }

    pub fn status(&self, token: &str) -> Option<&SubmissionStatus> {
        self.statuses.get(token)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn catalog(&self) -> &JutsuCatalog {
        &self.catalog
    }
}
