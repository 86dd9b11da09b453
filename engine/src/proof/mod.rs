//! Run proof protocol.
//!
//! - `events`: wire types shared by client and server
//! - `chain`: append-only hash chain over events
//! - `recorder`: client-side event log for one run
//! - `verifier`: deterministic accept/reject with stable reasons
//! - `submission`: token-keyed pending/accepted/rejected queue

mod coerce;

pub mod chain;
pub mod events;
pub mod recorder;
pub mod submission;
pub mod verifier;

pub use chain::ProofChain;
pub use events::{ProofEvent, ProofEventType, ProofTunables, RunProof, RunResult};
pub use recorder::{RunRecorder, MAX_EVENTS};
pub use submission::{
    LeaderboardEntry, LeaderboardSink, MemorySink, SinkError, SubmissionQueue, SubmissionStatus,
};
pub use verifier::{
    ProofSummary, RejectReason, Rejection, RunVerifier, Verdict, VerifierConfig, VerifierOutput,
};
