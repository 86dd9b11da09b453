//! Jutsu engine: hand-sign recognition pipeline and run-proof verifier.
//!
//! The pipeline turns detector landmarks into stabilized sign labels; a
//! competitive run records landed signs into a hash-chained proof that the
//! verifier replays before anything reaches the leaderboard.

pub mod catalog;
pub mod config;
pub mod ipc;
pub mod pipeline;
pub mod proof;
pub mod run;
pub mod state;
