//! Run proof wire types.
//!
//! Field names follow the client JSON (camelCase on the proof and result,
//! snake_case inside events).  Every field decodes leniently; see
//! `coerce` for the rules.

use serde::{Deserialize, Serialize, Serializer};

use super::coerce;

// ── Event type ─────────────────────────────────────────────

/// Proof event kind.  Unrecognised kinds decode as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProofEventType {
    RunStart,
    SignOk,
    RunFinish,
    EventOverflow,
    #[default]
    Unknown,
}

impl ProofEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunStart => "run_start",
            Self::SignOk => "sign_ok",
            Self::RunFinish => "run_finish",
            Self::EventOverflow => "event_overflow",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "run_start" => Self::RunStart,
            "sign_ok" => Self::SignOk,
            "run_finish" => Self::RunFinish,
            "event_overflow" => Self::EventOverflow,
            _ => Self::Unknown,
        }
    }
}

impl Serialize for ProofEventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ── ProofEvent ─────────────────────────────────────────────

/// One timestamped proof event.  `t` is seconds since run start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofEvent {
    #[serde(default = "coerce::nan", deserialize_with = "coerce::number")]
    pub t: f64,
    #[serde(rename = "type", default, deserialize_with = "coerce::event_kind")]
    pub kind: ProofEventType,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "coerce::opt_number"
    )]
    pub step: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "coerce::opt_string"
    )]
    pub sign: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "coerce::opt_string"
    )]
    pub mode: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "coerce::opt_number"
    )]
    pub expected_signs: Option<f64>,
}

impl ProofEvent {
    fn bare(t: f64, kind: ProofEventType) -> Self {
        Self {
            t,
            kind,
            step: None,
            sign: None,
            mode: None,
            expected_signs: None,
        }
    }

    pub fn run_start(mode: &str, expected_signs: usize) -> Self {
        Self {
            mode: Some(mode.to_string()),
            expected_signs: Some(expected_signs as f64),
            ..Self::bare(0.0, ProofEventType::RunStart)
        }
    }

    pub fn sign_ok(t: f64, step: u32, sign: &str) -> Self {
        Self {
            step: Some(step as f64),
            sign: Some(sign.to_string()),
            ..Self::bare(t, ProofEventType::SignOk)
        }
    }

    pub fn run_finish(t: f64) -> Self {
        Self::bare(t, ProofEventType::RunFinish)
    }

    pub fn overflow(t: f64) -> Self {
        Self::bare(t, ProofEventType::EventOverflow)
    }

    /// Placeholder for an element that could not be decoded.
    pub(crate) fn malformed() -> Self {
        Self::bare(f64::NAN, ProofEventType::Unknown)
    }
}

// ── Proof and result ───────────────────────────────────────

/// Voting and cooldown parameters a run was recorded under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProofTunables {
    pub cooldown_ms: f64,
    pub vote_required_hits: usize,
    pub vote_min_confidence: f32,
}

/// Client-recorded proof of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunProof {
    #[serde(default, deserialize_with = "coerce::events")]
    pub events: Vec<ProofEvent>,
    #[serde(default, deserialize_with = "coerce::opt_string")]
    pub client_started_at_iso: Option<String>,
    #[serde(default = "coerce::nan", deserialize_with = "coerce::number")]
    pub cooldown_ms: f64,
    #[serde(default = "coerce::nan", deserialize_with = "coerce::number")]
    pub vote_required_hits: f64,
    #[serde(default = "coerce::nan", deserialize_with = "coerce::number")]
    pub vote_min_confidence: f64,
    #[serde(default, deserialize_with = "coerce::string")]
    pub run_token: String,
    #[serde(default, deserialize_with = "coerce::flag")]
    pub event_overflow: bool,
    /// Hex hash-chain digest over `events`, when the client supplies one.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "coerce::opt_string"
    )]
    pub chain_digest: Option<String>,
}

/// A finished run as submitted for scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    #[serde(default, deserialize_with = "coerce::string")]
    pub jutsu_name: String,
    #[serde(default, deserialize_with = "coerce::string")]
    pub mode: String,
    #[serde(default = "coerce::nan", deserialize_with = "coerce::number")]
    pub elapsed_seconds: f64,
    #[serde(default = "coerce::nan", deserialize_with = "coerce::number")]
    pub expected_signs: f64,
    #[serde(default = "coerce::nan", deserialize_with = "coerce::number")]
    pub signs_landed: f64,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "coerce::proof"
    )]
    pub proof: Option<RunProof>,
}

impl RunResult {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Run token carried by the proof, if any.
    pub fn run_token(&self) -> Option<&str> {
        self.proof
            .as_ref()
            .map(|p| p.run_token.trim())
            .filter(|t| !t.is_empty())
    }
}
