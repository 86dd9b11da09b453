//! Append-only hash chain over proof events.
//!
//! `digest_n = BLAKE3(digest_{n-1} || preimage(event_n))` with a zero
//! genesis digest.  The preimage is a fixed-order, domain-separated byte
//! encoding of the event with every field length-prefixed, so both sides
//! compute the same chain without depending on JSON key order or float
//! formatting.

use super::events::ProofEvent;

/// Domain separator for event preimages.
const EVENT_DOMAIN_SEPARATOR: &[u8] = b"jutsu-engine:proof-event:v2\n";

/// 32-byte chain digest.
pub type Digest = [u8; 32];

/// Digest before any event is appended.
pub const GENESIS: Digest = [0u8; 32];

/// Running hash chain.
#[derive(Debug, Clone)]
pub struct ProofChain {
    head: Digest,
    len: usize,
}

impl Default for ProofChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ProofChain {
    pub fn new() -> Self {
        Self {
            head: GENESIS,
            len: 0,
        }
    }

    /// Fold one event into the chain and return the new head.
    pub fn append(&mut self, event: &ProofEvent) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.head);
        hasher.update(EVENT_DOMAIN_SEPARATOR);
        Self::hash_event(&mut hasher, event);
        self.head = *hasher.finalize().as_bytes();
        self.len += 1;
        self.head
    }

    fn hash_event(hasher: &mut blake3::Hasher, event: &ProofEvent) {
        Self::hash_field(hasher, event.kind.as_str());
        Self::hash_field(hasher, &format!("{:.3}", event.t));
        Self::hash_optional(hasher, event.step.map(|s| format!("{}", s)).as_deref());
        Self::hash_optional(hasher, event.sign.as_deref());
        Self::hash_optional(hasher, event.mode.as_deref());
        Self::hash_optional(
            hasher,
            event.expected_signs.map(|n| format!("{}", n)).as_deref(),
        );
    }

    /// Hash a field as a little-endian u64 length followed by its bytes.
    fn hash_field(hasher: &mut blake3::Hasher, value: &str) {
        hasher.update(&(value.len() as u64).to_le_bytes());
        hasher.update(value.as_bytes());
    }

    /// Hash an optional field with a presence tag.
    fn hash_optional(hasher: &mut blake3::Hasher, field: Option<&str>) {
        match field {
            Some(value) => {
                hasher.update(&[0x01]);
                Self::hash_field(hasher, value);
            }
            None => {
                hasher.update(&[0x00]);
            }
        }
    }

    pub fn head(&self) -> Digest {
        self.head
    }

    /// Lowercase hex encoding of the head.
    pub fn head_hex(&self) -> String {
        blake3::Hash::from(self.head).to_hex().to_string()
    }

    /// Number of events folded in.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Recompute the chain over a full event list.
    pub fn digest_events(events: &[ProofEvent]) -> Self {
        let mut chain = Self::new();
        for event in events {
            chain.append(event);
        }
        chain
    }

    /// Whether a claimed hex digest matches this chain's head.
    pub fn matches_hex(&self, claimed: &str) -> bool {
        self.head_hex().eq_ignore_ascii_case(claimed.trim())
    }
}
