//! Landmark normalization into fixed-length feature vectors.
//!
//! Each hand becomes a 63-scalar block: points are translated so the wrist
//! is the origin, then divided by the hand's own size (largest wrist-relative
//! point distance).  The result does not depend on where the hand is in
//! frame or how close it is to the camera.  Left hands occupy the first
//! block, right hands the second; unlabeled hands fill free blocks in
//! detection order.  Absent hands are zero blocks.

use tracing::debug;

use super::landmarks::{DetectedHand, HandLandmark, LANDMARK_COUNT, MAX_HANDS};

/// Scalars per hand block (21 points x 3 coordinates).
pub const HAND_BLOCK_LEN: usize = LANDMARK_COUNT * 3;

/// Total feature vector length (2 hands x 63).
pub const FEATURE_LEN: usize = MAX_HANDS * HAND_BLOCK_LEN;

/// Hands smaller than this (in normalized camera units) are treated as absent.
const MIN_HAND_SCALE: f32 = 1e-6;

// ── FeatureVector ──────────────────────────────────────────

/// A feature vector that is always exactly `FEATURE_LEN` long.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f32>,
}

impl FeatureVector {
    /// All-zero vector (no hands).
    pub fn zeros() -> Self {
        Self {
            values: vec![0.0; FEATURE_LEN],
        }
    }

    /// Wrap raw values; `None` unless exactly `FEATURE_LEN` finite scalars.
    pub fn from_values(values: Vec<f32>) -> Option<Self> {
        if values.len() != FEATURE_LEN || !values.iter().all(|v| v.is_finite()) {
            return None;
        }
        Some(Self { values })
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// The block for one hand slot (0 = left, 1 = right).
    pub fn hand_block(&self, slot: usize) -> &[f32] {
        let start = slot.min(MAX_HANDS - 1) * HAND_BLOCK_LEN;
        &self.values[start..start + HAND_BLOCK_LEN]
    }

    /// Whether a hand slot holds any data.
    pub fn slot_occupied(&self, slot: usize) -> bool {
        self.hand_block(slot).iter().any(|v| *v != 0.0)
    }

    /// Euclidean distance to another vector.
    pub fn distance(&self, other: &FeatureVector) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| {
                let d = a - b;
                d * d
            })
            .sum::<f32>()
            .sqrt()
    }
}

// ── Normalization ──────────────────────────────────────────

/// Normalize up to two detected hands into a feature vector.
///
/// Never fails: unusable hands (wrong landmark count, non-finite points,
/// degenerate size) are skipped and their slot stays zero-filled.
pub fn normalize_hands(hands: &[DetectedHand]) -> FeatureVector {
    let mut slots: [Option<&DetectedHand>; MAX_HANDS] = [None; MAX_HANDS];
    let mut unassigned: Vec<&DetectedHand> = Vec::new();

    for hand in hands {
        if !hand.is_usable() {
            debug!(
                "Skipping hand with {} landmarks (need {})",
                hand.landmarks.len(),
                LANDMARK_COUNT,
            );
            continue;
        }
        match hand.handedness.map(|side| side.slot()) {
            Some(slot) if slots[slot].is_none() => slots[slot] = Some(hand),
            _ => unassigned.push(hand),
        }
    }

    // Detection order fills whatever is left.
    for hand in unassigned {
        match slots.iter_mut().find(|s| s.is_none()) {
            Some(free) => *free = Some(hand),
            None => break,
        }
    }

    let mut values = vec![0.0; FEATURE_LEN];
    for (slot, hand) in slots.iter().enumerate() {
        if let Some(hand) = hand {
            let start = slot * HAND_BLOCK_LEN;
            normalize_block(hand, &mut values[start..start + HAND_BLOCK_LEN]);
        }
    }
    FeatureVector { values }
}

/// Write one hand's wrist-relative, size-normalized coordinates into `out`.
fn normalize_block(hand: &DetectedHand, out: &mut [f32]) {
    let Some(wrist) = hand.landmark(HandLandmark::Wrist).copied() else {
        return;
    };

    let scale = hand
        .landmarks
        .iter()
        .map(|p| wrist.distance(p))
        .fold(0.0_f32, f32::max);
    if !scale.is_finite() || scale < MIN_HAND_SCALE {
        debug!("Degenerate hand size {:.3e}; leaving slot empty", scale);
        return;
    }

    for (i, p) in hand.landmarks.iter().enumerate() {
        out[i * 3] = (p.x - wrist.x) / scale;
        out[i * 3 + 1] = (p.y - wrist.y) / scale;
        out[i * 3 + 2] = (p.z - wrist.z) / scale;
    }
}

// ── Test helpers ───────────────────────────────────────────

/// A plausible open hand with the wrist at `origin`, scaled by `size`.
#[cfg(test)]
pub(crate) fn make_hand(
    side: Option<super::landmarks::HandSide>,
    origin: (f32, f32, f32),
    size: f32,
) -> DetectedHand {
    use super::landmarks::Landmark;

    let landmarks = (0..LANDMARK_COUNT)
        .map(|i| {
            let finger = (i.saturating_sub(1) / 4) as f32;
            let joint = ((i.saturating_sub(1)) % 4 + 1) as f32;
            let (dx, dy) = if i == 0 {
                (0.0, 0.0)
            } else {
                ((finger - 2.0) * 0.2, joint * 0.25)
            };
            Landmark::new(
                origin.0 + dx * size,
                origin.1 - dy * size,
                origin.2 + finger * 0.01 * size,
            )
        })
        .collect();
    DetectedHand::new(landmarks, side)
}

// ── Tests ──────────────────────────────────────────────────
