//! Hand landmark types and the detector boundary adapter.
//!
//! Models the 21 landmarks per hand reported by the external landmark
//! detector.  Detector output arrives in several historical shapes; the
//! `RawDetection` adapter accepts all of them and produces canonical
//! `DetectedHand` values so nothing downstream branches on shape.

use serde::Deserialize;
use tracing::debug;

// ── Landmark definitions ───────────────────────────────────

/// The 21 hand landmarks, in detector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandLandmark {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexMcp,
    IndexPip,
    IndexDip,
    IndexTip,
    MiddleMcp,
    MiddlePip,
    MiddleDip,
    MiddleTip,
    RingMcp,
    RingPip,
    RingDip,
    RingTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Number of landmarks per hand.
pub const LANDMARK_COUNT: usize = 21;

/// Maximum number of hands tracked at once.
pub const MAX_HANDS: usize = 2;

impl HandLandmark {
    /// Convert landmark enum to array index (0-20).
    pub fn index(&self) -> usize {
        *self as usize
    }
}

// ── Hand side ──────────────────────────────────────────────

/// Which hand the detector believes it saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandSide {
    Left,
    Right,
}

impl HandSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    /// Parse a detector handedness label, ignoring case and whitespace.
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        if label.eq_ignore_ascii_case("left") {
            Some(Self::Left)
        } else if label.eq_ignore_ascii_case("right") {
            Some(Self::Right)
        } else {
            None
        }
    }

    /// Feature-vector slot for this hand (left first).
    pub fn slot(&self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }
}

// ── Landmark point ─────────────────────────────────────────

/// A landmark in normalized camera space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another landmark.
    pub fn distance(&self, other: &Landmark) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// One hand as reported by the detector, in canonical form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectedHand {
    /// Landmarks in detector order.  Usable hands carry exactly 21.
    pub landmarks: Vec<Landmark>,
    /// Handedness label, when the detector provided one.
    pub handedness: Option<HandSide>,
}

impl DetectedHand {
    pub fn new(landmarks: Vec<Landmark>, handedness: Option<HandSide>) -> Self {
        Self {
            landmarks,
            handedness,
        }
    }

    /// Whether this hand can be normalized into a feature block.
    pub fn is_usable(&self) -> bool {
        self.landmarks.len() == LANDMARK_COUNT && self.landmarks.iter().all(Landmark::is_finite)
    }

    /// Position of a single landmark, if present.
    pub fn landmark(&self, which: HandLandmark) -> Option<&Landmark> {
        self.landmarks.get(which.index())
    }
}

/// Number of hands in a detection that are usable for classification.
pub fn usable_hand_count(hands: &[DetectedHand]) -> usize {
    hands.iter().filter(|h| h.is_usable()).count().min(MAX_HANDS)
}

// ── Detector adapter ───────────────────────────────────────

/// A landmark point as the detector may encode it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawPoint {
    Object {
        x: f32,
        y: f32,
        #[serde(default)]
        z: f32,
    },
    Array(Vec<f32>),
}

impl RawPoint {
    fn to_landmark(&self) -> Landmark {
        match self {
            Self::Object { x, y, z } => Landmark::new(*x, *y, *z),
            Self::Array(v) if v.len() >= 2 => {
                Landmark::new(v[0], v[1], v.get(2).copied().unwrap_or(0.0))
            }
            // Too short to be a point; poisons the hand so it is skipped.
            Self::Array(_) => Landmark::new(f32::NAN, f32::NAN, f32::NAN),
        }
    }
}

/// One handedness category object.
///
/// Detector versions disagree on the field name; several may be present at
/// once, so each is kept separately and the first non-empty one wins.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCategory {
    #[serde(default, rename = "categoryName")]
    pub category_name: Option<String>,
    #[serde(default, rename = "category_name")]
    pub category_name_snake: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, rename = "displayName")]
    pub display_name: Option<String>,
}

impl RawCategory {
    fn side(&self) -> Option<HandSide> {
        [
            &self.category_name,
            &self.category_name_snake,
            &self.label,
            &self.display_name,
        ]
        .into_iter()
        .flatten()
        .find_map(|s| HandSide::parse(s))
    }
}

/// A handedness entry in any accepted shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawHandedness {
    Label(String),
    Categories(Vec<RawCategory>),
    Category(RawCategory),
}

impl RawHandedness {
    fn side(&self) -> Option<HandSide> {
        match self {
            Self::Label(s) => HandSide::parse(s),
            Self::Categories(list) => list.first().and_then(RawCategory::side),
            Self::Category(c) => c.side(),
        }
    }
}

/// Detector output for one frame, accepting every known field spelling.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDetection {
    #[serde(
        default,
        alias = "multiHandLandmarks",
        alias = "multi_hand_landmarks"
    )]
    pub landmarks: Vec<Vec<RawPoint>>,
    #[serde(
        default,
        alias = "handednesses",
        alias = "multiHandedness",
        alias = "multi_handedness"
    )]
    pub handedness: Vec<Option<RawHandedness>>,
}

impl RawDetection {
    /// Parse a detector result from JSON.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Convert into canonical hands, pairing handedness by position.
    pub fn into_hands(self) -> Vec<DetectedHand> {
        let RawDetection {
            landmarks,
            handedness,
        } = self;
        let hands: Vec<DetectedHand> = landmarks
            .iter()
            .enumerate()
            .map(|(i, points)| {
                let side = handedness
                    .get(i)
                    .and_then(|h| h.as_ref())
                    .and_then(RawHandedness::side);
                DetectedHand::new(points.iter().map(RawPoint::to_landmark).collect(), side)
            })
            .collect();
        if handedness.len() != landmarks.len() && !handedness.is_empty() {
            debug!(
                "Detector returned {} hands but {} handedness entries",
                landmarks.len(),
                handedness.len(),
            );
        }
        hands
    }
}

// ── Tests ──────────────────────────────────────────────────
