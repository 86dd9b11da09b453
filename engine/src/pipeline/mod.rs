//! Hand-sign recognition pipeline.
//!
//! Provides:
//! - `landmarks`: detector output adapter and hand/landmark types
//! - `features`: position and scale invariant feature vectors
//! - `dataset`: labeled reference vectors loaded once per session
//! - `knn`: nearest-neighbour classifier
//! - `lighting`: brightness/contrast quality gate
//! - `consensus`: time-decayed vote window
//! - `frame_rate`: animation-frame statistics
//! - `session`: owned controller tying the stages together

pub mod consensus;
pub mod dataset;
pub mod features;
pub mod frame_rate;
pub mod knn;
pub mod landmarks;
pub mod lighting;
pub mod session;

pub use consensus::{ConsensusConfig, ConsensusVoter, StabilizedSign};
pub use dataset::{DatasetError, ReferenceDataset, TrainingSample};
pub use features::{normalize_hands, FeatureVector, FEATURE_LEN};
pub use knn::{ClassificationResult, ClassifierConfig, KnnClassifier, NEUTRAL_LABEL};
pub use landmarks::{DetectedHand, HandSide, Landmark, RawDetection};
pub use lighting::{FrameSample, LightingConfig, LightingGate, LightingStatus, OwnedFrame};
pub use session::{SessionConfig, SignSession, TickOutcome};
