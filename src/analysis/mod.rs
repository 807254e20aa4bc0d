//! Audio analysis modules
//!
//! Each descriptor is computed by a [`FeatureExtractor`] over the same
//! decoded buffer, so the orchestrator can run them side by side.

pub mod danceability;
pub mod loudness;
pub mod spectrum;
pub mod tempo;
pub mod tonal;
pub mod traits;

pub use danceability::DanceabilityEstimator;
pub use loudness::LoudnessAnalyzer;
pub use tempo::{TempoConfig, TempoEstimator};
pub use tonal::TonalAnalyzer;
pub use traits::{Descriptor, FeatureExtractor};
