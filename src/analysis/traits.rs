//! Feature extractor abstraction
//!
//! Every descriptor is produced by an implementation of [`FeatureExtractor`]
//! over the same read-only [`SampleBuffer`]. The orchestrator only knows this
//! trait, so adding a descriptor means adding an extractor and a
//! [`Descriptor`] variant.

use crate::error::Result;
use crate::types::{DanceabilityResult, LoudnessResult, SampleBuffer, TempoResult, TonalResult};

/// Output of a single feature extractor
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    Loudness(LoudnessResult),
    Tempo(TempoResult),
    Tonal(TonalResult),
    Danceability(DanceabilityResult),
}

impl Descriptor {
    /// Short name of the descriptor kind (for logging)
    pub fn kind(&self) -> &'static str {
        match self {
            Descriptor::Loudness(_) => "loudness",
            Descriptor::Tempo(_) => "tempo",
            Descriptor::Tonal(_) => "tonal",
            Descriptor::Danceability(_) => "danceability",
        }
    }
}

/// A pure analysis over one decoded buffer
///
/// Implementations must not mutate shared state: the orchestrator runs all
/// extractors concurrently on the same buffer.
pub trait FeatureExtractor: Send + Sync {
    /// Compute this extractor's descriptor
    fn extract(&self, buffer: &SampleBuffer) -> Result<Descriptor>;

    /// Get the name of this extractor (for logging and error attribution)
    fn name(&self) -> &'static str;
}
