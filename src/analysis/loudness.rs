//! Loudness measures: energy and RMS
//!
//! Energy is the mean squared amplitude, so it does not grow with clip
//! length. RMS is accumulated in its own pass rather than derived from the
//! energy value; the two are reported as independent measures.

use crate::analysis::traits::{Descriptor, FeatureExtractor};
use crate::error::{Result, SoundprobeError};
use crate::types::{LoudnessResult, SampleBuffer};
use tracing::debug;

/// Mean squared amplitude of `samples`
pub fn energy(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    sum / samples.len() as f64
}

/// Root mean square amplitude of `samples`
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut acc = 0.0f64;
    for &s in samples {
        let s = s as f64;
        acc += s * s;
    }
    (acc / samples.len() as f64).sqrt()
}

/// Energy/RMS extractor
#[derive(Debug, Default)]
pub struct LoudnessAnalyzer;

impl LoudnessAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, buffer: &SampleBuffer) -> Result<LoudnessResult> {
        let samples = buffer.samples();
        let energy = energy(samples);
        let rms = rms(samples);

        if !energy.is_finite() || !rms.is_finite() {
            return Err(SoundprobeError::analysis_error(
                self.name(),
                "non-finite sample values",
            ));
        }

        debug!("Loudness: energy={:.6}, rms={:.6}", energy, rms);
        Ok(LoudnessResult { energy, rms })
    }
}

impl FeatureExtractor for LoudnessAnalyzer {
    fn extract(&self, buffer: &SampleBuffer) -> Result<Descriptor> {
        self.analyze(buffer).map(Descriptor::Loudness)
    }

    fn name(&self) -> &'static str {
        "loudness"
    }
}
