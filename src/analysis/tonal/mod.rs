//! Key and scale detection
//!
//! The track's HPCP profile is correlated with all 24 Krumhansl-Kessler
//! templates. The best-correlated template gives key and scale; its
//! correlation (floored at zero) is the key strength.

pub mod chroma;
pub mod templates;

use crate::analysis::traits::{Descriptor, FeatureExtractor};
use crate::error::{Result, SoundprobeError};
use crate::types::{PitchClass, SampleBuffer, Scale, TonalResult};
use chroma::ChromaConfig;
use tracing::debug;

/// Correlations closer than this are treated as a tie
const TIE_TOLERANCE: f64 = 1e-9;

/// HPCP + template key detector
#[derive(Debug, Clone, Default)]
pub struct TonalAnalyzer {
    config: ChromaConfig,
}

impl TonalAnalyzer {
    pub fn new(config: ChromaConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, buffer: &SampleBuffer) -> Result<TonalResult> {
        if self.config.frame_size == 0 || self.config.hop_size == 0 {
            return Err(SoundprobeError::analysis_error(
                self.name(),
                "frame and hop size must be non-zero",
            ));
        }
        let reference = self.config.reference_frequency;
        if !(reference.is_finite() && reference > 0.0) {
            return Err(SoundprobeError::analysis_error(
                self.name(),
                format!("invalid reference frequency {}", reference),
            ));
        }

        let profile = chroma::hpcp_profile(buffer.samples(), buffer.sample_rate(), &self.config);
        let result = match_key(&profile);

        debug!(
            "Key: {} {} (strength {:.3})",
            result.key.label(),
            result.scale.label(),
            result.strength
        );
        Ok(result)
    }
}

/// Best-matching key for a 12-bin chroma profile
///
/// Ties prefer the template whose tonic carries the most chroma energy,
/// then template order (C major first). An all-zero profile therefore
/// yields C major with zero strength.
pub fn match_key(profile: &[f64; 12]) -> TonalResult {
    let mut best: Option<(PitchClass, Scale, f64)> = None;

    for template in templates::all_templates() {
        let r = templates::pearson(profile, &template.profile);
        best = match best {
            None => Some((template.tonic, template.scale, r)),
            Some((tonic, scale, best_r)) => {
                if outranks(profile, (template.tonic, r), (tonic, best_r)) {
                    Some((template.tonic, template.scale, r))
                } else {
                    Some((tonic, scale, best_r))
                }
            }
        };
    }

    let (key, scale, r) = best.unwrap_or((PitchClass::C, Scale::Major, 0.0));
    TonalResult {
        key,
        scale,
        strength: r.max(0.0),
    }
}

/// Whether a `(tonic, correlation)` challenger displaces the incumbent
///
/// Correlations within [`TIE_TOLERANCE`] tie; the tie goes to the tonic with
/// more chroma energy and otherwise stays with the incumbent.
fn outranks(profile: &[f64; 12], challenger: (PitchClass, f64), incumbent: (PitchClass, f64)) -> bool {
    let (tonic, r) = challenger;
    let (best_tonic, best_r) = incumbent;
    if (r - best_r).abs() <= TIE_TOLERANCE {
        profile[tonic.to_index()] > profile[best_tonic.to_index()]
    } else {
        r > best_r
    }
}

impl FeatureExtractor for TonalAnalyzer {
    fn extract(&self, buffer: &SampleBuffer) -> Result<Descriptor> {
        self.analyze(buffer).map(Descriptor::Tonal)
    }

    fn name(&self) -> &'static str {
        "tonal"
    }
}
