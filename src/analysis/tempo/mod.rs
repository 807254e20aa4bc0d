//! Tempo estimation
//!
//! Pipeline:
//! 1. Onset curves (spectral flux, HFC flux, energy flux) from one STFT pass
//! 2. Per-curve tempo salience from autocorrelation + harmonic comb
//! 3. Multi-feature consensus picks the period, refined to sub-frame precision
//! 4. Dynamic-programming beat tracking on the combined onset envelope
//!
//! Confidence combines the cross-feature agreement, how much onset energy
//! the tracked beats explain and the height of the combined ACF at the
//! period. Silent or too-short input yields a zero result instead of an
//! error. Audible input without a pulse (steady tones, DC, no periodicity
//! in any curve) reports the prior's centre tempo with zero confidence.

pub mod beats;
pub mod onset;
pub mod periodicity;

use crate::analysis::spectrum::Stft;
use crate::analysis::traits::{Descriptor, FeatureExtractor};
use crate::error::{Result, SoundprobeError};
use crate::types::{SampleBuffer, TempoResult};
use tracing::debug;

/// Peak amplitude below which a buffer is treated as silence
const SILENCE_PEAK: f32 = 1e-6;

/// Clip length needed to observe two periods of the slowest tempo (40 BPM)
const FULL_COVERAGE_SECS: f64 = 3.0;

/// Beat alignment tolerance as a fraction of the period
const ALIGNMENT_TOLERANCE: f32 = 0.1;

/// Frame energy log ratio below which input counts as stationary
const MIN_ENERGY_RISE: f32 = 1e-3;

/// Tempo reported for audible input without a pulse
const UNPULSED_BPM: f64 = periodicity::PRIOR_CENTER_BPM as f64;

/// Tempo estimation parameters
#[derive(Debug, Clone)]
pub struct TempoConfig {
    /// Minimum BPM to consider (default: 40.0)
    pub min_bpm: f32,
    /// Maximum BPM to consider (default: 208.0)
    pub max_bpm: f32,
    /// STFT frame size (default: 2048)
    pub frame_size: usize,
    /// STFT hop size (default: 512)
    pub hop_size: usize,
    /// Beat tracker interval penalty (default: 100.0)
    pub tightness: f32,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            min_bpm: 40.0,
            max_bpm: 208.0,
            frame_size: 2048,
            hop_size: 512,
            tightness: beats::DEFAULT_TIGHTNESS,
        }
    }
}

/// Multi-feature tempo estimator
pub struct TempoEstimator {
    config: TempoConfig,
}

impl TempoEstimator {
    pub fn new(config: TempoConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TempoConfig {
        &self.config
    }

    pub fn estimate(&self, buffer: &SampleBuffer) -> Result<TempoResult> {
        let config = &self.config;
        if config.min_bpm <= 0.0 || config.max_bpm <= config.min_bpm {
            return Err(SoundprobeError::analysis_error(
                self.name(),
                format!("invalid BPM range [{}, {}]", config.min_bpm, config.max_bpm),
            ));
        }
        if config.frame_size == 0 || config.hop_size == 0 {
            return Err(SoundprobeError::analysis_error(
                self.name(),
                "frame and hop size must be non-zero",
            ));
        }

        if buffer.peak() < SILENCE_PEAK {
            debug!("Tempo: silent input");
            return Ok(TempoResult::none());
        }

        let stft = Stft::new(config.frame_size, config.hop_size);
        let features = onset::compute_onset_features(buffer.samples(), &stft, buffer.sample_rate());
        let frame_rate = features.frame_rate;
        let n = features.len();

        // Every lag must fit at least twice in the onset curve
        let min_lag = periodicity::bpm_to_lag(config.max_bpm, frame_rate).floor().max(1.0) as usize;
        let max_lag = (periodicity::bpm_to_lag(config.min_bpm, frame_rate).ceil() as usize).min(n / 2);
        if max_lag < min_lag {
            debug!("Tempo: clip too short ({} onset frames)", n);
            return Ok(TempoResult::none());
        }

        if features.energy_rise < MIN_ENERGY_RISE {
            debug!("Tempo: stationary input (energy rise {:.3e})", features.energy_rise);
            return Ok(TempoResult::unpulsed(UNPULSED_BPM));
        }

        let acf_len = 4 * max_lag + 4;
        let saliences: Vec<Vec<f32>> = features
            .curves()
            .iter()
            .map(|curve| {
                let acf = periodicity::autocorrelation(curve, acf_len);
                periodicity::tempo_salience(&acf, min_lag, max_lag, frame_rate)
            })
            .collect();

        let candidate = match periodicity::consensus(&saliences) {
            Some(c) => c,
            None => {
                debug!("Tempo: no periodicity in onset curves");
                return Ok(TempoResult::unpulsed(UNPULSED_BPM));
            }
        };

        let envelope = features.combined();
        let combined_acf = periodicity::autocorrelation(&envelope, acf_len);
        let period = periodicity::refine_lag(&combined_acf, candidate.lag);
        let strength = periodicity::periodicity_strength(&combined_acf, candidate.lag);
        let bpm = periodicity::lag_to_bpm(period, frame_rate) as f64;

        let beat_frames = beats::track_beats(&envelope, period, config.tightness);
        let tolerance = ((ALIGNMENT_TOLERANCE * period).round() as usize).max(1);
        let alignment = beats::beat_alignment(&envelope, &beat_frames, tolerance);

        let coverage = (buffer.duration() / FULL_COVERAGE_SECS).min(1.0);
        let evidence = candidate.agreement as f64 * alignment as f64 * strength as f64;
        let confidence = (evidence.sqrt() * coverage).clamp(0.0, 1.0);

        let frame_offset = config.frame_size as f64 / 2.0;
        let beats: Vec<f64> = beat_frames
            .iter()
            .map(|&f| (f as f64 * config.hop_size as f64 + frame_offset) / buffer.sample_rate() as f64)
            .collect();

        debug!(
            "Tempo: {:.2} BPM (lag {:.2}, agreement {:.3}, alignment {:.3}, strength {:.3}, {} beats)",
            bpm,
            period,
            candidate.agreement,
            alignment,
            strength,
            beats.len()
        );

        Ok(TempoResult {
            bpm,
            beats,
            confidence,
        })
    }
}

impl Default for TempoEstimator {
    fn default() -> Self {
        Self::new(TempoConfig::default())
    }
}

impl FeatureExtractor for TempoEstimator {
    fn extract(&self, buffer: &SampleBuffer) -> Result<Descriptor> {
        self.estimate(buffer).map(Descriptor::Tempo)
    }

    fn name(&self) -> &'static str {
        "tempo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click_track(bpm: f64, seconds: f64) -> SampleBuffer {
        let sr = 44100.0;
        let n = (seconds * sr) as usize;
        let period = (60.0 / bpm * sr) as usize;
        let click = 220;
        let samples = (0..n)
            .map(|i| {
                let pos = i % period;
                if pos < click {
                    0.8 * (-5.0 * pos as f32 / click as f32).exp()
                } else {
                    0.0
                }
            })
            .collect();
        SampleBuffer::new(samples).unwrap()
    }

    fn tone(frequency: f32, seconds: f64) -> SampleBuffer {
        let n = (seconds * 44100.0) as usize;
        let samples = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * frequency * i as f32 / 44100.0).sin() * 0.5)
            .collect();
        SampleBuffer::new(samples).unwrap()
    }

    fn noise(seconds: f64) -> SampleBuffer {
        let mut state = 0x2545_f491_u32;
        let n = (seconds * 44100.0) as usize;
        let samples = (0..n)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect();
        SampleBuffer::new(samples).unwrap()
    }

    #[test]
    fn test_click_track_120() {
        let result = TempoEstimator::default().estimate(&click_track(120.0, 30.0)).unwrap();
        assert!((result.bpm - 120.0).abs() <= 2.0, "detected {} BPM", result.bpm);
        assert!(result.confidence > 0.7, "confidence {}", result.confidence);
        assert!(result.beats.len() >= 50);
    }

    #[test]
    fn test_click_track_90() {
        let result = TempoEstimator::default().estimate(&click_track(90.0, 20.0)).unwrap();
        assert!((result.bpm - 90.0).abs() <= 2.0, "detected {} BPM", result.bpm);
    }

    #[test]
    fn test_beats_are_strictly_increasing_and_in_range() {
        let buffer = click_track(128.0, 12.0);
        let result = TempoEstimator::default().estimate(&buffer).unwrap();
        assert!(result.beats.windows(2).all(|w| w[1] > w[0]));
        assert!(result.beats.iter().all(|&t| t >= 0.0 && t <= buffer.duration() + 0.05));
    }

    #[test]
    fn test_silence_is_zero() {
        let buffer = SampleBuffer::new(vec![0.0; 44100 * 5]).unwrap();
        let result = TempoEstimator::default().estimate(&buffer).unwrap();
        assert_eq!(result, TempoResult::none());
    }

    #[test]
    fn test_very_short_clip_does_not_fail() {
        let buffer = click_track(120.0, 0.2);
        let result = TempoEstimator::default().estimate(&buffer).unwrap();
        assert!(result.confidence <= 0.1);
    }

    #[test]
    fn test_noise_confidence_in_range() {
        let result = TempoEstimator::default().estimate(&noise(6.0)).unwrap();
        assert!(result.bpm > 0.0);
        assert!((0.0..=1.0).contains(&result.confidence));
    }

    #[test]
    fn test_noise_confidence_is_low() {
        let estimator = TempoEstimator::default();
        let hiss = estimator.estimate(&noise(20.0)).unwrap();
        let clicks = estimator.estimate(&click_track(120.0, 20.0)).unwrap();
        assert!(hiss.confidence < 0.35, "noise confidence {}", hiss.confidence);
        assert!(clicks.confidence > hiss.confidence + 0.3);
    }

    #[test]
    fn test_steady_tone_has_tempo_but_no_confidence() {
        let result = TempoEstimator::default().estimate(&tone(440.0, 5.0)).unwrap();
        assert!(result.bpm > 0.0);
        assert_eq!(result.confidence, 0.0);
        assert!(result.beats.is_empty());
    }

    #[test]
    fn test_dc_offset_is_not_silence() {
        let buffer = SampleBuffer::new(vec![0.5; 44100 * 5]).unwrap();
        let result = TempoEstimator::default().estimate(&buffer).unwrap();
        assert_eq!(result, TempoResult::unpulsed(UNPULSED_BPM));
        assert!(result.bpm > 0.0);
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let buffer = click_track(100.0, 8.0);
        let estimator = TempoEstimator::default();
        assert_eq!(estimator.estimate(&buffer).unwrap(), estimator.estimate(&buffer).unwrap());
    }

    #[test]
    fn test_invalid_range_is_an_error() {
        let estimator = TempoEstimator::new(TempoConfig {
            min_bpm: 150.0,
            max_bpm: 100.0,
            ..TempoConfig::default()
        });
        let err = estimator.estimate(&click_track(120.0, 2.0)).unwrap_err();
        assert!(matches!(err, SoundprobeError::AnalysisError { .. }));
    }
}
