//! Harmonic pitch class profile (HPCP)
//!
//! Per STFT frame:
//! 1. Pick local magnitude maxima in the analysis band above a threshold
//!    relative to the frame's strongest peak, keeping the strongest few
//! 2. Refine each peak's frequency by parabolic interpolation of the
//!    log magnitude
//! 3. Map the frequency to a fractional pitch class against the reference
//!    tuning and spread its energy over nearby chroma bins with a cos²
//!    window
//!
//! Frames are max-normalized before accumulation so loud passages do not
//! dominate the profile.

use crate::analysis::spectrum::Stft;
use tracing::debug;

/// HPCP parameters
#[derive(Debug, Clone)]
pub struct ChromaConfig {
    pub frame_size: usize,
    pub hop_size: usize,
    /// Lowest peak frequency in Hz
    pub min_frequency: f32,
    /// Highest peak frequency in Hz
    pub max_frequency: f32,
    /// Peaks kept per frame
    pub max_peaks: usize,
    /// Peaks below this fraction of the frame's strongest peak are dropped
    pub peak_threshold: f32,
    /// Width of the spreading window in semitones
    pub window_semitones: f32,
    /// Tuning reference for A4 in Hz
    pub reference_frequency: f32,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            frame_size: 8192,
            hop_size: 4096,
            min_frequency: 50.0,
            max_frequency: 5000.0,
            max_peaks: 60,
            peak_threshold: 1e-3,
            window_semitones: 4.0 / 3.0,
            reference_frequency: 440.0,
        }
    }
}

const EPSILON: f32 = 1e-10;

/// Pitch class index of A
const A_INDEX: f32 = 9.0;

/// Spectral peak with interpolated frequency
#[derive(Debug, Clone, Copy)]
struct Peak {
    frequency: f32,
    magnitude: f32,
}

/// Accumulated, max-normalized HPCP of `samples`
///
/// Returns all zeros when no frame has a usable peak.
pub fn hpcp_profile(samples: &[f32], sample_rate: u32, config: &ChromaConfig) -> [f64; 12] {
    let stft = Stft::new(config.frame_size, config.hop_size);
    let norm = (config.frame_size as f32 / 2.0).max(1.0);

    let mut profile = [0.0f64; 12];
    let mut frames_used = 0usize;

    stft.for_each_frame(samples, |_, mags| {
        let peaks = pick_peaks(mags, &stft, sample_rate, norm, config);
        if peaks.is_empty() {
            return;
        }

        let mut frame = [0.0f32; 12];
        for peak in &peaks {
            spread_peak(&mut frame, peak, config);
        }

        let max = frame.iter().copied().fold(0.0f32, f32::max);
        if max > EPSILON {
            for (acc, &v) in profile.iter_mut().zip(frame.iter()) {
                *acc += (v / max) as f64;
            }
            frames_used += 1;
        }
    });

    let max = profile.iter().copied().fold(0.0f64, f64::max);
    if max > 0.0 {
        for v in profile.iter_mut() {
            *v /= max;
        }
    }

    debug!("HPCP: {} frames contributed", frames_used);
    profile
}

fn pick_peaks(
    mags: &[f32],
    stft: &Stft,
    sample_rate: u32,
    norm: f32,
    config: &ChromaConfig,
) -> Vec<Peak> {
    let bin_hz = stft.bin_frequency(1.0, sample_rate);
    let lo = ((config.min_frequency / bin_hz).ceil() as usize).max(1);
    let hi = ((config.max_frequency / bin_hz).floor() as usize).min(mags.len().saturating_sub(2));
    if lo > hi {
        return Vec::new();
    }

    let mut peaks: Vec<(usize, f32)> = (lo..=hi)
        .filter(|&i| mags[i] > mags[i - 1] && mags[i] >= mags[i + 1])
        .map(|i| (i, mags[i] / norm))
        .filter(|&(_, m)| m > EPSILON)
        .collect();

    let strongest = peaks.iter().map(|&(_, m)| m).fold(0.0f32, f32::max);
    peaks.retain(|&(_, m)| m >= strongest * config.peak_threshold);
    peaks.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    peaks.truncate(config.max_peaks);

    peaks
        .into_iter()
        .map(|(i, m)| {
            let (l, c, r) = (
                (mags[i - 1] + EPSILON).ln(),
                (mags[i] + EPSILON).ln(),
                (mags[i + 1] + EPSILON).ln(),
            );
            let denom = l - 2.0 * c + r;
            let offset = if denom.abs() > EPSILON {
                (0.5 * (l - r) / denom).clamp(-0.5, 0.5)
            } else {
                0.0
            };
            Peak {
                frequency: stft.bin_frequency(i as f32 + offset, sample_rate),
                magnitude: m,
            }
        })
        .collect()
}

/// Fractional pitch class of `frequency` in [0, 12)
pub fn pitch_class_of(frequency: f32, reference: f32) -> f32 {
    let semitones = 12.0 * (frequency / reference).log2() + A_INDEX;
    semitones.rem_euclid(12.0)
}

fn spread_peak(frame: &mut [f32; 12], peak: &Peak, config: &ChromaConfig) {
    let pc = pitch_class_of(peak.frequency, config.reference_frequency);
    let half = config.window_semitones / 2.0;
    let energy = peak.magnitude * peak.magnitude;

    for (bin, slot) in frame.iter_mut().enumerate() {
        let mut d = (pc - bin as f32).abs();
        if d > 6.0 {
            d = 12.0 - d;
        }
        if d < half {
            let w = (std::f32::consts::PI * d / config.window_semitones).cos();
            *slot += w * w * energy;
        }
    }
}
