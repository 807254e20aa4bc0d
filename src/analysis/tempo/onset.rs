//! Onset strength features
//!
//! Three complementary novelty curves are computed from one STFT pass:
//! - Spectral flux: rectified increase of log-compressed magnitudes
//!   (harmonic and timbral onsets)
//! - High-frequency content flux: increase of frequency-weighted energy
//!   (percussive attacks)
//! - Energy flux: increase of log-compressed frame energy (loudness onsets)
//!
//! Each curve is detrended with a moving average, half-wave rectified and
//! normalized to unit peak so the curves can be compared directly.

use crate::analysis::spectrum::Stft;
use tracing::debug;

/// Log compression factor applied to magnitudes before differencing
const LOG_COMPRESSION: f32 = 1000.0;

/// Half-width in frames of the moving average removed from each curve
const DETREND_RADIUS: usize = 8;

const EPSILON: f32 = 1e-10;

/// Onset strength curves, one value per STFT frame
#[derive(Debug, Clone)]
pub struct OnsetFeatures {
    pub spectral_flux: Vec<f32>,
    pub hfc_flux: Vec<f32>,
    pub energy_flux: Vec<f32>,
    /// Largest frame-to-frame log ratio of raw frame energy
    ///
    /// Near zero for stationary input (steady tones, DC), whose curves hold
    /// only amplified rounding noise after normalization.
    pub energy_rise: f32,
    /// Frames per second
    pub frame_rate: f32,
}

impl OnsetFeatures {
    /// The curves as a list, in a fixed order
    pub fn curves(&self) -> [&[f32]; 3] {
        [&self.spectral_flux, &self.hfc_flux, &self.energy_flux]
    }

    pub fn len(&self) -> usize {
        self.spectral_flux.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectral_flux.is_empty()
    }

    /// Mean of the three curves
    pub fn combined(&self) -> Vec<f32> {
        (0..self.len())
            .map(|i| (self.spectral_flux[i] + self.hfc_flux[i] + self.energy_flux[i]) / 3.0)
            .collect()
    }
}

/// Compute all onset curves from `samples`
pub fn compute_onset_features(samples: &[f32], stft: &Stft, sample_rate: u32) -> OnsetFeatures {
    let num_frames = stft.num_frames(samples.len());
    let norm = (stft.frame_size() as f32 / 2.0).max(1.0);

    let mut spectral_flux = Vec::with_capacity(num_frames);
    let mut hfc_flux = Vec::with_capacity(num_frames);
    let mut energy_flux = Vec::with_capacity(num_frames);

    let mut prev_log_mags: Vec<f32> = vec![0.0; stft.num_bins()];
    let mut prev_hfc = 0.0f32;
    let mut prev_energy = 0.0f32;
    let mut prev_raw_energy = 0.0f32;
    let mut energy_rise = 0.0f32;

    stft.for_each_frame(samples, |frame_idx, mags| {
        let mut flux = 0.0f32;
        let mut hfc = 0.0f32;
        let mut energy = 0.0f32;

        for (bin, (&m, prev)) in mags.iter().zip(prev_log_mags.iter_mut()).enumerate() {
            let m = m / norm;
            let log_mag = compress(m);
            if frame_idx > 0 {
                flux += (log_mag - *prev).max(0.0);
            }
            *prev = log_mag;

            let power = m * m;
            hfc += bin as f32 * power;
            energy += power;
        }

        if frame_idx > 0 {
            let rise = ((energy + EPSILON) / (prev_raw_energy + EPSILON)).ln();
            energy_rise = energy_rise.max(rise);
        }
        prev_raw_energy = energy;

        let hfc = compress(hfc);
        let energy = compress(energy);

        if frame_idx == 0 {
            spectral_flux.push(0.0);
            hfc_flux.push(0.0);
            energy_flux.push(0.0);
        } else {
            spectral_flux.push(flux);
            hfc_flux.push((hfc - prev_hfc).max(0.0));
            energy_flux.push((energy - prev_energy).max(0.0));
        }

        prev_hfc = hfc;
        prev_energy = energy;
    });

    condition(&mut spectral_flux);
    condition(&mut hfc_flux);
    condition(&mut energy_flux);

    debug!(
        "Onset features: {} frames ({} Hz frame rate, energy rise {:.3e})",
        spectral_flux.len(),
        sample_rate as f32 / stft.hop_size() as f32,
        energy_rise
    );

    OnsetFeatures {
        spectral_flux,
        hfc_flux,
        energy_flux,
        energy_rise,
        frame_rate: sample_rate as f32 / stft.hop_size() as f32,
    }
}

fn compress(x: f32) -> f32 {
    (1.0 + LOG_COMPRESSION * x).ln()
}

/// Remove the local mean, rectify, normalize to unit peak
fn condition(curve: &mut [f32]) {
    if curve.is_empty() {
        return;
    }

    let local_mean = moving_average(curve, DETREND_RADIUS);
    for (v, m) in curve.iter_mut().zip(local_mean) {
        *v = (*v - m).max(0.0);
    }

    let peak = curve.iter().copied().fold(0.0f32, f32::max);
    if peak > EPSILON {
        for v in curve.iter_mut() {
            *v /= peak;
        }
    } else {
        curve.iter_mut().for_each(|v| *v = 0.0);
    }
}

/// Centered moving average with a window of `2 * radius + 1`, truncated at the edges
pub(crate) fn moving_average(values: &[f32], radius: usize) -> Vec<f32> {
    let mut prefix = Vec::with_capacity(values.len() + 1);
    prefix.push(0.0f64);
    for &v in values {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v as f64);
    }

    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(radius);
            let hi = (i + radius + 1).min(values.len());
            ((prefix[hi] - prefix[lo]) / (hi - lo) as f64) as f32
        })
        .collect()
}
