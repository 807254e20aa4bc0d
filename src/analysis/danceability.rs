//! Danceability via detrended fluctuation analysis (DFA)
//!
//! The amplitude envelope (standard deviation of 10 ms frames) is integrated
//! into a mean-removed profile. For each window size τ the profile is cut
//! into non-overlapping windows, each detrended with a least-squares line,
//! and `F(τ)` is the mean RMS residual. The scaling exponent `α` is the
//! least-squares slope of `ln F` against `ln τ` over every window size.
//!
//! Strongly periodic material fluctuates little at long time scales (small
//! α), so the score is `1/α`, clamped to `[0, 3]`. Uncorrelated envelopes
//! sit near `α = 0.5`, a score of about 2.
//!
//! # Reference
//!
//! Streich, S., & Herrera, P. (2005). Detrended Fluctuation Analysis of Music
//! Signals: Danceability Estimation and further Semantic Characterization.
//! *AES 118th Convention*.

use crate::analysis::traits::{Descriptor, FeatureExtractor};
use crate::error::Result;
use crate::types::{DanceabilityResult, SampleBuffer};
use tracing::debug;

/// Envelope frame length in milliseconds
const FRAME_MS: f64 = 10.0;

/// Smallest DFA window in milliseconds
const MIN_TAU_MS: f64 = 310.0;

/// Largest DFA window in milliseconds
const MAX_TAU_MS: f64 = 8800.0;

/// Growth factor between successive window sizes
const TAU_STEP: f64 = 1.1;

/// Upper bound of the score
pub const MAX_SCORE: f64 = 3.0;

const EPSILON: f64 = 1e-12;

/// DFA danceability extractor
#[derive(Debug, Default)]
pub struct DanceabilityEstimator;

impl DanceabilityEstimator {
    pub fn new() -> Self {
        Self
    }

    pub fn estimate(&self, buffer: &SampleBuffer) -> Result<DanceabilityResult> {
        let frame_len = (buffer.sample_rate() as f64 * FRAME_MS / 1000.0).round() as usize;
        let envelope = frame_std(buffer.samples(), frame_len);
        let score = dfa_score(&envelope);
        debug!("Danceability: {:.3} ({} envelope frames)", score, envelope.len());
        Ok(DanceabilityResult { score })
    }
}

impl FeatureExtractor for DanceabilityEstimator {
    fn extract(&self, buffer: &SampleBuffer) -> Result<Descriptor> {
        self.estimate(buffer).map(Descriptor::Danceability)
    }

    fn name(&self) -> &'static str {
        "danceability"
    }
}

/// Standard deviation of each complete `frame_len` frame
fn frame_std(samples: &[f32], frame_len: usize) -> Vec<f64> {
    if frame_len == 0 {
        return Vec::new();
    }
    samples
        .chunks_exact(frame_len)
        .map(|frame| {
            let n = frame.len() as f64;
            let mean = frame.iter().map(|&s| s as f64).sum::<f64>() / n;
            let var = frame
                .iter()
                .map(|&s| {
                    let d = s as f64 - mean;
                    d * d
                })
                .sum::<f64>()
                / n;
            var.sqrt()
        })
        .collect()
}

/// Window sizes in envelope frames, strictly increasing
fn window_sizes() -> Vec<usize> {
    let mut sizes: Vec<usize> = Vec::new();
    let mut tau = MIN_TAU_MS;
    while tau <= MAX_TAU_MS {
        let frames = (tau / FRAME_MS).round() as usize;
        if sizes.last().map_or(true, |&last| frames > last) {
            sizes.push(frames);
        }
        tau *= TAU_STEP;
    }
    sizes
}

/// Mean RMS residual of `profile` detrended in windows of `size`
///
/// `None` if not even one full window fits.
fn fluctuation(profile: &[f64], size: usize) -> Option<f64> {
    if size < 3 || profile.len() < size {
        return None;
    }

    // x = 0..size-1 is shared by every window
    let n = size as f64;
    let mean_x = (n - 1.0) / 2.0;
    let sxx: f64 = (0..size).map(|i| (i as f64 - mean_x).powi(2)).sum();

    let windows = profile.chunks_exact(size);
    let count = windows.len();
    let total: f64 = windows
        .map(|window| {
            let mean_y = window.iter().sum::<f64>() / n;
            let sxy: f64 = window
                .iter()
                .enumerate()
                .map(|(i, &y)| (i as f64 - mean_x) * (y - mean_y))
                .sum();
            let slope = sxy / sxx;
            let residual: f64 = window
                .iter()
                .enumerate()
                .map(|(i, &y)| {
                    let fit = mean_y + slope * (i as f64 - mean_x);
                    (y - fit).powi(2)
                })
                .sum();
            (residual / n).sqrt()
        })
        .sum();

    Some(total / count as f64)
}

/// Danceability score of an amplitude envelope
pub fn dfa_score(envelope: &[f64]) -> f64 {
    if envelope.is_empty() {
        return 0.0;
    }

    let mean = envelope.iter().sum::<f64>() / envelope.len() as f64;
    let spread = envelope.iter().map(|&v| (v - mean).abs()).fold(0.0f64, f64::max);
    if spread <= EPSILON {
        return 0.0;
    }

    let mut profile = Vec::with_capacity(envelope.len());
    let mut acc = 0.0f64;
    for &v in envelope {
        acc += v - mean;
        profile.push(acc);
    }

    let points: Vec<(f64, f64)> = window_sizes()
        .into_iter()
        .filter_map(|size| {
            fluctuation(&profile, size)
                .filter(|&f| f > EPSILON)
                .map(|f| ((size as f64).ln(), f.ln()))
        })
        .collect();

    match scaling_exponent(&points) {
        Some(alpha) if alpha > EPSILON => (1.0 / alpha).clamp(0.0, MAX_SCORE),
        // Fluctuation does not grow with window size
        Some(_) => MAX_SCORE,
        None => 0.0,
    }
}

/// Least-squares slope of `(ln τ, ln F)` points; `None` below two sizes
fn scaling_exponent(points: &[(f64, f64)]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let sxx: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    let sxy: f64 = points
        .iter()
        .map(|p| (p.0 - mean_x) * (p.1 - mean_y))
        .sum();
    if sxx <= EPSILON {
        return None;
    }
    let alpha = sxy / sxx;
    alpha.is_finite().then_some(alpha)
}
