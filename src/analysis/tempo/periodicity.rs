//! Periodicity estimation and multi-feature tempo consensus
//!
//! Each onset curve is turned into a tempo salience function:
//!
//! 1. FFT-accelerated autocorrelation: `ACF = IFFT(|FFT(x)|²)` of the
//!    mean-removed curve, normalized by lag 0
//! 2. Harmonic comb: salience at lag `L` sums the ACF around `k·L` for
//!    `k = 1..=4`, weighted by `1/k`
//! 3. A log-Gaussian tempo prior centred at 120 BPM
//!
//! Candidate lags are the salience peaks of every curve. A candidate's
//! agreement is the mean, over curves, of its salience relative to that
//! curve's own maximum; the most agreed-upon candidate wins. A tempo that
//! only one detector likes scores low even if it is that detector's
//! strongest peak, which suppresses most octave errors.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Harmonics summed by the comb
const COMB_HARMONICS: usize = 4;

/// Centre of the tempo prior in BPM
pub const PRIOR_CENTER_BPM: f32 = 120.0;

/// Width of the tempo prior in octaves
const PRIOR_WIDTH_OCTAVES: f32 = 1.0;

/// Salience peaks kept per curve as candidates
const PEAKS_PER_CURVE: usize = 5;

const EPSILON: f32 = 1e-10;

/// Winning tempo hypothesis
#[derive(Debug, Clone, PartialEq)]
pub struct TempoCandidate {
    /// Integer lag in onset frames
    pub lag: usize,
    /// Mean relative salience across curves (0.0 - 1.0)
    pub agreement: f32,
    /// Summed raw salience across curves
    pub salience: f32,
}

/// Normalized autocorrelation of `signal` for lags `0..=max_lag`
///
/// The mean is removed first. Returns all zeros for a constant signal.
pub fn autocorrelation(signal: &[f32], max_lag: usize) -> Vec<f32> {
    let n = signal.len();
    let max_lag = max_lag.min(n.saturating_sub(1));
    if n == 0 {
        return Vec::new();
    }

    let mean = signal.iter().sum::<f32>() / n as f32;
    let fft_len = (2 * n).next_power_of_two();

    let mut planner = FftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(fft_len);
    let inverse = planner.plan_fft_inverse(fft_len);

    let mut buffer: Vec<Complex<f32>> = signal
        .iter()
        .map(|&x| Complex::new(x - mean, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(fft_len)
        .collect();

    forward.process(&mut buffer);
    for c in buffer.iter_mut() {
        *c = Complex::new(c.norm_sqr(), 0.0);
    }
    inverse.process(&mut buffer);

    let zero_lag = buffer[0].re;
    if zero_lag <= EPSILON {
        return vec![0.0; max_lag + 1];
    }

    buffer[..=max_lag].iter().map(|c| c.re / zero_lag).collect()
}

/// Tempo salience for lags in `[min_lag, max_lag]`, indexed by lag
///
/// Entries outside the range are zero. `frame_rate` converts lags to BPM
/// for the tempo prior.
pub fn tempo_salience(acf: &[f32], min_lag: usize, max_lag: usize, frame_rate: f32) -> Vec<f32> {
    let mut salience = vec![0.0f32; max_lag + 1];
    if acf.is_empty() || min_lag == 0 || min_lag > max_lag {
        return salience;
    }

    for lag in min_lag..=max_lag {
        let mut comb = 0.0f32;
        for k in 1..=COMB_HARMONICS {
            let centre = k * lag;
            if centre >= acf.len() {
                break;
            }
            let spread = k / 2;
            let lo = centre.saturating_sub(spread);
            let hi = (centre + spread).min(acf.len() - 1);
            let peak = acf[lo..=hi].iter().copied().fold(f32::MIN, f32::max);
            comb += peak.max(0.0) / k as f32;
        }
        salience[lag] = comb * tempo_prior(lag_to_bpm(lag as f32, frame_rate));
    }

    salience
}

/// Log-Gaussian weighting that favours tempi near 120 BPM
pub fn tempo_prior(bpm: f32) -> f32 {
    if bpm <= 0.0 {
        return 0.0;
    }
    let octaves = (bpm / PRIOR_CENTER_BPM).log2() / PRIOR_WIDTH_OCTAVES;
    (-0.5 * octaves * octaves).exp()
}

pub fn lag_to_bpm(lag: f32, frame_rate: f32) -> f32 {
    if lag <= 0.0 {
        0.0
    } else {
        60.0 * frame_rate / lag
    }
}

pub fn bpm_to_lag(bpm: f32, frame_rate: f32) -> f32 {
    60.0 * frame_rate / bpm
}

/// Pick the lag with the highest cross-curve agreement
///
/// Curves whose salience is identically zero carry no information and are
/// left out. Returns `None` if no curve has any salience.
pub fn consensus(saliences: &[Vec<f32>]) -> Option<TempoCandidate> {
    let active: Vec<(&Vec<f32>, f32)> = saliences
        .iter()
        .map(|s| (s, s.iter().copied().fold(0.0f32, f32::max)))
        .filter(|(_, max)| *max > EPSILON)
        .collect();

    if active.is_empty() {
        return None;
    }

    let mut candidates: Vec<usize> = active
        .iter()
        .flat_map(|(s, _)| top_peaks(s, PEAKS_PER_CURVE))
        .collect();
    candidates.sort_unstable();
    candidates.dedup();

    let mut best: Option<TempoCandidate> = None;
    for lag in candidates {
        let mut agreement = 0.0f32;
        let mut salience = 0.0f32;
        for (curve, max) in &active {
            let local = neighbourhood_max(curve, lag, 1);
            agreement += local / max;
            salience += local;
        }
        agreement /= active.len() as f32;

        let candidate = TempoCandidate {
            lag,
            agreement,
            salience,
        };
        best = match best {
            None => Some(candidate),
            Some(current) => {
                let better = candidate.agreement > current.agreement + 1e-6
                    || ((candidate.agreement - current.agreement).abs() <= 1e-6
                        && candidate.salience > current.salience);
                Some(if better { candidate } else { current })
            }
        };
    }

    best
}

/// Sub-frame estimate of the period around integer `lag`
///
/// Locates the interpolated ACF peak near each harmonic `k·lag` and
/// averages `peak_k / k`, weighting later harmonics more because their
/// absolute position error is divided by `k`.
pub fn refine_lag(acf: &[f32], lag: usize) -> f32 {
    let mut weighted = 0.0f32;
    let mut weights = 0.0f32;

    for k in 1..=COMB_HARMONICS {
        let centre = k * lag;
        if centre + 1 >= acf.len() {
            break;
        }
        let spread = (k + 1) / 2;
        let lo = centre.saturating_sub(spread).max(1);
        let hi = (centre + spread).min(acf.len() - 2);
        if lo > hi {
            break;
        }

        let mut peak = lo;
        for i in lo..=hi {
            if acf[i] > acf[peak] {
                peak = i;
            }
        }
        if acf[peak] <= 0.0 {
            continue;
        }

        let position = peak as f32 + parabolic_offset(acf[peak - 1], acf[peak], acf[peak + 1]);
        weighted += position;
        weights += k as f32;
    }

    if weights > 0.0 {
        weighted / weights
    } else {
        lag as f32
    }
}

/// Height of the ACF peak at `lag`, relative to lag 0, in `[0, 1]`
///
/// Periodic onsets keep most of their energy at the period; noise leaves
/// only a few percent.
pub fn periodicity_strength(acf: &[f32], lag: usize) -> f32 {
    neighbourhood_max(acf, lag, 1).clamp(0.0, 1.0)
}

/// Vertex offset of the parabola through three equally spaced points
fn parabolic_offset(left: f32, centre: f32, right: f32) -> f32 {
    let denom = left - 2.0 * centre + right;
    if denom.abs() <= EPSILON {
        return 0.0;
    }
    (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
}

fn neighbourhood_max(values: &[f32], idx: usize, radius: usize) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let lo = idx.saturating_sub(radius).min(values.len() - 1);
    let hi = (idx + radius).min(values.len() - 1);
    values[lo..=hi].iter().copied().fold(0.0f32, f32::max)
}

/// Indices of the `count` highest local maxima of `values`
fn top_peaks(values: &[f32], count: usize) -> Vec<usize> {
    let mut peaks: Vec<usize> = (0..values.len())
        .filter(|&i| {
            let v = values[i];
            v > EPSILON
                && (i == 0 || v >= values[i - 1])
                && (i + 1 >= values.len() || v > values[i + 1])
        })
        .collect();
    peaks.sort_by(|&a, &b| values[b].total_cmp(&values[a]).then(a.cmp(&b)));
    peaks.truncate(count);
    peaks
}
