//! Short-time Fourier transform shared by the tempo and tonal analyzers
//!
//! Frames are produced one at a time through a callback so a full
//! spectrogram is never held in memory, whatever the track length.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Magnitude STFT with a Hann window
pub struct Stft {
    frame_size: usize,
    hop_size: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl Stft {
    /// `frame_size` and `hop_size` must be non-zero
    pub fn new(frame_size: usize, hop_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(frame_size);
        Self {
            frame_size,
            hop_size: hop_size.max(1),
            window: hann_window(frame_size),
            fft,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Bins in the positive half of the spectrum (DC through Nyquist)
    pub fn num_bins(&self) -> usize {
        self.frame_size / 2 + 1
    }

    /// Frames produced for `len` samples; short inputs yield one zero-padded frame
    pub fn num_frames(&self, len: usize) -> usize {
        len.saturating_sub(self.frame_size) / self.hop_size + 1
    }

    /// Centre frequency of `bin` in Hz
    pub fn bin_frequency(&self, bin: f32, sample_rate: u32) -> f32 {
        bin * sample_rate as f32 / self.frame_size as f32
    }

    /// Call `f(frame_index, magnitudes)` for every frame of `samples`
    pub fn for_each_frame<F>(&self, samples: &[f32], mut f: F)
    where
        F: FnMut(usize, &[f32]),
    {
        let num_bins = self.num_bins();
        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.frame_size];
        let mut scratch = vec![Complex::new(0.0f32, 0.0); self.fft.get_inplace_scratch_len()];
        let mut magnitudes = vec![0.0f32; num_bins];

        for frame_idx in 0..self.num_frames(samples.len()) {
            let start = frame_idx * self.hop_size;
            let end = (start + self.frame_size).min(samples.len());
            let frame = &samples[start.min(end)..end];

            for (i, slot) in buffer.iter_mut().enumerate() {
                let s = frame.get(i).copied().unwrap_or(0.0);
                *slot = Complex::new(s * self.window[i], 0.0);
            }

            self.fft.process_with_scratch(&mut buffer, &mut scratch);

            for (mag, c) in magnitudes.iter_mut().zip(buffer.iter()) {
                *mag = c.norm();
            }

            f(frame_idx, &magnitudes);
        }
    }
}

/// Periodic Hann window
pub fn hann_window(size: usize) -> Vec<f32> {
    if size <= 1 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / size as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}
