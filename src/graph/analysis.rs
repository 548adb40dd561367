//! Analysis tap on the live output
//!
//! Keeps the most recent `fft_size` samples (mono mix) and produces a power
//! spectrum on request for visualization consumers.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::fmt;
use std::sync::Arc;

use crate::engine::AudioBuffer;

/// Floor reported for empty bins (dB)
pub const MIN_POWER_DB: f32 = -160.0;

/// Ring buffer plus FFT plan
pub struct AnalysisTap {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    history: Vec<f32>,
    write_pos: usize,
    sample_rate: u32,
}

impl fmt::Debug for AnalysisTap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisTap")
            .field("fft_size", &self.fft_size())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl AnalysisTap {
    /// `fft_size` must be a power of two (2048 by default)
    pub fn new(fft_size: usize, sample_rate: u32) -> Self {
        let fft_size = fft_size.max(2);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        // Hann window
        let window = (0..fft_size)
            .map(|i| {
                let t = i as f32 / (fft_size - 1) as f32;
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * t).cos())
            })
            .collect();

        Self {
            fft,
            window,
            history: vec![0.0; fft_size],
            write_pos: 0,
            sample_rate,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.history.len()
    }

    /// Record a rendered block
    pub fn push(&mut self, block: &AudioBuffer) {
        let channels = block.num_channels();
        if channels == 0 {
            return;
        }
        let scale = 1.0 / channels as f32;
        let size = self.history.len();
        for frame in 0..block.num_frames() {
            let mono: f32 = block.samples.iter().map(|ch| ch[frame]).sum::<f32>() * scale;
            self.history[self.write_pos] = mono;
            self.write_pos = (self.write_pos + 1) % size;
        }
    }

    /// Power of each positive-frequency bin in dB (`fft_size / 2` values)
    pub fn power_spectrum(&self) -> Vec<f32> {
        let size = self.history.len();
        let mut bins: Vec<Complex<f32>> = (0..size)
            .map(|i| {
                let sample = self.history[(self.write_pos + i) % size];
                Complex::new(sample * self.window[i], 0.0)
            })
            .collect();
        self.fft.process(&mut bins);

        // Hann coherent gain is 0.5; full-scale sine reads 0 dB
        let norm = 2.0 / (size as f32 * 0.5);
        bins[..size / 2]
            .iter()
            .map(|c| {
                let magnitude = c.norm() * norm;
                if magnitude > 0.0 {
                    (20.0 * magnitude.log10()).max(MIN_POWER_DB)
                } else {
                    MIN_POWER_DB
                }
            })
            .collect()
    }

    /// Centre frequency of the loudest bin
    pub fn peak_frequency(&self) -> f32 {
        let spectrum = self.power_spectrum();
        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        peak as f32 * self.sample_rate as f32 / self.fft_size() as f32
    }

    pub fn clear(&mut self) {
        self.history.fill(0.0);
        self.write_pos = 0;
    }
}
