//! Biquad filters
//!
//! Second-order IIR sections with coefficients from the Audio EQ Cookbook.
//! Reference: https://www.w3.org/2011/audio/audio-eq-cookbook.html

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Filter response shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    /// Bell curve boost/cut
    #[default]
    Peak,
    /// Boost/cut below frequency
    LowShelf,
    /// Boost/cut above frequency
    HighShelf,
    /// Remove above frequency
    LowPass,
    /// Remove below frequency
    HighPass,
}

impl FilterType {
    /// Whether the gain parameter affects this filter
    pub fn uses_gain(&self) -> bool {
        matches!(
            self,
            FilterType::Peak | FilterType::LowShelf | FilterType::HighShelf
        )
    }
}

/// Biquad filter coefficients
///
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2),
/// already normalized by a0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self::unity()
    }
}

impl BiquadCoeffs {
    /// Coefficients that pass the input through unchanged
    pub const fn unity() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    /// Calculate coefficients using the cookbook formulas
    pub fn calculate(
        filter_type: FilterType,
        sample_rate: f64,
        frequency: f64,
        gain_db: f64,
        q: f64,
    ) -> Self {
        // Clamp frequency to valid range (below Nyquist)
        let freq = frequency.clamp(10.0, sample_rate / 2.0 - 1.0);
        let q = q.clamp(0.1, 10.0);

        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);
        let a = 10.0_f64.powf(gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            FilterType::Peak => (
                1.0 + alpha * a,
                -2.0 * cos_w0,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cos_w0,
                1.0 - alpha / a,
            ),
            FilterType::LowShelf => {
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
            FilterType::HighShelf => {
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                    (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
            FilterType::LowPass => (
                (1.0 - cos_w0) / 2.0,
                1.0 - cos_w0,
                (1.0 - cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterType::HighPass => (
                (1.0 + cos_w0) / 2.0,
                -(1.0 + cos_w0),
                (1.0 + cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
        };

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Check if coefficients represent a bypass (unity gain, no filtering)
    pub fn is_unity(&self) -> bool {
        *self == Self::unity()
    }

    /// Magnitude response at `frequency`, in dB
    pub fn magnitude_db(&self, frequency: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * frequency / sample_rate;
        let (cos1, sin1) = (w.cos(), w.sin());
        let (cos2, sin2) = ((2.0 * w).cos(), (2.0 * w).sin());

        let num_re = self.b0 + self.b1 * cos1 + self.b2 * cos2;
        let num_im = -(self.b1 * sin1 + self.b2 * sin2);
        let den_re = 1.0 + self.a1 * cos1 + self.a2 * cos2;
        let den_im = -(self.a1 * sin1 + self.a2 * sin2);

        let num = (num_re * num_re + num_im * num_im).sqrt();
        let den = (den_re * den_re + den_im * den_im).sqrt();
        20.0 * (num / den).log10()
    }
}

/// Biquad filter history for one channel
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    /// Process a single sample (Direct Form I)
    #[inline]
    pub fn process(&mut self, input: f64, coeffs: &BiquadCoeffs) -> f64 {
        let output = coeffs.b0 * input + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A biquad with fixed shape and one history per channel
#[derive(Debug, Clone)]
pub struct Biquad {
    filter_type: FilterType,
    frequency: f64,
    q: f64,
    gain_db: f64,
    sample_rate: f64,
    coeffs: BiquadCoeffs,
    states: Vec<BiquadState>,
}

impl Biquad {
    pub fn new(
        filter_type: FilterType,
        frequency: f64,
        q: f64,
        gain_db: f64,
        sample_rate: u32,
        channels: usize,
    ) -> Self {
        let mut biquad = Self {
            filter_type,
            frequency,
            q,
            gain_db,
            sample_rate: sample_rate as f64,
            coeffs: BiquadCoeffs::unity(),
            states: vec![BiquadState::default(); channels],
        };
        biquad.update_coefficients();
        biquad
    }

    pub fn low_pass(frequency: f64, q: f64, sample_rate: u32, channels: usize) -> Self {
        Self::new(FilterType::LowPass, frequency, q, 0.0, sample_rate, channels)
    }

    pub fn high_pass(frequency: f64, q: f64, sample_rate: u32, channels: usize) -> Self {
        Self::new(FilterType::HighPass, frequency, q, 0.0, sample_rate, channels)
    }

    /// Change the gain; gain-less shapes ignore it
    pub fn set_gain_db(&mut self, gain_db: f64) {
        if gain_db != self.gain_db {
            self.gain_db = gain_db;
            self.update_coefficients();
        }
    }

    pub fn gain_db(&self) -> f64 {
        self.gain_db
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate as f64;
        self.update_coefficients();
    }

    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    fn update_coefficients(&mut self) {
        // A shaping band at 0 dB is exactly transparent
        self.coeffs = if self.filter_type.uses_gain() && self.gain_db.abs() < 0.01 {
            BiquadCoeffs::unity()
        } else {
            BiquadCoeffs::calculate(
                self.filter_type,
                self.sample_rate,
                self.frequency,
                self.gain_db,
                self.q,
            )
        };
    }

    #[inline]
    pub fn process_sample(&mut self, channel: usize, input: f32) -> f32 {
        if self.coeffs.is_unity() {
            return input;
        }
        match self.states.get_mut(channel) {
            Some(state) => state.process(input as f64, &self.coeffs) as f32,
            None => input,
        }
    }

    pub fn reset(&mut self) {
        for state in &mut self.states {
            state.reset();
        }
    }
}
