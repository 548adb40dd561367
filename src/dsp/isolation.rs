//! Vocal Isolation
//!
//! Removes centre-panned content (usually the lead vocal) by phase
//! cancellation while keeping the bass intact.
//!
//! ```text
//!          ┌─ LPF 200 Hz ── mono mix ─────────────────────┬──(+)── L
//!  L, R ───┤                                              └──(+)── R
//!          └─ HPF 200 Hz ── L + (R × −1) ── LPF 12 kHz ── ×1.8 ──┘ (R gets −side)
//! ```

use crate::dsp::biquad::Biquad;
use crate::dsp::effect::{Effect, EffectParams};
use crate::engine::AudioBuffer;
use crate::impl_effect_common;
use serde_json::{json, Value};

/// Frequency separating preserved bass from the cancellable band (Hz)
pub const CROSSOVER_HZ: f64 = 200.0;

/// Q of both crossover filters
pub const CROSSOVER_Q: f64 = 0.707;

/// Corner of the low-pass smoothing the side signal (Hz)
pub const SIDE_SMOOTHING_HZ: f64 = 12000.0;

/// Q of the side smoothing filter
pub const SIDE_SMOOTHING_Q: f64 = 0.5;

/// Makeup gain for loudness lost to cancellation
pub const SIDE_GAIN: f32 = 1.8;

// ============================================================================
// Vocal Isolation Network
// ============================================================================

/// Frequency-split phase-cancellation network
///
/// Expects a stereo block. A mono source must already be upmixed so both
/// channels match; the side signal is then silent and only bass remains.
#[derive(Debug, Clone)]
pub struct VocalIsolationNetwork {
    params: EffectParams,
    low_band: Biquad,
    high_band: Biquad,
    side_smoothing: Biquad,
}

impl VocalIsolationNetwork {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            params: EffectParams::default(),
            low_band: Biquad::low_pass(CROSSOVER_HZ, CROSSOVER_Q, sample_rate, 2),
            high_band: Biquad::high_pass(CROSSOVER_HZ, CROSSOVER_Q, sample_rate, 2),
            side_smoothing: Biquad::low_pass(SIDE_SMOOTHING_HZ, SIDE_SMOOTHING_Q, sample_rate, 1),
        }
    }
}

impl Effect for VocalIsolationNetwork {
    impl_effect_common!(VocalIsolationNetwork, "vocal_isolation", "Vocal Isolation");

    fn process(&mut self, buffer: &mut AudioBuffer) {
        if !self.params.connected || buffer.num_channels() < 2 {
            return;
        }

        let (left, right) = buffer.samples.split_at_mut(1);
        let (left, right) = (&mut left[0], &mut right[0]);

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let bass = 0.5 * (self.low_band.process_sample(0, *l) + self.low_band.process_sample(1, *r));

            let high_l = self.high_band.process_sample(0, *l);
            let high_r = self.high_band.process_sample(1, *r);
            let side = high_l + high_r * -1.0;
            let side = self.side_smoothing.process_sample(0, side) * SIDE_GAIN;

            *l = bass + side;
            *r = bass - side;
        }
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_size: usize) {
        self.low_band.set_sample_rate(sample_rate);
        self.high_band.set_sample_rate(sample_rate);
        self.side_smoothing.set_sample_rate(sample_rate);
    }

    fn reset(&mut self) {
        self.low_band.reset();
        self.high_band.reset();
        self.side_smoothing.reset();
    }

    fn get_params(&self) -> Value {
        json!({
            "crossover_hz": CROSSOVER_HZ,
            "side_smoothing_hz": SIDE_SMOOTHING_HZ,
            "side_gain": SIDE_GAIN,
            "connected": self.params.connected
        })
    }
}

// ============================================================================
// Stereo Bypass
// ============================================================================

/// Transparent stage used when vocal removal is off
///
/// Each input channel goes straight to the matching output channel.
#[derive(Debug, Clone, Default)]
pub struct StereoBypass {
    params: EffectParams,
}

impl StereoBypass {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Effect for StereoBypass {
    impl_effect_common!(StereoBypass, "stereo_bypass", "Stereo Bypass");

    fn process(&mut self, _buffer: &mut AudioBuffer) {}

    fn prepare(&mut self, _sample_rate: u32, _max_block_size: usize) {}

    fn reset(&mut self) {}

    fn get_params(&self) -> Value {
        json!({ "connected": self.params.connected })
    }
}

// ============================================================================
// Tests
// ============================================================================
