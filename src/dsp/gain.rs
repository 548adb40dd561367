//! Master Gain
//!
//! Final volume stage before the destination. Volume is linear (0..1) and
//! glides with a 20 ms time constant.

use crate::dsp::effect::{Effect, EffectParams};
use crate::dsp::smooth::{SmoothedValue, VOLUME_TIME_CONSTANT};
use crate::engine::AudioBuffer;
use crate::impl_effect_common;
use serde_json::{json, Value};

// ============================================================================
// Constants
// ============================================================================

const MIN_VOLUME: f32 = 0.0;
const MAX_VOLUME: f32 = 1.0;

// ============================================================================
// Master Gain
// ============================================================================

/// Smoothed linear gain stage
///
/// # Example
/// ```
/// use pitchlab::dsp::{Effect, MasterGain};
/// use pitchlab::engine::{AudioBuffer, ChannelLayout};
///
/// let mut gain = MasterGain::new(0.5, 44100);
/// let mut buffer = AudioBuffer::new(256, ChannelLayout::Stereo, 44100);
/// gain.process(&mut buffer);
/// ```
#[derive(Debug, Clone)]
pub struct MasterGain {
    params: EffectParams,
    volume: SmoothedValue,
}

impl MasterGain {
    /// Create a gain stage already sitting at `volume`
    pub fn new(volume: f32, sample_rate: u32) -> Self {
        let clamped = volume.clamp(MIN_VOLUME, MAX_VOLUME);
        Self {
            params: EffectParams::default(),
            volume: SmoothedValue::new(clamped, VOLUME_TIME_CONSTANT, sample_rate),
        }
    }

    /// Glide toward `volume` (clamped to 0..1)
    pub fn set_volume(&mut self, volume: f32) {
        self.volume.set_target(volume.clamp(MIN_VOLUME, MAX_VOLUME));
    }

    /// Jump to `volume` without gliding
    pub fn set_volume_immediate(&mut self, volume: f32) {
        self.volume.set_immediate(volume.clamp(MIN_VOLUME, MAX_VOLUME));
    }

    /// Volume applied to the most recent sample
    pub fn volume(&self) -> f32 {
        self.volume.current()
    }

    pub fn target_volume(&self) -> f32 {
        self.volume.target()
    }
}

impl Default for MasterGain {
    fn default() -> Self {
        Self::new(1.0, 44100)
    }
}

impl Effect for MasterGain {
    impl_effect_common!(MasterGain, "master_gain", "Master Volume");

    fn process(&mut self, buffer: &mut AudioBuffer) {
        if !self.params.connected {
            return;
        }

        // Unity gain optimization
        if !self.volume.is_smoothing() && self.volume.current() == 1.0 {
            return;
        }

        let channels = buffer.num_channels();
        for frame in 0..buffer.num_frames() {
            let gain = self.volume.next_sample();
            for ch in 0..channels {
                buffer.samples[ch][frame] *= gain;
            }
        }
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_size: usize) {
        self.volume.set_sample_rate(sample_rate);
    }

    fn reset(&mut self) {
        let target = self.volume.target();
        self.volume.set_immediate(target);
    }

    fn get_params(&self) -> Value {
        json!({
            "volume": self.volume.current(),
            "target_volume": self.volume.target(),
            "connected": self.params.connected
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
