//! Tone Shaping Chain
//!
//! Fixed three-band EQ: low shelf at 100 Hz, peaking band at 1 kHz (Q = 1)
//! and high shelf at 8 kHz. Gain changes glide with a 100 ms time constant.

use crate::dsp::biquad::{Biquad, FilterType};
use crate::dsp::effect::{Effect, EffectParams};
use crate::dsp::smooth::{SmoothedValue, EQ_TIME_CONSTANT};
use crate::engine::AudioBuffer;
use crate::impl_effect_common;
use serde_json::{json, Value};
use std::f64::consts::FRAC_1_SQRT_2;

/// Band gain limit in dB (applies to both boost and cut)
pub const MAX_BAND_GAIN_DB: f32 = 12.0;

/// Frames between coefficient refreshes while a gain glides
const COEFF_UPDATE_INTERVAL: usize = 32;

/// One of the three fixed bands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneBand {
    Low,
    Mid,
    High,
}

impl ToneBand {
    pub const ALL: [ToneBand; 3] = [ToneBand::Low, ToneBand::Mid, ToneBand::High];

    fn index(self) -> usize {
        match self {
            ToneBand::Low => 0,
            ToneBand::Mid => 1,
            ToneBand::High => 2,
        }
    }

    /// Filter shape, centre frequency and Q of the band
    pub fn shape(self) -> (FilterType, f64, f64) {
        match self {
            ToneBand::Low => (FilterType::LowShelf, 100.0, FRAC_1_SQRT_2),
            ToneBand::Mid => (FilterType::Peak, 1000.0, 1.0),
            ToneBand::High => (FilterType::HighShelf, 8000.0, FRAC_1_SQRT_2),
        }
    }
}

#[derive(Debug, Clone)]
struct BandStage {
    gain: SmoothedValue,
    filter: Biquad,
}

impl BandStage {
    fn new(band: ToneBand, sample_rate: u32) -> Self {
        let (filter_type, frequency, q) = band.shape();
        Self {
            gain: SmoothedValue::new(0.0, EQ_TIME_CONSTANT, sample_rate),
            filter: Biquad::new(filter_type, frequency, q, 0.0, sample_rate, 2),
        }
    }
}

/// Three-band EQ with smoothed gains
#[derive(Debug, Clone)]
pub struct ToneShapingChain {
    params: EffectParams,
    bands: [BandStage; 3],
    frames_since_update: usize,
}

impl ToneShapingChain {
    /// Create a flat chain
    pub fn new(sample_rate: u32) -> Self {
        Self {
            params: EffectParams::default(),
            bands: ToneBand::ALL.map(|band| BandStage::new(band, sample_rate)),
            frames_since_update: 0,
        }
    }

    /// Glide a band toward `gain_db` (clamped to ±12 dB)
    pub fn set_gain_db(&mut self, band: ToneBand, gain_db: f32) {
        let gain_db = gain_db.clamp(-MAX_BAND_GAIN_DB, MAX_BAND_GAIN_DB);
        self.bands[band.index()].gain.set_target(gain_db);
    }

    /// Jump a band to `gain_db` without gliding (graph construction)
    pub fn set_gain_db_immediate(&mut self, band: ToneBand, gain_db: f32) {
        let gain_db = gain_db.clamp(-MAX_BAND_GAIN_DB, MAX_BAND_GAIN_DB);
        let stage = &mut self.bands[band.index()];
        stage.gain.set_immediate(gain_db);
        stage.filter.set_gain_db(gain_db as f64);
    }

    /// Gain currently applied to a band
    pub fn gain_db(&self, band: ToneBand) -> f32 {
        self.bands[band.index()].gain.current()
    }

    /// Gain a band is gliding toward
    pub fn target_gain_db(&self, band: ToneBand) -> f32 {
        self.bands[band.index()].gain.target()
    }

    pub fn is_flat(&self) -> bool {
        self.bands
            .iter()
            .all(|b| b.gain.target() == 0.0 && !b.gain.is_smoothing())
    }

    fn refresh_coefficients(&mut self, frames: usize) {
        for stage in &mut self.bands {
            if stage.gain.is_smoothing() {
                let gain = stage.gain.advance(frames);
                stage.filter.set_gain_db(gain as f64);
            }
        }
    }
}

impl Effect for ToneShapingChain {
    impl_effect_common!(ToneShapingChain, "tone_shaping", "Three-Band EQ");

    fn process(&mut self, buffer: &mut AudioBuffer) {
        if !self.params.connected {
            return;
        }

        let channels = buffer.num_channels().min(2);
        for frame in 0..buffer.num_frames() {
            if self.frames_since_update == 0 {
                self.refresh_coefficients(COEFF_UPDATE_INTERVAL);
            }
            self.frames_since_update = (self.frames_since_update + 1) % COEFF_UPDATE_INTERVAL;

            for ch in 0..channels {
                let mut sample = buffer.samples[ch][frame];
                for stage in &mut self.bands {
                    sample = stage.filter.process_sample(ch, sample);
                }
                buffer.samples[ch][frame] = sample;
            }
        }
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_size: usize) {
        for stage in &mut self.bands {
            stage.gain.set_sample_rate(sample_rate);
            stage.filter.set_sample_rate(sample_rate);
        }
    }

    fn reset(&mut self) {
        for stage in &mut self.bands {
            stage.filter.reset();
        }
        self.frames_since_update = 0;
    }

    fn get_params(&self) -> Value {
        json!({
            "low_db": self.gain_db(ToneBand::Low),
            "mid_db": self.gain_db(ToneBand::Mid),
            "high_db": self.gain_db(ToneBand::High),
            "connected": self.params.connected
        })
    }
}
