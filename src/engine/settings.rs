//! Settings snapshots and engine configuration.

use crate::error::{PitchlabError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Detune limit in cents (±12 semitones)
pub const MAX_DETUNE_CENTS: i32 = 1200;
pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;
pub const MAX_EQ_DB: f32 = 12.0;

/// One immutable snapshot of every user-controllable parameter
///
/// The engine never mutates a snapshot in place; helpers return a new one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Pitch offset in cents, independent of speed
    pub detune_cents: i32,
    pub vocal_removal: bool,
    /// Linear master volume, 0..1
    pub volume: f32,
    pub eq_low_db: f32,
    pub eq_mid_db: f32,
    pub eq_high_db: f32,
    /// Playback rate, 0.5..2.0
    pub speed: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            detune_cents: 0,
            vocal_removal: false,
            volume: 1.0,
            eq_low_db: 0.0,
            eq_mid_db: 0.0,
            eq_high_db: 0.0,
            speed: 1.0,
        }
    }
}

fn check_range(param: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(PitchlabError::InvalidParameter {
            param: param.to_string(),
            value,
            min,
            max,
        })
    }
}

impl AudioSettings {
    /// Reject any parameter outside its range
    pub fn validate(&self) -> Result<()> {
        let cents = MAX_DETUNE_CENTS as f64;
        check_range("detune_cents", self.detune_cents as f64, -cents, cents)?;
        check_range("volume", self.volume as f64, 0.0, 1.0)?;
        let eq = MAX_EQ_DB as f64;
        check_range("eq_low_db", self.eq_low_db as f64, -eq, eq)?;
        check_range("eq_mid_db", self.eq_mid_db as f64, -eq, eq)?;
        check_range("eq_high_db", self.eq_high_db as f64, -eq, eq)?;
        check_range("speed", self.speed as f64, MIN_SPEED as f64, MAX_SPEED as f64)?;
        Ok(())
    }

    /// Coerce every parameter into range (non-finite values fall back to defaults)
    pub fn clamped(&self) -> Self {
        let defaults = Self::default();
        let finite_or = |v: f32, d: f32| if v.is_finite() { v } else { d };
        Self {
            detune_cents: self.detune_cents.clamp(-MAX_DETUNE_CENTS, MAX_DETUNE_CENTS),
            vocal_removal: self.vocal_removal,
            volume: finite_or(self.volume, defaults.volume).clamp(0.0, 1.0),
            eq_low_db: finite_or(self.eq_low_db, 0.0).clamp(-MAX_EQ_DB, MAX_EQ_DB),
            eq_mid_db: finite_or(self.eq_mid_db, 0.0).clamp(-MAX_EQ_DB, MAX_EQ_DB),
            eq_high_db: finite_or(self.eq_high_db, 0.0).clamp(-MAX_EQ_DB, MAX_EQ_DB),
            speed: finite_or(self.speed, defaults.speed).clamp(MIN_SPEED, MAX_SPEED),
        }
    }

    pub fn with_speed(&self, speed: f32) -> Self {
        Self { speed, ..*self }
    }

    pub fn with_vocal_removal(&self, vocal_removal: bool) -> Self {
        Self {
            vocal_removal,
            ..*self
        }
    }

    /// Step the detune by whole semitones, saturating at ±12
    pub fn adjust_pitch(&self, semitones: i32) -> Self {
        let cents = self
            .detune_cents
            .saturating_add(semitones.saturating_mul(100))
            .clamp(-MAX_DETUNE_CENTS, MAX_DETUNE_CENTS);
        Self {
            detune_cents: cents,
            ..*self
        }
    }

    /// Shift the pitch shifter must apply so that perceived pitch follows
    /// only the detune: `cents / 100 - 12 * log2(speed)`
    pub fn commanded_shift(&self) -> f32 {
        let speed = if self.speed > 0.0 { self.speed } else { 1.0 };
        self.detune_cents as f32 / 100.0 - 12.0 * speed.log2()
    }

    /// Load a settings snapshot from JSON; missing fields take defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }
}

/// Engine-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frames per render block
    pub block_size: usize,
    /// Analysis window length
    pub fft_size: usize,
    /// Maximum frames handed to the encoder per call
    pub export_chunk_frames: usize,
    /// Settings the engine starts with
    pub default_settings: AudioSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: 128,
            fft_size: 2048,
            export_chunk_frames: 1152,
            default_settings: AudioSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_range("block_size", self.block_size as f64, 1.0, 8192.0)?;
        if !self.fft_size.is_power_of_two() || self.fft_size < 64 {
            return Err(PitchlabError::InvalidParameter {
                param: "fft_size".to_string(),
                value: self.fft_size as f64,
                min: 64.0,
                max: 32768.0,
            });
        }
        check_range("fft_size", self.fft_size as f64, 64.0, 32768.0)?;
        check_range(
            "export_chunk_frames",
            self.export_chunk_frames as f64,
            1.0,
            1_048_576.0,
        )?;
        self.default_settings.validate()
    }
}
