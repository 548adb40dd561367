//! Granular Pitch Shifter
//!
//! Shifts pitch without changing duration using two modulated delay lines.
//!
//! # Algorithm
//!
//! Both delay lines receive the same input. Over each grain period the delay
//! of a line follows a falling ramp, which resamples its output by
//! `1 - d(delay)/dt`; a half-sine fade hides the jump when the ramp wraps.
//! The second line runs half a grain behind the first, so one line is always
//! near full gain while the other crosses its wrap point.
//!
//! ```text
//!            ┌─ DelayLine A ─ fade A ─┐
//! input ─────┤                        ├── (+) ── output
//!            └─ DelayLine B ─ fade B ─┘
//!   delay = base + depth × ramp(phase)      fade = sin(π × phase)
//! ```

use crate::dsp::delay_line::DelayLine;
use crate::dsp::effect::{Effect, EffectParams};
use crate::engine::AudioBuffer;
use crate::impl_effect_common;
use serde_json::{json, Value};
use std::f64::consts::PI;
use tracing::debug;

// ============================================================================
// Constants
// ============================================================================

/// Duration of one crossfade cycle (seconds)
pub const GRAIN_PERIOD_SECS: f64 = 0.1;

/// Shortest delay either line reaches while modulating (seconds)
const MIN_GRAIN_DELAY_SECS: f64 = 0.01;

/// Fixed latency of the unmodulated path (seconds)
pub const BYPASS_DELAY_SECS: f64 = 0.005;

/// Shifts smaller than this (semitones) run unmodulated
pub const BYPASS_THRESHOLD_SEMITONES: f32 = 0.01;

/// Largest shift accepted, user detune plus speed compensation (semitones)
pub const MAX_SHIFT_SEMITONES: f32 = 24.0;

// ============================================================================
// Helper Functions
// ============================================================================

/// Modulation depth in seconds for a shift in semitones
///
/// Positive depth sweeps the delay down (pitch up), negative sweeps it up
/// (pitch down).
pub fn grain_depth_secs(semitones: f32) -> f64 {
    (2.0_f64.powf(semitones as f64 / 12.0) - 1.0) * GRAIN_PERIOD_SECS
}

/// Fade window over one grain: 0 → 1 → 0
#[inline]
pub fn half_sine(phase: f64) -> f32 {
    (PI * phase).sin() as f32
}

/// Delay sweep over one grain: 1 → 0
#[inline]
pub fn falling_ramp(phase: f64) -> f64 {
    1.0 - phase
}

// ============================================================================
// Grain Modulator
// ============================================================================

/// Delay and fade for both lines at one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainTaps {
    pub delay_a: f64,
    pub fade_a: f32,
    pub delay_b: f64,
    pub fade_b: f32,
}

/// Pair of phase-locked periodic generators driving the two lines
///
/// Line B always reads the phase half a period away from line A.
#[derive(Debug, Clone)]
pub struct GrainModulator {
    phase: f64,
    increment: f64,
    base_delay: f64,
    depth: f64,
}

impl GrainModulator {
    /// Start a modulator at phase 0 for the given shift
    pub fn start(semitones: f32, sample_rate: u32) -> Self {
        let sr = sample_rate as f64;
        let depth_secs = grain_depth_secs(semitones);
        // Lowering sweeps the delay upward from base, so base must absorb |depth|
        let base_secs = MIN_GRAIN_DELAY_SECS + (-depth_secs).max(0.0);

        Self {
            phase: 0.0,
            increment: 1.0 / (GRAIN_PERIOD_SECS * sr),
            base_delay: base_secs * sr,
            depth: depth_secs * sr,
        }
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Depth in samples
    pub fn depth(&self) -> f64 {
        self.depth
    }

    /// Taps for the current sample, then advance one sample
    #[inline]
    pub fn tick(&mut self) -> GrainTaps {
        let phase_a = self.phase;
        let phase_b = (phase_a + 0.5).fract();

        let taps = GrainTaps {
            delay_a: self.base_delay + self.depth * falling_ramp(phase_a),
            fade_a: half_sine(phase_a),
            delay_b: self.base_delay + self.depth * falling_ramp(phase_b),
            fade_b: half_sine(phase_b),
        };

        self.phase += self.increment;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        taps
    }

    fn restart(&mut self) {
        self.phase = 0.0;
    }
}

// ============================================================================
// Pitch Shifter
// ============================================================================

/// Granular dual-delay-line pitch shifter
///
/// # Example
/// ```
/// use pitchlab::dsp::PitchShifter;
///
/// let mut shifter = PitchShifter::new(44100);
/// assert!(shifter.is_bypassed());
///
/// shifter.set_pitch(7.0);
/// assert!(!shifter.is_bypassed());
/// ```
#[derive(Debug, Clone)]
pub struct PitchShifter {
    params: EffectParams,
    semitones: f32,
    sample_rate: u32,
    line_a: DelayLine,
    line_b: DelayLine,
    modulator: Option<GrainModulator>,
}

impl PitchShifter {
    /// Create an unshifted (bypassed) pitch shifter for a context sample rate
    pub fn new(sample_rate: u32) -> Self {
        let capacity = Self::line_capacity(sample_rate);
        Self {
            params: EffectParams::default(),
            semitones: 0.0,
            sample_rate,
            line_a: DelayLine::new(2, capacity),
            line_b: DelayLine::new(2, capacity),
            modulator: None,
        }
    }

    /// Delay capacity (samples) covering the largest shift in either direction
    fn line_capacity(sample_rate: u32) -> usize {
        let max_depth = grain_depth_secs(MAX_SHIFT_SEMITONES)
            .abs()
            .max(grain_depth_secs(-MAX_SHIFT_SEMITONES).abs());
        let max_secs = MIN_GRAIN_DELAY_SECS + max_depth + BYPASS_DELAY_SECS;
        (max_secs * sample_rate as f64).ceil() as usize + 2
    }

    /// Set the shift in semitones
    ///
    /// Any running modulator is stopped and discarded first so the new grain
    /// cycle starts at phase 0. Shifts below the bypass threshold run
    /// unmodulated.
    pub fn set_pitch(&mut self, semitones: f32) {
        let semitones = semitones.clamp(-MAX_SHIFT_SEMITONES, MAX_SHIFT_SEMITONES);
        self.stop_modulation();
        self.semitones = semitones;

        if semitones.abs() >= BYPASS_THRESHOLD_SEMITONES {
            self.modulator = Some(GrainModulator::start(semitones, self.sample_rate));
        }

        debug!(
            node = %self.params.id,
            semitones,
            bypassed = self.modulator.is_none(),
            "pitch shift updated"
        );
    }

    /// Stop the running modulator, if any. Already stopped is fine.
    fn stop_modulation(&mut self) {
        self.modulator = None;
    }

    pub fn semitones(&self) -> f32 {
        self.semitones
    }

    /// True while no modulation runs
    pub fn is_bypassed(&self) -> bool {
        self.modulator.is_none()
    }

    /// Phase of line A within the grain, None when bypassed
    pub fn grain_phase(&self) -> Option<f64> {
        self.modulator.as_ref().map(GrainModulator::phase)
    }

    /// Latency of the unmodulated path in frames
    pub fn bypass_latency_frames(&self) -> usize {
        (BYPASS_DELAY_SECS * self.sample_rate as f64).round() as usize
    }
}

impl Default for PitchShifter {
    fn default() -> Self {
        Self::new(44100)
    }
}

impl Effect for PitchShifter {
    impl_effect_common!(PitchShifter, "pitch_shifter", "Pitch Shifter");

    fn process(&mut self, buffer: &mut AudioBuffer) {
        if !self.params.connected {
            return;
        }

        let channels = buffer.num_channels().min(2);
        let bypass_delay = self.bypass_latency_frames();

        for frame in 0..buffer.num_frames() {
            for ch in 0..channels {
                let input = buffer.samples[ch][frame];
                self.line_a.write(ch, input);
                self.line_b.write(ch, input);
            }

            match self.modulator.as_mut() {
                Some(modulator) => {
                    let taps = modulator.tick();
                    for ch in 0..channels {
                        let a = self.line_a.read_fractional(ch, taps.delay_a);
                        let b = self.line_b.read_fractional(ch, taps.delay_b);
                        buffer.samples[ch][frame] = a * taps.fade_a + b * taps.fade_b;
                    }
                }
                None => {
                    // Fade 1 on line A, 0 on line B
                    for ch in 0..channels {
                        buffer.samples[ch][frame] = self.line_a.read(ch, bypass_delay);
                    }
                }
            }

            self.line_a.advance();
            self.line_b.advance();
        }
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_size: usize) {
        if sample_rate == self.sample_rate {
            return;
        }
        self.sample_rate = sample_rate;
        let capacity = Self::line_capacity(sample_rate);
        self.line_a = DelayLine::new(2, capacity);
        self.line_b = DelayLine::new(2, capacity);
        self.set_pitch(self.semitones);
    }

    fn reset(&mut self) {
        self.line_a.clear();
        self.line_b.clear();
        if let Some(modulator) = self.modulator.as_mut() {
            modulator.restart();
        }
    }

    fn get_params(&self) -> Value {
        json!({
            "semitones": self.semitones,
            "bypassed": self.is_bypassed(),
            "grain_period_ms": GRAIN_PERIOD_SECS * 1000.0,
            "connected": self.params.connected
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
