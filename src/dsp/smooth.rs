//! Exponentially smoothed parameter values.
//!
//! A target change never reaches the audio as a step: the current value
//! approaches the target with a fixed time constant, the same curve a
//! `setTargetAtTime` automation produces.

/// Time constant for EQ band gains (seconds)
pub const EQ_TIME_CONSTANT: f32 = 0.1;

/// Time constant for master volume (seconds)
pub const VOLUME_TIME_CONSTANT: f32 = 0.02;

/// Distance from the target below which the value snaps onto it
const SNAP_EPSILON: f32 = 1e-5;

/// Parameter value that approaches its target exponentially
#[derive(Debug, Clone)]
pub struct SmoothedValue {
    current: f32,
    target: f32,
    time_constant: f32,
    sample_rate: f32,
    coeff: f32,
}

impl SmoothedValue {
    pub fn new(initial: f32, time_constant_secs: f32, sample_rate: u32) -> Self {
        let mut value = Self {
            current: initial,
            target: initial,
            time_constant: time_constant_secs,
            sample_rate: sample_rate as f32,
            coeff: 0.0,
        };
        value.coeff = value.decay(1);
        value
    }

    /// Remaining-distance factor after `samples` samples
    fn decay(&self, samples: usize) -> f32 {
        if self.time_constant <= 0.0 || self.sample_rate <= 0.0 {
            return 0.0;
        }
        (-(samples as f32) / (self.time_constant * self.sample_rate)).exp()
    }

    #[inline]
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// Jump straight to `value`
    #[inline]
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate as f32;
        self.coeff = self.decay(1);
    }

    /// Call once per sample in the audio callback.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        if self.current != self.target {
            self.current = self.target + (self.current - self.target) * self.coeff;
            self.snap();
        }
        self.current
    }

    /// Skip ahead `samples` samples at once
    pub fn advance(&mut self, samples: usize) -> f32 {
        if self.current != self.target {
            self.current = self.target + (self.current - self.target) * self.decay(samples);
            self.snap();
        }
        self.current
    }

    #[inline]
    fn snap(&mut self) {
        if (self.current - self.target).abs() < SNAP_EPSILON {
            self.current = self.target;
        }
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    #[inline]
    pub fn is_smoothing(&self) -> bool {
        self.current != self.target
    }
}
