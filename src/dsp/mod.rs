//! DSP Node Library
//!
//! Signal processing stages a processing graph is assembled from.
//! All nodes implement the `Effect` trait for uniform processing.

pub mod biquad;
pub mod delay_line;
mod effect;
mod gain;
mod isolation;
pub mod pitch;
pub mod smooth;
mod tone;

pub use biquad::{Biquad, BiquadCoeffs, FilterType};
pub use delay_line::DelayLine;
pub use effect::{Effect, EffectParams};
pub use gain::MasterGain;
pub use isolation::{StereoBypass, VocalIsolationNetwork};
pub use pitch::{GrainModulator, GrainTaps, PitchShifter};
pub use smooth::SmoothedValue;
pub use tone::{ToneBand, ToneShapingChain, MAX_BAND_GAIN_DB};
