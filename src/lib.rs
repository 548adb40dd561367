//! Pitchlab - Real-time manipulation of a single recording
//!
//! Pitch shift without changing speed, speed change without changing pitch,
//! vocal removal by phase cancellation, three-band EQ and offline export.
//!
//! # Architecture
//!
//! - `dsp`: processing nodes (granular pitch shifter, vocal isolation,
//!   tone shaping, master gain) built on biquads, delay lines and smoothers
//! - `graph`: wires nodes into a live or offline processing graph
//! - `engine`: owns the track, the clock and the live graph; exports
//!
//! ```no_run
//! use std::sync::Arc;
//! use pitchlab::engine::{AudioSettings, EngineConfig, PlaybackEngine, SystemContext};
//!
//! # fn main() -> pitchlab::Result<()> {
//! let context = Arc::new(SystemContext::new(44100));
//! let mut engine = PlaybackEngine::new(context, EngineConfig::default())?;
//! engine.load_bytes(&std::fs::read("song.wav")?)?;
//! engine.apply_settings(AudioSettings { detune_cents: -200, ..Default::default() })?;
//! engine.play()?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod graph;

pub use error::{PitchlabError, Result};
