//! Processing graphs
//!
//! A graph is one fully wired chain of DSP nodes fed by the decoded track.
//! The same builder serves live playback and offline export.

pub mod analysis;
mod builder;

pub use analysis::AnalysisTap;
pub use builder::{GraphBuilder, GraphUpdate, ProcessingGraph, RenderMode, TrackSource};
