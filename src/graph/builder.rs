//! Graph construction and evaluation.
//!
//! ```text
//! TrackSource → PitchShifter → (VocalIsolation | StereoBypass) → ToneShaping → MasterGain → out
//!                                                                                    └→ AnalysisTap (live)
//! ```
//!
//! Live and offline graphs are configured by the same code, so rendering the
//! same settings in either mode yields identical samples.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::dsp::{
    Effect, MasterGain, PitchShifter, StereoBypass, ToneBand, ToneShapingChain,
    VocalIsolationNetwork,
};
use crate::engine::export::CancelToken;
use crate::engine::{AudioBuffer, AudioSettings, ChannelLayout, DecodedTrack};
use crate::error::{PitchlabError, Result};
use crate::graph::analysis::AnalysisTap;

/// Where a graph's output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Device output with an analysis tap
    Live,
    /// Fixed-length render target
    Offline { frames: usize },
}

/// Outcome of pushing new settings into a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphUpdate {
    /// Parameters updated in place
    Applied,
    /// Topology changed; destroy this graph and build a new one
    RebuildRequired,
}

// ============================================================================
// Track Source
// ============================================================================

/// Reads the decoded track at a fractional position
///
/// Advances `speed × track_rate / context_rate` track frames per output
/// frame with linear interpolation. Mono is duplicated to both sides;
/// reads past the end are silent.
#[derive(Debug, Clone)]
pub struct TrackSource {
    track: Arc<DecodedTrack>,
    position: f64,
    rate_ratio: f64,
    step: f64,
}

impl TrackSource {
    pub fn new(track: Arc<DecodedTrack>, context_rate: u32, start_offset_secs: f64, speed: f32) -> Self {
        let rate_ratio = track.sample_rate() as f64 / context_rate.max(1) as f64;
        let position = start_offset_secs.max(0.0) * track.sample_rate() as f64;
        Self {
            track,
            position,
            rate_ratio,
            step: speed as f64 * rate_ratio,
        }
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.step = speed as f64 * self.rate_ratio;
    }

    /// Track position in seconds
    pub fn position_secs(&self) -> f64 {
        self.position / self.track.sample_rate() as f64
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.track.frames() as f64
    }

    #[inline]
    fn sample_at(&self, position: f64) -> (f32, f32) {
        let index = position.floor();
        let frac = (position - index) as f32;
        let index = index as usize;
        let (l0, r0) = self.track.stereo_frame(index);
        if frac == 0.0 {
            return (l0, r0);
        }
        let (l1, r1) = self.track.stereo_frame(index + 1);
        (l0 + (l1 - l0) * frac, r0 + (r1 - r0) * frac)
    }

    /// Overwrite `out` with the next frames of the track
    pub fn fill(&mut self, out: &mut AudioBuffer) {
        for frame in 0..out.num_frames() {
            let (left, right) = if self.is_finished() {
                (0.0, 0.0)
            } else {
                self.sample_at(self.position)
            };
            out.samples[0][frame] = left;
            if let Some(channel) = out.samples.get_mut(1) {
                channel[frame] = right;
            }
            self.position += self.step;
        }
    }
}

// ============================================================================
// Graph Builder
// ============================================================================

/// Builds processing graphs for one audio context
#[derive(Debug, Clone, Copy)]
pub struct GraphBuilder {
    sample_rate: u32,
    block_size: usize,
    fft_size: usize,
}

impl GraphBuilder {
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size: block_size.max(1),
            fft_size: 2048,
        }
    }

    pub fn with_fft_size(mut self, fft_size: usize) -> Self {
        self.fft_size = fft_size;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Instantiate a fresh graph reading `track` from `start_offset_secs`
    pub fn build(
        &self,
        track: Arc<DecodedTrack>,
        settings: &AudioSettings,
        mode: RenderMode,
        start_offset_secs: f64,
    ) -> ProcessingGraph {
        let settings = settings.clamped();

        let isolation: Box<dyn Effect> = if settings.vocal_removal {
            Box::new(VocalIsolationNetwork::new(self.sample_rate))
        } else {
            Box::new(StereoBypass::new())
        };

        let analysis = match mode {
            RenderMode::Live => Some(AnalysisTap::new(self.fft_size, self.sample_rate)),
            RenderMode::Offline { .. } => None,
        };

        let mut graph = ProcessingGraph {
            id: Uuid::new_v4(),
            mode,
            settings,
            block_size: self.block_size,
            sample_rate: self.sample_rate,
            source: TrackSource::new(track, self.sample_rate, start_offset_secs, settings.speed),
            shifter: PitchShifter::new(self.sample_rate),
            isolation,
            tone: ToneShapingChain::new(self.sample_rate),
            master: MasterGain::new(settings.volume, self.sample_rate),
            analysis,
            frames_rendered: 0,
            destroyed: false,
        };
        graph.prepare_nodes();
        graph.configure(&settings, true);
        for node in graph.nodes() {
            debug!(
                graph = %graph.id,
                node = node.id(),
                name = node.display_name(),
                params = %node.get_params(),
                "node wired"
            );
        }

        info!(
            graph = %graph.id,
            ?mode,
            vocal_removal = settings.vocal_removal,
            shift = settings.commanded_shift(),
            start_offset_secs,
            "graph built"
        );
        graph
    }
}

// ============================================================================
// Processing Graph
// ============================================================================

/// One fully wired chain of nodes
///
/// Owns every node it creates. `destroy` disconnects all of them; it is
/// idempotent and runs on drop.
pub struct ProcessingGraph {
    id: Uuid,
    mode: RenderMode,
    settings: AudioSettings,
    block_size: usize,
    sample_rate: u32,
    source: TrackSource,
    shifter: PitchShifter,
    isolation: Box<dyn Effect>,
    tone: ToneShapingChain,
    master: MasterGain,
    analysis: Option<AnalysisTap>,
    frames_rendered: usize,
    destroyed: bool,
}

impl std::fmt::Debug for ProcessingGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingGraph")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("settings", &self.settings)
            .field("isolation", &self.isolation.effect_type())
            .field("frames_rendered", &self.frames_rendered)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl ProcessingGraph {
    fn prepare_nodes(&mut self) {
        let (sample_rate, block_size) = (self.sample_rate, self.block_size);
        for node in self.nodes_mut() {
            node.prepare(sample_rate, block_size);
        }
    }

    /// Shared configuration path for build and in-place updates
    ///
    /// `immediate` jumps smoothed parameters to their targets (construction);
    /// otherwise they glide.
    fn configure(&mut self, settings: &AudioSettings, immediate: bool) {
        let shift = settings.commanded_shift();
        if immediate || shift != self.shifter.semitones() {
            self.shifter.set_pitch(shift);
        }

        let gains = [
            (ToneBand::Low, settings.eq_low_db),
            (ToneBand::Mid, settings.eq_mid_db),
            (ToneBand::High, settings.eq_high_db),
        ];
        for (band, gain_db) in gains {
            if immediate {
                self.tone.set_gain_db_immediate(band, gain_db);
            } else {
                self.tone.set_gain_db(band, gain_db);
            }
        }

        if immediate {
            self.master.set_volume_immediate(settings.volume);
        } else {
            self.master.set_volume(settings.volume);
        }

        self.source.set_speed(settings.speed);
    }

    /// Push a new settings snapshot
    ///
    /// Continuous parameters change in place. A vocal-removal toggle changes
    /// the topology, leaves the graph untouched and asks for a rebuild.
    pub fn apply(&mut self, settings: &AudioSettings) -> GraphUpdate {
        let settings = settings.clamped();
        if settings.vocal_removal != self.settings.vocal_removal {
            debug!(graph = %self.id, "vocal removal toggled, rebuild required");
            return GraphUpdate::RebuildRequired;
        }
        self.configure(&settings, false);
        self.settings = settings;
        GraphUpdate::Applied
    }

    /// Render the next `out.num_frames()` frames into `out`
    ///
    /// A destroyed graph renders silence.
    pub fn render(&mut self, out: &mut AudioBuffer) {
        if self.destroyed {
            out.fill_silence();
            return;
        }

        self.source.fill(out);
        self.shifter.process(out);
        self.isolation.process(out);
        self.tone.process(out);
        self.master.process(out);

        if let Some(tap) = self.analysis.as_mut() {
            tap.push(out);
        }
        self.frames_rendered += out.num_frames();
    }

    /// Render an offline graph to completion
    ///
    /// The cancel token is checked between blocks.
    pub fn render_offline(&mut self, cancel: Option<&CancelToken>) -> Result<AudioBuffer> {
        let total = match self.mode {
            RenderMode::Offline { frames } => frames,
            RenderMode::Live => {
                return Err(PitchlabError::InvalidParameter {
                    param: "render_mode".to_string(),
                    value: 0.0,
                    min: 1.0,
                    max: 1.0,
                })
            }
        };

        let mut output = AudioBuffer::new(total, ChannelLayout::Stereo, self.sample_rate);
        let mut block = AudioBuffer::new(self.block_size, ChannelLayout::Stereo, self.sample_rate);
        let mut written = 0;

        while written < total {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                info!(graph = %self.id, written, total, "offline render cancelled");
                return Err(PitchlabError::ExportCancelled);
            }

            let frames = self.block_size.min(total - written);
            if block.num_frames() != frames {
                block.resize(frames);
            }
            self.render(&mut block);
            for (out, rendered) in output.samples.iter_mut().zip(&block.samples) {
                out[written..written + frames].copy_from_slice(rendered);
            }
            written += frames;
        }

        debug!(graph = %self.id, frames = total, "offline render complete");
        Ok(output)
    }

    /// Disconnect every node; safe to call more than once
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        for node in self.nodes_mut() {
            node.disconnect();
        }
        if let Some(tap) = self.analysis.as_mut() {
            tap.clear();
        }
        self.destroyed = true;
        debug!(graph = %self.id, frames_rendered = self.frames_rendered, "graph destroyed");
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn settings(&self) -> &AudioSettings {
        &self.settings
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn frames_rendered(&self) -> usize {
        self.frames_rendered
    }

    /// Track position of the source in seconds
    pub fn source_position_secs(&self) -> f64 {
        self.source.position_secs()
    }

    pub fn is_vocal_removal_active(&self) -> bool {
        self.isolation.effect_type() == "vocal_isolation"
    }

    pub fn shifter(&self) -> &PitchShifter {
        &self.shifter
    }

    pub fn analysis(&self) -> Option<&AnalysisTap> {
        self.analysis.as_ref()
    }

    /// Every node still wired in, in signal order
    pub fn nodes(&self) -> [&dyn Effect; 4] {
        [
            &self.shifter,
            &*self.isolation,
            &self.tone,
            &self.master,
        ]
    }

    fn nodes_mut(&mut self) -> [&mut dyn Effect; 4] {
        [
            &mut self.shifter,
            &mut *self.isolation,
            &mut self.tone,
            &mut self.master,
        ]
    }
}

impl Drop for ProcessingGraph {
    fn drop(&mut self) {
        self.destroy();
    }
}

// ============================================================================
// Tests
// ============================================================================
