//! Playback engine
//!
//! The single object a front-end talks to. It owns the decoded track, the
//! current settings snapshot, the playback clock and the one live graph,
//! and enforces the lifecycle:
//!
//! ```text
//! Unloaded ──load──▶ Paused ◀──pause/auto-stop── Playing
//!                      │  └────────play──────────▶  │
//!                      └──export──▶ Exporting ──────┘ (returns to Paused)
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::clock::{EngineState, PlaybackClock};
use crate::engine::export::{CancelToken, EncodedAudio, ExportPipeline};
use crate::engine::io::{AudioContext, Decoder, EncoderFactory, Fetcher, WavDecoder, WavEncoderFactory};
use crate::engine::{AudioBuffer, AudioSettings, DecodedTrack, EngineConfig};
use crate::error::{PitchlabError, Result};
use crate::graph::{GraphBuilder, GraphUpdate, ProcessingGraph, RenderMode};

// ============================================================================
// Live Output
// ============================================================================

/// Slot holding the one live graph, shared with the render callback
#[derive(Debug, Clone, Default)]
pub struct LiveOutput {
    slot: Arc<Mutex<Option<ProcessingGraph>>>,
}

impl LiveOutput {
    /// Fill `block` with the next frames of the live graph
    ///
    /// Never blocks: if the control side holds the slot (rebuild in
    /// progress) or no graph is installed, the block is silent. Returns
    /// whether a graph rendered.
    pub fn render(&self, block: &mut AudioBuffer) -> bool {
        match self.slot.try_lock() {
            Some(mut guard) => match guard.as_mut() {
                Some(graph) => {
                    graph.render(block);
                    true
                }
                None => {
                    block.fill_silence();
                    false
                }
            },
            None => {
                block.fill_silence();
                false
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Destroy the current graph (if any), then install `graph`
    fn install(&self, graph: ProcessingGraph) {
        let mut slot = self.slot.lock();
        if let Some(mut old) = slot.take() {
            old.destroy();
        }
        *slot = Some(graph);
    }

    fn teardown(&self) {
        if let Some(mut old) = self.slot.lock().take() {
            old.destroy();
        }
    }

    fn with_graph<R>(&self, f: impl FnOnce(&mut ProcessingGraph) -> R) -> Option<R> {
        self.slot.lock().as_mut().map(f)
    }
}

// ============================================================================
// Export Job
// ============================================================================

/// Everything an export needs, detached from the engine
///
/// Produced by `PlaybackEngine::start_export`; may run on any thread. The
/// engine stays in `Exporting` until `finish_export`.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pipeline: ExportPipeline,
    track: Arc<DecodedTrack>,
    settings: AudioSettings,
    resume_position: f64,
}

impl ExportJob {
    pub fn run(&self, cancel: Option<&CancelToken>) -> Result<EncodedAudio> {
        self.pipeline.render(&self.track, &self.settings, cancel)
    }

    #[cfg(feature = "async-export")]
    pub async fn run_async(&self, cancel: Option<CancelToken>) -> Result<EncodedAudio> {
        self.pipeline
            .render_async(self.track.clone(), self.settings, cancel)
            .await
    }

    pub fn settings(&self) -> &AudioSettings {
        &self.settings
    }

    /// Position transport returns to once the export finishes
    pub fn resume_position(&self) -> f64 {
        self.resume_position
    }
}

// ============================================================================
// Playback Engine
// ============================================================================

/// Single-track playback and export engine
pub struct PlaybackEngine {
    context: Arc<dyn AudioContext>,
    decoder: Box<dyn Decoder>,
    fetcher: Option<Box<dyn Fetcher>>,
    config: EngineConfig,
    builder: GraphBuilder,
    exporter: ExportPipeline,
    track: Option<Arc<DecodedTrack>>,
    settings: AudioSettings,
    clock: PlaybackClock,
    state: EngineState,
    live: LiveOutput,
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("state", &self.state)
            .field("settings", &self.settings)
            .field("sample_rate", &self.context.sample_rate())
            .field("track_frames", &self.track.as_ref().map(|t| t.frames()))
            .finish()
    }
}

impl PlaybackEngine {
    /// Create an engine rendering for `context`
    ///
    /// Uses the WAV decoder and WAV encoder; with the `url-load` feature an
    /// HTTP fetcher is installed too. Fails with `PlatformUnsupported` when
    /// the context cannot render in real time.
    pub fn new(context: Arc<dyn AudioContext>, config: EngineConfig) -> Result<Self> {
        if !context.is_realtime_capable() {
            return Err(PitchlabError::PlatformUnsupported {
                reason: "audio context has no real-time rendering capability".to_string(),
            });
        }
        config.validate()?;

        let builder = GraphBuilder::new(context.sample_rate(), config.block_size)
            .with_fft_size(config.fft_size);
        let encoders: Arc<dyn EncoderFactory> = Arc::new(WavEncoderFactory);

        #[cfg(feature = "url-load")]
        let fetcher: Option<Box<dyn Fetcher>> =
            Some(Box::new(crate::engine::io::HttpFetcher::default()));
        #[cfg(not(feature = "url-load"))]
        let fetcher: Option<Box<dyn Fetcher>> = None;

        info!(
            sample_rate = context.sample_rate(),
            block_size = config.block_size,
            "engine created"
        );

        Ok(Self {
            exporter: ExportPipeline::new(&config, Some(encoders)),
            settings: config.default_settings,
            context,
            decoder: Box::new(WavDecoder),
            fetcher,
            builder,
            config,
            track: None,
            clock: PlaybackClock::default(),
            state: EngineState::Unloaded,
            live: LiveOutput::default(),
        })
    }

    pub fn with_decoder(mut self, decoder: Box<dyn Decoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Box<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Replace (or remove, with `None`) the encoder used for export
    pub fn with_encoder_factory(mut self, encoders: Option<Arc<dyn EncoderFactory>>) -> Self {
        self.exporter = ExportPipeline::new(&self.config, encoders);
        self
    }

    fn now(&self) -> f64 {
        self.context.current_time()
    }

    fn require_track(&self) -> Result<Arc<DecodedTrack>> {
        self.track.clone().ok_or(PitchlabError::NoTrackLoaded)
    }

    fn ensure_not_exporting(&self) -> Result<()> {
        if self.state == EngineState::Exporting {
            return Err(PitchlabError::ExportInProgress);
        }
        Ok(())
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Decode `bytes` and make it the current track
    ///
    /// Destructive: the previous track and graph are gone before decoding
    /// starts, so a failure leaves the engine `Unloaded`.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_not_exporting()?;
        self.unload();

        let pcm = self.decoder.decode(bytes)?;
        let track = DecodedTrack::new(pcm)?;
        self.install_track(track);
        Ok(())
    }

    /// Fetch `url` and load the result
    pub fn load_url(&mut self, url: &str) -> Result<()> {
        self.ensure_not_exporting()?;
        self.unload();

        let fetcher = self.fetcher.as_ref().ok_or_else(|| PitchlabError::NetworkError {
            url: url.to_string(),
            reason: "no fetcher configured".to_string(),
        })?;
        let bytes = fetcher.fetch(url)?;

        let pcm = self.decoder.decode(&bytes)?;
        let track = DecodedTrack::new(pcm)?;
        self.install_track(track);
        Ok(())
    }

    fn install_track(&mut self, track: DecodedTrack) {
        info!(
            channels = track.channels(),
            sample_rate = track.sample_rate(),
            frames = track.frames(),
            duration_secs = track.duration_secs(),
            "track loaded"
        );
        self.clock = PlaybackClock::new(track.duration_secs(), self.settings.speed as f64);
        self.track = Some(Arc::new(track));
        self.state = EngineState::Paused;
    }

    /// Drop the track and the live graph
    pub fn unload(&mut self) {
        self.live.teardown();
        if self.track.take().is_some() {
            debug!("track unloaded");
        }
        self.clock = PlaybackClock::default();
        self.state = EngineState::Unloaded;
    }

    // ========================================================================
    // Transport
    // ========================================================================

    pub fn play(&mut self) -> Result<()> {
        self.ensure_not_exporting()?;
        let track = self.require_track()?;
        if self.state == EngineState::Playing {
            return Ok(());
        }

        let now = self.now();
        let offset = self.clock.position(now);
        let graph = self
            .builder
            .build(track, &self.settings, RenderMode::Live, offset);
        self.live.install(graph);
        self.clock.play(now);
        self.state = EngineState::Playing;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.ensure_not_exporting()?;
        self.require_track()?;
        if self.state != EngineState::Playing {
            return Ok(());
        }

        self.clock.pause(self.now());
        self.live.teardown();
        self.state = EngineState::Paused;
        Ok(())
    }

    /// Jump to `seconds` (clamped to the track); returns the new position
    pub fn seek(&mut self, seconds: f64) -> Result<f64> {
        self.ensure_not_exporting()?;
        let track = self.require_track()?;

        let now = self.now();
        if self.state == EngineState::Playing {
            self.live.teardown();
            let target = self.clock.seek(now, seconds);
            let graph = self
                .builder
                .build(track, &self.settings, RenderMode::Live, target);
            self.live.install(graph);
            Ok(target)
        } else {
            Ok(self.clock.seek(now, seconds))
        }
    }

    /// Auto-stop check; call periodically (e.g. once per UI frame)
    ///
    /// Returns true when playback reached the end and the engine rewound
    /// to 0 in `Paused`.
    pub fn tick(&mut self) -> bool {
        if self.state == EngineState::Playing && self.clock.check_end(self.now()) {
            self.live.teardown();
            self.state = EngineState::Paused;
            info!("playback reached end of track");
            return true;
        }
        false
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Install a new settings snapshot
    ///
    /// Speed reaches the clock before the graph, so position stays
    /// continuous. A vocal-removal toggle rebuilds the live graph at the
    /// current position; anything else is updated in place.
    pub fn apply_settings(&mut self, settings: AudioSettings) -> Result<()> {
        settings.validate()?;
        let now = self.now();

        if settings.speed != self.settings.speed {
            self.clock.set_speed(now, settings.speed as f64);
        }
        self.settings = settings;

        if self.state != EngineState::Playing {
            return Ok(());
        }

        match self.live.with_graph(|graph| graph.apply(&settings)) {
            Some(GraphUpdate::Applied) => {}
            Some(GraphUpdate::RebuildRequired) | None => {
                let track = self.require_track()?;
                let offset = self.clock.position(now);
                self.live.teardown();
                let graph = self
                    .builder
                    .build(track, &self.settings, RenderMode::Live, offset);
                self.live.install(graph);
            }
        }
        Ok(())
    }

    /// Step the detune by whole semitones (saturating at ±12)
    pub fn adjust_pitch(&mut self, semitones: i32) -> Result<AudioSettings> {
        let settings = self.settings.adjust_pitch(semitones);
        self.apply_settings(settings)?;
        Ok(settings)
    }

    // ========================================================================
    // Export
    // ========================================================================

    /// Freeze transport and hand out an export job for the current settings
    pub fn start_export(&mut self) -> Result<ExportJob> {
        self.ensure_not_exporting()?;
        let track = self.require_track()?;

        let now = self.now();
        if self.state == EngineState::Playing {
            self.clock.pause(now);
            self.live.teardown();
        }
        let resume_position = self.clock.position(now);
        self.state = EngineState::Exporting;
        info!(resume_position, "export started");

        Ok(ExportJob {
            pipeline: self.exporter.clone(),
            track,
            settings: self.settings,
            resume_position,
        })
    }

    /// Leave `Exporting`; transport is `Paused` at the captured position
    pub fn finish_export(&mut self) {
        if self.state != EngineState::Exporting {
            warn!(state = %self.state, "finish_export called outside an export");
            return;
        }
        self.state = EngineState::Paused;
    }

    /// Export the whole track with the current settings
    pub fn export(&mut self, cancel: Option<&CancelToken>) -> Result<EncodedAudio> {
        let job = self.start_export()?;
        let result = job.run(cancel);
        self.finish_export();
        result
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn settings(&self) -> &AudioSettings {
        &self.settings
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn track(&self) -> Option<&Arc<DecodedTrack>> {
        self.track.as_ref()
    }

    /// Current position in seconds (0 when unloaded)
    pub fn position(&self) -> f64 {
        self.clock.position(self.now())
    }

    pub fn duration(&self) -> f64 {
        self.clock.duration()
    }

    /// Shift the live pitch shifter applies for the current settings
    pub fn commanded_shift(&self) -> f32 {
        self.settings.commanded_shift()
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    /// Handle for the platform render callback
    pub fn live_output(&self) -> LiveOutput {
        self.live.clone()
    }

    /// Id of the installed live graph
    pub fn live_graph_id(&self) -> Option<Uuid> {
        self.live.with_graph(|graph| graph.id())
    }

    /// Power spectrum of the live output, if playing
    pub fn spectrum(&self) -> Option<Vec<f32>> {
        self.live
            .with_graph(|graph| graph.analysis().map(|tap| tap.power_spectrum()))
            .flatten()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.live.teardown();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::export::float_to_i16;
    use crate::engine::io::{generate_stereo_test_tone, Encoder, ManualContext, WavEncoder};
    use crate::engine::ChannelLayout;

    const SR: u32 = 44100;

    fn wav(seconds: f32) -> Vec<u8> {
        let pcm = generate_stereo_test_tone(440.0, 440.0, seconds, SR);
        let left: Vec<i16> = pcm.samples[0].iter().map(|s| float_to_i16(s * 0.5)).collect();
        let right: Vec<i16> = pcm.samples[1].iter().map(|s| float_to_i16(s * 0.5)).collect();
        let mut encoder = WavEncoder::new(SR, 2);
        encoder.encode_chunk(&left, &right).unwrap();
        encoder.flush().unwrap()
    }

    fn engine() -> (PlaybackEngine, Arc<ManualContext>) {
        let context = Arc::new(ManualContext::new(SR));
        let engine = PlaybackEngine::new(context.clone(), EngineConfig::default()).unwrap();
        (engine, context)
    }

    #[test]
    fn test_new_requires_realtime() {
        let context = Arc::new(ManualContext::without_realtime(SR));
        assert!(matches!(
            PlaybackEngine::new(context, EngineConfig::default()),
            Err(PitchlabError::PlatformUnsupported { .. })
        ));
    }

    #[test]
    fn test_transport_without_track() {
        let (mut engine, _) = engine();
        assert_eq!(engine.state(), EngineState::Unloaded);
        assert!(matches!(engine.play(), Err(PitchlabError::NoTrackLoaded)));
        assert!(matches!(engine.seek(1.0), Err(PitchlabError::NoTrackLoaded)));
        assert_eq!(engine.position(), 0.0);
    }

    #[test]
    fn test_live_output_renders_while_playing() {
        let (mut engine, _) = engine();
        engine.load_bytes(&wav(0.5)).unwrap();
        let output = engine.live_output();

        let mut block = AudioBuffer::new(128, ChannelLayout::Stereo, SR);
        assert!(!output.render(&mut block));

        engine.play().unwrap();
        assert!(output.is_active());
        for _ in 0..10 {
            assert!(output.render(&mut block));
        }
        assert!(block.samples[0].iter().any(|s| s.abs() > 0.1));

        engine.pause().unwrap();
        assert!(!output.render(&mut block));
        assert!(block.samples[0].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_render_is_silent_while_slot_is_held() {
        let (mut engine, _) = engine();
        engine.load_bytes(&wav(0.5)).unwrap();
        engine.play().unwrap();
        let output = engine.live_output();

        let guard = output.slot.lock();
        let mut block = generate_stereo_test_tone(100.0, 100.0, 0.01, SR);
        assert!(!output.render(&mut block));
        assert!(block.samples[0].iter().all(|s| *s == 0.0));
        drop(guard);
    }

    #[test]
    fn test_export_round_trip_state() {
        let (mut engine, context) = engine();
        engine.load_bytes(&wav(1.0)).unwrap();
        engine.play().unwrap();
        context.set_time(0.25);

        let job = engine.start_export().unwrap();
        assert_eq!(engine.state(), EngineState::Exporting);
        assert!(!engine.live_output().is_active());
        assert!(matches!(engine.play(), Err(PitchlabError::ExportInProgress)));
        assert!(matches!(engine.start_export(), Err(PitchlabError::ExportInProgress)));

        let encoded = job.run(None).unwrap();
        assert_eq!(encoded.frames, 44100);
        engine.finish_export();

        assert_eq!(engine.state(), EngineState::Paused);
        assert!((engine.position() - 0.25).abs() < 1e-9);
        assert!((job.resume_position() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_export_without_encoder() {
        let (engine, _) = engine();
        let mut engine = engine.with_encoder_factory(None);
        engine.load_bytes(&wav(0.1)).unwrap();
        assert!(matches!(
            engine.export(None),
            Err(PitchlabError::EncoderUnavailable)
        ));
        // The failure is scoped to the call
        assert_eq!(engine.state(), EngineState::Paused);
        engine.play().unwrap();
    }

    #[test]
    fn test_load_url_without_fetcher() {
        let (mut engine, _) = engine();
        engine.fetcher = None;
        assert!(matches!(
            engine.load_url("http://localhost/track.wav"),
            Err(PitchlabError::NetworkError { .. })
        ));
        assert_eq!(engine.state(), EngineState::Unloaded);
    }
}
