//! Offline export
//!
//! Renders the track through an offline graph built exactly like the live
//! one, converts the result to 16-bit PCM and hands it to an encoder in
//! bounded chunks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::engine::io::EncoderFactory;
use crate::engine::{AudioBuffer, AudioSettings, DecodedTrack, EngineConfig};
use crate::error::{PitchlabError, Result};
use crate::graph::{GraphBuilder, RenderMode};

/// Shared flag that stops an export between render blocks
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Finished export
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedAudio {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Rendered frames per channel
    pub frames: usize,
    pub sample_rate: u32,
    /// Hex SHA-256 of `bytes`
    pub checksum: String,
}

impl EncodedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }
}

/// Output length of a render: `ceil(duration / speed × sample_rate)`
pub fn export_frame_count(duration_secs: f64, speed: f32, sample_rate: u32) -> usize {
    let speed = if speed > 0.0 { speed as f64 } else { 1.0 };
    let exact = duration_secs / speed * sample_rate as f64;
    // Absorb float error so an exact product does not round up a frame
    (exact - 1e-9).ceil().max(0.0) as usize
}

/// Convert a float sample to 16-bit PCM
///
/// Clamped to [-1, 1]; negative values scale by 32768, positive by 32767.
#[inline]
pub fn float_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

fn checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Offline render and encode
#[derive(Clone)]
pub struct ExportPipeline {
    block_size: usize,
    chunk_frames: usize,
    encoders: Option<Arc<dyn EncoderFactory>>,
}

impl std::fmt::Debug for ExportPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportPipeline")
            .field("block_size", &self.block_size)
            .field("chunk_frames", &self.chunk_frames)
            .field("has_encoder", &self.encoders.is_some())
            .finish()
    }
}

impl ExportPipeline {
    pub fn new(config: &EngineConfig, encoders: Option<Arc<dyn EncoderFactory>>) -> Self {
        Self {
            block_size: config.block_size.max(1),
            chunk_frames: config.export_chunk_frames.max(1),
            encoders,
        }
    }

    /// Render and encode the whole track with `settings`
    pub fn render(
        &self,
        track: &Arc<DecodedTrack>,
        settings: &AudioSettings,
        cancel: Option<&CancelToken>,
    ) -> Result<EncodedAudio> {
        let factory = self
            .encoders
            .as_ref()
            .ok_or(PitchlabError::EncoderUnavailable)?;

        let pcm = self.render_pcm(track, settings, cancel)?;
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(PitchlabError::ExportCancelled);
        }

        let mut encoder = factory.create(pcm.sample_rate, 2)?;
        let mut bytes = Vec::new();
        let mut left = Vec::with_capacity(self.chunk_frames);
        let mut right = Vec::with_capacity(self.chunk_frames);
        let mut chunks = 0usize;

        for (l_chunk, r_chunk) in pcm.samples[0]
            .chunks(self.chunk_frames)
            .zip(pcm.samples[1].chunks(self.chunk_frames))
        {
            left.clear();
            right.clear();
            left.extend(l_chunk.iter().map(|s| float_to_i16(*s)));
            right.extend(r_chunk.iter().map(|s| float_to_i16(*s)));
            bytes.extend(encoder.encode_chunk(&left, &right)?);
            chunks += 1;
        }
        bytes.extend(encoder.flush()?);

        let encoded = EncodedAudio {
            checksum: checksum(&bytes),
            mime_type: encoder.mime_type().to_string(),
            frames: pcm.num_frames(),
            sample_rate: pcm.sample_rate,
            bytes,
        };
        info!(
            frames = encoded.frames,
            chunks,
            bytes = encoded.bytes.len(),
            checksum = %encoded.checksum,
            "export complete"
        );
        Ok(encoded)
    }

    /// Render the processed stereo PCM without encoding
    ///
    /// The offline graph runs at the track's own sample rate for
    /// `ceil(duration / speed × rate)` frames.
    pub fn render_pcm(
        &self,
        track: &Arc<DecodedTrack>,
        settings: &AudioSettings,
        cancel: Option<&CancelToken>,
    ) -> Result<AudioBuffer> {
        let settings = settings.clamped();
        let sample_rate = track.sample_rate();
        let frames = export_frame_count(track.duration_secs(), settings.speed, sample_rate);
        debug!(
            frames,
            sample_rate,
            speed = settings.speed,
            shift = settings.commanded_shift(),
            "starting offline render"
        );

        let builder = GraphBuilder::new(sample_rate, self.block_size);
        let mut graph = builder.build(track.clone(), &settings, RenderMode::Offline { frames }, 0.0);
        graph.render_offline(cancel)
    }

    /// Run `render` on a blocking worker so the calling task can yield
    #[cfg(feature = "async-export")]
    pub async fn render_async(
        &self,
        track: Arc<DecodedTrack>,
        settings: AudioSettings,
        cancel: Option<CancelToken>,
    ) -> Result<EncodedAudio> {
        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || pipeline.render(&track, &settings, cancel.as_ref()))
            .await
            .map_err(|e| PitchlabError::EncodeFailure {
                reason: format!("export worker failed: {}", e),
            })?
    }
}

// ============================================================================
// Tests
// ============================================================================
