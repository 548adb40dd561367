//! Collaborator interfaces for Pitchlab
//!
//! The engine never decodes, downloads, encodes or keeps time by itself.
//! Those jobs go through the traits here. In-crate implementations cover
//! WAV (via hound), HTTP (via reqwest, feature `url-load`) and two clocks.

use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::debug;

use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::error::{PitchlabError, Result};

// ============================================================================
// Traits
// ============================================================================

/// Turns an encoded file into linear PCM
pub trait Decoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<AudioBuffer>;
}

/// Retrieves the raw bytes behind a URL
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Incremental 16-bit stereo encoder
///
/// `encode_chunk` may return bytes immediately or hold them until `flush`.
/// The concatenation of every returned buffer is the finished file.
pub trait Encoder: Send {
    fn encode_chunk(&mut self, left: &[i16], right: &[i16]) -> Result<Vec<u8>>;
    fn flush(&mut self) -> Result<Vec<u8>>;
    fn mime_type(&self) -> &'static str;
}

/// Creates one encoder per export
pub trait EncoderFactory: Send + Sync {
    fn create(&self, sample_rate: u32, channels: u16) -> Result<Box<dyn Encoder>>;
}

/// Clock and rate of the audio device the engine renders for
pub trait AudioContext: Send + Sync {
    fn sample_rate(&self) -> u32;
    /// Seconds on a monotonic clock
    fn current_time(&self) -> f64;
    fn is_realtime_capable(&self) -> bool;
}

// ============================================================================
// WAV Decoder
// ============================================================================

/// Decodes 8/16/24/32-bit integer and 32-bit float WAV, mono or stereo
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl Decoder for WavDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<AudioBuffer> {
        if bytes.len() >= 4 && &bytes[..4] != b"RIFF" {
            return Err(PitchlabError::UnsupportedFormat {
                format: sniff_format(bytes).to_string(),
            });
        }

        let reader = WavReader::new(Cursor::new(bytes))
            .map_err(|e| PitchlabError::decode("failed to parse WAV header", e))?;

        let spec = reader.spec();
        let channels = spec.channels as usize;
        let layout = ChannelLayout::from_count(channels).ok_or_else(|| {
            PitchlabError::UnsupportedFormat {
                format: format!("{}-channel audio (only mono/stereo supported)", channels),
            }
        })?;

        let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
        let buffer = AudioBuffer::from_interleaved(&interleaved, layout, spec.sample_rate)?;

        debug!(
            channels,
            sample_rate = spec.sample_rate,
            frames = buffer.num_frames(),
            "decoded WAV"
        );
        Ok(buffer)
    }
}

/// Best guess at a container from its magic bytes
fn sniff_format(bytes: &[u8]) -> &'static str {
    match bytes {
        [b'I', b'D', b'3', ..] | [0xFF, 0xFB, ..] | [0xFF, 0xF3, ..] | [0xFF, 0xF2, ..] => "mp3",
        [b'O', b'g', b'g', b'S', ..] => "ogg",
        [b'f', b'L', b'a', b'C', ..] => "flac",
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => "mp4/aac",
        _ => "unknown",
    }
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let truncated = |e: hound::Error| PitchlabError::decode("failed to read samples", e);
    match (sample_format, bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(truncated),
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| v as f32 / 128.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(truncated),
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(truncated),
        // 24-bit stored as i32 in hound
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8_388_608.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(truncated),
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2_147_483_648.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(truncated),
        (format, bits) => Err(PitchlabError::UnsupportedFormat {
            format: format!("{}-bit {:?} WAV", bits, format),
        }),
    }
}

// ============================================================================
// HTTP Fetcher
// ============================================================================

/// Blocking HTTP(S) fetcher
#[cfg(feature = "url-load")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: std::time::Duration,
}

#[cfg(feature = "url-load")]
impl HttpFetcher {
    pub fn new(timeout: std::time::Duration) -> Self {
        Self { timeout }
    }
}

#[cfg(feature = "url-load")]
impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(30))
    }
}

#[cfg(feature = "url-load")]
impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let network = |e: reqwest::Error| PitchlabError::NetworkError {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(network)?;

        let response = client.get(url).send().map_err(network)?;
        if !response.status().is_success() {
            return Err(PitchlabError::HttpStatusError {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().map_err(network)?;
        debug!(url, bytes = bytes.len(), "fetched audio");
        Ok(bytes.to_vec())
    }
}

// ============================================================================
// WAV Encoder
// ============================================================================

/// 16-bit PCM WAV encoder
///
/// The RIFF header needs the final data length, so samples are held until
/// `flush` writes the whole file.
#[derive(Debug)]
pub struct WavEncoder {
    spec: WavSpec,
    pending: Vec<i16>,
    flushed: bool,
}

impl WavEncoder {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            spec: WavSpec {
                channels,
                sample_rate,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
            pending: Vec::new(),
            flushed: false,
        }
    }
}

fn encode_error(e: hound::Error) -> PitchlabError {
    PitchlabError::EncodeFailure {
        reason: e.to_string(),
    }
}

impl Encoder for WavEncoder {
    fn encode_chunk(&mut self, left: &[i16], right: &[i16]) -> Result<Vec<u8>> {
        if self.flushed {
            return Err(PitchlabError::EncodeFailure {
                reason: "encoder already flushed".to_string(),
            });
        }
        if left.len() != right.len() {
            return Err(PitchlabError::EncodeFailure {
                reason: format!(
                    "channel length mismatch: {} left vs {} right",
                    left.len(),
                    right.len()
                ),
            });
        }

        match self.spec.channels {
            1 => self.pending.extend_from_slice(left),
            _ => {
                self.pending.reserve(left.len() * 2);
                for (l, r) in left.iter().zip(right) {
                    self.pending.push(*l);
                    self.pending.push(*r);
                }
            }
        }
        Ok(Vec::new())
    }

    fn flush(&mut self) -> Result<Vec<u8>> {
        if self.flushed {
            return Ok(Vec::new());
        }
        self.flushed = true;

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, self.spec).map_err(encode_error)?;
            for sample in self.pending.drain(..) {
                writer.write_sample(sample).map_err(encode_error)?;
            }
            writer.finalize().map_err(encode_error)?;
        }
        Ok(cursor.into_inner())
    }

    fn mime_type(&self) -> &'static str {
        "audio/wav"
    }
}

/// Factory handing out `WavEncoder`s
#[derive(Debug, Clone, Copy, Default)]
pub struct WavEncoderFactory;

impl EncoderFactory for WavEncoderFactory {
    fn create(&self, sample_rate: u32, channels: u16) -> Result<Box<dyn Encoder>> {
        if !(1..=2).contains(&channels) {
            return Err(PitchlabError::UnsupportedFormat {
                format: format!("{}-channel WAV output", channels),
            });
        }
        Ok(Box::new(WavEncoder::new(sample_rate, channels)))
    }
}

// ============================================================================
// Audio Contexts
// ============================================================================

/// Context backed by the system monotonic clock
#[derive(Debug, Clone)]
pub struct SystemContext {
    sample_rate: u32,
    started: Instant,
}

impl SystemContext {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            started: Instant::now(),
        }
    }
}

impl AudioContext for SystemContext {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn is_realtime_capable(&self) -> bool {
        self.sample_rate > 0
    }
}

/// Context whose clock only moves when told to
///
/// Used by headless hosts and tests. Time is stored as f64 bits so the
/// context can be shared and advanced through `&self`.
#[derive(Debug)]
pub struct ManualContext {
    sample_rate: u32,
    time_bits: AtomicU64,
    realtime: bool,
}

impl ManualContext {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            time_bits: AtomicU64::new(0.0_f64.to_bits()),
            realtime: true,
        }
    }

    /// Context that reports no real-time capability
    pub fn without_realtime(sample_rate: u32) -> Self {
        Self {
            realtime: false,
            ..Self::new(sample_rate)
        }
    }

    pub fn set_time(&self, seconds: f64) {
        self.time_bits.store(seconds.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: f64) {
        self.set_time(self.current_time() + seconds);
    }
}

impl AudioContext for ManualContext {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        f64::from_bits(self.time_bits.load(Ordering::SeqCst))
    }

    fn is_realtime_capable(&self) -> bool {
        self.realtime
    }
}

// ============================================================================
// Test Signals
// ============================================================================

/// Generate a mono sine wave
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> AudioBuffer {
    let num_frames = (duration_secs * sample_rate as f32) as usize;
    let mut buffer = AudioBuffer::new(num_frames, ChannelLayout::Mono, sample_rate);

    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
    for (i, sample) in buffer.samples[0].iter_mut().enumerate() {
        *sample = (angular_freq * i as f32).sin();
    }

    buffer
}

/// Generate a stereo buffer with a different sine on each channel
pub fn generate_stereo_test_tone(
    freq_left: f32,
    freq_right: f32,
    duration_secs: f32,
    sample_rate: u32,
) -> AudioBuffer {
    let num_frames = (duration_secs * sample_rate as f32) as usize;
    let mut buffer = AudioBuffer::new(num_frames, ChannelLayout::Stereo, sample_rate);

    for (channel, frequency) in [freq_left, freq_right].into_iter().enumerate() {
        let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
        for (i, sample) in buffer.samples[channel].iter_mut().enumerate() {
            *sample = (angular_freq * i as f32).sin();
        }
    }

    buffer
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn wav_bytes(spec: WavSpec, samples: &[i32]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for s in samples {
            match spec.bits_per_sample {
                8 => writer.write_sample(*s as i8).unwrap(),
                16 => writer.write_sample(*s as i16).unwrap(),
                _ => writer.write_sample(*s).unwrap(),
            }
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    fn int_spec(channels: u16, bits: u16) -> WavSpec {
        WavSpec {
            channels,
            sample_rate: 22050,
            bits_per_sample: bits,
            sample_format: SampleFormat::Int,
        }
    }

    #[test]
    fn test_decode_stereo_16bit() {
        let bytes = wav_bytes(int_spec(2, 16), &[16384, -16384, 0, 32767]);
        let buffer = WavDecoder.decode(&bytes).unwrap();
        assert_eq!(buffer.num_channels(), 2);
        assert_eq!(buffer.num_frames(), 2);
        assert_eq!(buffer.sample_rate, 22050);
        assert_abs_diff_eq!(buffer.samples[0][0], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(buffer.samples[1][0], -0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_decode_mono_24bit() {
        let bytes = wav_bytes(int_spec(1, 24), &[4_194_304, -8_388_608]);
        let buffer = WavDecoder.decode(&bytes).unwrap();
        assert_eq!(buffer.num_channels(), 1);
        assert_abs_diff_eq!(buffer.samples[0][0], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(buffer.samples[0][1], -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_decode_float() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        writer.write_sample(0.25_f32).unwrap();
        writer.write_sample(-0.75_f32).unwrap();
        writer.finalize().unwrap();

        let buffer = WavDecoder.decode(&cursor.into_inner()).unwrap();
        assert_eq!(buffer.samples[0], vec![0.25, -0.75]);
    }

    #[test]
    fn test_decode_rejects_multichannel() {
        let bytes = wav_bytes(int_spec(4, 16), &[0; 8]);
        assert!(matches!(
            WavDecoder.decode(&bytes),
            Err(PitchlabError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_decode_identifies_other_containers() {
        match WavDecoder.decode(b"ID3\x04\x00\x00\x00\x00\x00\x00") {
            Err(PitchlabError::UnsupportedFormat { format }) => assert_eq!(format, "mp3"),
            other => panic!("expected UnsupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_garbage_is_decode_failure() {
        let result = WavDecoder.decode(b"RIFF\x00\x00\x00\x00garbage");
        assert!(matches!(result, Err(PitchlabError::DecodeFailure { .. })));
        assert!(matches!(
            WavDecoder.decode(b"RI"),
            Err(PitchlabError::DecodeFailure { .. })
        ));
    }

    #[test]
    fn test_wav_encoder_output_decodes() {
        let mut encoder = WavEncoderFactory.create(44100, 2).unwrap();
        assert_eq!(encoder.mime_type(), "audio/wav");

        let mut bytes = encoder.encode_chunk(&[100, 200], &[-100, -200]).unwrap();
        bytes.extend(encoder.encode_chunk(&[300], &[-300]).unwrap());
        bytes.extend(encoder.flush().unwrap());

        let mut reader = WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![100, -100, 200, -200, 300, -300]);
    }

    #[test]
    fn test_wav_encoder_rejects_after_flush() {
        let mut encoder = WavEncoder::new(44100, 2);
        encoder.flush().unwrap();
        assert!(encoder.encode_chunk(&[1], &[1]).is_err());
        assert!(encoder.flush().unwrap().is_empty());
    }

    #[test]
    fn test_wav_encoder_rejects_mismatched_channels() {
        let mut encoder = WavEncoder::new(44100, 2);
        assert!(matches!(
            encoder.encode_chunk(&[1, 2], &[1]),
            Err(PitchlabError::EncodeFailure { .. })
        ));
    }

    #[test]
    fn test_manual_context() {
        let context = ManualContext::new(48000);
        assert_eq!(context.current_time(), 0.0);
        context.set_time(2.5);
        context.advance(0.5);
        assert_eq!(context.current_time(), 3.0);
        assert!(context.is_realtime_capable());
        assert!(!ManualContext::without_realtime(48000).is_realtime_capable());
    }

    #[test]
    fn test_system_context_is_monotonic() {
        let context = SystemContext::new(44100);
        let a = context.current_time();
        let b = context.current_time();
        assert!(b >= a);
    }

    #[test]
    fn test_generate_test_tone() {
        let tone = generate_test_tone(440.0, 0.5, 44100);
        assert_eq!(tone.num_channels(), 1);
        assert_eq!(tone.num_frames(), 22050);
        assert_eq!(tone.samples[0][0], 0.0);

        let stereo = generate_stereo_test_tone(440.0, 880.0, 0.1, 48000);
        assert_eq!(stereo.num_channels(), 2);
        assert_ne!(stereo.samples[0], stereo.samples[1]);
    }
}
