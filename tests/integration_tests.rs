//! Integration Tests
//!
//! End-to-end tests for the Pitchlab engine: load, transport, settings,
//! live rendering and export, driven by a manual clock.

use std::io::Cursor;
use std::sync::Arc;

use hound::{SampleFormat, WavSpec, WavWriter};
use pretty_assertions::assert_eq;
use test_case::test_case;

use pitchlab::engine::{
    AudioBuffer, AudioSettings, ChannelLayout, Decoder, EngineConfig, EngineState, ManualContext,
    PlaybackEngine, WavDecoder,
};
use pitchlab::PitchlabError;

const SR: u32 = 44100;

/// 16-bit WAV bytes of a sine, identical on every channel
fn sine_wav(frequency: f32, seconds: f32, channels: u16) -> Vec<u8> {
    let spec = WavSpec {
        channels,
        sample_rate: SR,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
    let frames = (seconds * SR as f32) as usize;
    for i in 0..frames {
        let s = 0.5 * (2.0 * std::f32::consts::PI * frequency * i as f32 / SR as f32).sin();
        for _ in 0..channels {
            writer.write_sample((s * 32767.0) as i16).unwrap();
        }
    }
    writer.finalize().unwrap();
    cursor.into_inner()
}

fn new_engine() -> (PlaybackEngine, Arc<ManualContext>) {
    let context = Arc::new(ManualContext::new(SR));
    let engine = PlaybackEngine::new(context.clone(), EngineConfig::default()).unwrap();
    (engine, context)
}

/// Pull `frames` frames from the live output in 128-frame blocks
fn render_live(engine: &PlaybackEngine, frames: usize) -> AudioBuffer {
    let output = engine.live_output();
    let mut rendered = AudioBuffer::new(frames, ChannelLayout::Stereo, SR);
    let mut block = AudioBuffer::new(128, ChannelLayout::Stereo, SR);
    let mut written = 0;
    while written < frames {
        let n = 128.min(frames - written);
        block.resize(n);
        output.render(&mut block);
        for ch in 0..2 {
            rendered.samples[ch][written..written + n].copy_from_slice(&block.samples[ch]);
        }
        written += n;
    }
    rendered
}

/// Frequency estimate from rising zero crossings
fn estimate_frequency(samples: &[f32]) -> f32 {
    let crossings = samples
        .windows(2)
        .filter(|w| w[0] < 0.0 && w[1] >= 0.0)
        .count();
    crossings as f32 * SR as f32 / samples.len() as f32
}

// === Lifecycle Tests ===

#[test]
fn test_load_play_pause_cycle() {
    let (mut engine, context) = new_engine();
    assert_eq!(engine.state(), EngineState::Unloaded);

    engine.load_bytes(&sine_wav(440.0, 10.0, 2)).unwrap();
    assert_eq!(engine.state(), EngineState::Paused);
    assert!((engine.duration() - 10.0).abs() < 1e-9);
    assert_eq!(engine.position(), 0.0);

    context.set_time(1.0);
    engine.play().unwrap();
    assert_eq!(engine.state(), EngineState::Playing);

    context.set_time(3.5);
    assert!((engine.position() - 2.5).abs() < 1e-9);

    engine.pause().unwrap();
    context.set_time(50.0);
    assert_eq!(engine.state(), EngineState::Paused);
    assert!((engine.position() - 2.5).abs() < 1e-9);
    assert!(!engine.live_output().is_active());
}

#[test]
fn test_failed_load_leaves_engine_unloaded() {
    let (mut engine, _) = new_engine();
    engine.load_bytes(&sine_wav(440.0, 1.0, 2)).unwrap();
    engine.play().unwrap();

    let result = engine.load_bytes(b"RIFF\x10\x00\x00\x00WAVEnot really");
    assert!(matches!(result, Err(PitchlabError::DecodeFailure { .. })));
    assert_eq!(engine.state(), EngineState::Unloaded);
    assert!(engine.track().is_none());
    assert!(!engine.live_output().is_active());
    assert!(result.unwrap_err().is_recoverable());

    // Still usable afterwards
    engine.load_bytes(&sine_wav(440.0, 1.0, 1)).unwrap();
    assert_eq!(engine.state(), EngineState::Paused);
}

/// Decoder that hands back channels of different lengths
struct RaggedDecoder;

impl Decoder for RaggedDecoder {
    fn decode(&self, _bytes: &[u8]) -> pitchlab::Result<AudioBuffer> {
        Ok(AudioBuffer {
            samples: vec![vec![0.1; 100], vec![0.1; 10]],
            sample_rate: SR,
        })
    }
}

#[test]
fn test_ragged_decoder_output_is_rejected() {
    let (engine, _) = new_engine();
    let mut engine = engine.with_decoder(Box::new(RaggedDecoder));

    let result = engine.load_bytes(b"anything");
    assert!(matches!(result, Err(PitchlabError::DecodeFailure { .. })));
    assert_eq!(engine.state(), EngineState::Unloaded);
    assert!(matches!(engine.play(), Err(PitchlabError::NoTrackLoaded)));

    let mut block = AudioBuffer::new(128, ChannelLayout::Stereo, SR);
    assert!(!engine.live_output().render(&mut block));
}

#[test]
fn test_unsupported_container() {
    let (mut engine, _) = new_engine();
    let result = engine.load_bytes(b"OggS\x00\x02\x00\x00\x00\x00\x00\x00");
    assert!(matches!(result, Err(PitchlabError::UnsupportedFormat { .. })));
    assert_eq!(engine.state(), EngineState::Unloaded);
}

// === Transport Tests ===

#[test]
fn test_position_continuous_across_speed_change() {
    let (mut engine, context) = new_engine();
    engine.load_bytes(&sine_wav(440.0, 20.0, 2)).unwrap();
    engine.play().unwrap();

    context.set_time(4.0);
    assert!((engine.position() - 4.0).abs() < 1e-9);

    let faster = engine.settings().with_speed(1.5);
    engine.apply_settings(faster).unwrap();
    assert!((engine.position() - 4.0).abs() < 1e-9);
    assert_eq!(engine.clock().speed(), engine.settings().speed as f64);

    context.set_time(6.0);
    assert!((engine.position() - 7.0).abs() < 1e-9);
}

#[test]
fn test_seek_is_idempotent() {
    let (mut engine, context) = new_engine();
    engine.load_bytes(&sine_wav(440.0, 10.0, 2)).unwrap();
    engine.play().unwrap();
    context.set_time(2.0);

    let first = engine.seek(6.0).unwrap();
    let position = engine.position();
    let second = engine.seek(6.0).unwrap();
    assert_eq!(first, second);
    assert!((engine.position() - position).abs() < 1e-12);
    assert_eq!(engine.state(), EngineState::Playing);

    assert_eq!(engine.seek(99.0).unwrap(), 10.0);
    assert_eq!(engine.seek(-1.0).unwrap(), 0.0);
}

#[test]
fn test_auto_stop_at_end() {
    let (mut engine, context) = new_engine();
    engine.load_bytes(&sine_wav(440.0, 2.0, 2)).unwrap();
    engine.play().unwrap();

    context.set_time(1.9);
    assert!(!engine.tick());
    assert_eq!(engine.state(), EngineState::Playing);

    context.set_time(2.0);
    assert!(engine.tick());
    assert_eq!(engine.state(), EngineState::Paused);
    assert_eq!(engine.position(), 0.0);
    assert!(!engine.live_output().is_active());
}

#[test]
fn test_pause_after_running_off_the_end_rewinds() {
    let (mut engine, context) = new_engine();
    engine.load_bytes(&sine_wav(440.0, 2.0, 2)).unwrap();
    engine.play().unwrap();

    // No tick between passing the end and pausing
    context.set_time(3.0);
    engine.pause().unwrap();
    assert_eq!(engine.state(), EngineState::Paused);
    assert_eq!(engine.position(), 0.0);

    // Resumes from the start
    engine.play().unwrap();
    context.set_time(3.5);
    assert!((engine.position() - 0.5).abs() < 1e-9);
}

#[test]
fn test_export_after_running_off_the_end_resumes_at_zero() {
    let (mut engine, context) = new_engine();
    engine.load_bytes(&sine_wav(440.0, 1.0, 2)).unwrap();
    engine.play().unwrap();
    context.set_time(1.5);

    let job = engine.start_export().unwrap();
    assert_eq!(job.resume_position(), 0.0);
    assert_eq!(engine.state(), EngineState::Exporting);
    engine.finish_export();

    assert_eq!(engine.state(), EngineState::Paused);
    assert_eq!(engine.position(), 0.0);
}

// === Settings Tests ===

#[test]
fn test_vocal_toggle_rebuilds_graph() {
    let (mut engine, context) = new_engine();
    engine.load_bytes(&sine_wav(440.0, 5.0, 2)).unwrap();
    engine.play().unwrap();
    let original = engine.live_graph_id().unwrap();

    // Continuous parameters update in place
    let quieter = AudioSettings {
        volume: 0.5,
        eq_mid_db: -4.0,
        ..*engine.settings()
    };
    engine.apply_settings(quieter).unwrap();
    assert_eq!(engine.live_graph_id(), Some(original));

    // Topology change builds a new graph at the current position
    context.set_time(1.0);
    engine
        .apply_settings(engine.settings().with_vocal_removal(true))
        .unwrap();
    let rebuilt = engine.live_graph_id().unwrap();
    assert_ne!(rebuilt, original);
    assert!((engine.position() - 1.0).abs() < 1e-9);
}

#[test]
fn test_pitch_control_clamps_at_an_octave() {
    let (mut engine, _) = new_engine();
    engine.load_bytes(&sine_wav(440.0, 1.0, 2)).unwrap();
    for _ in 0..15 {
        engine.adjust_pitch(1).unwrap();
    }
    assert_eq!(engine.settings().detune_cents, 1200);
    assert!((engine.commanded_shift() - 12.0).abs() < 1e-6);

    for _ in 0..30 {
        engine.adjust_pitch(-1).unwrap();
    }
    assert_eq!(engine.settings().detune_cents, -1200);
}

#[test_case(0, 2.0, -12.0 ; "double speed")]
#[test_case(0, 0.5, 12.0 ; "half speed")]
#[test_case(-500, 1.0, -5.0 ; "detune only")]
#[test_case(300, 2.0, -9.0 ; "detune and speed")]
fn test_commanded_shift_composition(cents: i32, speed: f32, expected: f32) {
    let (mut engine, _) = new_engine();
    engine
        .apply_settings(AudioSettings {
            detune_cents: cents,
            speed,
            ..Default::default()
        })
        .unwrap();
    assert!((engine.commanded_shift() - expected).abs() < 1e-5);
}

#[test]
fn test_invalid_settings_rejected() {
    let (mut engine, _) = new_engine();
    let result = engine.apply_settings(AudioSettings {
        eq_high_db: 20.0,
        ..Default::default()
    });
    match result {
        Err(PitchlabError::InvalidParameter { param, max, .. }) => {
            assert_eq!(param, "eq_high_db");
            assert_eq!(max, 12.0);
        }
        other => panic!("expected InvalidParameter, got {:?}", other),
    }
    assert_eq!(*engine.settings(), AudioSettings::default());
}

// === Live Rendering Tests ===

#[test]
fn test_default_settings_are_transparent() {
    let (mut engine, _) = new_engine();
    engine.load_bytes(&sine_wav(440.0, 0.5, 2)).unwrap();
    engine.play().unwrap();

    let track = engine.track().unwrap().clone();
    let frames = track.frames();
    let rendered = render_live(&engine, frames);
    let latency = (0.005 * SR as f64).round() as usize;

    for ch in 0..2 {
        assert_eq!(
            &rendered.samples[ch][latency..],
            &track.pcm().samples[ch][..frames - latency]
        );
    }
}

#[test]
fn test_mono_track_plays_on_both_sides() {
    let (mut engine, _) = new_engine();
    engine.load_bytes(&sine_wav(300.0, 0.5, 1)).unwrap();
    engine
        .apply_settings(AudioSettings {
            detune_cents: 400,
            eq_low_db: 3.0,
            ..Default::default()
        })
        .unwrap();
    engine.play().unwrap();

    let rendered = render_live(&engine, 8000);
    assert_eq!(rendered.samples[0], rendered.samples[1]);
    assert!(rendered.samples[0].iter().any(|s| s.abs() > 0.1));
}

#[test]
fn test_speed_change_keeps_pitch() {
    let (mut engine, _) = new_engine();
    engine.load_bytes(&sine_wav(440.0, 3.0, 2)).unwrap();
    engine
        .apply_settings(AudioSettings::default().with_speed(2.0))
        .unwrap();
    engine.play().unwrap();

    let rendered = render_live(&engine, SR as usize);
    let settled = &rendered.samples[0][SR as usize / 5..];
    let frequency = estimate_frequency(settled);
    assert!(
        (frequency - 440.0).abs() < 440.0 * 0.04,
        "expected ~440 Hz, measured {:.1} Hz",
        frequency
    );
}

#[test]
fn test_spectrum_available_while_playing() {
    let (mut engine, _) = new_engine();
    engine.load_bytes(&sine_wav(1000.0, 1.0, 2)).unwrap();
    assert!(engine.spectrum().is_none());

    engine.play().unwrap();
    render_live(&engine, 4096);
    let spectrum = engine.spectrum().unwrap();
    assert_eq!(spectrum.len(), 1024);

    // Loudest bin near 1 kHz (bin width ~21.5 Hz)
    let peak_bin = spectrum
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap();
    let peak_hz = peak_bin as f32 * SR as f32 / 2048.0;
    assert!((peak_hz - 1000.0).abs() < 30.0, "peak at {} Hz", peak_hz);
}

#[test]
fn test_analysis_window_follows_config() {
    let context = Arc::new(ManualContext::new(SR));
    let config = EngineConfig {
        fft_size: 4096,
        ..Default::default()
    };
    let mut engine = PlaybackEngine::new(context, config).unwrap();
    engine.load_bytes(&sine_wav(1000.0, 0.5, 2)).unwrap();
    engine.play().unwrap();
    render_live(&engine, 4096);
    assert_eq!(engine.spectrum().unwrap().len(), 2048);

    let (default_engine, _) = new_engine();
    assert_eq!(default_engine.config().fft_size, 2048);
}

// === Export Tests ===

#[test]
fn test_export_duration_follows_speed() {
    let (mut engine, context) = new_engine();
    engine.load_bytes(&sine_wav(440.0, 2.0, 2)).unwrap();
    engine
        .apply_settings(AudioSettings::default().with_speed(2.0))
        .unwrap();
    engine.play().unwrap();
    context.set_time(0.5);

    let encoded = engine.export(None).unwrap();
    assert_eq!(encoded.frames, 44100);
    assert_eq!(encoded.mime_type, "audio/wav");

    let decoded = WavDecoder.decode(&encoded.bytes).unwrap();
    assert_eq!(decoded.num_frames(), 44100);

    // Transport paused at the captured position
    assert_eq!(engine.state(), EngineState::Paused);
    assert!((engine.position() - 1.0).abs() < 1e-9);
}

#[test]
fn test_export_matches_live_render() {
    let (mut engine, _) = new_engine();
    engine.load_bytes(&sine_wav(440.0, 0.5, 2)).unwrap();
    let settings = AudioSettings {
        detune_cents: -300,
        vocal_removal: true,
        volume: 0.9,
        eq_low_db: 5.0,
        eq_mid_db: -2.0,
        eq_high_db: 1.0,
        speed: 1.0,
    };
    engine.apply_settings(settings).unwrap();

    let encoded = engine.export(None).unwrap();
    let exported = WavDecoder.decode(&encoded.bytes).unwrap();

    engine.play().unwrap();
    let live = render_live(&engine, exported.num_frames());

    // Identical up to 16-bit quantization
    for ch in 0..2 {
        for (a, b) in live.samples[ch].iter().zip(&exported.samples[ch]) {
            assert!((a - b).abs() <= 3.0 / 32768.0);
        }
    }
}

#[test]
fn test_export_without_track() {
    let (mut engine, _) = new_engine();
    assert!(matches!(
        engine.export(None),
        Err(PitchlabError::NoTrackLoaded)
    ));
}
