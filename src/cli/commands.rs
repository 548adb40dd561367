//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::cli::SettingsOverrides;
use crate::engine::buffer::{calculate_peak, calculate_rms};
use crate::engine::{
    AudioSettings, DecodedTrack, Decoder, EncodedAudio, EngineConfig, ExportPipeline, WavDecoder,
    WavEncoderFactory,
};
use crate::error::Result;

fn load_track(input: &Path) -> Result<Arc<DecodedTrack>> {
    let bytes = std::fs::read(input)?;
    let pcm = WavDecoder.decode(&bytes)?;
    Ok(Arc::new(DecodedTrack::new(pcm)?))
}

/// Render `input` through the processing chain and write a WAV file.
pub fn render(
    input: &Path,
    output: &Path,
    settings_path: Option<&Path>,
    config_path: Option<&Path>,
    overrides: &SettingsOverrides,
) -> Result<EncodedAudio> {
    let config = match config_path {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let base = match settings_path {
        Some(path) => AudioSettings::from_json_file(path)?,
        None => config.default_settings,
    };
    let settings = overrides.apply(base);
    settings.validate()?;

    info!(input = %input.display(), ?settings, "rendering");
    let track = load_track(input)?;
    let pipeline = ExportPipeline::new(&config, Some(Arc::new(WavEncoderFactory)));
    let encoded = pipeline.render(&track, &settings, None)?;
    std::fs::write(output, &encoded.bytes)?;

    println!("Rendered: {}", output.display());
    println!(
        "  {} frames @ {} Hz ({:.2}s), {} bytes",
        encoded.frames,
        encoded.sample_rate,
        encoded.duration_secs(),
        encoded.bytes.len()
    );
    println!("  sha256: {}", encoded.checksum);

    Ok(encoded)
}

/// Print format and level information for a WAV file.
pub fn info(input: &Path) -> Result<()> {
    let track = load_track(input)?;
    let pcm = track.pcm();

    println!("File: {}", input.display());
    println!("{:-<40}", "");
    println!("Channels:    {}", track.channels());
    println!("Sample rate: {} Hz", track.sample_rate());
    println!("Frames:      {}", track.frames());
    println!("Duration:    {:.3}s", track.duration_secs());
    println!("Peak:        {:.1} dBFS", calculate_peak(pcm));
    for ch in 0..pcm.num_channels() {
        println!("RMS ch{}:     {:.1} dBFS", ch, calculate_rms(pcm.channel(ch)));
    }

    Ok(())
}
