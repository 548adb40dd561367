//! CLI Module
//!
//! Command-line front-end for offline rendering.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::engine::AudioSettings;

/// Pitchlab - pitch, speed, vocal removal and EQ for one recording
#[derive(Parser, Debug)]
#[command(name = "pitchlab")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process a WAV file and write the result
    #[command(name = "render")]
    Render {
        /// Input WAV file
        input: PathBuf,

        /// Output WAV file
        output: PathBuf,

        /// Settings snapshot (JSON)
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Engine configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        overrides: SettingsOverrides,
    },

    /// Print format and level information for a WAV file
    #[command(name = "info")]
    Info {
        /// Input WAV file
        input: PathBuf,
    },
}

/// Per-parameter flags; each one wins over the settings file
#[derive(Args, Debug, Default, Clone)]
pub struct SettingsOverrides {
    /// Detune in cents (-1200..=1200)
    #[arg(long, allow_hyphen_values = true)]
    pub detune_cents: Option<i32>,

    /// Playback speed (0.5..=2.0)
    #[arg(long)]
    pub speed: Option<f32>,

    /// Remove centre-panned vocals
    #[arg(long, conflicts_with = "no_vocal_removal")]
    pub vocal_removal: bool,

    /// Keep vocals even if the settings file enables removal
    #[arg(long)]
    pub no_vocal_removal: bool,

    /// Master volume (0..=1)
    #[arg(long)]
    pub volume: Option<f32>,

    /// Low shelf gain in dB
    #[arg(long, allow_hyphen_values = true)]
    pub eq_low: Option<f32>,

    /// Mid peak gain in dB
    #[arg(long, allow_hyphen_values = true)]
    pub eq_mid: Option<f32>,

    /// High shelf gain in dB
    #[arg(long, allow_hyphen_values = true)]
    pub eq_high: Option<f32>,
}

impl SettingsOverrides {
    pub fn apply(&self, base: AudioSettings) -> AudioSettings {
        AudioSettings {
            detune_cents: self.detune_cents.unwrap_or(base.detune_cents),
            vocal_removal: match (self.vocal_removal, self.no_vocal_removal) {
                (true, _) => true,
                (_, true) => false,
                _ => base.vocal_removal,
            },
            volume: self.volume.unwrap_or(base.volume),
            eq_low_db: self.eq_low.unwrap_or(base.eq_low_db),
            eq_mid_db: self.eq_mid.unwrap_or(base.eq_mid_db),
            eq_high_db: self.eq_high.unwrap_or(base.eq_high_db),
            speed: self.speed.unwrap_or(base.speed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_render() {
        let cli = Cli::parse_from([
            "pitchlab",
            "render",
            "in.wav",
            "out.wav",
            "--detune-cents",
            "-300",
            "--speed",
            "1.5",
            "--vocal-removal",
            "--eq-low",
            "-6",
        ]);
        match cli.command {
            Commands::Render {
                input,
                output,
                overrides,
                ..
            } => {
                assert_eq!(input, PathBuf::from("in.wav"));
                assert_eq!(output, PathBuf::from("out.wav"));
                let settings = overrides.apply(AudioSettings::default());
                assert_eq!(
                    settings,
                    AudioSettings {
                        detune_cents: -300,
                        vocal_removal: true,
                        eq_low_db: -6.0,
                        speed: 1.5,
                        ..Default::default()
                    }
                );
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_no_vocal_removal_overrides_file() {
        let base = AudioSettings::default().with_vocal_removal(true);

        let cli = Cli::parse_from(["pitchlab", "render", "a.wav", "b.wav", "--no-vocal-removal"]);
        let Commands::Render { overrides, .. } = cli.command else {
            panic!("expected render");
        };
        assert!(!overrides.apply(base).vocal_removal);

        // Neither flag keeps the file value
        assert!(SettingsOverrides::default().apply(base).vocal_removal);
    }

    #[test]
    fn test_vocal_removal_flags_conflict() {
        let result = Cli::try_parse_from([
            "pitchlab",
            "render",
            "a.wav",
            "b.wav",
            "--vocal-removal",
            "--no-vocal-removal",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_keep_base_values() {
        let base = AudioSettings {
            volume: 0.4,
            eq_high_db: 3.0,
            ..Default::default()
        };
        let overrides = SettingsOverrides {
            volume: Some(0.9),
            ..Default::default()
        };
        let merged = overrides.apply(base);
        assert_eq!(merged.volume, 0.9);
        assert_eq!(merged.eq_high_db, 3.0);
    }
}
