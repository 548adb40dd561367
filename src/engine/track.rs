//! The decoded recording the engine works on.

use crate::engine::buffer::AudioBuffer;
use crate::error::{PitchlabError, Result};

/// Full linear-PCM copy of the loaded recording
///
/// Created from a successful decode and never modified afterwards. Graphs
/// share it read-only through an `Arc`; loading another file replaces it
/// wholesale.
#[derive(Debug, Clone)]
pub struct DecodedTrack {
    pcm: AudioBuffer,
}

impl DecodedTrack {
    /// Wrap decoded PCM
    ///
    /// Rejects anything but mono or stereo, ragged channels, empty buffers
    /// and a zero sample rate.
    pub fn new(pcm: AudioBuffer) -> Result<Self> {
        let pcm = AudioBuffer::from_channels(pcm.samples, pcm.sample_rate)?;
        if pcm.is_empty() {
            return Err(PitchlabError::DecodeFailure {
                reason: "decoded audio contains no frames".to_string(),
                source: None,
            });
        }
        if pcm.sample_rate == 0 {
            return Err(PitchlabError::DecodeFailure {
                reason: "decoded audio reports a sample rate of 0 Hz".to_string(),
                source: None,
            });
        }
        Ok(Self { pcm })
    }

    pub fn channels(&self) -> usize {
        self.pcm.num_channels()
    }

    pub fn sample_rate(&self) -> u32 {
        self.pcm.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.pcm.num_frames()
    }

    pub fn duration_secs(&self) -> f64 {
        self.pcm.duration_secs()
    }

    pub fn pcm(&self) -> &AudioBuffer {
        &self.pcm
    }

    /// Read one frame as a stereo pair
    ///
    /// Mono tracks return the same sample on both sides; frames past the end
    /// read as silence.
    #[inline]
    pub fn stereo_frame(&self, frame: usize) -> (f32, f32) {
        let left = match self.pcm.samples[0].get(frame) {
            Some(&s) => s,
            None => return (0.0, 0.0),
        };
        let right = match self.pcm.samples.get(1) {
            Some(ch) => ch.get(frame).copied().unwrap_or(0.0),
            None => left,
        };
        (left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::ChannelLayout;

    #[test]
    fn test_rejects_empty_pcm() {
        let pcm = AudioBuffer::new(0, ChannelLayout::Stereo, 44100);
        assert!(DecodedTrack::new(pcm).is_err());
    }

    #[test]
    fn test_rejects_ragged_channels() {
        let pcm = AudioBuffer {
            samples: vec![vec![0.1; 100], vec![0.1; 10]],
            sample_rate: 44100,
        };
        assert!(matches!(
            DecodedTrack::new(pcm),
            Err(PitchlabError::DecodeFailure { .. })
        ));
    }

    #[test]
    fn test_rejects_surround_and_channelless_pcm() {
        let surround = AudioBuffer {
            samples: vec![vec![0.0; 8]; 6],
            sample_rate: 48000,
        };
        assert!(matches!(
            DecodedTrack::new(surround),
            Err(PitchlabError::UnsupportedFormat { .. })
        ));

        let nothing = AudioBuffer {
            samples: Vec::new(),
            sample_rate: 48000,
        };
        assert!(DecodedTrack::new(nothing).is_err());
    }

    #[test]
    fn test_mono_upmix() {
        let pcm = AudioBuffer::from_channels(vec![vec![0.25, -0.5]], 44100).unwrap();
        let track = DecodedTrack::new(pcm).unwrap();
        assert_eq!(track.channels(), 1);
        assert_eq!(track.stereo_frame(1), (-0.5, -0.5));
    }

    #[test]
    fn test_frame_past_end_is_silent() {
        let pcm = AudioBuffer::from_channels(vec![vec![0.1; 3], vec![0.2; 3]], 8000).unwrap();
        let track = DecodedTrack::new(pcm).unwrap();
        assert_eq!(track.stereo_frame(2), (0.1, 0.2));
        assert_eq!(track.stereo_frame(3), (0.0, 0.0));
    }
}
