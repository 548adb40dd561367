//! Audio Engine Module
//!
//! Everything between a loaded recording and the speakers or an exported
//! file:
//! - Audio buffers and the decoded track
//! - Settings snapshots and engine configuration
//! - Playback clock and engine lifecycle
//! - Collaborator traits (decode, fetch, encode, audio context)
//! - Offline export

pub mod buffer;
pub mod clock;
pub mod export;
pub mod io;
mod player;
mod settings;
mod track;

pub use buffer::{AudioBuffer, ChannelLayout};
pub use clock::{EngineState, PlaybackClock, TransportState};
pub use export::{export_frame_count, float_to_i16, CancelToken, EncodedAudio, ExportPipeline};
pub use io::{
    generate_stereo_test_tone, generate_test_tone, AudioContext, Decoder, Encoder, EncoderFactory,
    Fetcher, ManualContext, SystemContext, WavDecoder, WavEncoder, WavEncoderFactory,
};
#[cfg(feature = "url-load")]
pub use io::HttpFetcher;
pub use player::{ExportJob, LiveOutput, PlaybackEngine};
pub use settings::{AudioSettings, EngineConfig, MAX_DETUNE_CENTS, MAX_SPEED, MIN_SPEED};
pub use track::DecodedTrack;
