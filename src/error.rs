//! Error handling for Pitchlab
//!
//! Every failure the engine can surface is a `PitchlabError`. Each variant
//! carries an error code, a recoverability flag and recovery suggestions so
//! that a front-end can decide whether the engine is still usable.

use thiserror::Error;

/// Result type alias for Pitchlab operations
pub type Result<T> = std::result::Result<T, PitchlabError>;

/// Main error type for Pitchlab operations
#[derive(Error, Debug)]
pub enum PitchlabError {
    // Platform Errors
    #[error("Real-time audio is not available: {reason}")]
    PlatformUnsupported { reason: String },

    // Load Errors
    #[error("Could not decode audio: {reason}")]
    DecodeFailure {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Network error while fetching {url}: {reason}")]
    NetworkError { url: String, reason: String },

    #[error("HTTP {status} while fetching {url}")]
    HttpStatusError { url: String, status: u16 },

    #[error("No track is loaded")]
    NoTrackLoaded,

    // Export Errors
    #[error("No audio encoder is available")]
    EncoderUnavailable,

    #[error("Encoding failed: {reason}")]
    EncodeFailure { reason: String },

    #[error("Export was cancelled")]
    ExportCancelled,

    #[error("An export is already running")]
    ExportInProgress,

    // Parameter Errors
    #[error("Invalid parameter: {param} = {value} (valid range: {min}..={max})")]
    InvalidParameter {
        param: String,
        value: f64,
        min: f64,
        max: f64,
    },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PitchlabError {
    /// Build a `DecodeFailure` wrapping the underlying decoder error
    pub fn decode<E>(reason: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PitchlabError::DecodeFailure {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            PitchlabError::PlatformUnsupported { .. } => "PLATFORM_UNSUPPORTED",
            PitchlabError::DecodeFailure { .. } => "DECODE_FAILURE",
            PitchlabError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            PitchlabError::NetworkError { .. } => "NETWORK_ERROR",
            PitchlabError::HttpStatusError { .. } => "HTTP_STATUS_ERROR",
            PitchlabError::NoTrackLoaded => "NO_TRACK_LOADED",
            PitchlabError::EncoderUnavailable => "ENCODER_UNAVAILABLE",
            PitchlabError::EncodeFailure { .. } => "ENCODE_FAILURE",
            PitchlabError::ExportCancelled => "EXPORT_CANCELLED",
            PitchlabError::ExportInProgress => "EXPORT_IN_PROGRESS",
            PitchlabError::InvalidParameter { .. } => "INVALID_PARAMETER",
            PitchlabError::Io(_) => "IO_ERROR",
            PitchlabError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if the engine stays usable after this error
    ///
    /// `PlatformUnsupported` is the only error that leaves nothing working.
    /// `EncoderUnavailable` only fails the export call that raised it.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PitchlabError::PlatformUnsupported { .. })
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            PitchlabError::PlatformUnsupported { .. } => vec![
                "Use a host with a real-time audio output",
                "Offline rendering through the CLI still works",
            ],
            PitchlabError::DecodeFailure { .. } => vec![
                "The file may be corrupted - try re-exporting from source",
                "Load another file; the previous track was already discarded",
            ],
            PitchlabError::UnsupportedFormat { .. } => vec![
                "Convert to a mono or stereo WAV file",
                "Supported inputs: WAV, MP3, OGG (when a decoder is provided)",
            ],
            PitchlabError::NetworkError { .. } => vec![
                "Check the network connection",
                "Use a direct streaming link, redirects are not followed reliably",
            ],
            PitchlabError::HttpStatusError { .. } => vec![
                "Check that the URL points directly at an audio file",
                "Download the file and load it locally",
            ],
            PitchlabError::NoTrackLoaded => vec!["Load a track before playing or exporting"],
            PitchlabError::EncoderUnavailable => vec![
                "Install an encoder to enable export",
                "Playback is unaffected",
            ],
            PitchlabError::InvalidParameter { .. } => {
                vec!["Adjust the parameter to be within its valid range"]
            }
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = PitchlabError::HttpStatusError {
            url: "https://example.com/a.mp3".to_string(),
            status: 404,
        };
        assert_eq!(err.error_code(), "HTTP_STATUS_ERROR");
        assert_eq!(
            err.to_string(),
            "HTTP 404 while fetching https://example.com/a.mp3"
        );
    }

    #[test]
    fn test_platform_unsupported_is_fatal() {
        let err = PitchlabError::PlatformUnsupported {
            reason: "no output device".to_string(),
        };
        assert!(!err.is_recoverable());
        assert!(!err.recovery_suggestions().is_empty());
    }

    #[test]
    fn test_encoder_unavailable_is_recoverable() {
        let err = PitchlabError::EncoderUnavailable;
        assert!(err.is_recoverable());
        assert!(!err.recovery_suggestions().is_empty());
    }

    #[test]
    fn test_decode_helper_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad header");
        let err = PitchlabError::decode("bad header", io);
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.error_code(), "DECODE_FAILURE");
    }
}
