//! # Playback Error Types
//!
//! Error taxonomy for the streaming playback engine.

use radio_runtime::ErrorCategory;
use std::fmt;
use thiserror::Error;

/// Decoder cause code: the container or codec is not supported.
pub const CAUSE_UNSUPPORTED_FORMAT: u32 = 0xC00D_001A;
/// Decoder cause code: the stream carries no audio track.
pub const CAUSE_NO_AUDIO_CONTENT: u32 = 0xC00D_36B4;
/// Decoder cause code: the stream type is not supported.
pub const CAUSE_UNSUPPORTED_STREAM_TYPE: u32 = 0xC00D_36FA;

// ============================================================================
// Open Failure Classification
// ============================================================================

/// Why a stream could not be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenFailureCause {
    /// Container or codec not supported by the decoder.
    UnsupportedFormat,
    /// Stream opened but contains no audio.
    NoAudioContent,
    /// Stream type (e.g. a playlist or video-only source) not supported.
    UnsupportedStreamType,
    /// Decoder opened without negotiating an audio format.
    MissingFormat,
    /// Network or I/O failure while connecting.
    Connection,
    /// Decoder-specific cause code with no dedicated mapping.
    Other(u32),
    /// Failure with no structured cause.
    Unknown,
}

impl OpenFailureCause {
    /// Maps a structured decoder cause code.
    pub fn from_code(code: u32) -> Self {
        match code {
            CAUSE_UNSUPPORTED_FORMAT => Self::UnsupportedFormat,
            CAUSE_NO_AUDIO_CONTENT => Self::NoAudioContent,
            CAUSE_UNSUPPORTED_STREAM_TYPE => Self::UnsupportedStreamType,
            other => Self::Other(other),
        }
    }

    /// Short human string suitable for a status line.
    pub fn describe(&self) -> String {
        match self {
            Self::UnsupportedFormat => "stream format is not supported".to_string(),
            Self::NoAudioContent => "stream has no audio content".to_string(),
            Self::UnsupportedStreamType => "unsupported stream type".to_string(),
            Self::MissingFormat => "decoder did not report an audio format".to_string(),
            Self::Connection => "could not connect to stream".to_string(),
            Self::Other(code) => format!("decoder error 0x{:08X}", code),
            Self::Unknown => "stream could not be opened".to_string(),
        }
    }
}

impl fmt::Display for OpenFailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

// ============================================================================
// Playback Errors
// ============================================================================

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// Stream URL missing, malformed, or not http/https.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The decoder could not establish format or connection.
    #[error("Failed to open stream ({cause}): {message}")]
    StreamOpenFailure {
        cause: OpenFailureCause,
        message: String,
    },

    /// A single read produced nothing in time; the caller should retry.
    #[error("Stream read stalled")]
    TransientReadStall,

    /// The decoder reported a hard failure mid-stream.
    #[error("Stream read failed: {0}")]
    ReadFailure(String),

    /// Structured failure raised by a decoder implementation.
    #[error("Decoder fault 0x{code:08X}: {message}")]
    DecoderFault { code: u32, message: String },

    /// The output sink rejected an operation.
    #[error("Output sink error: {0}")]
    Sink(String),

    /// The engine was used after `shutdown()`.
    #[error("Playback engine has been shut down")]
    Disposed,

    /// `stop()` or `shutdown()` interrupted a `play()` that had not finished
    /// starting.
    #[error("Playback start was cancelled")]
    Cancelled,

    /// Invalid engine configuration or missing collaborator.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Builds a [`PlaybackError::StreamOpenFailure`] with the cause's own text.
    pub fn open_failure(cause: OpenFailureCause) -> Self {
        Self::StreamOpenFailure {
            cause,
            message: cause.describe(),
        }
    }

    /// Re-classifies an error raised while opening a stream.
    ///
    /// Structured decoder codes are mapped through [`OpenFailureCause::from_code`],
    /// I/O errors become [`OpenFailureCause::Connection`], and errors that are
    /// already classified pass through untouched.
    pub fn into_open_failure(self) -> Self {
        match self {
            Self::DecoderFault { code, message } => {
                let cause = OpenFailureCause::from_code(code);
                let message = match cause {
                    OpenFailureCause::Other(_) => format!("{}: {}", cause, message),
                    _ => cause.describe(),
                };
                Self::StreamOpenFailure { cause, message }
            }
            Self::Io(err) => Self::StreamOpenFailure {
                cause: OpenFailureCause::Connection,
                message: err.to_string(),
            },
            Self::ReadFailure(message) | Self::Internal(message) => Self::StreamOpenFailure {
                cause: OpenFailureCause::Unknown,
                message,
            },
            Self::TransientReadStall => Self::StreamOpenFailure {
                cause: OpenFailureCause::Connection,
                message: "timed out waiting for stream".to_string(),
            },
            other => other,
        }
    }

    /// Returns `true` if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, PlaybackError::TransientReadStall)
    }

    /// Returns `true` if the stream could not be opened.
    pub fn is_open_failure(&self) -> bool {
        matches!(self, PlaybackError::StreamOpenFailure { .. })
    }

    /// Category carried in error notifications.
    pub fn category(&self) -> ErrorCategory {
        match self {
            PlaybackError::InvalidArgument(_) => ErrorCategory::InvalidArgument,
            PlaybackError::StreamOpenFailure { .. } => ErrorCategory::StreamOpenFailure,
            PlaybackError::TransientReadStall => ErrorCategory::ReadStall,
            PlaybackError::ReadFailure(_)
            | PlaybackError::DecoderFault { .. }
            | PlaybackError::Io(_) => ErrorCategory::ReadFailure,
            PlaybackError::Sink(_) => ErrorCategory::Sink,
            PlaybackError::Disposed => ErrorCategory::Disposed,
            PlaybackError::Cancelled => ErrorCategory::Internal,
            PlaybackError::Config(_) => ErrorCategory::Config,
            PlaybackError::Internal(_) => ErrorCategory::Internal,
        }
    }
}

impl From<radio_runtime::Error> for PlaybackError {
    fn from(err: radio_runtime::Error) -> Self {
        match err {
            radio_runtime::Error::Config(message) => PlaybackError::Config(message),
            radio_runtime::Error::Internal(message) => PlaybackError::Internal(message),
        }
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_cause_codes() {
        assert_eq!(
            OpenFailureCause::from_code(0xC00D001A),
            OpenFailureCause::UnsupportedFormat
        );
        assert_eq!(
            OpenFailureCause::from_code(0xC00D36B4),
            OpenFailureCause::NoAudioContent
        );
        assert_eq!(
            OpenFailureCause::from_code(0xC00D36FA),
            OpenFailureCause::UnsupportedStreamType
        );
        assert_eq!(
            OpenFailureCause::from_code(0x8000_4005).describe(),
            "decoder error 0x80004005"
        );
    }

    #[test]
    fn test_decoder_fault_becomes_open_failure() {
        let err = PlaybackError::DecoderFault {
            code: CAUSE_UNSUPPORTED_FORMAT,
            message: "MF_E_INVALIDMEDIATYPE".into(),
        }
        .into_open_failure();

        match err {
            PlaybackError::StreamOpenFailure { cause, message } => {
                assert_eq!(cause, OpenFailureCause::UnsupportedFormat);
                assert_eq!(message, "stream format is not supported");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_io_becomes_connection_failure() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = PlaybackError::from(io).into_open_failure();
        assert!(err.is_open_failure());
        assert!(matches!(
            err,
            PlaybackError::StreamOpenFailure {
                cause: OpenFailureCause::Connection,
                ..
            }
        ));
    }

    #[test]
    fn test_classified_errors_pass_through() {
        let err = PlaybackError::InvalidArgument("empty".into()).into_open_failure();
        assert!(matches!(err, PlaybackError::InvalidArgument(_)));
    }

    #[test]
    fn test_predicates_and_categories() {
        assert!(PlaybackError::TransientReadStall.is_transient());
        assert!(!PlaybackError::ReadFailure("x".into()).is_transient());
        assert_eq!(
            PlaybackError::open_failure(OpenFailureCause::NoAudioContent).category(),
            ErrorCategory::StreamOpenFailure
        );
        assert_eq!(PlaybackError::Disposed.category(), ErrorCategory::Disposed);
        assert_eq!(
            PlaybackError::DecoderFault {
                code: 1,
                message: "x".into()
            }
            .category(),
            ErrorCategory::ReadFailure
        );
    }
}
