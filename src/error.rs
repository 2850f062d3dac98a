//! Error types for the voice conversation widget.
//!
//! Every leaf fault maps to a defined resumption state in the controller;
//! none of these terminate the event loop.

use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Faults reported by the host's speech recognizer engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecognizerError {
    /// No speech was detected before the engine gave up. Transient.
    #[error("no speech detected")]
    NoSpeech,

    /// Capture was aborted by the engine or the host. Transient.
    #[error("recognition aborted")]
    Aborted,

    /// The audio input device failed. Transient.
    #[error("audio capture failed")]
    AudioCapture,

    /// The engine could not reach its recognition service. Transient.
    #[error("recognition service unreachable")]
    Network,

    /// Microphone permission was denied. Fatal to voice mode.
    #[error("microphone access denied")]
    PermissionDenied,
}

impl RecognizerError {
    /// Fatal errors disable voice mode with a one-time notice; everything
    /// else is a silent continuation (capture resumes on its own).
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::PermissionDenied)
    }
}

/// Failures from a responder strategy (remote text generation).
#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("responder request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("responder returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("responder body is missing `content`")]
    MalformedBody,

    #[error("no responder strategy produced a reply")]
    Exhausted,
}

/// Failures from a synthesis client (text to speech audio).
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("synthesis request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("synthesis returned status {0}")]
    BadResponse(reqwest::StatusCode),

    /// The payload was implausibly small to be real audio. Never played.
    #[error("synthesis returned {len} bytes (minimum {min})")]
    EmptyAudio { len: usize, min: usize },
}

/// Failures from the playback engine. The controller treats these as
/// equivalent to natural completion.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("audio output device error: {0}")]
    Device(String),

    #[error("audio decode failed: {0}")]
    Decode(String),
}

/// Umbrella error for the crate's public surface.
#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("recognizer error: {0}")]
    Recognition(#[from] RecognizerError),

    #[error(transparent)]
    Responder(#[from] ResponderError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error("configuration error: {0}")]
    Config(String),
}
