//! # Companion Voice - Conversational Voice Widget Core
//!
//! This crate implements the turn-taking engine behind an embeddable voice
//! companion: continuous speech capture, a fallback chain of reply
//! providers, transcript rendering, and spoken replies with barge-in.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Conversation Controller                      │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
//! │  │ Transcription│→ │  Responder   │→ │  Transcript  │      │
//! │  │    Source    │  │    Chain     │  │     View     │      │
//! │  └──────────────┘  └──────────────┘  └──────────────┘      │
//! │         ↓                                      ↓            │
//! │  ┌──────────────┐                    ┌──────────────┐      │
//! │  │   Playback   │←───────────────────│  Synthesis   │      │
//! │  │   (rodio)    │  Barge-in Cancel   │    Client    │      │
//! │  └──────────────┘                    └──────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The controller is a single cooperative event loop: host commands,
//! recognizer events, and playback completion signals are multiplexed over
//! channels and processed one at a time, which keeps turns strictly
//! serialized without any locking.

pub mod config;
pub mod controller;
pub mod error;
pub mod playback;
pub mod responder;
pub mod session;
pub mod synthesis;
pub mod transcript;
pub mod transcription;

pub use config::{DirectApiConfig, VoiceConfig};
pub use controller::{
    command_channel, ControllerCommand, ControllerHandle, ConversationController, OnNotice,
    UiEvent, APOLOGY_REPLY, MIC_DENIED_NOTICE,
};
pub use error::{
    PlaybackError, RecognizerError, ResponderError, SynthesisError, VoiceError, VoiceResult,
};
pub use playback::{PlaybackEngine, PlaybackHandle, PlaybackSignal, RodioPlayback};
pub use responder::{
    BackendResponder, CannedResponder, DirectApiResponder, ResponderChain, ResponderStrategy,
};
pub use session::{ConversationTurn, VoiceSession, VoiceState};
pub use synthesis::{AudioClip, ProxySynthesizer, SpeechApiSynthesizer, SynthesisClient};
pub use transcript::{ChatLog, MessageId, PlaceholderId, Role, TranscriptView};
pub use transcription::{
    HostRecognizer, HostRecognizerHandle, RecognizerEngine, RecognizerEvent, TranscriptionSource,
    Utterance,
};
