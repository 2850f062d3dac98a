//! Voice session state and the per-turn record.

use serde::{Deserialize, Serialize};

use crate::playback::PlaybackHandle;
use crate::transcript::PlaceholderId;

/// Controller state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceState {
    /// Voice mode off, nothing in flight.
    Idle,
    /// Capture running, waiting for a final transcript.
    Listening,
    /// A turn has been submitted; waiting on the responder.
    AwaitingReply,
    /// Playing back the synthesized reply.
    Speaking,
}

/// Voice mode state, owned by the controller instance. No ambient globals,
/// so independent controllers can coexist (and be tested) side by side.
///
/// Invariant: `listening` holds only while `enabled` holds and no responder
/// request is in flight.
#[derive(Debug, Default)]
pub struct VoiceSession {
    pub enabled: bool,
    pub listening: bool,
    /// The single live playback resource. Replacing or clearing it goes
    /// through the playback engine, which releases the prior resource.
    pub active_playback: Option<PlaybackHandle>,
}

impl VoiceSession {
    /// Back to disabled, as when the chat UI is dismissed.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Ephemeral record of one user-utterance-to-reply exchange. Created when a
/// final utterance or typed submission is accepted, discarded once rendered.
#[derive(Debug)]
pub struct ConversationTurn {
    pub user_text: String,
    pub placeholder: PlaceholderId,
    pub reply: Option<String>,
    pub failed: bool,
}

impl ConversationTurn {
    pub fn new(user_text: impl Into<String>, placeholder: PlaceholderId) -> Self {
        Self {
            user_text: user_text.into(),
            placeholder,
            reply: None,
            failed: false,
        }
    }
}
