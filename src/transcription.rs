//! Transcription source: the adapter between the host's speech recognizer
//! and the controller loop.
//!
//! The engine itself (a browser recognizer, an OS dictation service) lives
//! on the host side of the boundary; it pushes interim/final transcripts,
//! faults, and end-of-session events into a channel the controller drains.
//! `TranscriptionSource` owns the engine and guards start/stop so that a
//! re-entrant start can never duplicate capture.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{RecognizerError, VoiceResult};

/// One recognizer result. Only a final result with non-empty trimmed text
/// starts a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub is_final: bool,
    pub timestamp: DateTime<Utc>,
}

impl Utterance {
    pub fn new(text: impl Into<String>, is_final: bool) -> Self {
        Self {
            text: text.into(),
            is_final,
            timestamp: Utc::now(),
        }
    }

    /// Whether this utterance may be submitted as a turn.
    pub fn is_submittable(&self) -> bool {
        self.is_final && !self.text.trim().is_empty()
    }
}

/// Events delivered by the recognizer engine into the controller loop.
#[derive(Debug, Clone)]
pub enum RecognizerEvent {
    /// An interim or final transcript.
    Transcript(Utterance),

    /// A recognizer fault. Fatal kinds disable voice mode.
    Error(RecognizerError),

    /// The engine halted for any reason, normal stop included. The
    /// controller decides whether to auto-restart.
    Ended,
}

/// Host-side speech engine. Both `start` and `stop` must be idempotent.
pub trait RecognizerEngine {
    fn start(&mut self) -> VoiceResult<()>;
    fn stop(&mut self);
    fn locale(&self) -> &str;
}

/// Owns the engine and tracks whether capture is live, so a start while
/// already running is a logged no-op rather than duplicated capture.
pub struct TranscriptionSource {
    engine: Box<dyn RecognizerEngine>,
    running: bool,
}

impl TranscriptionSource {
    pub fn new(engine: Box<dyn RecognizerEngine>) -> Self {
        Self {
            engine,
            running: false,
        }
    }

    /// Begin or resume capture. No-op when already running.
    pub fn start(&mut self) -> VoiceResult<()> {
        if self.running {
            debug!("recognizer already active, start skipped");
            return Ok(());
        }
        self.engine.start()?;
        self.running = true;
        Ok(())
    }

    /// Halt capture. No-op when already stopped.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.engine.stop();
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The engine reported `Ended`: capture is no longer live, whatever we
    /// believed. The next `start` goes through to the engine again.
    pub fn note_ended(&mut self) {
        self.running = false;
    }

    pub fn locale(&self) -> &str {
        self.engine.locale()
    }
}

/// Production engine: the embedding host bridges its native recognizer
/// callbacks through the returned handle. The shared `active` flag tells
/// the bridge whether the native engine should be running; transcripts
/// pushed while inactive are dropped, matching a stopped native engine.
pub struct HostRecognizer {
    locale: String,
    active: Arc<AtomicBool>,
    event_tx: mpsc::UnboundedSender<RecognizerEvent>,
}

impl HostRecognizer {
    /// Returns the engine, the host-side handle, and the event stream the
    /// controller loop consumes.
    pub fn new(
        locale: impl Into<String>,
    ) -> (
        Self,
        HostRecognizerHandle,
        mpsc::UnboundedReceiver<RecognizerEvent>,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let active = Arc::new(AtomicBool::new(false));
        let engine = Self {
            locale: locale.into(),
            active: Arc::clone(&active),
            event_tx: event_tx.clone(),
        };
        (engine, HostRecognizerHandle { active, event_tx }, event_rx)
    }
}

impl RecognizerEngine for HostRecognizer {
    fn start(&mut self) -> VoiceResult<()> {
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        // Native engines fire an end-of-session callback after every stop.
        let _ = self.event_tx.send(RecognizerEvent::Ended);
    }

    fn locale(&self) -> &str {
        &self.locale
    }
}

/// Clone-able handle the host bridge uses to inject recognizer callbacks.
#[derive(Clone)]
pub struct HostRecognizerHandle {
    active: Arc<AtomicBool>,
    event_tx: mpsc::UnboundedSender<RecognizerEvent>,
}

impl HostRecognizerHandle {
    /// Whether the controller currently wants capture running.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Forward a recognition result.
    pub fn push_transcript(&self, text: &str, is_final: bool) {
        if !self.is_active() {
            debug!("transcript dropped, recognizer stopped");
            return;
        }
        let _ = self
            .event_tx
            .send(RecognizerEvent::Transcript(Utterance::new(text, is_final)));
    }

    /// Forward a recognizer fault. Delivered even when stopped, since
    /// permission denial can arrive during startup.
    pub fn push_error(&self, kind: RecognizerError) {
        let _ = self.event_tx.send(RecognizerEvent::Error(kind));
    }

    /// Forward the engine halting on its own (timeout, service hiccup).
    pub fn push_ended(&self) {
        self.active.store(false, Ordering::SeqCst);
        let _ = self.event_tx.send(RecognizerEvent::Ended);
    }
}
