//! Conversation controller — the turn-taking state machine at the heart of
//! the widget.
//!
//! ```text
//!            toggle on                  final transcript
//!   Idle ───────────────► Listening ─────────────────────► AwaitingReply
//!    ▲                        ▲   ▲                              │
//!    │ toggle off / dismiss   │   │ playback done / barge-in     │ reply
//!    └── (from any state)     │   │ / synthesis skipped          ▼
//!                             │   └───────────────────────── Speaking
//!                             └── reply failure (after delay)
//! ```
//!
//! Everything funnels into one cooperative loop: host commands, recognizer
//! events, and playback signals are processed strictly one at a time, so no
//! second turn can start while one is in flight. Barge-in is the only
//! user-visible cancellation: any transcript arriving while audio plays
//! stops the clip synchronously and hands the floor back to the user.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::VoiceConfig;
use crate::error::RecognizerError;
use crate::playback::{PlaybackEngine, PlaybackSignal};
use crate::responder::ResponderChain;
use crate::session::{ConversationTurn, VoiceSession, VoiceState};
use crate::synthesis::SynthesisClient;
use crate::transcript::{Role, TranscriptView};
use crate::transcription::{RecognizerEvent, TranscriptionSource, Utterance};

/// Fixed reply rendered when every responder strategy fails.
pub const APOLOGY_REPLY: &str = "I'm sorry, I lost my train of thought for a moment. \
Please say that again; I'm still listening.";

/// Notice surfaced once when microphone permission is denied.
pub const MIC_DENIED_NOTICE: &str =
    "Microphone access was denied. Allow microphone access to talk instead of typing.";

/// Host commands into the controller loop.
#[derive(Debug, Clone)]
pub enum ControllerCommand {
    /// Flip voice mode (the toggle affordance).
    Toggle,
    /// Typed submission from the chat form.
    SubmitText(String),
    /// The chat UI was dismissed; voice state resets to disabled.
    Dismiss,
    /// Stop the event loop.
    Shutdown,
}

/// Outward notifications for the embedding UI (toggle label, state display).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    StateChanged(VoiceState),
    VoiceToggled(bool),
}

/// One-time host notice callback, e.g. to surface a browser-style alert.
pub type OnNotice = Option<Arc<dyn Fn(&str) + Send + Sync>>;

/// Clone-able command sender for the embedding host.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<ControllerCommand>,
}

impl ControllerHandle {
    pub fn toggle_voice(&self) {
        let _ = self.tx.send(ControllerCommand::Toggle);
    }

    pub fn submit_text(&self, text: impl Into<String>) {
        let _ = self.tx.send(ControllerCommand::SubmitText(text.into()));
    }

    pub fn dismiss(&self) {
        let _ = self.tx.send(ControllerCommand::Dismiss);
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(ControllerCommand::Shutdown);
    }
}

/// Create the command channel for [`ConversationController::run`].
pub fn command_channel() -> (ControllerHandle, mpsc::UnboundedReceiver<ControllerCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ControllerHandle { tx }, rx)
}

/// Owns the voice session and mediates listen → send → speak turn-taking.
///
/// The playback engine (and therefore the controller) is not `Send` on some
/// platforms; run it on one task, e.g. via `tokio::task::spawn_local`.
pub struct ConversationController<V: TranscriptView> {
    state: VoiceState,
    session: VoiceSession,
    source: TranscriptionSource,
    responder: ResponderChain,
    synthesizer: Box<dyn SynthesisClient>,
    playback: Box<dyn PlaybackEngine>,
    view: V,
    config: VoiceConfig,
    draft: String,
    mic_notice_shown: bool,
    on_notice: OnNotice,
    ui_tx: mpsc::UnboundedSender<UiEvent>,
    ui_rx: Option<mpsc::UnboundedReceiver<UiEvent>>,
}

impl<V: TranscriptView> ConversationController<V> {
    pub fn new(
        view: V,
        source: TranscriptionSource,
        responder: ResponderChain,
        synthesizer: Box<dyn SynthesisClient>,
        playback: Box<dyn PlaybackEngine>,
        config: VoiceConfig,
    ) -> Self {
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        Self {
            state: VoiceState::Idle,
            session: VoiceSession::default(),
            source,
            responder,
            synthesizer,
            playback,
            view,
            config,
            draft: String::new(),
            mic_notice_shown: false,
            on_notice: None,
            ui_tx,
            ui_rx: Some(ui_rx),
        }
    }

    /// Set the one-time notice callback.
    pub fn with_notice(mut self, notice: Arc<dyn Fn(&str) + Send + Sync>) -> Self {
        self.on_notice = Some(notice);
        self
    }

    /// Take the UI event receiver. Available once.
    pub fn take_ui_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<UiEvent>> {
        self.ui_rx.take()
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn session(&self) -> &VoiceSession {
        &self.session
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn is_voice_enabled(&self) -> bool {
        self.session.enabled
    }

    /// The in-progress draft (latest interim transcript).
    pub fn draft(&self) -> &str {
        &self.draft
    }

    // ── Event loop ─────────────────────────────────────────────────────

    /// Drive the controller until `Shutdown` or the command channel closes.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ControllerCommand>,
        mut recognizer_events: mpsc::UnboundedReceiver<RecognizerEvent>,
        mut playback_signals: mpsc::UnboundedReceiver<PlaybackSignal>,
    ) {
        info!("conversation controller running ({})", self.source.locale());
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => {
                        if !self.handle_command(cmd).await {
                            break;
                        }
                    }
                    None => break,
                },
                Some(event) = recognizer_events.recv() => {
                    self.handle_recognizer_event(event).await;
                }
                Some(signal) = playback_signals.recv() => {
                    self.handle_playback_signal(signal).await;
                }
            }
        }
        self.disable_voice();
        info!("conversation controller stopped");
    }

    /// Process one host command. Returns false when the loop should stop.
    pub async fn handle_command(&mut self, command: ControllerCommand) -> bool {
        match command {
            ControllerCommand::Toggle => self.toggle().await,
            ControllerCommand::SubmitText(text) => self.submit_typed(text).await,
            ControllerCommand::Dismiss => self.dismiss(),
            ControllerCommand::Shutdown => return false,
        }
        true
    }

    /// Process one recognizer event.
    pub async fn handle_recognizer_event(&mut self, event: RecognizerEvent) {
        match event {
            RecognizerEvent::Transcript(utterance) => self.handle_transcript(utterance).await,
            RecognizerEvent::Error(kind) => self.handle_recognizer_error(kind),
            RecognizerEvent::Ended => self.handle_recognizer_ended().await,
        }
    }

    /// Process one playback signal.
    pub async fn handle_playback_signal(&mut self, signal: PlaybackSignal) {
        match signal {
            PlaybackSignal::Finished(handle) => {
                if self.session.active_playback != Some(handle) {
                    debug!("stale playback completion ignored");
                    return;
                }
                self.session.active_playback = None;
                if self.state == VoiceState::Speaking {
                    self.set_state(VoiceState::Listening);
                    // Settle before reopening the mic so we do not
                    // transcribe the tail of our own audio.
                    self.resume_capture(self.config.settle_delay).await;
                }
            }
            PlaybackSignal::Error(handle, msg) => {
                if self.session.active_playback != Some(handle) {
                    debug!("stale playback error ignored");
                    return;
                }
                // Same resumption as natural completion.
                warn!("playback error: {}", msg);
                self.cancel_playback();
                if self.state == VoiceState::Speaking {
                    self.set_state(VoiceState::Listening);
                    self.resume_capture(self.config.settle_delay).await;
                }
            }
        }
    }

    // ── Commands ───────────────────────────────────────────────────────

    async fn toggle(&mut self) {
        if self.session.enabled {
            self.disable_voice();
        } else {
            self.session.enabled = true;
            let _ = self.ui_tx.send(UiEvent::VoiceToggled(true));
            info!("voice mode enabled ({})", self.source.locale());
            self.resume_capture(Duration::ZERO).await;
        }
    }

    fn disable_voice(&mut self) {
        if self.session.enabled {
            info!("voice mode disabled");
        }
        self.source.stop();
        self.cancel_playback();
        self.session.reset();
        self.draft.clear();
        self.view.set_draft("");
        self.set_state(VoiceState::Idle);
        let _ = self.ui_tx.send(UiEvent::VoiceToggled(false));
    }

    fn dismiss(&mut self) {
        debug!("chat dismissed, resetting session");
        self.disable_voice();
    }

    async fn submit_typed(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        if self.state == VoiceState::AwaitingReply {
            debug!("typed submission dropped, turn already in flight");
            return;
        }
        // A new submission supersedes the previous reply's audio.
        if self.state == VoiceState::Speaking {
            self.cancel_playback();
        }
        if self.session.enabled {
            self.source.stop();
            self.session.listening = false;
        }
        self.submit_turn(text).await;
    }

    // ── Recognizer events ──────────────────────────────────────────────

    async fn handle_transcript(&mut self, utterance: Utterance) {
        if !self.session.enabled {
            debug!("transcript ignored, voice mode disabled");
            return;
        }

        // Barge-in: the user talking over playback wins, immediately.
        if self.state == VoiceState::Speaking {
            info!("barge-in: user speech during playback");
            self.cancel_playback();
            self.set_state(VoiceState::Listening);
            self.ensure_capture();
        }

        self.draft = utterance.text.clone();
        self.view.set_draft(&utterance.text);

        if !utterance.is_submittable() {
            return;
        }
        if self.state == VoiceState::AwaitingReply {
            debug!("final transcript dropped, turn already in flight");
            return;
        }

        let text = utterance.text.trim().to_string();
        self.draft.clear();
        self.view.set_draft("");
        self.source.stop();
        self.session.listening = false;
        self.submit_turn(text).await;
    }

    fn handle_recognizer_error(&mut self, kind: RecognizerError) {
        if kind.is_fatal() {
            warn!("recognizer fatal, disabling voice mode: {}", kind);
            if !self.mic_notice_shown {
                self.mic_notice_shown = true;
                if let Some(ref notify) = self.on_notice {
                    notify(MIC_DENIED_NOTICE);
                }
            }
            self.disable_voice();
        } else {
            // Silent continuation: capture resumes via the engine's Ended event.
            debug!("recognizer transient: {}", kind);
        }
    }

    async fn handle_recognizer_ended(&mut self) {
        self.source.note_ended();
        self.session.listening = false;
        if !self.session.enabled {
            return;
        }
        if self.state == VoiceState::AwaitingReply {
            // Keep the mic cold while a turn is in flight; capture resumes
            // on the reply path.
            return;
        }
        self.resume_capture(self.config.restart_delay).await;
    }

    // ── Turn submission ────────────────────────────────────────────────

    /// One full turn: render the user's text synchronously, await the
    /// responder chain behind a placeholder, render the reply (or the fixed
    /// apology), then speak it when voice mode is on.
    async fn submit_turn(&mut self, text: String) {
        self.set_state(VoiceState::AwaitingReply);
        self.view.append_message(&text, Role::User);
        let placeholder = self.view.append_placeholder();
        let mut turn = ConversationTurn::new(text, placeholder);

        match self.responder.ask(&turn.user_text).await {
            Ok(reply) => {
                self.view.remove_placeholder(turn.placeholder);
                self.view.append_message(&reply, Role::System);
                turn.reply = Some(reply);
                self.finish_turn(turn).await;
            }
            Err(e) => {
                warn!("responder failed: {}", e);
                turn.failed = true;
                self.view.remove_placeholder(turn.placeholder);
                self.view.append_message(APOLOGY_REPLY, Role::System);
                if self.session.enabled {
                    self.resume_capture(self.config.reply_failure_delay).await;
                } else {
                    self.set_state(VoiceState::Idle);
                }
            }
        }
    }

    /// Reply is rendered; speak it if voice mode is on, then settle into the
    /// follow-up state.
    async fn finish_turn(&mut self, turn: ConversationTurn) {
        let Some(reply) = turn.reply else {
            return;
        };
        if !self.session.enabled {
            self.set_state(VoiceState::Idle);
            return;
        }
        match self.synthesizer.synthesize(&reply).await {
            Ok(clip) => match self.playback.play(clip) {
                Ok(handle) => {
                    // play() released the previous resource, so exactly one
                    // is live now.
                    self.session.active_playback = Some(handle);
                    self.set_state(VoiceState::Speaking);
                    // Mic back on right away so the user can barge in.
                    self.ensure_capture();
                }
                Err(e) => {
                    warn!("playback failed, resuming capture: {}", e);
                    self.resume_capture(Duration::ZERO).await;
                }
            },
            Err(e) => {
                // The reply text is already on screen; losing audio is not fatal.
                warn!("synthesis failed, skipping audio: {}", e);
                self.resume_capture(Duration::ZERO).await;
            }
        }
    }

    // ── Internal helpers ───────────────────────────────────────────────

    /// Restart capture after `delay` and, unless audio is still playing,
    /// settle into `Listening`.
    async fn resume_capture(&mut self, delay: Duration) {
        if !self.session.enabled {
            return;
        }
        if !delay.is_zero() {
            sleep(delay).await;
        }
        self.ensure_capture();
        if self.state != VoiceState::Speaking {
            self.set_state(VoiceState::Listening);
        }
    }

    fn ensure_capture(&mut self) {
        match self.source.start() {
            Ok(()) => self.session.listening = true,
            Err(e) => warn!("recognizer start failed: {}", e),
        }
    }

    /// Release the live playback resource, if any. Safe to call repeatedly.
    fn cancel_playback(&mut self) {
        if self.session.active_playback.take().is_some() {
            self.playback.cancel();
        }
    }

    fn set_state(&mut self, new_state: VoiceState) {
        if self.state != new_state {
            debug!("state {:?} -> {:?}", self.state, new_state);
            self.state = new_state;
            let _ = self.ui_tx.send(UiEvent::StateChanged(new_state));
        }
    }
}
