//! Integration tests for the conversation turn loop.
//!
//! The controller is driven through its public event handlers with scripted
//! responder/synthesis/playback doubles, so every state transition is
//! observable without audio hardware or a network.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use companion_voice::{
    command_channel, AudioClip, ChatLog, ControllerCommand, ConversationController, PlaybackEngine,
    PlaybackError, PlaybackHandle, PlaybackSignal, RecognizerError, RecognizerEvent,
    ResponderChain, ResponderError, ResponderStrategy, Role, SynthesisClient, SynthesisError,
    TranscriptView, TranscriptionSource, UiEvent, Utterance, VoiceConfig, VoiceState,
    APOLOGY_REPLY, MIC_DENIED_NOTICE,
};
use companion_voice::{HostRecognizer, HostRecognizerHandle};
use tokio::sync::mpsc;
use tokio_test::assert_ok;

// ── Scripted doubles ───────────────────────────────────────────────────

struct ScriptedResponder {
    reply: Result<&'static str, ()>,
}

#[async_trait]
impl ResponderStrategy for ScriptedResponder {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn ask(&self, _utterance: &str) -> Result<String, ResponderError> {
        match self.reply {
            Ok(text) => Ok(text.to_string()),
            Err(()) => Err(ResponderError::Exhausted),
        }
    }
}

struct ScriptedSynthesizer {
    bytes: usize,
    min_bytes: usize,
}

#[async_trait]
impl SynthesisClient for ScriptedSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<AudioClip, SynthesisError> {
        if self.bytes < self.min_bytes {
            return Err(SynthesisError::EmptyAudio {
                len: self.bytes,
                min: self.min_bytes,
            });
        }
        Ok(AudioClip {
            bytes: vec![0u8; self.bytes],
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PlayEvent {
    Played(u64),
    Cancelled,
}

#[derive(Default)]
struct ScriptedPlayback {
    events: Arc<Mutex<Vec<PlayEvent>>>,
    next_id: u64,
    playing: bool,
}

impl PlaybackEngine for ScriptedPlayback {
    fn play(&mut self, _clip: AudioClip) -> Result<PlaybackHandle, PlaybackError> {
        self.next_id += 1;
        self.playing = true;
        self.events
            .lock()
            .unwrap()
            .push(PlayEvent::Played(self.next_id));
        Ok(PlaybackHandle::new(self.next_id))
    }

    fn cancel(&mut self) {
        self.playing = false;
        self.events.lock().unwrap().push(PlayEvent::Cancelled);
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

/// Transcript view shared with the test, for driving the controller through
/// its consuming event loop.
#[derive(Clone, Default)]
struct SharedLog(Arc<Mutex<ChatLog>>);

impl TranscriptView for SharedLog {
    fn append_message(&mut self, text: &str, role: Role) -> companion_voice::MessageId {
        self.0.lock().unwrap().append_message(text, role)
    }

    fn append_placeholder(&mut self) -> companion_voice::PlaceholderId {
        self.0.lock().unwrap().append_placeholder()
    }

    fn remove_placeholder(&mut self, id: companion_voice::PlaceholderId) {
        self.0.lock().unwrap().remove_placeholder(id)
    }

    fn set_draft(&mut self, text: &str) {
        self.0.lock().unwrap().set_draft(text)
    }
}

// ── Harness ────────────────────────────────────────────────────────────

struct Harness {
    ctrl: ConversationController<ChatLog>,
    plays: Arc<Mutex<Vec<PlayEvent>>>,
    recognizer: HostRecognizerHandle,
    recognizer_rx: mpsc::UnboundedReceiver<RecognizerEvent>,
    notices: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    fn new(reply: Result<&'static str, ()>, synth_bytes: usize) -> Self {
        let config = VoiceConfig::default().without_delays();
        let (engine, recognizer, recognizer_rx) = HostRecognizer::new(&config.locale);
        let source = TranscriptionSource::new(Box::new(engine));
        let chain = ResponderChain::new(vec![Box::new(ScriptedResponder { reply })]);
        let synth = ScriptedSynthesizer {
            bytes: synth_bytes,
            min_bytes: config.min_audio_bytes,
        };
        let playback = ScriptedPlayback::default();
        let plays = Arc::clone(&playback.events);
        let notices: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = Arc::clone(&notices);
        let ctrl = ConversationController::new(
            ChatLog::new(),
            source,
            chain,
            Box::new(synth),
            Box::new(playback),
            config,
        )
        .with_notice(Arc::new(move |msg: &str| {
            sink.lock().unwrap().push(msg.to_string())
        }));
        Self {
            ctrl,
            plays,
            recognizer,
            recognizer_rx,
            notices,
        }
    }

    fn ok() -> Self {
        Self::new(Ok("a warm reply"), 4096)
    }

    async fn enable_voice(&mut self) {
        self.ctrl.handle_command(ControllerCommand::Toggle).await;
        assert_eq!(self.ctrl.state(), VoiceState::Listening);
    }

    /// Push a transcript through the host bridge and drain it into the
    /// controller, like the event loop would.
    async fn speak(&mut self, text: &str, is_final: bool) {
        self.recognizer.push_transcript(text, is_final);
        while let Ok(event) = self.recognizer_rx.try_recv() {
            self.ctrl.handle_recognizer_event(event).await;
        }
    }

    fn plays(&self) -> Vec<PlayEvent> {
        self.plays.lock().unwrap().clone()
    }

    fn messages(&self) -> Vec<(Role, String)> {
        self.ctrl
            .view()
            .messages()
            .map(|(r, t)| (r, t.to_string()))
            .collect()
    }
}

// ── Round trip ─────────────────────────────────────────────────────────

#[tokio::test]
async fn voice_round_trip_renders_then_speaks() {
    let mut h = Harness::ok();
    h.enable_voice().await;

    h.speak("hel", false).await;
    assert_eq!(h.ctrl.draft(), "hel");

    h.speak("hello there", true).await;

    assert_eq!(
        h.messages(),
        vec![
            (Role::User, "hello there".to_string()),
            (Role::System, "a warm reply".to_string()),
        ]
    );
    assert_eq!(h.ctrl.view().placeholder_count(), 0);
    assert_eq!(h.ctrl.draft(), "");
    assert_eq!(h.ctrl.state(), VoiceState::Speaking);
    assert_eq!(h.plays(), vec![PlayEvent::Played(1)]);
}

#[tokio::test]
async fn playback_completion_returns_to_listening() {
    let mut h = Harness::ok();
    h.enable_voice().await;
    h.speak("hello there", true).await;
    assert_eq!(h.ctrl.state(), VoiceState::Speaking);

    h.ctrl
        .handle_playback_signal(PlaybackSignal::Finished(PlaybackHandle::new(1)))
        .await;

    assert_eq!(h.ctrl.state(), VoiceState::Listening);
    assert!(h.ctrl.session().active_playback.is_none());
}

#[tokio::test]
async fn stale_playback_completion_is_ignored() {
    let mut h = Harness::ok();
    h.enable_voice().await;
    h.speak("hello there", true).await;

    // A completion for a clip that is no longer the live one.
    h.ctrl
        .handle_playback_signal(PlaybackSignal::Finished(PlaybackHandle::new(99)))
        .await;

    assert_eq!(h.ctrl.state(), VoiceState::Speaking);
    assert!(h.ctrl.session().active_playback.is_some());
}

#[tokio::test]
async fn playback_error_resumes_like_completion() {
    let mut h = Harness::ok();
    h.enable_voice().await;
    h.speak("hello there", true).await;
    assert_eq!(h.ctrl.state(), VoiceState::Speaking);

    h.ctrl
        .handle_playback_signal(PlaybackSignal::Error(
            PlaybackHandle::new(1),
            "device lost".to_string(),
        ))
        .await;

    assert_eq!(h.ctrl.state(), VoiceState::Listening);
    assert!(h.ctrl.session().active_playback.is_none());
    assert!(h.recognizer.is_active());
    assert_eq!(h.plays().last(), Some(&PlayEvent::Cancelled));
}

#[tokio::test]
async fn stale_playback_error_is_ignored() {
    let mut h = Harness::ok();
    h.enable_voice().await;
    h.speak("hello there", true).await;

    // An error report from a clip that was already superseded.
    h.ctrl
        .handle_playback_signal(PlaybackSignal::Error(
            PlaybackHandle::new(99),
            "device lost".to_string(),
        ))
        .await;

    assert_eq!(h.ctrl.state(), VoiceState::Speaking);
    assert!(h.ctrl.session().active_playback.is_some());
    assert_eq!(h.plays(), vec![PlayEvent::Played(1)]);
}

// ── Barge-in ───────────────────────────────────────────────────────────

#[tokio::test]
async fn barge_in_cancels_playback_once() {
    let mut h = Harness::ok();
    h.enable_voice().await;
    h.speak("hello there", true).await;
    assert_eq!(h.ctrl.state(), VoiceState::Speaking);

    h.speak("actually", false).await;
    assert_eq!(h.ctrl.state(), VoiceState::Listening);
    assert_eq!(
        h.plays(),
        vec![PlayEvent::Played(1), PlayEvent::Cancelled]
    );

    // Further interim transcripts update the draft without another cancel.
    h.speak("actually wait", false).await;
    assert_eq!(h.ctrl.draft(), "actually wait");
    assert_eq!(
        h.plays(),
        vec![PlayEvent::Played(1), PlayEvent::Cancelled]
    );
}

#[tokio::test]
async fn barge_in_final_starts_next_turn_immediately() {
    let mut h = Harness::ok();
    h.enable_voice().await;
    h.speak("first question", true).await;
    assert_eq!(h.ctrl.state(), VoiceState::Speaking);

    // A final transcript during playback cancels and submits in one step.
    h.speak("second question", true).await;

    assert_eq!(h.ctrl.state(), VoiceState::Speaking);
    assert_eq!(
        h.plays(),
        vec![
            PlayEvent::Played(1),
            PlayEvent::Cancelled,
            PlayEvent::Played(2),
        ]
    );
    assert_eq!(h.messages().len(), 4);
}

#[tokio::test]
async fn at_most_one_clip_is_ever_live() {
    let mut h = Harness::ok();
    h.enable_voice().await;
    h.speak("one", true).await;
    h.speak("two", true).await;
    h.speak("three", true).await;

    // Every new clip is preceded by the cancellation of the previous one.
    let plays = h.plays();
    let lives = plays.iter().fold(0i32, |live, e| match e {
        PlayEvent::Played(_) => {
            assert_eq!(live, 0, "clip started while another was live: {plays:?}");
            live + 1
        }
        PlayEvent::Cancelled => live - 1,
    });
    assert_eq!(lives, 1);
}

// ── Toggle and dismissal ───────────────────────────────────────────────

#[tokio::test]
async fn toggle_off_while_speaking_cancels_and_idles() {
    let mut h = Harness::ok();
    h.enable_voice().await;
    h.speak("hello there", true).await;
    assert_eq!(h.ctrl.state(), VoiceState::Speaking);

    h.ctrl.handle_command(ControllerCommand::Toggle).await;

    assert_eq!(h.ctrl.state(), VoiceState::Idle);
    assert!(!h.ctrl.is_voice_enabled());
    assert!(h.ctrl.session().active_playback.is_none());
    assert_eq!(h.plays().last(), Some(&PlayEvent::Cancelled));
    assert!(!h.recognizer.is_active());
}

#[tokio::test]
async fn dismiss_resets_session() {
    let mut h = Harness::ok();
    h.enable_voice().await;
    h.speak("draf", false).await;

    h.ctrl.handle_command(ControllerCommand::Dismiss).await;

    assert_eq!(h.ctrl.state(), VoiceState::Idle);
    assert!(!h.ctrl.is_voice_enabled());
    assert_eq!(h.ctrl.draft(), "");
}

#[tokio::test]
async fn transcripts_after_disable_are_ignored() {
    let mut h = Harness::ok();
    h.enable_voice().await;
    h.ctrl.handle_command(ControllerCommand::Toggle).await;

    // The bridge drops pushes while inactive; a straggler that raced the
    // stop is ignored by the controller as well.
    h.ctrl
        .handle_recognizer_event(RecognizerEvent::Transcript(Utterance::new(
            "too late", true,
        )))
        .await;

    assert!(h.messages().is_empty());
    assert_eq!(h.ctrl.state(), VoiceState::Idle);
}

// ── Typed submissions ──────────────────────────────────────────────────

#[tokio::test]
async fn typed_turn_with_voice_off_stays_idle() {
    let mut h = Harness::ok();
    h.ctrl
        .handle_command(ControllerCommand::SubmitText("hello".to_string()))
        .await;

    assert_eq!(
        h.messages(),
        vec![
            (Role::User, "hello".to_string()),
            (Role::System, "a warm reply".to_string()),
        ]
    );
    // No voice mode, so the reply is not spoken.
    assert!(h.plays().is_empty());
    assert_eq!(h.ctrl.state(), VoiceState::Idle);
}

#[tokio::test]
async fn typed_turn_with_voice_on_speaks_reply() {
    let mut h = Harness::ok();
    h.enable_voice().await;

    h.ctrl
        .handle_command(ControllerCommand::SubmitText("  hello  ".to_string()))
        .await;

    assert_eq!(h.messages()[0], (Role::User, "hello".to_string()));
    assert_eq!(h.ctrl.state(), VoiceState::Speaking);
    assert_eq!(h.plays(), vec![PlayEvent::Played(1)]);
}

#[tokio::test]
async fn blank_typed_submission_is_ignored() {
    let mut h = Harness::ok();
    h.ctrl
        .handle_command(ControllerCommand::SubmitText("   ".to_string()))
        .await;
    assert!(h.messages().is_empty());
}

// ── Failure paths ──────────────────────────────────────────────────────

#[tokio::test]
async fn responder_failure_renders_apology_and_resumes() {
    let mut h = Harness::new(Err(()), 4096);
    h.enable_voice().await;
    h.speak("hello there", true).await;

    assert_eq!(
        h.messages(),
        vec![
            (Role::User, "hello there".to_string()),
            (Role::System, APOLOGY_REPLY.to_string()),
        ]
    );
    assert_eq!(h.ctrl.view().placeholder_count(), 0);
    // The apology is rendered, not spoken; capture resumes.
    assert!(h.plays().is_empty());
    assert_eq!(h.ctrl.state(), VoiceState::Listening);
    assert!(h.recognizer.is_active());
}

#[tokio::test]
async fn responder_failure_with_voice_off_idles() {
    let mut h = Harness::new(Err(()), 4096);
    h.ctrl
        .handle_command(ControllerCommand::SubmitText("hello".to_string()))
        .await;

    assert_eq!(h.messages()[1], (Role::System, APOLOGY_REPLY.to_string()));
    assert_eq!(h.ctrl.state(), VoiceState::Idle);
}

#[tokio::test]
async fn undersized_audio_is_skipped_not_played() {
    // 2xx body smaller than min_audio_bytes: reply shows, audio is skipped.
    let mut h = Harness::new(Ok("a warm reply"), 10);
    h.enable_voice().await;
    h.speak("hello there", true).await;

    assert_eq!(h.messages()[1], (Role::System, "a warm reply".to_string()));
    assert!(h.plays().is_empty());
    assert_eq!(h.ctrl.state(), VoiceState::Listening);
}

#[tokio::test]
async fn permission_denial_notifies_once_and_disables() {
    let mut h = Harness::ok();
    h.enable_voice().await;

    h.ctrl
        .handle_recognizer_event(RecognizerEvent::Error(RecognizerError::PermissionDenied))
        .await;

    assert!(!h.ctrl.is_voice_enabled());
    assert_eq!(h.ctrl.state(), VoiceState::Idle);
    assert_eq!(
        h.notices.lock().unwrap().as_slice(),
        &[MIC_DENIED_NOTICE.to_string()]
    );

    // A second denial (re-toggle, denied again) repeats the disable but
    // not the notice.
    h.enable_voice().await;
    h.ctrl
        .handle_recognizer_event(RecognizerEvent::Error(RecognizerError::PermissionDenied))
        .await;
    assert!(!h.ctrl.is_voice_enabled());
    assert_eq!(h.notices.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn transient_recognizer_error_keeps_listening() {
    let mut h = Harness::ok();
    h.enable_voice().await;

    for kind in [
        RecognizerError::NoSpeech,
        RecognizerError::Aborted,
        RecognizerError::AudioCapture,
        RecognizerError::Network,
    ] {
        h.ctrl
            .handle_recognizer_event(RecognizerEvent::Error(kind))
            .await;
        assert!(h.ctrl.is_voice_enabled(), "disabled on transient {kind:?}");
    }
    assert!(h.notices.lock().unwrap().is_empty());
}

#[tokio::test]
async fn engine_end_restarts_capture_while_listening() {
    let mut h = Harness::ok();
    h.enable_voice().await;

    h.recognizer.push_ended();
    while let Ok(event) = h.recognizer_rx.try_recv() {
        h.ctrl.handle_recognizer_event(event).await;
    }

    assert_eq!(h.ctrl.state(), VoiceState::Listening);
    assert!(h.recognizer.is_active());
}

#[tokio::test]
async fn engine_end_while_disabled_stays_idle() {
    let mut h = Harness::ok();
    h.ctrl
        .handle_recognizer_event(RecognizerEvent::Ended)
        .await;
    assert_eq!(h.ctrl.state(), VoiceState::Idle);
    assert!(!h.recognizer.is_active());
}

// ── Full event loop ────────────────────────────────────────────────────

#[tokio::test]
async fn event_loop_round_trip_with_ui_events() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let config = VoiceConfig::default().without_delays();
    let (engine, recognizer, recognizer_rx) = HostRecognizer::new(&config.locale);
    let source = TranscriptionSource::new(Box::new(engine));
    let chain = ResponderChain::new(vec![Box::new(ScriptedResponder {
        reply: Ok("a warm reply"),
    })]);
    let playback = ScriptedPlayback::default();
    let plays = Arc::clone(&playback.events);
    let log = SharedLog::default();
    let view = log.clone();
    let mut ctrl = ConversationController::new(
        view,
        source,
        chain,
        Box::new(ScriptedSynthesizer {
            bytes: 4096,
            min_bytes: config.min_audio_bytes,
        }),
        Box::new(playback),
        config,
    );
    let mut ui_rx = ctrl.take_ui_receiver().expect("ui receiver taken once");
    assert!(ctrl.take_ui_receiver().is_none());

    let (handle, command_rx) = command_channel();
    let (_playback_tx, playback_rx) = mpsc::unbounded_channel();

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async move {
            let loop_task =
                tokio::task::spawn_local(ctrl.run(command_rx, recognizer_rx, playback_rx));

            handle.toggle_voice();
            tokio::task::yield_now().await;
            // The bridge only forwards transcripts once capture is active.
            while !recognizer.is_active() {
                tokio::task::yield_now().await;
            }
            recognizer.push_transcript("hello there", true);

            // Wait for the spoken reply to surface.
            loop {
                if !plays.lock().unwrap().is_empty() {
                    break;
                }
                tokio::task::yield_now().await;
            }

            handle.shutdown();
            tokio_test::assert_ok!(loop_task.await);
        })
        .await;

    let log = log.0.lock().unwrap();
    let msgs: Vec<_> = log.messages().collect();
    assert_eq!(
        msgs,
        vec![
            (Role::User, "hello there"),
            (Role::System, "a warm reply"),
        ]
    );

    let mut seen = Vec::new();
    while let Ok(event) = ui_rx.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&UiEvent::VoiceToggled(true)));
    let states: Vec<_> = seen
        .iter()
        .filter_map(|e| match e {
            UiEvent::StateChanged(s) => Some(*s),
            _ => None,
        })
        .collect();
    assert_eq!(
        &states[..3],
        &[
            VoiceState::Listening,
            VoiceState::AwaitingReply,
            VoiceState::Speaking,
        ]
    );
}

#[tokio::test]
async fn command_handle_drives_typed_turn_and_dismiss() {
    let config = VoiceConfig::default().without_delays();
    let (engine, _recognizer, recognizer_rx) = HostRecognizer::new(&config.locale);
    let source = TranscriptionSource::new(Box::new(engine));
    let chain = ResponderChain::new(vec![Box::new(ScriptedResponder {
        reply: Ok("a warm reply"),
    })]);
    let playback = ScriptedPlayback::default();
    let plays = Arc::clone(&playback.events);
    let log = SharedLog::default();
    let view = log.clone();
    let mut ctrl = ConversationController::new(
        view,
        source,
        chain,
        Box::new(ScriptedSynthesizer {
            bytes: 4096,
            min_bytes: config.min_audio_bytes,
        }),
        Box::new(playback),
        config,
    );
    let mut ui_rx = ctrl.take_ui_receiver().expect("ui receiver");

    let (handle, command_rx) = command_channel();
    let (_playback_tx, playback_rx) = mpsc::unbounded_channel();

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async move {
            let loop_task =
                tokio::task::spawn_local(ctrl.run(command_rx, recognizer_rx, playback_rx));

            handle.toggle_voice();
            handle.submit_text("hello");

            // Wait for the spoken reply, then close the chat.
            loop {
                if !plays.lock().unwrap().is_empty() {
                    break;
                }
                tokio::task::yield_now().await;
            }
            handle.dismiss();
            handle.shutdown();
            tokio_test::assert_ok!(loop_task.await);
        })
        .await;

    let log = log.0.lock().unwrap();
    let msgs: Vec<_> = log.messages().collect();
    assert_eq!(
        msgs,
        vec![
            (Role::User, "hello"),
            (Role::System, "a warm reply"),
        ]
    );

    let mut seen = Vec::new();
    while let Ok(event) = ui_rx.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&UiEvent::VoiceToggled(true)));
    assert!(seen.contains(&UiEvent::VoiceToggled(false)));
    let states: Vec<_> = seen
        .iter()
        .filter_map(|e| match e {
            UiEvent::StateChanged(s) => Some(*s),
            _ => None,
        })
        .collect();
    // Dismiss is what brings the machine back to Idle.
    assert_eq!(
        states,
        vec![
            VoiceState::Listening,
            VoiceState::AwaitingReply,
            VoiceState::Speaking,
            VoiceState::Idle,
        ]
    );
}
