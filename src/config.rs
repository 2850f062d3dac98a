//! Configuration for the voice widget.
//!
//! All timing constants are named here rather than buried in the state
//! machine; hosts can shorten them to zero in tests.

use std::env;
use std::time::Duration;

/// Credentials for the direct-API responder strategy, used between the
/// backend proxy and the canned terminal fallback when a key is configured.
#[derive(Debug, Clone)]
pub struct DirectApiConfig {
    /// Base URL without trailing slash (e.g. https://openrouter.ai/api/v1).
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// Chat model identifier.
    pub model: String,
}

/// Widget configuration: endpoints, locale, and delay constants.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Responder endpoint: POST `{"message": ...}` -> `{"content": ...}`.
    pub responder_url: String,

    /// Optional direct-API fallback between the backend and canned replies.
    pub direct_api: Option<DirectApiConfig>,

    /// Synthesis endpoint: POST `{"text": ...}` -> audio bytes.
    pub synthesis_url: String,

    /// Recognition locale tag (e.g. "en-US").
    pub locale: String,

    /// 2xx synthesis bodies below this size are treated as empty audio.
    pub min_audio_bytes: usize,

    /// Pause before capture resumes after a responder failure, so a flapping
    /// endpoint does not produce a tight error loop.
    pub reply_failure_delay: Duration,

    /// Pause before capture resumes after playback completes, so the mic
    /// does not pick up the tail of the widget's own audio.
    pub settle_delay: Duration,

    /// Pause before the recognizer auto-restarts after the engine ends.
    pub restart_delay: Duration,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            responder_url: "http://127.0.0.1:3000/api/chat".to_string(),
            direct_api: None,
            synthesis_url: "http://127.0.0.1:3000/api/tts".to_string(),
            locale: "en-US".to_string(),
            min_audio_bytes: 100,
            reply_failure_delay: Duration::from_millis(1000),
            settle_delay: Duration::from_millis(300),
            restart_delay: Duration::from_millis(100),
        }
    }
}

impl VoiceConfig {
    /// Build from environment, falling back to defaults: `RESPONDER_API_URL`,
    /// `DIRECT_API_URL` / `DIRECT_API_KEY` / `DIRECT_API_MODEL`, `TTS_API_URL`,
    /// `VOICE_LOCALE`, `MIN_AUDIO_BYTES`, `REPLY_FAILURE_DELAY_MS`,
    /// `SETTLE_DELAY_MS`, `RESTART_DELAY_MS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let direct_api = env::var("DIRECT_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(|api_key| DirectApiConfig {
                base_url: env::var("DIRECT_API_URL")
                    .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string()),
                api_key,
                model: env::var("DIRECT_API_MODEL")
                    .unwrap_or_else(|_| "openai/gpt-4o-mini".to_string()),
            });

        Self {
            responder_url: env::var("RESPONDER_API_URL").unwrap_or(defaults.responder_url),
            direct_api,
            synthesis_url: env::var("TTS_API_URL").unwrap_or(defaults.synthesis_url),
            locale: env::var("VOICE_LOCALE").unwrap_or(defaults.locale),
            min_audio_bytes: env_usize("MIN_AUDIO_BYTES", defaults.min_audio_bytes),
            reply_failure_delay: env_ms("REPLY_FAILURE_DELAY_MS", defaults.reply_failure_delay),
            settle_delay: env_ms("SETTLE_DELAY_MS", defaults.settle_delay),
            restart_delay: env_ms("RESTART_DELAY_MS", defaults.restart_delay),
        }
    }

    /// Zero out every delay. Intended for tests that drive the state machine
    /// synchronously.
    pub fn without_delays(mut self) -> Self {
        self.reply_failure_delay = Duration::ZERO;
        self.settle_delay = Duration::ZERO;
        self.restart_delay = Duration::ZERO;
        self
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_ms(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
