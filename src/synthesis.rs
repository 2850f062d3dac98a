//! Synthesis clients: turn reply text into playable audio bytes.
//!
//! Two providers: `ProxySynthesizer` posts `{"text": ...}` to the widget's
//! backend proxy (the reference configuration), and `SpeechApiSynthesizer`
//! talks to an OpenAI-compatible `/audio/speech` endpoint directly (the
//! degraded/alternate configuration). Both reject implausibly small
//! payloads before they can reach the playback engine.

use async_trait::async_trait;
use serde_json::json;

use crate::error::{SynthesisError, VoiceError, VoiceResult};

/// A synthesized speech clip ready for the playback engine.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
}

impl AudioClip {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Backend that turns text into audio bytes.
#[async_trait]
pub trait SynthesisClient: Send + Sync {
    /// Synthesize a non-empty text into audio.
    async fn synthesize(&self, text: &str) -> Result<AudioClip, SynthesisError>;
}

/// A 2xx body below `min` bytes is an error payload in disguise, not audio.
fn validate_clip(bytes: Vec<u8>, min: usize) -> Result<AudioClip, SynthesisError> {
    if bytes.len() < min {
        return Err(SynthesisError::EmptyAudio {
            len: bytes.len(),
            min,
        });
    }
    Ok(AudioClip { bytes })
}

/// Reference provider: the widget's backend synthesis proxy.
pub struct ProxySynthesizer {
    url: String,
    min_bytes: usize,
    client: reqwest::Client,
}

impl ProxySynthesizer {
    pub fn new(url: impl Into<String>, min_bytes: usize) -> Self {
        Self {
            url: url.into(),
            min_bytes,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SynthesisClient for ProxySynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioClip, SynthesisError> {
        let res = self
            .client
            .post(self.url.as_str())
            .json(&json!({ "text": text }))
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(SynthesisError::BadResponse(res.status()));
        }
        let bytes = res.bytes().await?;
        validate_clip(bytes.to_vec(), self.min_bytes)
    }
}

/// Alternate provider: OpenAI-compatible speech API.
/// Uses `TTS_API_URL` (e.g. https://api.openai.com/v1), `TTS_API_KEY`,
/// `TTS_MODEL` (default tts-1), and `TTS_VOICE` (default alloy).
pub struct SpeechApiSynthesizer {
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
    min_bytes: usize,
    client: reqwest::Client,
}

impl SpeechApiSynthesizer {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
        min_bytes: usize,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            voice: voice.into(),
            min_bytes,
            client: reqwest::Client::new(),
        }
    }

    /// Build from environment. Fails when `TTS_API_KEY` is missing.
    pub fn from_env(min_bytes: usize) -> VoiceResult<Self> {
        let base_url = std::env::var("TTS_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("TTS_API_KEY")
            .map_err(|_| VoiceError::Config("speech API requires TTS_API_KEY".to_string()))?;
        let model = std::env::var("TTS_MODEL").unwrap_or_else(|_| "tts-1".to_string());
        let voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| "alloy".to_string());
        Ok(Self::new(base_url, api_key, model, voice, min_bytes))
    }
}

#[async_trait]
impl SynthesisClient for SpeechApiSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioClip, SynthesisError> {
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
        });
        let res = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(SynthesisError::BadResponse(res.status()));
        }
        let bytes = res.bytes().await?;
        validate_clip(bytes.to_vec(), self.min_bytes)
    }
}
