//! Responder client: an ordered chain of strategies that turns a user
//! utterance into a reply string.
//!
//! The chain tries the widget's backend proxy first, then (when a key is
//! configured) a direct OpenAI-compatible API, and finally the canned
//! generator, which never fails. A default-configured chain therefore
//! always produces a reply.

use async_trait::async_trait;
use rand::Rng;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::{DirectApiConfig, VoiceConfig};
use crate::error::ResponderError;

/// One way of answering an utterance. Strategies are tried in order.
#[async_trait]
pub trait ResponderStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Answer a non-empty utterance.
    async fn ask(&self, utterance: &str) -> Result<String, ResponderError>;
}

/// Primary strategy: the widget's own backend proxy.
/// POST `{"message": ...}`; success is 2xx with `{"content": ...}`.
pub struct BackendResponder {
    url: String,
    client: reqwest::Client,
}

impl BackendResponder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ResponderStrategy for BackendResponder {
    fn name(&self) -> &'static str {
        "backend"
    }

    async fn ask(&self, utterance: &str) -> Result<String, ResponderError> {
        let res = self
            .client
            .post(self.url.as_str())
            .json(&json!({ "message": utterance }))
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(ResponderError::Status(res.status()));
        }
        let body: serde_json::Value = res.json().await?;
        body.get("content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or(ResponderError::MalformedBody)
    }
}

/// Second strategy: an OpenAI-compatible chat completions API, used only
/// when the host configured an API key.
pub struct DirectApiResponder {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl DirectApiResponder {
    pub fn new(config: DirectApiConfig) -> Self {
        Self {
            base_url: config.base_url,
            api_key: config.api_key,
            model: config.model,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ResponderStrategy for DirectApiResponder {
    fn name(&self) -> &'static str {
        "direct-api"
    }

    async fn ask(&self, utterance: &str) -> Result<String, ResponderError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": utterance }],
        });
        let res = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(ResponderError::Status(res.status()));
        }
        let body: serde_json::Value = res.json().await?;
        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ResponderError::MalformedBody)
    }
}

/// Fixed reply for utterances touching on fear or worry.
pub const FEAR_REPLY: &str = "There is no need to carry that fear alone. Take one slow \
breath; whatever you are facing, you do not have to face it all at once, and you are not \
facing it by yourself.";

/// Fixed reply for utterances touching on regret or forgiveness.
pub const FORGIVENESS_REPLY: &str = "Being sorry is already the beginning of repair. \
Forgive yourself the way you would forgive a good friend, and let the weight go a little \
at a time.";

/// Fixed reply for utterances touching on love and relationships.
pub const LOVE_REPLY: &str = "Love asks for patience more than perfection. Listen first, \
speak gently, and let the people who matter to you know that they matter.";

/// Fixed reply for utterances touching on purpose or meaning.
pub const PURPOSE_REPLY: &str = "Meaning is rarely found all at once; it grows out of \
small things done with care. Start with the nearest good you can do today and the rest \
will come into focus.";

/// Pool drawn from uniformly when no keyword matches.
pub const FALLBACK_POOL: &[&str] = &[
    "I hear you. Say a little more about what is on your mind, and we will untangle it \
together.",
    "That is worth sitting with for a moment. What feels most pressing about it right now?",
    "Thank you for trusting me with that. Small steps taken honestly go further than grand \
plans abandoned.",
    "Whatever today held, it does not decide tomorrow. Rest where you can, and begin again \
when you are ready.",
    "You are asking good questions. Keep asking them; the answers tend to arrive while we \
keep walking.",
    "Be as kind to yourself as you would be to someone you love. That kindness is never \
wasted.",
    "Nothing you said surprises or diminishes you. Take your time; I am not going anywhere.",
    "Sometimes the bravest thing is simply to say it out loud, and you just did. What would \
help most right now?",
];

/// Keyword groups checked in priority order; the first group with any
/// case-insensitive substring hit wins.
const KEYWORD_RESPONSES: &[(&[&str], &str)] = &[
    (&["fear", "afraid", "scared"], FEAR_REPLY),
    (&["forgive", "sorry", "guilt"], FORGIVENESS_REPLY),
    (&["love", "relationship"], LOVE_REPLY),
    (&["purpose", "meaning", "why"], PURPOSE_REPLY),
];

/// Terminal strategy: keyword-matched fixed replies with a random pool
/// fallback. Never fails.
#[derive(Debug, Default)]
pub struct CannedResponder;

impl CannedResponder {
    pub fn new() -> Self {
        Self
    }

    /// Pick the reply for an utterance. Infallible.
    pub fn reply(&self, utterance: &str) -> String {
        let lower = utterance.to_lowercase();
        for (keywords, reply) in KEYWORD_RESPONSES {
            if keywords.iter().any(|k| lower.contains(k)) {
                return (*reply).to_string();
            }
        }
        let mut rng = rand::thread_rng();
        FALLBACK_POOL[rng.gen_range(0..FALLBACK_POOL.len())].to_string()
    }
}

#[async_trait]
impl ResponderStrategy for CannedResponder {
    fn name(&self) -> &'static str {
        "canned"
    }

    async fn ask(&self, utterance: &str) -> Result<String, ResponderError> {
        Ok(self.reply(utterance))
    }
}

/// Ordered strategy chain. The first success wins; when every strategy
/// fails the last error is returned.
pub struct ResponderChain {
    strategies: Vec<Box<dyn ResponderStrategy>>,
}

impl ResponderChain {
    pub fn new(strategies: Vec<Box<dyn ResponderStrategy>>) -> Self {
        Self { strategies }
    }

    /// Standard chain: backend proxy, direct API when a key is configured,
    /// canned terminal fallback.
    pub fn from_config(config: &VoiceConfig) -> Self {
        let mut strategies: Vec<Box<dyn ResponderStrategy>> =
            vec![Box::new(BackendResponder::new(&config.responder_url))];
        if let Some(direct) = config.direct_api.clone() {
            strategies.push(Box::new(DirectApiResponder::new(direct)));
        }
        strategies.push(Box::new(CannedResponder::new()));
        Self::new(strategies)
    }

    pub async fn ask(&self, utterance: &str) -> Result<String, ResponderError> {
        let mut last_err = ResponderError::Exhausted;
        for strategy in &self.strategies {
            match strategy.ask(utterance).await {
                Ok(reply) => {
                    debug!("responder `{}` replied", strategy.name());
                    return Ok(reply);
                }
                Err(e) => {
                    warn!("responder `{}` failed, trying next: {}", strategy.name(), e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}
