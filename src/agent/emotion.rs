//! Emotion estimation
//!
//! After each committed exchange the backend is asked, few-shot style, for an
//! updated emotion score in `[-100, 100]`. The estimator never fails: backend
//! errors and unparseable answers fall back to the previous score.

use std::sync::Arc;
use tracing::{debug, warn};

use super::providers::{CompletionRequest, LLMProvider, Message};
use super::think::remove_think_tags;
use super::transcript::Turn;
use crate::config::ModelParams;
use crate::error::{AgentError, Result};

/// Emotion of an agent with no history
pub const DEFAULT_EMOTION: i32 = 50;
pub const EMOTION_MIN: i32 = -100;
pub const EMOTION_MAX: i32 = 100;

/// Prior turns shown to the scorer
pub const EMOTION_HISTORY_LIMIT: usize = 10;

const EMOTION_TEMPERATURE: f32 = 0.0;
const EMOTION_MAX_TOKENS: u32 = 512;

const EMOTION_INSTRUCTION: &str = "You track the emotional state of the assistant in a conversation. \
Each user message shows one exchange between the user and the assistant. \
Answer with the assistant's emotion after that exchange as a single integer \
from -100 (very negative) to 100 (very positive). \
Answer with the integer only, no other text.";

/// Render one exchange as the scorer sees it.
fn render_exchange(user_message: &str, assistant_message: &str) -> String {
    format!("User: {}\nAssistant: {}", user_message, assistant_message)
}

pub fn clamp_emotion(value: i64) -> i32 {
    value.clamp(EMOTION_MIN as i64, EMOTION_MAX as i64) as i32
}

/// Score used when the backend gives no usable answer: the most recent
/// prior turn's emotion, or the default for an empty history.
pub fn fallback_emotion(history: &[Turn]) -> i32 {
    history.last().map(|t| t.emotion).unwrap_or(DEFAULT_EMOTION)
}

/// Parse the scorer's reply after stripping think segments.
pub fn parse_emotion(reply: &str) -> Result<i64> {
    let text = remove_think_tags(reply);
    text.parse::<i64>().map_err(|_| AgentError::EmotionParse(text))
}

pub struct EmotionEstimator {
    provider: Arc<dyn LLMProvider>,
    model: String,
}

impl EmotionEstimator {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn build_request(
        &self,
        history: &[Turn],
        user_message: &str,
        assistant_message: &str,
    ) -> CompletionRequest {
        let recent = &history[history.len().saturating_sub(EMOTION_HISTORY_LIMIT)..];

        let mut messages = Vec::with_capacity(recent.len() * 2 + 2);
        messages.push(Message::system(EMOTION_INSTRUCTION));
        for turn in recent {
            messages.push(Message::user(render_exchange(
                &turn.user_message,
                &turn.assistant_message,
            )));
            messages.push(Message::assistant(turn.emotion.to_string()));
        }
        messages.push(Message::user(render_exchange(user_message, assistant_message)));

        CompletionRequest {
            model: self.model.clone(),
            messages,
            params: ModelParams {
                temperature: EMOTION_TEMPERATURE,
                max_tokens: EMOTION_MAX_TOKENS,
                ..ModelParams::default()
            },
        }
    }

    /// Estimate the emotion after a new exchange, given the history before it.
    pub async fn estimate(&self, history: &[Turn], user_message: &str, assistant_message: &str) -> i32 {
        if history.is_empty() {
            return DEFAULT_EMOTION;
        }

        let request = self.build_request(history, user_message, assistant_message);
        let fallback = fallback_emotion(history);

        let reply = match self.provider.complete(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Emotion estimation failed, keeping {}: {}", fallback, e);
                return clamp_emotion(fallback as i64);
            }
        };

        match parse_emotion(&reply) {
            Ok(value) => {
                debug!("Estimated emotion {} (raw {:?})", value, reply);
                clamp_emotion(value)
            }
            Err(e) => {
                warn!("{}, keeping {}", e, fallback);
                clamp_emotion(fallback as i64)
            }
        }
    }
}
