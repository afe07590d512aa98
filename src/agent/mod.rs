mod emotion;
mod providers;
mod sse;
mod system_prompt;
mod think;
mod transcript;
mod window;

#[cfg(test)]
mod test;

pub use emotion::{
    DEFAULT_EMOTION, EMOTION_HISTORY_LIMIT, EMOTION_MAX, EMOTION_MIN, EmotionEstimator,
    clamp_emotion, fallback_emotion, parse_emotion,
};
pub use providers::{
    CompletionRequest, LLMProvider, Message, OllamaProvider, OpenAIProvider, Role, StreamChunk,
    StreamResult, create_provider,
};
pub use system_prompt::{build_messages, render_system_prompt, turns_to_messages};
pub use think::{Span, THINK_CLOSE, THINK_OPEN, ThinkTracker, remove_think_tags};
pub use transcript::{Transcript, TranscriptStore, Turn};
pub use window::{estimate_tokens, window};

use futures::{Stream, StreamExt};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{AgentConfig, load_description};
use crate::error::{AgentError, Result};
use crate::paths::{CONFIG_FILE_NAME, HISTORY_FILE_NAME};

/// Names of all agent folders under `agents_root`, sorted.
///
/// A missing root means no agents yet; a root that is not a directory is an error.
pub fn list_agents(agents_root: &Path) -> Result<Vec<String>> {
    if !agents_root.exists() {
        return Ok(Vec::new());
    }
    if !agents_root.is_dir() {
        return Err(AgentError::Io(io::Error::new(
            io::ErrorKind::NotADirectory,
            format!("agents folder '{}' is not a directory", agents_root.display()),
        )));
    }

    let mut names: Vec<String> = fs::read_dir(agents_root)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();
    Ok(names)
}

fn is_valid_agent_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}

/// A named agent: config, personas, live transcript and backend.
///
/// Replies are streamed through [`Agent::chat`] and [`Agent::regenerate`]. The
/// returned stream holds `&mut self`, so one request is in flight at a time.
/// A turn is committed (and saved) only when the stream is drained and the
/// filtered reply is non-empty. Dropping the stream early changes nothing.
pub struct Agent {
    name: String,
    config: AgentConfig,
    agent_description: String,
    user_description: String,
    provider: Arc<dyn LLMProvider>,
    emotion: EmotionEstimator,
    store: TranscriptStore,
    transcript: Transcript,
}

impl Agent {
    /// Load the agent `name` from `agents_root/name/`.
    pub fn new(agents_root: &Path, name: &str) -> Result<Self> {
        Self::load_with(agents_root, name, create_provider)
    }

    /// Like [`Agent::new`], with a caller-chosen backend.
    pub fn load_with<F>(agents_root: &Path, name: &str, make_provider: F) -> Result<Self>
    where
        F: FnOnce(&AgentConfig) -> Arc<dyn LLMProvider>,
    {
        let dir = agents_root.join(name);
        let config_path = dir.join(CONFIG_FILE_NAME);

        if !is_valid_agent_name(name) || !config_path.is_file() {
            return Err(AgentError::AgentNotFound {
                name: name.to_string(),
                path: config_path,
            });
        }

        let config = AgentConfig::load(&config_path)?;
        let agent_description = load_description(config.agent_description.as_ref(), &dir)?;
        let user_description = load_description(config.user_description.as_ref(), &dir)?;

        let provider = make_provider(&config);
        let emotion = EmotionEstimator::new(provider.clone(), config.emotion_model());

        let store = TranscriptStore::new(dir.join(HISTORY_FILE_NAME));
        let transcript = if store.exists() {
            match store.load() {
                Ok(transcript) => transcript,
                Err(e) => {
                    warn!("{}", e);
                    warn!("Cannot load history for agent '{}'. History will be empty.", name);
                    Transcript::new()
                }
            }
        } else {
            let transcript = Transcript::new();
            store.save(&transcript)?;
            transcript
        };

        info!(
            "Loaded agent '{}' (model: {}, {} turns)",
            name,
            config.model,
            transcript.len()
        );

        Ok(Self {
            name: name.to_string(),
            config,
            agent_description,
            user_description,
            provider,
            emotion,
            store,
            transcript,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the transcript is saved
    pub fn history_path(&self) -> &Path {
        self.store.path()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn history(&self) -> &Transcript {
        &self.transcript
    }

    /// Emotion carried into the next request
    pub fn emotion(&self) -> i32 {
        self.transcript.last_emotion()
    }

    /// Write the full transcript. Safe to call at any time.
    pub fn save(&self) -> Result<()> {
        self.store.save(&self.transcript)
    }

    /// Send `input` and stream the raw reply fragments.
    ///
    /// Nothing is sent until the stream is first polled.
    pub fn chat(&mut self, input: &str) -> impl Stream<Item = Result<String>> + '_ {
        self.reply_stream(Some(input.to_string()), false)
    }

    /// Re-send the last user message and replace the last turn with the new
    /// reply. Yields nothing when there is no history.
    ///
    /// The old turn stays in place until the new reply is committed, so a
    /// failed or abandoned regeneration keeps the transcript as it was.
    pub fn regenerate(&mut self) -> impl Stream<Item = Result<String>> + '_ {
        let input = self.transcript.last().map(|t| t.user_message.clone());
        self.reply_stream(input, true)
    }

    fn reply_stream(
        &mut self,
        input: Option<String>,
        replace_last: bool,
    ) -> impl Stream<Item = Result<String>> + '_ {
        async_stream::stream! {
            let Some(input) = input else {
                return;
            };

            let prior_len = if replace_last {
                self.transcript.len().saturating_sub(1)
            } else {
                self.transcript.len()
            };

            let request = {
                let prior = &self.transcript.turns()[..prior_len];
                let system_prompt = render_system_prompt(
                    &self.agent_description,
                    &self.user_description,
                    fallback_emotion(prior),
                );
                let windowed = window(prior, self.config.history_limit);
                debug!(
                    "Sending {} of {} prior turns to {}",
                    windowed.len(),
                    prior.len(),
                    self.config.model
                );

                CompletionRequest {
                    model: self.config.model.clone(),
                    messages: build_messages(system_prompt, windowed, &input),
                    params: self.config.model_params.clone(),
                }
            };

            let mut chunks = match self.provider.complete_stream(&request).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut raw = String::new();
            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(chunk) => {
                        if !chunk.delta.is_empty() {
                            raw.push_str(&chunk.delta);
                            yield Ok(chunk.delta);
                        }
                        if chunk.done {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Reply stream failed; transcript unchanged");
                        yield Err(e);
                        return;
                    }
                }
            }

            let reply = remove_think_tags(&raw);
            if reply.is_empty() {
                info!("Empty reply from {}; nothing committed", self.config.model);
                return;
            }

            let emotion = {
                let prior = &self.transcript.turns()[..prior_len];
                self.emotion.estimate(prior, &input, &reply).await
            };

            if replace_last {
                self.transcript.drop_last();
            }
            self.transcript.append(Turn::new(input, reply, emotion));
            info!(
                "Committed turn {} for '{}' (emotion {})",
                self.transcript.len(),
                self.name,
                emotion
            );

            if let Err(e) = self.save() {
                yield Err(e);
            }
        }
    }
}
