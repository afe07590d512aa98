//! Transcript store - manages an agent's history.json
//!
//! Two on-disk formats exist:
//! - v0: a flat array of `{"role": "user"|"assistant", "content": ...}`
//! - v1: `{"version": "v1", "history": [{user_message, assistant_message, emotion}]}`
//!
//! Formats are tried newest first. A v0 file is upgraded on load and the v1
//! form is written back immediately, so the upgrade happens once.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::emotion::{DEFAULT_EMOTION, clamp_emotion};
use crate::error::{AgentError, Result};

/// One user/assistant exchange plus the emotion derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub user_message: String,
    pub assistant_message: String,
    /// Out-of-range values in hand-edited files are clamped on load
    #[serde(deserialize_with = "deserialize_emotion")]
    pub emotion: i32,
}

fn deserialize_emotion<'de, D>(deserializer: D) -> std::result::Result<i32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    i64::deserialize(deserializer).map(clamp_emotion)
}

impl Turn {
    pub fn new(user_message: impl Into<String>, assistant_message: impl Into<String>, emotion: i32) -> Self {
        Self {
            user_message: user_message.into(),
            assistant_message: assistant_message.into(),
            emotion,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranscriptVersion {
    #[default]
    #[serde(rename = "v1")]
    V1,
}

/// Chronological list of turns, in the current (v1) format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    version: TranscriptVersion,
    history: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(history: Vec<Turn>) -> Self {
        Self {
            version: TranscriptVersion::V1,
            history,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.history.last()
    }

    /// Emotion of the most recent turn, or the default for a fresh agent.
    pub fn last_emotion(&self) -> i32 {
        self.last().map(|t| t.emotion).unwrap_or(DEFAULT_EMOTION)
    }

    pub fn append(&mut self, turn: Turn) {
        self.history.push(turn);
    }

    /// Remove the final turn. Callers check for emptiness first.
    pub fn drop_last(&mut self) -> Option<Turn> {
        self.history.pop()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LegacyRole {
    User,
    Assistant,
}

/// A v0 history record
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct LegacyMessage {
    #[allow(dead_code)] // validated, pairing is positional
    role: LegacyRole,
    content: String,
}

/// Upgrade a v0 message list: consecutive records are paired as
/// (user, assistant); a trailing unpaired record is dropped.
fn upgrade_v0(messages: Vec<LegacyMessage>) -> Transcript {
    let mut iter = messages.into_iter();
    let mut history = Vec::new();

    while let (Some(user), Some(assistant)) = (iter.next(), iter.next()) {
        history.push(Turn::new(user.content, assistant.content, DEFAULT_EMOTION));
    }

    Transcript::from_turns(history)
}

/// Result of decoding a history file.
#[derive(Debug)]
pub struct Decoded {
    pub transcript: Transcript,
    /// True when the file was in the legacy v0 format
    pub migrated: bool,
}

/// Decode history JSON, trying v1 then v0.
pub fn decode(content: &str) -> std::result::Result<Decoded, String> {
    let value: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;

    let v1_err = match serde_json::from_value::<Transcript>(value.clone()) {
        Ok(transcript) => {
            return Ok(Decoded {
                transcript,
                migrated: false,
            });
        }
        Err(e) => e,
    };

    match serde_json::from_value::<Vec<LegacyMessage>>(value) {
        Ok(messages) => Ok(Decoded {
            transcript: upgrade_v0(messages),
            migrated: true,
        }),
        Err(v0_err) => Err(format!(
            "not a v1 transcript ({}) nor a v0 message list ({})",
            v1_err, v0_err
        )),
    }
}

/// File-backed transcript persistence for one agent.
pub struct TranscriptStore {
    path: PathBuf,
}

impl TranscriptStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the transcript, upgrading and rewriting legacy files.
    pub fn load(&self) -> Result<Transcript> {
        let content = fs::read_to_string(&self.path)?;
        let decoded = decode(&content).map_err(|message| AgentError::TranscriptFormat {
            path: self.path.clone(),
            message,
        })?;

        if decoded.migrated {
            info!(
                "Upgraded v0 transcript {:?} to v1 ({} turns)",
                self.path,
                decoded.transcript.len()
            );
            if let Err(e) = self.save(&decoded.transcript) {
                warn!("Failed to persist upgraded transcript {:?}: {}", self.path, e);
            }
        }

        debug!(
            "Loaded transcript from {:?} ({} turns)",
            self.path,
            decoded.transcript.len()
        );
        Ok(decoded.transcript)
    }

    /// Save the full transcript using atomic write (temp file + rename).
    pub fn save(&self, transcript: &Transcript) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(transcript)?;

        let tmp_path = self.path.with_extension(format!(
            "{}.{}.tmp",
            std::process::id(),
            uuid::Uuid::new_v4().as_simple()
        ));

        fs::write(&tmp_path, &content)?;
        fs::rename(&tmp_path, &self.path)?;

        debug!("Saved transcript to {:?} ({} turns)", self.path, transcript.len());
        Ok(())
    }
}
