//! moodbot - conversational agents with persistent transcripts and an
//! emotion feedback loop
//!
//! - Per-agent config and persona loading
//! - Versioned transcript store (v0 message lists upgrade to v1 turns)
//! - Context windowing by turn count or token budget
//! - Streaming chat over OpenAI-compatible and Ollama backends
//! - Emotion scoring fed back into the next system prompt

pub mod agent;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod paths;

pub use agent::{Agent, list_agents};
pub use config::AgentConfig;
pub use error::{AgentError, Result};
