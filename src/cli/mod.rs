pub mod ask;
pub mod chat;
pub mod history;
pub mod list;
pub mod render;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "moodbot")]
#[command(author, version, about = "Chat with persistent, emotion-aware agents")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Folder holding one sub-folder per agent
    /// (falls back to MOODBOT_AGENTS_DIR, then the data dir)
    #[arg(long, global = true)]
    pub agents_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat session
    Chat(chat::ChatArgs),

    /// Send a single message and print the reply
    Ask(ask::AskArgs),

    /// List available agents
    List,

    /// Print an agent's conversation history
    History(history::HistoryArgs),
}
