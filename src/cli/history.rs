use anyhow::Result;
use clap::{Args, ValueEnum};

use super::render::format_history;
use crate::agent::Agent;
use crate::paths::Paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HistoryFormat {
    Text,
    Json,
}

#[derive(Args)]
pub struct HistoryArgs {
    /// Agent name
    pub agent: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = HistoryFormat::Text)]
    pub format: HistoryFormat,
}

pub fn run(args: HistoryArgs, paths: &Paths) -> Result<()> {
    let agent = Agent::new(&paths.agents_dir, &args.agent)?;

    match args.format {
        HistoryFormat::Json => println!("{}", serde_json::to_string_pretty(agent.history())?),
        HistoryFormat::Text => println!("{}", format_history(agent.history(), agent.name())),
    }

    Ok(())
}
