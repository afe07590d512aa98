use anyhow::Result;
use clap::Args;

use super::render::print_reply;
use crate::agent::Agent;
use crate::paths::Paths;

#[derive(Args)]
pub struct AskArgs {
    /// Agent name
    pub agent: String,

    /// The message to send
    pub message: String,
}

pub async fn run(args: AskArgs, paths: &Paths) -> Result<()> {
    let mut agent = Agent::new(&paths.agents_dir, &args.agent)?;
    let turns_before = agent.history().len();

    if let Some(e) = print_reply(agent.chat(args.message.trim())).await? {
        return Err(e.into());
    }

    if agent.history().len() == turns_before {
        eprintln!("(empty reply, nothing saved)");
    }

    Ok(())
}
