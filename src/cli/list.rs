use anyhow::{Context, Result};

use crate::agent::list_agents;
use crate::paths::Paths;

pub fn run(paths: &Paths) -> Result<()> {
    let agents = list_agents(&paths.agents_dir)
        .with_context(|| format!("Failed to list agents in {}", paths.agents_dir.display()))?;

    if agents.is_empty() {
        println!("No agents found in {}", paths.agents_dir.display());
        println!(
            "Create {} to add one.",
            paths.config_file("<name>").display()
        );
        return Ok(());
    }

    for name in agents {
        println!("{}", name);
    }
    Ok(())
}
