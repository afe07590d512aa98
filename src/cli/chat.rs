use anyhow::Result;
use clap::Args;
use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use super::render::{format_history, print_reply};
use crate::agent::{Agent, list_agents};
use crate::commands::{format_help_text, lookup};
use crate::paths::Paths;

const INPUT_PROMPT: &str = ">>> ";
const MULTILINE_PROMPT: &str = "... ";
const MULTILINE_TAGS: [&str; 2] = ["'''", "\"\"\""];

#[derive(Args)]
pub struct ChatArgs {
    /// Agent to load on start (use /load later otherwise)
    pub agent: Option<String>,
}

/// If `line` opens a multi-line block, the tag that closes it.
fn multiline_tag(line: &str) -> Option<&'static str> {
    MULTILINE_TAGS.into_iter().find(|tag| line.trim() == *tag)
}

/// Read one message. Returns `None` on Ctrl+D.
fn read_input(rl: &mut DefaultEditor) -> Result<Option<String>> {
    loop {
        let line = match rl.readline(INPUT_PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let Some(tag) = multiline_tag(&line) else {
            return Ok(Some(line));
        };

        let mut lines = Vec::new();
        loop {
            match rl.readline(MULTILINE_PROMPT) {
                Ok(line) if line.trim() == tag => break,
                Ok(line) => lines.push(line),
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    lines.clear();
                    break;
                }
                Err(ReadlineError::Eof) => return Ok(None),
                Err(err) => return Err(err.into()),
            }
        }
        return Ok(Some(lines.join("\n")));
    }
}

enum CommandResult {
    Continue,
    Quit,
}

struct ChatSession<'a> {
    paths: &'a Paths,
    agent: Option<Agent>,
}

impl ChatSession<'_> {
    fn agent_not_loaded() {
        println!(
            "{}",
            "Please load an agent with /load <agent-name> first.".red()
        );
    }

    fn load(&mut self, name: &str) {
        match Agent::new(&self.paths.agents_dir, name) {
            Ok(agent) => {
                // Keep the previous agent's transcript on disk before switching
                if let Some(previous) = self.agent.take()
                    && let Err(e) = previous.save()
                {
                    eprintln!("Warning: failed to save '{}': {}", previous.name(), e);
                }
                println!("{}", format_history(agent.history(), agent.name()));
                println!("{}", "(History restored)".dimmed());
                self.agent = Some(agent);
            }
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    fn list(&self) {
        let current = self.agent.as_ref().map(|a| a.name());
        match list_agents(&self.paths.agents_dir) {
            Ok(agents) => {
                println!("{}", "Available agents:".bold());
                for name in agents {
                    if Some(name.as_str()) == current {
                        println!("- {} (current)", name.green().bold());
                    } else {
                        println!("- {}", name);
                    }
                }
            }
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    async fn send(&mut self, message: &str) -> Result<()> {
        let Some(agent) = self.agent.as_mut() else {
            Self::agent_not_loaded();
            return Ok(());
        };
        if let Some(e) = print_reply(agent.chat(message)).await? {
            eprintln!("Error: {}", e);
        }
        Ok(())
    }

    async fn regenerate(&mut self) -> Result<()> {
        let Some(agent) = self.agent.as_mut() else {
            Self::agent_not_loaded();
            return Ok(());
        };
        if agent.history().is_empty() {
            println!("{}", "Nothing to regenerate.".dimmed());
            return Ok(());
        }
        if let Some(e) = print_reply(agent.regenerate()).await? {
            eprintln!("Error: {}", e);
        }
        Ok(())
    }

    async fn handle_command(&mut self, input: &str) -> Result<CommandResult> {
        let mut parts = input.split_whitespace();
        let token = parts.next().unwrap_or_default().to_lowercase();

        let Some(cmd) = lookup(&token) else {
            println!(
                "{}",
                "Unknown command. Type /help for a list of commands.".red()
            );
            return Ok(CommandResult::Continue);
        };

        match cmd.name {
            "exit" => return Ok(CommandResult::Quit),
            "help" => println!("\n{}\n", format_help_text()),
            "list" => self.list(),
            "load" => match parts.next() {
                Some(name) => self.load(name),
                None => println!("Usage: /load <agent>"),
            },
            "history" => match &self.agent {
                Some(agent) => println!("{}", format_history(agent.history(), agent.name())),
                None => Self::agent_not_loaded(),
            },
            "regen" => self.regenerate().await?,
            "emotion" => match &self.agent {
                Some(agent) => println!("Current emotion: {}", agent.emotion()),
                None => Self::agent_not_loaded(),
            },
            "save" => match &self.agent {
                Some(agent) => match agent.save() {
                    Ok(()) => println!(
                        "Saved {} turns to {}",
                        agent.history().len(),
                        agent.history_path().display()
                    ),
                    Err(e) => eprintln!("Error: {}", e),
                },
                None => Self::agent_not_loaded(),
            },
            other => println!("Command /{} is not available here.", other),
        }

        Ok(CommandResult::Continue)
    }
}

pub async fn run(args: ChatArgs, paths: &Paths) -> Result<()> {
    println!(
        "moodbot v{} | Agents: {}",
        env!("CARGO_PKG_VERSION"),
        paths.agents_dir.display()
    );
    println!("Type /help for commands, /exit to quit\n");

    let mut session = ChatSession { paths, agent: None };
    if let Some(name) = args.agent {
        session.load(&name);
    }

    let mut rl = DefaultEditor::new()?;

    while let Some(input) = read_input(&mut rl)? {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(trimmed);

        if trimmed.starts_with('/') {
            match session.handle_command(trimmed).await? {
                CommandResult::Continue => continue,
                CommandResult::Quit => break,
            }
        }

        session.send(trimmed).await?;
    }

    if let Some(agent) = &session.agent {
        agent.save()?;
    }
    println!("Goodbye!");
    Ok(())
}
