//! Slash commands available in the interactive chat.

/// A slash command definition.
pub struct SlashCommand {
    pub name: &'static str,
    pub description: &'static str,
    pub aliases: &'static [&'static str],
    pub usage: &'static str,
}

impl SlashCommand {
    pub fn matches(&self, word: &str) -> bool {
        self.name == word || self.aliases.contains(&word)
    }

    /// Format as a help line, e.g. "  /help, /?           - Show this help"
    fn help_line(&self) -> String {
        let mut names = format!("/{}", self.name);
        for alias in self.aliases {
            names.push_str(&format!(", /{}", alias));
        }
        if !self.usage.is_empty() {
            names.push_str(&format!(" {}", self.usage));
        }
        format!("  {:<24}- {}", names, self.description)
    }
}

pub const COMMANDS: &[SlashCommand] = &[
    SlashCommand {
        name: "help",
        description: "Show available commands",
        aliases: &["?"],
        usage: "",
    },
    SlashCommand {
        name: "exit",
        description: "Save and exit chat",
        aliases: &["bye", "quit"],
        usage: "",
    },
    SlashCommand {
        name: "list",
        description: "List available agents",
        aliases: &[],
        usage: "",
    },
    SlashCommand {
        name: "load",
        description: "Switch to another agent",
        aliases: &[],
        usage: "<agent>",
    },
    SlashCommand {
        name: "history",
        description: "Show the conversation so far",
        aliases: &[],
        usage: "",
    },
    SlashCommand {
        name: "regen",
        description: "Regenerate the last reply",
        aliases: &["regenerate"],
        usage: "",
    },
    SlashCommand {
        name: "emotion",
        description: "Show the current emotion value",
        aliases: &[],
        usage: "",
    },
    SlashCommand {
        name: "save",
        description: "Save the conversation now",
        aliases: &[],
        usage: "",
    },
];

/// Find the command for a `/word` token (leading slash required).
pub fn lookup(token: &str) -> Option<&'static SlashCommand> {
    let word = token.strip_prefix('/')?;
    COMMANDS.iter().find(|cmd| cmd.matches(word))
}

pub fn format_help_text() -> String {
    let mut lines = vec!["Commands:".to_string()];
    for cmd in COMMANDS {
        lines.push(cmd.help_line());
    }
    lines.push(String::new());
    lines.push("Wrap multi-line input in ''' or \"\"\" lines.".to_string());
    lines.join("\n")
}
