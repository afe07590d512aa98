//! Agents root directory resolution.
//!
//! The root that holds one folder per agent is resolved exactly once at
//! startup and then passed explicitly to [`crate::agent::Agent::new`] and
//! [`crate::agent::list_agents`]. Resolution order:
//! 1. `--agents-dir` flag (tilde-expanded, relative paths resolved against
//!    the current directory)
//! 2. `MOODBOT_AGENTS_DIR` env var
//! 3. `MOODBOT_DATA_DIR` env var joined with `agents`
//! 4. XDG data dir via `etcetera` (`~/.local/share/moodbot/agents`)
//!
//! Relative paths from env vars are ignored as XDG requires.

use anyhow::{Context, Result};
use std::path::PathBuf;

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const HISTORY_FILE_NAME: &str = "history.json";

/// Resolved directory paths for the application.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Data directory root
    pub data_dir: PathBuf,

    /// Agents root: one sub-directory per agent
    pub agents_dir: PathBuf,
}

impl Paths {
    /// Resolve all paths using real environment variables.
    pub fn resolve(agents_dir_flag: Option<&str>) -> Result<Self> {
        Self::resolve_with_env(agents_dir_flag, |key| std::env::var(key))
    }

    /// Resolve paths with a custom env var lookup (for testing).
    pub fn resolve_with_env<F>(agents_dir_flag: Option<&str>, env_fn: F) -> Result<Self>
    where
        F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
    {
        use etcetera::BaseStrategy;

        let strategy = etcetera::choose_base_strategy()
            .map_err(|e| anyhow::anyhow!("Failed to determine base directories: {}", e))?;

        let data_dir = env_or(&env_fn, "MOODBOT_DATA_DIR", || {
            strategy.data_dir().join("moodbot")
        });

        let agents_dir = match agents_dir_flag.map(str::trim).filter(|s| !s.is_empty()) {
            Some(flag) => absolutize(flag)?,
            None => env_or(&env_fn, "MOODBOT_AGENTS_DIR", || data_dir.join("agents")),
        };

        Ok(Self {
            data_dir,
            agents_dir,
        })
    }

    /// Folder of a single agent: agents_dir/{name}
    pub fn agent_dir(&self, name: &str) -> PathBuf {
        self.agents_dir.join(name)
    }

    /// Agent config: agents_dir/{name}/config.json
    pub fn config_file(&self, name: &str) -> PathBuf {
        self.agent_dir(name).join(CONFIG_FILE_NAME)
    }
}

/// Resolve an env var with fallback. Ignores empty and relative paths as XDG requires.
fn env_or<F>(env_fn: &F, var: &str, default: impl FnOnce() -> PathBuf) -> PathBuf
where
    F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
{
    env_fn(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(|v| PathBuf::from(shellexpand::tilde(&v).to_string()))
        .filter(|p| p.is_absolute())
        .unwrap_or_else(default)
}

fn absolutize(raw: &str) -> Result<PathBuf> {
    let path = PathBuf::from(shellexpand::tilde(raw).to_string());
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(cwd.join(path))
}
