use anyhow::Result;
use clap::Parser;

use moodbot::cli::{self, Cli, Commands};
use moodbot::paths::Paths;

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // Logs go to stderr so they never interleave with streamed replies
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let paths = Paths::resolve(cli.agents_dir.as_deref())?;

    match cli.command {
        Commands::Chat(args) => cli::chat::run(args, &paths).await,
        Commands::Ask(args) => cli::ask::run(args, &paths).await,
        Commands::List => cli::list::run(&paths),
        Commands::History(args) => cli::history::run(args, &paths),
    }
}
