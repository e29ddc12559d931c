mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

/// Exit code of `warden fire` when the merged decision blocks
const BLOCKED_EXIT_CODE: i32 = 2;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    operon_hooks::init_logging();

    // Parse CLI args
    let cli = Cli::parse();

    // Handle init command early (doesn't need config)
    if let Commands::Init { path } = &cli.command {
        return commands::init::run_init(path);
    }

    // Load config
    let config = config::load_config(cli.config.as_deref())?;

    // Dispatch to command
    match cli.command {
        Commands::Init { .. } => {
            // Already handled above
            unreachable!()
        }
        Commands::List => {
            commands::list::execute(&config).await?;
        }
        Commands::Validate => {
            commands::validate::execute(&config).await?;
        }
        Commands::Fire {
            event,
            payload,
            tool,
        } => {
            let blocking =
                commands::fire::execute(&config, &event, payload.as_deref(), tool).await?;
            if blocking {
                std::process::exit(BLOCKED_EXIT_CODE);
            }
        }
    }

    Ok(())
}
