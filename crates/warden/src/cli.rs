use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Warden - run and inspect agent lifecycle hooks", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file (defaults to ./warden.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new config file
    Init {
        /// Path for new config file
        #[arg(default_value = "warden.toml")]
        path: PathBuf,
    },
    /// List configured hooks by event
    List,
    /// Report hook definitions that would be discarded
    Validate,
    /// Fire one event and print the merged result as JSON
    Fire {
        /// Event name, e.g. BeforeTool
        #[arg(long)]
        event: String,
        /// JSON file with the event fields
        #[arg(long)]
        payload: Option<PathBuf>,
        /// Tool name for tool events (overrides the payload)
        #[arg(long)]
        tool: Option<String>,
    },
}
