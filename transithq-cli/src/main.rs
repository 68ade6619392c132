//! TransitHQ CLI - Command-line interface
//!
//! Follows a live vehicle-positions feed through a headless map view,
//! fetches single snapshots as GeoJSON, and edits the config file.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};
use console::style;

use commands::config::ConfigCommands;
use commands::fetch::FetchArgs;
use commands::watch::WatchArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "transithq", version, about = "Live transit vehicle positions on a map view")]
struct Cli {
    /// Mirror log output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Mount a view and print its status as the feed updates
    Watch(WatchArgs),

    /// Retrieve one snapshot and print it as GeoJSON
    Fetch(FetchArgs),

    /// View or change configuration settings
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Watch(args) => commands::watch::run(args, cli.verbose),
        Commands::Fetch(args) => commands::fetch::run(args, cli.verbose),
        Commands::Config { action } => commands::config::run(action),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}
