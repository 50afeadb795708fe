//! Shardline CLI - grouped, resumable downloads of sharded model files.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::control::Control;
use commands::fetch::FetchArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "shardline", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create or complete the configuration file
    Init,

    /// Download a group of files and follow its progress
    Fetch(FetchArgs),

    /// Resume a paused group and follow its progress
    Resume {
        /// Group id
        id: String,
    },

    /// Restart a group from scratch and follow its progress
    Retry {
        /// Group id
        id: String,
    },

    /// Mark a group paused
    Pause {
        /// Group id
        id: String,
    },

    /// Cancel a group and delete its partial files
    Cancel {
        /// Group id
        id: String,
    },

    /// Show a group and its files
    Status {
        /// Group id
        id: String,
    },

    /// List all groups
    List,

    /// Forget a group and delete its partial files
    Remove {
        /// Group id
        id: String,
    },

    /// Configuration file commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let result: Result<(), CliError> = match cli.command {
        Commands::Init => commands::init::run(),
        Commands::Fetch(args) => commands::fetch::run(args),
        Commands::Resume { id } => commands::control::run(Control::Resume, &id),
        Commands::Retry { id } => commands::control::run(Control::Retry, &id),
        Commands::Pause { id } => commands::control::run(Control::Pause, &id),
        Commands::Cancel { id } => commands::control::run(Control::Cancel, &id),
        Commands::Remove { id } => commands::control::run(Control::Remove, &id),
        Commands::Status { id } => commands::status::run_status(&id),
        Commands::List => commands::status::run_list(),
        Commands::Config { command } => commands::config::run(command),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
