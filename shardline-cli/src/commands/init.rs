//! Init command - write the configuration file.

use shardline::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Run the init command.
///
/// An existing file is loaded and rewritten, which fills in any missing keys
/// with their defaults.
pub fn run() -> Result<(), CliError> {
    let config = ConfigFile::load().unwrap_or_default();
    config.save()?;

    let path = config_file_path();
    println!("Configuration file: {}", path.display());
    println!("Models directory:   {}", config.downloads.directory.display());
    println!();
    println!("Edit this file to customize shardline settings.");
    println!("Command-line arguments override config file values when specified.");
    Ok(())
}
