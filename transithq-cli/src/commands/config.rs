//! Configuration management CLI commands.
//!
//! `config get`, `config set`, `config list` and `config path` read and edit
//! `~/.transithq/config.ini` without opening it by hand.

use std::path::Path;

use clap::Subcommand;
use transithq::config::{config_file_path, ConfigFile, ConfigKey};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// Configuration key in format section.key (e.g., feed.url)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key in format section.key (e.g., map.mode)
        key: String,

        /// Value to set
        value: String,
    },

    /// List all configuration settings
    List,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => run_get(&key),
        ConfigCommands::Set { key, value } => run_set(&key, &value),
        ConfigCommands::List => run_list(),
        ConfigCommands::Path => run_path(),
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'transithq config list' to see available keys.",
            key
        ))
    })
}

fn run_get(key: &str) -> Result<(), CliError> {
    let config_key = parse_key(key)?;
    let config = ConfigFile::load()?;
    let value = config_key.get(&config);

    if value.is_empty() {
        println!("(not set)");
    } else {
        println!("{}", value);
    }

    Ok(())
}

fn run_set(key: &str, value: &str) -> Result<(), CliError> {
    let config_key = set_value(&config_file_path(), key, value)?;
    println!("Set {} = {}", config_key.name(), value);
    Ok(())
}

/// Validate and write one setting to the file at `path`.
fn set_value(path: &Path, key: &str, value: &str) -> Result<ConfigKey, CliError> {
    let config_key = parse_key(key)?;

    // A missing or broken file is replaced rather than blocking the fix.
    let mut config = ConfigFile::load_from(path).unwrap_or_default();
    config_key.set(&mut config, value)?;
    config.save_to(path)?;

    Ok(config_key)
}

fn run_list() -> Result<(), CliError> {
    let config = ConfigFile::load()?;
    print!("{}", render_settings(&config));
    Ok(())
}

fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path().display());
    Ok(())
}

/// Every key grouped under its `[section]` header.
fn render_settings(config: &ConfigFile) -> String {
    let mut out = String::from("Configuration Settings\n======================\n\n");
    let mut current_section = "";

    for key in ConfigKey::all() {
        let section = key.section();
        if section != current_section {
            if !current_section.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("[{}]\n", section));
            current_section = section;
        }

        let value = key.get(config);
        let value = if value.is_empty() { "(not set)" } else { value.as_str() };
        out.push_str(&format!("  {} = {}\n", key.key_name(), value));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unknown_key_points_at_list() {
        let err = parse_key("feed.nope").unwrap_err();
        assert!(err.to_string().contains("transithq config list"));
    }

    #[test]
    fn test_key_lookup_is_case_insensitive() {
        assert_eq!(parse_key("MAP.Mode").unwrap(), ConfigKey::MapMode);
    }

    #[test]
    fn test_render_settings_groups_sections() {
        let rendered = render_settings(&ConfigFile::default());

        let feed = rendered.find("[feed]").unwrap();
        let map = rendered.find("[map]").unwrap();
        let logging = rendered.find("[logging]").unwrap();
        assert!(feed < map && map < logging);
        assert!(rendered.contains("  file = (not set)"));
        assert!(rendered.contains("  mode = clustered"));
    }

    #[test]
    fn test_set_value_roundtrips_through_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.ini");

        assert_eq!(set_value(&path, "map.mode", "markers").unwrap(), ConfigKey::MapMode);
        set_value(&path, "feed.interval_secs", "5").unwrap();

        let reloaded = ConfigFile::load_from(&path).unwrap();
        let rendered = render_settings(&reloaded);
        assert!(rendered.contains("  mode = markers"));
        assert!(rendered.contains("  interval_secs = 5"));
    }

    #[test]
    fn test_set_value_rejects_invalid_without_writing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        set_value(&path, "feed.interval_secs", "5").unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        assert!(set_value(&path, "feed.interval_secs", "0").is_err());
        assert!(set_value(&path, "feed.nope", "1").is_err());

        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }
}
