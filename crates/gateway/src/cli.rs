//! Command-line interface and configuration loading.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use mr_domain::config::{expand_placeholders, Config, ConfigSeverity};

#[derive(Parser)]
#[command(
    name = "modelrelay",
    version,
    about = "OpenAI-compatible mediation gateway with session context control"
)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the gateway (default).
    Serve,
    /// Configuration inspection.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print the version.
    Version,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Validate the configuration and exit non-zero on errors.
    Validate,
    /// Print the resolved configuration with secrets redacted.
    Show,
}

/// Read, expand `${ENV}` placeholders in, and parse the config file.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let expanded = expand_placeholders(&raw)
        .with_context(|| format!("expanding placeholders in {}", path.display()))?;
    let config: Config = toml::from_str(&expanded)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}

/// Print every validation issue; returns false when any is an error.
pub fn validate(config: &Config) -> bool {
    let issues = config.validate();
    for issue in &issues {
        println!("{issue}");
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if errors > 0 {
        println!("configuration INVALID: {errors} error(s)");
        false
    } else {
        println!("configuration OK ({} warning(s))", issues.len());
        true
    }
}

/// Print the resolved configuration with API keys redacted.
pub fn show(config: &Config) {
    let mut redacted = config.clone();
    for provider in &mut redacted.providers {
        if !provider.api_key.is_empty() {
            provider.api_key = "***redacted***".into();
        }
    }
    match toml::to_string_pretty(&redacted) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("failed to render config: {e}"),
    }
}
