//! CLI module for Switchyard
//!
//! Provides commands:
//! - `route`: print the routing decision for a command file
//! - `dispatch`: run a command file through the orchestrator
//! - `config`: print the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use switchyard_core::{Command, Role};

pub mod config;
pub mod dispatch;
pub mod route;

/// Switchyard command orchestrator
#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(about = "Route, gate and dispatch commands")]
#[command(version)]
pub struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the routing decision for a command
    Route {
        /// Command JSON file (`-` reads stdin)
        file: PathBuf,
    },
    /// Run a command and print the response
    Dispatch {
        /// Command JSON file (`-` reads stdin)
        file: PathBuf,
        /// Issuer role; resolved from the issuer id when omitted
        #[arg(long)]
        role: Option<Role>,
    },
    /// Print the effective configuration as TOML
    Config,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Route { file }) => route::run(&file).await,
        Some(Commands::Dispatch { file, role }) => dispatch::run(&file, role).await,
        Some(Commands::Config) => config::run(),
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Read a command from a file or stdin
pub(crate) fn read_command(path: &Path) -> Result<Command> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read command from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    };
    serde_json::from_str(&raw).context("Failed to parse command JSON")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dispatch_with_role() {
        let cli = Cli::parse_from(["switchyard", "--json", "dispatch", "cmd.json", "--role", "attorney"]);
        assert!(cli.json);
        match cli.command {
            Some(Commands::Dispatch { file, role }) => {
                assert_eq!(file, PathBuf::from("cmd.json"));
                assert_eq!(role, Some(Role::Attorney));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_role_rejected() {
        assert!(Cli::try_parse_from(["switchyard", "dispatch", "cmd.json", "--role", "owner"]).is_err());
    }
}
