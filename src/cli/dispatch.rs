//! `switchyard dispatch`

use crate::app::{build_orchestrator, load_config};
use anyhow::{Context, Result};
use std::path::Path;
use switchyard_core::Role;
use tracing::warn;

pub async fn run(file: &Path, role: Option<Role>) -> Result<()> {
    let command = super::read_command(file)?;
    let config = load_config()?;
    let orchestrator = build_orchestrator(&config)?;

    let response = orchestrator.handle(command, role).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&response).context("Failed to serialize response")?
    );

    if !response.success {
        warn!(
            command_id = %response.command_id,
            error_kind = ?response.error_kind,
            "Command failed"
        );
        std::process::exit(2);
    }
    Ok(())
}
