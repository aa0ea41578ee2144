//! `switchyard route`

use crate::app::{build_orchestrator, load_config};
use anyhow::{Context, Result};
use std::path::Path;

pub async fn run(file: &Path) -> Result<()> {
    let command = super::read_command(file)?;
    let config = load_config()?;
    let orchestrator = build_orchestrator(&config)?;

    let decision = orchestrator.router().decide(&command).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&decision).context("Failed to serialize decision")?
    );
    Ok(())
}
