//! `switchyard config`

use crate::app::load_config;
use anyhow::{Context, Result};

pub fn run() -> Result<()> {
    let config = load_config().context("Failed to load configuration")?;
    let rendered =
        toml::to_string_pretty(&config.redacted()).context("Failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}
