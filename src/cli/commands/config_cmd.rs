//! Configuration display.

use console::style;

use crate::config::Settings;

/// Print the settings in effect after environment overrides.
pub fn cmd_config_show(settings: &Settings) -> anyhow::Result<()> {
    eprintln!(
        "{} Effective settings (override with MEDIAPULL_* variables)",
        style("→").cyan()
    );
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}
