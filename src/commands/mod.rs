pub mod catalog;
pub mod config;
pub mod display;
pub mod download;
pub mod install;
pub mod list;
pub mod object_count;
pub mod textures;
pub mod uninstall;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use sessionmm::{Config, ModContext, ProgressCallback};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Load the config and resolve the game installation
pub fn load_context(game_path: Option<&Path>) -> Result<ModContext> {
    let config = Config::load()?;
    Ok(ModContext::new(config, game_path)?)
}

pub fn new_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Create an indicatif-based progress callback for CLI display
pub fn create_spinner_callback() -> ProgressCallback {
    let spinner = new_spinner("Starting...");

    Arc::new(move |msg: &str, current: u64, total: u64| {
        if current >= total && total > 0 {
            spinner.finish_with_message(format!("✓ {}", msg));
        } else {
            spinner.set_message(msg.to_string());
        }
    })
}
