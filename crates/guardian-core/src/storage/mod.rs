mod config;

pub use config::{Config, FeedConfig, HapticsConfig, NotificationsConfig, ReconciliationConfig};

use std::path::PathBuf;

/// Returns `~/.config/guardian[-dev]/` based on GUARDIAN_ENV.
///
/// Set GUARDIAN_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("GUARDIAN_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("guardian-dev")
    } else {
        base_dir.join("guardian")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
