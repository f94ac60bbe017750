pub mod config_cmd;
pub mod memory;
pub mod run;

use std::path::Path;

use autolite_config::AppConfig;

/// Load from `path` when given, else the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };
    config.map_err(|e| format!("Failed to load config: {e}").into())
}
