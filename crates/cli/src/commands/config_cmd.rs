//! `autolite config`: Configuration management commands.

use std::path::Path;

use autolite_config::AppConfig;

use super::load_config;

pub fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path)?;
    if config.llm.api_key.is_some() {
        config.llm.api_key = Some("***".into());
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub fn path(config_path: Option<&Path>) {
    let path = config_path.map(Path::to_path_buf).unwrap_or_else(AppConfig::config_path);
    println!("{}", path.display());
}

pub fn init(config_path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path.map(Path::to_path_buf).unwrap_or_else(AppConfig::config_path);
    if path.exists() && !force {
        println!("Config already exists at {}", path.display());
        println!("   Run with --force to overwrite it.");
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
