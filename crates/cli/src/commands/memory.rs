//! `autolite memory`: Memory management commands.

use std::path::Path;
use std::sync::Arc;

use autolite_config::AppConfig;
use autolite_core::memory::MemoryBackend;
use autolite_memory::create_backend;
use autolite_providers::build_from_config;

use super::load_config;

fn open(config: &AppConfig) -> Result<Arc<dyn MemoryBackend>, Box<dyn std::error::Error>> {
    let backends = build_from_config(config)?;
    Ok(create_backend(
        &config.memory.backend,
        config.memory.snapshot_path(),
        backends.embedder,
    ))
}

pub async fn stats(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let memory = open(&config)?;
    let stats = memory.stats().await;

    println!("Memory Statistics");
    println!("=================");
    println!("  Backend:    {}", memory.name());
    println!("  Embeddings: {} ({} dims)", config.memory.embedding, config.memory.embed_dim);
    println!("  Snapshot:   {}", config.memory.snapshot_path().display());
    println!("  Records:    {}", stats.records);
    println!("  Shape:      {:?}", stats.shape);
    Ok(())
}

pub async fn search(config_path: Option<&Path>, query: &str, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let memory = open(&config)?;

    println!("Searching memories for: \"{query}\"");
    println!();

    let results = memory.get_relevant(query, limit).await?;
    if results.is_empty() {
        println!("   No memories found.");
    }
    for (i, text) in results.iter().enumerate() {
        let preview: String = text.chars().take(120).collect();
        println!("  {:>2}. {preview}", i + 1);
    }
    Ok(())
}

pub async fn add(config_path: Option<&Path>, text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let memory = open(&config)?;
    memory.add(text).await?;
    println!("Stored. {} records.", memory.stats().await.records);
    Ok(())
}

pub async fn clear(config_path: Option<&Path>, confirm: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !confirm {
        println!("This will delete ALL memories permanently.");
        println!("   Run with --confirm to proceed:");
        println!("   autolite memory clear --confirm");
        return Ok(());
    }

    let config = load_config(config_path)?;
    let memory = open(&config)?;
    println!("{}", memory.clear().await?);
    Ok(())
}
