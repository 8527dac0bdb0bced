//! Shared helper functions used across CLI subcommands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use stickfix_store::{StickerStore, StoreConfig, StoreStats};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Load the store configuration, applying the `--data-dir` override.
pub fn load_config(path: &Path, data_dir: Option<PathBuf>) -> Result<StoreConfig> {
    let mut config = StoreConfig::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    Ok(config)
}

/// Open the registry described by `config`.
pub fn open_store(config: &StoreConfig) -> Result<StickerStore> {
    StickerStore::open(config).with_context(|| {
        format!(
            "failed to open registry at {}",
            config.registry_path().display()
        )
    })
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Print one sticker id per line.
pub fn print_stickers(stickers: &[String]) {
    if stickers.is_empty() {
        println!("  (no stickers)");
    }
    for sticker in stickers {
        println!("  {sticker}");
    }
}

pub fn stats_json(stats: &StoreStats) -> serde_json::Value {
    serde_json::json!({
        "users": stats.users,
        "tags": stats.tags,
        "stickers": stats.stickers,
        "cached_results": stats.cached_results,
        "cache_hits": stats.cache_hits,
        "cache_misses": stats.cache_misses,
        "cache_hit_rate": stats.cache_hit_rate,
    })
}
