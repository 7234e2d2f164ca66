//! `stepcache cache` command implementation
//!
//! Inspects and cleans the snapshot store (stats, list, clean).

use anyhow::{Context, Result};

use crate::cli::{CacheArgs, CacheCommands};
use crate::config::StepcacheConfig;
use crate::storage::{BlobKind, FilesystemStore, SnapshotStore};

pub fn cache(args: &CacheArgs, config: &StepcacheConfig) -> Result<()> {
    let cache_dir = args
        .cache_dir
        .clone()
        .unwrap_or_else(|| config.cache_dir());
    let store = FilesystemStore::new(cache_dir).context("Failed to initialize snapshot store")?;

    match &args.command {
        CacheCommands::Stats { json } => stats(&store, *json),
        CacheCommands::List { json } => list(&store, *json),
        CacheCommands::Clean => clean(&store),
    }
}

/// Show cache statistics
fn stats(store: &FilesystemStore, json: bool) -> Result<()> {
    let stats = store.stats().context("Failed to get cache statistics")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Snapshot Cache Statistics");
    println!();
    println!("Cache directory: {}", stats.cache_dir.display());
    println!("Entries: {}", stats.entries);
    println!("Partial entries: {}", stats.partial);
    println!("Total size: {:.2} MB", stats.total_bytes as f64 / 1_000_000.0);

    Ok(())
}

/// List cached fingerprints
fn list(store: &FilesystemStore, json: bool) -> Result<()> {
    let entries = store.list().context("Failed to list cache entries")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No cached steps.");
        return Ok(());
    }

    println!("Cached steps ({} entries):", entries.len());
    println!();

    for entry in &entries {
        let state = if entry.is_complete() {
            "complete"
        } else if entry.has_value {
            "value only"
        } else {
            "context only"
        };
        println!(
            "  {}  {:>10} bytes  {}",
            entry.fingerprint, entry.size_bytes, state
        );
    }

    Ok(())
}

/// Remove every blob from the store
fn clean(store: &FilesystemStore) -> Result<()> {
    let entries = store.list().context("Failed to list cache entries")?;

    for entry in &entries {
        for kind in BlobKind::ALL {
            store
                .delete(&entry.fingerprint, kind)
                .with_context(|| format!("Failed to remove {}-{}", entry.fingerprint, kind))?;
        }
    }

    tracing::info!(entries = entries.len(), "snapshot cache cleaned");
    println!("Removed {} cached entries.", entries.len());

    Ok(())
}
