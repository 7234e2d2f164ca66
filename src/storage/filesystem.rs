use super::{BlobKind, SnapshotStore};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use tracing::debug;
use walkdir::WalkDir;

use crate::fingerprint::Fingerprint;

/// Filesystem-backed snapshot store
///
/// Layout: a single flat directory with one file per blob,
/// `{root}/{fingerprint}-{kind}` where kind is `value` or `context`.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// concurrent reader sees either the old blob, the new blob, or nothing.
pub struct FilesystemStore {
    root: PathBuf,
}

/// Aggregate view of the store contents
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    /// Fingerprints with both blobs present
    pub entries: u64,
    /// Fingerprints with only one of the two blobs
    pub partial: u64,
    pub total_bytes: u64,
    #[serde(skip)]
    pub cache_dir: PathBuf,
}

/// One fingerprint found in the store and which of its blobs exist
#[derive(Debug, Clone, Serialize)]
pub struct EntryListing {
    pub fingerprint: Fingerprint,
    pub has_value: bool,
    pub has_context: bool,
    pub size_bytes: u64,
}

impl EntryListing {
    pub fn is_complete(&self) -> bool {
        self.has_value && self.has_context
    }
}

impl FilesystemStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create cache directory: {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a blob
    pub fn blob_path(&self, key: &Fingerprint, kind: BlobKind) -> PathBuf {
        self.root.join(format!("{}-{}", key, kind))
    }

    /// Split a blob file name back into fingerprint and kind
    fn parse_blob_name(name: &str) -> Option<(Fingerprint, BlobKind)> {
        let (key, kind) = name.split_once('-')?;
        Some((key.parse().ok()?, BlobKind::parse(kind)?))
    }

    /// List every fingerprint present in the store, sorted
    pub fn list(&self) -> Result<Vec<EntryListing>> {
        let mut entries: BTreeMap<Fingerprint, EntryListing> = BTreeMap::new();

        for item in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let item = item
                .with_context(|| format!("Failed to read cache directory: {}", self.root.display()))?;
            if !item.file_type().is_file() {
                continue;
            }
            let Some((key, kind)) = item.file_name().to_str().and_then(Self::parse_blob_name)
            else {
                // Temp files and foreign files are not blobs
                continue;
            };
            let size = item.metadata().map(|m| m.len()).unwrap_or(0);

            let listing = entries.entry(key.clone()).or_insert_with(|| EntryListing {
                fingerprint: key,
                has_value: false,
                has_context: false,
                size_bytes: 0,
            });
            match kind {
                BlobKind::Value => listing.has_value = true,
                BlobKind::Context => listing.has_context = true,
            }
            listing.size_bytes += size;
        }

        Ok(entries.into_values().collect())
    }

    /// Get store statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats {
            cache_dir: self.root.clone(),
            ..Default::default()
        };

        for entry in self.list()? {
            if entry.is_complete() {
                stats.entries += 1;
            } else {
                stats.partial += 1;
            }
            stats.total_bytes += entry.size_bytes;
        }

        Ok(stats)
    }
}

impl SnapshotStore for FilesystemStore {
    fn put(&self, key: &Fingerprint, kind: BlobKind, data: &[u8]) -> Result<()> {
        let path = self.blob_path(key, kind);

        // Use PID + thread ID to avoid collisions in concurrent writes
        let temp_path = self.root.join(format!(
            "{}-{}.tmp.{}.{:?}",
            key,
            kind,
            std::process::id(),
            thread::current().id()
        ));

        let write = || -> Result<()> {
            let mut file = fs::File::create(&temp_path)
                .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;
            file.write_all(data).context("Failed to write blob")?;
            file.sync_all().context("Failed to sync blob")?;
            fs::rename(&temp_path, &path)
                .with_context(|| format!("Failed to move blob into place: {}", path.display()))
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        debug!(
            fingerprint = %key,
            kind = kind.as_str(),
            size_bytes = data.len(),
            "blob stored"
        );

        Ok(())
    }

    fn get(&self, key: &Fingerprint, kind: BlobKind) -> Result<Option<Vec<u8>>> {
        let path = self.blob_path(key, kind);

        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read blob: {}", path.display()))
            }
        }
    }

    fn exists(&self, key: &Fingerprint, kind: BlobKind) -> Result<bool> {
        Ok(self.blob_path(key, kind).is_file())
    }

    fn delete(&self, key: &Fingerprint, kind: BlobKind) -> Result<()> {
        let path = self.blob_path(key, kind);

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to delete blob: {}", path.display()))
            }
        }
    }
}
