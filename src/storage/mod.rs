pub mod cache_dir;
pub mod filesystem;

pub use cache_dir::default_cache_dir;
pub use filesystem::{EntryListing, FilesystemStore, StoreStats};

use anyhow::Result;
use std::fmt;

use crate::fingerprint::Fingerprint;

/// The two blobs that make up a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobKind {
    /// The value a step produced
    Value,
    /// The serialized execution context right after the step ran
    Context,
}

impl BlobKind {
    pub const ALL: [BlobKind; 2] = [BlobKind::Value, BlobKind::Context];

    pub fn as_str(&self) -> &'static str {
        match self {
            BlobKind::Value => "value",
            BlobKind::Context => "context",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "value" => Some(BlobKind::Value),
            "context" => Some(BlobKind::Context),
            _ => None,
        }
    }
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Blob storage keyed by fingerprint and kind
///
/// Pure storage: no hit/miss policy lives here. There is no locking; two
/// writers racing on the same key leave the last writer's blob in place.
pub trait SnapshotStore {
    /// Store a blob, replacing any existing blob under the same key and kind
    fn put(&self, key: &Fingerprint, kind: BlobKind, data: &[u8]) -> Result<()>;

    /// Retrieve a blob, `None` if it does not exist
    fn get(&self, key: &Fingerprint, kind: BlobKind) -> Result<Option<Vec<u8>>>;

    /// Check if a blob exists
    fn exists(&self, key: &Fingerprint, kind: BlobKind) -> Result<bool>;

    /// Delete a blob. Deleting a missing blob is not an error.
    fn delete(&self, key: &Fingerprint, kind: BlobKind) -> Result<()>;

    /// An entry counts as present only when both of its blobs exist
    fn has_entry(&self, key: &Fingerprint) -> Result<bool> {
        for kind in BlobKind::ALL {
            if !self.exists(key, kind)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
