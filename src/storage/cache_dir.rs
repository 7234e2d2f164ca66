use std::path::PathBuf;

/// Get default snapshot directory following platform conventions
///
/// - Linux/Unix: $XDG_CACHE_HOME/stepcache/snapshots or ~/.cache/stepcache/snapshots
/// - macOS: ~/Library/Caches/stepcache/snapshots
/// - Windows: %LOCALAPPDATA%/stepcache/snapshots
pub fn default_cache_dir() -> PathBuf {
    if let Some(cache_dir) = dirs::cache_dir() {
        cache_dir.join("stepcache").join("snapshots")
    } else {
        // Fallback to current directory if we can't determine cache dir
        PathBuf::from(".stepcache/cache")
    }
}
