use crate::fingerprint::Fingerprint;

/// How far a run has degraded. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CacheState {
    /// No miss yet: steps may be served from the cache
    Fresh,
    /// A step missed: every later step executes, results are still written
    Invalidated,
    /// Snapshotting failed or caching was turned off: no reads, no writes
    Disabled,
}

impl CacheState {
    pub fn allows_reads(self) -> bool {
        self == CacheState::Fresh
    }

    fn advance(&mut self, to: CacheState) {
        if to > *self {
            *self = to;
        }
    }
}

/// Cache-mode flags supplied by the driver
///
/// `disable` wins over `ignore`: it turns off reads and writes, while `ignore`
/// only turns off reads so the run refreshes the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMode {
    pub disable: bool,
    pub ignore: bool,
}

impl CacheMode {
    pub fn initial_state(self) -> CacheState {
        if self.disable {
            CacheState::Disabled
        } else if self.ignore {
            CacheState::Invalidated
        } else {
            CacheState::Fresh
        }
    }
}

/// Per-run bookkeeping, discarded when the run ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    cache: CacheState,
    /// Most recent snapshot known to describe the context after the last step
    pub last_snapshot_ref: Option<Fingerprint>,
    /// Snapshot the live context currently corresponds to
    pub last_snapshot_restored: Option<Fingerprint>,
}

impl RunState {
    pub fn new(mode: CacheMode) -> Self {
        Self {
            cache: mode.initial_state(),
            last_snapshot_ref: None,
            last_snapshot_restored: None,
        }
    }

    pub fn cache(&self) -> CacheState {
        self.cache
    }

    pub fn invalidate(&mut self) {
        self.cache.advance(CacheState::Invalidated);
    }

    pub fn disable(&mut self) {
        self.cache.advance(CacheState::Disabled);
    }

    /// The snapshot to load before the next live execution, if the live
    /// context is behind the last known-good snapshot
    pub fn pending_restore(&self) -> Option<&Fingerprint> {
        match (&self.last_snapshot_ref, &self.last_snapshot_restored) {
            (Some(target), Some(current)) if target == current => None,
            (Some(target), _) => Some(target),
            (None, _) => None,
        }
    }

    /// Record a hit: the step's snapshot is now the latest, but nothing was loaded
    pub fn mark_hit(&mut self, fingerprint: Fingerprint) {
        self.last_snapshot_ref = Some(fingerprint);
    }

    /// Record that the live context now matches `fingerprint`
    pub fn mark_synced(&mut self, fingerprint: Fingerprint) {
        self.last_snapshot_ref = Some(fingerprint.clone());
        self.last_snapshot_restored = Some(fingerprint);
    }
}
