//! Structured cache events
//!
//! The engine reports every decision to an [`EventSink`] instead of logging
//! through a global. [`TracingSink`] forwards to `tracing` using the field
//! conventions in [`crate::logging`]; [`MemorySink`] keeps events for tests
//! and run diagnostics.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::fingerprint::Fingerprint;
use crate::logging::{operations, status};

/// Why a step did not hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissReason {
    /// No complete entry for the fingerprint
    Absent,
    /// The entry exists but could not be read or decoded
    Corrupt,
    /// An earlier step of this run missed
    Invalidated,
    /// The run was started with reads turned off
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CacheEvent {
    Hit {
        index: usize,
        fingerprint: Fingerprint,
    },
    Miss {
        index: usize,
        fingerprint: Fingerprint,
        reason: MissReason,
    },
    /// The step ran with caching disabled
    Live {
        index: usize,
        fingerprint: Fingerprint,
    },
    Restored {
        index: usize,
        from: Fingerprint,
    },
    Stored {
        index: usize,
        fingerprint: Fingerprint,
        size_bytes: u64,
    },
    /// Caching was switched off for the rest of the run
    Disabled {
        index: usize,
        fingerprint: Fingerprint,
        reason: String,
    },
}

pub trait EventSink {
    fn record(&self, event: &CacheEvent);
}

/// Forwards events to the global `tracing` subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &CacheEvent) {
        match event {
            CacheEvent::Hit { index, fingerprint } => info!(
                operation = operations::LOAD,
                status = status::HIT,
                step = index,
                fingerprint = %fingerprint,
                "step {} loaded from cache",
                index
            ),
            CacheEvent::Miss {
                index,
                fingerprint,
                reason,
            } => info!(
                operation = operations::RUN,
                status = status::MISS,
                step = index,
                fingerprint = %fingerprint,
                reason = ?reason,
                "step {} running",
                index
            ),
            CacheEvent::Live { index, fingerprint } => info!(
                operation = operations::RUN,
                status = status::DISABLED,
                step = index,
                fingerprint = %fingerprint,
                "step {} running without cache",
                index
            ),
            CacheEvent::Restored { index, from } => debug!(
                operation = operations::RESTORE,
                status = status::SUCCESS,
                step = index,
                fingerprint = %from,
                "context restored before step {}",
                index
            ),
            CacheEvent::Stored {
                index,
                fingerprint,
                size_bytes,
            } => debug!(
                operation = operations::SAVE,
                status = status::SUCCESS,
                step = index,
                fingerprint = %fingerprint,
                size_bytes = size_bytes,
                "step {} cached",
                index
            ),
            CacheEvent::Disabled {
                index,
                fingerprint,
                reason,
            } => warn!(
                operation = operations::SAVE,
                status = status::ERROR,
                step = index,
                fingerprint = %fingerprint,
                "serialization failed, cache disabled: {}",
                reason
            ),
        }
    }
}

/// Collects events in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<CacheEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CacheEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &CacheEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

/// Sends each event to several sinks
pub struct FanoutSink(pub Vec<Box<dyn EventSink>>);

impl EventSink for FanoutSink {
    fn record(&self, event: &CacheEvent) {
        for sink in &self.0 {
            sink.record(event);
        }
    }
}
