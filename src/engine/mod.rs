//! Cache engine
//!
//! Decides, step by step, whether a step's cached value can be reused or the
//! step has to execute. The steps form a chain over one mutating context, so
//! the decision is never per-step in isolation:
//!
//! - A hit returns the stored value without touching the executor. The live
//!   context is left behind; only the hit's fingerprint is remembered.
//! - The first miss invalidates every later step of the run. Before it
//!   executes, the context is restored from the last hit's snapshot if the
//!   live context is behind it.
//! - After each real execution the context is snapshotted and stored with the
//!   value. If the context cannot be serialized, caching is disabled for the
//!   rest of the run and the step's partial context blob is removed.

pub mod events;
pub mod state;

pub use events::{CacheEvent, EventSink, FanoutSink, MemorySink, MissReason, TracingSink};
pub use state::{CacheMode, CacheState, RunState};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::executor::{Executor, Parameters};
use crate::fingerprint::{fingerprint, Fingerprint};
use crate::step::{Step, StepValue};
use crate::storage::{BlobKind, SnapshotStore};

/// How a step's value was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Served from the cache, executor not invoked
    Hit,
    /// Executed, result written to the cache when possible
    Miss,
    /// Executed with caching disabled
    Live,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub fingerprint: Fingerprint,
    pub status: StepStatus,
    pub value: StepValue,
}

pub struct CacheEngine<S, E> {
    namespace: String,
    parameters: Parameters,
    store: S,
    executor: E,
    mode: CacheMode,
    state: RunState,
    sink: Box<dyn EventSink>,
}

impl<S: SnapshotStore, E: Executor> CacheEngine<S, E> {
    /// Create an engine for one run of one pipeline definition
    pub fn new(
        namespace: impl Into<String>,
        parameters: Parameters,
        store: S,
        executor: E,
        mode: CacheMode,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            parameters,
            store,
            executor,
            mode,
            state: RunState::new(mode),
            sink: Box::new(TracingSink),
        }
    }

    /// Report cache events to `sink` instead of `tracing`
    pub fn with_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fingerprint a step under this run's namespace and parameters
    pub fn fingerprint(&self, step: &Step) -> Fingerprint {
        fingerprint(&self.namespace, &self.parameters, step.index, &step.content)
    }

    /// Check, without side effects, whether a complete entry exists for a step
    pub fn is_cached(&self, step: &Step) -> Result<bool> {
        Ok(self.store.has_entry(&self.fingerprint(step))?)
    }

    /// Process the next step of the run
    ///
    /// Steps must be passed in index order. Execution and restore failures are
    /// returned as errors and end the run; serialization and storage write
    /// failures are absorbed by disabling the cache.
    pub fn process(&mut self, step: &Step) -> Result<StepOutcome> {
        let fp = self.fingerprint(step);

        if self.state.cache() == CacheState::Disabled {
            self.sink.record(&CacheEvent::Live {
                index: step.index,
                fingerprint: fp.clone(),
            });
            let value = self.execute(step)?;
            return Ok(StepOutcome {
                index: step.index,
                fingerprint: fp,
                status: StepStatus::Live,
                value,
            });
        }

        let reason = if self.state.cache().allows_reads() {
            match self.load(&fp) {
                Ok(Some(value)) => {
                    self.sink.record(&CacheEvent::Hit {
                        index: step.index,
                        fingerprint: fp.clone(),
                    });
                    self.state.mark_hit(fp.clone());
                    return Ok(StepOutcome {
                        index: step.index,
                        fingerprint: fp,
                        status: StepStatus::Hit,
                        value,
                    });
                }
                Ok(None) => MissReason::Absent,
                Err(e) => {
                    tracing::warn!(
                        step = step.index,
                        fingerprint = %fp,
                        "unreadable cache entry, executing instead: {}",
                        e
                    );
                    MissReason::Corrupt
                }
            }
        } else if self.mode.ignore {
            MissReason::Ignored
        } else {
            MissReason::Invalidated
        };

        self.sink.record(&CacheEvent::Miss {
            index: step.index,
            fingerprint: fp.clone(),
            reason,
        });
        self.state.invalidate();

        self.restore_pending(step.index)?;

        let value = self.execute(step)?;
        self.persist(step.index, &fp, &value);

        Ok(StepOutcome {
            index: step.index,
            fingerprint: fp,
            status: StepStatus::Miss,
            value,
        })
    }

    /// Load a cached value. `Ok(None)` when the entry is incomplete.
    fn load(&self, fp: &Fingerprint) -> Result<Option<StepValue>> {
        if !self.store.has_entry(fp)? {
            return Ok(None);
        }
        let Some(bytes) = self.store.get(fp, BlobKind::Value)? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Storage(anyhow::anyhow!("malformed value blob {}: {}", fp, e)))?;
        Ok(Some(value))
    }

    /// Bring the live context up to the last hit's snapshot
    fn restore_pending(&mut self, index: usize) -> Result<()> {
        let Some(target) = self.state.pending_restore().cloned() else {
            return Ok(());
        };

        let restore_error = |message: String| Error::Restore {
            fingerprint: target.clone(),
            message,
        };

        let bytes = self
            .store
            .get(&target, BlobKind::Context)
            .map_err(|e| restore_error(e.to_string()))?
            .ok_or_else(|| restore_error("context blob is missing".to_string()))?;
        self.executor
            .restore(&bytes)
            .map_err(|e| restore_error(e.to_string()))?;

        self.sink.record(&CacheEvent::Restored {
            index,
            from: target.clone(),
        });
        self.state.mark_synced(target);
        Ok(())
    }

    fn execute(&mut self, step: &Step) -> Result<StepValue> {
        self.executor.run(step).map_err(|e| Error::Execution {
            index: step.index,
            message: e.to_string(),
        })
    }

    /// Snapshot the context and store it with the value, or disable caching
    fn persist(&mut self, index: usize, fp: &Fingerprint, value: &StepValue) {
        match self.write_entry(fp, value) {
            Ok(size_bytes) => {
                self.state.mark_synced(fp.clone());
                self.sink.record(&CacheEvent::Stored {
                    index,
                    fingerprint: fp.clone(),
                    size_bytes,
                });
            }
            Err(e) => {
                if let Err(cleanup) = self.store.delete(fp, BlobKind::Context) {
                    tracing::warn!(
                        fingerprint = %fp,
                        "failed to remove partial context blob: {}",
                        cleanup
                    );
                }
                self.state.disable();
                self.sink.record(&CacheEvent::Disabled {
                    index,
                    fingerprint: fp.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    fn write_entry(&self, fp: &Fingerprint, value: &StepValue) -> Result<u64> {
        let context = self
            .executor
            .snapshot()
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let value_bytes =
            serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;

        self.store.put(fp, BlobKind::Context, &context)?;
        self.store.put(fp, BlobKind::Value, &value_bytes)?;

        Ok((context.len() + value_bytes.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CalcExecutor, Value};
    use crate::storage::FilesystemStore;
    use tempfile::TempDir;

    fn steps(contents: &[&str]) -> Vec<Step> {
        contents
            .iter()
            .enumerate()
            .map(|(i, c)| Step::new(i, *c))
            .collect()
    }

    fn engine(
        dir: &TempDir,
        mode: CacheMode,
    ) -> (CacheEngine<FilesystemStore, CalcExecutor>, MemorySink) {
        let sink = MemorySink::new();
        let store = FilesystemStore::new(dir.path()).unwrap();
        let engine = CacheEngine::new("ns1", Parameters::new(), store, CalcExecutor::new(), mode)
            .with_sink(Box::new(sink.clone()));
        (engine, sink)
    }

    fn run_all(
        engine: &mut CacheEngine<FilesystemStore, CalcExecutor>,
        steps: &[Step],
    ) -> Vec<StepOutcome> {
        steps.iter().map(|s| engine.process(s).unwrap()).collect()
    }

    fn statuses(outcomes: &[StepOutcome]) -> Vec<StepStatus> {
        outcomes.iter().map(|o| o.status).collect()
    }

    #[test]
    fn test_cold_then_warm_run() {
        let dir = TempDir::new().unwrap();
        let pipeline = steps(&["x = 1", "y = x + 1", "result = y * 2"]);

        let (mut cold, _) = engine(&dir, CacheMode::default());
        let outcomes = run_all(&mut cold, &pipeline);
        assert_eq!(statuses(&outcomes), vec![StepStatus::Miss; 3]);
        assert_eq!(outcomes[2].value.result, Some(Value::Int(4)));

        let (mut warm, sink) = engine(&dir, CacheMode::default());
        let outcomes = run_all(&mut warm, &pipeline);
        assert_eq!(statuses(&outcomes), vec![StepStatus::Hit; 3]);
        assert_eq!(outcomes[2].value.result, Some(Value::Int(4)));

        // Nothing ran, so nothing was restored either
        assert!(warm.executor().bindings().is_empty());
        assert!(sink
            .events()
            .iter()
            .all(|e| matches!(e, CacheEvent::Hit { .. })));
    }

    #[test]
    fn test_edit_restores_from_last_hit() {
        let dir = TempDir::new().unwrap();

        let (mut first, _) = engine(&dir, CacheMode::default());
        run_all(&mut first, &steps(&["x = 1", "y = x + 1", "result = y * 2"]));

        let (mut second, sink) = engine(&dir, CacheMode::default());
        let outcomes = run_all(&mut second, &steps(&["x = 1", "y = x + 2", "result = y * 2"]));

        assert_eq!(
            statuses(&outcomes),
            vec![StepStatus::Hit, StepStatus::Miss, StepStatus::Miss]
        );
        assert_eq!(outcomes[2].value.result, Some(Value::Int(6)));

        let events = sink.events();
        assert!(events.contains(&CacheEvent::Restored {
            index: 1,
            from: outcomes[0].fingerprint.clone(),
        }));
        assert!(events.contains(&CacheEvent::Miss {
            index: 2,
            fingerprint: outcomes[2].fingerprint.clone(),
            reason: MissReason::Invalidated,
        }));
    }

    #[test]
    fn test_float_values_survive_cache_exactly() {
        let dir = TempDir::new().unwrap();
        let pipeline = steps(&["x = 1 / 9 * 1.1", "x * 3", "y = 0.1 + 0.2"]);
        let float_bits = |outcome: &StepOutcome| match &outcome.value.result {
            Some(Value::Float(f)) => f.to_bits(),
            other => panic!("expected a float, got {:?}", other),
        };

        let (mut cold, _) = engine(&dir, CacheMode::default());
        let live = run_all(&mut cold, &pipeline);
        let live_x = cold.executor().get("x").cloned();

        let (mut warm, _) = engine(&dir, CacheMode::default());
        let cached = run_all(&mut warm, &pipeline);
        assert_eq!(statuses(&cached), vec![StepStatus::Hit; 3]);
        for (a, b) in live.iter().zip(&cached) {
            assert_eq!(float_bits(a), float_bits(b));
        }

        // Editing the last step restores the context written by a live run
        let (mut edited, _) = engine(&dir, CacheMode::default());
        run_all(&mut edited, &steps(&["x = 1 / 9 * 1.1", "x * 3", "y = x"]));
        assert_eq!(edited.executor().get("x").cloned(), live_x);
    }

    #[test]
    fn test_float_overflow_is_an_execution_error() {
        let dir = TempDir::new().unwrap();

        let (mut first, _) = engine(&dir, CacheMode::default());
        let err = first.process(&Step::new(0, "big = 1e308 * 10\n1")).unwrap_err();
        assert!(matches!(err, Error::Execution { index: 0, .. }));
        assert!(err.to_string().contains("float overflow"));

        // Nothing was stored, so a fixed step runs cleanly afterwards
        let (mut second, _) = engine(&dir, CacheMode::default());
        let outcomes = run_all(&mut second, &steps(&["big = 1e308\n1", "y = 2"]));
        assert_eq!(statuses(&outcomes), vec![StepStatus::Miss; 2]);
    }

    #[test]
    fn test_serialization_failure_disables_cache() {
        let dir = TempDir::new().unwrap();
        let pipeline = steps(&["x = 1", "conn = handle(\"db\")", "y = x + 1"]);

        let (mut engine, sink) = engine(&dir, CacheMode::default());
        let outcomes = run_all(&mut engine, &pipeline);

        assert_eq!(
            statuses(&outcomes),
            vec![StepStatus::Miss, StepStatus::Miss, StepStatus::Live]
        );
        assert_eq!(engine.state().cache(), CacheState::Disabled);
        assert_eq!(outcomes[2].value.result, Some(Value::Int(2)));

        let store = engine.store();
        assert!(store.has_entry(&outcomes[0].fingerprint).unwrap());
        assert!(!store.exists(&outcomes[1].fingerprint, BlobKind::Context).unwrap());
        assert!(!store.exists(&outcomes[1].fingerprint, BlobKind::Value).unwrap());
        assert!(!store.has_entry(&outcomes[2].fingerprint).unwrap());

        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, CacheEvent::Disabled { index: 1, .. })));
    }

    #[test]
    fn test_disable_mode_never_touches_store() {
        let dir = TempDir::new().unwrap();
        let pipeline = steps(&["x = 1", "x + 1"]);
        let mode = CacheMode {
            disable: true,
            ignore: false,
        };

        let (mut engine, _) = engine(&dir, mode);
        let outcomes = run_all(&mut engine, &pipeline);

        assert_eq!(statuses(&outcomes), vec![StepStatus::Live; 2]);
        assert!(engine.store().list().unwrap().is_empty());
    }

    #[test]
    fn test_ignore_mode_rewrites_cache() {
        let dir = TempDir::new().unwrap();
        let pipeline = steps(&["x = 1", "x + 1"]);

        let (mut first, _) = engine(&dir, CacheMode::default());
        run_all(&mut first, &pipeline);

        let mode = CacheMode {
            disable: false,
            ignore: true,
        };
        let (mut ignoring, sink) = engine(&dir, mode);
        let outcomes = run_all(&mut ignoring, &pipeline);
        assert_eq!(statuses(&outcomes), vec![StepStatus::Miss; 2]);
        assert!(matches!(
            sink.events()[0],
            CacheEvent::Miss {
                reason: MissReason::Ignored,
                ..
            }
        ));
        assert_eq!(
            sink.events()
                .iter()
                .filter(|e| matches!(e, CacheEvent::Stored { .. }))
                .count(),
            2
        );

        let (mut after, _) = engine(&dir, CacheMode::default());
        assert_eq!(statuses(&run_all(&mut after, &pipeline)), vec![StepStatus::Hit; 2]);
    }

    #[test]
    fn test_partial_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let pipeline = steps(&["x = 1", "x + 1"]);

        let (mut first, _) = engine(&dir, CacheMode::default());
        let outcomes = run_all(&mut first, &pipeline);
        first
            .store()
            .delete(&outcomes[1].fingerprint, BlobKind::Context)
            .unwrap();

        let (mut second, _) = engine(&dir, CacheMode::default());
        let outcomes = run_all(&mut second, &pipeline);
        assert_eq!(
            statuses(&outcomes),
            vec![StepStatus::Hit, StepStatus::Miss]
        );
        assert_eq!(outcomes[1].value.result, Some(Value::Int(2)));
    }

    #[test]
    fn test_malformed_value_blob_falls_back_to_execution() {
        let dir = TempDir::new().unwrap();
        let pipeline = steps(&["x = 5"]);

        let (mut first, _) = engine(&dir, CacheMode::default());
        let outcomes = run_all(&mut first, &pipeline);
        first
            .store()
            .put(&outcomes[0].fingerprint, BlobKind::Value, b"{truncated")
            .unwrap();

        let (mut second, sink) = engine(&dir, CacheMode::default());
        let outcomes = run_all(&mut second, &pipeline);
        assert_eq!(outcomes[0].status, StepStatus::Miss);
        assert_eq!(outcomes[0].value.result, Some(Value::Int(5)));
        assert!(matches!(
            sink.events()[0],
            CacheEvent::Miss {
                reason: MissReason::Corrupt,
                ..
            }
        ));
    }

    #[test]
    fn test_corrupt_snapshot_is_fatal() {
        let dir = TempDir::new().unwrap();

        let (mut first, _) = engine(&dir, CacheMode::default());
        let outcomes = run_all(&mut first, &steps(&["x = 1", "y = x"]));
        first
            .store()
            .put(&outcomes[0].fingerprint, BlobKind::Context, b"garbage")
            .unwrap();

        let (mut second, _) = engine(&dir, CacheMode::default());
        let changed = steps(&["x = 1", "y = x * 10"]);
        assert_eq!(second.process(&changed[0]).unwrap().status, StepStatus::Hit);

        let err = second.process(&changed[1]).unwrap_err();
        assert!(matches!(err, Error::Restore { .. }));
    }

    #[test]
    fn test_execution_error_propagates_with_index() {
        let dir = TempDir::new().unwrap();
        let (mut engine, _) = engine(&dir, CacheMode::default());
        let pipeline = steps(&["x = 1", "y = undefined_name"]);

        engine.process(&pipeline[0]).unwrap();
        let err = engine.process(&pipeline[1]).unwrap_err();
        assert!(matches!(err, Error::Execution { index: 1, .. }));
        assert!(!engine.is_cached(&pipeline[1]).unwrap());
        assert!(engine.is_cached(&pipeline[0]).unwrap());
    }

    #[test]
    fn test_empty_step_still_writes_value_blob() {
        let dir = TempDir::new().unwrap();
        let (mut engine, _) = engine(&dir, CacheMode::default());
        let pipeline = steps(&["# only a comment"]);

        let outcome = engine.process(&pipeline[0]).unwrap();
        assert_eq!(outcome.value.result, None);
        assert!(engine.store().has_entry(&outcome.fingerprint).unwrap());
    }
}
