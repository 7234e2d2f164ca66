//! Pipelines loaded from step files
//!
//! A [`Pipeline`] is the parsed form of one step file entry: its cells, its
//! parameter schema and the namespace its cache entries live under. Running
//! it feeds the code cells, plus a generated parameter cell, through a
//! [`CacheEngine`] in order.

pub mod params;
pub mod source;

pub use params::{parse_assignments, ParamDecl, ParamSchema};
pub use source::{parse_step_source, Cell, CellKind, StepSource};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::engine::{CacheEngine, CacheMode, StepOutcome, StepStatus};
use crate::error::Result;
use crate::executor::{Executor, Parameters};
use crate::fingerprint::Fingerprint;
use crate::step::Step;
use crate::storage::SnapshotStore;

/// Entry name used when a target does not name one
pub const DEFAULT_ENTRY: &str = "steps";

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub namespace: String,
    pub cells: Vec<Cell>,
    pub schema: ParamSchema,
}

impl Pipeline {
    pub fn from_source(namespace: impl Into<String>, text: &str) -> Result<Self> {
        let StepSource { cells, schema } = parse_step_source(text)?;
        Ok(Self {
            namespace: namespace.into(),
            cells,
            schema,
        })
    }

    /// Load a step file. The namespace is `{absolute path}:{entry}`.
    pub fn load(path: &Path, entry: Option<&str>) -> Result<Self> {
        let absolute = std::fs::canonicalize(path)
            .with_context(|| format!("Failed to resolve step file {}", path.display()))?;
        let text = std::fs::read_to_string(&absolute)
            .with_context(|| format!("Failed to read step file {}", absolute.display()))?;

        let namespace = format!(
            "{}:{}",
            absolute.display(),
            entry.unwrap_or(DEFAULT_ENTRY)
        );
        tracing::debug!(namespace = %namespace, "loading pipeline");

        Self::from_source(namespace, &text)
    }

    /// Check supplied parameters against the schema and fill in defaults
    pub fn resolve(&self, supplied: &Parameters) -> Result<Parameters> {
        self.schema.resolve(supplied)
    }

    /// The ordered code steps for a run with `parameters`
    ///
    /// Step indices are cell positions after the parameter cell is inserted,
    /// so markdown cells take up an index without producing a step.
    pub fn steps(&self, parameters: &Parameters) -> Vec<Step> {
        source::with_parameter_cell(&self.cells, parameters)
            .into_iter()
            .enumerate()
            .filter(|(_, cell)| cell.kind == CellKind::Code)
            .map(|(index, cell)| Step::new(index, cell.source))
            .collect()
    }

    /// Build an engine for this pipeline's namespace
    pub fn engine<S, E>(
        &self,
        parameters: Parameters,
        store: S,
        executor: E,
        mode: CacheMode,
    ) -> CacheEngine<S, E>
    where
        S: SnapshotStore,
        E: Executor,
    {
        CacheEngine::new(self.namespace.clone(), parameters, store, executor, mode)
    }

    /// Run every step through `engine`, stopping at the first fatal error
    pub fn run<S, E>(&self, engine: &mut CacheEngine<S, E>) -> Result<RunReport>
    where
        S: SnapshotStore,
        E: Executor,
    {
        self.run_with(engine, |_| {})
    }

    /// Like [`Pipeline::run`], handing each outcome to `on_step` as it completes
    pub fn run_with<S, E, F>(
        &self,
        engine: &mut CacheEngine<S, E>,
        mut on_step: F,
    ) -> Result<RunReport>
    where
        S: SnapshotStore,
        E: Executor,
        F: FnMut(&StepOutcome),
    {
        let started_at = Utc::now();
        let start = Instant::now();
        let steps = self.steps(engine.parameters());

        tracing::info!(
            namespace = %self.namespace,
            steps = steps.len(),
            "running pipeline"
        );

        let mut outcomes = Vec::with_capacity(steps.len());
        for step in &steps {
            tracing::trace!(step = step.index, snippet = %step.snippet(), "processing step");
            let outcome = engine.process(step)?;
            on_step(&outcome);
            outcomes.push(outcome);
        }

        Ok(RunReport {
            namespace: self.namespace.clone(),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            outcomes,
        })
    }

    /// Fingerprint every step and check for a cache entry without executing
    pub fn dry_run<S, E>(&self, engine: &CacheEngine<S, E>) -> Result<Vec<PlannedStep>>
    where
        S: SnapshotStore,
        E: Executor,
    {
        self.steps(engine.parameters())
            .iter()
            .map(|step| {
                Ok(PlannedStep {
                    index: step.index,
                    fingerprint: engine.fingerprint(step),
                    cached: engine.is_cached(step)?,
                    snippet: step.snippet(),
                })
            })
            .collect()
    }
}

/// Split a `FILE[:ENTRY]` target
///
/// The entry is only split off when the part before the last `:` names an
/// existing file, so paths containing colons still work.
pub fn parse_target(target: &str) -> (PathBuf, Option<String>) {
    if let Some((file, entry)) = target.rsplit_once(':') {
        let plain_entry = !entry.is_empty() && !entry.contains(|c: char| c == '/' || c == '\\');
        if plain_entry && Path::new(file).is_file() {
            return (PathBuf::from(file), Some(entry.to_string()));
        }
    }
    (PathBuf::from(target), None)
}

/// One step as it would be processed, without running it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedStep {
    pub index: usize,
    pub fingerprint: Fingerprint,
    pub cached: bool,
    pub snippet: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub hits: usize,
    pub misses: usize,
    pub live: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub namespace: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcomes: Vec<StepOutcome>,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for outcome in &self.outcomes {
            match outcome.status {
                StepStatus::Hit => summary.hits += 1,
                StepStatus::Miss => summary.misses += 1,
                StepStatus::Live => summary.live += 1,
            }
        }
        summary
    }

    /// Value of the last step, if any step ran
    pub fn last(&self) -> Option<&StepOutcome> {
        self.outcomes.last()
    }
}
