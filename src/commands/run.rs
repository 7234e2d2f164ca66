//! `stepcache run` command implementation
//!
//! Loads a step file, resolves its parameters and runs it through the cache
//! engine. Step values go to stdout, the summary line to stderr.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;

use crate::cli::RunArgs;
use crate::config::StepcacheConfig;
use crate::engine::{CacheEvent, FanoutSink, MemorySink, StepOutcome, TracingSink};
use crate::executor::CalcExecutor;
use crate::pipeline::{parse_assignments, parse_target, Pipeline, RunReport, RunSummary};
use crate::storage::FilesystemStore;

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    report: &'a RunReport,
    summary: RunSummary,
    events: Vec<CacheEvent>,
}

pub fn run(args: &RunArgs, config: &StepcacheConfig) -> Result<()> {
    let (path, entry) = parse_target(&args.target);
    if !path.exists() {
        anyhow::bail!("Step file not found: {}", path.display());
    }

    let pipeline = Pipeline::load(&path, entry.as_deref())?;
    let supplied = parse_assignments(&args.params)?;
    let parameters = pipeline.resolve(&supplied)?;

    let mut mode = config.cache_mode();
    mode.disable |= args.disable_cache;
    mode.ignore |= args.ignore_cache;
    let cache_dir = args
        .cache_dir
        .clone()
        .unwrap_or_else(|| config.cache_dir());
    let store = FilesystemStore::new(&cache_dir).context("Failed to initialize snapshot store")?;

    tracing::debug!(
        namespace = %pipeline.namespace,
        cache_dir = %cache_dir.display(),
        disable = mode.disable,
        ignore = mode.ignore,
        "starting run"
    );

    let events = MemorySink::new();
    let mut engine = pipeline
        .engine(parameters, store, CalcExecutor::new(), mode)
        .with_sink(Box::new(FanoutSink(vec![
            Box::new(TracingSink),
            Box::new(events.clone()),
        ])));

    if args.dry_run {
        let planned = pipeline.dry_run(&engine)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&planned)?);
        } else {
            for step in &planned {
                println!(
                    "[{}] {} {} {}",
                    step.index,
                    step.fingerprint,
                    if step.cached { "cached" } else { "missing" },
                    step.snippet
                );
            }
        }
        return Ok(());
    }

    let json = args.json;
    let mut stdout = std::io::stdout().lock();
    let mut write_error = None;
    let report = pipeline.run_with(&mut engine, |outcome| {
        if json || write_error.is_some() {
            return;
        }
        if let Err(e) = print_outcome(&mut stdout, outcome) {
            write_error = Some(e);
        }
    })?;
    if let Some(e) = write_error {
        return Err(e).context("Failed to write step output");
    }

    let summary = report.summary();
    if json {
        let output = JsonReport {
            report: &report,
            summary,
            events: events.events(),
        };
        writeln!(stdout, "{}", serde_json::to_string_pretty(&output)?)
            .context("Failed to write run report")?;
    }

    // Compact single-line output
    eprintln!(
        "hits: {} | misses: {} | live: {} | {:.2}s",
        summary.hits,
        summary.misses,
        summary.live,
        report.duration_ms as f64 / 1000.0
    );

    Ok(())
}

fn print_outcome(out: &mut impl Write, outcome: &StepOutcome) -> std::io::Result<()> {
    for line in &outcome.value.output {
        writeln!(out, "{}", line)?;
    }
    writeln!(out, "[{}] {}", outcome.index, outcome.value)
}
