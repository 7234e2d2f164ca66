// Library interface for stepcache
// The binary and the integration tests both go through these modules.

pub mod cli;
pub mod commands;
pub mod config;
pub mod config_discovery;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod logging;
pub mod pipeline;
pub mod step;
pub mod storage;

// Re-export commonly used types
pub use engine::{CacheEngine, CacheEvent, CacheMode, EventSink, StepOutcome, StepStatus};
pub use error::{Error, Result};
pub use executor::{CalcExecutor, Executor, ExecutorError, Parameters, Value};
pub use fingerprint::{fingerprint, Fingerprint};
pub use pipeline::{Pipeline, RunReport};
pub use step::{Step, StepValue};
pub use storage::{default_cache_dir, BlobKind, FilesystemStore, SnapshotStore};
