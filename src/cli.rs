use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// stepcache - snapshot-cached execution of step pipelines
///
/// Each step's value and the context it leaves behind are stored under a
/// fingerprint of the step, so re-running a pipeline only executes what
/// changed and everything after it.
#[derive(Parser, Debug)]
#[command(name = "stepcache")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Snapshot-cached execution of stateful step pipelines", long_about = None)]
pub struct Cli {
    /// Config file path (default: nearest stepcache.toml)
    #[arg(short = 'c', long, env = "STEPCACHE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, env = "STEPCACHE_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a step file, reusing cached steps
    Run(RunArgs),

    /// Inspect the snapshot cache
    Cache(CacheArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Step file, optionally followed by `:ENTRY` to select a cache namespace
    pub target: String,

    /// Pipeline parameter (repeatable)
    #[arg(short, long = "param", value_name = "NAME=VALUE")]
    pub params: Vec<String>,

    /// Execute every step without reading or writing the cache
    #[arg(long, env = "STEPCACHE_DISABLE_CACHE")]
    pub disable_cache: bool,

    /// Execute every step and overwrite cached entries
    #[arg(long, env = "STEPCACHE_IGNORE_CACHE")]
    pub ignore_cache: bool,

    /// Show each step's fingerprint and cache status without executing
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,

    /// Snapshot cache directory
    #[arg(long, env = "STEPCACHE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,

    /// Snapshot cache directory
    #[arg(long, env = "STEPCACHE_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List cached entries
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove every cached entry
    Clean,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args() {
        let cli = Cli::try_parse_from([
            "stepcache",
            "run",
            "daily.steps:fast",
            "-p",
            "alpha=1",
            "--param",
            "beta=two",
            "--ignore-cache",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.target, "daily.steps:fast");
        assert_eq!(args.params, vec!["alpha=1", "beta=two"]);
        assert!(args.ignore_cache);
        assert!(!args.disable_cache);
    }

    #[test]
    fn test_cache_subcommands() {
        let cli =
            Cli::try_parse_from(["stepcache", "cache", "list", "--json", "--cache-dir", "/tmp/c"])
                .unwrap();
        let Commands::Cache(args) = cli.command else {
            panic!("expected cache command");
        };
        assert!(matches!(args.command, CacheCommands::List { json: true }));
        assert_eq!(args.cache_dir, Some(PathBuf::from("/tmp/c")));
    }

    #[test]
    fn test_run_requires_target() {
        assert!(Cli::try_parse_from(["stepcache", "run"]).is_err());
    }
}
