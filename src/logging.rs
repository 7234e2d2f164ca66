//! Structured logging utilities for stepcache
//!
//! All cache decisions are logged with structured fields so a run can be
//! reconstructed from its log.
//!
//! # Log Format Conventions
//!
//! - `operation`: What the engine did ("load", "run", "restore", "save")
//! - `status`: The result ("hit", "miss", "disabled", "success", "error")
//! - `fingerprint`: Step fingerprint (hex)
//! - `step`: Step index
//! - `size_bytes`: Size in bytes
//!
//! # Examples
//!
//! ```rust
//! use stepcache::logging::{operations, status};
//! use tracing::info;
//!
//! info!(
//!     operation = operations::LOAD,
//!     status = status::HIT,
//!     step = 3,
//!     fingerprint = "9f86d081884c7d65",
//!     "step 3 loaded from cache"
//! );
//! ```

use std::{fmt as std_fmt, io};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{
    fmt::{self, format::Writer},
    prelude::*,
    EnvFilter,
};

/// Formatter that shows "stepcache" instead of the full module path
struct StepcacheFormatter {
    with_ansi: bool,
}

impl<S, N> FormatEvent<S, N> for StepcacheFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std_fmt::Result {
        let meta = event.metadata();

        write!(
            writer,
            "{} ",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f")
        )?;

        if self.with_ansi {
            let level_style = match *meta.level() {
                tracing::Level::ERROR => "\x1b[31m", // Red
                tracing::Level::WARN => "\x1b[33m",  // Yellow
                tracing::Level::INFO => "\x1b[32m",  // Green
                tracing::Level::DEBUG => "\x1b[34m", // Blue
                tracing::Level::TRACE => "\x1b[35m", // Magenta
            };
            write!(writer, "{}{:5}(stepcache)\x1b[0m: ", level_style, meta.level())?;
        } else {
            write!(writer, "{:5}(stepcache): ", meta.level())?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format (default for development)
    Pretty,
    /// Compact format (for CI)
    Compact,
    /// JSON format (for log aggregation systems)
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }

    /// Resolve from STEPCACHE_LOG_FORMAT, then the configured value, then the environment
    pub fn resolve(configured: Option<&str>) -> Self {
        let from_env = std::env::var("STEPCACHE_LOG_FORMAT").ok();
        if let Some(format) = from_env.as_deref().or(configured).and_then(Self::parse) {
            return format;
        }
        // Default: pretty for dev, compact for CI
        if std::env::var("CI").is_ok() {
            Self::Compact
        } else {
            Self::Pretty
        }
    }
}

/// Log levels accepted by `--log-level` and `[log] level`
pub const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` takes precedence over `level`; without either, `info` is used.
/// Logs go to stderr so stdout carries only step output.
pub fn init(level: Option<&str>, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = match format {
        LogFormat::Pretty | LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .event_format(StepcacheFormatter {
                        with_ansi: format == LogFormat::Pretty,
                    })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(false)
                    .with_writer(io::stderr)
                    .json(),
            )
            .try_init(),
    };
}

/// Operation names for consistent logging
pub mod operations {
    pub const LOAD: &str = "load";
    pub const RUN: &str = "run";
    pub const RESTORE: &str = "restore";
    pub const SAVE: &str = "save";
}

/// Status values for consistent logging
pub mod status {
    pub const HIT: &str = "hit";
    pub const MISS: &str = "miss";
    pub const DISABLED: &str = "disabled";
    pub const SUCCESS: &str = "success";
    pub const ERROR: &str = "error";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_format() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("compact"), Some(LogFormat::Compact));
        assert_eq!(LogFormat::parse("fancy"), None);
    }

    #[test]
    #[serial]
    fn test_env_overrides_configured_format() {
        std::env::set_var("STEPCACHE_LOG_FORMAT", "json");
        assert_eq!(LogFormat::resolve(Some("compact")), LogFormat::Json);
        std::env::remove_var("STEPCACHE_LOG_FORMAT");
        assert_eq!(LogFormat::resolve(Some("compact")), LogFormat::Compact);
    }
}
