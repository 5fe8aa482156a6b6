//! Logging setup for llmfs.
//!
//! Everything logs through `tracing`. The subscriber prints either JSON lines
//! or a human-readable format, and chatty library crates are capped at `warn`
//! so per-request filesystem logs stay readable.

use crate::config::ObservabilityConfig;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Library targets capped at `warn` regardless of the base level.
pub const QUIET_TARGETS: &[&str] = &[
    "hyper",
    "hyper_util",
    "reqwest",
    "h2",
    "rustls",
    "tower_http",
];

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    /// Unknown names fall back to `Pretty`.
    pub fn parse(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Base level followed by `<target>=warn` for every quiet target.
fn filter_directives(level: &str, extra_targets: &[String]) -> String {
    QUIET_TARGETS
        .iter()
        .copied()
        .chain(extra_targets.iter().map(String::as_str))
        .fold(level.to_string(), |mut directives, target| {
            directives.push(',');
            directives.push_str(target);
            directives.push_str("=warn");
            directives
        })
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured level when set. A second call is a
/// no-op, which keeps tests that share a process from panicking.
pub fn init_logging(config: &ObservabilityConfig) {
    let directives = filter_directives(&config.log_level, &config.excluded_targets);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));

    let format = LogFormat::parse(&config.log_format);
    let layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(true)
            .boxed(),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(
            level = %config.log_level,
            format = ?format,
            quiet_targets = QUIET_TARGETS.len() + config.excluded_targets.len(),
            "Logging initialized"
        );
    }
}

/// Fresh id attached to each transport request span.
pub fn generate_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
