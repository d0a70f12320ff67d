//! # meld-node Logging
//!
//! Subcommands print their results (DIDs, devices, proofs, tag URLs) as
//! JSON on stdout so they can be piped into `jq` or another tool. Logs go
//! to stderr and never mix with that output.
//!
//! The format comes from `--log-format` / `MELD_LOG_FORMAT`. Verbosity
//! comes from `RUST_LOG`, falling back to [`DEFAULT_FILTER`], which keeps
//! registry commits, tag encoding decisions and storage retries visible at
//! `info`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "meld_node=info,meld_protocol=info";

/// How log lines are rendered on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Colored lines with the emitting module, for an operator at a terminal.
    Pretty,
    /// One JSON object per line, for provisioning stations that ship logs.
    Json,
}

impl LogFormat {
    /// `json` in any case selects [`LogFormat::Json`]; anything else is
    /// [`LogFormat::Pretty`], so a typo in `MELD_LOG_FORMAT` never stops a
    /// provisioning run.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// `RUST_LOG` when it parses, else `fallback`.
fn filter_or(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Install the stderr subscriber for meld-node.
///
/// Called once from `main` before any subcommand runs. A second call is a
/// no-op, so tests may call it freely.
///
/// ```text
/// RUST_LOG=meld_protocol::registry=debug meld-node provision --name kitchen --uid 04:A2:3B:1C
/// MELD_LOG_FORMAT=json meld-node prove --moments week.json --threshold 100 2>node.log
/// ```
pub fn init_logging(fallback_filter: &str, format: LogFormat) {
    let env_filter = filter_or(fallback_filter);

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .ok();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_current_span(false)
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .ok();
        }
    }

    tracing::debug!(?format, "meld-node logging ready");
}
