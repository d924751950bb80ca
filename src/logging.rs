//! Structured logging initialization for the WLED manager.
//!
//! The daemon usually runs in a container, so besides the pretty terminal
//! output there is a plain compact format for `docker logs` and JSON lines
//! for log collectors. Backup and sync passes open a span carrying their
//! `run_id`; every format prints it with the event.

use std::io::{self, IsTerminal};

use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// How log lines are rendered on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON lines, one object per event
    Json,
    /// Colored multi-field output for an interactive terminal
    Pretty,
    /// Single-line plain output for pipes and container logs
    Compact,
}

impl LogFormat {
    /// Pick the format from the `--json` flag and whether stderr is a TTY.
    pub const fn detect(json: bool, stderr_is_tty: bool) -> Self {
        if json {
            Self::Json
        } else if stderr_is_tty {
            Self::Pretty
        } else {
            Self::Compact
        }
    }
}

/// Filter directives for the given verbosity flags. `quiet` wins.
///
/// HTTP request traces of the trigger server follow the same level once
/// `-v` is given.
pub fn default_directive(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        "wledm=error"
    } else {
        match verbose {
            0 => "wledm=info",
            1 => "wledm=debug,tower_http=debug",
            _ => "wledm=trace,tower_http=trace",
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the directives picked from `verbose`/`quiet`.
pub fn init_logging(json: bool, verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));
    let format = LogFormat::detect(json, io::stderr().is_terminal());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer(format))
        .init();
}

fn fmt_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let base = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_span_events(FmtSpan::NONE)
        .with_writer(io::stderr);

    match format {
        LogFormat::Json => base
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => base.with_target(false).boxed(),
        LogFormat::Compact => base.with_ansi(false).with_target(true).compact().boxed(),
    }
}
