use std::path::Path;
use std::sync::Once;

use tracing::Level;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::format::FmtSpan,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    Layer,
};
use tracing_tree::HierarchicalLayer;

// Log targets, one per pipeline concern.
pub const PDF_PARSING: &str = "pdf_parse";
pub const PDF_OPERATIONS: &str = "pdf_ops";
pub const GRID_INFERENCE: &str = "grid";
pub const ORACLE_CALLS: &str = "oracle";
pub const PIPELINE: &str = "pipeline";

const ALL_TARGETS: &[&str] = &[
    PDF_PARSING,
    PDF_OPERATIONS,
    GRID_INFERENCE,
    ORACLE_CALLS,
    PIPELINE,
];

static INIT: Once = Once::new();

/// Console output style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogStyle {
    #[default]
    Compact,
    /// Indented span tree, handy for following one run through its stages.
    Tree,
}

/// Maps `-v` counts onto a level for our own targets.
pub fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Builds the filter: `RUST_LOG` wins when set, otherwise our targets log at
/// the requested level and everything else at `warn`. Content-stream operators
/// are only traced at `-vv`.
pub fn build_filter(verbosity: u8) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = level_for(verbosity);
    let mut filter = EnvFilter::default().add_directive(LevelFilter::WARN.into());
    for target in ALL_TARGETS {
        let target_level = if *target == PDF_OPERATIONS && verbosity < 2 {
            Level::INFO
        } else {
            level
        };
        if let Ok(directive) = format!("{target}={target_level}").parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Installs the global subscriber writing to stderr. Later calls are no-ops.
pub fn init_logging(verbosity: u8, style: LogStyle) {
    INIT.call_once(|| {
        let filter = build_filter(verbosity);
        match style {
            LogStyle::Compact => {
                let stderr_layer = tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .compact()
                    .with_filter(filter);
                let _ = tracing_subscriber::registry().with(stderr_layer).try_init();
            }
            LogStyle::Tree => {
                let tree_layer = HierarchicalLayer::new(2)
                    .with_writer(std::io::stderr)
                    .with_targets(true)
                    .with_bracketed_fields(true)
                    .with_filter(filter);
                let _ = tracing_subscriber::registry().with(tree_layer).try_init();
            }
        }
    });
}

/// Like [`init_logging`], but also writes a full debug log to
/// `log_dir/ledgerlift.log`. Keep the guard alive for the life of the
/// process or buffered lines are lost.
pub fn init_logging_with_dir(
    verbosity: u8,
    style: LogStyle,
    log_dir: &Path,
) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::NEVER, log_dir, "ledgerlift.log");
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);

    INIT.call_once(|| {
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_appender)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
            .with_filter(build_filter(verbosity.max(1)));

        let console_filter = build_filter(verbosity);
        let registry = tracing_subscriber::registry().with(file_layer);
        let _ = match style {
            LogStyle::Compact => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .compact()
                        .with_filter(console_filter),
                )
                .try_init(),
            LogStyle::Tree => registry
                .with(
                    HierarchicalLayer::new(2)
                        .with_writer(std::io::stderr)
                        .with_targets(true)
                        .with_filter(console_filter),
                )
                .try_init(),
        };
    });

    Ok(guard)
}
