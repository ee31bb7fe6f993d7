use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Re-export tracing macros for convenience
pub use tracing::{debug, error, info, instrument, span, trace, warn, Level, Span};

/// Initialize the tracing system
///
/// `RUST_LOG` takes precedence when set; otherwise the level follows the
/// number of `-v` flags (warn, info, debug, trace). Output is a compact
/// stderr format so stdout stays reserved for the report.
pub fn init(verbosity: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive(verbosity))?,
    };

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(is_tty())
        .compact()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Filter directive for a `-v` count
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn is_tty() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stderr())
}

/// Span covering a whole search run
pub fn search_span(seeds: usize, max_generations: usize) -> Span {
    span!(Level::INFO, "search", seeds = %seeds, max_generations = %max_generations)
}

/// Span covering the evaluation of one generation
pub fn generation_span(generation: usize, tasks: usize) -> Span {
    span!(Level::INFO, "generation", generation = %generation, tasks = %tasks)
}

/// Emit a structured event for a resolved task
pub fn task_completed(checksum: &str, status: &str, cost: f64, success: bool) {
    if success {
        debug!(checksum = %checksum, status = %status, cost = %cost, "task_completed");
    } else {
        warn!(checksum = %checksum, status = %status, "task_failed");
    }
}

/// Emit a structured event for cache operations
pub fn cache_event(cache: &str, key: &str, hit: bool) {
    if hit {
        trace!(cache = %cache, key = %key, "cache_hit");
    } else {
        debug!(cache = %cache, key = %key, "cache_miss");
    }
}
