// Logging for embedrt
//
// Built on the `tracing` ecosystem. The library itself only emits events; a
// host binary picks one of the initializers below once at startup.
//
// # Usage
//
// ```rust,no_run
// use embedrt::logging;
//
// // INFO level, human-readable console output
// logging::init_default();
//
// // Or tune it
// let config = logging::LogConfig {
//     level: tracing::Level::DEBUG,
//     json_format: true,
//     ..Default::default()
// };
// logging::init(config);
// ```
//
// Lifecycle transitions are logged through `log_lifecycle!`, pool events
// through `log_pool!`. Both carry structured fields only.

use std::sync::Once;

use tracing::{Level, Subscriber};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Settings for the process-wide subscriber.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level to display
    pub level: Level,
    /// Emit one JSON object per event
    pub json_format: bool,
    /// Include file and line information
    pub show_file_line: bool,
    /// Include thread name and id; useful since the bridge hops threads
    pub show_thread_info: bool,
    /// Include timestamps
    pub show_time: bool,
    /// Extra filter directives ("target=level,target2=level2")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

static INIT: Once = Once::new();

/// Installs the global subscriber. Only the first call in a process has any effect.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let mut env_filter = EnvFilter::from_default_env().add_directive(config.level.into());

        if let Some(filters) = &config.target_filters {
            for filter in filters.split(',') {
                if let Ok(directive) = filter.trim().parse() {
                    env_filter = env_filter.add_directive(directive);
                }
            }
        }

        let registry = tracing_subscriber::registry().with(env_filter);

        let subscriber: Box<dyn Subscriber + Send + Sync> = if config.json_format {
            Box::new(
                registry.with(
                    fmt::layer()
                        .json()
                        .flatten_event(true)
                        .with_file(config.show_file_line)
                        .with_line_number(config.show_file_line)
                        .with_thread_names(config.show_thread_info)
                        .with_thread_ids(config.show_thread_info),
                ),
            )
        } else {
            let fmt_layer = fmt::layer()
                .with_ansi(atty::is(atty::Stream::Stdout))
                .with_file(config.show_file_line)
                .with_line_number(config.show_file_line)
                .with_thread_names(config.show_thread_info)
                .with_thread_ids(config.show_thread_info);
            if config.show_time {
                Box::new(registry.with(fmt_layer))
            } else {
                Box::new(registry.with(fmt_layer.without_time()))
            }
        };

        set_global_subscriber(subscriber);
    });
}

fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// INFO level, console output.
pub fn init_default() {
    init(LogConfig::default());
}

/// DEBUG level with envelope traffic at TRACE.
pub fn init_development() {
    init(LogConfig {
        level: Level::DEBUG,
        json_format: false,
        show_file_line: true,
        show_thread_info: true,
        show_time: true,
        target_filters: Some("embedrt=debug,embedrt::bridge=trace".to_string()),
    });
}

/// JSON output for log aggregation, no source locations.
pub fn init_production() {
    init(LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        show_time: true,
        target_filters: None,
    });
}

/// Warnings and errors only, compact.
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    });
}

/// Log a runtime lifecycle transition
///
/// ```rust,no_run
/// use embedrt::log_lifecycle;
///
/// log_lifecycle!("init", "suspended");
/// log_lifecycle!("shutdown", "finalized", brought_up = true);
/// ```
#[macro_export]
macro_rules! log_lifecycle {
    ($stage:expr, $event:expr) => {
        tracing::info!(stage = $stage, event = $event)
    };
    ($stage:expr, $event:expr, $($fields:tt)*) => {
        tracing::info!(stage = $stage, event = $event, $($fields)*)
    };
}

/// Log a thread pool event
///
/// ```rust,no_run
/// use embedrt::log_pool;
///
/// log_pool!("default", "started", threads = 4);
/// ```
#[macro_export]
macro_rules! log_pool {
    ($pool:expr, $event:expr) => {
        tracing::debug!(pool = $pool, event = $event)
    };
    ($pool:expr, $event:expr, $($fields:tt)*) => {
        tracing::debug!(pool = $pool, event = $event, $($fields)*)
    };
}

/// The dispatcher active on this thread, for handing to spawned threads.
#[inline]
pub fn current_subscriber() -> tracing::Dispatch {
    tracing::dispatcher::get_default(|d| d.clone())
}

pub use tracing::{debug, error, info, trace, warn};
