use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

const LOG_FILE: &str = "operator.log";

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber for the server.
///
/// `RUST_LOG` overrides the configured level. The returned guard flushes the
/// file writer and must live as long as the process.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let level = if config.level.trim().is_empty() {
        "info"
    } else {
        config.level.as_str()
    };

    // `rolling::daily` panics if it cannot create the first file, so check
    // the directory is writable before handing it over.
    let mut guard = None;
    let file_layer = config.dir.as_deref().and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Warning: Could not create log directory {dir} ({e}), file logging disabled");
            return None;
        }
        let probe = std::path::Path::new(dir).join(".operator_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&probe)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&probe);
                let appender = tracing_appender::rolling::daily(dir, LOG_FILE);
                let (writer, file_guard) = tracing_appender::non_blocking(appender);
                guard = Some(file_guard);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!("Warning: Could not write to log directory {dir} ({e}), file logging disabled");
                None
            }
        }
    });

    let (json_layer, plain_layer) = if config.json {
        (
            Some(tracing_subscriber::fmt::layer().json().with_target(true)),
            None,
        )
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
        )
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(json_layer)
        .with(plain_layer)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, config.dir.as_deref()) {
        eprintln!("Logging to: {dir}/{LOG_FILE}");
    }

    guard
}

/// Minimal logging for one-shot CLI commands
pub fn init_logging_simple() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
