//! Structured JSONL logging plus human-readable stderr output.
//!
//! Dual-output logging:
//! - **JSONL to file** (`<KIT>/logs/orchestrator.jsonl`) - structured, for
//!   tooling to parse
//! - **Pretty to stderr** - human-readable for developers
//!
//! # Usage
//!
//! ```rust,ignore
//! let _guard = logging::init();
//! tracing::info!(event_type = "app_lifecycle", "Orchestrator started");
//! ```

use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::paths;

/// Maximum length for raw protocol payloads in logs. Keeps base64 blobs and
/// clipboard contents out of the log file.
const MAX_RAW_LOG_PREVIEW: usize = 200;

/// Guard that must be kept alive for the duration of the program.
/// Dropping this guard flushes and closes the log file.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initialize the dual-output logging system.
///
/// Returns a guard that MUST be kept alive for the duration of the program.
pub fn init() -> LoggingGuard {
    let log_dir = paths::logs_path();
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("[LOGGING] Failed to create log directory: {}", e);
    }

    let log_path = log_dir.join("orchestrator.jsonl");

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .unwrap_or_else(|e| {
            eprintln!("[LOGGING] Failed to open log file: {}", e);
            OpenOptions::new()
                .write(true)
                .open("/dev/null")
                .expect("Failed to open /dev/null")
        });

    // Non-blocking writer so a slow disk never stalls the event loop
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,notify=warn"));

    // JSONL layer for file output
    let json_layer = fmt::layer()
        .json()
        .with_writer(non_blocking_file)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE);

    // Pretty layer for stderr
    let pretty_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .init();

    tracing::info!(
        event_type = "app_lifecycle",
        action = "started",
        log_path = %log_path.display(),
        "Orchestrator logging initialized"
    );

    LoggingGuard {
        _file_guard: file_guard,
    }
}

/// Get the path to the JSONL log file
pub fn log_path() -> PathBuf {
    paths::logs_path().join("orchestrator.jsonl")
}

/// Categorized log line - the common form for component-level events.
///
/// Prefer tracing macros directly when you have structured fields:
/// ```rust,ignore
/// tracing::info!(pid = 42, "Worker assigned");
/// ```
pub fn log(category: &str, message: &str) {
    tracing::info!(category = category, "{}", message);
}

/// Truncated preview of a raw protocol payload for logging.
/// Returns the (possibly truncated) slice and the original length.
pub fn log_preview(raw: &str) -> (&str, usize) {
    let len = raw.len();
    if len > MAX_RAW_LOG_PREVIEW {
        (&raw[..MAX_RAW_LOG_PREVIEW], len)
    } else {
        (raw, len)
    }
}

/// Log an outbound protocol message with a truncated payload.
pub fn log_protocol_send(pid: u32, raw: &str) {
    let (preview, raw_len) = log_preview(raw);
    tracing::debug!(
        event_type = "protocol",
        direction = "send",
        pid = pid,
        raw_preview = %preview,
        raw_len = raw_len,
        "-> worker"
    );
}

/// Log an inbound protocol message by channel name and size.
pub fn log_protocol_recv(pid: u32, channel: &str, bytes: usize) {
    tracing::debug!(
        event_type = "protocol",
        direction = "recv",
        pid = pid,
        channel = channel,
        bytes = bytes,
        "<- worker"
    );
}
