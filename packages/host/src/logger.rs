//! Logging for the host process.
//!
//! Dual output (colored stdout + optional file), initialized once by the
//! embedding binary. Guest log records arriving over `log:message` are
//! forwarded into the same dispatcher via [`log_guest_record`].

use std::io::stdout;
use std::path::Path;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use fern::Dispatch;
use fern::colors::Color::{Blue, Green, Magenta, Red, Yellow};
use fern::colors::ColoredLevelConfig;
use humantime::format_rfc3339;
use log::{Level, LevelFilter, warn};
use serde_json::Value;

use crate::error::{HostError, HostResult};

static INIT_ONCE: Once = Once::new();
static ALREADY_CALLED: AtomicBool = AtomicBool::new(false);

/// Log file name inside the application data directory.
const LOG_FILE_NAME: &str = "gaze.log";

#[cfg(debug_assertions)]
const LOG_LEVEL: LevelFilter = LevelFilter::Debug;

#[cfg(not(debug_assertions))]
const LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// Initializes the logger.
///
/// Safe to call more than once; later calls warn and return Ok. When
/// `log_dir` is `None` only the stdout sink is installed.
///
/// # Errors
///
/// Returns an error when the log file cannot be created or the dispatcher
/// fails to apply.
pub fn initialize(log_dir: Option<&Path>) -> HostResult<()> {
    if ALREADY_CALLED.swap(true, Ordering::SeqCst) {
        warn!("logger already initialized");
        return Ok(());
    }

    let mut result = Ok(());
    INIT_ONCE.call_once(|| {
        result = initialize_internal(log_dir);
    });
    result
}

fn initialize_internal(log_dir: Option<&Path>) -> HostResult<()> {
    let colors = ColoredLevelConfig::new()
        .debug(Blue)
        .info(Green)
        .warn(Yellow)
        .error(Red)
        .trace(Magenta);

    let stdout_dispatch = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{date} - {level}] {target}: {message}",
                date = format_rfc3339(SystemTime::now()),
                level = colors.color(record.level()),
                target = record.target(),
                message = message,
            ))
        })
        .chain(stdout());

    let mut dispatch = Dispatch::new().level(LOG_LEVEL).chain(stdout_dispatch);

    if let Some(dir) = log_dir {
        let file_dispatch = Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "[{date} - {level}] {target}: {message}",
                    date = format_rfc3339(SystemTime::now()),
                    level = record.level(),
                    target = record.target(),
                    message = message,
                ))
            })
            .chain(fern::log_file(dir.join(LOG_FILE_NAME))?);
        dispatch = dispatch.chain(file_dispatch);
    }

    dispatch
        .apply()
        .map_err(|err| HostError::Handler(format!("failed to initialize logger: {err}")))?;

    Ok(())
}

/// Forwards a guest log record into the host logger.
///
/// The payload is the `log:message` shape: `{ level, message, context? }`.
/// Unknown levels fall back to `info`.
pub fn log_guest_record(source: &str, payload: &Value) {
    let level = payload["level"]
        .as_str()
        .and_then(|name| match name {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            _ => None,
        })
        .unwrap_or(Level::Info);

    let message = payload["message"].as_str().unwrap_or("<non-string log message>");

    match payload.get("context") {
        Some(context) if !context.is_null() => {
            log::log!(target: "guest", level, "[{source}] {message} {context}");
        }
        _ => log::log!(target: "guest", level, "[{source}] {message}"),
    }
}
