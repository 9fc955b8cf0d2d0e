//! Rolling file logs for BLIMS processes.
//!
//! # Responsibility
//! - Start `flexi_logger` once per process from a validated `LimsConfig`.
//! - Route panics into the log before the default hook runs.
//!
//! # Invariants
//! - BLIMS crates log at the configured level; dependencies only at `warn`.
//! - A second call with the same level and directory is a no-op; any other
//!   combination is rejected.
//! - Events never carry sample names or metadata values, only ids and codes.

use crate::config::LimsConfig;
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "blims";
const LOGGED_CRATES: &[&str] = &["blims_core", "blims_cli"];
const DEPENDENCY_LEVEL: &str = "warn";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static ACTIVE_LOGGER: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK_INSTALLED: OnceCell<()> = OnceCell::new();

struct ActiveLogger {
    spec: String,
    log_dir: PathBuf,
    _handle: LoggerHandle,
}

impl ActiveLogger {
    fn ensure_same(&self, spec: &str, log_dir: &Path) -> Result<(), String> {
        if self.log_dir != log_dir {
            return Err(format!(
                "logging already writes to `{}`; refusing to switch to `{}`",
                self.log_dir.display(),
                log_dir.display()
            ));
        }
        if self.spec != spec {
            return Err(format!(
                "logging already runs with `{}`; refusing to switch to `{}`",
                self.spec, spec
            ));
        }
        Ok(())
    }
}

/// Starts file logging as described by `config`.
///
/// Returns `Ok(false)` when `log_dir` is unset and nothing was started.
///
/// # Errors
/// - `config` fails `LimsConfig::validate`.
/// - Logging already runs with another level or directory.
/// - The directory cannot be created or the backend fails to start.
pub fn init_logging(config: &LimsConfig) -> Result<bool, String> {
    let Some(log_dir) = config.log_dir.as_deref() else {
        return Ok(false);
    };
    config.validate().map_err(|err| err.to_string())?;
    let level = config.log_level_name().map_err(|err| err.to_string())?;
    let spec = log_spec(level);

    if let Some(active) = ACTIVE_LOGGER.get() {
        return active.ensure_same(&spec, log_dir).map(|()| true);
    }

    let active = ACTIVE_LOGGER.get_or_try_init(|| start_logger(&spec, log_dir, config))?;
    active.ensure_same(&spec, log_dir)?;
    Ok(true)
}

fn start_logger(spec: &str, log_dir: &Path, config: &LimsConfig) -> Result<ActiveLogger, String> {
    std::fs::create_dir_all(log_dir).map_err(|err| {
        format!(
            "failed to create log directory `{}`: {err}",
            log_dir.display()
        )
    })?;

    let handle = Logger::try_with_str(spec)
        .map_err(|err| format!("invalid log spec `{spec}`: {err}"))?
        .log_to_file(
            FileSpec::default()
                .directory(log_dir)
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    install_panic_hook_once();

    info!(
        "event=logging_start module=core status=ok version={} spec=\"{}\" log_dir={} code_prefix={} traversal={:?} max_depth={}",
        env!("CARGO_PKG_VERSION"),
        spec,
        log_dir.display(),
        config.human_code_prefix,
        config.lineage_traversal,
        config.max_hierarchy_depth
    );

    Ok(ActiveLogger {
        spec: spec.to_string(),
        log_dir: log_dir.to_path_buf(),
        _handle: handle,
    })
}

// "warn, blims_core=debug, blims_cli=debug"
fn log_spec(level: &str) -> String {
    let mut spec = DEPENDENCY_LEVEL.to_string();
    for crate_name in LOGGED_CRATES {
        spec.push_str(&format!(", {crate_name}={level}"));
    }
    spec
}

fn install_panic_hook_once() {
    if PANIC_HOOK_INSTALLED.set(()).is_err() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = if let Some(message) = panic_info.payload().downcast_ref::<&str>() {
            single_line(message, MAX_PANIC_PAYLOAD_CHARS)
        } else if let Some(message) = panic_info.payload().downcast_ref::<String>() {
            single_line(message, MAX_PANIC_PAYLOAD_CHARS)
        } else {
            "non-string panic payload".to_string()
        };
        error!(
            "event=panic_captured module=core status=error location={} payload={}",
            location, payload
        );
        previous_hook(panic_info);
    }));
}

fn single_line(value: &str, max_chars: usize) -> String {
    let mut line: String = value
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .take(max_chars)
        .collect();
    if value.chars().count() > max_chars {
        line.push_str("...");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::{init_logging, log_spec, single_line};
    use crate::config::LimsConfig;

    #[test]
    fn spec_keeps_dependencies_at_warn() {
        assert_eq!(
            log_spec("debug"),
            "warn, blims_core=debug, blims_cli=debug"
        );
    }

    #[test]
    fn single_line_strips_breaks_and_truncates() {
        let line = single_line("line1\nline2\rline3", 8);
        assert_eq!(line, "line1 li...");
        assert_eq!(single_line("short", 8), "short");
    }

    #[test]
    fn config_without_log_dir_skips_file_logging() {
        let config = LimsConfig {
            log_dir: None,
            ..LimsConfig::default()
        };
        assert_eq!(init_logging(&config), Ok(false));
    }

    #[test]
    fn relative_log_dir_is_rejected_before_starting() {
        let config = LimsConfig {
            log_dir: Some("logs/dev".into()),
            ..LimsConfig::default()
        };
        let error = init_logging(&config).unwrap_err();
        assert!(error.contains("absolute"));
    }

    #[test]
    fn repeated_init_is_idempotent_and_rejects_changes() {
        // The logger outlives the test, so its directory is not cleaned up.
        let log_dir = std::env::temp_dir().join(format!("blims-logging-{}", std::process::id()));
        let config = LimsConfig {
            log_level: "info".to_string(),
            log_dir: Some(log_dir.clone()),
            ..LimsConfig::default()
        };

        assert_eq!(init_logging(&config), Ok(true));
        assert_eq!(init_logging(&config), Ok(true));

        let louder = LimsConfig {
            log_level: "debug".to_string(),
            ..config.clone()
        };
        assert!(init_logging(&louder).unwrap_err().contains("refusing to switch"));

        let elsewhere = LimsConfig {
            log_dir: Some(log_dir.join("other")),
            ..config.clone()
        };
        assert!(init_logging(&elsewhere)
            .unwrap_err()
            .contains("refusing to switch"));
    }
}
