//! Rolling file logs for the reminder engine.
//!
//! # Responsibility
//! - Start one `flexi_logger` backend per process and report what is active.
//! - Route panics into the log with a flattened, capped payload.
//!
//! # Invariants
//! - Repeating init with the same level and directory is a no-op.
//! - A second init with another level or directory fails and changes nothing.
//! - Engine events carry IDs, module names and reason codes, never reminder
//!   titles or bodies.

use flexi_logger::{
    detailed_format, Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info, LevelFilter};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const LOG_BASENAME: &str = "remindhub";
const MAX_PANIC_CHARS: usize = 160;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

struct ActiveLogger {
    level: LevelFilter,
    dir: PathBuf,
    _handle: LoggerHandle,
}

pub type LoggingResult<T> = Result<T, LoggingError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    UnknownLevel(String),
    InvalidDirectory(String),
    Backend(String),
    /// Already running with a different level or directory.
    Conflict { active: String, requested: String },
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::InvalidDirectory(message) => write!(f, "invalid log directory: {message}"),
            Self::Backend(message) => write!(f, "logger backend failed: {message}"),
            Self::Conflict { active, requested } => write!(
                f,
                "logging already active with {active}; refusing to switch to {requested}"
            ),
        }
    }
}

impl Error for LoggingError {}

/// Level, directory and rotation for [`init_logging_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingOptions {
    pub level: String,
    /// Must be absolute; created when missing.
    pub log_dir: String,
    pub rotate_at_bytes: u64,
    pub keep_files: usize,
}

impl LoggingOptions {
    /// 10 MiB files, five kept.
    pub fn new(level: impl Into<String>, log_dir: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            log_dir: log_dir.into(),
            rotate_at_bytes: 10 * 1024 * 1024,
            keep_files: 5,
        }
    }
}

/// String-error form used across the FFI boundary.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), String> {
    init_logging_with(&LoggingOptions::new(level, log_dir)).map_err(|err| err.to_string())
}

pub fn init_logging_with(options: &LoggingOptions) -> LoggingResult<()> {
    let level = parse_level(&options.level)?;
    let dir = parse_dir(&options.log_dir)?;

    let active = ACTIVE.get_or_try_init(|| start(level, &dir, options))?;
    if active.level != level {
        return Err(LoggingError::Conflict {
            active: format!("level `{}`", level_name(active.level)),
            requested: format!("level `{}`", level_name(level)),
        });
    }
    if active.dir != dir {
        return Err(LoggingError::Conflict {
            active: format!("directory `{}`", active.dir.display()),
            requested: format!("directory `{}`", dir.display()),
        });
    }
    Ok(())
}

/// Active level and directory, if logging was started.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    ACTIVE
        .get()
        .map(|active| (level_name(active.level), active.dir.clone()))
}

/// `debug` in debug builds, `info` otherwise.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start(
    level: LevelFilter,
    dir: &Path,
    options: &LoggingOptions,
) -> LoggingResult<ActiveLogger> {
    std::fs::create_dir_all(dir)
        .map_err(|err| LoggingError::InvalidDirectory(format!("{}: {err}", dir.display())))?;

    let handle = Logger::try_with_str(level_name(level))
        .map_err(|err| LoggingError::Backend(err.to_string()))?
        .log_to_file(FileSpec::default().directory(dir).basename(LOG_BASENAME))
        .rotate(
            Criterion::Size(options.rotate_at_bytes.max(1)),
            Naming::Numbers,
            Cleanup::KeepLogFiles(options.keep_files.max(1)),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(detailed_format)
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))?;

    install_panic_hook();
    info!(
        "event=logging_init module=core status=ok level={} log_dir={} os={} version={}",
        level_name(level),
        dir.display(),
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION")
    );
    Ok(ActiveLogger {
        level,
        dir: dir.to_path_buf(),
        _handle: handle,
    })
}

fn parse_level(raw: &str) -> LoggingResult<LevelFilter> {
    let trimmed = raw.trim();
    let candidate = if trimmed.eq_ignore_ascii_case("warning") {
        "warn"
    } else {
        trimmed
    };
    match LevelFilter::from_str(candidate) {
        Ok(LevelFilter::Off) | Err(_) => Err(LoggingError::UnknownLevel(trimmed.to_string())),
        Ok(level) => Ok(level),
    }
}

fn parse_dir(raw: &str) -> LoggingResult<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(LoggingError::InvalidDirectory("empty path".to_string()));
    }
    let path = PathBuf::from(trimmed);
    if !path.is_absolute() {
        return Err(LoggingError::InvalidDirectory(format!(
            "`{trimmed}` is not absolute"
        )));
    }
    Ok(path)
}

fn level_name(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}

fn install_panic_hook() {
    if PANIC_HOOK.set(()).is_err() {
        return;
    }
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info.location().map_or_else(
            || "unknown".to_string(),
            |loc| format!("{}:{}", loc.file(), loc.line()),
        );
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(
            "event=panic module=core status=error location={} payload={}",
            location,
            sanitize_message(&payload, MAX_PANIC_CHARS)
        );
        previous(info);
    }));
}

/// Flattens line breaks and caps the text at `max_chars`, marking the cut
/// with `...`.
pub(crate) fn sanitize_message(value: &str, max_chars: usize) -> String {
    let flat = value.replace(['\n', '\r'], " ");
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        init_logging, init_logging_with, logging_status, parse_dir, parse_level,
        sanitize_message, LoggingError, LoggingOptions,
    };
    use log::LevelFilter;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_dir(tag: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock after epoch")
            .as_nanos();
        std::env::temp_dir()
            .join(format!("remindhub-log-{tag}-{}-{nanos}", std::process::id()))
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(parse_level(" Warning ").expect("warning"), LevelFilter::Warn);
        assert_eq!(parse_level("DEBUG").expect("debug"), LevelFilter::Debug);
        assert_eq!(
            parse_level("off"),
            Err(LoggingError::UnknownLevel("off".to_string()))
        );
        assert!(parse_level("verbose").is_err());
    }

    #[test]
    fn relative_and_blank_dirs_are_rejected() {
        assert!(parse_dir("  ").is_err());
        let err = parse_dir("logs/dev").expect_err("relative");
        assert!(err.to_string().contains("not absolute"));
    }

    #[test]
    fn sanitize_flattens_and_caps() {
        let cut = sanitize_message("rent due\nbill paid\r", 8);
        assert_eq!(cut, "rent due...");
        assert_eq!(sanitize_message("short", 8), "short");
    }

    #[test]
    fn second_init_must_match_the_first() {
        let dir = scratch_dir("active");
        init_logging("info", &dir).expect("first init");
        init_logging_with(&LoggingOptions::new("INFO", dir.clone())).expect("same config");

        let level = init_logging("debug", &dir).expect_err("level change");
        assert!(level.contains("refusing to switch"));
        let other = init_logging("info", &scratch_dir("other")).expect_err("dir change");
        assert!(other.contains("refusing to switch"));

        let (level, active_dir) = logging_status().expect("active");
        assert_eq!(level, "info");
        assert_eq!(active_dir.to_string_lossy(), dir);
    }
}
