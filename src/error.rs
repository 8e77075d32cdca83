use std::fmt;
use std::io::Write;
use std::path::PathBuf;

pub const EXIT_OK: i32 = 0;
pub const EXIT_RUNTIME: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_CAPTURE: i32 = 127;

pub type CxResult<T> = Result<T, CxError>;

/// Writes one diagnostic line to stderr. Broken pipes are ignored so a
/// closed diagnostic stream never aborts an invocation.
#[macro_export]
macro_rules! cx_eprintln {
    ($($arg:tt)*) => {{
        $crate::error::write_diagnostic_line(&format!($($arg)*));
    }};
}

pub fn write_diagnostic_line(line: &str) {
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = writeln!(handle, "{line}");
    let _ = handle.flush();
}

#[derive(Debug)]
pub enum CxError {
    /// The wrapped command could not be started at all.
    Capture {
        command: String,
        source: std::io::Error,
    },
    BackendUnavailable {
        backend: String,
        message: String,
    },
    Persistence {
        path: PathBuf,
        message: String,
    },
    Io {
        context: String,
        source: std::io::Error,
    },
    JsonParse {
        context: String,
        source: serde_json::Error,
    },
    JsonLineParse {
        file: PathBuf,
        line: usize,
        content_preview: String,
        source: serde_json::Error,
    },
    NotFound {
        what: String,
    },
    InvalidData {
        context: String,
    },
}

impl CxError {
    pub fn invalid(context: impl Into<String>) -> Self {
        CxError::InvalidData {
            context: context.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        CxError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        CxError::JsonParse {
            context: context.into(),
            source,
        }
    }

    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        CxError::BackendUnavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        CxError::Persistence {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        CxError::NotFound { what: what.into() }
    }
}

impl fmt::Display for CxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CxError::Capture { command, source } => {
                write!(f, "failed to execute '{command}': {source}")
            }
            CxError::BackendUnavailable { backend, message } => {
                write!(f, "backend '{backend}' unavailable: {message}")
            }
            CxError::Persistence { path, message } => {
                write!(f, "failed to persist {}: {message}", path.display())
            }
            CxError::Io { context, source } => write!(f, "{context}: {source}"),
            CxError::JsonParse { context, source } => write!(f, "{context}: {source}"),
            CxError::JsonLineParse {
                file,
                line,
                content_preview,
                source,
            } => write!(
                f,
                "failed to parse json line {} in {} (preview='{}'): {}",
                line,
                file.display(),
                content_preview,
                source
            ),
            CxError::NotFound { what } => write!(f, "not found: {what}"),
            CxError::InvalidData { context } => write!(f, "{context}"),
        }
    }
}

impl std::error::Error for CxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CxError::Capture { source, .. } => Some(source),
            CxError::Io { source, .. } => Some(source),
            CxError::JsonParse { source, .. } => Some(source),
            CxError::JsonLineParse { source, .. } => Some(source),
            CxError::BackendUnavailable { .. }
            | CxError::Persistence { .. }
            | CxError::NotFound { .. }
            | CxError::InvalidData { .. } => None,
        }
    }
}

pub fn format_error(cmd: &str, msg: &str) -> String {
    if cmd.is_empty() {
        format!("{}: {msg}", crate::config::APP_NAME)
    } else {
        format!("{} {cmd}: {msg}", crate::config::APP_NAME)
    }
}

pub fn print_runtime_error(cmd: &str, msg: &str) -> i32 {
    crate::cx_eprintln!("{}", format_error(cmd, msg));
    EXIT_RUNTIME
}

pub fn print_usage_error(cmd: &str, usage: &str) -> i32 {
    crate::cx_eprintln!("{}", format_error(cmd, &format!("usage: {usage}")));
    EXIT_USAGE
}
