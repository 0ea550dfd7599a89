//! Script loading and execution error types

use http::StatusCode;
use rhai::{EvalAltResult, ParseError, Position};
use std::any::Any;
use std::fmt;
use std::path::Path;

/// Message used when a fault carries no usable message
pub const UNKNOWN_FAULT: &str = "unknown error";

/// Failure to turn a script identity into a compiled unit
#[derive(Debug, Clone)]
pub enum LoadError {
    /// Script text failed to compile
    Compile {
        /// Chunk name the code was compiled under
        chunk: String,
        /// Parser message
        message: String,
        /// Line number if available
        line: Option<usize>,
        /// Column number if available
        column: Option<usize>,
    },

    /// Script file could not be read
    Io {
        /// File path
        path: String,
        /// Error message
        message: String,
    },

    /// Source is unusable for another reason
    InvalidSource {
        /// Error message
        message: String,
    },
}

impl LoadError {
    /// Create a compile error from a parser error
    pub fn compile(chunk: impl Into<String>, err: &ParseError) -> Self {
        let pos = err.position();
        Self::Compile {
            chunk: chunk.into(),
            message: err.err_type().to_string(),
            line: pos.line(),
            column: pos.position(),
        }
    }

    /// Create an IO error for `path`
    pub fn io(path: &Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Create an invalid source error
    pub fn invalid_source<S: Into<String>>(message: S) -> Self {
        Self::InvalidSource {
            message: message.into(),
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compile {
                chunk,
                message,
                line,
                column,
            } => {
                write!(f, "{chunk}: {message}")?;
                if let Some(line) = line {
                    write!(f, " at line {line}")?;
                    if let Some(col) = column {
                        write!(f, ", column {col}")?;
                    }
                }
                Ok(())
            }
            Self::Io { path, message } => write!(f, "cannot open {path}: {message}"),
            Self::InvalidSource { message } => write!(f, "invalid script source: {message}"),
        }
    }
}

impl std::error::Error for LoadError {}

/// Failure of the hook machinery itself, as opposed to a fault raised by script code
#[derive(Debug, Clone, thiserror::Error)]
pub enum FrameworkError {
    /// The script could not be loaded or compiled
    #[error("failed to load header filter script: {0}")]
    Load(#[from] LoadError),

    /// The per-request script path could not be computed
    #[error("failed to resolve header filter script path: {0}")]
    PathResolution(String),
}

impl FrameworkError {
    /// Status the request is aborted with
    pub fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Kind of fault caught by the sandbox fault barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Error raised while evaluating script code
    Runtime,
    /// An engine resource limit was hit
    Limit,
    /// A host capability panicked
    Panic,
}

/// A fault raised during script execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultInfo {
    /// What went wrong
    pub kind: FaultKind,
    /// Error message, if the fault carried a printable one
    pub message: Option<String>,
    /// Script line where the fault occurred
    pub line: Option<usize>,
}

impl FaultInfo {
    /// Build from a caught panic payload
    pub fn panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned());
        Self {
            kind: FaultKind::Panic,
            message,
            line: None,
        }
    }

    /// Message to report, substituting a placeholder when none is available
    pub fn message_or_placeholder(&self) -> String {
        match self.message.as_deref() {
            Some(msg) if !msg.is_empty() => msg.to_string(),
            _ => UNKNOWN_FAULT.to_string(),
        }
    }
}

impl fmt::Display for FaultInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message_or_placeholder())
    }
}

impl std::error::Error for FaultInfo {}

fn line_of(pos: Position) -> Option<usize> {
    if pos.is_none() {
        None
    } else {
        pos.line()
    }
}

impl From<Box<EvalAltResult>> for FaultInfo {
    fn from(err: Box<EvalAltResult>) -> Self {
        let line = line_of(err.position());
        match *err {
            // `throw` with a value: report the value itself
            EvalAltResult::ErrorRuntime(ref value, _) => {
                let message = if value.is_unit() {
                    None
                } else if value.is_string() {
                    value.clone().into_string().ok()
                } else {
                    Some(value.to_string())
                };
                Self {
                    kind: FaultKind::Runtime,
                    message,
                    line,
                }
            }
            EvalAltResult::ErrorTooManyOperations(_)
            | EvalAltResult::ErrorStackOverflow(_)
            | EvalAltResult::ErrorDataTooLarge(..)
            | EvalAltResult::ErrorTooManyModules(_) => Self {
                kind: FaultKind::Limit,
                message: Some(err.to_string()),
                line,
            },
            _ => Self {
                kind: FaultKind::Runtime,
                message: Some(err.to_string()),
                line,
            },
        }
    }
}

/// Error raised by a proxy mapping write
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ProxyError(pub String);

impl ProxyError {
    /// Create a proxy error
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self(message.into())
    }
}

impl From<ProxyError> for Box<EvalAltResult> {
    fn from(err: ProxyError) -> Self {
        err.0.into()
    }
}
