use std::{fmt, io, path::PathBuf, process::ExitStatus};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("project root {project} is missing {file}; it must contain both Project.toml and Manifest.toml")]
    MissingDependencyFile { project: PathBuf, file: &'static str },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed to launch {program:?}: {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type RunnerResult<T> = Result<T, RunnerError>;

impl RunnerError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_argument(details: impl fmt::Display) -> Self {
        Self::InvalidArgument(details.to_string())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingDependencyFile { .. } | Self::InvalidArgument(_)
        )
    }

    /// Process exit code used by the `covrun` binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::MissingDependencyFile { .. } | Self::InvalidArgument(_) => 2,
            Self::Launch { .. } => 3,
            Self::Io { .. } => 1,
        }
    }
}

/// A malformed line in one coverage artifact. Scoped to that artifact only.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{path:?} line {line}: unparseable count field {field:?}")]
    Count {
        path: PathBuf,
        line: usize,
        field: String,
    },
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ParseError {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Count { path, .. } | Self::Read { path, .. } => path,
        }
    }
}

/// Failures of the external HTML report generator. Always warning level for a
/// test run.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report tool {tool:?} is unavailable: {reason}")]
    ToolUnavailable { tool: PathBuf, reason: String },
    #[error("report tool {tool:?} exited with {status}")]
    ToolFailed { tool: PathBuf, status: ExitStatus },
    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ReportError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn unavailable(tool: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::ToolUnavailable {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }
}
