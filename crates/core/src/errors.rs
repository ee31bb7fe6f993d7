use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for bestflags operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for bestflags operations.
///
/// Compile and execution failures are not represented here; they are
/// recorded on a task as [`CompileError`] and [`ExecutionError`] values.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration errors
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Flag catalog parse errors
    #[error("invalid flag spec on line {line} ('{content}'): {message}")]
    FlagSpecParse {
        line: usize,
        content: String,
        message: String,
    },

    /// File system operations
    #[error("file system {operation} operation failed for '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// A state machine was asked to make a transition it does not allow
    #[error("illegal {entity} transition from {from} to {to}")]
    IllegalTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// An operation needed every task resolved but some were still in flight
    #[error("cannot {operation}: {pending} task(s) not yet resolved")]
    Unresolved { operation: String, pending: usize },

    /// The memoization cache observed a state it must never reach
    #[error("cache invariant violated for key {key}: {message}")]
    CacheInvariant { key: String, message: String },

    /// Queue or stage protocol violations
    #[error("pipeline stage '{stage}' fault: {message}")]
    Pipeline { stage: String, message: String },

    /// A collaborator could not be set up at all (as opposed to failing a build or run)
    #[error("collaborator '{collaborator}' error: {message}")]
    Collaborator {
        collaborator: String,
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Create a flag catalog parse error
    #[must_use]
    pub fn flag_spec_parse(
        line: usize,
        content: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::FlagSpecParse {
            line,
            content: content.into(),
            message: message.into(),
        }
    }

    /// Create a file system error with context
    #[must_use]
    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Create an illegal transition error
    #[must_use]
    pub fn illegal_transition(
        entity: &'static str,
        from: impl fmt::Debug,
        to: impl fmt::Debug,
    ) -> Self {
        Error::IllegalTransition {
            entity,
            from: format!("{from:?}"),
            to: format!("{to:?}"),
        }
    }

    /// Create an unresolved-pool error
    #[must_use]
    pub fn unresolved(operation: impl Into<String>, pending: usize) -> Self {
        Error::Unresolved {
            operation: operation.into(),
            pending,
        }
    }

    /// Create a cache invariant error
    #[must_use]
    pub fn cache_invariant(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::CacheInvariant {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a pipeline protocol error
    #[must_use]
    pub fn pipeline(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Pipeline {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create a collaborator setup error
    #[must_use]
    pub fn collaborator(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Collaborator {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    /// Whether this error signals a programming defect rather than bad input.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::IllegalTransition { .. }
                | Error::Unresolved { .. }
                | Error::CacheInvariant { .. }
                | Error::Pipeline { .. }
        )
    }
}

/// How an external collaborator failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollaboratorFailure {
    /// The collaborator ran and reported failure (e.g. non-zero exit)
    Failed { exit_code: Option<i32> },
    /// The collaborator exceeded its time budget and was killed
    TimedOut { after: Duration },
    /// The collaborator could not be started
    Spawn,
    /// The collaborator finished but its output could not be interpreted
    InvalidOutput,
}

impl fmt::Display for CollaboratorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollaboratorFailure::Failed {
                exit_code: Some(code),
            } => write!(f, "exit code {code}"),
            CollaboratorFailure::Failed { exit_code: None } => write!(f, "terminated by signal"),
            CollaboratorFailure::TimedOut { after } => write!(f, "timed out after {after:?}"),
            CollaboratorFailure::Spawn => write!(f, "spawn failure"),
            CollaboratorFailure::InvalidOutput => write!(f, "invalid output"),
        }
    }
}

/// A compile collaborator's failure for one flag set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("compile failed ({kind}): {message}")]
pub struct CompileError {
    pub kind: CollaboratorFailure,
    pub message: String,
}

impl CompileError {
    #[must_use]
    pub fn new(kind: CollaboratorFailure, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A run collaborator's failure for one artifact
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("execution failed ({kind}): {message}")]
pub struct ExecutionError {
    pub kind: CollaboratorFailure,
    pub message: String,
}

impl ExecutionError {
    #[must_use]
    pub fn new(kind: CollaboratorFailure, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
