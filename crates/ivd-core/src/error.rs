//! Error types for the IVD runtime.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Failures while back-solving an expression for its weak term.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionError {
    /// A zero divisor made the inverted operation undefined.
    #[error("division by zero while solving for a weak term")]
    DivisionByZero,

    /// The expression carries no weak term to write through.
    #[error("expression has no weak term to solve for")]
    NotWeak,
}

/// Syntax error inside one expression or state-expression string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (column {column})")]
pub struct ParseError {
    /// Zero-based character offset into the parsed string.
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(column: usize, message: impl Into<String>) -> Self {
        Self { column, message: message.into() }
    }
}

/// One collected problem in an element document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    /// One-based line of the offending JSON value, 0 when unknown.
    pub line: usize,
    /// One-based column of the caret.
    pub column: usize,
    pub source_line: String,
    pub message: String,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "line {}: {}", self.line, self.message)?;
        if !self.source_line.is_empty() {
            writeln!(f, "    {}", self.source_line)?;
            writeln!(f, "    {}^", " ".repeat(self.column.saturating_sub(1)))?;
        }
        Ok(())
    }
}

/// Renders every collected error as one human readable block.
pub fn digest(errors: &[CompileError]) -> String {
    errors.iter().map(ToString::to_string).collect()
}

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("could not read element document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed element document at line {line}, column {column}: {message}")]
    Syntax { line: usize, column: usize, message: String },

    #[error("element document has {} compile error(s):\n{}", .0.len(), digest(.0))]
    Compile(Vec<CompileError>),
}

impl DocumentError {
    pub fn status(&self) -> LoadStatus {
        match self {
            DocumentError::Io { .. } => LoadStatus::FileNotFound,
            DocumentError::Syntax { .. } | DocumentError::Compile(_) => LoadStatus::CompileError,
        }
    }
}

/// Misuse of the model API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("model misconfigured: {0}")]
    Misconfigured(String),

    /// The handle refers to a slot that has since been freed or reused.
    #[error("stale model handle")]
    StaleHandle,
}

/// Outcome of loading an element document, mirrored by the C status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Success,
    FileNotFound,
    CompileError,
}

impl LoadStatus {
    pub fn as_status_code(self) -> i32 {
        match self {
            LoadStatus::Success => 0,
            LoadStatus::FileNotFound => 1,
            LoadStatus::CompileError => 2,
        }
    }
}
