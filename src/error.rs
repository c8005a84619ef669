//! Error taxonomy (spec.md §7), generalizing the teacher's
//! `SqlError{rname, line, column, msg}` to GQL's file-less scripts and
//! REPL one-liners.

use thiserror::Error;

/// Line/column position within a source string (1-based, matching the
/// teacher's `Parser` convention).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for SourcePos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {} column {}", self.line, self.column)
    }
}

/// The full error taxonomy of spec.md §7.
#[derive(Debug, Error)]
pub enum GqlError {
    /// Lexer/grammar failure — query aborts before evaluation begins.
    #[error("parse error at {pos}: {msg}")]
    Parse { pos: SourcePos, msg: String },

    /// A built-in's declared type rule rejected an argument expression.
    #[error("type error at {pos} in `{expr}`: {msg}")]
    Type {
        pos: SourcePos,
        expr: String,
        msg: String,
    },

    /// Value-domain failure during evaluation (wrong variant, missing
    /// field, etc.), with the call-site position and source text.
    #[error("evaluation error at {pos} in `{expr}`: {msg}")]
    Eval {
        pos: SourcePos,
        expr: String,
        msg: String,
    },

    /// Read/write/list/stat failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A cache entry failed to unmarshal; the entry has been discarded and
    /// the caller should re-materialize.
    #[error("cache corruption for {hex}: {msg}")]
    CacheCorruption { hex: String, msg: String },

    /// The process-wide interrupt fired mid-query.
    #[error("interrupted")]
    Interrupted,

    /// An unexpected internal inconsistency was caught at a process
    /// boundary (spec.md §7: "fatal programmer error") rather than being
    /// allowed to unwind past the caller as a raw panic.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GqlError>;
