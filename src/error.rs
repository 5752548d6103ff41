//! Error types for rulemap.

use thiserror::Error;

/// Error type for rulemap operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Binary stream does not start with the expected section marker
    #[error("invalid magic: expected \"{expected}\" section marker")]
    BadMagic {
        /// The marker expected at the current stream position
        expected: &'static str,
    },

    /// Malformed ClassBench rule text
    #[error("parse error on line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// A rule with this id already exists in the model
    #[error("duplicate rule id: {0}")]
    DuplicateRuleId(u32),

    /// No rule with this id exists
    #[error("rule id not found: {0}")]
    RuleNotFound(u32),

    /// Index outside the valid range
    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Operation requires a non-empty rule set
    #[error("rule set is empty")]
    EmptyRuleSet,

    /// Generated mapping violated its own correctness invariant.
    /// This signals a bug in the generator, not a data problem.
    #[error("internal consistency failure: {0}")]
    Consistency(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for rulemap operations.
pub type Result<T> = std::result::Result<T, Error>;
