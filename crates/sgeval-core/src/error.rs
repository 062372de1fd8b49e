//! Error types for the sgeval evaluation engine.
//!
//! Errors are split by where they originate: configuration loading, batch
//! ingestion (caller-supplied arrays), and lookup tables read from disk.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for sgeval operations.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed prediction or target batch
    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    /// A triplet table, class-weight vector or label file could not be used
    #[error("Table error for {path}: {message}")]
    Table { path: PathBuf, message: String },

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Errors raised while validating or converting an input batch.
///
/// A batch that fails validation is rejected as a whole; nothing from it is
/// committed to the window.
#[derive(Error, Debug, PartialEq)]
pub enum BatchError {
    /// Two columns of the same batch disagree on the number of rows
    #[error("Column `{column}` has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Relation score matrix does not span the relation taxonomy
    #[error("Relation scores have {actual} columns, taxonomy has {expected} relations")]
    ScoreWidth { expected: usize, actual: usize },

    /// Super-relation score matrix must have one column per super-category
    #[error("Super-relation scores have {actual} columns, expected 3")]
    SuperScoreWidth { actual: usize },

    /// Score rows of a wire record have different lengths
    #[error("Score row {row} has {actual} values, expected {expected}")]
    RaggedScores {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// Target relation id is outside the taxonomy
    #[error("Relation id {relation} is out of range (num_relations = {num_relations})")]
    RelationOutOfRange {
        relation: usize,
        num_relations: usize,
    },

    /// Negative relation id other than the `-1` "not annotated" sentinel
    #[error("Invalid relation id {0}: only -1 may be negative")]
    InvalidRelation(i64),

    /// Top-3 ranking needs the geometric/possessive/semantic split
    #[error("Top-3 ranking requires a hierarchical relation taxonomy")]
    FlatTaxonomy,
}

/// Convenience type alias for sgeval results.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Convenience type alias for batch-ingestion results.
pub type BatchResult<T> = std::result::Result<T, BatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch_message_names_column() {
        let err = BatchError::LengthMismatch {
            column: "subject_box",
            expected: 4,
            actual: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("subject_box"));
        assert!(msg.contains('4'));
    }

    #[test]
    fn test_batch_error_converts_to_eval_error() {
        let err: EvalError = BatchError::FlatTaxonomy.into();
        assert!(err.to_string().starts_with("Batch error"));
    }
}
