//! Error types for metadata conversion and policy validation

use thiserror::Error;

/// Metadata errors
///
/// Extraction and context lookups never fail; these only come from the edges
/// where metadata is turned into wire headers or a policy is loaded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("Invalid metadata key: {0:?}")]
    InvalidKey(String),

    #[error("Invalid metadata value for key {key:?}")]
    InvalidValue { key: String },

    #[error("Invalid header rule: {0}")]
    InvalidRule(String),
}

/// Result type for metadata operations
pub type MetadataResult<T> = Result<T, MetadataError>;
