//! Unified adapter error model.
//! Every operation returns [`AdapterError`]; store-level causes are kept as sources so callers
//! can inspect the underlying Redis (or in-memory) failure.

use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Which mutating step of an operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    /// First half of the save transaction (drop the previous list).
    DeleteOld,
    /// Second half of the save transaction (append the new records).
    Save,
    /// Plain key deletion (empty save, clear).
    Delete,
    Add,
    Remove,
}

impl Display for WriteStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WriteStep::DeleteOld => "failed to delete old policy",
            WriteStep::Save => "failed to save policy",
            WriteStep::Delete => "failed to delete policy",
            WriteStep::Add => "failed to add policy",
            WriteStep::Remove => "failed to remove policy",
        };
        f.write_str(s)
    }
}

/// Failure reported by a [`crate::storage::ListStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
    #[error("store unavailable")]
    Unavailable,
    #[error("store rejected write: {0}")]
    Rejected(String),
}

/// Why a single record could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("unterminated quoted field")]
    UnterminatedQuote,
    #[error("record has no policy type")]
    MissingPtype,
    #[error("policy type {0:?} is not defined in the model")]
    UnknownPtype(String),
    #[error("record is not valid UTF-8")]
    InvalidUtf8,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid adapter configuration: {0}")]
    Config(String),
    #[error("failed to ping store: {0}")]
    Connection(#[source] StoreError),
    #[error("failed to load policy: {0}")]
    StoreRead(#[source] StoreError),
    #[error("{step}: {source}")]
    StoreWrite { step: WriteStep, #[source] source: StoreError },
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("malformed policy record {line:?}: {source}")]
    MalformedRecord { line: String, #[source] source: LineError },
}

impl AdapterError {
    pub fn config<S: Into<String>>(msg: S) -> Self { AdapterError::Config(msg.into()) }
    pub fn write(step: WriteStep, source: impl Into<StoreError>) -> Self { AdapterError::StoreWrite { step, source: source.into() } }
    pub fn malformed<S: Into<String>>(line: S, source: LineError) -> Self { AdapterError::MalformedRecord { line: line.into(), source } }

    /// Stable machine-readable code, one per taxonomy entry.
    pub fn code_str(&self) -> &'static str {
        match self {
            AdapterError::Config(_) => "config_error",
            AdapterError::Connection(_) => "connection_error",
            AdapterError::StoreRead(_) => "store_read_error",
            AdapterError::StoreWrite { .. } => "store_write_error",
            AdapterError::NotImplemented(_) => "not_implemented",
            AdapterError::MalformedRecord { .. } => "malformed_record",
        }
    }

    /// The failed write step, if this is a write error.
    pub fn write_step(&self) -> Option<WriteStep> {
        match self {
            AdapterError::StoreWrite { step, .. } => Some(*step),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;
