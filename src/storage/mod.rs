//!
//! Policy list storage
//! -------------------
//! The adapter talks to its backing store exclusively through the [`ListStore`] trait: a
//! handful of list commands over string elements addressed by key. The Redis backend maps
//! them one-to-one onto `LRANGE`, `RPUSH`, `LREM`, `DEL`, `PING` and a `MULTI`/`EXEC` pair.
//! The in-memory backend mirrors the same semantics so the adapter can be exercised (and
//! embedded) without a server.
//!
//! Key conventions:
//! - A missing key reads as an empty list, never as an error.
//! - Appends go to the tail, removals scan from the head.
//! - `replace` is the only multi-command operation and must be applied atomically.
//!
//! Store handles are shared: every method takes `&self`, and cloning a handle never opens
//! a second logical store.

use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::error::StoreError;

pub mod memory;
pub mod redis_list;

pub use memory::MemoryListStore;
pub use redis_list::RedisListStore;

/// Half of the atomic delete-then-append swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceStep { Delete, Append }

impl Display for ReplaceStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplaceStep::Delete => f.write_str("delete"),
            ReplaceStep::Append => f.write_str("append"),
        }
    }
}

#[derive(Debug, Error)]
#[error("{step} step of list replace failed: {source}")]
pub struct ReplaceError {
    pub step: ReplaceStep,
    #[source]
    pub source: StoreError,
}

impl ReplaceError {
    pub fn new(step: ReplaceStep, source: impl Into<StoreError>) -> Self { Self { step, source: source.into() } }
}

/// List commands the adapter needs from a key-value store.
#[allow(async_fn_in_trait)]
pub trait ListStore {
    /// Liveness probe.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Whole list, head to tail, as raw element bytes. Missing key yields an empty vector.
    /// Elements are not required to be UTF-8; decoding is the caller's business.
    async fn range_all(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError>;

    /// Append values to the tail in order, creating the list if needed.
    async fn push(&self, key: &str, values: &[String]) -> Result<(), StoreError>;

    /// Remove the first element equal to `value`. Returns whether one was removed.
    async fn remove_first(&self, key: &str, value: &str) -> Result<bool, StoreError>;

    /// `remove_first` for each value, applied as one atomic batch. Returns the number removed.
    async fn remove_each_first(&self, key: &str, values: &[String]) -> Result<usize, StoreError>;

    /// Drop the key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Atomically drop the key and append `values` in order.
    async fn replace(&self, key: &str, values: &[String]) -> Result<(), ReplaceError>;
}
