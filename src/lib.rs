pub mod adapter;
pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod storage;

pub use adapter::{ListAdapter, PolicyAdapter, RedisAdapter};
pub use codec::{LenientLineHandler, PolicyLineHandler, StrictLineHandler};
pub use config::{AdapterConfig, DEFAULT_POLICY_KEY};
pub use error::{AdapterError, Result, WriteStep};
pub use model::PolicyModel;
pub use storage::{ListStore, MemoryListStore, RedisListStore};
