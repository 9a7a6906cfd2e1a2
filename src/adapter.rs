//! Policy persistence adapter: keeps a policy model's rules as one list of records under a
//! single key, and rebuilds a model from that list on demand.
//!
//! The adapter holds no state besides the store handle, the key and the decode strategy, so
//! every operation is a single round trip (or a single atomic batch for full saves).

use tracing::{debug, info};

use crate::codec::{encode_rule, load_record, LenientLineHandler, PolicyLineHandler};
use crate::config::{AdapterConfig, DEFAULT_POLICY_KEY};
use crate::error::{AdapterError, Result, WriteStep};
use crate::model::{PolicyModel, GROUPING_SECTION, POLICY_SECTION};
use crate::storage::{ListStore, RedisListStore, ReplaceStep};

const LOG_TARGET: &str = "redis_policy_adapter::adapter";

/// Persistence contract a policy engine drives.
#[allow(async_fn_in_trait)]
pub trait PolicyAdapter {
    /// Add every stored rule to `model`, in stored order.
    async fn load_policy(&self, model: &mut PolicyModel) -> Result<()>;

    /// Replace the stored rules with exactly the rules of `model`.
    async fn save_policy(&self, model: &PolicyModel) -> Result<()>;

    async fn add_policy(&self, sec: &str, ptype: &str, rule: &[String]) -> Result<()>;

    async fn remove_policy(&self, sec: &str, ptype: &str, rule: &[String]) -> Result<()>;

    async fn remove_filtered_policy(&self, sec: &str, ptype: &str, field_index: usize, field_values: &[String]) -> Result<()>;

    async fn add_policies(&self, sec: &str, ptype: &str, rules: &[Vec<String>]) -> Result<()> {
        for rule in rules { self.add_policy(sec, ptype, rule).await?; }
        Ok(())
    }

    async fn remove_policies(&self, sec: &str, ptype: &str, rules: &[Vec<String>]) -> Result<()> {
        for rule in rules { self.remove_policy(sec, ptype, rule).await?; }
        Ok(())
    }

    async fn clear_policy(&self) -> Result<()>;

    /// Whether the last load was a filtered subset.
    fn is_filtered(&self) -> bool { false }
}

/// Adapter over any [`ListStore`], decoding records with `H`.
#[derive(Clone)]
pub struct ListAdapter<S, H = LenientLineHandler> {
    store: S,
    key: String,
    handler: H,
}

/// Adapter backed by a Redis server.
pub type RedisAdapter<H = LenientLineHandler> = ListAdapter<RedisListStore, H>;

impl<S: ListStore> ListAdapter<S> {
    /// Wrap a store handle after checking it answers. The handle stays shared with the caller.
    pub async fn new(store: S) -> Result<Self> {
        store.ping().await.map_err(AdapterError::Connection)?;
        info!(target: LOG_TARGET, "policy store reachable, adapter ready");
        Ok(Self { store, key: DEFAULT_POLICY_KEY.to_string(), handler: LenientLineHandler })
    }
}

impl RedisAdapter {
    /// Connect from a descriptor such as `redis://:password@host:6379/0`.
    pub async fn from_url(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| AdapterError::config(format!("invalid connection url: {}", e)))?;
        Self::from_client(&client).await
    }

    pub async fn from_config(cfg: &AdapterConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self::from_url(&cfg.connection_url()).await?.with_key(cfg.policy_key.clone()))
    }

    /// Use a client the caller owns; the adapter opens its own multiplexed connection on it.
    pub async fn from_client(client: &redis::Client) -> Result<Self> {
        let store = RedisListStore::connect(client).await.map_err(AdapterError::Connection)?;
        ListAdapter::new(store).await
    }

    /// Share an existing multiplexed connection.
    pub async fn from_connection(conn: redis::aio::MultiplexedConnection) -> Result<Self> {
        ListAdapter::new(RedisListStore::new(conn)).await
    }
}

impl<S: ListStore, H: PolicyLineHandler> ListAdapter<S, H> {
    /// Store the list under `key` instead of the default one.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Swap the record decoder.
    pub fn with_line_handler<H2: PolicyLineHandler>(self, handler: H2) -> ListAdapter<S, H2> {
        ListAdapter { store: self.store, key: self.key, handler }
    }

    pub fn policy_key(&self) -> &str { &self.key }
    pub fn store(&self) -> &S { &self.store }

    async fn write_records(&self, records: Vec<String>) -> Result<()> {
        if records.is_empty() {
            debug!(target: LOG_TARGET, "save: no rules, deleting '{}'", self.key);
            return self.store.delete(&self.key).await.map_err(|e| AdapterError::write(WriteStep::Delete, e));
        }
        debug!(target: LOG_TARGET, "save: replacing '{}' with {} records", self.key, records.len());
        self.store.replace(&self.key, &records).await.map_err(|e| {
            let step = match e.step { ReplaceStep::Delete => WriteStep::DeleteOld, ReplaceStep::Append => WriteStep::Save };
            AdapterError::write(step, e.source)
        })
    }
}

fn collect_records(model: &PolicyModel) -> Vec<String> {
    let mut records = Vec::new();
    for sec in [POLICY_SECTION, GROUPING_SECTION] {
        for (ptype, assertion) in model.assertions(sec) {
            records.extend(assertion.policy.iter().map(|rule| encode_rule(ptype, rule)));
        }
    }
    records
}

impl<S: ListStore, H: PolicyLineHandler> PolicyAdapter for ListAdapter<S, H> {
    async fn load_policy(&self, model: &mut PolicyModel) -> Result<()> {
        let records = self.store.range_all(&self.key).await.map_err(AdapterError::StoreRead)?;
        debug!(target: LOG_TARGET, "load: {} records from '{}'", records.len(), self.key);
        for raw in &records {
            load_record(&self.handler, raw, model)?;
        }
        Ok(())
    }

    async fn save_policy(&self, model: &PolicyModel) -> Result<()> {
        self.write_records(collect_records(model)).await
    }

    async fn add_policy(&self, _sec: &str, ptype: &str, rule: &[String]) -> Result<()> {
        let record = encode_rule(ptype, rule);
        self.store.push(&self.key, std::slice::from_ref(&record)).await.map_err(|e| AdapterError::write(WriteStep::Add, e))
    }

    async fn remove_policy(&self, _sec: &str, ptype: &str, rule: &[String]) -> Result<()> {
        let record = encode_rule(ptype, rule);
        let removed = self.store.remove_first(&self.key, &record).await.map_err(|e| AdapterError::write(WriteStep::Remove, e))?;
        if !removed { debug!(target: LOG_TARGET, "remove: {:?} not stored, nothing to do", record); }
        Ok(())
    }

    async fn remove_filtered_policy(&self, _sec: &str, _ptype: &str, _field_index: usize, _field_values: &[String]) -> Result<()> {
        Err(AdapterError::NotImplemented("remove_filtered_policy"))
    }

    async fn add_policies(&self, _sec: &str, ptype: &str, rules: &[Vec<String>]) -> Result<()> {
        let records: Vec<String> = rules.iter().map(|r| encode_rule(ptype, r)).collect();
        self.store.push(&self.key, &records).await.map_err(|e| AdapterError::write(WriteStep::Add, e))
    }

    async fn remove_policies(&self, _sec: &str, ptype: &str, rules: &[Vec<String>]) -> Result<()> {
        let records: Vec<String> = rules.iter().map(|r| encode_rule(ptype, r)).collect();
        let removed = self.store.remove_each_first(&self.key, &records).await.map_err(|e| AdapterError::write(WriteStep::Remove, e))?;
        debug!(target: LOG_TARGET, "remove: {}/{} records removed", removed, records.len());
        Ok(())
    }

    async fn clear_policy(&self) -> Result<()> {
        self.store.delete(&self.key).await.map_err(|e| AdapterError::write(WriteStep::Delete, e))
    }
}
