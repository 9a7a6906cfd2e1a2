use std::collections::HashMap as StdHashMap;
use std::sync::Arc;

use super::{ListStore, ReplaceError, ReplaceStep};
use crate::error::StoreError;

#[derive(Default)]
struct Inner {
    lists: StdHashMap<String, Vec<Vec<u8>>>,
    /// Every command fails with `Unavailable` while set.
    offline: bool,
    /// Appends (including the append half of `replace`) are refused with this reason.
    reject_appends: Option<String>,
}

impl Inner {
    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline { Err(StoreError::Unavailable) } else { Ok(()) }
    }

    fn check_append(&self) -> Result<(), StoreError> {
        match &self.reject_appends {
            Some(reason) => Err(StoreError::Rejected(reason.clone())),
            None => Ok(()),
        }
    }
}

/// In-process list store with Redis list semantics.
/// Clones share the same lists, the way several clients share one Redis database.
#[derive(Clone, Default)]
pub struct MemoryListStore {
    inner: Arc<parking_lot::RwLock<Inner>>,
}

impl MemoryListStore {
    pub fn new() -> Self { Self::default() }

    /// Simulate an outage: every command fails until cleared.
    pub fn set_offline(&self, offline: bool) { self.inner.write().offline = offline; }

    /// Refuse appends with the given reason (`None` to accept again).
    pub fn set_reject_appends(&self, reason: Option<&str>) {
        self.inner.write().reject_appends = reason.map(|r| r.to_string());
    }

    pub fn len(&self, key: &str) -> usize { self.inner.read().lists.get(key).map(|l| l.len()).unwrap_or(0) }
    pub fn exists(&self, key: &str) -> bool { self.inner.read().lists.contains_key(key) }
    /// Snapshot of all keys currently holding a list
    pub fn keys(&self) -> Vec<String> { self.inner.read().lists.keys().cloned().collect() }

    /// Append one element as raw bytes, bypassing the record encoder.
    /// Redis lists are binary-safe, so a foreign writer can leave anything here.
    pub fn push_raw(&self, key: &str, value: &[u8]) {
        self.inner.write().lists.entry(key.to_string()).or_default().push(value.to_vec());
    }
}

impl ListStore for MemoryListStore {
    async fn ping(&self) -> Result<(), StoreError> { self.inner.read().check_online() }

    async fn range_all(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        let r = self.inner.read();
        r.check_online()?;
        Ok(r.lists.get(key).cloned().unwrap_or_default())
    }

    async fn push(&self, key: &str, values: &[String]) -> Result<(), StoreError> {
        let mut w = self.inner.write();
        w.check_online()?;
        w.check_append()?;
        if values.is_empty() { return Ok(()); }
        w.lists.entry(key.to_string()).or_default().extend(values.iter().map(|v| v.as_bytes().to_vec()));
        Ok(())
    }

    async fn remove_first(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut w = self.inner.write();
        w.check_online()?;
        Ok(remove_first_in(&mut w.lists, key, value.as_bytes()))
    }

    async fn remove_each_first(&self, key: &str, values: &[String]) -> Result<usize, StoreError> {
        let mut w = self.inner.write();
        w.check_online()?;
        Ok(values.iter().filter(|v| remove_first_in(&mut w.lists, key, v.as_bytes())).count())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut w = self.inner.write();
        w.check_online()?;
        w.lists.remove(key);
        Ok(())
    }

    async fn replace(&self, key: &str, values: &[String]) -> Result<(), ReplaceError> {
        let mut w = self.inner.write();
        w.check_online().map_err(|e| ReplaceError::new(ReplaceStep::Delete, e))?;
        // validate both halves before touching anything so a refused append leaves the old list
        if !values.is_empty() {
            w.check_append().map_err(|e| ReplaceError::new(ReplaceStep::Append, e))?;
        }
        w.lists.remove(key);
        if !values.is_empty() {
            w.lists.insert(key.to_string(), values.iter().map(|v| v.as_bytes().to_vec()).collect());
        }
        Ok(())
    }
}

// Redis drops a list once its last element is removed.
fn remove_first_in(lists: &mut StdHashMap<String, Vec<Vec<u8>>>, key: &str, value: &[u8]) -> bool {
    let Some(list) = lists.get_mut(key) else { return false };
    let Some(i) = list.iter().position(|v| v == value) else { return false };
    list.remove(i);
    if list.is_empty() { lists.remove(key); }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vals(items: &[&str]) -> Vec<String> { items.iter().map(|s| s.to_string()).collect() }
    fn raw(items: &[&str]) -> Vec<Vec<u8>> { items.iter().map(|s| s.as_bytes().to_vec()).collect() }

    #[tokio::test]
    async fn push_range_and_missing_key() {
        let s = MemoryListStore::new();
        assert!(s.range_all("k").await.unwrap().is_empty());
        s.push("k", &vals(&["a", "b"])).await.unwrap();
        s.push("k", &vals(&["c"])).await.unwrap();
        assert_eq!(s.range_all("k").await.unwrap(), raw(&["a", "b", "c"]));
    }

    #[tokio::test]
    async fn remove_first_scans_from_head() {
        let s = MemoryListStore::new();
        s.push("k", &vals(&["x", "y", "x"])).await.unwrap();
        assert!(s.remove_first("k", "x").await.unwrap());
        assert_eq!(s.range_all("k").await.unwrap(), raw(&["y", "x"]));
        assert!(!s.remove_first("k", "z").await.unwrap());
        assert_eq!(s.remove_each_first("k", &vals(&["y", "x", "x"])).await.unwrap(), 2);
        assert!(!s.exists("k"));
    }

    #[tokio::test]
    async fn replace_is_all_or_nothing() {
        let s = MemoryListStore::new();
        s.push("k", &vals(&["old"])).await.unwrap();
        s.set_reject_appends(Some("OOM"));
        let err = s.replace("k", &vals(&["new1", "new2"])).await.unwrap_err();
        assert_eq!(err.step, ReplaceStep::Append);
        assert_eq!(s.range_all("k").await.unwrap(), raw(&["old"]));

        s.set_reject_appends(None);
        s.replace("k", &vals(&["new1", "new2"])).await.unwrap();
        assert_eq!(s.range_all("k").await.unwrap(), raw(&["new1", "new2"]));
        s.replace("k", &[]).await.unwrap();
        assert!(!s.exists("k"));
    }

    #[tokio::test]
    async fn offline_fails_everything() {
        let s = MemoryListStore::new();
        s.set_offline(true);
        assert!(matches!(s.ping().await, Err(StoreError::Unavailable)));
        assert!(s.range_all("k").await.is_err());
        assert!(s.delete("k").await.is_err());
        assert_eq!(s.replace("k", &vals(&["a"])).await.unwrap_err().step, ReplaceStep::Delete);
    }

    #[tokio::test]
    async fn clones_share_lists() {
        let a = MemoryListStore::new();
        let b = a.clone();
        a.push("k", &vals(&["one"])).await.unwrap();
        assert_eq!(b.len("k"), 1);
        assert_eq!(b.keys(), vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn elements_are_binary_safe() {
        let s = MemoryListStore::new();
        s.push("k", &vals(&["p, alice, data1, read"])).await.unwrap();
        s.push_raw("k", &[b'p', b',', b' ', 0xff, 0xfe]);
        let items = s.range_all("k").await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], b"p, alice, data1, read".to_vec());
        assert_eq!(items[1], vec![b'p', b',', b' ', 0xff, 0xfe]);
        // string removal never matches the foreign element
        assert!(!s.remove_first("k", "p, \u{fffd}\u{fffd}").await.unwrap());
        assert_eq!(s.len("k"), 2);
    }
}
