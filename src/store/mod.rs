pub mod entry;

use crate::types::Value;
use entry::{Entry, now_secs};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Number of independent logical databases, addressed `0..NUM_DATABASES`.
pub const NUM_DATABASES: usize = 16;

/// A single logical database: key → entry.
#[derive(Debug, Default)]
pub struct Database {
    data: HashMap<String, Entry>,
    /// Keys removed by expiry since the last `Store::take_expired`.
    expired: Vec<String>,
    /// While set, expired entries are kept in place.
    loading: bool,
}

/// Result of clearing a key's TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Missing,
    NoTtl,
    Cleared,
}

impl PersistOutcome {
    /// Whether the key existed, which is what PERSIST reports.
    pub fn key_existed(self) -> bool {
        self != PersistOutcome::Missing
    }
}

/// Which databases a flush clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTarget {
    All,
    Db(usize),
}

impl Database {
    pub fn new() -> Self {
        Database::default()
    }

    /// Remove `key` if its TTL has passed. Returns true if it was removed.
    fn expire_if_needed(&mut self, key: &str) -> bool {
        if self.loading {
            return false;
        }
        let now = now_secs();
        if self.data.get(key).is_some_and(|e| e.is_expired_at(now)) {
            self.data.remove(key);
            self.expired.push(key.to_string());
            true
        } else {
            false
        }
    }

    /// Get a value, performing lazy expiration.
    pub fn get(&mut self, key: &str) -> Option<&Entry> {
        self.expire_if_needed(key);
        self.data.get(key)
    }

    /// Get a mutable value, performing lazy expiration.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Entry> {
        self.expire_if_needed(key);
        self.data.get_mut(key)
    }

    /// Set a key, replacing any previous entry wholesale.
    pub fn set(&mut self, key: String, entry: Entry) {
        self.data.insert(key, entry);
    }

    /// Get the live entry for `key`, inserting one built from `default` if
    /// there is none. Collection writers use this to create keys on demand.
    pub fn get_or_insert_with(&mut self, key: String, default: impl FnOnce() -> Value) -> &mut Entry {
        self.expire_if_needed(&key);
        self.data.entry(key).or_insert_with(|| Entry::new(default()))
    }

    /// Delete a key. Returns true if a live entry was removed.
    pub fn del(&mut self, key: &str) -> bool {
        let expired = self.expire_if_needed(key);
        !expired && self.data.remove(key).is_some()
    }

    /// Check if a key exists (with lazy expiration).
    pub fn exists(&mut self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set the absolute expiry of an existing key. Returns false if absent.
    pub fn set_expire_at(&mut self, key: &str, expire_at: u64) -> bool {
        match self.get_mut(key) {
            Some(entry) => {
                entry.expire_at = expire_at;
                true
            }
            None => false,
        }
    }

    /// Raw expiry of a key without lazy expiration (0 = none).
    #[cfg(test)]
    fn expire_at(&self, key: &str) -> Option<u64> {
        self.data.get(key).map(|e| e.expire_at)
    }

    /// Remove the expiry from a key.
    pub fn persist(&mut self, key: &str) -> PersistOutcome {
        match self.get_mut(key) {
            Some(entry) if entry.has_ttl() => {
                entry.expire_at = 0;
                PersistOutcome::Cleared
            }
            Some(_) => PersistOutcome::NoTtl,
            None => PersistOutcome::Missing,
        }
    }

    /// Number of stored keys, expired or not.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of keys that have not expired as of `now`.
    pub fn live_len(&self, now: u64) -> usize {
        self.data.values().filter(|e| !e.is_expired_at(now)).count()
    }

    /// Count keys whose expiry is at or before `now`.
    fn count_expired(&self, now: u64) -> usize {
        self.data.values().filter(|e| e.is_expired_at(now)).count()
    }

    /// Delete every key whose expiry is at or before `now`.
    /// Returns the number of keys removed.
    pub fn remove_expired(&mut self, now: u64) -> usize {
        if self.loading {
            return 0;
        }
        let expired = &mut self.expired;
        let before = self.data.len();
        self.data.retain(|key, entry| {
            if entry.is_expired_at(now) {
                expired.push(key.clone());
                false
            } else {
                true
            }
        });
        before - self.data.len()
    }

    /// Move the keys out, leaving this database empty but keeping its
    /// pending expirations and loading mode.
    fn take_contents(&mut self) -> Database {
        Database {
            data: std::mem::take(&mut self.data),
            ..Database::default()
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Entry)> {
        self.data.iter()
    }
}

/// The complete data store: all databases behind a single reader/writer lock.
///
/// Lock discipline: every method acquires the lock at most once at a time
/// and releases it before returning. Callers must never hold a store guard
/// while taking the append-log lock (see `persistence::aof`), and the log
/// never calls back into the store while holding its own lock.
///
/// Keys removed by expiry, lazily or by the sweeper, are queued until
/// `take_expired` hands them to the append-only log as DEL records, so a
/// replay deletes them at the same point in history.
#[derive(Debug)]
pub struct Store {
    databases: RwLock<Vec<Database>>,
    /// Set when some database has queued expirations.
    expired_pending: AtomicBool,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        let databases = (0..NUM_DATABASES).map(|_| Database::new()).collect();
        Store {
            databases: RwLock::new(databases),
            expired_pending: AtomicBool::new(false),
        }
    }

    fn note_expired(&self, db: &Database) {
        if !db.expired.is_empty() {
            self.expired_pending.store(true, Ordering::Release);
        }
    }

    /// Switch loading mode on or off for every database. While loading,
    /// neither reads nor the sweeper remove expired keys, so replayed
    /// records find each key as it was when they were logged.
    pub async fn set_loading(&self, loading: bool) {
        for db in self.databases.write().await.iter_mut() {
            db.loading = loading;
        }
    }

    /// Drain the keys removed by expiry since the last call, grouped by
    /// database index.
    pub async fn take_expired(&self) -> Vec<(usize, Vec<String>)> {
        if !self.expired_pending.swap(false, Ordering::AcqRel) {
            return Vec::new();
        }
        let mut dbs = self.databases.write().await;
        dbs.iter_mut()
            .enumerate()
            .filter(|(_, db)| !db.expired.is_empty())
            .map(|(index, db)| (index, std::mem::take(&mut db.expired)))
            .collect()
    }

    /// Run `f` against the live entry for `key`.
    ///
    /// Takes the read lock; if the entry turns out to be expired, releases it
    /// and takes the write lock to delete the entry before calling `f`.
    pub async fn view<R>(&self, db: usize, key: &str, f: impl FnOnce(Option<&Entry>) -> R) -> R {
        {
            let dbs = self.databases.read().await;
            let database = &dbs[db];
            match database.data.get(key) {
                Some(entry) if !database.loading && entry.is_expired_at(now_secs()) => {}
                live => return f(live),
            }
        }
        // Another writer may have replaced the key between the two locks,
        // so the lookup is repeated under the write lock.
        let mut dbs = self.databases.write().await;
        let result = f(dbs[db].get(key));
        self.note_expired(&dbs[db]);
        result
    }

    /// Run `f` with exclusive access to one database. Used for
    /// read-modify-write commands that must be atomic.
    pub async fn update<R>(&self, db: usize, f: impl FnOnce(&mut Database) -> R) -> R {
        let mut dbs = self.databases.write().await;
        let result = f(&mut dbs[db]);
        self.note_expired(&dbs[db]);
        result
    }

    pub async fn get(&self, db: usize, key: &str) -> Option<Entry> {
        self.view(db, key, |entry| entry.cloned()).await
    }

    pub async fn exists(&self, db: usize, key: &str) -> bool {
        self.view(db, key, |entry| entry.is_some()).await
    }

    pub async fn set(&self, db: usize, key: String, entry: Entry) {
        self.update(db, |d| d.set(key, entry)).await
    }

    pub async fn delete(&self, db: usize, key: &str) -> bool {
        self.update(db, |d| d.del(key)).await
    }

    pub async fn set_expire_at(&self, db: usize, key: &str, expire_at: u64) -> bool {
        self.update(db, |d| d.set_expire_at(key, expire_at)).await
    }

    #[cfg(test)]
    pub async fn expire_at(&self, db: usize, key: &str) -> Option<u64> {
        self.databases.read().await[db].expire_at(key)
    }

    pub async fn persist(&self, db: usize, key: &str) -> PersistOutcome {
        self.update(db, |d| d.persist(key)).await
    }

    pub async fn dbsize(&self, db: usize) -> usize {
        self.databases.read().await[db].live_len(now_secs())
    }

    /// Replace the target database(s) with empty ones in one step and hand
    /// back the old contents, so the caller decides where they are freed.
    pub async fn detach(&self, target: FlushTarget) -> Vec<Database> {
        let mut dbs = self.databases.write().await;
        match target {
            FlushTarget::All => dbs.iter_mut().map(Database::take_contents).collect(),
            FlushTarget::Db(index) => vec![dbs[index].take_contents()],
        }
    }

    pub async fn flush(&self, target: FlushTarget) {
        drop(self.detach(target).await);
    }

    /// Remove every expired key across all databases.
    /// Returns the number of keys removed.
    pub async fn sweep_once(&self) -> usize {
        self.sweep_at(now_secs()).await
    }

    async fn sweep_at(&self, now: u64) -> usize {
        {
            let dbs = self.databases.read().await;
            if dbs.iter().all(|d| d.count_expired(now) == 0) {
                return 0;
            }
        }
        let mut dbs = self.databases.write().await;
        let removed: usize = dbs.iter_mut().map(|d| d.remove_expired(now)).sum();
        if removed > 0 {
            self.expired_pending.store(true, Ordering::Release);
        }
        removed
    }

    /// Copy of every live key in every database, ordered by key.
    /// Used to compare store states.
    pub async fn snapshot(&self) -> Vec<Vec<(String, Entry)>> {
        let now = now_secs();
        let dbs = self.databases.read().await;
        dbs.iter()
            .map(|d| {
                let mut items: Vec<(String, Entry)> = d
                    .iter()
                    .filter(|(_, e)| !e.is_expired_at(now))
                    .map(|(k, e)| (k.clone(), e.clone()))
                    .collect();
                items.sort_by(|a, b| a.0.cmp(&b.0));
                items
            })
            .collect()
    }
}

pub type SharedStore = Arc<Store>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn string_entry(v: &str) -> Entry {
        Entry::new(Value::String(v.as_bytes().to_vec()))
    }

    fn expired_entry(v: &str) -> Entry {
        let mut e = string_entry(v);
        e.expire_at = now_secs() - 1;
        e
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = Store::new();
        store.set(0, "k".into(), string_entry("v")).await;
        assert_eq!(store.get(0, "k").await, Some(string_entry("v")));
        assert!(store.exists(0, "k").await);
        assert!(store.delete(0, "k").await);
        assert!(!store.delete(0, "k").await);
        assert_eq!(store.get(0, "k").await, None);
    }

    #[tokio::test]
    async fn test_databases_are_isolated() {
        let store = Store::new();
        store.set(1, "k".into(), string_entry("v")).await;
        assert!(!store.exists(0, "k").await);
        assert!(store.exists(1, "k").await);
    }

    #[tokio::test]
    async fn test_lazy_expiration_removes_entry() {
        let store = Store::new();
        store.set(0, "k".into(), expired_entry("v")).await;
        assert_eq!(store.expire_at(0, "k").await.map(|t| t > 0), Some(true));
        assert_eq!(store.get(0, "k").await, None);
        // The read removed the entry, not just hid it
        assert_eq!(store.expire_at(0, "k").await, None);
    }

    #[tokio::test]
    async fn test_delete_of_expired_key_reports_absent() {
        let store = Store::new();
        store.set(0, "k".into(), expired_entry("v")).await;
        assert!(!store.delete(0, "k").await);
    }

    #[tokio::test]
    async fn test_set_expire_at_requires_existing_key() {
        let store = Store::new();
        assert!(!store.set_expire_at(0, "missing", now_secs() + 10).await);
        store.set(0, "k".into(), string_entry("v")).await;
        assert!(store.set_expire_at(0, "k", now_secs() + 10).await);
        assert!(store.get(0, "k").await.unwrap().has_ttl());
    }

    #[tokio::test]
    async fn test_persist_outcomes() {
        let store = Store::new();
        assert_eq!(store.persist(0, "k").await, PersistOutcome::Missing);
        store.set(0, "k".into(), string_entry("v")).await;
        assert_eq!(store.persist(0, "k").await, PersistOutcome::NoTtl);
        assert!(PersistOutcome::NoTtl.key_existed());
        store.set_expire_at(0, "k", now_secs() + 100).await;
        assert_eq!(store.persist(0, "k").await, PersistOutcome::Cleared);
        assert_eq!(store.get(0, "k").await.unwrap().expire_at, 0);
    }

    #[tokio::test]
    async fn test_flush_targets() {
        let store = Store::new();
        store.set(0, "a".into(), string_entry("1")).await;
        store.set(3, "b".into(), string_entry("2")).await;

        store.flush(FlushTarget::Db(3)).await;
        assert!(store.exists(0, "a").await);
        assert!(!store.exists(3, "b").await);

        store.set(3, "b".into(), string_entry("2")).await;
        store.flush(FlushTarget::All).await;
        assert_eq!(store.dbsize(0).await, 0);
        assert_eq!(store.dbsize(3).await, 0);
    }

    #[tokio::test]
    async fn test_detach_returns_old_contents() {
        let store = Store::new();
        store.set(4, "k".into(), string_entry("v")).await;
        let old = store.detach(FlushTarget::Db(4)).await;
        assert_eq!(old.len(), 1);
        assert_eq!(old[0].live_len(now_secs()), 1);
        assert!(!store.exists(4, "k").await);
        assert_eq!(store.detach(FlushTarget::All).await.len(), NUM_DATABASES);
    }

    #[tokio::test]
    async fn test_sweep_once_removes_only_expired() {
        let store = Store::new();
        store.set(0, "dead".into(), expired_entry("x")).await;
        store.set(5, "dead".into(), expired_entry("x")).await;
        store.set(0, "alive".into(), string_entry("y")).await;
        let mut later = string_entry("z");
        later.expire_at = now_secs() + 1000;
        store.set(0, "later".into(), later).await;

        assert_eq!(store.sweep_once().await, 2);
        assert_eq!(store.sweep_once().await, 0);
        assert!(store.exists(0, "alive").await);
        assert!(store.exists(0, "later").await);
    }

    #[tokio::test]
    async fn test_sweep_at_future_time() {
        let store = Store::new();
        let mut e = string_entry("v");
        e.expire_at = now_secs() + 50;
        store.set(2, "k".into(), e).await;
        assert_eq!(store.sweep_at(now_secs() + 60).await, 1);
        assert_eq!(store.expire_at(2, "k").await, None);
    }

    #[tokio::test]
    async fn test_expired_keys_are_queued_for_the_log() {
        let store = Store::new();
        store.set(0, "lazy".into(), expired_entry("v")).await;
        store.set(7, "swept".into(), expired_entry("v")).await;
        assert!(store.take_expired().await.is_empty());

        assert_eq!(store.get(0, "lazy").await, None);
        assert_eq!(store.sweep_once().await, 1);
        assert_eq!(
            store.take_expired().await,
            vec![(0, vec!["lazy".to_string()]), (7, vec!["swept".to_string()])]
        );
        assert!(store.take_expired().await.is_empty());
    }

    #[tokio::test]
    async fn test_loading_keeps_expired_entries() {
        let store = Store::new();
        store.set_loading(true).await;
        store.flush(FlushTarget::All).await;
        store.set(0, "k".into(), expired_entry("v")).await;

        assert!(store.get(0, "k").await.is_some());
        assert!(store.exists(0, "k").await);
        assert_eq!(store.sweep_once().await, 0);
        assert!(store.take_expired().await.is_empty());

        store.set_loading(false).await;
        assert_eq!(store.sweep_once().await, 1);
        assert_eq!(store.get(0, "k").await, None);
    }

    #[tokio::test]
    async fn test_snapshot_skips_expired_and_sorts() {
        let store = Store::new();
        store.set(0, "b".into(), string_entry("2")).await;
        store.set(0, "a".into(), string_entry("1")).await;
        store.set(0, "gone".into(), expired_entry("x")).await;
        let snap = store.snapshot().await;
        assert_eq!(snap.len(), NUM_DATABASES);
        let keys: Vec<&str> = snap[0].iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
