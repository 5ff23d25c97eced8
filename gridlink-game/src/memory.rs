//! In-memory collaborators for tests, headless runs and offline demos.
//!
//! Each one can be told to fail so callers can exercise the degraded paths.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{GameError, GameResult};
use crate::level::Level;
use crate::sync::CloudProgressRecord;
use crate::{AccountStore, Entitlements, KeyValueStore, LevelSource, lock_unpoisoned as lock};

/// Key-value store held in a shared map. Clones share contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Store `value` verbatim, bypassing envelopes.
    pub fn insert_raw(&self, key: &str, value: &str) {
        lock(&self.entries).insert(key.to_string(), value.to_string());
    }

    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    fn check_reads(&self) -> GameResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(GameError::Storage("read failure injected".to_string()));
        }
        Ok(())
    }

    fn check_writes(&self) -> GameResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(GameError::Storage("write failure injected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> GameResult<Option<String>> {
        self.check_reads()?;
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: String) -> GameResult<()> {
        self.check_writes()?;
        lock(&self.entries).insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> GameResult<()> {
        self.check_writes()?;
        lock(&self.entries).remove(key);
        Ok(())
    }

    async fn keys(&self) -> GameResult<Vec<String>> {
        self.check_reads()?;
        Ok(lock(&self.entries).keys().cloned().collect())
    }
}

/// Level store serving a fixed catalogue, counting fetches per level.
#[derive(Debug, Clone, Default)]
pub struct MemoryLevelSource {
    levels: Arc<Mutex<BTreeMap<u32, Level>>>,
    fetches: Arc<Mutex<HashMap<u32, usize>>>,
    failing: Arc<Mutex<Vec<u32>>>,
    offline: Arc<AtomicBool>,
}

impl MemoryLevelSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_levels<I>(levels: I) -> Self
    where
        I: IntoIterator<Item = (u32, Level)>,
    {
        let source = Self::new();
        lock(&source.levels).extend(levels);
        source
    }

    pub fn insert(&self, number: u32, level: Level) {
        lock(&self.levels).insert(number, level);
    }

    /// Make fetches of `number` fail until [`Self::clear_failures`].
    pub fn fail_level(&self, number: u32) {
        lock(&self.failing).push(number);
    }

    pub fn clear_failures(&self) {
        lock(&self.failing).clear();
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    #[must_use]
    pub fn fetch_count(&self, number: u32) -> usize {
        lock(&self.fetches).get(&number).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total_fetches(&self) -> usize {
        lock(&self.fetches).values().sum()
    }
}

#[async_trait]
impl LevelSource for MemoryLevelSource {
    async fn level_by_number(&self, number: u32) -> GameResult<Option<Level>> {
        *lock(&self.fetches).entry(number).or_default() += 1;
        if self.offline.load(Ordering::SeqCst) || lock(&self.failing).contains(&number) {
            return Err(GameError::Source(format!("level {number} unreachable")));
        }
        Ok(lock(&self.levels).get(&number).cloned())
    }

    async fn max_level_number(&self) -> GameResult<u32> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(GameError::Source("level store unreachable".to_string()));
        }
        Ok(lock(&self.levels).keys().next_back().copied().unwrap_or(0))
    }
}

/// Account documents keyed by account id.
#[derive(Debug, Clone, Default)]
pub struct MemoryAccountStore {
    records: Arc<Mutex<HashMap<String, CloudProgressRecord>>>,
    writes: Arc<AtomicUsize>,
    offline: Arc<AtomicBool>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, account_id: &str, record: CloudProgressRecord) {
        lock(&self.records).insert(account_id.to_string(), record);
    }

    #[must_use]
    pub fn record(&self, account_id: &str) -> Option<CloudProgressRecord> {
        lock(&self.records).get(account_id).cloned()
    }

    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> GameResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(GameError::Account("account store unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn user_progress(&self, account_id: &str) -> GameResult<Option<CloudProgressRecord>> {
        self.check_online()?;
        Ok(self.record(account_id))
    }

    async fn set_user_progress(
        &self,
        account_id: &str,
        record: CloudProgressRecord,
    ) -> GameResult<()> {
        self.check_online()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.seed(account_id, record);
        Ok(())
    }
}

/// Fixed premium flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticEntitlements {
    pub premium: bool,
}

impl Entitlements for StaticEntitlements {
    fn is_premium(&self) -> bool {
        self.premium
    }
}
