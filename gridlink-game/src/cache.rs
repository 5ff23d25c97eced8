//! Two-tier level cache: a memory map in front of durable storage, with the
//! remote level store as the miss fallback.
//!
//! Entries expire after the configured TTL (24 hours by default). Memory is
//! authoritative whenever it holds a fresh entry; the durable tier is only
//! consulted on a memory miss and promotes what it finds.

use futures::future::join_all;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

use crate::config::EngineConfig;
use crate::constants::LEVEL_CACHE_KEY;
use crate::error::{GameError, GameResult};
use crate::level::Level;
use crate::window::preload_targets;
use crate::{Clock, KeyValueStore, LevelSource, lock_unpoisoned, storage};

/// A cached level and the time it was fetched (epoch millis).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub level: Level,
    pub timestamp: i64,
}

impl CacheEntry {
    #[must_use]
    pub const fn is_fresh(&self, now: i64, ttl_ms: i64) -> bool {
        now.saturating_sub(self.timestamp) < ttl_ms
    }
}

pub struct LevelCache<S, K, C> {
    source: S,
    store: K,
    clock: C,
    config: EngineConfig,
    memory: Mutex<HashMap<u32, CacheEntry>>,
    /// Held by durable write-back and by the expiry sweep, so a sweep never
    /// deletes an entry rewritten while it was scanning.
    durable_gate: AsyncMutex<()>,
}

impl<S, K, C> LevelCache<S, K, C>
where
    S: LevelSource,
    K: KeyValueStore,
    C: Clock,
{
    pub fn new(source: S, store: K, clock: C, config: EngineConfig) -> Self {
        Self {
            source,
            store,
            clock,
            config,
            memory: Mutex::new(HashMap::new()),
            durable_gate: AsyncMutex::new(()),
        }
    }

    fn durable_prefix(&self) -> String {
        self.config.key(&format!("{LEVEL_CACHE_KEY}."))
    }

    fn durable_key(&self, number: u32) -> String {
        format!("{}{number}", self.durable_prefix())
    }

    /// Highest level number the remote store has assigned.
    ///
    /// # Errors
    ///
    /// Returns an error if the level store cannot be reached.
    pub async fn max_level_number(&self) -> GameResult<u32> {
        self.source.max_level_number().await
    }

    /// Resolve one level through memory, durable storage, then the remote store.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::LevelNotFound`] when the remote store has no such
    /// level, or the store's error when it cannot be reached.
    pub async fn resolve(&self, number: u32) -> GameResult<Level> {
        let now = self.clock.now_millis();
        let ttl = self.config.cache_ttl_ms;

        if let Some(level) = self.memory_hit(number, now) {
            debug!("level {number}: memory hit");
            return Ok(level);
        }

        let key = self.durable_key(number);
        if let Some(entry) = storage::read::<CacheEntry, _>(&self.store, &key).await
            && entry.is_fresh(now, ttl)
        {
            debug!("level {number}: durable hit, promoting");
            let level = entry.level.clone();
            lock_unpoisoned(&self.memory).insert(number, entry);
            return Ok(level);
        }

        debug!("level {number}: miss, fetching");
        let level = self
            .source
            .level_by_number(number)
            .await?
            .ok_or(GameError::LevelNotFound { number })?;
        let entry = CacheEntry {
            level: level.clone(),
            timestamp: self.clock.now_millis(),
        };
        {
            let _gate = self.durable_gate.lock().await;
            if let Err(err) = storage::write(&self.store, &key, &entry).await {
                warn!("level {number}: durable cache write failed: {err}");
            }
        }
        lock_unpoisoned(&self.memory).insert(number, entry);
        Ok(level)
    }

    /// Resolve `count` levels starting at `start`, concurrently.
    ///
    /// Individual failures are dropped. Survivors come back in ascending level
    /// number regardless of completion order, using the requested number when
    /// an id carries none.
    pub async fn resolve_range(&self, start: u32, count: u32) -> Vec<Level> {
        let numbers: Vec<u32> = (0..count)
            .map_while(|offset| start.checked_add(offset))
            .collect();
        let results = join_all(numbers.iter().map(|&n| self.resolve(n))).await;

        let mut levels: Vec<(u32, Level)> = numbers
            .into_iter()
            .zip(results)
            .filter_map(|(number, result)| match result {
                Ok(level) => Some((level.level_number_or(number), level)),
                Err(err) => {
                    debug!("level {number}: dropped from range: {err}");
                    None
                }
            })
            .collect();
        levels.sort_by_key(|(number, _)| *number);
        levels.into_iter().map(|(_, level)| level).collect()
    }

    /// Drop every expired entry from both tiers. Returns how many durable
    /// entries were removed.
    ///
    /// Refetches that finish while the sweep runs wait for it before writing
    /// back, so their fresh entries survive.
    pub async fn invalidate_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let ttl = self.config.cache_ttl_ms;
        lock_unpoisoned(&self.memory).retain(|_, entry| entry.is_fresh(now, ttl));

        let _gate = self.durable_gate.lock().await;
        let prefix = self.durable_prefix();
        let keys = match self.store.keys().await {
            Ok(keys) => keys,
            Err(err) => {
                warn!("cache sweep skipped, cannot list keys: {err}");
                return 0;
            }
        };

        let mut stale = Vec::new();
        for key in keys.into_iter().filter(|k| k.starts_with(&prefix)) {
            let fresh = storage::read::<CacheEntry, _>(&self.store, &key)
                .await
                .is_some_and(|entry| entry.is_fresh(now, ttl));
            if !fresh {
                stale.push(key);
            }
        }

        let removed = stale.len();
        if removed > 0 {
            if let Err(err) = self.store.multi_remove(stale).await {
                warn!("cache sweep failed to remove entries: {err}");
                return 0;
            }
            debug!("cache sweep removed {removed} entries");
        }
        removed
    }

    fn memory_hit(&self, number: u32, now: i64) -> Option<Level> {
        lock_unpoisoned(&self.memory)
            .get(&number)
            .filter(|entry| entry.is_fresh(now, self.config.cache_ttl_ms))
            .map(|entry| entry.level.clone())
    }

    /// Whether `number` is fresh in the memory tier.
    #[must_use]
    pub fn is_warm(&self, number: u32) -> bool {
        self.memory_hit(number, self.clock.now_millis()).is_some()
    }

    /// Forget the memory tier, as a process restart would.
    pub fn clear_memory(&self) {
        lock_unpoisoned(&self.memory).clear();
    }
}

impl<S, K, C> LevelCache<S, K, C>
where
    S: LevelSource + 'static,
    K: KeyValueStore + 'static,
    C: Clock + 'static,
{
    /// Warm the neighbourhood of `anchor` in the background.
    ///
    /// Returns `None` when no runtime is available to run the task. The task
    /// resolves to the number of levels that were resolved successfully.
    pub fn preload(
        self: &Arc<Self>,
        anchor: u32,
        max_level: u32,
    ) -> Option<tokio::task::JoinHandle<usize>> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let targets = preload_targets(
            anchor,
            max_level,
            self.config.preload_forward,
            self.config.preload_backward,
        );
        let cache = Arc::clone(self);
        Some(handle.spawn(async move {
            let results = join_all(targets.iter().map(|&n| cache.resolve(n))).await;
            let warmed = results.iter().filter(|r| r.is_ok()).count();
            debug!("preloaded {warmed}/{} levels around {anchor}", targets.len());
            warmed
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::constants::CACHE_TTL_MS;
    use async_trait::async_trait;
    use crate::level::{Cell, Difficulty, level_id};
    use crate::memory::{MemoryKeyValueStore, MemoryLevelSource};

    type TestCache = LevelCache<MemoryLevelSource, MemoryKeyValueStore, ManualClock>;

    fn level(number: u32) -> Level {
        Level {
            id: level_id(number),
            difficulty: Difficulty::Easy,
            grid_size: 1,
            grid: vec![vec![Cell::numbered(0, 0, 1)]],
            solution: vec![Cell::numbered(0, 0, 1)],
        }
    }

    fn fixture(count: u32) -> (TestCache, MemoryLevelSource, MemoryKeyValueStore, ManualClock) {
        let source = MemoryLevelSource::with_levels((1..=count).map(|n| (n, level(n))));
        let store = MemoryKeyValueStore::new();
        let clock = ManualClock::starting_at(1_700_000_000_000);
        let cache = LevelCache::new(
            source.clone(),
            store.clone(),
            clock.clone(),
            EngineConfig::default(),
        );
        (cache, source, store, clock)
    }

    #[tokio::test]
    async fn second_resolve_within_ttl_hits_memory() {
        let (cache, source, _, clock) = fixture(5);
        cache.resolve(3).await.unwrap();
        clock.advance_minutes(60);
        cache.resolve(3).await.unwrap();
        assert_eq!(source.fetch_count(3), 1);
    }

    #[tokio::test]
    async fn resolve_after_ttl_refetches() {
        let (cache, source, _, clock) = fixture(5);
        cache.resolve(3).await.unwrap();
        clock.advance_millis(CACHE_TTL_MS);
        cache.resolve(3).await.unwrap();
        assert_eq!(source.fetch_count(3), 2);
    }

    #[tokio::test]
    async fn durable_tier_survives_memory_loss() {
        let (cache, source, store, _) = fixture(5);
        cache.resolve(2).await.unwrap();
        assert!(store.raw("gridlink.level_cache.2").is_some());
        cache.clear_memory();
        assert!(!cache.is_warm(2));
        let level = cache.resolve(2).await.unwrap();
        assert_eq!(level.id, "level_2");
        assert_eq!(source.fetch_count(2), 1);
        assert!(cache.is_warm(2));
    }

    #[tokio::test]
    async fn corrupt_durable_entry_falls_through_to_remote() {
        let (cache, source, store, _) = fixture(5);
        store.insert_raw("gridlink.level_cache.4", "{broken");
        cache.resolve(4).await.unwrap();
        assert_eq!(source.fetch_count(4), 1);
    }

    #[tokio::test]
    async fn storage_outage_does_not_block_fetch() {
        let (cache, _, store, _) = fixture(5);
        store.fail_reads(true);
        store.fail_writes(true);
        assert_eq!(cache.resolve(1).await.unwrap().id, "level_1");
        assert!(cache.is_warm(1));
    }

    #[tokio::test]
    async fn missing_level_is_reported() {
        let (cache, _, _, _) = fixture(2);
        let err = cache.resolve(9).await.unwrap_err();
        assert!(matches!(err, GameError::LevelNotFound { number: 9 }));
    }

    #[tokio::test]
    async fn range_drops_failures_and_sorts() {
        let (cache, source, _, _) = fixture(6);
        source.fail_level(3);
        let levels = cache.resolve_range(1, 8).await;
        let ids: Vec<_> = levels.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["level_1", "level_2", "level_4", "level_5", "level_6"]);
    }

    #[tokio::test]
    async fn range_sorts_by_parsed_id_with_positional_fallback() {
        let (cache, source, _, _) = fixture(0);
        let mut odd = level(0);
        odd.id = "untitled".to_string();
        source.insert(1, level(2));
        source.insert(2, level(1));
        source.insert(3, odd);
        let levels = cache.resolve_range(1, 3).await;
        let ids: Vec<_> = levels.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["level_1", "level_2", "untitled"]);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_entries() {
        let (cache, _, store, clock) = fixture(5);
        cache.resolve(1).await.unwrap();
        clock.advance_millis(CACHE_TTL_MS - 1_000);
        cache.resolve(2).await.unwrap();
        store.insert_raw("gridlink.level_cache.9", "junk");
        store.insert_raw("gridlink.progress", "keep me");
        clock.advance_millis(2_000);

        assert_eq!(cache.invalidate_expired().await, 2);
        assert!(store.raw("gridlink.level_cache.1").is_none());
        assert!(store.raw("gridlink.level_cache.9").is_none());
        assert!(store.raw("gridlink.level_cache.2").is_some());
        assert!(store.raw("gridlink.progress").is_some());
        assert!(!cache.is_warm(1));
        assert!(cache.is_warm(2));
    }

    /// Store that yields before every call, so cache operations interleave.
    #[derive(Clone, Default)]
    struct YieldingStore(MemoryKeyValueStore);

    #[async_trait]
    impl KeyValueStore for YieldingStore {
        async fn get(&self, key: &str) -> GameResult<Option<String>> {
            tokio::task::yield_now().await;
            self.0.get(key).await
        }

        async fn set(&self, key: &str, value: String) -> GameResult<()> {
            tokio::task::yield_now().await;
            self.0.set(key, value).await
        }

        async fn remove(&self, key: &str) -> GameResult<()> {
            tokio::task::yield_now().await;
            self.0.remove(key).await
        }

        async fn keys(&self) -> GameResult<Vec<String>> {
            tokio::task::yield_now().await;
            self.0.keys().await
        }
    }

    #[tokio::test]
    async fn sweep_keeps_entries_refreshed_while_it_runs() {
        let source = MemoryLevelSource::with_levels((1..=3).map(|n| (n, level(n))));
        let store = YieldingStore::default();
        let clock = ManualClock::starting_at(1_700_000_000_000);
        let cache = LevelCache::new(
            source.clone(),
            store.clone(),
            clock.clone(),
            EngineConfig::default(),
        );
        cache.resolve(1).await.unwrap();
        clock.advance_millis(CACHE_TTL_MS);

        let (removed, refreshed) = tokio::join!(cache.invalidate_expired(), cache.resolve(1));
        assert!(removed <= 1);
        assert_eq!(refreshed.unwrap().id, "level_1");
        assert_eq!(source.fetch_count(1), 2);

        let raw = store.0.raw("gridlink.level_cache.1").expect("refreshed entry kept");
        let entry: CacheEntry = storage::decode(&raw).unwrap();
        assert!(entry.is_fresh(clock.now_millis(), CACHE_TTL_MS));
    }

    #[tokio::test]
    async fn preload_warms_neighbourhood() {
        let (cache, source, _, _) = fixture(20);
        let cache = Arc::new(cache);
        let handle = cache.preload(10, 20).expect("runtime available");
        assert_eq!(handle.await.unwrap(), 6);
        for n in [8, 9, 10, 11, 12, 13] {
            assert!(cache.is_warm(n), "level {n}");
        }
        assert!(!cache.is_warm(14));
        assert_eq!(source.total_fetches(), 6);
    }

    #[tokio::test]
    async fn preload_tolerates_failures() {
        let (cache, source, _, _) = fixture(20);
        source.fail_level(11);
        let cache = Arc::new(cache);
        let warmed = cache.preload(10, 20).unwrap().await.unwrap();
        assert_eq!(warmed, 5);
    }

    #[test]
    fn preload_without_runtime_is_skipped() {
        let (cache, _, _, _) = fixture(3);
        assert!(Arc::new(cache).preload(1, 3).is_none());
    }
}
