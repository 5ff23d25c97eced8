//! Composition root wiring the services together for a UI or a headless
//! driver. Owns one instance of each service; nothing here is global.

use log::{debug, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

use crate::cache::LevelCache;
use crate::config::EngineConfig;
use crate::error::{GameError, GameResult};
use crate::level::{Cell, Level};
use crate::lives::{LivesRegulator, LivesSnapshot, LivesState};
use crate::progress::{ProgressStore, SyncInbox, sync_channel};
use crate::sync::{SyncOutcome, SyncReconciler};
use crate::validator::validate_path;
use crate::window::{self, LevelWindow};
use crate::{AccountStore, Clock, Entitlements, KeyValueStore, LevelSource, lock_unpoisoned};

/// What [`GridlinkEngine::startup`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StartupReport {
    pub expired_entries: usize,
    pub max_level: u32,
    pub lives: LivesState,
}

/// A window and the levels that resolved inside it, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowView {
    pub window: LevelWindow,
    pub levels: Vec<Level>,
}

/// A level the player has entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelOpened {
    pub level: Level,
    pub lives: LivesSnapshot,
    /// Entry was free because the player is premium.
    pub premium: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TraceOutcome {
    pub solved: bool,
    /// Solved and not completed before.
    pub newly_completed: bool,
}

pub struct GridlinkEngine<S, K, A, C> {
    config: EngineConfig,
    cache: Arc<LevelCache<S, K, C>>,
    progress: Arc<ProgressStore<K, C>>,
    lives: LivesRegulator<K, C>,
    sync: Arc<SyncReconciler<A, K, C>>,
    entitlements: Arc<dyn Entitlements>,
    inbox: AsyncMutex<Option<SyncInbox>>,
    max_level: AtomicU32,
    window: Mutex<LevelWindow>,
}

impl<S, K, A, C> GridlinkEngine<S, K, A, C>
where
    S: LevelSource + 'static,
    K: KeyValueStore + Clone + 'static,
    A: AccountStore + 'static,
    C: Clock + Clone + 'static,
{
    pub fn new(
        config: EngineConfig,
        source: S,
        store: K,
        accounts: A,
        clock: C,
        entitlements: Arc<dyn Entitlements>,
    ) -> Self {
        let config = config.sanitized();
        let (outbox, inbox) = sync_channel();
        let progress = Arc::new(
            ProgressStore::new(store.clone(), clock.clone(), &config).with_outbox(outbox),
        );
        let lives = LivesRegulator::new(store.clone(), clock.clone(), &config);
        let sync = Arc::new(SyncReconciler::new(
            accounts,
            Arc::clone(&progress),
            clock.clone(),
        ));
        let cache = Arc::new(LevelCache::new(source, store, clock, config.clone()));
        Self {
            config,
            cache,
            progress,
            lives,
            sync,
            entitlements,
            inbox: AsyncMutex::new(Some(inbox)),
            max_level: AtomicU32::new(0),
            window: Mutex::new(LevelWindow::empty()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub const fn cache(&self) -> &Arc<LevelCache<S, K, C>> {
        &self.cache
    }

    #[must_use]
    pub const fn progress(&self) -> &Arc<ProgressStore<K, C>> {
        &self.progress
    }

    #[must_use]
    pub const fn lives(&self) -> &LivesRegulator<K, C> {
        &self.lives
    }

    #[must_use]
    pub const fn sync(&self) -> &Arc<SyncReconciler<A, K, C>> {
        &self.sync
    }

    #[must_use]
    pub fn is_premium(&self) -> bool {
        self.entitlements.is_premium()
    }

    /// Highest level number seen from the level store so far.
    #[must_use]
    pub fn known_max_level(&self) -> u32 {
        self.max_level.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn current_window(&self) -> LevelWindow {
        *lock_unpoisoned(&self.window)
    }

    /// Ask the level store for its highest number; on failure keep the last
    /// known value.
    pub async fn refresh_max_level(&self) -> u32 {
        match self.cache.max_level_number().await {
            Ok(max) => {
                self.max_level.store(max, Ordering::Release);
                max
            }
            Err(err) => {
                let known = self.known_max_level();
                warn!("cannot refresh max level, keeping {known}: {err}");
                known
            }
        }
    }

    /// Process start: sweep expired cache entries, learn the level count and
    /// settle regenerated lives.
    pub async fn startup(&self) -> StartupReport {
        let expired_entries = self.cache.invalidate_expired().await;
        let max_level = self.refresh_max_level().await;
        let lives = self.lives.get_state().await;
        info!(
            "startup: {expired_entries} expired cache entries, {max_level} levels, {} lives",
            lives.current_lives
        );
        StartupReport {
            expired_entries,
            max_level,
            lives,
        }
    }

    async fn materialize(&self, window: LevelWindow) -> WindowView {
        *lock_unpoisoned(&self.window) = window;
        let levels = if window.is_empty() {
            Vec::new()
        } else {
            self.cache.resolve_range(window.start, window.len()).await
        };
        debug!(
            "window {}..={}: {} of {} levels resolved",
            window.start,
            window.end,
            levels.len(),
            window.len()
        );
        WindowView { window, levels }
    }

    /// Plan the window around the player's progress and resolve it.
    pub async fn load_window(&self) -> WindowView {
        let max_level = self.refresh_max_level().await;
        let highest = self.progress.highest_completed_level_number().await;
        let planned = window::plan_range(highest, max_level, self.config.page_size);
        self.schedule_preload(highest.saturating_add(1));
        self.materialize(planned).await
    }

    /// Jump to `target`, re-centering only when it falls outside the current
    /// window.
    pub async fn navigate_to(&self, target: u32) -> WindowView {
        let current = self.current_window();
        let moved = window::navigate_to(
            &current,
            target,
            self.known_max_level(),
            self.config.page_size,
        );
        self.materialize(moved).await
    }

    /// Enter level `number`: resolve it, take a life unless premium, and
    /// record it as last played.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::LevelOutOfRange`] for numbers outside the known
    /// range, the cache's error when the level cannot be resolved, and
    /// [`GameError::NoLivesRemaining`] when the player is out of lives.
    pub async fn open_level(&self, number: u32) -> GameResult<LevelOpened> {
        let max = self.known_max_level();
        if number == 0 || (max > 0 && number > max) {
            return Err(GameError::LevelOutOfRange { number, max });
        }
        let level = self.cache.resolve(number).await?;

        let premium = self.is_premium();
        if !premium && !self.lives.consume().await {
            return Err(GameError::NoLivesRemaining);
        }
        self.progress.set_last_played(&level.id).await;
        self.schedule_preload(number);
        let lives = self.lives.snapshot().await;
        debug!(
            "opened {} ({} lives left{})",
            level.id,
            lives.state.current_lives,
            if premium { ", premium" } else { "" }
        );
        Ok(LevelOpened {
            level,
            lives,
            premium,
        })
    }

    /// Validate a finished path and record the completion if it solves `level`.
    pub async fn submit_trace(&self, level: &Level, path: &[Cell]) -> TraceOutcome {
        if !validate_path(&level.grid, path) {
            return TraceOutcome {
                solved: false,
                newly_completed: false,
            };
        }
        let newly_completed = self.progress.mark_completed(&level.id).await;
        if newly_completed {
            info!("{} completed", level.id);
        }
        TraceOutcome {
            solved: true,
            newly_completed,
        }
    }

    pub async fn on_rewarded_ad_completed(&self) -> LivesSnapshot {
        self.lives.grant_full().await;
        self.lives.snapshot().await
    }

    /// # Errors
    ///
    /// Returns an error if the account store rejects the upload.
    pub async fn register(&self, account_id: &str) -> GameResult<SyncOutcome> {
        self.sync.on_register(account_id).await
    }

    /// # Errors
    ///
    /// Returns an error if the account store cannot be reached.
    pub async fn login(&self, account_id: &str) -> GameResult<SyncOutcome> {
        self.sync.on_login(account_id).await
    }

    pub fn sign_out(&self) {
        self.sync.sign_out();
    }

    /// Push queued progress changes now. Returns the number of intents
    /// consumed; zero once a background worker owns the queue.
    pub async fn flush_sync(&self) -> usize {
        let mut inbox = self.inbox.lock().await;
        match inbox.as_mut() {
            Some(inbox) => self.sync.drain_outbox(inbox).await,
            None => 0,
        }
    }

    /// Warm the neighbourhood of `anchor` without waiting for it.
    pub fn schedule_preload(&self, anchor: u32) {
        if self.cache.preload(anchor, self.known_max_level()).is_none() {
            debug!("no runtime available; skipping preload around {anchor}");
        }
    }

    /// Hand the sync queue to a background task. Returns `None` if a worker
    /// already owns it.
    pub async fn spawn_sync_worker(&self) -> Option<tokio::task::JoinHandle<()>> {
        let inbox = self.inbox.lock().await.take()?;
        Some(Arc::clone(&self.sync).run_outbox(inbox))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::level::{Difficulty, level_id};
    use crate::memory::{
        MemoryAccountStore, MemoryKeyValueStore, MemoryLevelSource, StaticEntitlements,
    };

    type TestEngine =
        GridlinkEngine<MemoryLevelSource, MemoryKeyValueStore, MemoryAccountStore, ManualClock>;

    /// 2x2 level solved by walking clockwise from the top-left.
    fn square(number: u32) -> Level {
        Level {
            id: level_id(number),
            difficulty: Difficulty::Easy,
            grid_size: 2,
            grid: vec![
                vec![Cell::numbered(0, 0, 1), Cell::blank(1, 0)],
                vec![Cell::numbered(0, 1, 2), Cell::blank(1, 1)],
            ],
            solution: vec![
                Cell::numbered(0, 0, 1),
                Cell::blank(1, 0),
                Cell::blank(1, 1),
                Cell::numbered(0, 1, 2),
            ],
        }
    }

    fn engine(levels: u32, premium: bool) -> (TestEngine, MemoryLevelSource) {
        let source = MemoryLevelSource::with_levels((1..=levels).map(|n| (n, square(n))));
        let engine = GridlinkEngine::new(
            EngineConfig::default(),
            source.clone(),
            MemoryKeyValueStore::new(),
            MemoryAccountStore::new(),
            ManualClock::starting_at(1_000),
            Arc::new(StaticEntitlements { premium }),
        );
        (engine, source)
    }

    #[tokio::test]
    async fn open_level_consumes_and_records_last_played() {
        let (engine, _) = engine(5, false);
        engine.startup().await;
        let opened = engine.open_level(3).await.unwrap();
        assert_eq!(opened.level.id, "level_3");
        assert_eq!(opened.lives.state.current_lives, 4);
        assert!(!opened.premium);
        assert_eq!(
            engine.progress().last_played_level().await.as_deref(),
            Some("level_3")
        );
    }

    #[tokio::test]
    async fn out_of_lives_blocks_entry_until_reward() {
        let (engine, _) = engine(5, false);
        engine.startup().await;
        for _ in 0..5 {
            engine.open_level(1).await.unwrap();
        }
        assert!(matches!(
            engine.open_level(1).await,
            Err(GameError::NoLivesRemaining)
        ));
        let snapshot = engine.on_rewarded_ad_completed().await;
        assert_eq!(snapshot.state.current_lives, 5);
        assert!(engine.open_level(1).await.is_ok());
    }

    #[tokio::test]
    async fn premium_players_keep_their_lives() {
        let (engine, _) = engine(5, true);
        engine.startup().await;
        for _ in 0..8 {
            assert!(engine.open_level(2).await.unwrap().premium);
        }
        assert_eq!(engine.lives().get_state().await.current_lives, 5);
    }

    #[tokio::test]
    async fn failed_fetch_does_not_cost_a_life() {
        let (engine, source) = engine(5, false);
        engine.startup().await;
        source.fail_level(4);
        let err = engine.open_level(4).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(engine.lives().get_state().await.current_lives, 5);
        assert!(matches!(
            engine.open_level(9).await,
            Err(GameError::LevelOutOfRange { number: 9, max: 5 })
        ));
    }

    #[tokio::test]
    async fn submit_trace_marks_completion_once() {
        let (engine, _) = engine(3, false);
        let level = square(1);
        let wrong = [level.solution[0], level.solution[3], level.solution[2], level.solution[1]];
        assert!(!engine.submit_trace(&level, &wrong).await.solved);

        let first = engine.submit_trace(&level, &level.solution).await;
        assert!(first.solved && first.newly_completed);
        let again = engine.submit_trace(&level, &level.solution).await;
        assert!(again.solved && !again.newly_completed);
        assert_eq!(engine.progress().completed_count().await, 1);
    }

    #[tokio::test]
    async fn window_follows_progress() {
        let (engine, _) = engine(100, false);
        let view = engine.load_window().await;
        assert_eq!(view.window, LevelWindow { start: 1, end: 20, has_more: true });
        assert_eq!(view.levels.len(), 20);

        engine.progress().mark_completed(&level_id(95)).await;
        let view = engine.load_window().await;
        assert_eq!(view.window, LevelWindow { start: 81, end: 100, has_more: false });
        assert_eq!(view.levels.first().map(|l| l.id.as_str()), Some("level_81"));

        let same = engine.navigate_to(90).await;
        assert_eq!(same.window, view.window);
        let moved = engine.navigate_to(30).await;
        assert_eq!(moved.window.start, 20);
        assert_eq!(engine.current_window(), moved.window);
    }

    #[tokio::test]
    async fn flush_sync_is_idle_after_worker_takes_the_queue() {
        let (engine, _) = engine(3, false);
        engine.register("u1").await.unwrap();
        engine.progress().mark_completed("level_1").await;
        assert_eq!(engine.flush_sync().await, 1);

        let worker = engine.spawn_sync_worker().await;
        assert!(worker.is_some());
        assert!(engine.spawn_sync_worker().await.is_none());
        assert_eq!(engine.flush_sync().await, 0);
        if let Some(worker) = worker {
            worker.abort();
        }
    }
}
