//! Gridlink Game Engine
//!
//! Platform-agnostic progress and level engine for the Gridlink path puzzle.
//! This crate validates player traces, pages levels in from a remote store
//! through a two-tier cache, keeps local progress, reconciles it with the
//! player's cloud record and regulates lives. Rendering, transport and
//! monetization live outside and reach the engine through the traits below.

pub mod cache;
pub mod clock;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod level;
pub mod lives;
pub mod memory;
pub mod progress;
pub mod storage;
pub mod sync;
pub mod validator;
pub mod window;

// Re-export commonly used types
pub use cache::{CacheEntry, LevelCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{GridlinkEngine, LevelOpened, StartupReport, TraceOutcome, WindowView};
pub use error::{GameError, GameResult};
pub use level::{Cell, Difficulty, Grid, Level, level_id, parse_level_number};
pub use lives::{LivesRegulator, LivesSnapshot, LivesState};
pub use memory::{MemoryAccountStore, MemoryKeyValueStore, MemoryLevelSource, StaticEntitlements};
pub use progress::{
    ProgressRecord, ProgressStore, SyncInbox, SyncIntent, SyncOutbox, sync_channel,
};
pub use sync::{CloudProgressRecord, SyncOutcome, SyncReconciler};
pub use validator::{Trace, TraceRejection, TraceStep, validate_path};
pub use window::{LevelWindow, navigate_to, plan_range, preload_targets};

use async_trait::async_trait;
use std::sync::Arc;

/// Remote level store, keyed by level number.
/// Platform-specific implementations should provide this
#[async_trait]
pub trait LevelSource: Send + Sync {
    /// Fetch the level with sequence number `number`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached. An absent document is
    /// `Ok(None)`, not an error.
    async fn level_by_number(&self, number: u32) -> GameResult<Option<Level>>;

    /// Highest sequence number assigned so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn max_level_number(&self) -> GameResult<u32>;
}

/// Durable, process-independent string storage.
/// Platform-specific implementations should provide this
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the storage backend is unavailable.
    async fn get(&self, key: &str) -> GameResult<Option<String>>;

    /// # Errors
    ///
    /// Returns an error if the value cannot be written.
    async fn set(&self, key: &str, value: String) -> GameResult<()>;

    /// # Errors
    ///
    /// Returns an error if the key cannot be removed.
    async fn remove(&self, key: &str) -> GameResult<()>;

    /// Every key currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend is unavailable.
    async fn keys(&self) -> GameResult<Vec<String>>;

    /// # Errors
    ///
    /// Returns the first write failure.
    async fn multi_set(&self, entries: Vec<(String, String)>) -> GameResult<()> {
        for (key, value) in entries {
            self.set(&key, value).await?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the first removal failure.
    async fn multi_remove(&self, keys: Vec<String>) -> GameResult<()> {
        for key in keys {
            self.remove(&key).await?;
        }
        Ok(())
    }
}

/// Remote per-account document store holding the cloud progress record.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the account document cannot be fetched.
    async fn user_progress(&self, account_id: &str) -> GameResult<Option<CloudProgressRecord>>;

    /// # Errors
    ///
    /// Returns an error if the account document cannot be updated.
    async fn set_user_progress(
        &self,
        account_id: &str,
        record: CloudProgressRecord,
    ) -> GameResult<()>;
}

/// Purchase state consulted for play policy.
pub trait Entitlements: Send + Sync {
    /// Premium players skip the lives gate.
    fn is_premium(&self) -> bool;
}

#[async_trait]
impl<T: LevelSource + ?Sized> LevelSource for Arc<T> {
    async fn level_by_number(&self, number: u32) -> GameResult<Option<Level>> {
        (**self).level_by_number(number).await
    }

    async fn max_level_number(&self) -> GameResult<u32> {
        (**self).max_level_number().await
    }
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> GameResult<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: String) -> GameResult<()> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> GameResult<()> {
        (**self).remove(key).await
    }

    async fn keys(&self) -> GameResult<Vec<String>> {
        (**self).keys().await
    }

    async fn multi_set(&self, entries: Vec<(String, String)>) -> GameResult<()> {
        (**self).multi_set(entries).await
    }

    async fn multi_remove(&self, keys: Vec<String>) -> GameResult<()> {
        (**self).multi_remove(keys).await
    }
}

#[async_trait]
impl<T: AccountStore + ?Sized> AccountStore for Arc<T> {
    async fn user_progress(&self, account_id: &str) -> GameResult<Option<CloudProgressRecord>> {
        (**self).user_progress(account_id).await
    }

    async fn set_user_progress(
        &self,
        account_id: &str,
        record: CloudProgressRecord,
    ) -> GameResult<()> {
        (**self).set_user_progress(account_id, record).await
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock_unpoisoned<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
