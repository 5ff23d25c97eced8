//! Regenerating lives counter.
//!
//! Regeneration is computed lazily from elapsed time on every read; there is
//! no background timer. `last_regeneration_time` only ever advances by whole
//! intervals so partial progress toward the next life survives restarts.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::EngineConfig;
use crate::constants::LIVES_KEY;
use crate::{Clock, KeyValueStore, storage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivesState {
    pub current_lives: u32,
    /// Epoch millis the current regeneration interval started at.
    pub last_regeneration_time: i64,
}

impl LivesState {
    #[must_use]
    pub const fn full(max_lives: u32, now: i64) -> Self {
        Self {
            current_lives: max_lives,
            last_regeneration_time: now,
        }
    }

    /// Apply every whole interval elapsed since the last regeneration.
    /// Returns whether anything changed.
    pub fn regenerate(&mut self, now: i64, max_lives: u32, interval_ms: i64) -> bool {
        if self.current_lives >= max_lives || interval_ms <= 0 {
            return false;
        }
        let elapsed = now.saturating_sub(self.last_regeneration_time);
        let whole_intervals = elapsed.div_euclid(interval_ms);
        if whole_intervals <= 0 {
            return false;
        }
        let gained = u32::try_from(whole_intervals).unwrap_or(u32::MAX);
        self.current_lives = self.current_lives.saturating_add(gained).min(max_lives);
        self.last_regeneration_time = self
            .last_regeneration_time
            .saturating_add(whole_intervals.saturating_mul(interval_ms));
        true
    }
}

/// Lives state plus the countdown a UI needs, read in one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LivesSnapshot {
    pub state: LivesState,
    pub next_life_in: Duration,
    pub max_lives: u32,
}

pub struct LivesRegulator<K, C> {
    store: K,
    clock: C,
    key: String,
    max_lives: u32,
    interval_ms: i64,
    state: Mutex<Option<LivesState>>,
}

impl<K, C> LivesRegulator<K, C>
where
    K: KeyValueStore,
    C: Clock,
{
    pub fn new(store: K, clock: C, config: &EngineConfig) -> Self {
        Self {
            store,
            clock,
            key: config.key(LIVES_KEY),
            max_lives: config.max_lives,
            interval_ms: config.regen_interval_ms.max(1),
            state: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn max_lives(&self) -> u32 {
        self.max_lives
    }

    async fn load(&self, slot: &mut Option<LivesState>, now: i64) -> LivesState {
        if let Some(state) = *slot {
            return state;
        }
        let mut state = storage::read::<LivesState, _>(&self.store, &self.key)
            .await
            .unwrap_or_else(|| LivesState::full(self.max_lives, now));
        state.current_lives = state.current_lives.min(self.max_lives);
        *slot = Some(state);
        state
    }

    async fn persist(&self, slot: &mut Option<LivesState>, state: LivesState) {
        *slot = Some(state);
        if let Err(err) = storage::write(&self.store, &self.key, &state).await {
            warn!("lives write failed, keeping in-memory copy: {err}");
        }
    }

    /// Load the state and apply regeneration, persisting when it changed.
    async fn regenerated(&self, slot: &mut Option<LivesState>, now: i64) -> LivesState {
        let mut state = self.load(slot, now).await;
        if state.regenerate(now, self.max_lives, self.interval_ms) {
            debug!("lives regenerated to {}", state.current_lives);
            self.persist(slot, state).await;
        }
        state
    }

    /// Current lives with regeneration applied.
    pub async fn get_state(&self) -> LivesState {
        let now = self.clock.now_millis();
        let mut slot = self.state.lock().await;
        self.regenerated(&mut slot, now).await
    }

    pub async fn can_play(&self) -> bool {
        self.get_state().await.current_lives > 0
    }

    /// Spend one life. Returns `false` without changing anything when none
    /// are left.
    ///
    /// Spending from a full pool also sets `last_regeneration_time` to now:
    /// the regeneration interval starts when the pool leaves the cap, not at
    /// whatever older time the full state was last written.
    pub async fn consume(&self) -> bool {
        let now = self.clock.now_millis();
        let mut slot = self.state.lock().await;
        let mut state = self.regenerated(&mut slot, now).await;
        if state.current_lives == 0 {
            return false;
        }
        if state.current_lives >= self.max_lives {
            state.last_regeneration_time = now;
        }
        state.current_lives -= 1;
        self.persist(&mut slot, state).await;
        true
    }

    /// Refill to the cap and restart the interval, e.g. after a rewarded ad.
    pub async fn grant_full(&self) {
        let now = self.clock.now_millis();
        let mut slot = self.state.lock().await;
        self.persist(&mut slot, LivesState::full(self.max_lives, now))
            .await;
    }

    /// Zero at the cap, otherwise the rest of the running interval.
    pub async fn time_until_next_life(&self) -> Duration {
        self.snapshot().await.next_life_in
    }

    pub async fn snapshot(&self) -> LivesSnapshot {
        let now = self.clock.now_millis();
        let state = self.get_state().await;
        let next_life_in = if state.current_lives >= self.max_lives {
            Duration::ZERO
        } else {
            let elapsed = now
                .saturating_sub(state.last_regeneration_time)
                .clamp(0, self.interval_ms);
            let remaining = self.interval_ms - elapsed;
            Duration::from_millis(u64::try_from(remaining).unwrap_or(0))
        };
        LivesSnapshot {
            state,
            next_life_in,
            max_lives: self.max_lives,
        }
    }
}
