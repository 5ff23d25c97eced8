//! Device-local progress: completed levels and the last level played.
//!
//! The durable copy is the source of truth for the session. Mutations are
//! serialized behind an async mutex, persisted immediately and then announce
//! themselves on the [`SyncOutbox`]; whoever drains the outbox decides whether
//! and when to push to the cloud.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tokio::sync::{Mutex, mpsc};

use crate::config::EngineConfig;
use crate::constants::PROGRESS_KEY;
use crate::level::highest_level_number;
use crate::{Clock, KeyValueStore, storage};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProgressRecord {
    pub completed_levels: BTreeSet<String>,
    pub last_played_level: Option<String>,
    /// Epoch millis of the last completion or level start; 0 when never played.
    pub last_played_at: i64,
}

impl ProgressRecord {
    #[must_use]
    pub fn is_completed(&self, level_id: &str) -> bool {
        self.completed_levels.contains(level_id)
    }

    /// Highest level number among the completed ids; unparseable ids are skipped.
    #[must_use]
    pub fn highest_completed_level_number(&self) -> u32 {
        highest_level_number(&self.completed_levels)
    }
}

/// A request to reconcile local progress outward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncIntent {
    Push,
}

/// Producer half of the sync intent queue. Sending never blocks or fails the
/// caller; a detached outbox silently discards.
#[derive(Debug, Clone, Default)]
pub struct SyncOutbox {
    tx: Option<mpsc::UnboundedSender<SyncIntent>>,
}

impl SyncOutbox {
    #[must_use]
    pub const fn detached() -> Self {
        Self { tx: None }
    }

    pub fn enqueue(&self, intent: SyncIntent) {
        if let Some(tx) = &self.tx
            && tx.send(intent).is_err()
        {
            debug!("sync outbox closed; dropping {intent:?}");
        }
    }
}

/// Consumer half of the sync intent queue.
#[derive(Debug)]
pub struct SyncInbox {
    rx: mpsc::UnboundedReceiver<SyncIntent>,
}

impl SyncInbox {
    /// Take every intent queued so far without waiting.
    pub fn drain(&mut self) -> Vec<SyncIntent> {
        let mut intents = Vec::new();
        while let Ok(intent) = self.rx.try_recv() {
            intents.push(intent);
        }
        intents
    }

    /// Wait for the next intent; `None` once every outbox is dropped.
    pub async fn recv(&mut self) -> Option<SyncIntent> {
        self.rx.recv().await
    }
}

#[must_use]
pub fn sync_channel() -> (SyncOutbox, SyncInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SyncOutbox { tx: Some(tx) }, SyncInbox { rx })
}

pub struct ProgressStore<K, C> {
    store: K,
    clock: C,
    key: String,
    outbox: SyncOutbox,
    record: Mutex<Option<ProgressRecord>>,
}

impl<K, C> ProgressStore<K, C>
where
    K: KeyValueStore,
    C: Clock,
{
    pub fn new(store: K, clock: C, config: &EngineConfig) -> Self {
        Self {
            store,
            clock,
            key: config.key(PROGRESS_KEY),
            outbox: SyncOutbox::detached(),
            record: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_outbox(mut self, outbox: SyncOutbox) -> Self {
        self.outbox = outbox;
        self
    }

    async fn load_into(&self, slot: &mut Option<ProgressRecord>) -> ProgressRecord {
        if let Some(record) = slot.as_ref() {
            return record.clone();
        }
        let record = storage::read::<ProgressRecord, _>(&self.store, &self.key)
            .await
            .unwrap_or_default();
        *slot = Some(record.clone());
        record
    }

    async fn persist(&self, record: &ProgressRecord) {
        if let Err(err) = storage::write(&self.store, &self.key, record).await {
            warn!("progress write failed, keeping in-memory copy: {err}");
        }
    }

    /// Apply `edit` to the current record, persist it and queue a sync.
    async fn mutate<F, R>(&self, edit: F) -> R
    where
        F: FnOnce(&mut ProgressRecord, i64) -> R + Send,
        R: Send,
    {
        let mut slot = self.record.lock().await;
        let mut record = self.load_into(&mut slot).await;
        let result = edit(&mut record, self.clock.now_millis());
        self.persist(&record).await;
        *slot = Some(record);
        drop(slot);
        self.outbox.enqueue(SyncIntent::Push);
        result
    }

    /// Current record; corrupt or unreadable storage reads as empty.
    pub async fn get(&self) -> ProgressRecord {
        let mut slot = self.record.lock().await;
        self.load_into(&mut slot).await
    }

    /// Record `level_id` as completed. Returns whether it was new; the
    /// last-played timestamp advances either way.
    pub async fn mark_completed(&self, level_id: &str) -> bool {
        let level_id = level_id.to_string();
        self.mutate(move |record, now| {
            record.last_played_at = now;
            record.completed_levels.insert(level_id)
        })
        .await
    }

    pub async fn set_last_played(&self, level_id: &str) {
        let level_id = level_id.to_string();
        self.mutate(move |record, now| {
            record.last_played_level = Some(level_id);
            record.last_played_at = now;
        })
        .await;
    }

    pub async fn is_completed(&self, level_id: &str) -> bool {
        self.get().await.is_completed(level_id)
    }

    pub async fn highest_completed_level_number(&self) -> u32 {
        self.get().await.highest_completed_level_number()
    }

    pub async fn completed_count(&self) -> usize {
        self.get().await.completed_levels.len()
    }

    pub async fn last_played_level(&self) -> Option<String> {
        self.get().await.last_played_level
    }

    /// Reset to an empty record.
    pub async fn clear(&self) {
        self.mutate(|record, _| *record = ProgressRecord::default())
            .await;
    }

    /// Overwrite local progress wholesale, e.g. after pulling from the cloud.
    /// Does not queue a sync.
    pub async fn replace(&self, record: ProgressRecord) {
        let mut slot = self.record.lock().await;
        self.persist(&record).await;
        *slot = Some(record);
    }
}
