//! Reconciliation between device progress and the account's cloud record.
//!
//! Conflict policy is "highest completed level wins, most recent play breaks
//! ties". Records are never merged field by field: the losing side is
//! overwritten wholesale.
//!
//! Only one sync runs at a time. A request that arrives while another is in
//! flight is dropped and reported as [`SyncOutcome::Busy`].

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::GameResult;
use crate::level::highest_level_number;
use crate::progress::{ProgressRecord, ProgressStore, SyncInbox};
use crate::{AccountStore, Clock, KeyValueStore, lock_unpoisoned};

/// Progress as stored on the account document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudProgressRecord {
    pub completed_levels: Vec<String>,
    pub last_played_level: Option<String>,
    pub last_played_at: i64,
    pub last_sync_at: i64,
    pub total_levels_completed: u32,
}

impl CloudProgressRecord {
    /// Snapshot of `local` stamped with `synced_at`.
    #[must_use]
    pub fn from_local(local: &ProgressRecord, synced_at: i64) -> Self {
        let completed_levels: Vec<String> = local.completed_levels.iter().cloned().collect();
        Self {
            total_levels_completed: u32::try_from(completed_levels.len()).unwrap_or(u32::MAX),
            completed_levels,
            last_played_level: local.last_played_level.clone(),
            last_played_at: local.last_played_at,
            last_sync_at: synced_at,
        }
    }

    #[must_use]
    pub fn to_local(&self) -> ProgressRecord {
        ProgressRecord {
            completed_levels: self.completed_levels.iter().cloned().collect(),
            last_played_level: self.last_played_level.clone(),
            last_played_at: self.last_played_at,
        }
    }

    /// Derived from the ids on every call; never stored.
    #[must_use]
    pub fn highest_completed_level_number(&self) -> u32 {
        highest_level_number(&self.completed_levels)
    }
}

/// What a sync request ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncOutcome {
    /// Local progress overwrote the cloud record.
    Pushed,
    /// The cloud record overwrote local progress.
    Pulled,
    /// Both sides matched; only the cloud sync timestamp moved.
    Refreshed,
    /// Nothing to pull from an absent cloud record.
    Unchanged,
    /// Another sync was in flight; this one was dropped.
    Busy,
    /// No authenticated account.
    NoSession,
}

/// Clears the in-flight flag when the sync finishes, however it finishes.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncReconciler<A, K, C> {
    accounts: A,
    progress: Arc<ProgressStore<K, C>>,
    clock: C,
    syncing: AtomicBool,
    session: Mutex<Option<String>>,
}

impl<A, K, C> SyncReconciler<A, K, C>
where
    A: AccountStore,
    K: KeyValueStore,
    C: Clock,
{
    pub fn new(accounts: A, progress: Arc<ProgressStore<K, C>>, clock: C) -> Self {
        Self {
            accounts,
            progress,
            clock,
            syncing: AtomicBool::new(false),
            session: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn current_account(&self) -> Option<String> {
        lock_unpoisoned(&self.session).clone()
    }

    fn set_session(&self, account_id: &str) {
        *lock_unpoisoned(&self.session) = Some(account_id.to_string());
    }

    pub fn sign_out(&self) {
        lock_unpoisoned(&self.session).take();
    }

    /// A new account has no meaningful cloud record: local progress is
    /// written to it wholesale.
    ///
    /// The session is recorded only once the upload lands; a failed or
    /// dropped registration leaves the previous session in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the account store rejects the write.
    pub async fn on_register(&self, account_id: &str) -> GameResult<SyncOutcome> {
        let Some(_in_flight) = InFlight::acquire(&self.syncing) else {
            return Ok(SyncOutcome::Busy);
        };
        self.push(account_id).await?;
        self.set_session(account_id);
        info!("registered {account_id}: local progress uploaded");
        Ok(SyncOutcome::Pushed)
    }

    /// Reconcile with an existing account's cloud record.
    ///
    /// The session is recorded only after reconciliation succeeds, so
    /// background pushes never run against a cloud record that was not
    /// compared first.
    ///
    /// # Errors
    ///
    /// Returns an error if the account store cannot be read or written.
    pub async fn on_login(&self, account_id: &str) -> GameResult<SyncOutcome> {
        let Some(_in_flight) = InFlight::acquire(&self.syncing) else {
            return Ok(SyncOutcome::Busy);
        };
        let outcome = self.reconcile(account_id).await?;
        self.set_session(account_id);
        info!("login {account_id}: {outcome:?}");
        Ok(outcome)
    }

    async fn reconcile(&self, account_id: &str) -> GameResult<SyncOutcome> {
        let local = self.progress.get().await;
        let Some(cloud) = self.accounts.user_progress(account_id).await? else {
            self.push_record(account_id, &local).await?;
            debug!("login {account_id}: no cloud record, uploading local progress");
            return Ok(SyncOutcome::Pushed);
        };

        let local_highest = local.highest_completed_level_number();
        let cloud_highest = cloud.highest_completed_level_number();
        debug!(
            "login {account_id}: local highest {local_highest} (at {}), \
             cloud highest {cloud_highest} (at {})",
            local.last_played_at, cloud.last_played_at
        );

        let ordering = local_highest
            .cmp(&cloud_highest)
            .then(local.last_played_at.cmp(&cloud.last_played_at));
        let outcome = match ordering {
            std::cmp::Ordering::Greater => {
                self.push_record(account_id, &local).await?;
                SyncOutcome::Pushed
            }
            std::cmp::Ordering::Less => {
                self.progress.replace(cloud.to_local()).await;
                SyncOutcome::Pulled
            }
            std::cmp::Ordering::Equal => {
                let refreshed = CloudProgressRecord {
                    last_sync_at: self.clock.now_millis(),
                    ..cloud
                };
                self.accounts
                    .set_user_progress(account_id, refreshed)
                    .await?;
                SyncOutcome::Refreshed
            }
        };
        Ok(outcome)
    }

    /// Overwrite the cloud record with local progress. A `None` account is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the account store rejects the write.
    pub async fn push_to_cloud(&self, account_id: Option<&str>) -> GameResult<SyncOutcome> {
        let Some(account_id) = account_id else {
            return Ok(SyncOutcome::NoSession);
        };
        let Some(_in_flight) = InFlight::acquire(&self.syncing) else {
            return Ok(SyncOutcome::Busy);
        };
        self.push(account_id).await?;
        Ok(SyncOutcome::Pushed)
    }

    /// Overwrite local progress with the cloud record. A `None` account is a
    /// no-op, as is an account without a cloud record.
    ///
    /// # Errors
    ///
    /// Returns an error if the account store cannot be read.
    pub async fn pull_from_cloud(&self, account_id: Option<&str>) -> GameResult<SyncOutcome> {
        let Some(account_id) = account_id else {
            return Ok(SyncOutcome::NoSession);
        };
        let Some(_in_flight) = InFlight::acquire(&self.syncing) else {
            return Ok(SyncOutcome::Busy);
        };
        match self.accounts.user_progress(account_id).await? {
            Some(cloud) => {
                self.progress.replace(cloud.to_local()).await;
                Ok(SyncOutcome::Pulled)
            }
            None => Ok(SyncOutcome::Unchanged),
        }
    }

    async fn push(&self, account_id: &str) -> GameResult<()> {
        let local = self.progress.get().await;
        self.push_record(account_id, &local).await
    }

    async fn push_record(&self, account_id: &str, local: &ProgressRecord) -> GameResult<()> {
        let record = CloudProgressRecord::from_local(local, self.clock.now_millis());
        self.accounts.set_user_progress(account_id, record).await
    }

    /// Consume every queued intent and push once for the current session.
    /// Failures are logged and dropped. Returns the number of intents taken.
    pub async fn drain_outbox(&self, inbox: &mut SyncInbox) -> usize {
        let taken = inbox.drain().len();
        if taken > 0 {
            self.push_for_session().await;
        }
        taken
    }

    async fn push_for_session(&self) {
        let account = self.current_account();
        match self.push_to_cloud(account.as_deref()).await {
            Ok(outcome) => debug!("background sync: {outcome:?}"),
            Err(err) => warn!("background sync failed: {err}"),
        }
    }
}

impl<A, K, C> SyncReconciler<A, K, C>
where
    A: AccountStore + 'static,
    K: KeyValueStore + 'static,
    C: Clock + 'static,
{
    /// Push after every burst of local mutations until the outbox closes.
    pub fn run_outbox(self: Arc<Self>, mut inbox: SyncInbox) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while inbox.recv().await.is_some() {
                inbox.drain();
                self.push_for_session().await;
            }
            debug!("sync outbox closed; worker exiting");
        })
    }
}
