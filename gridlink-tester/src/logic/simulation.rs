use anyhow::Result;
use gridlink_game::{
    Cell, CloudProgressRecord, EngineConfig, GameError, Grid, GridlinkEngine, LevelWindow,
    LivesState, ManualClock, MemoryAccountStore, MemoryKeyValueStore, MemoryLevelSource,
    StartupReport, StaticEntitlements, SyncOutcome, Trace, TraceStep,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::fixtures::{botched_path, catalogue};

/// Fixed epoch for every run so reports are reproducible.
const START_MILLIS: i64 = 1_700_000_000_000;
const ACCOUNT_ID: &str = "tester";

type Engine =
    GridlinkEngine<MemoryLevelSource, MemoryKeyValueStore, MemoryAccountStore, ManualClock>;

/// How the simulated player behaves once inside a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayStrategy {
    /// Always drags the right path.
    Perfect,
    /// Fails roughly a third of attempts first.
    Sloppy,
    /// Plays sloppily and watches an ad whenever lives run out.
    AdWatcher,
}

impl PlayStrategy {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Perfect => "perfect",
            Self::Sloppy => "sloppy",
            Self::AdWatcher => "ad-watcher",
        }
    }

    const fn botch_rate(self) -> f64 {
        match self {
            Self::Perfect => 0.0,
            Self::Sloppy | Self::AdWatcher => 0.35,
        }
    }
}

/// Whether and how the run involves a cloud account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountMode {
    Anonymous,
    /// Register on the first session, log in on later ones.
    Registered,
    /// As `Registered`, then log in from a fresh device at the end.
    SecondDevice,
}

/// Assertion hook run after a simulation completes.
type SimulationExpectationFn = Arc<dyn Fn(&SimulationSummary) -> Result<()> + Send + Sync>;

#[derive(Clone)]
pub struct SimulationExpectation(SimulationExpectationFn);

impl std::fmt::Debug for SimulationExpectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationExpectation").finish()
    }
}

impl SimulationExpectation {
    /// # Errors
    ///
    /// Returns the expectation's failure.
    pub fn evaluate(&self, summary: &SimulationSummary) -> Result<()> {
        (self.0)(summary)
    }
}

impl<F> From<F> for SimulationExpectation
where
    F: Fn(&SimulationSummary) -> Result<()> + Send + Sync + 'static,
{
    fn from(f: F) -> Self {
        Self(Arc::new(f))
    }
}

#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub strategy: PlayStrategy,
    pub accounts: AccountMode,
    pub sessions: u32,
    /// Time the app stays closed between sessions.
    pub gap_minutes: i64,
    /// Upper bound on level entries per session.
    pub attempts_per_session: u32,
    pub premium: bool,
    /// Take the level store offline right after startup of this session
    /// (zero-based) and keep it offline.
    pub offline_from_session: Option<u32>,
    pub levels: u32,
    pub expectations: Vec<SimulationExpectation>,
}

impl SimulationPlan {
    #[must_use]
    pub const fn new(strategy: PlayStrategy) -> Self {
        Self {
            strategy,
            accounts: AccountMode::Anonymous,
            sessions: 1,
            gap_minutes: 0,
            attempts_per_session: 12,
            premium: false,
            offline_from_session: None,
            levels: 60,
            expectations: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_sessions(mut self, sessions: u32, gap_minutes: i64) -> Self {
        self.sessions = sessions;
        self.gap_minutes = gap_minutes;
        self
    }

    #[must_use]
    pub const fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts_per_session = attempts;
        self
    }

    #[must_use]
    pub const fn with_accounts(mut self, accounts: AccountMode) -> Self {
        self.accounts = accounts;
        self
    }

    #[must_use]
    pub const fn premium(mut self) -> Self {
        self.premium = true;
        self
    }

    #[must_use]
    pub const fn offline_from(mut self, session: u32) -> Self {
        self.offline_from_session = Some(session);
        self
    }

    #[must_use]
    pub const fn with_levels(mut self, levels: u32) -> Self {
        self.levels = levels;
        self
    }

    #[must_use]
    pub fn with_expectation(mut self, expectation: impl Into<SimulationExpectation>) -> Self {
        self.expectations.push(expectation.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub startup: StartupReport,
    pub sync: Option<SyncOutcome>,
    pub window: LevelWindow,
    pub window_levels: usize,
    pub attempts: u32,
    pub completions: u32,
    pub blocked_by_lives: bool,
    pub fetch_errors: u32,
}

/// Complete record of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    pub seed: u64,
    pub strategy: PlayStrategy,
    pub config: EngineConfig,
    pub level_count: u32,
    pub sessions: Vec<SessionReport>,
    pub attempts: u32,
    pub failed_traces: u32,
    pub ads_watched: u32,
    pub fetch_errors: u32,
    pub highest_completed: u32,
    pub completed_count: usize,
    pub total_fetches: usize,
    pub final_lives: LivesState,
    pub final_window: LevelWindow,
    pub cloud: Option<CloudProgressRecord>,
    pub second_device_completed: Option<usize>,
}

impl SimulationSummary {
    #[must_use]
    pub fn completions(&self) -> u32 {
        self.sessions.iter().map(|s| s.completions).sum()
    }
}

/// Everything that outlives a single app session.
struct World {
    source: MemoryLevelSource,
    accounts: MemoryAccountStore,
    store: MemoryKeyValueStore,
    clock: ManualClock,
    config: EngineConfig,
    premium: bool,
}

impl World {
    fn boot(&self) -> Engine {
        self.boot_on(self.store.clone())
    }

    fn boot_on(&self, store: MemoryKeyValueStore) -> Engine {
        GridlinkEngine::new(
            self.config.clone(),
            self.source.clone(),
            store,
            self.accounts.clone(),
            self.clock.clone(),
            Arc::new(StaticEntitlements {
                premium: self.premium,
            }),
        )
    }
}

#[derive(Default)]
struct Tally {
    failed_traces: u32,
    ads_watched: u32,
}

/// Headless player driving the engine through whole sessions.
pub struct Simulation {
    config: EngineConfig,
    verbose: bool,
}

impl Simulation {
    #[must_use]
    pub const fn new(config: EngineConfig, verbose: bool) -> Self {
        Self { config, verbose }
    }

    pub async fn run_plan(&self, plan: &SimulationPlan, seed: u64) -> SimulationSummary {
        let world = World {
            source: catalogue(seed, plan.levels),
            accounts: MemoryAccountStore::new(),
            store: MemoryKeyValueStore::new(),
            clock: ManualClock::starting_at(START_MILLIS),
            config: self.config.clone(),
            premium: plan.premium,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut tally = Tally::default();
        let mut sessions = Vec::new();

        for index in 0..plan.sessions {
            if index > 0 {
                world.clock.advance_minutes(plan.gap_minutes);
            }
            let engine = world.boot();
            let startup = engine.startup().await;
            if plan.offline_from_session.is_some_and(|from| index >= from) {
                world.source.set_offline(true);
            }
            let report = self
                .play_session(&engine, plan, index, startup, &mut rng, &mut tally)
                .await;
            if self.verbose {
                println!(
                    "     session {}: {} attempts, {} completions, window {}..={}",
                    index + 1,
                    report.attempts,
                    report.completions,
                    report.window.start,
                    report.window.end
                );
            }
            sessions.push(report);
        }

        let engine = world.boot();
        let final_lives = engine.lives().get_state().await;
        let progress = engine.progress().get().await;
        let second_device_completed = if plan.accounts == AccountMode::SecondDevice {
            let tablet = world.boot_on(MemoryKeyValueStore::new());
            match tablet.login(ACCOUNT_ID).await {
                Ok(_) => Some(tablet.progress().completed_count().await),
                Err(err) => {
                    log::warn!("second device login failed: {err}");
                    None
                }
            }
        } else {
            None
        };

        SimulationSummary {
            seed,
            strategy: plan.strategy,
            config: self.config.clone(),
            level_count: plan.levels,
            attempts: sessions.iter().map(|s| s.attempts).sum(),
            fetch_errors: sessions.iter().map(|s| s.fetch_errors).sum(),
            failed_traces: tally.failed_traces,
            ads_watched: tally.ads_watched,
            highest_completed: progress.highest_completed_level_number(),
            completed_count: progress.completed_levels.len(),
            total_fetches: world.source.total_fetches(),
            final_lives,
            final_window: sessions.last().map_or(LevelWindow::empty(), |s| s.window),
            cloud: world.accounts.record(ACCOUNT_ID),
            second_device_completed,
            sessions,
        }
    }

    async fn play_session(
        &self,
        engine: &Engine,
        plan: &SimulationPlan,
        index: u32,
        startup: StartupReport,
        rng: &mut ChaCha8Rng,
        tally: &mut Tally,
    ) -> SessionReport {
        let sync = match plan.accounts {
            AccountMode::Anonymous => None,
            _ if index == 0 => engine.register(ACCOUNT_ID).await.ok(),
            _ => engine.login(ACCOUNT_ID).await.ok(),
        };
        let view = engine.load_window().await;

        let mut report = SessionReport {
            startup,
            sync,
            window: view.window,
            window_levels: view.levels.len(),
            attempts: 0,
            completions: 0,
            blocked_by_lives: false,
            fetch_errors: 0,
        };

        let mut ads_this_session = 0;
        while report.attempts < plan.attempts_per_session {
            let next = engine.progress().highest_completed_level_number().await + 1;
            if next > engine.known_max_level() {
                break;
            }
            let opened = match engine.open_level(next).await {
                Ok(opened) => opened,
                Err(GameError::NoLivesRemaining)
                    if plan.strategy == PlayStrategy::AdWatcher && ads_this_session < 3 =>
                {
                    ads_this_session += 1;
                    tally.ads_watched += 1;
                    engine.on_rewarded_ad_completed().await;
                    continue;
                }
                Err(GameError::NoLivesRemaining) => {
                    report.blocked_by_lives = true;
                    break;
                }
                Err(err) => {
                    log::debug!("open {next} failed: {err}");
                    report.fetch_errors += 1;
                    if !err.is_retryable() || report.fetch_errors >= 3 {
                        break;
                    }
                    continue;
                }
            };
            report.attempts += 1;

            let path = if rng.gen_bool(plan.strategy.botch_rate()) {
                botched_path(&opened.level)
            } else {
                drag(&opened.level.grid, &opened.level.solution)
            };
            let outcome = engine.submit_trace(&opened.level, &path).await;
            if outcome.solved {
                report.completions += 1;
            } else {
                tally.failed_traces += 1;
            }
        }

        engine.flush_sync().await;
        let next = engine.progress().highest_completed_level_number().await + 1;
        report.window = engine.navigate_to(next).await.window;
        report
    }
}

/// Replay `cells` through the trace editor the way a pointer drag would.
fn drag(grid: &Grid, cells: &[Cell]) -> Vec<Cell> {
    let mut trace = Trace::new();
    for cell in cells {
        if let TraceStep::Rejected(reason) = trace.extend(grid, cell.x, cell.y) {
            log::debug!("drag stopped at ({}, {}): {reason:?}", cell.x, cell.y);
            break;
        }
    }
    trace.cells().to_vec()
}
