use colored::Colorize;
use gridlink_game::EngineConfig;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::common::scenario::TestScenario;
use crate::logic::simulation::{Simulation, SimulationPlan, SimulationSummary};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub seed: u64,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    #[serde(with = "duration_serde")]
    pub average_duration: Duration,
    #[serde(with = "duration_vec_serde")]
    pub performance_data: Vec<Duration>,
}

pub struct LogicTester {
    simulation: Simulation,
    verbose: bool,
}

impl LogicTester {
    #[must_use]
    pub const fn new(config: EngineConfig, verbose: bool) -> Self {
        Self {
            simulation: Simulation::new(config, verbose),
            verbose,
        }
    }

    pub async fn run_scenario(
        &self,
        scenario: &TestScenario,
        seeds: &[u64],
        iterations: usize,
    ) -> Vec<ScenarioResult> {
        let mut results = Vec::new();

        for &seed in seeds {
            if self.verbose {
                println!(
                    "🧪 Testing scenario: {} (strategy: {} seed: {})",
                    scenario.name.bright_white(),
                    scenario.plan.strategy.label(),
                    seed
                );
            }
            results.push(self.run_single_scenario(scenario, seed, iterations).await);
        }

        results
    }

    async fn run_single_scenario(
        &self,
        scenario: &TestScenario,
        seed: u64,
        iterations: usize,
    ) -> ScenarioResult {
        let mut successes = 0;
        let mut failures = Vec::new();
        let mut performance_data = Vec::new();

        for i in 0..iterations {
            let start_time = Instant::now();
            let iteration_seed = seed.wrapping_add(u64::try_from(i).unwrap_or(u64::MAX));
            let summary = self
                .simulation
                .run_plan(&scenario.plan, iteration_seed)
                .await;

            if let Some(err) = evaluate_expectations(&scenario.plan, &summary) {
                failures.push(format!(
                    "Iteration {} (strategy {}, seed {}, sessions {}, attempts {}, highest {}): {} | {}",
                    i + 1,
                    summary.strategy.label(),
                    summary.seed,
                    summary.sessions.len(),
                    summary.attempts,
                    summary.highest_completed,
                    err,
                    summarize_sessions(&summary)
                ));
                if self.verbose {
                    println!("  ❌ Iteration {}/{} failed: {}", i + 1, iterations, err.red());
                }
            } else {
                successes += 1;
                let duration = start_time.elapsed();
                performance_data.push(duration);
                if self.verbose {
                    println!(
                        "  ✅ Iteration {}/{} passed ({duration:?}) completed:{} lives:{}",
                        i + 1,
                        iterations,
                        summary.completed_count,
                        summary.final_lives.current_lives
                    );
                }
            }
        }

        let average_duration = if performance_data.is_empty() {
            Duration::ZERO
        } else {
            performance_data.iter().sum::<Duration>()
                / u32::try_from(performance_data.len()).unwrap_or(1)
        };

        ScenarioResult {
            scenario_name: scenario.name.clone(),
            seed,
            passed: failures.is_empty(),
            iterations_run: iterations,
            successful_iterations: successes,
            failures,
            average_duration,
            performance_data,
        }
    }
}

fn evaluate_expectations(plan: &SimulationPlan, summary: &SimulationSummary) -> Option<String> {
    plan.expectations
        .iter()
        .find_map(|expectation| expectation.evaluate(summary).err())
        .map(|err| format!("{err:#}"))
}

fn summarize_sessions(summary: &SimulationSummary) -> String {
    summary
        .sessions
        .iter()
        .enumerate()
        .map(|(i, session)| {
            format!(
                "session {}: {}/{} solved, window {}..={}{}",
                i + 1,
                session.completions,
                session.attempts,
                session.window.start,
                session.window.end,
                if session.blocked_by_lives {
                    ", out of lives"
                } else {
                    ""
                }
            )
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u128::deserialize(deserializer)?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}

mod duration_vec_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis: Vec<u128> = durations.iter().map(Duration::as_millis).collect();
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis_vec = Vec::<u128>::deserialize(deserializer)?;
        Ok(millis_vec
            .into_iter()
            .map(|m| Duration::from_millis(u64::try_from(m).unwrap_or(0)))
            .collect())
    }
}
