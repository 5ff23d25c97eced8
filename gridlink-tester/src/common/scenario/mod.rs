pub mod catalog;

use crate::logic::SimulationPlan;
use catalog::catalog_scenarios;

/// A named simulation plan with its expectations.
#[derive(Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub plan: SimulationPlan,
}

impl TestScenario {
    #[must_use]
    pub fn simulation(name: impl Into<String>, plan: SimulationPlan) -> Self {
        Self {
            name: name.into(),
            plan,
        }
    }
}

/// Look a scenario up by CLI key or alias.
pub fn get_scenario(key: &str) -> Option<TestScenario> {
    let key = key.to_lowercase();
    catalog_scenarios()
        .into_iter()
        .find(|entry| entry.key == key || entry.aliases.contains(&key.as_str()))
        .map(|entry| TestScenario::simulation(entry.name, entry.plan))
}

pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    catalog_scenarios()
        .into_iter()
        .map(|entry| (entry.key, entry.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_and_aliases_resolve() {
        assert_eq!(get_scenario("smoke").unwrap().name, "Smoke Test");
        assert_eq!(get_scenario("SYNC").unwrap().name, "Cloud Sync Across Devices");
        assert!(get_scenario("nope").is_none());
    }

    #[test]
    fn every_listed_scenario_resolves() {
        let listed = list_scenarios();
        assert!(listed.len() >= 8);
        for (key, name) in listed {
            assert_eq!(get_scenario(key).map(|s| s.name), Some(name.to_string()));
        }
    }
}
