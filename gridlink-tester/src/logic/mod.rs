pub mod fixtures;
pub mod reports;
pub mod seeds;
pub mod simulation;
pub mod tester;

pub use seeds::resolve_seed_inputs;
pub use simulation::{AccountMode, PlayStrategy, SimulationPlan, SimulationSummary};
pub use tester::*;
