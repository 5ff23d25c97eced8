mod common;
mod logic;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::time::Instant;

use common::scenario::{get_scenario, list_scenarios};
use common::split_csv;
use common::util::load_config;
use gridlink_game::EngineConfig;
use logic::{LogicTester, resolve_seed_inputs};

#[derive(Debug, Parser)]
#[command(name = "gridlink-tester", version)]
#[command(about = "Headless QA runs of the Gridlink engine: levels, lives, cache and cloud sync")]
struct Args {
    /// Scenarios to run (comma-separated, or "all")
    #[arg(long, default_value = "smoke")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Seeds to run (comma-separated, decimal or 0x-prefixed)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Number of iterations per scenario and seed
    #[arg(long, default_value_t = 10)]
    iterations: usize,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console"])]
    report: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Engine configuration JSON; defaults apply to absent fields
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    announce_banner();

    let start_time = Instant::now();
    let config = load_config(args.config.as_deref())?;
    let scenarios = expand_scenarios(&args.scenarios);
    let seeds = resolve_seed_inputs(&split_csv(&args.seeds))?;

    let all_results = run_logic_scenarios(&args, config, &scenarios, &seeds).await;

    write_reports(&args, &all_results, start_time)?;

    if all_results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }

    Ok(())
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(output_target.writer(), "  {key:25} - {description}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "🎮 Gridlink Automated Tester".bright_cyan().bold());
    println!("{}", "================================".cyan());
}

fn expand_scenarios(scenarios_arg: &str) -> Vec<String> {
    let mut scenarios = split_csv(scenarios_arg);
    if scenarios.iter().any(|s| s == "all") {
        scenarios.retain(|s| s != "all");
        for (key, _) in list_scenarios() {
            if !scenarios.iter().any(|s| s == key) {
                scenarios.push(key.to_string());
            }
        }
    }
    scenarios
}

async fn run_logic_scenarios(
    args: &Args,
    config: EngineConfig,
    scenarios: &[String],
    seeds: &[u64],
) -> Vec<logic::ScenarioResult> {
    println!("{}", "🧠 Running Logic Tests".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    let logic_tester = LogicTester::new(config, args.verbose);
    let mut results = Vec::new();

    for scenario_name in scenarios {
        if let Some(scenario) = get_scenario(scenario_name) {
            let scenario_results = logic_tester
                .run_scenario(&scenario, seeds, args.iterations)
                .await;
            results.extend(scenario_results);
        } else {
            eprintln!("⚠️  Unknown scenario: {}", scenario_name.yellow());
        }
    }

    results
}

fn write_reports(
    args: &Args,
    results: &[logic::ScenarioResult],
    start_time: Instant,
) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => {
            if results.is_empty() {
                writeln!(&mut output_target, "[]")?;
            } else {
                logic::reports::generate_json_report(&mut output_target, results)?;
            }
            output_target.flush_inner()?;
            return Ok(());
        }
        "markdown" => {
            if results.is_empty() {
                writeln!(
                    &mut output_target,
                    "# Gridlink Logic Test Results\n\n_No scenarios executed._"
                )?;
            } else {
                logic::reports::generate_markdown_report(&mut output_target, results)?;
            }
        }
        _ => {
            if results.is_empty() {
                writeln!(&mut output_target, "No logic scenarios executed.")?;
            } else {
                logic::reports::generate_console_report(
                    &mut output_target,
                    results,
                    start_time.elapsed(),
                )?;
            }
        }
    }

    let duration = start_time.elapsed();
    writeln!(&mut output_target)?;
    writeln!(&mut output_target, "🏁 Total time: {duration:?}")?;
    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}
