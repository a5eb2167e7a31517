//! Pursuit Simulator CLI
//!
//! Run deterministic chase scenarios against virtual terrain.

use clap::Parser;
use pursuit_core::AgentSettings;
use pursuit_sim::scenarios::ScenarioId;
use pursuit_sim::{ScenarioResult, ScenarioRunner, SimError, SimExport};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Pursuit Deterministic Simulation CLI
#[derive(Parser, Debug)]
#[command(name = "pursuit-sim")]
#[command(about = "Run deterministic chase scenarios for Pursuit agents", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of chasing agents
    #[arg(short, long, default_value = "2")]
    agents: usize,

    /// Scenario to run (open_field, wall, cliff, moving_target, retarget, blocked, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Maximum simulation duration in seconds
    #[arg(short, long, default_value = "15")]
    duration: f64,

    /// Agent settings as a JSON file
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export frames of a single scenario to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn load_settings(path: Option<&str>) -> Result<AgentSettings, SimError> {
    match path {
        Some(path) => Ok(AgentSettings::from_json(&std::fs::read_to_string(path)?)?),
        None => Ok(AgentSettings::default()),
    }
}

fn parse_scenarios(name: &str) -> Result<Vec<ScenarioId>, SimError> {
    if name == "all" {
        Ok(ScenarioId::all())
    } else {
        Ok(vec![name.parse()?])
    }
}

fn base_seed(seed: u64) -> u64 {
    if seed != 0 {
        return seed;
    }
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(1)
}

fn report(result: &ScenarioResult) {
    if result.passed {
        info!(
            "✓ {} (seed={}) PASSED in {:.1}s | paths={} waypoints={}",
            result.scenario.name(),
            result.seed,
            result.final_time_secs,
            result.metrics.paths_computed,
            result.metrics.waypoints_reached
        );
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario.name(),
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}

fn summary_json(results: &[ScenarioResult]) -> serde_json::Value {
    let passed = results.iter().filter(|r| r.passed).count();
    serde_json::json!({
        "total": results.len(),
        "passed": passed,
        "failed": results.len() - passed,
        "results": results.iter().map(|r| {
            serde_json::json!({
                "scenario": r.scenario.name(),
                "seed": r.seed,
                "passed": r.passed,
                "agents": r.agent_count,
                "ticks": r.total_ticks,
                "time_secs": r.final_time_secs,
                "path_requests": r.metrics.path_requests,
                "paths_computed": r.metrics.paths_computed,
                "waypoints_reached": r.metrics.waypoints_reached,
                "failure_reason": r.failure_reason,
            })
        }).collect::<Vec<_>>(),
    })
}

/// Returns whether every run passed.
fn run(args: &Args) -> Result<bool, SimError> {
    let scenarios = parse_scenarios(&args.scenario)?;
    let settings = load_settings(args.config.as_deref())?;
    let seed = base_seed(args.seed);

    if let Some(export_path) = &args.export {
        let &[scenario] = scenarios.as_slice() else {
            return Err(SimError::Usage(format!(
                "--export needs a single scenario, got '{}'",
                args.scenario
            )));
        };

        info!("Running with export to: {}", export_path);
        let runner = ScenarioRunner::new(seed, args.agents)
            .with_duration(args.duration)
            .with_settings(settings);
        let mut export = SimExport::new(scenario.name(), seed);
        let result = runner.run_with_export(scenario, &mut export)?;
        export.write_to_file(export_path)?;
        info!("Exported {} frames to {}", export.frames.len(), export_path);

        report(&result);
        return Ok(result.passed);
    }

    let mut results = Vec::new();
    for offset in 0..args.seeds.max(1) {
        let runner = ScenarioRunner::new(seed.wrapping_add(offset as u64), args.agents)
            .with_duration(args.duration)
            .with_settings(settings.clone());

        for scenario in &scenarios {
            let result = runner.run(*scenario)?;
            if !args.json {
                report(&result);
            }
            results.push(result);
        }
    }

    let failed = results.iter().filter(|r| !r.passed).count();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary_json(&results))?);
    } else if failed == 0 {
        info!("All {} scenario runs passed", results.len());
    } else {
        error!("{}/{} scenario runs failed", failed, results.len());
    }
    Ok(failed == 0)
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    if !args.json {
        info!("Pursuit Simulator v{}", env!("CARGO_PKG_VERSION"));
    }

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(2)
        }
    }
}
