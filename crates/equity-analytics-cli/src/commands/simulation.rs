use clap::Args;
use serde_json::Value;

use equity_analytics_core::simulation::gbm::{run_simulation, SimulationParameters};

use crate::input;

/// Arguments for Monte Carlo price simulation
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct SimulateArgs {
    /// Path to JSON/YAML input file with simulation parameters (overrides flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Starting price or portfolio value
    #[arg(long)]
    pub initial_value: Option<f64>,

    /// Annual drift (e.g. 0.08 for 8%)
    #[arg(long)]
    pub drift: Option<f64>,

    /// Annual volatility (e.g. 0.2 for 20%)
    #[arg(long)]
    pub volatility: Option<f64>,

    /// Number of discretisation steps over the horizon
    #[arg(long, default_value = "252")]
    pub steps: u32,

    /// Number of simulated paths
    #[arg(long, default_value = "10000")]
    pub paths: u32,

    /// Seed for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run_simulate(args: SimulateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let params: SimulationParameters = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        SimulationParameters {
            initial_value: args
                .initial_value
                .ok_or("--initial-value is required (or provide --input)")?,
            drift: args.drift.ok_or("--drift is required (or provide --input)")?,
            volatility: args
                .volatility
                .ok_or("--volatility is required (or provide --input)")?,
            horizon_steps: args.steps,
            path_count: args.paths,
            seed: args.seed,
        }
    };

    let result = run_simulation(&params, None)?;
    Ok(serde_json::to_value(result)?)
}
