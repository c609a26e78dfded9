use clap::Args;
use serde_json::Value;

use equity_analytics_core::portfolio::optimizer::{optimize_portfolio, OptimizationInput};

use crate::input;

/// Arguments for mean-variance portfolio optimization
#[derive(Args)]
pub struct OptimizeArgs {
    /// Path to JSON/YAML input file with aligned per-asset return series
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_optimize(args: OptimizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let opt_input: OptimizationInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <file> or stdin required for portfolio optimization".into());
    };

    let result = optimize_portfolio(&opt_input, None)?;
    Ok(serde_json::to_value(result)?)
}
