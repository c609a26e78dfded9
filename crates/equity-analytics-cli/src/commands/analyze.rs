use clap::Args;
use serde_json::Value;

use equity_analytics_core::analytics::{run_analysis, AnalyticsRequest};

use crate::input;

/// Arguments for the aggregated analysis run
#[derive(Args)]
pub struct AnalyzeArgs {
    /// Path to JSON/YAML input file with the analysis request
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_analyze(args: AnalyzeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: AnalyticsRequest = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <file> or stdin required for analysis".into());
    };

    // Panels fail independently inside the report, so this never errors on
    // bad assumptions; input parsing is the only failure path.
    let report = run_analysis(&request, None);
    Ok(serde_json::to_value(report)?)
}
