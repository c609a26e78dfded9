use clap::Args;
use serde_json::Value;

use equity_analytics_core::risk::metrics::{calculate_risk_metrics, RiskInput};
use equity_analytics_core::risk::returns::{ReturnFrequency, ReturnSeries};

use crate::input;

/// Arguments for risk metric calculation
#[derive(Args)]
pub struct RiskArgs {
    /// Path to JSON/YAML input file with the return series (overrides flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Comma-separated periodic returns (e.g. "0.05,0.02,-0.01,0.03")
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub returns: Option<Vec<f64>>,

    /// Return frequency for annualisation: daily, weekly, monthly, quarterly, annual
    #[arg(long, default_value = "monthly")]
    pub frequency: String,

    /// Annualised risk-free rate
    #[arg(long, default_value = "0.03")]
    pub risk_free_rate: f64,

    /// Comma-separated VaR confidence levels (e.g. "0.95,0.99")
    #[arg(long, value_delimiter = ',', default_value = "0.95,0.99")]
    pub confidence: Vec<f64>,

    /// Comma-separated benchmark returns, time-aligned with --returns
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub benchmark: Option<Vec<f64>>,
}

pub fn run_risk(args: RiskArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let risk_input: RiskInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        let returns = args
            .returns
            .ok_or("--returns is required (or provide --input)")?;
        RiskInput {
            series: ReturnSeries {
                returns,
                frequency: parse_frequency(&args.frequency)?,
            },
            risk_free_rate: args.risk_free_rate,
            confidence_levels: args.confidence,
            benchmark: args.benchmark,
            monte_carlo: None,
        }
    };

    let result = calculate_risk_metrics(&risk_input, None)?;
    Ok(serde_json::to_value(result)?)
}

fn parse_frequency(s: &str) -> Result<ReturnFrequency, Box<dyn std::error::Error>> {
    match s.to_lowercase().as_str() {
        "daily" => Ok(ReturnFrequency::Daily),
        "weekly" => Ok(ReturnFrequency::Weekly),
        "monthly" => Ok(ReturnFrequency::Monthly),
        "quarterly" => Ok(ReturnFrequency::Quarterly),
        "annual" | "annually" => Ok(ReturnFrequency::Annual),
        _ => Err(format!(
            "Unknown frequency '{}'. Use: daily, weekly, monthly, quarterly, annual",
            s
        )
        .into()),
    }
}
