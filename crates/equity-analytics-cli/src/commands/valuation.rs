use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use equity_analytics_core::types::Currency;
use equity_analytics_core::valuation::comps::{
    calculate_comps, rank_peers, CompsInput, PeerRankingInput,
};
use equity_analytics_core::valuation::dcf::{calculate_dcf, DcfAssumptions};
use equity_analytics_core::valuation::scenarios::{blend_scenarios, DcfScenarioInput};
use equity_analytics_core::valuation::sensitivity::{dcf_sensitivity, DcfSensitivityInput};

use crate::input;

/// Arguments for DCF valuation
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct DcfArgs {
    /// Path to JSON/YAML input file with DCF assumptions (overrides flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Base (Year 0) revenue
    #[arg(long)]
    pub base_revenue: Option<Decimal>,

    /// Annual revenue growth rate (e.g. 0.05 for 5%)
    #[arg(long, alias = "growth")]
    pub growth_rate: Option<Decimal>,

    /// EBITDA margin as a fraction of revenue
    #[arg(long)]
    pub ebitda_margin: Option<Decimal>,

    /// Marginal tax rate
    #[arg(long, default_value = "0.25")]
    pub tax_rate: Decimal,

    /// Capital expenditure as a percentage of revenue
    #[arg(long, default_value = "0")]
    pub capex_pct: Decimal,

    /// Net working capital as a percentage of revenue
    #[arg(long, default_value = "0")]
    pub nwc_pct: Decimal,

    /// Discount rate (WACC)
    #[arg(long)]
    pub wacc: Option<Decimal>,

    /// Terminal growth rate
    #[arg(long)]
    pub terminal_growth: Option<Decimal>,

    /// Projection years
    #[arg(long, default_value = "5")]
    pub years: u32,

    /// Diluted shares outstanding for per-share value
    #[arg(long)]
    pub shares: Option<Decimal>,

    /// Current market price for upside calculation
    #[arg(long)]
    pub price: Option<Decimal>,
}

/// Arguments for the two-way DCF sensitivity grid
#[derive(Args)]
pub struct SensitivityArgs {
    /// Path to JSON/YAML input file with base assumptions and sweep ranges
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for DCF scenario blending
#[derive(Args)]
pub struct ScenariosArgs {
    /// Path to JSON/YAML input file with named scenarios and probabilities
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for comparable company analysis
#[derive(Args)]
pub struct CompsArgs {
    /// Path to JSON/YAML input file with target fundamentals and peer set
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for peer ranking
#[derive(Args)]
pub struct RankArgs {
    /// Path to JSON/YAML input file with the peer set and score weights
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_dcf(args: DcfArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let assumptions: DcfAssumptions = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        DcfAssumptions {
            base_revenue: args
                .base_revenue
                .ok_or("--base-revenue is required (or provide --input)")?,
            revenue_growth: args
                .growth_rate
                .ok_or("--growth-rate is required (or provide --input)")?,
            ebitda_margin: args
                .ebitda_margin
                .ok_or("--ebitda-margin is required (or provide --input)")?,
            tax_rate: args.tax_rate,
            capex_pct_revenue: args.capex_pct,
            nwc_pct_revenue: args.nwc_pct,
            terminal_growth: args
                .terminal_growth
                .ok_or("--terminal-growth is required (or provide --input)")?,
            wacc: args.wacc.ok_or("--wacc is required (or provide --input)")?,
            capm: None,
            projection_years: args.years,
            shares_outstanding: args.shares,
            current_price: args.price,
            currency: Currency::USD,
        }
    };

    let result = calculate_dcf(&assumptions)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_sensitivity(args: SensitivityArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let sens_input: DcfSensitivityInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <file> or stdin required for sensitivity analysis".into());
    };

    let result = dcf_sensitivity(&sens_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_scenarios(args: ScenariosArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let scenario_input: DcfScenarioInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <file> or stdin required for scenario blending".into());
    };

    let result = blend_scenarios(&scenario_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_comps(args: CompsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let comps_input: CompsInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <file> or stdin required for comps analysis".into());
    };

    let result = calculate_comps(&comps_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_rank(args: RankArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let ranking_input: PeerRankingInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <file> or stdin required for peer ranking".into());
    };

    let result = rank_peers(&ranking_input)?;
    Ok(serde_json::to_value(result)?)
}
