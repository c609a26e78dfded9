mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::analyze::AnalyzeArgs;
use commands::portfolio::OptimizeArgs;
use commands::risk::RiskArgs;
use commands::simulation::SimulateArgs;
use commands::valuation::{CompsArgs, DcfArgs, RankArgs, ScenariosArgs, SensitivityArgs};

/// Equity valuation and risk analytics
#[derive(Parser)]
#[command(
    name = "eqa",
    version,
    about = "Equity valuation and risk analytics",
    long_about = "A CLI front end to the equity research analytics engine. Supports DCF \
                  valuation with sensitivity grids and scenario blending, comparable \
                  company analysis and peer ranking, risk metrics (volatility, Sharpe, \
                  drawdown, VaR), Monte Carlo price simulation, and mean-variance \
                  portfolio optimization."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Discounted Cash Flow valuation
    Dcf(DcfArgs),
    /// Two-way DCF sensitivity grid (WACC x revenue growth)
    Sensitivity(SensitivityArgs),
    /// Probability-weighted DCF scenario blending
    Scenarios(ScenariosArgs),
    /// Comparable company analysis
    Comps(CompsArgs),
    /// Rank a peer set by composite score
    Rank(RankArgs),
    /// Risk metrics (volatility, Sharpe, drawdown, VaR, beta)
    Risk(RiskArgs),
    /// Monte Carlo price simulation
    Simulate(SimulateArgs),
    /// Mean-variance portfolio optimization
    Optimize(OptimizeArgs),
    /// Run every requested engine for one symbol
    Analyze(AnalyzeArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Dcf(args) => commands::valuation::run_dcf(args),
        Commands::Sensitivity(args) => commands::valuation::run_sensitivity(args),
        Commands::Scenarios(args) => commands::valuation::run_scenarios(args),
        Commands::Comps(args) => commands::valuation::run_comps(args),
        Commands::Rank(args) => commands::valuation::run_rank(args),
        Commands::Risk(args) => commands::risk::run_risk(args),
        Commands::Simulate(args) => commands::simulation::run_simulate(args),
        Commands::Optimize(args) => commands::portfolio::run_optimize(args),
        Commands::Analyze(args) => commands::analyze::run_analyze(args),
        Commands::Version => {
            println!("eqa {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
