use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::time::Instant;

use crate::error::AnalyticsError;
use crate::simulation::gbm::{simulate_final_values, SimulationParameters};
use crate::stats::float;
use crate::types::{with_metadata_f64, CancelToken, ComputationOutput};
use crate::AnalyticsResult;

use super::returns::ReturnSeries;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Configuration for the Monte Carlo VaR method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloVarConfig {
    pub path_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Input for risk metric calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskInput {
    pub series: ReturnSeries,
    /// Annualised risk-free rate
    pub risk_free_rate: f64,
    /// Confidence levels for VaR, each in (0, 1), e.g. [0.95, 0.99]
    pub confidence_levels: Vec<f64>,
    /// Time-aligned benchmark returns for beta and correlation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<Vec<f64>>,
    /// When present, a Monte Carlo VaR is computed alongside the
    /// historical and parametric estimates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monte_carlo: Option<MonteCarloVarConfig>,
}

/// VaR estimates at one confidence level, reported as positive loss
/// fractions of portfolio value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarEstimate {
    pub confidence: f64,
    pub historical: f64,
    pub parametric: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monte_carlo: Option<f64>,
    /// Mean loss beyond the historical VaR threshold
    pub cvar: f64,
}

/// Output of risk metric calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskMetricsOutput {
    /// Annualised volatility
    pub volatility: f64,
    /// Annualised Sharpe ratio; zero when volatility is zero
    pub sharpe_ratio: f64,
    /// Annualised mean return
    pub mean_return: f64,
    /// Maximum peak-to-trough drawdown of the cumulative growth curve
    pub max_drawdown: f64,
    /// Duration of the maximum drawdown in periods
    pub max_drawdown_duration: u32,
    pub var: Vec<VarEstimate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark_correlation: Option<f64>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Calculate volatility, Sharpe, drawdown, VaR, and benchmark sensitivity
/// for a return series.
pub fn calculate_risk_metrics(
    input: &RiskInput,
    cancel: Option<&CancelToken>,
) -> AnalyticsResult<ComputationOutput<RiskMetricsOutput>> {
    let start = Instant::now();
    let warnings: Vec<String> = Vec::new();

    validate_input(input)?;

    let returns = &input.series.returns;
    let annualization = input.series.frequency.periods_per_year();

    let mean_periodic = float::mean(returns)?;
    let std_periodic = float::std_dev(returns)?;

    let volatility = std_periodic * annualization.sqrt();
    let mean_return = mean_periodic * annualization;

    let sharpe_ratio = if volatility == 0.0 {
        0.0
    } else {
        (mean_return - input.risk_free_rate) / volatility
    };

    let (max_drawdown, max_drawdown_duration) = max_drawdown_with_duration(returns);

    // One simulation shared across all requested confidence levels, so the
    // same seed yields the same ladder regardless of how many levels the
    // caller asks for.
    let simulated_returns = match &input.monte_carlo {
        Some(config) => Some(simulate_return_distribution(
            mean_periodic,
            std_periodic,
            config,
            cancel,
        )?),
        None => None,
    };

    let standard_normal = Normal::new(0.0, 1.0).map_err(|e| AnalyticsError::InvalidInput {
        field: "confidence_levels".into(),
        reason: format!("Standard normal unavailable: {e}"),
    })?;

    let mut var = Vec::with_capacity(input.confidence_levels.len());
    for &confidence in &input.confidence_levels {
        let tail = 1.0 - confidence;

        let threshold = float::percentile(returns, tail)?;
        let historical = -threshold;

        let z = standard_normal.inverse_cdf(confidence);
        let parametric = z * std_periodic - mean_periodic;

        let tail_losses: Vec<f64> = returns.iter().copied().filter(|r| *r <= threshold).collect();
        let cvar = if tail_losses.is_empty() {
            historical
        } else {
            -float::mean(&tail_losses)?
        };

        let monte_carlo = match &simulated_returns {
            Some(sim) => Some(-float::percentile_of_sorted(sim, tail)?),
            None => None,
        };

        var.push(VarEstimate {
            confidence,
            historical,
            parametric,
            monte_carlo,
            cvar,
        });
    }

    let (beta, benchmark_correlation) = match &input.benchmark {
        Some(bench) => {
            let cov = float::covariance(returns, bench)?;
            let bench_var = float::covariance(bench, bench)?;
            let beta = if bench_var == 0.0 { 0.0 } else { cov / bench_var };
            let corr = float::correlation(returns, bench)?;
            (Some(beta), Some(corr))
        }
        None => (None, None),
    };

    let output = RiskMetricsOutput {
        volatility,
        sharpe_ratio,
        mean_return,
        max_drawdown,
        max_drawdown_duration,
        var,
        beta,
        benchmark_correlation,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Risk Metrics (Volatility, Sharpe, Drawdown, VaR, Beta)",
        &serde_json::json!({
            "observations": returns.len(),
            "frequency": input.series.frequency,
            "confidence_levels": input.confidence_levels,
            "risk_free_rate": input.risk_free_rate,
            "monte_carlo": input.monte_carlo,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn validate_input(input: &RiskInput) -> AnalyticsResult<()> {
    let returns = &input.series.returns;
    if returns.is_empty() {
        return Err(AnalyticsError::EmptyInput(
            "Return series is empty".into(),
        ));
    }
    if returns.iter().any(|r| !r.is_finite()) {
        return Err(AnalyticsError::InvalidInput {
            field: "series.returns".into(),
            reason: "Returns must be finite".into(),
        });
    }
    if input.confidence_levels.is_empty() {
        return Err(AnalyticsError::EmptyInput(
            "At least one confidence level required".into(),
        ));
    }
    for &c in &input.confidence_levels {
        if !(c > 0.0 && c < 1.0) {
            return Err(AnalyticsError::InvalidInput {
                field: "confidence_levels".into(),
                reason: format!("Confidence level must be in (0, 1), got {c}"),
            });
        }
    }
    if let Some(ref bench) = input.benchmark {
        if bench.len() != returns.len() {
            return Err(AnalyticsError::MismatchedSeriesLength {
                context: "benchmark".into(),
                left: returns.len(),
                right: bench.len(),
            });
        }
        if bench.iter().any(|r| !r.is_finite()) {
            return Err(AnalyticsError::InvalidInput {
                field: "benchmark".into(),
                reason: "Benchmark returns must be finite".into(),
            });
        }
    }
    if let Some(ref mc) = input.monte_carlo {
        if mc.path_count == 0 {
            return Err(AnalyticsError::InvalidInput {
                field: "monte_carlo.path_count".into(),
                reason: "Path count must be positive".into(),
            });
        }
    }
    Ok(())
}

/// Simulate a one-step return distribution by delegating to the GBM engine
/// with a unit initial value. Returns the sorted simulated returns.
fn simulate_return_distribution(
    mean: f64,
    std_dev: f64,
    config: &MonteCarloVarConfig,
    cancel: Option<&CancelToken>,
) -> AnalyticsResult<Vec<f64>> {
    let params = SimulationParameters {
        initial_value: 1.0,
        drift: mean,
        volatility: std_dev,
        horizon_steps: 1,
        path_count: config.path_count,
        seed: config.seed,
    };
    let mut simulated: Vec<f64> = simulate_final_values(&params, cancel)?
        .into_iter()
        .map(|v| v - 1.0)
        .collect();
    simulated.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Ok(simulated)
}

/// Maximum drawdown of the cumulative growth curve and its duration.
fn max_drawdown_with_duration(returns: &[f64]) -> (f64, u32) {
    let mut cumulative = 1.0_f64;
    let mut peak = 1.0_f64;
    let mut peak_idx = 0usize;
    let mut max_dd = 0.0_f64;
    let mut dd_start = 0usize;
    let mut dd_end = 0usize;

    for (i, r) in returns.iter().enumerate() {
        cumulative *= 1.0 + r;
        if cumulative > peak {
            peak = cumulative;
            peak_idx = i;
        }
        if peak > 0.0 {
            let dd = (peak - cumulative) / peak;
            if dd > max_dd {
                max_dd = dd;
                dd_start = peak_idx;
                dd_end = i;
            }
        }
    }

    let duration = if dd_end >= dd_start {
        (dd_end - dd_start) as u32
    } else {
        0
    };

    (max_dd, duration)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
