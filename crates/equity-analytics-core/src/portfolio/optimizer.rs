use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::AnalyticsError;
use crate::risk::returns::ReturnFrequency;
use crate::stats::float;
use crate::types::{with_metadata_f64, CancelToken, ComputationOutput};
use crate::AnalyticsResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One asset's aligned return history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSeries {
    pub symbol: String,
    pub returns: Vec<f64>,
}

/// Per-asset weight bounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeightBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for WeightBounds {
    fn default() -> Self {
        WeightBounds { min: 0.0, max: 1.0 }
    }
}

/// Input to mean-variance portfolio optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationInput {
    /// Aligned per-asset return series
    pub assets: Vec<AssetSeries>,
    /// Observation frequency; supplies the annualisation factor
    pub frequency: ReturnFrequency,
    /// Annualised risk-free rate
    pub risk_free_rate: f64,
    /// Per-asset weight bounds; [0, 1] long-only when omitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Vec<WeightBounds>>,
    /// Annualised target return; the tangency portfolio is solved when
    /// omitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_return: Option<f64>,
    /// Number of efficient frontier points (default 20)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frontier_points: Option<u32>,
}

/// A single asset weight with risk/return contribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetWeight {
    pub symbol: String,
    pub weight: f64,
    /// Marginal risk contribution times weight
    pub contribution_to_risk: f64,
    /// Weight times expected return
    pub contribution_to_return: f64,
}

/// A named portfolio point (tangency or minimum variance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioPoint {
    pub weights: Vec<f64>,
    pub expected_return: f64,
    pub risk: f64,
    pub sharpe_ratio: f64,
}

/// A single point on the efficient frontier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub expected_return: f64,
    pub risk: f64,
    pub sharpe_ratio: f64,
    pub weights: Vec<f64>,
}

/// Output of mean-variance optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationOutput {
    /// Optimal portfolio weights
    pub weights: Vec<AssetWeight>,
    pub expected_return: f64,
    pub expected_risk: f64,
    pub sharpe_ratio: f64,
    /// Global minimum variance portfolio
    pub min_variance_portfolio: PortfolioPoint,
    /// Maximum Sharpe ratio portfolio
    pub tangency_portfolio: PortfolioPoint,
    /// Frontier points in increasing-return order
    pub efficient_frontier: Vec<FrontierPoint>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Solve a Markowitz mean-variance optimization over aligned return series.
///
/// The sample covariance matrix and mean returns are estimated from the
/// series and annualised by the observation frequency. With no target
/// return the maximum-Sharpe (tangency) portfolio is returned.
pub fn optimize_portfolio(
    input: &OptimizationInput,
    cancel: Option<&CancelToken>,
) -> AnalyticsResult<ComputationOutput<OptimizationOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let n = input.assets.len();
    validate_input(input)?;
    let bounds = resolve_bounds(input, n)?;

    let annualization = input.frequency.periods_per_year();
    let mu = estimate_means(&input.assets, annualization)?;
    let sigma = estimate_covariance(&input.assets, annualization)?;
    let rf = input.risk_free_rate;

    // --- Minimum variance portfolio ---
    let min_var_weights = solve_min_variance(&sigma, n, &bounds)?;
    let min_variance_portfolio = portfolio_point(&min_var_weights, &mu, &sigma, rf);

    // --- Tangency portfolio (max Sharpe) ---
    let tang_weights = solve_tangency(&sigma, &mu, rf, n, &bounds)?;
    let tangency_portfolio = portfolio_point(&tang_weights, &mu, &sigma, rf);

    // --- Optimal portfolio ---
    let optimal = match input.target_return {
        Some(target) => {
            let (lo, hi) = achievable_return_range(&mu, &bounds);
            if target < lo - 1e-9 || target > hi + 1e-9 {
                return Err(AnalyticsError::InfeasibleConstraints(format!(
                    "Target return {target} outside achievable range [{lo:.6}, {hi:.6}]"
                )));
            }
            solve_target_return(&sigma, &mu, target, n, &bounds)
        }
        None => tang_weights.clone(),
    };

    let expected_return = vec_dot(&optimal, &mu);
    let expected_risk = portfolio_std(&optimal, &sigma);
    let sharpe_ratio = compute_sharpe(expected_return, rf, expected_risk);

    // --- Risk contributions ---
    let sigma_w = mat_vec_multiply(&sigma, &optimal);
    let weights: Vec<AssetWeight> = (0..n)
        .map(|i| {
            let mcr = if expected_risk == 0.0 {
                0.0
            } else {
                sigma_w[i] / expected_risk
            };
            AssetWeight {
                symbol: input.assets[i].symbol.clone(),
                weight: optimal[i],
                contribution_to_risk: optimal[i] * mcr,
                contribution_to_return: optimal[i] * mu[i],
            }
        })
        .collect();

    for aw in &weights {
        if aw.weight > 0.40 {
            warnings.push(format!(
                "Concentrated position: {} has weight {:.4}",
                aw.symbol, aw.weight
            ));
        }
    }

    // --- Efficient frontier ---
    let num_points = input.frontier_points.unwrap_or(20) as usize;
    let efficient_frontier = compute_efficient_frontier(
        &sigma,
        &mu,
        rf,
        n,
        &bounds,
        num_points,
        min_variance_portfolio.expected_return,
        cancel,
    )?;

    let output = OptimizationOutput {
        weights,
        expected_return,
        expected_risk,
        sharpe_ratio,
        min_variance_portfolio,
        tangency_portfolio,
        efficient_frontier,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Markowitz Mean-Variance Optimization",
        &serde_json::json!({
            "n_assets": n,
            "observations": input.assets[0].returns.len(),
            "frequency": input.frequency,
            "risk_free_rate": rf,
            "target_return": input.target_return,
            "frontier_points": num_points,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Estimation
// ---------------------------------------------------------------------------

fn estimate_means(assets: &[AssetSeries], annualization: f64) -> AnalyticsResult<Vec<f64>> {
    assets
        .iter()
        .map(|a| Ok(float::mean(&a.returns)? * annualization))
        .collect()
}

fn estimate_covariance(
    assets: &[AssetSeries],
    annualization: f64,
) -> AnalyticsResult<Vec<Vec<f64>>> {
    let n = assets.len();
    let mut sigma = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let cov = float::covariance(&assets[i].returns, &assets[j].returns)? * annualization;
            sigma[i][j] = cov;
            sigma[j][i] = cov;
        }
    }
    Ok(sigma)
}

// ---------------------------------------------------------------------------
// Core optimization routines
// ---------------------------------------------------------------------------

/// Minimum variance weights.
/// Unconstrained: w* = Sigma^-1 * 1 / (1' * Sigma^-1 * 1)
/// Constrained or singular: projected gradient descent.
fn solve_min_variance(
    sigma: &[Vec<f64>],
    n: usize,
    bounds: &[WeightBounds],
) -> AnalyticsResult<Vec<f64>> {
    if let Ok(sigma_inv) = mat_inverse(sigma) {
        let ones = vec![1.0; n];
        let sigma_inv_ones = mat_vec_multiply(&sigma_inv, &ones);
        let denom: f64 = sigma_inv_ones.iter().sum();
        if denom.abs() > 1e-12 {
            let unconstrained: Vec<f64> = sigma_inv_ones.iter().map(|v| v / denom).collect();
            if is_feasible(&unconstrained, bounds) {
                return Ok(unconstrained);
            }
        }
    }

    let mut w = equal_weights(n);
    project_to_bounded_simplex(&mut w, bounds);
    for _ in 0..200 {
        let sigma_w = mat_vec_multiply(sigma, &w);
        for i in 0..n {
            w[i] -= 0.005 * 2.0 * sigma_w[i];
        }
        project_to_bounded_simplex(&mut w, bounds);
    }
    Ok(w)
}

/// Tangency weights.
/// Unconstrained: w* = Sigma^-1 * (mu - rf*1) / (1' * Sigma^-1 * (mu - rf*1))
/// Constrained or singular: projected gradient ascent on the Sharpe ratio.
fn solve_tangency(
    sigma: &[Vec<f64>],
    mu: &[f64],
    rf: f64,
    n: usize,
    bounds: &[WeightBounds],
) -> AnalyticsResult<Vec<f64>> {
    let excess: Vec<f64> = mu.iter().map(|r| r - rf).collect();

    if let Ok(sigma_inv) = mat_inverse(sigma) {
        let sigma_inv_excess = mat_vec_multiply(&sigma_inv, &excess);
        let denom: f64 = sigma_inv_excess.iter().sum();
        if denom.abs() < 1e-12 {
            // All excess returns cancel; fall back to minimum variance
            return solve_min_variance(sigma, n, bounds);
        }
        let unconstrained: Vec<f64> = sigma_inv_excess.iter().map(|v| v / denom).collect();
        if is_feasible(&unconstrained, bounds) {
            return Ok(unconstrained);
        }
    }

    let mut w = equal_weights(n);
    project_to_bounded_simplex(&mut w, bounds);
    let mut best_w = w.clone();
    let mut best_sharpe = f64::NEG_INFINITY;

    for _ in 0..300 {
        let port_ret = vec_dot(&w, mu);
        let port_risk = portfolio_std(&w, sigma);
        let sharpe = compute_sharpe(port_ret, rf, port_risk);
        if sharpe > best_sharpe {
            best_sharpe = sharpe;
            best_w = w.clone();
        }
        if port_risk == 0.0 {
            break;
        }

        // Gradient of negative Sharpe:
        // d(-S)/dw_i = -(mu_i - rf)/sigma_p + (ret - rf)*(Sigma*w)_i/sigma_p^3
        let sigma_w = mat_vec_multiply(sigma, &w);
        let excess_ret = port_ret - rf;
        let risk_cubed = port_risk * port_risk * port_risk;
        for i in 0..n {
            let grad = -(mu[i] - rf) / port_risk + excess_ret * sigma_w[i] / risk_cubed;
            w[i] -= 0.001 * grad;
        }
        project_to_bounded_simplex(&mut w, bounds);
    }

    Ok(best_w)
}

/// Minimum-variance weights at a fixed target return via a quadratic
/// penalty on the return constraint.
fn solve_target_return(
    sigma: &[Vec<f64>],
    mu: &[f64],
    target: f64,
    n: usize,
    bounds: &[WeightBounds],
) -> Vec<f64> {
    let mut w = equal_weights(n);
    project_to_bounded_simplex(&mut w, bounds);

    let step = 0.005;
    let penalty = 100.0;

    for _ in 0..500 {
        let sigma_w = mat_vec_multiply(sigma, &w);
        let ret_diff = vec_dot(&w, mu) - target;
        for i in 0..n {
            let grad = 2.0 * sigma_w[i] + 2.0 * penalty * ret_diff * mu[i];
            w[i] -= step * grad;
        }
        project_to_bounded_simplex(&mut w, bounds);
    }

    w
}

/// Frontier sweep from the minimum-variance return to the highest
/// achievable return, in increasing-return order. Points solve
/// independently on the worker pool; the cancellation token is polled at
/// every point.
#[allow(clippy::too_many_arguments)]
fn compute_efficient_frontier(
    sigma: &[Vec<f64>],
    mu: &[f64],
    rf: f64,
    n: usize,
    bounds: &[WeightBounds],
    num_points: usize,
    min_var_ret: f64,
    cancel: Option<&CancelToken>,
) -> AnalyticsResult<Vec<FrontierPoint>> {
    let (_, max_ret) = achievable_return_range(mu, bounds);

    if num_points <= 1 || max_ret <= min_var_ret + 1e-12 {
        let w = solve_target_return(sigma, mu, min_var_ret, n, bounds);
        let ret = vec_dot(&w, mu);
        let risk = portfolio_std(&w, sigma);
        return Ok(vec![FrontierPoint {
            expected_return: ret,
            risk,
            sharpe_ratio: compute_sharpe(ret, rf, risk),
            weights: w,
        }]);
    }

    let step = (max_ret - min_var_ret) / (num_points - 1) as f64;
    let frontier: AnalyticsResult<Vec<FrontierPoint>> = (0..num_points)
        .into_par_iter()
        .map(|i| {
            if let Some(token) = cancel {
                if token.is_cancelled() {
                    return Err(AnalyticsError::Cancelled);
                }
            }
            let target = min_var_ret + step * i as f64;
            let w = solve_target_return(sigma, mu, target, n, bounds);
            let ret = vec_dot(&w, mu);
            let risk = portfolio_std(&w, sigma);
            Ok(FrontierPoint {
                expected_return: ret,
                risk,
                sharpe_ratio: compute_sharpe(ret, rf, risk),
                weights: w,
            })
        })
        .collect();

    frontier
}

// ---------------------------------------------------------------------------
// Constraint helpers
// ---------------------------------------------------------------------------

fn resolve_bounds(input: &OptimizationInput, n: usize) -> AnalyticsResult<Vec<WeightBounds>> {
    let bounds = match &input.bounds {
        Some(b) => {
            if b.len() != n {
                return Err(AnalyticsError::InvalidInput {
                    field: "bounds".into(),
                    reason: format!("Expected {n} bound pairs, got {}", b.len()),
                });
            }
            b.clone()
        }
        None => vec![WeightBounds::default(); n],
    };

    for (i, b) in bounds.iter().enumerate() {
        if !b.min.is_finite() || !b.max.is_finite() {
            return Err(AnalyticsError::InvalidInput {
                field: format!("bounds[{i}]"),
                reason: "Bounds must be finite".into(),
            });
        }
        if b.min > b.max {
            return Err(AnalyticsError::InfeasibleConstraints(format!(
                "Asset {i}: min weight {} exceeds max weight {}",
                b.min, b.max
            )));
        }
    }

    let sum_min: f64 = bounds.iter().map(|b| b.min).sum();
    let sum_max: f64 = bounds.iter().map(|b| b.max).sum();
    if sum_min > 1.0 + 1e-9 {
        return Err(AnalyticsError::InfeasibleConstraints(format!(
            "Minimum weights sum to {sum_min:.4}; cannot reach a fully invested portfolio"
        )));
    }
    if sum_max < 1.0 - 1e-9 {
        return Err(AnalyticsError::InfeasibleConstraints(format!(
            "Maximum weights sum to {sum_max:.4}; cannot reach a fully invested portfolio"
        )));
    }

    Ok(bounds)
}

fn is_feasible(w: &[f64], bounds: &[WeightBounds]) -> bool {
    w.iter()
        .zip(bounds.iter())
        .all(|(wi, b)| *wi >= b.min - 1e-4 && *wi <= b.max + 1e-4)
}

/// Project weights onto { w : sum w = 1, min_i <= w_i <= max_i }.
///
/// Alternates clamping with spreading the budget residual across assets
/// that still have room in the needed direction. Feasibility of the bound
/// set is checked up front, so the iteration converges.
fn project_to_bounded_simplex(w: &mut [f64], bounds: &[WeightBounds]) {
    for _ in 0..100 {
        for (wi, b) in w.iter_mut().zip(bounds.iter()) {
            *wi = wi.clamp(b.min, b.max);
        }
        let residual = 1.0 - w.iter().sum::<f64>();
        if residual.abs() < 1e-12 {
            return;
        }
        let free: Vec<usize> = (0..w.len())
            .filter(|&i| {
                if residual > 0.0 {
                    w[i] < bounds[i].max - 1e-12
                } else {
                    w[i] > bounds[i].min + 1e-12
                }
            })
            .collect();
        if free.is_empty() {
            return;
        }
        let share = residual / free.len() as f64;
        for i in free {
            w[i] += share;
        }
    }
}

fn equal_weights(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

/// Lowest and highest portfolio returns reachable within the bounds:
/// fill from the worst (best) asset outward.
fn achievable_return_range(mu: &[f64], bounds: &[WeightBounds]) -> (f64, f64) {
    let lo = extreme_return(mu, bounds, false);
    let hi = extreme_return(mu, bounds, true);
    (lo, hi)
}

fn extreme_return(mu: &[f64], bounds: &[WeightBounds], maximize: bool) -> f64 {
    let n = mu.len();
    let mut w: Vec<f64> = bounds.iter().map(|b| b.min).collect();
    let mut budget = 1.0 - w.iter().sum::<f64>();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        let cmp = mu[a].partial_cmp(&mu[b]).unwrap_or(std::cmp::Ordering::Equal);
        if maximize {
            cmp.reverse()
        } else {
            cmp
        }
    });

    for i in order {
        if budget <= 0.0 {
            break;
        }
        let add = (bounds[i].max - bounds[i].min).min(budget);
        w[i] += add;
        budget -= add;
    }

    vec_dot(&w, mu)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_input(input: &OptimizationInput) -> AnalyticsResult<()> {
    if input.assets.is_empty() {
        return Err(AnalyticsError::EmptyInput(
            "At least one asset required".into(),
        ));
    }

    let len = input.assets[0].returns.len();
    if len < 2 {
        return Err(AnalyticsError::InvalidInput {
            field: "assets".into(),
            reason: "At least two return observations required per asset".into(),
        });
    }

    for asset in &input.assets {
        if asset.returns.len() != len {
            return Err(AnalyticsError::MismatchedSeriesLength {
                context: format!("asset {}", asset.symbol),
                left: len,
                right: asset.returns.len(),
            });
        }
        if asset.returns.iter().any(|r| !r.is_finite()) {
            return Err(AnalyticsError::InvalidInput {
                field: format!("assets.{}", asset.symbol),
                reason: "Returns must be finite".into(),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Portfolio math helpers
// ---------------------------------------------------------------------------

fn compute_sharpe(ret: f64, rf: f64, risk: f64) -> f64 {
    if risk == 0.0 {
        0.0
    } else {
        (ret - rf) / risk
    }
}

fn portfolio_point(w: &[f64], mu: &[f64], sigma: &[Vec<f64>], rf: f64) -> PortfolioPoint {
    let ret = vec_dot(w, mu);
    let risk = portfolio_std(w, sigma);
    PortfolioPoint {
        weights: w.to_vec(),
        expected_return: ret,
        risk,
        sharpe_ratio: compute_sharpe(ret, rf, risk),
    }
}

/// Portfolio standard deviation: sqrt(w' * Sigma * w).
fn portfolio_std(w: &[f64], sigma: &[Vec<f64>]) -> f64 {
    let sigma_w = mat_vec_multiply(sigma, w);
    let var = vec_dot(w, &sigma_w);
    if var <= 0.0 {
        0.0
    } else {
        var.sqrt()
    }
}

fn mat_vec_multiply(mat: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    mat.iter().map(|row| vec_dot(row, v)).collect()
}

fn vec_dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Matrix inverse via Gauss-Jordan with partial pivoting.
#[allow(clippy::needless_range_loop)]
fn mat_inverse(mat: &[Vec<f64>]) -> AnalyticsResult<Vec<Vec<f64>>> {
    let n = mat.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut aug: Vec<Vec<f64>> = Vec::with_capacity(n);
    for i in 0..n {
        let mut row = Vec::with_capacity(2 * n);
        row.extend_from_slice(&mat[i]);
        for j in 0..n {
            row.push(if i == j { 1.0 } else { 0.0 });
        }
        aug.push(row);
    }

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = aug[col][col].abs();
        for row in (col + 1)..n {
            let val = aug[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_val < 1e-12 {
            return Err(AnalyticsError::InfeasibleConstraints(
                "Covariance matrix is singular".into(),
            ));
        }

        if max_row != col {
            aug.swap(col, max_row);
        }

        let pivot = aug[col][col];
        for cell in aug[col].iter_mut() {
            *cell /= pivot;
        }

        let pivot_row = aug[col].clone();
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            for (cell, &pv) in aug[row].iter_mut().zip(pivot_row.iter()) {
                *cell -= factor * pv;
            }
        }
    }

    Ok(aug.iter().map(|row| row[n..].to_vec()).collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
