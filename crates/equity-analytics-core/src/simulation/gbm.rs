use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use std::time::Instant;

use crate::error::AnalyticsError;
use crate::stats::float;
use crate::types::{with_metadata_f64, CancelToken, ComputationOutput};
use crate::AnalyticsResult;

/// Paths per batch; batches are the unit of parallelism, seeding, and
/// cancellation polling.
const BATCH_SIZE: u32 = 1_000;

/// Path counts at or above this fan batches out across the rayon pool.
const PARALLEL_THRESHOLD: u32 = 10_000;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Parameters for a Geometric Brownian Motion price simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationParameters {
    /// Starting price or portfolio value
    pub initial_value: f64,
    /// Annual drift
    pub drift: f64,
    /// Annual volatility
    pub volatility: f64,
    /// Number of discretisation steps over the horizon
    pub horizon_steps: u32,
    /// Number of simulated paths
    pub path_count: u32,
    /// Seed for reproducible output; entropy-seeded when omitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Percentile ladder over simulated final values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileLadder {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

/// A single histogram bin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u32,
    pub frequency: f64,
}

/// Aggregated distribution of simulated final values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub percentiles: PercentileLadder,
    /// Fraction of paths ending below the initial value
    pub probability_of_loss: f64,
    /// 90% confidence interval (P5, P95)
    pub confidence_interval: (f64, f64),
    pub histogram: Vec<HistogramBin>,
    pub path_count: u32,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run a GBM simulation and aggregate the distribution of final values.
pub fn run_simulation(
    params: &SimulationParameters,
    cancel: Option<&CancelToken>,
) -> AnalyticsResult<ComputationOutput<SimulationResult>> {
    let start = Instant::now();
    let warnings: Vec<String> = Vec::new();

    let mut finals = simulate_final_values(params, cancel)?;
    finals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mean = float::mean(&finals)?;
    let median = float::median_of_sorted(&finals);
    let std_dev = float::std_dev(&finals)?;

    let percentiles = PercentileLadder {
        p5: float::percentile_of_sorted(&finals, 0.05)?,
        p25: float::percentile_of_sorted(&finals, 0.25)?,
        p50: float::percentile_of_sorted(&finals, 0.50)?,
        p75: float::percentile_of_sorted(&finals, 0.75)?,
        p90: float::percentile_of_sorted(&finals, 0.90)?,
        p95: float::percentile_of_sorted(&finals, 0.95)?,
    };

    let losses = finals.iter().filter(|v| **v < params.initial_value).count();
    let probability_of_loss = losses as f64 / finals.len() as f64;

    let confidence_interval = (percentiles.p5, percentiles.p95);
    let histogram = build_histogram(&finals, 20);

    let output = SimulationResult {
        mean,
        median,
        std_dev,
        percentiles,
        probability_of_loss,
        confidence_interval,
        histogram,
        path_count: params.path_count,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Geometric Brownian Motion Simulation",
        params,
        warnings,
        elapsed,
        output,
    ))
}

/// Generate the raw final values of every path.
///
/// Each step applies `price * (1 + drift/steps + volatility/sqrt(steps) * Z)`
/// with Z drawn from a standard normal distribution. Paths are produced in
/// fixed batches; every batch derives its own RNG from the master seed and
/// batch index, so the concatenated output is identical whether batches run
/// serially or on the worker pool. The cancellation token is polled once
/// per batch.
///
/// Callers that need percentiles must compute them over this full
/// concatenated sample, never over per-batch summaries.
pub fn simulate_final_values(
    params: &SimulationParameters,
    cancel: Option<&CancelToken>,
) -> AnalyticsResult<Vec<f64>> {
    validate_parameters(params)?;

    let master_seed = params.seed.unwrap_or_else(rand::random);
    let parallel = params.path_count >= PARALLEL_THRESHOLD;
    collect_batches(params, cancel, master_seed, parallel)
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn collect_batches(
    params: &SimulationParameters,
    cancel: Option<&CancelToken>,
    master_seed: u64,
    parallel: bool,
) -> AnalyticsResult<Vec<f64>> {
    let normal = Normal::new(0.0, 1.0).map_err(|e| AnalyticsError::InvalidInput {
        field: "volatility".into(),
        reason: format!("Standard normal unavailable: {e}"),
    })?;

    let num_batches = params.path_count.div_ceil(BATCH_SIZE);

    let run_batch = |batch_index: u32| -> AnalyticsResult<Vec<f64>> {
        if let Some(token) = cancel {
            if token.is_cancelled() {
                return Err(AnalyticsError::Cancelled);
            }
        }
        let remaining = params.path_count - batch_index * BATCH_SIZE;
        let batch_paths = remaining.min(BATCH_SIZE);
        Ok(generate_batch(
            params,
            batch_paths,
            batch_seed(master_seed, batch_index as u64),
            normal,
        ))
    };

    let batches: AnalyticsResult<Vec<Vec<f64>>> = if parallel {
        (0..num_batches).into_par_iter().map(run_batch).collect()
    } else {
        (0..num_batches).map(run_batch).collect()
    };

    let batches = batches?;
    let mut finals = Vec::with_capacity(params.path_count as usize);
    for batch in batches {
        finals.extend(batch);
    }
    Ok(finals)
}

fn generate_batch(
    params: &SimulationParameters,
    n_paths: u32,
    seed: u64,
    normal: Normal,
) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let steps = params.horizon_steps;
    let step_drift = params.drift / steps as f64;
    let step_vol = params.volatility / (steps as f64).sqrt();

    (0..n_paths)
        .map(|_| {
            let mut price = params.initial_value;
            for _ in 0..steps {
                let z: f64 = rng.sample(normal);
                price *= 1.0 + step_drift + step_vol * z;
            }
            price
        })
        .collect()
}

/// SplitMix64 step over the master seed and batch index. Keeps batch RNG
/// streams independent while staying a pure function of (seed, index).
fn batch_seed(master: u64, batch_index: u64) -> u64 {
    let mut z = master ^ batch_index.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn validate_parameters(params: &SimulationParameters) -> AnalyticsResult<()> {
    if !params.initial_value.is_finite() || params.initial_value <= 0.0 {
        return Err(AnalyticsError::InvalidInput {
            field: "initial_value".into(),
            reason: "Initial value must be positive and finite".into(),
        });
    }
    if !params.drift.is_finite() {
        return Err(AnalyticsError::InvalidInput {
            field: "drift".into(),
            reason: "Drift must be finite".into(),
        });
    }
    if !params.volatility.is_finite() || params.volatility < 0.0 {
        return Err(AnalyticsError::InvalidInput {
            field: "volatility".into(),
            reason: "Volatility must be non-negative and finite".into(),
        });
    }
    if params.horizon_steps == 0 {
        return Err(AnalyticsError::InvalidInput {
            field: "horizon_steps".into(),
            reason: "Horizon must be at least one step".into(),
        });
    }
    if params.path_count == 0 {
        return Err(AnalyticsError::InvalidInput {
            field: "path_count".into(),
            reason: "Path count must be positive".into(),
        });
    }
    Ok(())
}

/// Build a histogram with `num_bins` equal-width bins over a sorted sample.
fn build_histogram(sorted: &[f64], num_bins: usize) -> Vec<HistogramBin> {
    let min_val = sorted[0];
    let max_val = sorted[sorted.len() - 1];

    if (max_val - min_val).abs() < f64::EPSILON {
        return vec![HistogramBin {
            lower: min_val,
            upper: max_val,
            count: sorted.len() as u32,
            frequency: 1.0,
        }];
    }

    let bin_width = (max_val - min_val) / num_bins as f64;
    let n = sorted.len() as f64;

    let mut bins: Vec<HistogramBin> = (0..num_bins)
        .map(|i| {
            let lower = min_val + i as f64 * bin_width;
            let upper = if i == num_bins - 1 {
                max_val
            } else {
                min_val + (i + 1) as f64 * bin_width
            };
            HistogramBin {
                lower,
                upper,
                count: 0,
                frequency: 0.0,
            }
        })
        .collect();

    for &val in sorted {
        let mut idx = ((val - min_val) / bin_width).floor() as usize;
        if idx >= num_bins {
            idx = num_bins - 1;
        }
        bins[idx].count += 1;
    }

    for bin in &mut bins {
        bin.frequency = bin.count as f64 / n;
    }

    bins
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
