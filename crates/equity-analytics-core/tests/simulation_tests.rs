use pretty_assertions::assert_eq;

use equity_analytics_core::error::AnalyticsError;
use equity_analytics_core::risk::metrics::{
    calculate_risk_metrics, MonteCarloVarConfig, RiskInput,
};
use equity_analytics_core::risk::returns::{ReturnFrequency, ReturnSeries};
use equity_analytics_core::simulation::gbm::{
    run_simulation, simulate_final_values, SimulationParameters,
};
use equity_analytics_core::types::CancelToken;

fn reference_params() -> SimulationParameters {
    SimulationParameters {
        initial_value: 100.0,
        drift: 0.08,
        volatility: 0.2,
        horizon_steps: 252,
        path_count: 10_000,
        seed: Some(42),
    }
}

// ---------------------------------------------------------------------------
// Seeded reproducibility
// ---------------------------------------------------------------------------

#[test]
fn test_identical_seed_produces_identical_ladder() {
    let r1 = run_simulation(&reference_params(), None).unwrap();
    let r2 = run_simulation(&reference_params(), None).unwrap();

    assert_eq!(r1.result.percentiles, r2.result.percentiles);
    assert_eq!(r1.result.mean, r2.result.mean);
    assert_eq!(r1.result.std_dev, r2.result.std_dev);
    assert_eq!(r1.result.probability_of_loss, r2.result.probability_of_loss);
    assert_eq!(r1.result.confidence_interval, r2.result.confidence_interval);
}

#[test]
fn test_raw_final_values_bit_identical_across_runs() {
    let finals1 = simulate_final_values(&reference_params(), None).unwrap();
    let finals2 = simulate_final_values(&reference_params(), None).unwrap();
    assert_eq!(finals1, finals2);
}

// ---------------------------------------------------------------------------
// Convergence to the analytic GBM expectation
// ---------------------------------------------------------------------------

#[test]
fn test_sample_mean_converges_to_analytic_expectation() {
    let params = SimulationParameters {
        path_count: 100_000,
        ..reference_params()
    };

    let result = run_simulation(&params, None).unwrap();
    // The discretised scheme compounds to S0 * (1 + mu/n)^n, which sits
    // within 0.01% of S0 * e^mu at 252 steps.
    let expected = 100.0 * (0.08_f64).exp();
    let mean = result.result.mean;
    assert!(
        (mean - expected).abs() / expected < 0.01,
        "mean={mean} analytic={expected}"
    );
}

#[test]
fn test_distribution_shape_tracks_lognormal() {
    let result = run_simulation(&reference_params(), None).unwrap();
    let out = &result.result;

    // Lognormal quantiles at mu=0.08, sigma=0.2, T=1:
    // p5 ~ 76, median ~ 106, p95 ~ 147. Wide bands absorb the
    // discretisation and sampling error at 10,000 paths.
    assert!(out.percentiles.p5 > 65.0 && out.percentiles.p5 < 88.0);
    assert!(out.percentiles.p50 > 98.0 && out.percentiles.p50 < 114.0);
    assert!(out.percentiles.p95 > 130.0 && out.percentiles.p95 < 165.0);

    // P(loss) = Phi(-(mu - sigma^2/2)/sigma) ~ 0.38
    assert!(out.probability_of_loss > 0.30 && out.probability_of_loss < 0.46);
}

// ---------------------------------------------------------------------------
// Noise model: standard normal, not rescaled uniform
// ---------------------------------------------------------------------------

#[test]
fn test_single_step_tails_exceed_uniform_bound() {
    // The dashboard this engine replaced approximated its noise term with
    // (U - 0.5) * 2 * sigma / sqrt(n), which hard-caps each increment at
    // +/- sigma / sqrt(n). A genuine standard-normal sampler leaves ~32%
    // of draws beyond one sigma, so single-step finals must routinely land
    // outside the uniform scheme's reachable band.
    let params = SimulationParameters {
        initial_value: 100.0,
        drift: 0.0,
        volatility: 0.2,
        horizon_steps: 1,
        path_count: 10_000,
        seed: Some(42),
    };

    let finals = simulate_final_values(&params, None).unwrap();
    let beyond_band = finals
        .iter()
        .filter(|v| **v < 80.0 || **v > 120.0)
        .count() as f64
        / finals.len() as f64;

    // ~31.7% of standard-normal draws fall beyond +/- 1 sigma
    assert!(
        beyond_band > 0.25 && beyond_band < 0.40,
        "tail fraction {beyond_band} inconsistent with normal noise"
    );
}

// ---------------------------------------------------------------------------
// Cancellation and aggregation integrity
// ---------------------------------------------------------------------------

#[test]
fn test_cancelled_simulation_reports_cancelled_not_failure() {
    let token = CancelToken::new();
    token.cancel();

    match run_simulation(&reference_params(), Some(&token)) {
        Err(AnalyticsError::Cancelled) => {}
        other => panic!("expected Cancelled, got {other:?}"),
    }
}

#[test]
fn test_histogram_and_ladder_cover_all_paths() {
    let result = run_simulation(&reference_params(), None).unwrap();
    let out = &result.result;

    let counted: u32 = out.histogram.iter().map(|b| b.count).sum();
    assert_eq!(counted, out.path_count);

    let freq_total: f64 = out.histogram.iter().map(|b| b.frequency).sum();
    assert!((freq_total - 1.0).abs() < 1e-9);

    assert!(out.percentiles.p5 <= out.percentiles.p25);
    assert!(out.percentiles.p25 <= out.percentiles.p50);
    assert!(out.percentiles.p50 <= out.percentiles.p75);
    assert!(out.percentiles.p75 <= out.percentiles.p90);
    assert!(out.percentiles.p90 <= out.percentiles.p95);
}

// ---------------------------------------------------------------------------
// Monte Carlo VaR delegation through the risk engine
// ---------------------------------------------------------------------------

#[test]
fn test_monte_carlo_var_seeded_and_ordered() {
    let input = RiskInput {
        series: ReturnSeries {
            returns: vec![
                0.042, -0.018, 0.025, 0.011, -0.032, 0.046, 0.019, -0.024, 0.055, 0.008,
                -0.015, 0.029,
            ],
            frequency: ReturnFrequency::Monthly,
        },
        risk_free_rate: 0.03,
        confidence_levels: vec![0.95, 0.99],
        benchmark: None,
        monte_carlo: Some(MonteCarloVarConfig {
            path_count: 20_000,
            seed: Some(42),
        }),
    };

    let r1 = calculate_risk_metrics(&input, None).unwrap();
    let r2 = calculate_risk_metrics(&input, None).unwrap();

    for (a, b) in r1.result.var.iter().zip(r2.result.var.iter()) {
        assert_eq!(a.monte_carlo.unwrap(), b.monte_carlo.unwrap());
    }
    assert!(r1.result.var[1].monte_carlo.unwrap() >= r1.result.var[0].monte_carlo.unwrap());
}
