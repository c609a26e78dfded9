use equity_analytics_core::error::AnalyticsError;
use equity_analytics_core::portfolio::optimizer::{
    optimize_portfolio, AssetSeries, OptimizationInput, WeightBounds,
};
use equity_analytics_core::risk::returns::ReturnFrequency;
use equity_analytics_core::types::CancelToken;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn three_asset_input() -> OptimizationInput {
    OptimizationInput {
        assets: vec![
            AssetSeries {
                symbol: "TECH".into(),
                returns: vec![
                    0.031, -0.012, 0.024, 0.018, -0.027, 0.035, 0.009, -0.016, 0.028, 0.014,
                    -0.008, 0.021,
                ],
            },
            AssetSeries {
                symbol: "UTIL".into(),
                returns: vec![
                    0.008, 0.004, 0.006, -0.003, 0.009, 0.005, 0.007, 0.002, -0.004, 0.008,
                    0.006, 0.003,
                ],
            },
            AssetSeries {
                symbol: "BOND".into(),
                returns: vec![
                    0.004, 0.003, 0.005, 0.004, 0.002, 0.004, 0.005, 0.003, 0.004, 0.005,
                    0.003, 0.004,
                ],
            },
        ],
        frequency: ReturnFrequency::Monthly,
        risk_free_rate: 0.02,
        bounds: None,
        target_return: None,
        frontier_points: Some(15),
    }
}

fn weight_sum(weights: &[f64]) -> f64 {
    weights.iter().sum()
}

// ---------------------------------------------------------------------------
// Weight invariants
// ---------------------------------------------------------------------------

#[test]
fn test_all_reported_portfolios_are_fully_invested() {
    let result = optimize_portfolio(&three_asset_input(), None).unwrap();
    let out = &result.result;

    let optimal: Vec<f64> = out.weights.iter().map(|w| w.weight).collect();
    assert!((weight_sum(&optimal) - 1.0).abs() < 1e-6);
    assert!((weight_sum(&out.min_variance_portfolio.weights) - 1.0).abs() < 1e-6);
    assert!((weight_sum(&out.tangency_portfolio.weights) - 1.0).abs() < 1e-6);
    for point in &out.efficient_frontier {
        assert!((weight_sum(&point.weights) - 1.0).abs() < 1e-6);
    }
}

#[test]
fn test_weights_stay_inside_configured_bounds() {
    let mut input = three_asset_input();
    let bounds = vec![
        WeightBounds { min: 0.05, max: 0.50 },
        WeightBounds { min: 0.10, max: 0.70 },
        WeightBounds { min: 0.15, max: 0.80 },
    ];
    input.bounds = Some(bounds.clone());

    let result = optimize_portfolio(&input, None).unwrap();
    let out = &result.result;

    for (aw, b) in out.weights.iter().zip(bounds.iter()) {
        assert!(
            aw.weight >= b.min - 1e-6 && aw.weight <= b.max + 1e-6,
            "{} weight {} outside [{}, {}]",
            aw.symbol,
            aw.weight,
            b.min,
            b.max
        );
    }
    for point in &out.efficient_frontier {
        for (w, b) in point.weights.iter().zip(bounds.iter()) {
            assert!(*w >= b.min - 1e-6 && *w <= b.max + 1e-6);
        }
    }
}

// ---------------------------------------------------------------------------
// Frontier shape
// ---------------------------------------------------------------------------

#[test]
fn test_frontier_returns_increase_monotonically() {
    let result = optimize_portfolio(&three_asset_input(), None).unwrap();
    let frontier = &result.result.efficient_frontier;

    assert_eq!(frontier.len(), 15);
    for pair in frontier.windows(2) {
        assert!(pair[1].expected_return >= pair[0].expected_return - 1e-6);
    }
}

#[test]
fn test_risk_is_minimized_at_the_min_variance_end() {
    let result = optimize_portfolio(&three_asset_input(), None).unwrap();
    let out = &result.result;

    for point in &out.efficient_frontier {
        assert!(
            point.risk >= out.min_variance_portfolio.risk - 1e-9,
            "frontier point risk {} below minimum variance risk {}",
            point.risk,
            out.min_variance_portfolio.risk
        );
    }
}

#[test]
fn test_tangency_dominates_on_sharpe() {
    let result = optimize_portfolio(&three_asset_input(), None).unwrap();
    let out = &result.result;

    // The tangency portfolio is the Sharpe maximiser among reported points,
    // up to solver tolerance.
    for point in &out.efficient_frontier {
        assert!(out.tangency_portfolio.sharpe_ratio >= point.sharpe_ratio - 0.05);
    }
}

// ---------------------------------------------------------------------------
// Targets and feasibility
// ---------------------------------------------------------------------------

#[test]
fn test_target_return_is_hit_within_tolerance() {
    let mut input = three_asset_input();
    // TECH annualises near 12%, BOND near 4.6%; 8% sits inside the hull
    input.target_return = Some(0.08);

    let result = optimize_portfolio(&input, None).unwrap();
    assert!(
        (result.result.expected_return - 0.08).abs() < 0.01,
        "expected_return={}",
        result.result.expected_return
    );
}

#[test]
fn test_bounds_that_cannot_sum_to_one_rejected() {
    let mut input = three_asset_input();
    input.bounds = Some(vec![
        WeightBounds { min: 0.0, max: 0.2 },
        WeightBounds { min: 0.0, max: 0.3 },
        WeightBounds { min: 0.0, max: 0.3 },
    ]);

    match optimize_portfolio(&input, None) {
        Err(AnalyticsError::InfeasibleConstraints(msg)) => {
            assert!(msg.contains("Maximum weights"), "unexpected message: {msg}");
        }
        other => panic!("expected InfeasibleConstraints, got {other:?}"),
    }
}

#[test]
fn test_ragged_series_rejected_before_estimation() {
    let mut input = three_asset_input();
    input.assets[2].returns.truncate(8);

    match optimize_portfolio(&input, None) {
        Err(AnalyticsError::MismatchedSeriesLength { left, right, .. }) => {
            assert_eq!(left, 12);
            assert_eq!(right, 8);
        }
        other => panic!("expected MismatchedSeriesLength, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Determinism and cancellation
// ---------------------------------------------------------------------------

#[test]
fn test_repeat_runs_are_identical() {
    let input = three_asset_input();
    let r1 = optimize_portfolio(&input, None).unwrap();
    let r2 = optimize_portfolio(&input, None).unwrap();

    let w1: Vec<f64> = r1.result.weights.iter().map(|w| w.weight).collect();
    let w2: Vec<f64> = r2.result.weights.iter().map(|w| w.weight).collect();
    assert_eq!(w1, w2);

    let f1: Vec<f64> = r1
        .result
        .efficient_frontier
        .iter()
        .map(|p| p.risk)
        .collect();
    let f2: Vec<f64> = r2
        .result
        .efficient_frontier
        .iter()
        .map(|p| p.risk)
        .collect();
    assert_eq!(f1, f2);
}

#[test]
fn test_cancelled_sweep_reports_cancelled() {
    let token = CancelToken::new();
    token.cancel();

    match optimize_portfolio(&three_asset_input(), Some(&token)) {
        Err(AnalyticsError::Cancelled) => {}
        other => panic!("expected Cancelled, got {other:?}"),
    }
}
