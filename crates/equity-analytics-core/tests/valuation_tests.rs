use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use equity_analytics_core::error::AnalyticsError;
use equity_analytics_core::types::Currency;
use equity_analytics_core::valuation::comps::{
    calculate_comps, CompsInput, PeerCompany, PeerMultiples, PeerRatios, TargetFundamentals,
};
use equity_analytics_core::valuation::dcf::{calculate_dcf, DcfAssumptions};
use equity_analytics_core::valuation::scenarios::{
    blend_scenarios, DcfScenario, DcfScenarioInput,
};
use equity_analytics_core::valuation::sensitivity::{
    dcf_sensitivity, DcfSensitivityInput, SweepRange,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn reference_assumptions() -> DcfAssumptions {
    DcfAssumptions {
        base_revenue: dec!(100),
        revenue_growth: dec!(0.05),
        ebitda_margin: dec!(0.30),
        tax_rate: dec!(0.25),
        capex_pct_revenue: Decimal::ZERO,
        nwc_pct_revenue: Decimal::ZERO,
        terminal_growth: dec!(0.025),
        wacc: dec!(0.08),
        capm: None,
        projection_years: 10,
        shares_outstanding: None,
        current_price: None,
        currency: Currency::USD,
    }
}

fn pe_only_peer(symbol: &str, pe: Decimal) -> PeerCompany {
    PeerCompany {
        symbol: symbol.into(),
        multiples: PeerMultiples {
            pe: Some(pe),
            ..Default::default()
        },
        ratios: PeerRatios::default(),
    }
}

// ---------------------------------------------------------------------------
// DCF regression and property tests
// ---------------------------------------------------------------------------

#[test]
fn test_dcf_reference_fixture() {
    // Fixed regression value derived from the closed-form geometric sum:
    // explicit PV 193.34 + discounted terminal 316.37 = 509.71
    let result = calculate_dcf(&reference_assumptions()).unwrap();
    let fv = result.result.fair_value;
    assert!(
        (fv - dec!(509.71)).abs() < dec!(0.05),
        "fair value {fv} drifted from regression fixture"
    );
}

#[test]
fn test_dcf_fixture_components() {
    let result = calculate_dcf(&reference_assumptions()).unwrap();
    let out = &result.result;

    // Year 1: revenue 105, EBITDA 31.5, FCF 31.5 * 0.75 = 23.625
    assert_eq!(out.projections[0].revenue, dec!(105.00));
    assert_eq!(out.projections[0].free_cash_flow, dec!(23.62500));

    assert!((out.pv_of_fcf - dec!(193.34)).abs() < dec!(0.05));
    assert!((out.pv_of_terminal - dec!(316.37)).abs() < dec!(0.05));
}

#[test]
fn test_dcf_strictly_decreasing_in_wacc() {
    let mut prev = Decimal::MAX;
    for wacc in [dec!(0.06), dec!(0.08), dec!(0.10), dec!(0.12)] {
        let mut assumptions = reference_assumptions();
        assumptions.wacc = wacc;
        let fv = calculate_dcf(&assumptions).unwrap().result.fair_value;
        assert!(fv < prev, "fair value should fall as WACC rises");
        prev = fv;
    }
}

#[test]
fn test_dcf_strictly_increasing_in_growth() {
    let mut prev = Decimal::MIN;
    for growth in [dec!(0.01), dec!(0.03), dec!(0.05), dec!(0.07)] {
        let mut assumptions = reference_assumptions();
        assumptions.revenue_growth = growth;
        let fv = calculate_dcf(&assumptions).unwrap().result.fair_value;
        assert!(fv > prev, "fair value should rise with revenue growth");
        prev = fv;
    }
}

#[test]
fn test_dcf_divergence_checked_before_projection() {
    let mut assumptions = reference_assumptions();
    assumptions.terminal_growth = dec!(0.08);

    match calculate_dcf(&assumptions) {
        Err(AnalyticsError::DivergentTerminalValue { .. }) => {}
        other => panic!("expected DivergentTerminalValue, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Sensitivity grid
// ---------------------------------------------------------------------------

#[test]
fn test_sensitivity_grid_shape_and_base_case() {
    let input = DcfSensitivityInput {
        assumptions: reference_assumptions(),
        wacc_range: SweepRange {
            min: dec!(0.06),
            max: dec!(0.10),
            step: dec!(0.01),
        },
        growth_range: SweepRange {
            min: dec!(0.03),
            max: dec!(0.07),
            step: dec!(0.01),
        },
    };

    let result = dcf_sensitivity(&input).unwrap();
    let out = &result.result;

    assert_eq!(out.fair_values.len(), out.wacc_values.len());
    assert_eq!(out.fair_values[0].len(), out.growth_values.len());

    // The base case value matches a standalone DCF run
    let standalone = calculate_dcf(&reference_assumptions()).unwrap();
    assert_eq!(out.base_case_fair_value, standalone.result.fair_value);

    // The (wacc=0.08, growth=0.05) cell reproduces the base case too
    let i = out.wacc_values.iter().position(|w| *w == dec!(0.08)).unwrap();
    let j = out
        .growth_values
        .iter()
        .position(|g| *g == dec!(0.05))
        .unwrap();
    assert_eq!(out.fair_values[i][j].unwrap(), standalone.result.fair_value);
}

// ---------------------------------------------------------------------------
// Scenario blending
// ---------------------------------------------------------------------------

#[test]
fn test_scenario_blend_weighted_value() {
    let mut bear = reference_assumptions();
    bear.revenue_growth = dec!(0.00);
    let mut bull = reference_assumptions();
    bull.revenue_growth = dec!(0.09);

    let input = DcfScenarioInput {
        scenarios: vec![
            DcfScenario {
                name: "Bear".into(),
                probability: dec!(0.30),
                assumptions: bear,
            },
            DcfScenario {
                name: "Base".into(),
                probability: dec!(0.50),
                assumptions: reference_assumptions(),
            },
            DcfScenario {
                name: "Bull".into(),
                probability: dec!(0.20),
                assumptions: bull,
            },
        ],
    };

    let result = blend_scenarios(&input).unwrap();
    let out = &result.result;

    let manual: Decimal = out
        .outcomes
        .iter()
        .map(|o| o.probability * o.fair_value)
        .sum();
    assert_eq!(out.probability_weighted_fair_value, manual);
    assert!(out.outcomes[0].fair_value < out.outcomes[2].fair_value);
}

#[test]
fn test_scenario_probabilities_validated() {
    let input = DcfScenarioInput {
        scenarios: vec![
            DcfScenario {
                name: "A".into(),
                probability: dec!(0.30),
                assumptions: reference_assumptions(),
            },
            DcfScenario {
                name: "B".into(),
                probability: dec!(0.30),
                assumptions: reference_assumptions(),
            },
        ],
    };

    assert!(matches!(
        blend_scenarios(&input),
        Err(AnalyticsError::InvalidInput { .. })
    ));
}

// ---------------------------------------------------------------------------
// Comparable engine
// ---------------------------------------------------------------------------

#[test]
fn test_peer_pe_statistics_fixture() {
    // P/E set [20, 25, 30, 35, 40]: median 30, mean 30, sample stddev ~7.91
    let input = CompsInput {
        target_symbol: "TGT".into(),
        target: TargetFundamentals {
            net_income: Some(dec!(100)),
            ..Default::default()
        },
        peers: vec![
            pe_only_peer("A", dec!(20)),
            pe_only_peer("B", dec!(25)),
            pe_only_peer("C", dec!(30)),
            pe_only_peer("D", dec!(35)),
            pe_only_peer("E", dec!(40)),
        ],
        weights: None,
        currency: Currency::USD,
    };

    let result = calculate_comps(&input).unwrap();
    let stat = &result.result.statistics[0];

    assert_eq!(stat.median, dec!(30));
    assert_eq!(stat.mean, dec!(30));
    assert!((stat.std_dev - dec!(7.91)).abs() < dec!(0.01));

    // min <= p25 <= median <= p75 <= max
    assert!(stat.min <= stat.percentile_25);
    assert!(stat.percentile_25 <= stat.median);
    assert!(stat.median <= stat.percentile_75);
    assert!(stat.percentile_75 <= stat.max);

    // Implied at peer median: 100 x 30
    assert_eq!(result.result.implied_valuations[0].implied_value, dec!(3000));
}

#[test]
fn test_empty_peer_list_is_typed_error() {
    let input = CompsInput {
        target_symbol: "TGT".into(),
        target: TargetFundamentals {
            net_income: Some(dec!(100)),
            ..Default::default()
        },
        peers: vec![],
        weights: None,
        currency: Currency::USD,
    };

    match calculate_comps(&input) {
        Err(AnalyticsError::EmptyInput(_)) => {}
        other => panic!("expected EmptyInput, got {other:?}"),
    }
}
