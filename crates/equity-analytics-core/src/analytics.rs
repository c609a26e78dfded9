use serde::{Deserialize, Serialize};

use crate::portfolio::optimizer::{optimize_portfolio, OptimizationInput, OptimizationOutput};
use crate::risk::metrics::{calculate_risk_metrics, RiskInput, RiskMetricsOutput};
use crate::simulation::gbm::{run_simulation, SimulationParameters, SimulationResult};
use crate::types::{CancelToken, ComputationOutput};
use crate::valuation::comps::{calculate_comps, rank_peers, CompsInput, CompsOutput, PeerRankingInput, PeerRankingOutput};
use crate::valuation::dcf::{calculate_dcf, DcfAssumptions, DcfOutput};
use crate::valuation::scenarios::{blend_scenarios, DcfScenarioInput, DcfScenarioOutput};
use crate::valuation::sensitivity::{dcf_sensitivity, DcfSensitivityInput, DcfSensitivityOutput};
use crate::AnalyticsResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One request covering any subset of the engines for a single symbol.
/// Omitted sections are skipped, not failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsRequest {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dcf: Option<DcfAssumptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<DcfSensitivityInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenarios: Option<DcfScenarioInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparables: Option<CompsInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_ranking: Option<PeerRankingInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation: Option<SimulationParameters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimization: Option<OptimizationInput>,
}

/// One dashboard panel: the engine result, a typed failure, or skipped
/// because the request did not ask for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Panel<T: Serialize> {
    Ready { result: ComputationOutput<T> },
    Failed { kind: String, message: String },
    Skipped,
}

impl<T: Serialize> Panel<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Panel::Ready { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Panel::Failed { .. })
    }
}

/// Aggregated report for the presentation layer. Panels fail
/// independently; a valuation error never blanks the risk panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub symbol: String,
    pub dcf: Panel<DcfOutput>,
    pub sensitivity: Panel<DcfSensitivityOutput>,
    pub scenarios: Panel<DcfScenarioOutput>,
    pub comparables: Panel<CompsOutput>,
    pub peer_ranking: Panel<PeerRankingOutput>,
    pub risk: Panel<RiskMetricsOutput>,
    pub simulation: Panel<SimulationResult>,
    pub optimization: Panel<OptimizationOutput>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run every requested engine and collect per-panel outcomes.
pub fn run_analysis(request: &AnalyticsRequest, cancel: Option<&CancelToken>) -> AnalyticsReport {
    AnalyticsReport {
        symbol: request.symbol.clone(),
        dcf: panel(request.dcf.as_ref(), calculate_dcf),
        sensitivity: panel(request.sensitivity.as_ref(), dcf_sensitivity),
        scenarios: panel(request.scenarios.as_ref(), blend_scenarios),
        comparables: panel(request.comparables.as_ref(), calculate_comps),
        peer_ranking: panel(request.peer_ranking.as_ref(), rank_peers),
        risk: panel(request.risk.as_ref(), |input| {
            calculate_risk_metrics(input, cancel)
        }),
        simulation: panel(request.simulation.as_ref(), |params| {
            run_simulation(params, cancel)
        }),
        optimization: panel(request.optimization.as_ref(), |input| {
            optimize_portfolio(input, cancel)
        }),
    }
}

fn panel<I, T: Serialize>(
    input: Option<&I>,
    run: impl FnOnce(&I) -> AnalyticsResult<ComputationOutput<T>>,
) -> Panel<T> {
    match input {
        None => Panel::Skipped,
        Some(input) => match run(input) {
            Ok(result) => Panel::Ready { result },
            Err(e) => Panel::Failed {
                kind: e.kind().to_string(),
                message: e.to_string(),
            },
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::returns::{ReturnFrequency, ReturnSeries};
    use crate::types::Currency;
    use rust_decimal_macros::dec;

    fn dcf_assumptions() -> DcfAssumptions {
        DcfAssumptions {
            base_revenue: dec!(1000),
            revenue_growth: dec!(0.05),
            ebitda_margin: dec!(0.25),
            tax_rate: dec!(0.25),
            capex_pct_revenue: dec!(0.05),
            nwc_pct_revenue: dec!(0.10),
            terminal_growth: dec!(0.025),
            wacc: dec!(0.10),
            capm: None,
            projection_years: 5,
            shares_outstanding: None,
            current_price: None,
            currency: Currency::USD,
        }
    }

    fn risk_input() -> RiskInput {
        RiskInput {
            series: ReturnSeries {
                returns: vec![0.02, -0.01, 0.03, 0.01, -0.02, 0.02],
                frequency: ReturnFrequency::Monthly,
            },
            risk_free_rate: 0.03,
            confidence_levels: vec![0.95],
            benchmark: None,
            monte_carlo: None,
        }
    }

    #[test]
    fn test_skipped_panels() {
        let request = AnalyticsRequest {
            symbol: "ACME".into(),
            dcf: Some(dcf_assumptions()),
            sensitivity: None,
            scenarios: None,
            comparables: None,
            peer_ranking: None,
            risk: None,
            simulation: None,
            optimization: None,
        };

        let report = run_analysis(&request, None);
        assert!(report.dcf.is_ready());
        assert!(matches!(report.risk, Panel::Skipped));
        assert!(matches!(report.comparables, Panel::Skipped));
    }

    #[test]
    fn test_one_failure_does_not_block_others() {
        let mut bad_dcf = dcf_assumptions();
        bad_dcf.terminal_growth = dec!(0.50); // diverges

        let request = AnalyticsRequest {
            symbol: "ACME".into(),
            dcf: Some(bad_dcf),
            sensitivity: None,
            scenarios: None,
            comparables: None,
            peer_ranking: None,
            risk: Some(risk_input()),
            simulation: None,
            optimization: None,
        };

        let report = run_analysis(&request, None);
        match &report.dcf {
            Panel::Failed { kind, .. } => assert_eq!(kind, "divergent_terminal_value"),
            other => panic!("expected failed DCF panel, got {other:?}"),
        }
        assert!(report.risk.is_ready());
    }

    #[test]
    fn test_cancellation_surfaces_as_panel_kind() {
        let token = CancelToken::new();
        token.cancel();

        let request = AnalyticsRequest {
            symbol: "ACME".into(),
            dcf: Some(dcf_assumptions()),
            sensitivity: None,
            scenarios: None,
            comparables: None,
            peer_ranking: None,
            risk: None,
            simulation: Some(SimulationParameters {
                initial_value: 100.0,
                drift: 0.08,
                volatility: 0.2,
                horizon_steps: 252,
                path_count: 10_000,
                seed: Some(42),
            }),
            optimization: None,
        };

        let report = run_analysis(&request, Some(&token));
        // The pure valuation still completes; the simulation reports abort
        assert!(report.dcf.is_ready());
        match &report.simulation {
            Panel::Failed { kind, .. } => assert_eq!(kind, "cancelled"),
            other => panic!("expected cancelled simulation panel, got {other:?}"),
        }
    }

    #[test]
    fn test_report_serializes_with_tagged_panels() {
        let request = AnalyticsRequest {
            symbol: "ACME".into(),
            dcf: Some(dcf_assumptions()),
            sensitivity: None,
            scenarios: None,
            comparables: None,
            peer_ranking: None,
            risk: None,
            simulation: None,
            optimization: None,
        };

        let report = run_analysis(&request, None);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["dcf"]["status"], "ready");
        assert_eq!(json["risk"]["status"], "skipped");
        assert_eq!(json["symbol"], "ACME");
    }
}
