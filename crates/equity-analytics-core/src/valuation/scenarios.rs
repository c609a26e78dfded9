use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::AnalyticsError;
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::AnalyticsResult;

use super::dcf::{resolve_wacc, run_valuation, validate_assumptions, DcfAssumptions};

/// A named scenario: a complete assumption set with a probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfScenario {
    pub name: String,
    pub probability: Rate,
    pub assumptions: DcfAssumptions,
}

/// Input for probability-weighted scenario blending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfScenarioInput {
    pub scenarios: Vec<DcfScenario>,
}

/// Valuation outcome for one scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub name: String,
    pub probability: Rate,
    pub fair_value: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fair_value_per_share: Option<Money>,
    pub deviation_from_blend: Money,
    pub deviation_pct: Rate,
}

/// Output of scenario blending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfScenarioOutput {
    pub outcomes: Vec<ScenarioOutcome>,
    pub probability_weighted_fair_value: Money,
}

/// Value each scenario and blend fair values by probability.
///
/// Probabilities must sum to 1 within 1e-6; each scenario is a full
/// assumption set, so bear/base/bull cases can move any input.
pub fn blend_scenarios(
    input: &DcfScenarioInput,
) -> AnalyticsResult<ComputationOutput<DcfScenarioOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.scenarios.is_empty() {
        return Err(AnalyticsError::EmptyInput(
            "At least one scenario required".into(),
        ));
    }

    for s in &input.scenarios {
        if s.probability < Decimal::ZERO || s.probability > Decimal::ONE {
            return Err(AnalyticsError::InvalidInput {
                field: format!("scenario:{} probability", s.name),
                reason: "Probability must be between 0 and 1".into(),
            });
        }
    }

    let total_prob: Decimal = input.scenarios.iter().map(|s| s.probability).sum();
    if (total_prob - Decimal::ONE).abs() > dec!(0.000001) {
        return Err(AnalyticsError::InvalidInput {
            field: "probabilities".into(),
            reason: format!("Probabilities must sum to 1.0 (got {total_prob})"),
        });
    }

    let mut valued = Vec::with_capacity(input.scenarios.len());
    let mut probability_weighted_fair_value = Decimal::ZERO;

    for scenario in &input.scenarios {
        let wacc = resolve_wacc(&scenario.assumptions, &mut warnings)?;
        validate_assumptions(&scenario.assumptions, wacc).map_err(|e| match e {
            AnalyticsError::InvalidInput { field, reason } => AnalyticsError::InvalidInput {
                field: format!("scenario:{} {field}", scenario.name),
                reason,
            },
            other => other,
        })?;

        let mut scenario_warnings = Vec::new();
        let out = run_valuation(&scenario.assumptions, wacc, &mut scenario_warnings)?;
        for w in scenario_warnings {
            warnings.push(format!("[{}] {w}", scenario.name));
        }

        probability_weighted_fair_value += scenario.probability * out.fair_value;
        valued.push((scenario, out));
    }

    let outcomes = valued
        .into_iter()
        .map(|(scenario, out)| {
            let deviation = out.fair_value - probability_weighted_fair_value;
            let deviation_pct = if probability_weighted_fair_value.is_zero() {
                Decimal::ZERO
            } else {
                deviation / probability_weighted_fair_value
            };
            ScenarioOutcome {
                name: scenario.name.clone(),
                probability: scenario.probability,
                fair_value: out.fair_value,
                fair_value_per_share: out.fair_value_per_share,
                deviation_from_blend: deviation,
                deviation_pct,
            }
        })
        .collect();

    let output = DcfScenarioOutput {
        outcomes,
        probability_weighted_fair_value,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Probability-Weighted DCF Scenarios",
        &serde_json::json!({
            "num_scenarios": input.scenarios.len(),
        }),
        warnings,
        elapsed,
        output,
    ))
}
