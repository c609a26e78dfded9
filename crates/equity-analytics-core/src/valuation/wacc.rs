use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::AnalyticsError;
use crate::types::{with_metadata, ComputationOutput, Rate};
use crate::AnalyticsResult;

/// CAPM inputs for building a discount rate when one is not supplied
/// directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapmWaccInput {
    /// Risk-free rate (e.g. 10-year government bond yield)
    pub risk_free_rate: Rate,
    /// Equity risk premium (market return minus risk-free rate)
    pub equity_risk_premium: Rate,
    /// Levered beta of equity
    pub beta: Decimal,
    /// Pre-tax cost of debt
    pub cost_of_debt: Rate,
    /// Marginal corporate tax rate
    pub tax_rate: Rate,
    /// Weight of debt in capital structure (market value basis)
    pub debt_weight: Rate,
    /// Weight of equity in capital structure (market value basis)
    pub equity_weight: Rate,
}

/// Output of the WACC build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaccOutput {
    /// Weighted average cost of capital
    pub wacc: Rate,
    /// Cost of equity via CAPM
    pub cost_of_equity: Rate,
    /// After-tax cost of debt
    pub after_tax_cost_of_debt: Rate,
}

/// Build a discount rate from CAPM inputs.
///
/// Cost of equity: Ke = Rf + Beta * ERP
/// After-tax cost of debt: Kd_at = Kd * (1 - t)
/// WACC = Ke * We + Kd_at * Wd
pub fn calculate_wacc(input: &CapmWaccInput) -> AnalyticsResult<ComputationOutput<WaccOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_wacc_input(input)?;

    let cost_of_equity = input.risk_free_rate + input.beta * input.equity_risk_premium;
    let after_tax_cost_of_debt = input.cost_of_debt * (Decimal::ONE - input.tax_rate);
    let wacc = cost_of_equity * input.equity_weight + after_tax_cost_of_debt * input.debt_weight;

    if input.beta > dec!(3.0) {
        warnings.push(format!(
            "High beta ({}): verify market data; betas above 3.0 are unusual",
            input.beta
        ));
    }
    if wacc > dec!(0.20) {
        warnings.push(format!(
            "WACC of {wacc} exceeds 20%; appropriate for high-risk situations only"
        ));
    }

    let output = WaccOutput {
        wacc,
        cost_of_equity,
        after_tax_cost_of_debt,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "WACC via CAPM",
        input,
        warnings,
        elapsed,
        output,
    ))
}

fn validate_wacc_input(input: &CapmWaccInput) -> AnalyticsResult<()> {
    if input.risk_free_rate < Decimal::ZERO {
        return Err(AnalyticsError::InvalidInput {
            field: "risk_free_rate".into(),
            reason: "Risk-free rate cannot be negative".into(),
        });
    }
    if input.equity_risk_premium < Decimal::ZERO {
        return Err(AnalyticsError::InvalidInput {
            field: "equity_risk_premium".into(),
            reason: "Equity risk premium cannot be negative".into(),
        });
    }
    if input.tax_rate < Decimal::ZERO || input.tax_rate > Decimal::ONE {
        return Err(AnalyticsError::InvalidInput {
            field: "tax_rate".into(),
            reason: "Tax rate must be between 0 and 1".into(),
        });
    }

    let weight_sum = input.debt_weight + input.equity_weight;
    if (weight_sum - Decimal::ONE).abs() > dec!(0.01) {
        return Err(AnalyticsError::InvalidInput {
            field: "debt_weight + equity_weight".into(),
            reason: format!("Capital structure weights must sum to 1.0, got {weight_sum}"),
        });
    }

    Ok(())
}
