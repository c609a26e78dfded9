use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::AnalyticsError;
use crate::types::{with_metadata, ComputationOutput, Currency, Money, Rate};
use crate::AnalyticsResult;

use super::wacc::{calculate_wacc, CapmWaccInput};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input assumptions for a Discounted Cash Flow valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfAssumptions {
    /// Base (Year 0) revenue
    pub base_revenue: Money,
    /// Annual revenue growth rate over the explicit forecast period
    pub revenue_growth: Rate,
    /// EBITDA margin as a fraction of revenue
    pub ebitda_margin: Rate,
    /// Marginal tax rate applied to EBITDA
    pub tax_rate: Rate,
    /// Capital expenditure as a percentage of revenue
    pub capex_pct_revenue: Rate,
    /// Net working capital as a percentage of revenue; the projection
    /// charges the year-on-year change in the balance
    pub nwc_pct_revenue: Rate,
    /// Perpetuity growth rate for the terminal value
    pub terminal_growth: Rate,
    /// Discount rate. Ignored when `capm` is provided.
    pub wacc: Rate,
    /// If provided, the discount rate is built from CAPM inputs instead
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capm: Option<CapmWaccInput>,
    /// Number of explicit forecast years
    pub projection_years: u32,
    /// Diluted shares outstanding for per-share value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shares_outstanding: Option<Decimal>,
    /// Current market price, for upside calculation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_price: Option<Money>,
    /// Reporting currency
    pub currency: Currency,
}

/// Projection for a single forecast year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfYearProjection {
    pub year: u32,
    pub revenue: Money,
    pub ebitda: Money,
    pub free_cash_flow: Money,
    pub discount_factor: Rate,
    pub present_value: Money,
}

/// Output of the DCF valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfOutput {
    /// Year-by-year projections
    pub projections: Vec<DcfYearProjection>,
    /// Undiscounted Gordon-growth terminal value
    pub terminal_value: Money,
    /// Present value of the terminal value
    pub pv_of_terminal: Money,
    /// Sum of present values of explicit-period free cash flows
    pub pv_of_fcf: Money,
    /// Fair value = PV(FCFs) + PV(terminal)
    pub fair_value: Money,
    /// Fair value per share, when shares outstanding provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fair_value_per_share: Option<Money>,
    /// Upside vs. the current market price (0.10 = 10% upside)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upside: Option<Rate>,
    /// Terminal value as a share of fair value
    pub terminal_value_pct: Rate,
    /// Discount rate used
    pub wacc_used: Rate,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run a Gordon-growth DCF valuation.
pub fn calculate_dcf(assumptions: &DcfAssumptions) -> AnalyticsResult<ComputationOutput<DcfOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let wacc = resolve_wacc(assumptions, &mut warnings)?;
    validate_assumptions(assumptions, wacc)?;

    let output = run_valuation(assumptions, wacc, &mut warnings)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Gordon-growth FCF DCF",
        assumptions,
        warnings,
        elapsed,
        output,
    ))
}

/// Core valuation used by `calculate_dcf` and re-run per cell by the
/// sensitivity grid and per scenario by the blending engine. Assumes the
/// inputs have been validated.
pub(crate) fn run_valuation(
    assumptions: &DcfAssumptions,
    wacc: Rate,
    warnings: &mut Vec<String>,
) -> AnalyticsResult<DcfOutput> {
    let n_years = assumptions.projection_years;
    let growth_factor = Decimal::ONE + assumptions.revenue_growth;
    let after_tax = Decimal::ONE - assumptions.tax_rate;

    let mut projections = Vec::with_capacity(n_years as usize);
    let mut prev_nwc = assumptions.base_revenue * assumptions.nwc_pct_revenue;
    let mut revenue = assumptions.base_revenue;
    let mut pv_of_fcf = Decimal::ZERO;

    for year in 1..=n_years {
        revenue *= growth_factor;
        let ebitda = revenue * assumptions.ebitda_margin;
        let capex = revenue * assumptions.capex_pct_revenue;
        let current_nwc = revenue * assumptions.nwc_pct_revenue;
        let nwc_change = current_nwc - prev_nwc;

        let free_cash_flow = ebitda * after_tax - capex - nwc_change;

        let discount_factor =
            Decimal::ONE / (Decimal::ONE + wacc).powd(Decimal::from(year));
        let present_value = free_cash_flow * discount_factor;
        pv_of_fcf += present_value;

        projections.push(DcfYearProjection {
            year,
            revenue,
            ebitda,
            free_cash_flow,
            discount_factor,
            present_value,
        });

        prev_nwc = current_nwc;
    }

    let last = projections.last().ok_or_else(|| {
        AnalyticsError::EmptyInput("No projection years generated".into())
    })?;

    // Divergence is rejected during validation, so the denominator is
    // strictly positive here.
    let terminal_value = last.free_cash_flow * (Decimal::ONE + assumptions.terminal_growth)
        / (wacc - assumptions.terminal_growth);
    let pv_of_terminal = terminal_value * last.discount_factor;

    let fair_value = pv_of_fcf + pv_of_terminal;

    let terminal_value_pct = if fair_value.is_zero() {
        Decimal::ZERO
    } else {
        pv_of_terminal / fair_value
    };
    if terminal_value_pct > dec!(0.75) {
        warnings.push(format!(
            "Terminal value represents {:.1}% of fair value; consider extending the explicit forecast period",
            terminal_value_pct * dec!(100)
        ));
    }

    let fair_value_per_share = match assumptions.shares_outstanding {
        Some(shares) if shares > Decimal::ZERO => Some(fair_value / shares),
        Some(_) => None,
        None => None,
    };

    let upside = match (fair_value_per_share, assumptions.current_price) {
        (Some(per_share), Some(price)) if price > Decimal::ZERO => {
            Some(per_share / price - Decimal::ONE)
        }
        (None, Some(_)) => {
            warnings.push(
                "Current price provided without shares outstanding; upside not computed".into(),
            );
            None
        }
        _ => None,
    };

    Ok(DcfOutput {
        projections,
        terminal_value,
        pv_of_terminal,
        pv_of_fcf,
        fair_value,
        fair_value_per_share,
        upside,
        terminal_value_pct,
        wacc_used: wacc,
    })
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

pub(crate) fn resolve_wacc(
    assumptions: &DcfAssumptions,
    warnings: &mut Vec<String>,
) -> AnalyticsResult<Rate> {
    if let Some(ref capm) = assumptions.capm {
        let wacc_out = calculate_wacc(capm)?;
        for w in &wacc_out.warnings {
            warnings.push(format!("[WACC] {w}"));
        }
        Ok(wacc_out.result.wacc)
    } else {
        Ok(assumptions.wacc)
    }
}

pub(crate) fn validate_assumptions(
    assumptions: &DcfAssumptions,
    wacc: Rate,
) -> AnalyticsResult<()> {
    if assumptions.base_revenue <= Decimal::ZERO {
        return Err(AnalyticsError::InvalidInput {
            field: "base_revenue".into(),
            reason: "Base revenue must be positive".into(),
        });
    }
    if assumptions.revenue_growth <= dec!(-1) {
        return Err(AnalyticsError::InvalidInput {
            field: "revenue_growth".into(),
            reason: "Growth rate must exceed -100%".into(),
        });
    }
    if assumptions.ebitda_margin <= Decimal::ZERO || assumptions.ebitda_margin >= Decimal::ONE {
        return Err(AnalyticsError::InvalidInput {
            field: "ebitda_margin".into(),
            reason: "EBITDA margin must be between 0 and 1 (exclusive)".into(),
        });
    }
    if assumptions.tax_rate < Decimal::ZERO || assumptions.tax_rate > Decimal::ONE {
        return Err(AnalyticsError::InvalidInput {
            field: "tax_rate".into(),
            reason: "Tax rate must be between 0 and 1".into(),
        });
    }
    if assumptions.capex_pct_revenue < Decimal::ZERO {
        return Err(AnalyticsError::InvalidInput {
            field: "capex_pct_revenue".into(),
            reason: "Capex percentage cannot be negative".into(),
        });
    }
    if assumptions.nwc_pct_revenue < Decimal::ZERO {
        return Err(AnalyticsError::InvalidInput {
            field: "nwc_pct_revenue".into(),
            reason: "Working capital percentage cannot be negative".into(),
        });
    }
    if assumptions.projection_years < 1 {
        return Err(AnalyticsError::InvalidInput {
            field: "projection_years".into(),
            reason: "At least one projection year required".into(),
        });
    }
    if wacc <= Decimal::ZERO {
        return Err(AnalyticsError::InvalidInput {
            field: "wacc".into(),
            reason: "WACC must be positive".into(),
        });
    }

    // Gordon growth constraint, checked before any projection is built
    if wacc <= assumptions.terminal_growth {
        return Err(AnalyticsError::DivergentTerminalValue {
            wacc,
            terminal_growth: assumptions.terminal_growth,
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
