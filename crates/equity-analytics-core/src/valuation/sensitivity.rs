use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::AnalyticsError;
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::AnalyticsResult;

use super::dcf::{calculate_dcf, run_valuation, validate_assumptions, DcfAssumptions};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A sweep range for one sensitivity dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepRange {
    pub min: Rate,
    pub max: Rate,
    pub step: Rate,
}

/// Input for the two-way DCF sensitivity grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfSensitivityInput {
    /// Base case assumptions; each cell overrides WACC and revenue growth
    pub assumptions: DcfAssumptions,
    /// Discount rate sweep (rows)
    pub wacc_range: SweepRange,
    /// Revenue growth sweep (columns)
    pub growth_range: SweepRange,
}

/// Output of the sensitivity grid.
///
/// Rows follow the WACC sweep, columns the growth sweep, both ascending,
/// so the matrix is reproducible cell for cell across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfSensitivityOutput {
    pub wacc_values: Vec<Rate>,
    pub growth_values: Vec<Rate>,
    /// `fair_values[i][j]` = fair value at `wacc_values[i]` and
    /// `growth_values[j]`; `None` where the cell's WACC does not exceed
    /// the terminal growth rate
    pub fair_values: Vec<Vec<Option<Money>>>,
    /// Fair value at the unmodified base assumptions
    pub base_case_fair_value: Money,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Recompute the DCF fair value over the Cartesian product of a WACC range
/// and a revenue growth range.
pub fn dcf_sensitivity(
    input: &DcfSensitivityInput,
) -> AnalyticsResult<ComputationOutput<DcfSensitivityOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let base = calculate_dcf(&input.assumptions)?;
    let base_case_fair_value = base.result.fair_value;

    let wacc_values = generate_sweep_values("wacc_range", &input.wacc_range)?;
    let growth_values = generate_sweep_values("growth_range", &input.growth_range)?;

    // The grid overrides the discount rate cell by cell, so a CAPM build on
    // the base assumptions must not shadow it.
    let mut template = input.assumptions.clone();
    template.capm = None;

    let mut fair_values = Vec::with_capacity(wacc_values.len());
    for &wacc in &wacc_values {
        let mut row = Vec::with_capacity(growth_values.len());
        for &growth in &growth_values {
            let mut cell = template.clone();
            cell.wacc = wacc;
            cell.revenue_growth = growth;

            match evaluate_cell(&cell) {
                Ok(fv) => row.push(Some(fv)),
                Err(e) => {
                    warnings.push(format!(
                        "Cell (wacc={wacc}, growth={growth}) not valued: {e}"
                    ));
                    row.push(None);
                }
            }
        }
        fair_values.push(row);
    }

    let output = DcfSensitivityOutput {
        wacc_values,
        growth_values,
        fair_values,
        base_case_fair_value,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "2-Way DCF Sensitivity (WACC x Revenue Growth)",
        &serde_json::json!({
            "wacc_range": input.wacc_range,
            "growth_range": input.growth_range,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn evaluate_cell(assumptions: &DcfAssumptions) -> AnalyticsResult<Money> {
    validate_assumptions(assumptions, assumptions.wacc)?;
    let mut cell_warnings = Vec::new();
    let out = run_valuation(assumptions, assumptions.wacc, &mut cell_warnings)?;
    Ok(out.fair_value)
}

/// Generate the sweep values from min to max with step; max is appended
/// when the step does not land exactly on it.
fn generate_sweep_values(field: &str, range: &SweepRange) -> AnalyticsResult<Vec<Rate>> {
    if range.step <= Decimal::ZERO {
        return Err(AnalyticsError::InvalidInput {
            field: field.into(),
            reason: "Step must be positive".into(),
        });
    }
    if range.min > range.max {
        return Err(AnalyticsError::InvalidInput {
            field: field.into(),
            reason: "Min must be <= max".into(),
        });
    }

    let mut values = Vec::new();
    let mut current = range.min;
    while current <= range.max {
        values.push(current);
        current += range.step;
    }
    if let Some(&last) = values.last() {
        if last < range.max {
            values.push(range.max);
        }
    }
    if values.is_empty() {
        values.push(range.min);
    }

    Ok(values)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Currency;
    use rust_decimal_macros::dec;

    fn sample_input() -> DcfSensitivityInput {
        DcfSensitivityInput {
            assumptions: DcfAssumptions {
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
            },
            wacc_range: SweepRange {
                min: dec!(0.08),
                max: dec!(0.12),
                step: dec!(0.01),
            },
            growth_range: SweepRange {
                min: dec!(0.01),
                max: dec!(0.05),
                step: dec!(0.01),
            },
        }
    }

    #[test]
    fn test_grid_dimensions_and_order() {
        let result = dcf_sensitivity(&sample_input()).unwrap();
        let out = &result.result;

        assert_eq!(out.wacc_values.len(), 5);
        assert_eq!(out.growth_values.len(), 5);
        assert_eq!(out.fair_values.len(), 5);
        assert_eq!(out.fair_values[0].len(), 5);
        // Ascending sweeps
        assert!(out.wacc_values.windows(2).all(|w| w[0] < w[1]));
        assert!(out.growth_values.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_fair_value_monotonic_across_grid() {
        let result = dcf_sensitivity(&sample_input()).unwrap();
        let out = &result.result;

        // Down a column: higher WACC, lower value
        for j in 0..out.growth_values.len() {
            for i in 0..out.fair_values.len() - 1 {
                let hi = out.fair_values[i][j].unwrap();
                let lo = out.fair_values[i + 1][j].unwrap();
                assert!(hi > lo, "fair value should fall as WACC rises");
            }
        }

        // Along a row: higher growth, higher value
        for row in &out.fair_values {
            for j in 0..row.len() - 1 {
                assert!(row[j].unwrap() < row[j + 1].unwrap());
            }
        }
    }

    #[test]
    fn test_divergent_cells_are_empty() {
        let mut input = sample_input();
        // Sweep WACC down through the terminal growth rate
        input.wacc_range = SweepRange {
            min: dec!(0.01),
            max: dec!(0.05),
            step: dec!(0.01),
        };

        let result = dcf_sensitivity(&input).unwrap();
        let out = &result.result;

        // WACC 0.01 and 0.02 are <= terminal growth of 0.025
        assert!(out.fair_values[0].iter().all(|c| c.is_none()));
        assert!(out.fair_values[1].iter().all(|c| c.is_none()));
        assert!(out.fair_values[4].iter().all(|c| c.is_some()));
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn test_reproducible_output() {
        let input = sample_input();
        let r1 = dcf_sensitivity(&input).unwrap();
        let r2 = dcf_sensitivity(&input).unwrap();
        assert_eq!(r1.result.fair_values, r2.result.fair_values);
    }

    #[test]
    fn test_invalid_step_rejected() {
        let mut input = sample_input();
        input.wacc_range.step = Decimal::ZERO;
        assert!(dcf_sensitivity(&input).is_err());
    }

    #[test]
    fn test_max_appended_for_uneven_step() {
        let range = SweepRange {
            min: Decimal::ZERO,
            max: dec!(1),
            step: dec!(0.3),
        };
        let vals = generate_sweep_values("test", &range).unwrap();
        assert_eq!(vals.len(), 5);
        assert_eq!(*vals.last().unwrap(), dec!(1));
    }
}
