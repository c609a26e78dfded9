//! Shared statistics primitives for every engine.
//!
//! Percentile policy (used everywhere, including Monte Carlo aggregation):
//! nearest rank. Sort ascending, take index = floor(n * p), clamped to
//! [0, n-1]. Median is the midpoint of the two central observations for
//! even n. Standard deviation, covariance, and correlation are sample
//! statistics (divisor n - 1). A single observation yields that value for
//! every location statistic and zero for every dispersion statistic.
//!
//! The module has two faces over the same policy: Decimal functions for the
//! valuation engines and `float` twins for the market-series engines.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;

use crate::error::AnalyticsError;
use crate::AnalyticsResult;

pub fn mean(values: &[Decimal]) -> AnalyticsResult<Decimal> {
    require_non_empty(values.len())?;
    let sum: Decimal = values.iter().sum();
    Ok(sum / Decimal::from(values.len() as i64))
}

pub fn median(values: &[Decimal]) -> AnalyticsResult<Decimal> {
    require_non_empty(values.len())?;
    let mut sorted = values.to_vec();
    sorted.sort();
    let n = sorted.len();
    if n % 2 == 0 {
        Ok((sorted[n / 2 - 1] + sorted[n / 2]) / dec!(2))
    } else {
        Ok(sorted[n / 2])
    }
}

/// Nearest-rank percentile; `p` is a fraction in [0, 1].
pub fn percentile(values: &[Decimal], p: Decimal) -> AnalyticsResult<Decimal> {
    require_non_empty(values.len())?;
    validate_fraction_dec(p)?;
    let mut sorted = values.to_vec();
    sorted.sort();
    let idx = (Decimal::from(sorted.len() as i64) * p)
        .floor()
        .to_usize()
        .unwrap_or(0)
        .min(sorted.len() - 1);
    Ok(sorted[idx])
}

/// Sample standard deviation (divisor n - 1); zero for a single observation.
pub fn std_dev(values: &[Decimal]) -> AnalyticsResult<Decimal> {
    require_non_empty(values.len())?;
    let n = values.len();
    if n == 1 {
        return Ok(Decimal::ZERO);
    }
    let m = mean(values)?;
    let sum_sq: Decimal = values.iter().map(|v| (v - m) * (v - m)).sum();
    let variance = sum_sq / Decimal::from((n - 1) as i64);
    Ok(sqrt_decimal(variance))
}

/// Sample covariance between two equal-length series.
pub fn covariance(xs: &[Decimal], ys: &[Decimal]) -> AnalyticsResult<Decimal> {
    require_aligned(xs.len(), ys.len(), "covariance")?;
    require_non_empty(xs.len())?;
    let n = xs.len();
    if n == 1 {
        return Ok(Decimal::ZERO);
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let sum: Decimal = xs
        .iter()
        .zip(ys.iter())
        .map(|(x, y)| (x - mx) * (y - my))
        .sum();
    Ok(sum / Decimal::from((n - 1) as i64))
}

/// Pearson correlation; zero when either series has no variance.
pub fn correlation(xs: &[Decimal], ys: &[Decimal]) -> AnalyticsResult<Decimal> {
    let cov = covariance(xs, ys)?;
    let sx = std_dev(xs)?;
    let sy = std_dev(ys)?;
    if sx.is_zero() || sy.is_zero() {
        return Ok(Decimal::ZERO);
    }
    Ok(cov / (sx * sy))
}

fn sqrt_decimal(value: Decimal) -> Decimal {
    if value <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    value.sqrt().unwrap_or(Decimal::ZERO)
}

fn require_non_empty(n: usize) -> AnalyticsResult<()> {
    if n == 0 {
        return Err(AnalyticsError::EmptyInput(
            "statistic requires at least one observation".into(),
        ));
    }
    Ok(())
}

fn require_aligned(left: usize, right: usize, context: &str) -> AnalyticsResult<()> {
    if left != right {
        return Err(AnalyticsError::MismatchedSeriesLength {
            context: context.into(),
            left,
            right,
        });
    }
    Ok(())
}

fn validate_fraction_dec(p: Decimal) -> AnalyticsResult<()> {
    if p < Decimal::ZERO || p > Decimal::ONE {
        return Err(AnalyticsError::InvalidInput {
            field: "percentile".into(),
            reason: format!("Fraction must be in [0, 1], got {p}"),
        });
    }
    Ok(())
}

/// f64 twins of the Decimal primitives, sharing the same percentile and
/// sample-divisor policy. Used by the risk, simulation, and optimization
/// engines.
pub mod float {
    use super::{require_aligned, require_non_empty};
    use crate::error::AnalyticsError;
    use crate::AnalyticsResult;

    pub fn mean(values: &[f64]) -> AnalyticsResult<f64> {
        require_non_empty(values.len())?;
        Ok(values.iter().sum::<f64>() / values.len() as f64)
    }

    pub fn median(values: &[f64]) -> AnalyticsResult<f64> {
        require_non_empty(values.len())?;
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Ok(median_of_sorted(&sorted))
    }

    pub fn percentile(values: &[f64], p: f64) -> AnalyticsResult<f64> {
        require_non_empty(values.len())?;
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        percentile_of_sorted(&sorted, p)
    }

    /// Nearest-rank percentile over an already-sorted slice. The simulation
    /// engine sorts its pooled outcomes once and reads the whole ladder
    /// through this.
    pub fn percentile_of_sorted(sorted: &[f64], p: f64) -> AnalyticsResult<f64> {
        require_non_empty(sorted.len())?;
        if !(0.0..=1.0).contains(&p) {
            return Err(AnalyticsError::InvalidInput {
                field: "percentile".into(),
                reason: format!("Fraction must be in [0, 1], got {p}"),
            });
        }
        let idx = ((sorted.len() as f64 * p).floor() as usize).min(sorted.len() - 1);
        Ok(sorted[idx])
    }

    pub fn median_of_sorted(sorted: &[f64]) -> f64 {
        let n = sorted.len();
        if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        }
    }

    pub fn std_dev(values: &[f64]) -> AnalyticsResult<f64> {
        require_non_empty(values.len())?;
        let n = values.len();
        if n == 1 {
            return Ok(0.0);
        }
        let m = mean(values)?;
        let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
        Ok((sum_sq / (n - 1) as f64).sqrt())
    }

    pub fn covariance(xs: &[f64], ys: &[f64]) -> AnalyticsResult<f64> {
        require_aligned(xs.len(), ys.len(), "covariance")?;
        require_non_empty(xs.len())?;
        let n = xs.len();
        if n == 1 {
            return Ok(0.0);
        }
        let mx = mean(xs)?;
        let my = mean(ys)?;
        let sum: f64 = xs
            .iter()
            .zip(ys.iter())
            .map(|(x, y)| (x - mx) * (y - my))
            .sum();
        Ok(sum / (n - 1) as f64)
    }

    pub fn correlation(xs: &[f64], ys: &[f64]) -> AnalyticsResult<f64> {
        let cov = covariance(xs, ys)?;
        let sx = std_dev(xs)?;
        let sy = std_dev(ys)?;
        if sx == 0.0 || sy == 0.0 {
            return Ok(0.0);
        }
        Ok(cov / (sx * sy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pe_set() -> Vec<Decimal> {
        vec![dec!(20), dec!(25), dec!(30), dec!(35), dec!(40)]
    }

    #[test]
    fn test_mean_and_median() {
        assert_eq!(mean(&pe_set()).unwrap(), dec!(30));
        assert_eq!(median(&pe_set()).unwrap(), dec!(30));
    }

    #[test]
    fn test_median_even_count() {
        let vals = vec![dec!(1), dec!(2), dec!(3), dec!(4)];
        assert_eq!(median(&vals).unwrap(), dec!(2.5));
    }

    #[test]
    fn test_sample_std_dev() {
        // [20,25,30,35,40]: sum of squared deviations = 250, /4 = 62.5
        let sd = std_dev(&pe_set()).unwrap();
        assert!((sd - dec!(7.9057)).abs() < dec!(0.001), "std_dev={sd}");
    }

    #[test]
    fn test_nearest_rank_percentile() {
        // n=5: p25 -> floor(1.25)=1 -> 25; p75 -> floor(3.75)=3 -> 35
        assert_eq!(percentile(&pe_set(), dec!(0.25)).unwrap(), dec!(25));
        assert_eq!(percentile(&pe_set(), dec!(0.75)).unwrap(), dec!(35));
        // p=1.0 clamps to the max
        assert_eq!(percentile(&pe_set(), dec!(1)).unwrap(), dec!(40));
        assert_eq!(percentile(&pe_set(), Decimal::ZERO).unwrap(), dec!(20));
    }

    #[test]
    fn test_percentile_ordering_property() {
        let vals = pe_set();
        let p25 = percentile(&vals, dec!(0.25)).unwrap();
        let p75 = percentile(&vals, dec!(0.75)).unwrap();
        let med = median(&vals).unwrap();
        let min = percentile(&vals, Decimal::ZERO).unwrap();
        let max = percentile(&vals, Decimal::ONE).unwrap();
        assert!(min <= p25 && p25 <= med && med <= p75 && p75 <= max);
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(matches!(
            mean(&[]),
            Err(AnalyticsError::EmptyInput(_))
        ));
        assert!(matches!(
            percentile(&[], dec!(0.5)),
            Err(AnalyticsError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_single_observation() {
        let one = vec![dec!(42)];
        assert_eq!(mean(&one).unwrap(), dec!(42));
        assert_eq!(median(&one).unwrap(), dec!(42));
        assert_eq!(percentile(&one, dec!(0.95)).unwrap(), dec!(42));
        assert_eq!(std_dev(&one).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_percentile_out_of_range() {
        assert!(percentile(&pe_set(), dec!(1.5)).is_err());
        assert!(percentile(&pe_set(), dec!(-0.1)).is_err());
    }

    #[test]
    fn test_covariance_mismatched_lengths() {
        let xs = vec![dec!(1), dec!(2)];
        let ys = vec![dec!(1)];
        assert!(matches!(
            covariance(&xs, &ys),
            Err(AnalyticsError::MismatchedSeriesLength { .. })
        ));
    }

    #[test]
    fn test_correlation_perfect() {
        let xs = vec![dec!(1), dec!(2), dec!(3), dec!(4)];
        let ys = vec![dec!(2), dec!(4), dec!(6), dec!(8)];
        let c = correlation(&xs, &ys).unwrap();
        assert!((c - Decimal::ONE).abs() < dec!(0.0001), "correlation={c}");
    }

    #[test]
    fn test_correlation_zero_variance() {
        let xs = vec![dec!(3), dec!(3), dec!(3)];
        let ys = vec![dec!(1), dec!(2), dec!(3)];
        assert_eq!(correlation(&xs, &ys).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_float_face_agrees_on_policy() {
        let vals = [20.0, 25.0, 30.0, 35.0, 40.0];
        assert_eq!(float::mean(&vals).unwrap(), 30.0);
        assert_eq!(float::percentile(&vals, 0.25).unwrap(), 25.0);
        assert_eq!(float::percentile(&vals, 0.75).unwrap(), 35.0);
        assert_eq!(float::percentile(&vals, 1.0).unwrap(), 40.0);
        let sd = float::std_dev(&vals).unwrap();
        assert!((sd - 7.905694).abs() < 1e-5, "std_dev={sd}");
    }

    #[test]
    fn test_float_covariance_and_beta_shape() {
        let asset = [0.01, 0.02, -0.01, 0.03];
        let bench = [0.02, 0.04, -0.02, 0.06];
        let cov = float::covariance(&asset, &bench).unwrap();
        let var = float::covariance(&bench, &bench).unwrap();
        // asset moves exactly half the benchmark
        assert!((cov / var - 0.5).abs() < 1e-12);
    }
}
