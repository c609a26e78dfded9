use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AnalyticsError;
use crate::AnalyticsResult;

/// Frequency of return observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnFrequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annual,
}

impl ReturnFrequency {
    /// Number of periods in a year for annualisation
    pub fn periods_per_year(&self) -> f64 {
        match self {
            ReturnFrequency::Daily => 252.0,
            ReturnFrequency::Weekly => 52.0,
            ReturnFrequency::Monthly => 12.0,
            ReturnFrequency::Quarterly => 4.0,
            ReturnFrequency::Annual => 1.0,
        }
    }
}

/// A dated closing price, as delivered by the market-data provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// An ordered series of periodic returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnSeries {
    /// Periodic returns as decimals (0.01 = 1%)
    pub returns: Vec<f64>,
    pub frequency: ReturnFrequency,
}

/// Derive a simple-return series from dated closing prices.
///
/// Prices are sorted by date first; at least two positive closes are
/// required.
pub fn derive_returns(
    prices: &[PricePoint],
    frequency: ReturnFrequency,
) -> AnalyticsResult<ReturnSeries> {
    if prices.is_empty() {
        return Err(AnalyticsError::EmptyInput(
            "Price history is empty".into(),
        ));
    }
    if prices.len() < 2 {
        return Err(AnalyticsError::InvalidInput {
            field: "prices".into(),
            reason: "At least two price observations required to derive returns".into(),
        });
    }

    let mut sorted = prices.to_vec();
    sorted.sort_by_key(|p| p.date);

    for p in &sorted {
        if !p.close.is_finite() || p.close <= 0.0 {
            return Err(AnalyticsError::InvalidInput {
                field: "prices".into(),
                reason: format!("Non-positive or non-finite close on {}", p.date),
            });
        }
    }

    let returns = sorted
        .windows(2)
        .map(|w| w[1].close / w[0].close - 1.0)
        .collect();

    Ok(ReturnSeries { returns, frequency })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_derive_simple_returns() {
        let prices = vec![
            PricePoint { date: date(1), close: 100.0 },
            PricePoint { date: date(2), close: 110.0 },
            PricePoint { date: date(3), close: 99.0 },
        ];
        let series = derive_returns(&prices, ReturnFrequency::Daily).unwrap();
        assert_eq!(series.returns.len(), 2);
        assert!((series.returns[0] - 0.10).abs() < 1e-12);
        assert!((series.returns[1] + 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_unsorted_prices_are_sorted_first() {
        let prices = vec![
            PricePoint { date: date(3), close: 121.0 },
            PricePoint { date: date(1), close: 100.0 },
            PricePoint { date: date(2), close: 110.0 },
        ];
        let series = derive_returns(&prices, ReturnFrequency::Daily).unwrap();
        assert!((series.returns[0] - 0.10).abs() < 1e-12);
        assert!((series.returns[1] - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_empty_history_rejected() {
        assert!(matches!(
            derive_returns(&[], ReturnFrequency::Daily),
            Err(AnalyticsError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_non_positive_close_rejected() {
        let prices = vec![
            PricePoint { date: date(1), close: 100.0 },
            PricePoint { date: date(2), close: 0.0 },
        ];
        assert!(derive_returns(&prices, ReturnFrequency::Daily).is_err());
    }

    #[test]
    fn test_periods_per_year() {
        assert_eq!(ReturnFrequency::Daily.periods_per_year(), 252.0);
        assert_eq!(ReturnFrequency::Monthly.periods_per_year(), 12.0);
        assert_eq!(ReturnFrequency::Annual.periods_per_year(), 1.0);
    }
}
