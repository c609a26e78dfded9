use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::AnalyticsError;
use crate::stats;
use crate::types::{with_metadata, ComputationOutput, Currency, Money, Multiple, Rate};
use crate::AnalyticsResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Valuation multiples quoted for a peer company.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerMultiples {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pe: Option<Multiple>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pb: Option<Multiple>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ps: Option<Multiple>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ev_ebitda: Option<Multiple>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peg: Option<Multiple>,
}

/// Profitability, growth, and leverage ratios used for peer ranking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerRatios {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_margin: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_on_equity: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue_growth: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debt_to_equity: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_ratio: Option<Decimal>,
}

/// A peer company in the comparable set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerCompany {
    pub symbol: String,
    pub multiples: PeerMultiples,
    #[serde(default)]
    pub ratios: PeerRatios,
}

/// The multiples the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MultipleKind {
    PriceEarnings,
    PriceBook,
    PriceSales,
    EvEbitda,
    Peg,
}

impl MultipleKind {
    pub const ALL: [MultipleKind; 5] = [
        MultipleKind::PriceEarnings,
        MultipleKind::PriceBook,
        MultipleKind::PriceSales,
        MultipleKind::EvEbitda,
        MultipleKind::Peg,
    ];
}

impl std::fmt::Display for MultipleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MultipleKind::PriceEarnings => write!(f, "P/E"),
            MultipleKind::PriceBook => write!(f, "P/B"),
            MultipleKind::PriceSales => write!(f, "P/S"),
            MultipleKind::EvEbitda => write!(f, "EV/EBITDA"),
            MultipleKind::Peg => write!(f, "PEG"),
        }
    }
}

/// Target company fundamentals the implied valuations are anchored on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetFundamentals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_income: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_value: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ebitda: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shares_outstanding: Option<Decimal>,
}

/// Weight assigned to one multiple in the aggregate valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipleWeight {
    pub kind: MultipleKind,
    pub weight: Decimal,
}

/// Input for a comparable company valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompsInput {
    pub target_symbol: String,
    pub target: TargetFundamentals,
    pub peers: Vec<PeerCompany>,
    /// Aggregation weights per multiple; equal weights when omitted.
    /// Must sum to 1 within 1e-6 when provided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<MultipleWeight>>,
    pub currency: Currency,
}

/// Descriptive statistics for one multiple across the peer set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparableMetricStat {
    pub kind: MultipleKind,
    pub count: usize,
    pub min: Multiple,
    pub max: Multiple,
    pub mean: Multiple,
    pub median: Multiple,
    pub percentile_25: Multiple,
    pub percentile_75: Multiple,
    pub std_dev: Multiple,
}

/// Implied valuation of the target from one multiple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpliedValuation {
    pub kind: MultipleKind,
    /// Peer median multiple applied to the target
    pub peer_median: Multiple,
    /// Target base metric the multiple is applied to
    pub target_metric: Money,
    pub implied_value: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_per_share: Option<Money>,
}

/// Output of the comparable valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompsOutput {
    pub statistics: Vec<ComparableMetricStat>,
    pub implied_valuations: Vec<ImpliedValuation>,
    /// Simple average of the implied values
    pub average_implied_value: Money,
    /// Median of the implied values
    pub median_implied_value: Money,
    /// Weighted average of the implied values
    pub weighted_implied_value: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weighted_implied_per_share: Option<Money>,
    pub peer_count: usize,
}

// ---------------------------------------------------------------------------
// Public API: comparable valuation
// ---------------------------------------------------------------------------

/// Run a comparable company valuation against the peer set.
pub fn calculate_comps(input: &CompsInput) -> AnalyticsResult<ComputationOutput<CompsOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.peers.is_empty() {
        return Err(AnalyticsError::EmptyInput(
            "Peer set is empty; at least one comparable company required".into(),
        ));
    }
    if input.peers.len() < 3 {
        warnings.push(format!(
            "Only {} peers in the set; consider adding more for statistical significance",
            input.peers.len()
        ));
    }

    let mut statistics = Vec::new();
    let mut implied_valuations = Vec::new();

    for kind in MultipleKind::ALL {
        let values: Vec<Multiple> = input
            .peers
            .iter()
            .filter_map(|p| multiple_of(p, kind))
            .filter(|v| *v > Decimal::ZERO)
            .collect();

        if values.is_empty() {
            warnings.push(format!("No peer data for {kind}; multiple skipped"));
            continue;
        }

        let stat = build_statistics(kind, &values)?;

        if let Some(implied) = implied_for(kind, &stat, input, &mut warnings) {
            implied_valuations.push(implied);
        }

        statistics.push(stat);
    }

    if implied_valuations.is_empty() {
        return Err(AnalyticsError::EmptyInput(
            "No implied valuations could be computed; target fundamentals or peer multiples missing"
                .into(),
        ));
    }

    let implied_values: Vec<Money> = implied_valuations.iter().map(|v| v.implied_value).collect();
    let average_implied_value = stats::mean(&implied_values)?;
    let median_implied_value = stats::median(&implied_values)?;
    let weighted_implied_value =
        weighted_aggregate(&implied_valuations, input.weights.as_deref(), &mut warnings)?;

    let weighted_implied_per_share = match input.target.shares_outstanding {
        Some(shares) if shares > Decimal::ZERO => Some(weighted_implied_value / shares),
        _ => None,
    };

    let output = CompsOutput {
        statistics,
        implied_valuations,
        average_implied_value,
        median_implied_value,
        weighted_implied_value,
        weighted_implied_per_share,
        peer_count: input.peers.len(),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Comparable Company Valuation",
        input,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers: valuation
// ---------------------------------------------------------------------------

fn multiple_of(peer: &PeerCompany, kind: MultipleKind) -> Option<Multiple> {
    match kind {
        MultipleKind::PriceEarnings => peer.multiples.pe,
        MultipleKind::PriceBook => peer.multiples.pb,
        MultipleKind::PriceSales => peer.multiples.ps,
        MultipleKind::EvEbitda => peer.multiples.ev_ebitda,
        MultipleKind::Peg => peer.multiples.peg,
    }
}

fn build_statistics(kind: MultipleKind, values: &[Multiple]) -> AnalyticsResult<ComparableMetricStat> {
    Ok(ComparableMetricStat {
        kind,
        count: values.len(),
        min: stats::percentile(values, Decimal::ZERO)?,
        max: stats::percentile(values, Decimal::ONE)?,
        mean: stats::mean(values)?,
        median: stats::median(values)?,
        percentile_25: stats::percentile(values, dec!(0.25))?,
        percentile_75: stats::percentile(values, dec!(0.75))?,
        std_dev: stats::std_dev(values)?,
    })
}

/// Implied value = target base metric x peer median multiple. PEG carries
/// no base metric and contributes statistics only.
fn implied_for(
    kind: MultipleKind,
    stat: &ComparableMetricStat,
    input: &CompsInput,
    warnings: &mut Vec<String>,
) -> Option<ImpliedValuation> {
    let target_metric = match kind {
        MultipleKind::PriceEarnings => input.target.net_income,
        MultipleKind::PriceBook => input.target.book_value,
        MultipleKind::PriceSales => input.target.revenue,
        MultipleKind::EvEbitda => input.target.ebitda,
        MultipleKind::Peg => return None,
    };

    match target_metric {
        Some(metric) if metric > Decimal::ZERO => {
            let implied_value = metric * stat.median;
            let implied_per_share = match input.target.shares_outstanding {
                Some(shares) if shares > Decimal::ZERO => Some(implied_value / shares),
                _ => None,
            };
            Some(ImpliedValuation {
                kind,
                peer_median: stat.median,
                target_metric: metric,
                implied_value,
                implied_per_share,
            })
        }
        _ => {
            warnings.push(format!(
                "{}: target metric missing or non-positive for {kind}; implied valuation skipped",
                input.target_symbol
            ));
            None
        }
    }
}

fn weighted_aggregate(
    implied: &[ImpliedValuation],
    weights: Option<&[MultipleWeight]>,
    warnings: &mut Vec<String>,
) -> AnalyticsResult<Money> {
    match weights {
        None => {
            // Equal weights across the multiples that produced a value
            let sum: Decimal = implied.iter().map(|v| v.implied_value).sum();
            Ok(sum / Decimal::from(implied.len() as i64))
        }
        Some(weights) => {
            let total: Decimal = weights.iter().map(|w| w.weight).sum();
            if (total - Decimal::ONE).abs() > dec!(0.000001) {
                return Err(AnalyticsError::InvalidInput {
                    field: "weights".into(),
                    reason: format!("Multiple weights must sum to 1.0 (got {total})"),
                });
            }
            for w in weights {
                if w.weight < Decimal::ZERO {
                    return Err(AnalyticsError::InvalidInput {
                        field: "weights".into(),
                        reason: format!("Weight for {} cannot be negative", w.kind),
                    });
                }
            }

            let mut acc = Decimal::ZERO;
            let mut used = Decimal::ZERO;
            for w in weights {
                match implied.iter().find(|v| v.kind == w.kind) {
                    Some(v) => {
                        acc += w.weight * v.implied_value;
                        used += w.weight;
                    }
                    None => warnings.push(format!(
                        "No implied valuation for weighted multiple {}; weight redistributed",
                        w.kind
                    )),
                }
            }

            if used.is_zero() {
                return Err(AnalyticsError::InvalidInput {
                    field: "weights".into(),
                    reason: "None of the weighted multiples produced an implied valuation".into(),
                });
            }

            // Renormalize over the multiples that were actually available
            Ok(acc / used)
        }
    }
}

// ---------------------------------------------------------------------------
// Peer ranking
// ---------------------------------------------------------------------------

/// Weights for the four ranking pillars. Must sum to 1 within 1e-6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingWeights {
    pub valuation: Decimal,
    pub profitability: Decimal,
    pub growth: Decimal,
    pub financial_health: Decimal,
}

impl Default for RankingWeights {
    fn default() -> Self {
        RankingWeights {
            valuation: dec!(0.25),
            profitability: dec!(0.25),
            growth: dec!(0.25),
            financial_health: dec!(0.25),
        }
    }
}

/// Input for peer ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRankingInput {
    pub peers: Vec<PeerCompany>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<RankingWeights>,
}

/// Composite score card for one peer, all sub-scores on a 0-100 scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerScore {
    pub symbol: String,
    pub valuation_score: Decimal,
    pub profitability_score: Decimal,
    pub growth_score: Decimal,
    pub financial_health_score: Decimal,
    pub composite_score: Decimal,
}

/// Output of peer ranking, sorted by composite score descending with
/// alphabetical tie-break on symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRankingOutput {
    pub rankings: Vec<PeerScore>,
}

/// Rank the peer set by a weighted composite of valuation, profitability,
/// growth, and financial health sub-scores.
///
/// Each metric is winsorized at the 5th/95th percentiles across the peer
/// set before min-max scaling to [0, 100], so a single outlier cannot
/// compress everyone else's scores.
pub fn rank_peers(input: &PeerRankingInput) -> AnalyticsResult<ComputationOutput<PeerRankingOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.peers.is_empty() {
        return Err(AnalyticsError::EmptyInput(
            "Peer set is empty; nothing to rank".into(),
        ));
    }

    let weights = input.weights.clone().unwrap_or_default();
    let weight_sum =
        weights.valuation + weights.profitability + weights.growth + weights.financial_health;
    if (weight_sum - Decimal::ONE).abs() > dec!(0.000001) {
        return Err(AnalyticsError::InvalidInput {
            field: "weights".into(),
            reason: format!("Ranking weights must sum to 1.0 (got {weight_sum})"),
        });
    }

    let n = input.peers.len();

    // Score each metric across the whole peer set, then average per pillar.
    let pe = score_metric(&extract(input, |p| p.multiples.pe), false)?;
    let pb = score_metric(&extract(input, |p| p.multiples.pb), false)?;
    let ps = score_metric(&extract(input, |p| p.multiples.ps), false)?;
    let ev_ebitda = score_metric(&extract(input, |p| p.multiples.ev_ebitda), false)?;
    let peg = score_metric(&extract(input, |p| p.multiples.peg), false)?;

    let net_margin = score_metric(&extract(input, |p| p.ratios.net_margin), true)?;
    let roe = score_metric(&extract(input, |p| p.ratios.return_on_equity), true)?;
    let revenue_growth = score_metric(&extract(input, |p| p.ratios.revenue_growth), true)?;
    let debt_to_equity = score_metric(&extract(input, |p| p.ratios.debt_to_equity), false)?;
    let current_ratio = score_metric(&extract(input, |p| p.ratios.current_ratio), true)?;

    let mut rankings = Vec::with_capacity(n);
    for (i, peer) in input.peers.iter().enumerate() {
        let valuation_score =
            pillar_score(&[pe[i], pb[i], ps[i], ev_ebitda[i], peg[i]], &peer.symbol, "valuation", &mut warnings);
        let profitability_score =
            pillar_score(&[net_margin[i], roe[i]], &peer.symbol, "profitability", &mut warnings);
        let growth_score =
            pillar_score(&[revenue_growth[i]], &peer.symbol, "growth", &mut warnings);
        let financial_health_score = pillar_score(
            &[debt_to_equity[i], current_ratio[i]],
            &peer.symbol,
            "financial health",
            &mut warnings,
        );

        let composite_score = weights.valuation * valuation_score
            + weights.profitability * profitability_score
            + weights.growth * growth_score
            + weights.financial_health * financial_health_score;

        rankings.push(PeerScore {
            symbol: peer.symbol.clone(),
            valuation_score,
            profitability_score,
            growth_score,
            financial_health_score,
            composite_score,
        });
    }

    // Composite descending; ties break ascending by symbol so the order is
    // deterministic.
    rankings.sort_by(|a, b| {
        b.composite_score
            .cmp(&a.composite_score)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });

    let output = PeerRankingOutput { rankings };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Composite Peer Ranking",
        &serde_json::json!({
            "peer_count": n,
            "weights": weights,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers: ranking
// ---------------------------------------------------------------------------

fn extract(input: &PeerRankingInput, f: impl Fn(&PeerCompany) -> Option<Decimal>) -> Vec<Option<Decimal>> {
    input.peers.iter().map(f).collect()
}

/// Winsorize at p5/p95, then min-max scale to [0, 100]. `higher_is_better`
/// controls the direction; missing observations stay missing.
fn score_metric(
    values: &[Option<Decimal>],
    higher_is_better: bool,
) -> AnalyticsResult<Vec<Option<Decimal>>> {
    let available: Vec<Decimal> = values.iter().flatten().copied().collect();
    if available.is_empty() {
        return Ok(vec![None; values.len()]);
    }

    let lo = stats::percentile(&available, dec!(0.05))?;
    let hi = stats::percentile(&available, dec!(0.95))?;

    let scored = values
        .iter()
        .map(|v| {
            v.map(|raw| {
                if hi == lo {
                    return dec!(50);
                }
                let clipped = raw.clamp(lo, hi);
                let scaled = (clipped - lo) / (hi - lo) * dec!(100);
                if higher_is_better {
                    scaled
                } else {
                    dec!(100) - scaled
                }
            })
        })
        .collect();

    Ok(scored)
}

/// Average the available metric scores in a pillar; a peer with no data in
/// the pillar scores a neutral 50.
fn pillar_score(
    scores: &[Option<Decimal>],
    symbol: &str,
    pillar: &str,
    warnings: &mut Vec<String>,
) -> Decimal {
    let available: Vec<Decimal> = scores.iter().flatten().copied().collect();
    if available.is_empty() {
        warnings.push(format!("{symbol}: no {pillar} data; neutral score assigned"));
        return dec!(50);
    }
    available.iter().copied().sum::<Decimal>() / Decimal::from(available.len() as i64)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
