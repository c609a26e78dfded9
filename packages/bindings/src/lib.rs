use napi::Result as NapiResult;
use napi_derive::napi;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Valuation
// ---------------------------------------------------------------------------

#[napi]
pub fn calculate_dcf(input_json: String) -> NapiResult<String> {
    let input: equity_analytics_core::valuation::dcf::DcfAssumptions =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        equity_analytics_core::valuation::dcf::calculate_dcf(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn calculate_wacc(input_json: String) -> NapiResult<String> {
    let input: equity_analytics_core::valuation::wacc::CapmWaccInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        equity_analytics_core::valuation::wacc::calculate_wacc(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn dcf_sensitivity(input_json: String) -> NapiResult<String> {
    let input: equity_analytics_core::valuation::sensitivity::DcfSensitivityInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = equity_analytics_core::valuation::sensitivity::dcf_sensitivity(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn blend_scenarios(input_json: String) -> NapiResult<String> {
    let input: equity_analytics_core::valuation::scenarios::DcfScenarioInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = equity_analytics_core::valuation::scenarios::blend_scenarios(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn comps_analysis(input_json: String) -> NapiResult<String> {
    let input: equity_analytics_core::valuation::comps::CompsInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        equity_analytics_core::valuation::comps::calculate_comps(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn rank_peers(input_json: String) -> NapiResult<String> {
    let input: equity_analytics_core::valuation::comps::PeerRankingInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        equity_analytics_core::valuation::comps::rank_peers(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Risk
// ---------------------------------------------------------------------------

#[napi]
pub fn risk_metrics(input_json: String) -> NapiResult<String> {
    let input: equity_analytics_core::risk::metrics::RiskInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = equity_analytics_core::risk::metrics::calculate_risk_metrics(&input, None)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[derive(serde::Deserialize)]
struct DeriveReturnsInput {
    prices: Vec<equity_analytics_core::risk::returns::PricePoint>,
    frequency: equity_analytics_core::risk::returns::ReturnFrequency,
}

#[napi]
pub fn derive_returns(input_json: String) -> NapiResult<String> {
    let input: DeriveReturnsInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = equity_analytics_core::risk::returns::derive_returns(&input.prices, input.frequency)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

#[napi]
pub fn run_simulation(input_json: String) -> NapiResult<String> {
    let input: equity_analytics_core::simulation::gbm::SimulationParameters =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = equity_analytics_core::simulation::gbm::run_simulation(&input, None)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Portfolio
// ---------------------------------------------------------------------------

#[napi]
pub fn optimize_portfolio(input_json: String) -> NapiResult<String> {
    let input: equity_analytics_core::portfolio::optimizer::OptimizationInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = equity_analytics_core::portfolio::optimizer::optimize_portfolio(&input, None)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Facade
// ---------------------------------------------------------------------------

#[napi]
pub fn run_analysis(input_json: String) -> NapiResult<String> {
    let request: equity_analytics_core::analytics::AnalyticsRequest =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let report = equity_analytics_core::analytics::run_analysis(&request, None);
    serde_json::to_string(&report).map_err(to_napi_error)
}
