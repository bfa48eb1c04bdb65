use crate::analysis::boundary::{self, BoundaryReport, Regime, RegimeSpec};
use crate::analysis::convergence::{self, ConvergenceReport};
use crate::errors::{PricingError, PricingResult};
use crate::models::binomial::{self, CrrBinomial, LatticeParams};
use crate::models::black_scholes::{BlackScholes, Greeks};
use crate::models::trinomial::{self, TreeValuation, TrinomialParams};
use crate::models::{ExerciseMap, ExerciseStyle, OptionContract, OptionKind, PricingModel, MAX_MAP_STEPS};
use crate::server::params::Params;
use crate::state::{AppState, CounterSnapshot};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use portable_atomic::Ordering::Relaxed;
use serde_json::Value;
use std::sync::Arc;

/// Uniform failure response: HTTP 500 with `{"error": message}`, whatever the cause.
#[derive(Debug)]
pub struct ApiError(PricingError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct LatticePriceResponse {
    pub price: f64,
    #[serde(flatten)]
    pub lattice: LatticeParams,
    #[serde(rename = "exerciseMap", skip_serializing_if = "Option::is_none")]
    pub exercise_map: Option<ExerciseMap>,
}

#[derive(Debug, serde::Serialize)]
pub struct TrinomialResponse {
    #[serde(flatten)]
    pub valuation: TreeValuation,
    #[serde(flatten)]
    pub tree: TrinomialParams,
    #[serde(rename = "exerciseMap", skip_serializing_if = "Option::is_none")]
    pub exercise_map: Option<ExerciseMap>,
}

/// POST /api/analyze-convergence -- lattice vs closed-form convergence study
pub async fn analyze_convergence(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ConvergenceReport>, ApiError> {
    let max = state.config.max_lattice_steps;
    let result = run(body, move |p| {
        let contract = contract_from(&p, "S0", "call", false)?;
        let min_steps = p.steps("minSteps", 10, max)?;
        let max_steps = p.steps("maxSteps", 100, max)?;
        let report = convergence::analyze(&contract, min_steps, max_steps)?;
        // One lattice per step entry plus the reference.
        let lattices = report.binomial_prices.len() as u64 + 1;
        Ok((report, lattices))
    })
    .await;
    finish(&state, "analyze_convergence", result)
}

/// POST /api/calculate-boundary -- American exercise boundary + prices
pub async fn calculate_boundary(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<BoundaryReport>, ApiError> {
    let max = state.config.max_lattice_steps;
    let result = run(body, move |p| {
        let contract = contract_from(&p, "S0", "put", true)?;
        let steps = p.steps("N", 50, max)?;
        let regimes = if p.flag("enableRegimes", false)? {
            Some(RegimeSpec {
                sigma_low: p.real("sigmaLow", 0.1)?,
                sigma_high: p.real("sigmaHigh", 0.3)?,
                p_same: p.real("pSame", 0.8)?,
                initial: Regime::from_indicator(p.integer("initialRegime", 0)?)?,
            })
        } else {
            None
        };
        let report = boundary::estimate(&contract, steps, regimes.as_ref())?;
        let lattices = if regimes.is_some() { 3 } else { 1 };
        Ok((report, lattices))
    })
    .await;
    finish(&state, "calculate_boundary", result)
}

/// POST /api/black-scholes -- closed-form price and Greeks
pub async fn black_scholes(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Greeks>, ApiError> {
    let result = run(body, |p| {
        let contract = contract_from(&p, "S", "call", false)?;
        let model = BlackScholes::new();
        let greeks = model.greeks(&contract);
        convergence::ensure_finite(model.name(), greeks.price)?;
        Ok((greeks, 0))
    })
    .await;
    finish(&state, "black_scholes", result)
}

/// POST /api/binomial -- single CRR lattice price with its derived parameters
pub async fn binomial_price(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<LatticePriceResponse>, ApiError> {
    let max = state.config.max_lattice_steps;
    let result = run(body, move |p| {
        let contract = contract_from(&p, "S0", "call", p.flag("american", false)?)?;
        let steps = p.steps("N", 100, max)?;
        let american = contract.style == ExerciseStyle::American;
        let (price, exercise_map) = if wants_map(&p, american, steps)? {
            let (price, map) = binomial::exercise_map(&contract, steps);
            (price, Some(map))
        } else {
            (CrrBinomial::new(steps, american).price(&contract), None)
        };
        convergence::ensure_finite("CRR-Binomial", price)?;
        Ok((
            LatticePriceResponse {
                price,
                lattice: LatticeParams::new(&contract, steps),
                exercise_map,
            },
            1,
        ))
    })
    .await;
    finish(&state, "binomial", result)
}

/// POST /api/trinomial -- trinomial lattice price, tree delta/gamma
pub async fn trinomial_price(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<TrinomialResponse>, ApiError> {
    let max = state.config.max_lattice_steps;
    let result = run(body, move |p| {
        let contract = contract_from(&p, "S0", "call", p.flag("american", false)?)?;
        let steps = p.steps("N", 100, max)?;
        let american = contract.style == ExerciseStyle::American;
        let (valuation, exercise_map) = if wants_map(&p, american, steps)? {
            let (valuation, map) = trinomial::exercise_map(&contract, steps);
            (valuation, Some(map))
        } else {
            (trinomial::value(&contract, steps, american), None)
        };
        convergence::ensure_finite("CRR-Trinomial", valuation.price)?;
        Ok((
            TrinomialResponse {
                valuation,
                tree: TrinomialParams::new(&contract, steps),
                exercise_map,
            },
            1,
        ))
    })
    .await;
    finish(&state, "trinomial", result)
}

/// GET /api/counters -- request counters (lock-free reads)
pub async fn get_counters(State(state): State<Arc<AppState>>) -> Json<CounterSnapshot> {
    Json(state.counters.snapshot())
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the contract shared by every endpoint. `spot_key` differs between
/// the closed-form endpoint ("S") and the lattice endpoints ("S0").
fn contract_from(
    p: &Params<'_>,
    spot_key: &str,
    default_kind: &str,
    american: bool,
) -> PricingResult<OptionContract> {
    let kind: OptionKind = p.text("optionType", default_kind)?.parse()?;
    let style = if american {
        ExerciseStyle::American
    } else {
        ExerciseStyle::European
    };
    OptionContract::new(
        p.real(spot_key, 100.0)?,
        p.real("K", 100.0)?,
        p.real("T", 1.0)?,
        p.real("r", 0.05)?,
        p.real("sigma", 0.2)?,
        p.real("q", 0.0)?,
        kind,
        style,
    )
}

/// Whether the request asked for per-node exercise flags. Only American
/// lattices carry them, and the map grows with the square of `steps`.
fn wants_map(p: &Params<'_>, american: bool, steps: usize) -> PricingResult<bool> {
    if !p.flag("exerciseMap", false)? {
        return Ok(false);
    }
    if !american {
        return Err(PricingError::InvalidInput("exerciseMap requires american: true".into()));
    }
    if steps > MAX_MAP_STEPS {
        return Err(PricingError::InvalidInput(format!(
            "exerciseMap is limited to N <= {MAX_MAP_STEPS}, got {steps}"
        )));
    }
    Ok(true)
}

/// Parse the body and run the CPU-bound computation off the async workers.
/// `compute` returns the response body and the number of lattices it rolled back.
async fn run<T, F>(body: Result<Json<Value>, JsonRejection>, compute: F) -> PricingResult<(T, u64)>
where
    T: Send + 'static,
    F: FnOnce(Params<'_>) -> PricingResult<(T, u64)> + Send + 'static,
{
    let Json(body) = body.map_err(|e| PricingError::InvalidInput(e.body_text()))?;
    tokio::task::spawn_blocking(move || compute(Params::new(&body)?))
        .await
        .map_err(|e| PricingError::Model(format!("computation task failed: {e}")))?
}

/// Count the outcome and log failures before they become an opaque response.
fn finish<T>(state: &AppState, endpoint: &'static str, result: PricingResult<(T, u64)>) -> Result<Json<T>, ApiError> {
    match result {
        Ok((body, lattices)) => {
            state.counters.requests_served.fetch_add(1, Relaxed);
            state.counters.record_lattices(lattices);
            Ok(Json(body))
        }
        Err(e) => {
            if e.is_client_error() {
                state.counters.requests_rejected.fetch_add(1, Relaxed);
                tracing::warn!(endpoint, error = %e, "request rejected");
            } else {
                state.counters.requests_failed.fetch_add(1, Relaxed);
                tracing::error!(endpoint, error = ?e, "request failed");
            }
            Err(ApiError(e))
        }
    }
}
