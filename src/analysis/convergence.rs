use crate::analysis::steps::{self, StepSequence};
use crate::errors::{PricingError, PricingResult};
use crate::models::binomial;
use crate::models::black_scholes::BlackScholes;
use crate::models::{ExerciseStyle, OptionContract, PricingModel};
use rayon::prelude::*;

/// Resolution of the high-accuracy lattice reference price.
pub const REFERENCE_STEPS: usize = 500;

/// Lattice-vs-closed-form convergence study for one European contract.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvergenceReport {
    pub steps: StepSequence,
    pub black_scholes: f64,
    pub binomial_ref: f64,
    /// Aligned with `steps`.
    pub binomial_prices: Vec<f64>,
}

/// Price `contract` (as European) at every resolution of the step sequence
/// for `[min_steps, max_steps]`, plus the analytic and 500-step references.
pub fn analyze(
    contract: &OptionContract,
    min_steps: usize,
    max_steps: usize,
) -> PricingResult<ConvergenceReport> {
    if min_steps == 0 || max_steps == 0 {
        return Err(PricingError::InvalidInput(format!(
            "step range must be positive, got [{min_steps}, {max_steps}]"
        )));
    }
    if min_steps > max_steps {
        return Err(PricingError::InvalidInput(format!(
            "minSteps ({min_steps}) must not exceed maxSteps ({max_steps})"
        )));
    }

    let contract = contract.with_style(ExerciseStyle::European);
    let steps = steps::generate(min_steps, max_steps);

    let black_scholes = BlackScholes::new().price(&contract);
    let binomial_ref = binomial::price(&contract, REFERENCE_STEPS, false);

    // Collected in input order.
    let binomial_prices: Vec<f64> = steps
        .as_slice()
        .par_iter()
        .map(|&n| binomial::price(&contract, n, false))
        .collect();

    ensure_finite("Black-Scholes", black_scholes)?;
    ensure_finite("binomial reference", binomial_ref)?;
    for (n, p) in steps.iter().zip(&binomial_prices) {
        ensure_finite(&format!("binomial N={n}"), *p)?;
    }

    tracing::debug!(
        kind = %contract.kind,
        steps = ?steps.as_slice(),
        black_scholes,
        binomial_ref,
        "convergence analysis complete"
    );

    Ok(ConvergenceReport {
        steps,
        black_scholes,
        binomial_ref,
        binomial_prices,
    })
}

pub(crate) fn ensure_finite(label: &str, value: f64) -> PricingResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(PricingError::Model(format!("{label} price is not finite: {value}")))
    }
}
