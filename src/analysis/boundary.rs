//! Early-exercise boundary estimate for American options.
//!
//! Prices come from the American CRR lattice. The boundary curves do not: each
//! curve is a closed-form asymptotic heuristic,
//!
//!   put:  b(t) = A + (K - A) * sqrt(t/T),  A = K*r / (r + sigma^2/2)
//!   call: b(t) = A - (A - K) * sqrt(t/T),  A = K*r / (r - q - sigma^2/2)
//!
//! pinned to K at maturity. A dividend-free call never exercises early and its
//! boundary is infinite everywhere.

use crate::analysis::convergence::ensure_finite;
use crate::errors::{PricingError, PricingResult};
use crate::models::binomial;
use crate::models::{ExerciseStyle, OptionContract, OptionKind};
use serde::Serializer;

/// Gap kept between an interior boundary point and the strike.
const STRIKE_GAP: f64 = 1e-6;

/// Volatility regime a pricing request starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    Calm,
    Volatile,
}

impl Regime {
    pub fn from_indicator(indicator: i64) -> PricingResult<Self> {
        match indicator {
            0 => Ok(Self::Calm),
            1 => Ok(Self::Volatile),
            other => Err(PricingError::InvalidInput(format!(
                "initialRegime must be 0 or 1, got {other}"
            ))),
        }
    }
}

/// Two-volatility regime assumption.
///
/// `p_same` is accepted and validated but does not feed any price or curve:
/// there is no regime-switching lattice behind it.
#[derive(Debug, Clone, Copy)]
pub struct RegimeSpec {
    pub sigma_low: f64,
    pub sigma_high: f64,
    pub p_same: f64,
    pub initial: Regime,
}

impl RegimeSpec {
    fn validate(&self) -> PricingResult<()> {
        for (name, sigma) in [("sigmaLow", self.sigma_low), ("sigmaHigh", self.sigma_high)] {
            if !sigma.is_finite() || sigma < 0.0 {
                return Err(PricingError::InvalidInput(format!("{name} must be finite and >= 0")));
            }
        }
        if !(0.0..=1.0).contains(&self.p_same) {
            return Err(PricingError::InvalidInput(format!(
                "pSame must be in [0, 1], got {}",
                self.p_same
            )));
        }
        Ok(())
    }
}

/// Per-curve constants of the asymptotic heuristic, as multiples of the strike.
#[derive(Debug, Clone, Copy)]
struct CurveShape {
    /// Put asymptote when r <= 0.
    put_fallback: f64,
    /// Put asymptote ceiling.
    put_cap: f64,
    /// Call asymptote when r <= q + sigma^2/2.
    call_fallback: f64,
}

const STANDARD_SHAPE: CurveShape = CurveShape { put_fallback: 0.5, put_cap: 0.9, call_fallback: 2.0 };
const CALM_SHAPE: CurveShape = CurveShape { put_fallback: 0.6, put_cap: 0.95, call_fallback: 2.0 };
const VOLATILE_SHAPE: CurveShape = CurveShape { put_fallback: 0.4, put_cap: 0.85, call_fallback: 3.0 };

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryReport {
    pub times: Vec<f64>,
    #[serde(serialize_with = "serialize_levels")]
    pub standard_boundary: Vec<f64>,
    #[serde(serialize_with = "serialize_levels")]
    pub calm_boundary: Vec<f64>,
    #[serde(serialize_with = "serialize_levels")]
    pub volatile_boundary: Vec<f64>,
    pub price_standard: f64,
    pub price_regime: f64,
}

/// Estimate the exercise boundary and American price of `contract` on an
/// N-step lattice, optionally under two volatility regimes.
pub fn estimate(
    contract: &OptionContract,
    steps: usize,
    regimes: Option<&RegimeSpec>,
) -> PricingResult<BoundaryReport> {
    if steps == 0 {
        return Err(PricingError::InvalidInput("N must be >= 1".into()));
    }
    if let Some(spec) = regimes {
        spec.validate()?;
    }

    let contract = contract.with_style(ExerciseStyle::American);
    let times = time_grid(contract.maturity, steps);

    let standard_boundary = curve(&contract, contract.floored_sigma(), &times, STANDARD_SHAPE);
    let price_standard = binomial::price(&contract, steps, true);
    ensure_finite("standard American", price_standard)?;

    let Some(spec) = regimes else {
        return Ok(BoundaryReport {
            times,
            calm_boundary: standard_boundary.clone(),
            volatile_boundary: standard_boundary.clone(),
            standard_boundary,
            price_standard,
            price_regime: price_standard,
        });
    };

    let calm = contract.with_sigma(spec.sigma_low);
    let volatile = contract.with_sigma(spec.sigma_high);

    let calm_boundary = curve(&calm, calm.floored_sigma(), &times, CALM_SHAPE);
    let mut volatile_boundary = curve(&volatile, volatile.floored_sigma(), &times, VOLATILE_SHAPE);
    reconcile(contract.kind, &calm_boundary, &mut volatile_boundary);

    let (price_calm, price_volatile) = rayon::join(
        || binomial::price(&calm, steps, true),
        || binomial::price(&volatile, steps, true),
    );
    ensure_finite("calm regime", price_calm)?;
    ensure_finite("volatile regime", price_volatile)?;

    let price_regime = match spec.initial {
        Regime::Calm => price_calm,
        Regime::Volatile => price_volatile,
    };

    tracing::debug!(
        kind = %contract.kind,
        steps,
        price_standard,
        price_calm,
        price_volatile,
        initial = ?spec.initial,
        p_same = spec.p_same,
        "regime boundary estimate complete"
    );

    Ok(BoundaryReport {
        times,
        standard_boundary,
        calm_boundary,
        volatile_boundary,
        price_standard,
        price_regime,
    })
}

/// N+1 evenly spaced points over [0, T]; the last point is exactly T.
fn time_grid(maturity: f64, steps: usize) -> Vec<f64> {
    (0..=steps)
        .map(|i| if i == steps { maturity } else { maturity * i as f64 / steps as f64 })
        .collect()
}

fn curve(contract: &OptionContract, sigma: f64, times: &[f64], shape: CurveShape) -> Vec<f64> {
    let k = contract.strike;
    let r = contract.rate;
    let q = contract.dividend_yield;
    let t_max = contract.maturity;
    let half_var = 0.5 * sigma * sigma;

    let mut levels: Vec<f64> = match contract.kind {
        OptionKind::Put => {
            let asymptote = if r > 0.0 { k * r / (r + half_var) } else { k * shape.put_fallback };
            let asymptote = asymptote.min(k * shape.put_cap);
            times
                .iter()
                .map(|&t| (asymptote + (k - asymptote) * (t / t_max).sqrt()).min(k - STRIKE_GAP))
                .collect()
        }
        OptionKind::Call if q <= 0.0 => return vec![f64::INFINITY; times.len()],
        OptionKind::Call => {
            let asymptote = if r > q + half_var {
                k * r / (r - q - half_var)
            } else {
                k * shape.call_fallback
            };
            times
                .iter()
                .map(|&t| (asymptote - (asymptote - k) * (t / t_max).sqrt()).max(k + STRIKE_GAP))
                .collect()
        }
    };

    if let Some(last) = levels.last_mut() {
        *last = k;
    }
    levels
}

/// Higher volatility lowers the put boundary and raises the call boundary.
fn reconcile(kind: OptionKind, calm: &[f64], volatile: &mut [f64]) {
    for (v, &c) in volatile.iter_mut().zip(calm) {
        *v = match kind {
            OptionKind::Put => v.min(c),
            OptionKind::Call => v.max(c),
        };
    }
}

#[derive(serde::Serialize)]
#[serde(untagged)]
enum Level {
    Finite(f64),
    Unbounded(&'static str),
}

/// JSON has no infinity; unbounded levels go out as the string "Infinity".
fn serialize_levels<S: Serializer>(levels: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(levels.iter().map(|&v| {
        if v.is_infinite() {
            Level::Unbounded("Infinity")
        } else {
            Level::Finite(v)
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::atm_contract;

    fn regimes(initial: Regime) -> RegimeSpec {
        RegimeSpec { sigma_low: 0.1, sigma_high: 0.3, p_same: 0.8, initial }
    }

    fn run(contract: &OptionContract, steps: usize, spec: Option<&RegimeSpec>) -> BoundaryReport {
        estimate(contract, steps, spec).unwrap_or_else(|e| panic!("estimate failed: {e}"))
    }

    #[test]
    fn test_put_scenario_end_to_end() {
        let c = atm_contract(OptionKind::Put);
        let report = run(&c, 50, None);

        assert_eq!(report.times.len(), 51);
        assert_eq!(report.times[0], 0.0);
        assert_eq!(report.times[50], 1.0);

        let b = &report.standard_boundary;
        assert_eq!(b.len(), 51);
        assert!(b[0] < 100.0, "boundary should start below K: {}", b[0]);
        assert!(b.windows(2).all(|w| w[0] <= w[1]), "put boundary must rise");
        assert_eq!(b[50], 100.0);
        assert!(b[..50].iter().all(|&x| x < 100.0));

        assert_eq!(report.price_standard, binomial::price(&c, 50, true));
        assert_eq!(report.price_regime, report.price_standard);
        assert_eq!(report.calm_boundary, report.standard_boundary);
        assert_eq!(report.volatile_boundary, report.standard_boundary);
    }

    #[test]
    fn test_put_asymptote() {
        let c = atm_contract(OptionKind::Put);
        let report = run(&c, 10, None);
        let expected = 100.0 * 0.05 / (0.05 + 0.02);
        assert!((report.standard_boundary[0] - expected).abs() < 1e-9);

        let negative_rate = OptionContract { rate: -0.01, ..c };
        let report = run(&negative_rate, 10, None);
        assert!((report.standard_boundary[0] - 50.0).abs() < 1e-9, "r<=0 falls back to K/2");
    }

    #[test]
    fn test_dividend_free_call_is_unbounded() {
        let c = atm_contract(OptionKind::Call);
        let report = run(&c, 20, Some(&regimes(Regime::Calm)));
        for curve in [&report.standard_boundary, &report.calm_boundary, &report.volatile_boundary] {
            assert!(curve.iter().all(|x| x.is_infinite()), "expected all-infinite curve");
        }
        let json = serde_json::to_value(&report).unwrap_or_default();
        assert_eq!(json["standardBoundary"][0], "Infinity");
        assert_eq!(json["standardBoundary"][20], "Infinity");
    }

    #[test]
    fn test_dividend_call_falls_to_strike() {
        let c = OptionContract { dividend_yield: 0.03, rate: 0.08, ..atm_contract(OptionKind::Call) };
        let report = run(&c, 40, None);
        let b = &report.standard_boundary;
        assert_eq!(b[40], 100.0);
        assert!(b[..40].iter().all(|&x| x > 100.0));
        assert!(b.windows(2).all(|w| w[0] >= w[1]), "call boundary must fall");
        let expected = 100.0 * 0.08 / (0.08 - 0.03 - 0.02);
        assert!((b[0] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_put_regime_ordering() {
        for r in [0.05, 0.0] {
            let c = OptionContract { rate: r, ..atm_contract(OptionKind::Put) };
            let report = run(&c, 30, Some(&regimes(Regime::Calm)));
            for (i, (v, calm)) in report.volatile_boundary.iter().zip(&report.calm_boundary).enumerate() {
                assert!(v <= calm, "r={r} point {i}: volatile {v} above calm {calm}");
            }
        }
    }

    #[test]
    fn test_call_regime_ordering_is_enforced() {
        // Calm asymptote is 20K, volatile falls back to 3K: the clamp lifts it.
        let c = OptionContract { rate: 0.1, dividend_yield: 0.09, ..atm_contract(OptionKind::Call) };
        let report = run(&c, 30, Some(&regimes(Regime::Calm)));
        for (i, (v, calm)) in report.volatile_boundary.iter().zip(&report.calm_boundary).enumerate() {
            assert!(v >= calm, "point {i}: volatile {v} below calm {calm}");
        }
        assert_eq!(report.volatile_boundary[0], report.calm_boundary[0]);
        assert_eq!(report.volatile_boundary[30], 100.0);
    }

    #[test]
    fn test_regime_price_follows_initial_regime() {
        let c = atm_contract(OptionKind::Put);
        let calm = run(&c, 40, Some(&regimes(Regime::Calm)));
        let volatile = run(&c, 40, Some(&regimes(Regime::Volatile)));

        assert_eq!(calm.price_regime, binomial::price(&c.with_sigma(0.1), 40, true));
        assert_eq!(volatile.price_regime, binomial::price(&c.with_sigma(0.3), 40, true));
        assert!(volatile.price_regime > calm.price_regime);
        assert_eq!(calm.price_standard, volatile.price_standard);
    }

    #[test]
    fn test_p_same_does_not_change_output() {
        let c = atm_contract(OptionKind::Put);
        let a = run(&c, 25, Some(&RegimeSpec { p_same: 0.1, ..regimes(Regime::Volatile) }));
        let b = run(&c, 25, Some(&RegimeSpec { p_same: 0.95, ..regimes(Regime::Volatile) }));
        assert_eq!(a.volatile_boundary, b.volatile_boundary);
        assert_eq!(a.price_regime, b.price_regime);
    }

    #[test]
    fn test_invalid_inputs() {
        let c = atm_contract(OptionKind::Put);
        assert!(estimate(&c, 0, None).is_err());
        let bad = RegimeSpec { p_same: 1.5, ..regimes(Regime::Calm) };
        assert!(matches!(estimate(&c, 10, Some(&bad)), Err(PricingError::InvalidInput(_))));
        assert!(Regime::from_indicator(2).is_err());
    }
}
