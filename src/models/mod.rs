pub mod binomial;
pub mod black_scholes;
pub mod trinomial;

use crate::errors::{PricingError, PricingResult};

/// Floor applied to sigma and T before they reach any formula.
pub const PARAM_FLOOR: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Call,
    Put,
}

impl OptionKind {
    /// Payoff of immediate exercise at `spot`. Never negative.
    #[inline]
    pub fn intrinsic(self, spot: f64, strike: f64) -> f64 {
        match self {
            Self::Call => (spot - strike).max(0.0),
            Self::Put => (strike - spot).max(0.0),
        }
    }
}

impl std::str::FromStr for OptionKind {
    type Err = PricingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "call" => Ok(Self::Call),
            "put" => Ok(Self::Put),
            other => Err(PricingError::InvalidInput(format!(
                "optionType must be \"call\" or \"put\", got {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for OptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExerciseStyle {
    European,
    American,
}

/// Immutable single-asset vanilla option. Stack-allocated, Copy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionContract {
    pub spot: f64,
    pub strike: f64,
    pub maturity: f64,
    pub rate: f64,
    pub sigma: f64,
    pub dividend_yield: f64,
    pub kind: OptionKind,
    pub style: ExerciseStyle,
}

impl OptionContract {
    /// Validated constructor. Rejects non-finite values, non-positive spot,
    /// strike or maturity, and negative volatility.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        spot: f64,
        strike: f64,
        maturity: f64,
        rate: f64,
        sigma: f64,
        dividend_yield: f64,
        kind: OptionKind,
        style: ExerciseStyle,
    ) -> PricingResult<Self> {
        let fields = [
            ("spot", spot),
            ("strike", strike),
            ("maturity", maturity),
            ("rate", rate),
            ("sigma", sigma),
            ("dividend yield", dividend_yield),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(PricingError::InvalidInput(format!("{name} must be finite")));
            }
        }
        if spot <= 0.0 {
            return Err(PricingError::InvalidInput("spot must be > 0".into()));
        }
        if strike <= 0.0 {
            return Err(PricingError::InvalidInput("strike must be > 0".into()));
        }
        if maturity <= 0.0 {
            return Err(PricingError::InvalidInput("maturity must be > 0".into()));
        }
        if sigma < 0.0 {
            return Err(PricingError::InvalidInput("sigma must be >= 0".into()));
        }

        Ok(Self {
            spot,
            strike,
            maturity,
            rate,
            sigma,
            dividend_yield,
            kind,
            style,
        })
    }

    /// Same contract with a different volatility (regime repricing).
    #[inline]
    pub fn with_sigma(self, sigma: f64) -> Self {
        Self { sigma, ..self }
    }

    #[inline]
    pub fn with_style(self, style: ExerciseStyle) -> Self {
        Self { style, ..self }
    }

    /// Volatility after the degeneracy floor.
    #[inline]
    pub fn floored_sigma(&self) -> f64 {
        self.sigma.max(PARAM_FLOOR)
    }

    /// Maturity after the degeneracy floor.
    #[inline]
    pub fn floored_maturity(&self) -> f64 {
        self.maturity.max(PARAM_FLOOR)
    }
}

/// Early-exercise flags of an American lattice, one row per time level
/// (`0..=steps`). A node is flagged when exercising strictly beats holding
/// and pays something; the maturity row flags every in-the-money node.
pub type ExerciseMap = Vec<Vec<bool>>;

/// Most steps for which a full exercise map is materialised.
pub const MAX_MAP_STEPS: usize = 500;

/// All pricing models implement this trait.
/// price() must be a pure function of the contract.
pub trait PricingModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Present value of the contract. Never negative, never panics.
    fn price(&self, contract: &OptionContract) -> f64;
}

#[cfg(test)]
pub(crate) fn atm_contract(kind: OptionKind) -> OptionContract {
    OptionContract::new(100.0, 100.0, 1.0, 0.05, 0.2, 0.0, kind, ExerciseStyle::European)
        .unwrap_or_else(|e| panic!("valid test contract: {e}"))
}
