use crate::models::{OptionContract, OptionKind, PricingModel};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

/// Black-Scholes closed form for a European option with continuous dividend yield.
///
/// d1 = (ln(S/K) + (r - q + sigma^2/2)*T) / (sigma * sqrt(T))
/// d2 = d1 - sigma * sqrt(T)
///
/// Call = S*e^{-qT}*Phi(d1) - K*e^{-rT}*Phi(d2)
/// Put  = K*e^{-rT}*Phi(-d2) - S*e^{-qT}*Phi(-d1)
///
/// Exercise style on the contract is ignored.
pub struct BlackScholes {
    /// Standard normal distribution (created once, reused)
    normal: Normal,
}

/// Closed-form price with its sensitivities.
///
/// `theta` is per year, `vega` per unit of volatility, `rho` per 1% move in r.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Greeks {
    pub price: f64,
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
    pub d1: f64,
    pub d2: f64,
}

/// Shared pieces of the closed form after the sigma/T floors.
struct Terms {
    d1: f64,
    d2: f64,
    sqrt_t: f64,
    sigma: f64,
    t: f64,
    /// S * e^{-qT}
    fwd_spot: f64,
    /// K * e^{-rT}
    disc_strike: f64,
}

impl Terms {
    fn of(contract: &OptionContract) -> Self {
        let sigma = contract.floored_sigma();
        let t = contract.floored_maturity();
        let (s, k, r, q) = (
            contract.spot,
            contract.strike,
            contract.rate,
            contract.dividend_yield,
        );

        let sqrt_t = t.sqrt();
        let sigma_sqrt_t = sigma * sqrt_t;
        let d1 = ((s / k).ln() + (r - q + 0.5 * sigma * sigma) * t) / sigma_sqrt_t;

        Self {
            d1,
            d2: d1 - sigma_sqrt_t,
            sqrt_t,
            sigma,
            t,
            fwd_spot: s * (-q * t).exp(),
            disc_strike: k * (-r * t).exp(),
        }
    }
}

impl BlackScholes {
    pub fn new() -> Self {
        Self {
            normal: Normal::standard(),
        }
    }

    /// Price plus delta, gamma, theta, vega and rho.
    pub fn greeks(&self, contract: &OptionContract) -> Greeks {
        let tm = Terms::of(contract);
        let (r, q) = (contract.rate, contract.dividend_yield);
        let pdf_d1 = self.normal.pdf(tm.d1);

        let gamma = tm.fwd_spot * pdf_d1 / (contract.spot * contract.spot * tm.sigma * tm.sqrt_t);
        let vega = tm.fwd_spot * pdf_d1 * tm.sqrt_t;
        let decay = -tm.fwd_spot * pdf_d1 * tm.sigma / (2.0 * tm.sqrt_t);

        let (delta, theta, rho) = match contract.kind {
            OptionKind::Call => {
                let (nd1, nd2) = (self.normal.cdf(tm.d1), self.normal.cdf(tm.d2));
                (
                    tm.fwd_spot / contract.spot * nd1,
                    decay - r * tm.disc_strike * nd2 + q * tm.fwd_spot * nd1,
                    tm.t * tm.disc_strike * nd2 / 100.0,
                )
            }
            OptionKind::Put => {
                let (nd1, nd2) = (self.normal.cdf(-tm.d1), self.normal.cdf(-tm.d2));
                (
                    -tm.fwd_spot / contract.spot * nd1,
                    decay + r * tm.disc_strike * nd2 - q * tm.fwd_spot * nd1,
                    -tm.t * tm.disc_strike * nd2 / 100.0,
                )
            }
        };

        Greeks {
            price: self.price_from(contract.kind, &tm),
            delta,
            gamma,
            theta,
            vega,
            rho,
            d1: tm.d1,
            d2: tm.d2,
        }
    }

    fn price_from(&self, kind: OptionKind, tm: &Terms) -> f64 {
        let price = match kind {
            OptionKind::Call => tm.fwd_spot * self.normal.cdf(tm.d1) - tm.disc_strike * self.normal.cdf(tm.d2),
            OptionKind::Put => tm.disc_strike * self.normal.cdf(-tm.d2) - tm.fwd_spot * self.normal.cdf(-tm.d1),
        };
        // Rounding can leave a tiny negative for far out-of-the-money strikes.
        price.max(0.0)
    }
}

impl Default for BlackScholes {
    fn default() -> Self {
        Self::new()
    }
}

impl PricingModel for BlackScholes {
    #[inline]
    fn name(&self) -> &'static str {
        "Black-Scholes"
    }

    fn price(&self, contract: &OptionContract) -> f64 {
        self.price_from(contract.kind, &Terms::of(contract))
    }
}
