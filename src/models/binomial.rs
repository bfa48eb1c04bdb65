use crate::models::{ExerciseMap, OptionContract, PricingModel};

/// Risk-neutral up-probability is clamped into this band.
pub const PROB_MIN: f64 = 1e-4;
pub const PROB_MAX: f64 = 0.9999;

/// Per-step quantities of a Cox-Ross-Rubinstein lattice. Stack-allocated, Copy.
#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatticeParams {
    pub steps: usize,
    pub dt: f64,
    pub up_factor: f64,
    pub down_factor: f64,
    pub probability: f64,
    pub discount: f64,
}

impl LatticeParams {
    /// Derive the lattice for `contract` at resolution `steps` (>= 1).
    ///
    /// u = exp(sigma * sqrt(dt)), d = 1/u,
    /// p = (exp((r - q)*dt) - d) / (u - d) clamped to [PROB_MIN, PROB_MAX].
    #[inline]
    pub fn new(contract: &OptionContract, steps: usize) -> Self {
        let steps = steps.max(1);
        let dt = contract.floored_maturity() / steps as f64;
        let up_factor = (contract.floored_sigma() * dt.sqrt()).exp();
        let down_factor = 1.0 / up_factor;
        let growth = ((contract.rate - contract.dividend_yield) * dt).exp();
        let raw_p = (growth - down_factor) / (up_factor - down_factor);
        // NaN can only come from inf/inf; treat it as the upper edge.
        let probability = if raw_p.is_nan() {
            PROB_MAX
        } else {
            raw_p.clamp(PROB_MIN, PROB_MAX)
        };

        Self {
            steps,
            dt,
            up_factor,
            down_factor,
            probability,
            discount: (-contract.rate * dt).exp(),
        }
    }

    /// Underlying level at `level` after `downs` down-moves.
    #[inline]
    fn spot_at(&self, spot0: f64, level: usize, downs: usize) -> f64 {
        spot0 * self.up_factor.powi((level - downs) as i32) * self.down_factor.powi(downs as i32)
    }
}

/// Backward induction over a single working buffer of `steps + 1` nodes.
///
/// `on_node(level, index, continuation, value)` sees every interior node
/// after it is resolved.
fn rollback<F>(contract: &OptionContract, lattice: &LatticeParams, american: bool, mut on_node: F) -> f64
where
    F: FnMut(usize, usize, f64, f64),
{
    let n = lattice.steps;
    let (s0, k, kind) = (contract.spot, contract.strike, contract.kind);
    let p = lattice.probability;
    let one_minus_p = 1.0 - p;
    let df = lattice.discount;

    let mut values = vec![0.0_f64; n + 1];
    for (i, value) in values.iter_mut().enumerate() {
        *value = kind.intrinsic(lattice.spot_at(s0, n, i), k);
    }

    for j in (0..n).rev() {
        for i in 0..=j {
            let continuation = df * (p * values[i] + one_minus_p * values[i + 1]);
            values[i] = if american {
                let exercise = kind.intrinsic(lattice.spot_at(s0, j, i), k);
                continuation.max(exercise)
            } else {
                continuation
            };
            on_node(j, i, continuation, values[i]);
        }
    }

    values[0]
}

/// Price `contract` on an N-step CRR lattice. The exercise flag is explicit so
/// the same contract can be priced both ways.
pub fn price(contract: &OptionContract, steps: usize, american: bool) -> f64 {
    let lattice = LatticeParams::new(contract, steps);
    rollback(contract, &lattice, american, |_, _, _, _| {})
}

/// American price together with the exercise flag of every node. Row `j`
/// holds `j + 1` entries ordered by number of down-moves.
pub fn exercise_map(contract: &OptionContract, steps: usize) -> (f64, ExerciseMap) {
    let lattice = LatticeParams::new(contract, steps);
    let n = lattice.steps;
    let mut map: ExerciseMap = (0..=n).map(|j| vec![false; j + 1]).collect();
    for (i, flag) in map[n].iter_mut().enumerate() {
        *flag = contract.kind.intrinsic(lattice.spot_at(contract.spot, n, i), contract.strike) > 0.0;
    }
    let value = rollback(contract, &lattice, true, |j, i, continuation, v| {
        map[j][i] = v > continuation;
    });
    (value, map)
}

/// Cox-Ross-Rubinstein lattice pricer bound to a resolution and exercise flag.
#[derive(Debug, Clone, Copy)]
pub struct CrrBinomial {
    pub steps: usize,
    pub american: bool,
}

impl CrrBinomial {
    pub fn new(steps: usize, american: bool) -> Self {
        Self { steps, american }
    }
}

impl PricingModel for CrrBinomial {
    #[inline]
    fn name(&self) -> &'static str {
        "CRR-Binomial"
    }

    fn price(&self, contract: &OptionContract) -> f64 {
        price(contract, self.steps, self.american)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::black_scholes::BlackScholes;
    use crate::models::{atm_contract, OptionKind};

    #[test]
    fn test_converges_to_black_scholes() {
        let bs = BlackScholes::new();
        for kind in [OptionKind::Call, OptionKind::Put] {
            let c = atm_contract(kind);
            let analytic = bs.price(&c);
            let lattice = price(&c, 500, false);
            let rel = (lattice - analytic).abs() / analytic;
            assert!(rel < 1e-3, "{kind} N=500 lattice={lattice} analytic={analytic} rel={rel}");
        }
    }

    #[test]
    fn test_error_shrinks_with_steps() {
        let c = atm_contract(OptionKind::Call);
        let analytic = BlackScholes::new().price(&c);
        let coarse = (price(&c, 10, false) - analytic).abs();
        let fine = (price(&c, 400, false) - analytic).abs();
        assert!(fine < coarse, "N=400 error {fine} should beat N=10 error {coarse}");
    }

    #[test]
    fn test_american_call_without_dividends_equals_european() {
        let c = atm_contract(OptionKind::Call);
        let eu = price(&c, 200, false);
        let am = price(&c, 200, true);
        assert!((am - eu).abs() < 1e-10, "american={am} european={eu}");
    }

    #[test]
    fn test_american_dominates_european() {
        let cases = [
            atm_contract(OptionKind::Put),
            OptionContract { dividend_yield: 0.08, ..atm_contract(OptionKind::Call) },
            OptionContract { spot: 80.0, rate: 0.1, ..atm_contract(OptionKind::Put) },
        ];
        for c in cases {
            let eu = price(&c, 100, false);
            let am = price(&c, 100, true);
            assert!(am >= eu, "american={am} < european={eu} for {c:?}");
        }
        let put = atm_contract(OptionKind::Put);
        assert!(price(&put, 100, true) > price(&put, 100, false) + 1e-3, "early exercise premium expected for puts");
    }

    #[test]
    fn test_node_level_invariants() {
        let c = OptionContract { spot: 90.0, ..atm_contract(OptionKind::Put) };
        let n = 60;
        let lattice = LatticeParams::new(&c, n);

        let mut european = vec![vec![0.0; n + 1]; n];
        rollback(&c, &lattice, false, |j, i, _, v| european[j][i] = v);

        let mut checked = 0;
        rollback(&c, &lattice, true, |j, i, continuation, v| {
            assert!(v >= 0.0, "negative node value {v} at ({j}, {i})");
            assert!(v >= continuation, "node ({j}, {i}) value {v} below continuation {continuation}");
            assert!(v >= european[j][i], "node ({j}, {i}) american {v} below european {}", european[j][i]);
            checked += 1;
        });
        assert_eq!(checked, n * (n + 1) / 2);
    }

    #[test]
    fn test_exercise_map_for_american_put() {
        let c = atm_contract(OptionKind::Put);
        let n = 50;
        let (value, map) = exercise_map(&c, n);
        assert_eq!(value, price(&c, n, true));
        assert_eq!(map.len(), n + 1);
        assert!(map.iter().enumerate().all(|(j, row)| row.len() == j + 1));

        // Deep down-moves near maturity are exercised, the root is not.
        assert!(!map[0][0]);
        assert!(map[n - 1][n - 1]);
        // Exercise region is monotone in the number of down-moves.
        for row in &map[..n] {
            if let Some(first) = row.iter().position(|&f| f) {
                assert!(row[first..].iter().all(|&f| f), "gap in exercise region: {row:?}");
            }
        }
        // Maturity row flags exactly the in-the-money nodes.
        let lattice = LatticeParams::new(&c, n);
        for (i, &flag) in map[n].iter().enumerate() {
            assert_eq!(flag, lattice.spot_at(100.0, n, i) < 100.0);
        }
    }

    #[test]
    fn test_no_early_exercise_for_dividend_free_call() {
        let (_, map) = exercise_map(&atm_contract(OptionKind::Call), 40);
        assert!(map[..40].iter().flatten().all(|&f| !f));
    }

    #[test]
    fn test_probability_clamped_for_extreme_inputs() {
        let extremes = [
            (0.9, 1e-4, 1.0, 5),     // huge drift, tiny vol: p > 1 unclamped
            (-0.9, 1e-4, 1.0, 5),    // negative drift: p < 0 unclamped
            (5.0, 0.0, 10.0, 1),     // zero vol floors to 1e-4
            (800.0, 0.01, 1.0, 1),   // growth overflows to inf
            (0.05, 3.0, 0.0001, 500),
        ];
        for (r, sigma, t, n) in extremes {
            let c = OptionContract { rate: r, sigma, maturity: t, ..atm_contract(OptionKind::Call) };
            let lattice = LatticeParams::new(&c, n);
            assert!(
                (PROB_MIN..=PROB_MAX).contains(&lattice.probability),
                "p={} out of band for r={r} sigma={sigma} t={t} n={n}",
                lattice.probability
            );
            let v = price(&c, n, true);
            assert!(v >= 0.0 && !v.is_nan(), "price={v} for r={r} sigma={sigma}");
        }
    }

    #[test]
    fn test_lattice_factors() {
        let c = atm_contract(OptionKind::Call);
        let l = LatticeParams::new(&c, 4);
        assert!((l.dt - 0.25).abs() < 1e-15);
        assert!((l.up_factor * l.down_factor - 1.0).abs() < 1e-15);
        assert!((l.up_factor - (0.2_f64 * 0.5).exp()).abs() < 1e-15);
        assert!((l.discount - (-0.05_f64 * 0.25).exp()).abs() < 1e-15);
    }

    #[test]
    fn test_single_step_by_hand() {
        let c = atm_contract(OptionKind::Call);
        let l = LatticeParams::new(&c, 1);
        let expected = l.discount * l.probability * (100.0 * l.up_factor - 100.0);
        assert!((price(&c, 1, false) - expected).abs() < 1e-12);
    }
}
