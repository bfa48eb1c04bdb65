use crate::models::{ExerciseMap, OptionContract, PricingModel};

/// Per-step quantities of a CRR-style trinomial lattice. Stack-allocated, Copy.
///
/// u = exp(sigma * sqrt(2 dt)), middle move 1, d = 1/u.
/// With a = exp((r - q) dt / 2) and e± = exp(±sigma * sqrt(dt / 2)):
/// pu = ((a - e-) / (e+ - e-))^2, pd = ((e+ - a) / (e+ - e-))^2, pm = 1 - pu - pd.
#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrinomialParams {
    pub steps: usize,
    pub dt: f64,
    pub up_factor: f64,
    pub down_factor: f64,
    pub prob_up: f64,
    pub prob_mid: f64,
    pub prob_down: f64,
    pub discount: f64,
}

impl TrinomialParams {
    pub fn new(contract: &OptionContract, steps: usize) -> Self {
        let steps = steps.max(1);
        let sigma = contract.floored_sigma();
        let dt = contract.floored_maturity() / steps as f64;
        let up_factor = (sigma * (2.0 * dt).sqrt()).exp();

        let a = ((contract.rate - contract.dividend_yield) * dt / 2.0).exp();
        let e_plus = (sigma * (dt / 2.0).sqrt()).exp();
        let e_minus = 1.0 / e_plus;
        let spread = e_plus - e_minus;
        let raw_up = ((a - e_minus) / spread).powi(2);
        let raw_down = ((e_plus - a) / spread).powi(2);

        // Extreme drift/vol ratios push the squared terms past 1; renormalise
        // so the three weights stay a distribution.
        let (prob_up, prob_mid, prob_down) = if raw_up.is_finite() && raw_down.is_finite() && raw_up + raw_down <= 1.0 {
            (raw_up, 1.0 - raw_up - raw_down, raw_down)
        } else if raw_up.is_finite() && raw_down.is_finite() {
            let total = raw_up + raw_down;
            (raw_up / total, 0.0, raw_down / total)
        } else if a >= 1.0 {
            (1.0, 0.0, 0.0)
        } else {
            (0.0, 0.0, 1.0)
        };

        Self {
            steps,
            dt,
            up_factor,
            down_factor: 1.0 / up_factor,
            prob_up,
            prob_mid,
            prob_down,
            discount: (-contract.rate * dt).exp(),
        }
    }

    /// Underlying at `level`, node `index` in `0..=2*level` (ascending price).
    #[inline]
    fn spot_at(&self, spot0: f64, level: usize, index: usize) -> f64 {
        spot0 * self.up_factor.powi(index as i32 - level as i32)
    }
}

/// Price with the sensitivities read off the first lattice level.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct TreeValuation {
    pub price: f64,
    pub delta: f64,
    pub gamma: f64,
}

/// Backward induction over one buffer of `2 * steps + 1` nodes.
///
/// `on_node(level, index, continuation, value)` sees every interior node.
/// Returns the root value and the three node values of level 1.
fn rollback<F>(contract: &OptionContract, tree: &TrinomialParams, american: bool, mut on_node: F) -> (f64, [f64; 3])
where
    F: FnMut(usize, usize, f64, f64),
{
    let n = tree.steps;
    let (s0, k, kind) = (contract.spot, contract.strike, contract.kind);
    let (pu, pm, pd) = (tree.prob_up, tree.prob_mid, tree.prob_down);
    let df = tree.discount;

    let mut values: Vec<f64> = (0..=2 * n).map(|i| kind.intrinsic(tree.spot_at(s0, n, i), k)).collect();
    let mut first_level = [values[0], values[1], values[2]];

    for j in (0..n).rev() {
        // Node i reads children i, i+1, i+2 before any of them is overwritten.
        for i in 0..=2 * j {
            let continuation = df * (pd * values[i] + pm * values[i + 1] + pu * values[i + 2]);
            values[i] = if american {
                continuation.max(kind.intrinsic(tree.spot_at(s0, j, i), k))
            } else {
                continuation
            };
            on_node(j, i, continuation, values[i]);
        }
        if j == 1 {
            first_level = [values[0], values[1], values[2]];
        }
    }

    (values[0], first_level)
}

fn valuation(contract: &OptionContract, tree: &TrinomialParams, root: f64, level_one: [f64; 3]) -> TreeValuation {
    let s0 = contract.spot;
    let (s_down, s_up) = (tree.spot_at(s0, 1, 0), tree.spot_at(s0, 1, 2));
    let [v_down, v_mid, v_up] = level_one;

    let delta_up = (v_up - v_mid) / (s_up - s0);
    let delta_down = (v_mid - v_down) / (s0 - s_down);

    TreeValuation {
        price: root,
        delta: (v_up - v_down) / (s_up - s_down),
        gamma: (delta_up - delta_down) / (0.5 * (s_up - s_down)),
    }
}

/// Price `contract` on an N-step trinomial lattice.
pub fn price(contract: &OptionContract, steps: usize, american: bool) -> f64 {
    let tree = TrinomialParams::new(contract, steps);
    rollback(contract, &tree, american, |_, _, _, _| {}).0
}

/// Price, tree delta and tree gamma.
pub fn value(contract: &OptionContract, steps: usize, american: bool) -> TreeValuation {
    let tree = TrinomialParams::new(contract, steps);
    let (root, level_one) = rollback(contract, &tree, american, |_, _, _, _| {});
    valuation(contract, &tree, root, level_one)
}

/// American valuation plus the exercise flag of every node. Row `j` holds
/// `2j + 1` entries in ascending underlying price.
pub fn exercise_map(contract: &OptionContract, steps: usize) -> (TreeValuation, ExerciseMap) {
    let tree = TrinomialParams::new(contract, steps);
    let n = tree.steps;
    let mut map: ExerciseMap = (0..=n).map(|j| vec![false; 2 * j + 1]).collect();
    for (i, flag) in map[n].iter_mut().enumerate() {
        *flag = contract.kind.intrinsic(tree.spot_at(contract.spot, n, i), contract.strike) > 0.0;
    }
    let (root, level_one) = rollback(contract, &tree, true, |j, i, continuation, v| {
        map[j][i] = v > continuation;
    });
    (valuation(contract, &tree, root, level_one), map)
}

/// Trinomial lattice pricer bound to a resolution and exercise flag.
#[derive(Debug, Clone, Copy)]
pub struct CrrTrinomial {
    pub steps: usize,
    pub american: bool,
}

impl CrrTrinomial {
    pub fn new(steps: usize, american: bool) -> Self {
        Self { steps, american }
    }
}

impl PricingModel for CrrTrinomial {
    #[inline]
    fn name(&self) -> &'static str {
        "CRR-Trinomial"
    }

    fn price(&self, contract: &OptionContract) -> f64 {
        price(contract, self.steps, self.american)
    }
}
