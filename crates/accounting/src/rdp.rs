//! Rényi Differential Privacy accounting for the subsampled Gaussian mechanism.

use statrs::function::erf::erfc;
use statrs::function::factorial::ln_binomial;

/// Accumulates the RDP curve of repeated subsampled-Gaussian steps over a
/// fixed set of Rényi orders.
#[derive(Clone, Debug)]
pub struct RdpAccountant {
    orders: Vec<f64>,
    rdp: Vec<f64>,
}

impl Default for RdpAccountant {
    fn default() -> Self {
        Self::with_orders(default_orders())
    }
}

impl RdpAccountant {
    /// Accountant over [`default_orders`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Accountant over `orders`, kept ascending and deduplicated.
    ///
    /// Orders that are not finite or not above 1 are dropped; if nothing is
    /// left the default orders are used.
    pub fn with_orders(mut orders: Vec<f64>) -> Self {
        orders.retain(|a| a.is_finite() && *a > 1.0);
        orders.sort_by(f64::total_cmp);
        orders.dedup_by(|a, b| (*a - *b).abs() < 1e-12);
        if orders.is_empty() {
            orders = default_orders();
        }
        let rdp = vec![0.0; orders.len()];
        Self { orders, rdp }
    }

    /// Tracked orders, ascending.
    pub fn orders(&self) -> &[f64] {
        &self.orders
    }

    /// Accumulated RDP, aligned with [`orders`](Self::orders).
    pub fn rdp(&self) -> &[f64] {
        &self.rdp
    }

    /// Compose one step with sampling probability `q`.
    pub fn step(&mut self, noise_multiplier: f64, q: f64) {
        self.steps(noise_multiplier, q, 1);
    }

    /// Compose `n` identical steps. RDP composes additively, so this is one
    /// evaluation per order scaled by `n`.
    ///
    /// A non-positive noise multiplier or a `q` outside `[0, 1]` makes every
    /// order infinite.
    pub fn steps(&mut self, noise_multiplier: f64, q: f64, n: u64) {
        if n == 0 || q == 0.0 {
            return;
        }
        let valid_noise = noise_multiplier.is_finite() && noise_multiplier > 0.0;
        let valid_q = (0.0..=1.0).contains(&q);
        if !(valid_noise && valid_q) {
            tracing::debug!(noise_multiplier, q, "step has no finite RDP");
            self.rdp.fill(f64::INFINITY);
            return;
        }
        for (total, &alpha) in self.rdp.iter_mut().zip(&self.orders) {
            let per_step = subsampled_gaussian_rdp(q, noise_multiplier, alpha);
            *total = if per_step.is_finite() {
                *total + per_step * n as f64
            } else {
                f64::INFINITY
            };
        }
    }

    /// Epsilon at `delta`, minimized over orders.
    pub fn epsilon(&self, delta: f64) -> f64 {
        self.epsilon_and_order(delta).0
    }

    /// Epsilon at `delta` and the order attaining it (`None` if no order gives
    /// a finite bound).
    pub fn epsilon_and_order(&self, delta: f64) -> (f64, Option<f64>) {
        get_privacy_spent(&self.orders, &self.rdp, delta)
    }

    /// Forget all composed steps.
    pub fn reset(&mut self) {
        self.rdp.fill(0.0);
    }
}

/// `1.1, 1.2, ..., 10.9` followed by the integers `12..=63`.
pub fn default_orders() -> Vec<f64> {
    (1..100)
        .map(|x| 1.0 + f64::from(x) / 10.0)
        .chain((12..64).map(f64::from))
        .collect()
}

/// RDP of `steps` compositions of the sampled Gaussian mechanism, one value
/// per entry of `orders` (in the caller's order).
pub fn compute_rdp(q: f64, noise_multiplier: f64, steps: u64, orders: &[f64]) -> Vec<f64> {
    let mut acct = RdpAccountant::with_orders(orders.to_vec());
    acct.steps(noise_multiplier, q, steps);
    orders
        .iter()
        .map(|&a| {
            acct.orders
                .iter()
                .position(|&b| (a - b).abs() < 1e-12)
                .map_or(f64::INFINITY, |i| acct.rdp[i])
        })
        .collect()
}

/// Convert an RDP curve to (epsilon, delta)-DP:
/// `eps = min over alpha of rdp(alpha) + ln(1/delta) / (alpha - 1)`.
///
/// Returns the minimizing order alongside epsilon. A `delta` outside (0, 1)
/// or a curve with no finite entry gives `(inf, None)`.
pub fn get_privacy_spent(orders: &[f64], rdp: &[f64], delta: f64) -> (f64, Option<f64>) {
    if !(delta > 0.0 && delta < 1.0) {
        return (f64::INFINITY, None);
    }
    let log_inv_delta = -delta.ln();
    orders
        .iter()
        .zip(rdp)
        .filter(|&(&alpha, r)| alpha > 1.0 && r.is_finite())
        .map(|(&alpha, &r)| (r + log_inv_delta / (alpha - 1.0), alpha))
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map_or((f64::INFINITY, None), |(eps, alpha)| (eps, Some(alpha)))
}

/// Per-step RDP of the Gaussian mechanism with noise `sigma` applied to a
/// Poisson subsample of rate `q`.
fn subsampled_gaussian_rdp(q: f64, sigma: f64, alpha: f64) -> f64 {
    if q >= 1.0 {
        return alpha / (2.0 * sigma * sigma);
    }
    let log_a = if alpha.fract() == 0.0 {
        log_a_integer(q, sigma, alpha as u64)
    } else {
        log_a_fractional(q, sigma, alpha)
    };
    log_a / (alpha - 1.0)
}

/// `ln A_alpha` for integer alpha: a finite binomial sum.
fn log_a_integer(q: f64, sigma: f64, alpha: u64) -> f64 {
    let (ln_q, ln_1mq) = (q.ln(), (-q).ln_1p());
    let two_var = 2.0 * sigma * sigma;
    (0..=alpha)
        .map(|i| {
            let i_f = i as f64;
            ln_binomial(alpha, i) + i_f * ln_q + (alpha - i) as f64 * ln_1mq
                + i_f * (i_f - 1.0) / two_var
        })
        .fold(f64::NEG_INFINITY, ln_add)
}

/// `ln A_alpha` for fractional alpha.
///
/// Splits the integral at `z0` and sums both halves as series in the
/// generalized binomial coefficients, stopping once terms drop below e^-30.
fn log_a_fractional(q: f64, sigma: f64, alpha: f64) -> f64 {
    const MAX_TERMS: usize = 100_000;

    let sigma_sq = sigma * sigma;
    let log_q = q.ln();
    let log_1mq = (-q).ln_1p();
    let z0 = sigma_sq * (1.0 / q - 1.0).ln() + 0.5;
    let scale = std::f64::consts::SQRT_2 * sigma;

    let mut log_a0 = f64::NEG_INFINITY;
    let mut log_a1 = f64::NEG_INFINITY;
    // Generalized binomial coefficient C(alpha, i) as (sign, ln|.|).
    let mut coef_positive = true;
    let mut log_coef = 0.0f64;

    for i in 0..MAX_TERMS {
        if i > 0 {
            let factor = alpha - i as f64 + 1.0;
            if factor < 0.0 {
                coef_positive = !coef_positive;
            }
            log_coef += factor.abs().ln() - (i as f64).ln();
        }

        let i_f = i as f64;
        let j = alpha - i_f;

        let log_t0 = log_coef + i_f * log_q + j * log_1mq;
        let log_t1 = log_coef + j * log_q + i_f * log_1mq;

        let log_e0 = 0.5f64.ln() + log_erfc((i_f - z0) / scale);
        let log_e1 = 0.5f64.ln() + log_erfc((z0 - j) / scale);

        let log_s0 = log_t0 + (i_f * i_f - i_f) / (2.0 * sigma_sq) + log_e0;
        let log_s1 = log_t1 + (j * j - j) / (2.0 * sigma_sq) + log_e1;

        if coef_positive {
            log_a0 = ln_add(log_a0, log_s0);
            log_a1 = ln_add(log_a1, log_s1);
        } else {
            log_a0 = ln_sub(log_a0, log_s0);
            log_a1 = ln_sub(log_a1, log_s1);
        }

        if log_s0.max(log_s1) < -30.0 {
            break;
        }
    }

    ln_add(log_a0, log_a1)
}

/// ln(erfc(x)), with an asymptotic expansion where erfc underflows.
fn log_erfc(x: f64) -> f64 {
    let r = erfc(x);
    if r > 0.0 {
        return r.ln();
    }
    let x2 = x * x;
    -std::f64::consts::PI.ln() / 2.0 - x.ln() - x2 - 0.5 / x2 + 0.625 / (x2 * x2)
        - 37.0 / 24.0 / (x2 * x2 * x2)
        + 353.0 / 64.0 / (x2 * x2 * x2 * x2)
}

/// `ln(e^a + e^b)`.
fn ln_add(a: f64, b: f64) -> f64 {
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    if lo == f64::NEG_INFINITY {
        return hi;
    }
    hi + (lo - hi).exp().ln_1p()
}

/// `ln(e^a - e^b)`, or negative infinity when `b >= a`.
fn ln_sub(a: f64, b: f64) -> f64 {
    if b == f64::NEG_INFINITY {
        a
    } else if b >= a {
        f64::NEG_INFINITY
    } else {
        a + (-(b - a).exp_m1()).ln()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn eps_for(noise: f64, q: f64, steps: u64, orders: &[f64], delta: f64) -> f64 {
        let rdp = compute_rdp(q, noise, steps, orders);
        get_privacy_spent(orders, &rdp, delta).0
    }

    #[test]
    fn composition_grows_epsilon() {
        let mut acct = RdpAccountant::new();
        acct.step(1.0, 0.01);
        let one = acct.epsilon(1e-5);
        acct.step(1.0, 0.01);
        let two = acct.epsilon(1e-5);
        assert!(one.is_finite() && one > 0.0);
        assert!(two > one);
        acct.reset();
        assert!(acct.rdp().iter().all(|&r| r == 0.0));
    }

    #[test]
    fn batched_steps_equal_single_steps() {
        let mut looped = RdpAccountant::new();
        (0..7).for_each(|_| looped.step(0.9, 0.05));
        let mut batched = RdpAccountant::new();
        batched.steps(0.9, 0.05, 7);
        for (a, b) in looped.rdp().iter().zip(batched.rdp()) {
            assert!((a - b).abs() <= 1e-9 * a.max(1.0));
        }
    }

    #[test]
    fn zero_noise_makes_every_order_infinite() {
        let mut acct = RdpAccountant::new();
        acct.steps(0.0, 0.1, 3);
        assert!(acct.rdp().iter().all(|r| r.is_infinite()));
        assert_eq!(acct.epsilon_and_order(1e-5), (f64::INFINITY, None));
    }

    #[test]
    fn default_orders_span_fractional_and_integer_ranges() {
        let orders = default_orders();
        assert_eq!(orders.len(), 99 + 52);
        assert!((orders[0] - 1.1).abs() < 1e-12);
        assert!((orders[98] - 10.9).abs() < 1e-12);
        assert_eq!(orders[99], 12.0);
        assert_eq!(*orders.last().unwrap(), 63.0);
    }

    #[test]
    fn full_batch_matches_gaussian_closed_form() {
        let rdp = compute_rdp(1.0, 2.0, 3, &[2.0, 4.5]);
        assert!((rdp[0] - 3.0 * 2.0 / 8.0).abs() < 1e-12);
        assert!((rdp[1] - 3.0 * 4.5 / 8.0).abs() < 1e-12);
    }

    #[test]
    fn fractional_orders_sit_between_integer_neighbours() {
        let rdp = compute_rdp(0.01, 1.1, 1, &[2.0, 2.5, 3.0]);
        assert!(rdp[0] <= rdp[1] + 1e-12);
        assert!(rdp[1] <= rdp[2] + 1e-12);
    }

    #[test]
    fn fractional_order_near_integer_agrees() {
        let a = compute_rdp(0.05, 1.5, 1, &[3.0])[0];
        let b = compute_rdp(0.05, 1.5, 1, &[3.0 + 1e-6])[0];
        assert!((a - b).abs() / a < 1e-3);
    }

    #[test]
    fn reference_dpsgd_budget_is_in_known_range() {
        // q = 256/60000, sigma = 1.1, 60 epochs: the classic MNIST setting.
        let q = 256.0 / 60_000.0;
        let steps = 60 * 60_000 / 256;
        let eps = eps_for(1.1, q, steps, &default_orders(), 1e-5);
        assert!(eps > 2.0 && eps < 4.0, "eps = {eps}");
    }

    #[test]
    fn optimal_order_is_reported() {
        let mut acc = RdpAccountant::new();
        acc.steps(1.4, 0.01, 100);
        let (eps, order) = acc.epsilon_and_order(1e-5);
        assert!(eps.is_finite());
        let order = order.expect("finite order");
        assert!(acc.orders().contains(&order));
    }

    #[test]
    fn invalid_delta_is_unbounded() {
        let mut acc = RdpAccountant::new();
        acc.step(1.0, 0.01);
        assert!(acc.epsilon(0.0).is_infinite());
        assert!(acc.epsilon(1.0).is_infinite());
    }

    proptest! {
        #[test]
        fn epsilon_non_increasing_in_noise(
            sigma in 0.5f64..4.0,
            bump in 0.0f64..2.0,
            q in 0.001f64..0.2,
            steps in 1u64..2000,
        ) {
            let orders = default_orders();
            let lo = eps_for(sigma, q, steps, &orders, 1e-5);
            let hi = eps_for(sigma + bump, q, steps, &orders, 1e-5);
            prop_assert!(hi <= lo * (1.0 + 1e-9) + 1e-9, "sigma {} -> {}, {} -> {}", sigma, lo, sigma + bump, hi);
        }

        #[test]
        fn denser_order_sets_never_loosen_epsilon(
            sigma in 0.6f64..3.0,
            q in 0.001f64..0.1,
            steps in 1u64..5000,
            stride in 2usize..20,
        ) {
            let dense = default_orders();
            let sparse: Vec<f64> = dense.iter().copied().step_by(stride).collect();
            let eps_dense = eps_for(sigma, q, steps, &dense, 1e-5);
            let eps_sparse = eps_for(sigma, q, steps, &sparse, 1e-5);
            prop_assert!(eps_dense <= eps_sparse + 1e-9);
        }
    }

    #[test]
    fn narrow_order_set_overstates_epsilon() {
        let q = 0.01;
        let steps = 1000;
        let dense = eps_for(1.4, q, steps, &default_orders(), 1e-5);
        let narrow = eps_for(1.4, q, steps, &[63.0], 1e-5);
        assert!(narrow > dense * 1.5, "dense {dense}, narrow {narrow}");
    }
}
