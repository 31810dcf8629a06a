//! Per-observation likelihood terms of the cumulative link model.
//!
//! For one observation with linear predictor eta and response level y in
//! 1..=K, let F_j = F(theta_j - eta) and f_j its density, with F_0 = 0,
//! F_K = 1, f_0 = f_K = 0 and pi_k = F_k - F_{k-1}. Then
//!
//! - log-likelihood: ln pi_y
//! - d/d eta: -(f_y - f_{y-1}) / pi_y
//! - d/d theta_j: f_y / pi_y (j = y), -f_{y-1} / pi_y (j = y - 1)
//! - expected information, eta-eta: sum_k (f_k - f_{k-1})^2 / pi_k
//! - theta_j-eta: f_j [(f_{j+1} - f_j) / pi_{j+1} - (f_j - f_{j-1}) / pi_j]
//! - theta_j-theta_j: f_j^2 (1/pi_j + 1/pi_{j+1})
//! - theta_j-theta_{j+1}: -f_j f_{j+1} / pi_{j+1}
//!
//! Threshold indices in the public methods are 0-based (index j is
//! theta_{j+1}).

use super::link::CumulativeLink;

/// Category probabilities below this contribute nothing to the
/// expected information.
const MIN_PROB: f64 = 1e-300;

/// Reusable buffers for one observation's terms.
#[derive(Debug, Clone)]
pub struct ObservationTerms {
    n_levels: usize,
    /// F_0..F_K.
    cdf: Vec<f64>,
    /// f_0..f_K.
    pdf: Vec<f64>,
    /// 1/pi_k at index k (index 0 unused); 0 for vanishing categories.
    inv_prob: Vec<f64>,
    y: usize,
    pub log_prob: f64,
    pub d_eta: f64,
    /// Expected eta-eta information.
    pub w: f64,
}

impl ObservationTerms {
    pub fn new(n_levels: usize) -> Self {
        Self {
            n_levels,
            cdf: vec![0.0; n_levels + 1],
            pdf: vec![0.0; n_levels + 1],
            inv_prob: vec![0.0; n_levels + 1],
            y: 1,
            log_prob: 0.0,
            d_eta: 0.0,
            w: 0.0,
        }
    }

    /// Evaluate at `thetas` (length K-1) and `eta` for response level `y`.
    ///
    /// Returns false when the observed category has zero probability
    /// (the log-likelihood is then -inf and derivatives are unusable).
    pub fn evaluate(
        &mut self,
        link: &dyn CumulativeLink,
        thetas: &[f64],
        eta: f64,
        y: usize,
    ) -> bool {
        let k = self.n_levels;
        debug_assert_eq!(thetas.len(), k - 1);
        debug_assert!((1..=k).contains(&y));

        self.cdf[0] = 0.0;
        self.pdf[0] = 0.0;
        for (j, &theta) in thetas.iter().enumerate() {
            self.cdf[j + 1] = link.cdf(theta - eta);
            self.pdf[j + 1] = link.pdf(theta - eta);
        }
        self.cdf[k] = 1.0;
        self.pdf[k] = 0.0;

        let mut w = 0.0;
        for c in 1..=k {
            let pi = self.cdf[c] - self.cdf[c - 1];
            if pi > MIN_PROB {
                self.inv_prob[c] = 1.0 / pi;
                let df = self.pdf[c] - self.pdf[c - 1];
                w += df * df / pi;
            } else {
                self.inv_prob[c] = 0.0;
            }
        }
        self.w = w;
        self.y = y;

        let pi_y = self.cdf[y] - self.cdf[y - 1];
        if !(pi_y > MIN_PROB) {
            self.log_prob = f64::NEG_INFINITY;
            self.d_eta = 0.0;
            return false;
        }
        self.log_prob = pi_y.ln();
        self.d_eta = -(self.pdf[y] - self.pdf[y - 1]) * self.inv_prob[y];
        true
    }

    /// Score contribution for threshold `j`.
    pub fn d_theta(&self, j: usize) -> f64 {
        let t = j + 1;
        if t == self.y {
            self.pdf[t] * self.inv_prob[self.y]
        } else if t + 1 == self.y {
            -self.pdf[t] * self.inv_prob[self.y]
        } else {
            0.0
        }
    }

    /// Expected theta_j / eta cross information.
    pub fn cross(&self, j: usize) -> f64 {
        let t = j + 1;
        let f = &self.pdf;
        f[t] * ((f[t + 1] - f[t]) * self.inv_prob[t + 1] - (f[t] - f[t - 1]) * self.inv_prob[t])
    }

    /// Expected theta_j / theta_j information.
    pub fn theta_diag(&self, j: usize) -> f64 {
        let t = j + 1;
        self.pdf[t] * self.pdf[t] * (self.inv_prob[t] + self.inv_prob[t + 1])
    }

    /// Expected theta_j / theta_{j+1} information.
    pub fn theta_next(&self, j: usize) -> f64 {
        let t = j + 1;
        -self.pdf[t] * self.pdf[t + 1] * self.inv_prob[t + 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polr::link::{LinkKind, LogitLink};

    fn log_prob(link: &dyn CumulativeLink, thetas: &[f64], eta: f64, y: usize) -> f64 {
        let mut t = ObservationTerms::new(thetas.len() + 1);
        t.evaluate(link, thetas, eta, y);
        t.log_prob
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let thetas = [-1.0, 0.2, 1.5];
        let total: f64 = (1..=4)
            .map(|y| log_prob(&LogitLink, &thetas, 0.3, y).exp())
            .sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        let thetas = [-0.7, 0.4, 1.1];
        let eta = 0.25;
        let h = 1e-6;
        for kind in [LinkKind::Logit, LinkKind::Probit, LinkKind::Cloglog] {
            let link = kind.link();
            for y in 1..=4 {
                let mut t = ObservationTerms::new(4);
                assert!(t.evaluate(link.as_ref(), &thetas, eta, y));

                let num_eta = (log_prob(link.as_ref(), &thetas, eta + h, y)
                    - log_prob(link.as_ref(), &thetas, eta - h, y))
                    / (2.0 * h);
                assert!((num_eta - t.d_eta).abs() < 1e-6, "{:?} y={}", kind, y);

                for j in 0..3 {
                    let mut up = thetas;
                    let mut dn = thetas;
                    up[j] += h;
                    dn[j] -= h;
                    let num = (log_prob(link.as_ref(), &up, eta, y)
                        - log_prob(link.as_ref(), &dn, eta, y))
                        / (2.0 * h);
                    assert!((num - t.d_theta(j)).abs() < 1e-6, "{:?} y={} j={}", kind, y, j);
                }
            }
        }
    }

    #[test]
    fn test_expected_information_is_score_variance() {
        // Each information entry is the expected product of the matching scores.
        let thetas = [-0.5, 0.9];
        let eta = -0.2;
        let mut t = ObservationTerms::new(3);
        t.evaluate(&LogitLink, &thetas, eta, 1);
        let w = t.w;
        let cross: Vec<f64> = (0..2).map(|j| t.cross(j)).collect();
        let diag: Vec<f64> = (0..2).map(|j| t.theta_diag(j)).collect();
        let next = t.theta_next(0);

        let (mut e_ee, mut e_te, mut e_tt, mut e_t01) = (0.0, [0.0; 2], [0.0; 2], 0.0);
        for y in 1..=3 {
            t.evaluate(&LogitLink, &thetas, eta, y);
            let p = t.log_prob.exp();
            e_ee += p * t.d_eta * t.d_eta;
            for j in 0..2 {
                e_te[j] += p * t.d_theta(j) * t.d_eta;
                e_tt[j] += p * t.d_theta(j) * t.d_theta(j);
            }
            e_t01 += p * t.d_theta(0) * t.d_theta(1);
        }
        assert!((e_ee - w).abs() < 1e-12);
        for j in 0..2 {
            assert!((e_te[j] - cross[j]).abs() < 1e-12);
            assert!((e_tt[j] - diag[j]).abs() < 1e-12);
        }
        assert!((e_t01 - next).abs() < 1e-12);
    }

    #[test]
    fn test_disordered_thresholds_flag_zero_probability() {
        let mut t = ObservationTerms::new(3);
        assert!(!t.evaluate(&LogitLink, &[1.0, 1.0], 0.0, 2));
        assert_eq!(t.log_prob, f64::NEG_INFINITY);
    }
}
