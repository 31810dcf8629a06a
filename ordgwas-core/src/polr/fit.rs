//! Fisher scoring for the proportional-odds model.
//!
//! Parameters are phi = (theta_1..theta_{K-1}, beta_1..beta_p). Each
//! iteration solves I(phi) delta = U(phi) with the expected information,
//! halving the step while the log-likelihood drops or the thresholds
//! lose their order.

use anyhow::{bail, Result};
use tracing::{debug, trace};

use ordgwas_linalg::decomposition::CholeskyDecomp;
use ordgwas_linalg::dense::DenseMatrix;

use super::link::{CumulativeLink, LinkKind};
use super::terms::ObservationTerms;

/// Configuration for the Fisher-scoring fitter.
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// Maximum scoring iterations.
    pub max_iter: usize,
    /// Convergence tolerance on the relative log-likelihood change.
    pub tol: f64,
    /// Maximum step halvings per iteration.
    pub max_halvings: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol: 1e-8,
            max_halvings: 30,
        }
    }
}

/// Starting values for a fit.
#[derive(Debug, Clone)]
pub struct PolrStart {
    pub thetas: Vec<f64>,
    pub betas: Vec<f64>,
}

/// Result of a proportional-odds fit.
#[derive(Debug, Clone)]
pub struct PolrFit {
    pub thetas: Vec<f64>,
    pub betas: Vec<f64>,
    pub loglik: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl PolrFit {
    pub fn deviance(&self) -> f64 {
        -2.0 * self.loglik
    }
}

/// Anything that can fit an ordinal regression.
///
/// `y` holds levels 1..=n_levels; `x` has no intercept column.
pub trait OrdinalFitter {
    fn fit(
        &self,
        y: &[usize],
        x: &DenseMatrix,
        weights: &[f64],
        n_levels: usize,
        start: Option<&PolrStart>,
    ) -> Result<PolrFit>;
}

/// Log-likelihood, score and expected information at one parameter value.
pub struct Evaluation {
    pub loglik: f64,
    pub score: Vec<f64>,
    pub info: DenseMatrix,
}

/// Weighted log-likelihood only. Returns -inf if any observed category
/// has zero probability.
pub fn log_likelihood(
    link: &dyn CumulativeLink,
    y: &[usize],
    x: &DenseMatrix,
    weights: &[f64],
    thetas: &[f64],
    betas: &[f64],
) -> f64 {
    let eta = x.mat_vec(betas);
    let mut terms = ObservationTerms::new(thetas.len() + 1);
    let mut ll = 0.0;
    for i in 0..y.len() {
        if !terms.evaluate(link, thetas, eta[i], y[i]) {
            return f64::NEG_INFINITY;
        }
        ll += weights[i] * terms.log_prob;
    }
    ll
}

/// Full evaluation: log-likelihood, score, and expected information.
pub fn evaluate(
    link: &dyn CumulativeLink,
    y: &[usize],
    x: &DenseMatrix,
    weights: &[f64],
    thetas: &[f64],
    betas: &[f64],
) -> Evaluation {
    let n = y.len();
    let kt = thetas.len();
    let p = betas.len();
    let m = kt + p;
    let eta = x.mat_vec(betas);
    let mut terms = ObservationTerms::new(kt + 1);
    let mut xi = vec![0.0; p];
    let mut score = vec![0.0; m];
    let mut info = DenseMatrix::zeros(m, m);
    let mut loglik = 0.0;

    for i in 0..n {
        let s = weights[i];
        if !terms.evaluate(link, thetas, eta[i], y[i]) {
            loglik = f64::NEG_INFINITY;
        }
        loglik += s * terms.log_prob;
        x.row_into(i, &mut xi);

        for j in 0..kt {
            score[j] += s * terms.d_theta(j);
            info.add_to(j, j, s * terms.theta_diag(j));
            if j + 1 < kt {
                let v = s * terms.theta_next(j);
                info.add_to(j, j + 1, v);
                info.add_to(j + 1, j, v);
            }
            let c = s * terms.cross(j);
            for (a, &xa) in xi.iter().enumerate() {
                info.add_to(j, kt + a, c * xa);
                info.add_to(kt + a, j, c * xa);
            }
        }
        let sw = s * terms.w;
        for (a, &xa) in xi.iter().enumerate() {
            score[kt + a] += s * terms.d_eta * xa;
            for (b, &xb) in xi.iter().enumerate().skip(a) {
                let v = sw * xa * xb;
                info.add_to(kt + a, kt + b, v);
                if b != a {
                    info.add_to(kt + b, kt + a, v);
                }
            }
        }
    }

    Evaluation {
        loglik,
        score,
        info,
    }
}

/// Thresholds from the weighted cumulative proportions of `y`.
pub fn initial_thresholds(
    link: &dyn CumulativeLink,
    y: &[usize],
    weights: &[f64],
    n_levels: usize,
) -> Vec<f64> {
    let mut mass = vec![0.0; n_levels + 1];
    for (&yi, &w) in y.iter().zip(weights.iter()) {
        mass[yi] += w;
    }
    let total: f64 = mass.iter().sum();
    let mut cum = 0.0;
    (1..n_levels)
        .map(|j| {
            cum += mass[j];
            let p = (cum / total).clamp(1e-6, 1.0 - 1e-6);
            link.quantile(p)
        })
        .collect()
}

/// A fit has converged only on a full step with a small log-likelihood
/// change; a tiny change after halving means the fit stalled.
fn step_converged(rel_change: f64, scale: f64, tol: f64) -> bool {
    scale == 1.0 && rel_change < tol
}

fn is_ordered(thetas: &[f64]) -> bool {
    thetas.iter().all(|t| t.is_finite()) && thetas.windows(2).all(|w| w[0] < w[1])
}

/// Expected-information Fisher scoring with step halving.
#[derive(Debug, Clone)]
pub struct FisherScoring {
    pub link: LinkKind,
    pub config: FitConfig,
}

impl FisherScoring {
    pub fn new(link: LinkKind, config: FitConfig) -> Self {
        Self { link, config }
    }
}

impl OrdinalFitter for FisherScoring {
    fn fit(
        &self,
        y: &[usize],
        x: &DenseMatrix,
        weights: &[f64],
        n_levels: usize,
        start: Option<&PolrStart>,
    ) -> Result<PolrFit> {
        let n = y.len();
        let p = x.ncols();
        if x.nrows() != n || weights.len() != n {
            bail!(
                "Fit inputs disagree: {} responses, {} design rows, {} weights",
                n,
                x.nrows(),
                weights.len()
            );
        }
        if n_levels < 2 {
            bail!("An ordinal response needs at least 2 levels, got {}", n_levels);
        }
        let kt = n_levels - 1;
        let link = self.link.link();
        let link = link.as_ref();

        let (mut thetas, mut betas) = match start {
            Some(s) if s.thetas.len() == kt && s.betas.len() == p => {
                (s.thetas.clone(), s.betas.clone())
            }
            Some(_) => bail!("Starting values do not match {} thresholds and {} coefficients", kt, p),
            None => (initial_thresholds(link, y, weights, n_levels), vec![0.0; p]),
        };

        let mut current = evaluate(link, y, x, weights, &thetas, &betas);
        if !current.loglik.is_finite() {
            bail!("Log-likelihood is not finite at the starting values");
        }

        for iter in 0..self.config.max_iter {
            let chol = CholeskyDecomp::new(&current.info)?;
            let step = chol.solve(&current.score);

            let mut scale = 1.0;
            let mut accepted = None;
            for _ in 0..=self.config.max_halvings {
                let cand_t: Vec<f64> = (0..kt).map(|j| thetas[j] + scale * step[j]).collect();
                let cand_b: Vec<f64> = (0..p).map(|a| betas[a] + scale * step[kt + a]).collect();
                if is_ordered(&cand_t) && cand_b.iter().all(|b| b.is_finite()) {
                    let ll = log_likelihood(link, y, x, weights, &cand_t, &cand_b);
                    // Allow rounding noise near the optimum.
                    if ll.is_finite() && ll >= current.loglik - 1e-10 * (current.loglik.abs() + 1.0) {
                        accepted = Some((cand_t, cand_b, ll));
                        break;
                    }
                }
                scale *= 0.5;
            }

            let Some((new_t, new_b, new_ll)) = accepted else {
                debug!("Step halving exhausted at iteration {}", iter + 1);
                return Ok(PolrFit {
                    thetas,
                    betas,
                    loglik: current.loglik,
                    iterations: iter + 1,
                    converged: false,
                });
            };

            let rel_change = (new_ll - current.loglik).abs() / (current.loglik.abs() + 0.1);
            trace!(
                "iter {}: loglik {:.8} (step scale {}, rel change {:.3e})",
                iter + 1,
                new_ll,
                scale,
                rel_change
            );
            thetas = new_t;
            betas = new_b;

            if step_converged(rel_change, scale, self.config.tol) {
                return Ok(PolrFit {
                    thetas,
                    betas,
                    loglik: new_ll,
                    iterations: iter + 1,
                    converged: true,
                });
            }
            current = evaluate(link, y, x, weights, &thetas, &betas);
        }

        Ok(PolrFit {
            thetas,
            betas,
            loglik: current.loglik,
            iterations: self.config.max_iter,
            converged: false,
        })
    }
}
