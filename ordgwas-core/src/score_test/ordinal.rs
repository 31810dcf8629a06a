//! Multi-column score test against a fitted proportional-odds null model.
//!
//! For a design block Z (n x q) of candidate columns, with per-sample
//! weights s_i and null-fit terms d_i (score in eta), w_i (eta-eta
//! information) and c_i (threshold-eta cross information):
//!
//!   U = Z' (s * d)
//!   V = Z' diag(s * w) Z - (Z'H) I_phi^{-1} (H'Z)
//!   T = U' V^{-1} U ~ chi-sq(q)
//!
//! where H has rows s_i [c_i', w_i x_i'] and I_phi is the null
//! information over (thresholds, covariate coefficients). No refit.
//!
//! Reference: efficient score statistic with nuisance parameters
//! (Rao 1948; Cox & Hinkley 1974, section 9.3).

use anyhow::{bail, Result};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use ordgwas_linalg::decomposition::CholeskyDecomp;
use ordgwas_linalg::dense::DenseMatrix;

use crate::model::null_model::FittedNullModel;
use crate::polr::fit::evaluate;
use crate::polr::terms::ObservationTerms;

/// A column whose variance left after projecting out the null
/// parameters falls below this fraction of its raw variance is treated
/// as already explained by the null model.
const RESIDUAL_RTOL: f64 = 1e-10;

/// Statistic and p-value of one score test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreOutcome {
    pub statistic: f64,
    pub df: usize,
    pub pvalue: f64,
}

/// Score-test state precomputed from the null fit, plus scratch space.
///
/// Calls take `&mut self`: one test unit at a time. Parallel callers need
/// one context each.
pub struct ScoreTestContext {
    n: usize,
    m: usize,
    /// s_i * d_i.
    sd: Vec<f64>,
    /// s_i * w_i.
    sw: Vec<f64>,
    /// n x m.
    h: DenseMatrix,
    /// m x m.
    info_inv: DenseMatrix,
    /// Z'H rows, row-major q x m; grows to the widest block seen.
    zh: Vec<f64>,
    u: Vec<f64>,
    /// Columns live in the scratch buffers for the current call.
    active: usize,
}

impl ScoreTestContext {
    pub fn new(model: &FittedNullModel) -> Result<Self> {
        let n = model.n_samples;
        let kt = model.thetas.len();
        let p = model.x_ncols;
        let m = kt + p;
        let x = model.x();
        let link = model.link.link();
        let link = link.as_ref();

        let null_eval = evaluate(link, &model.y, &x, &model.weights, &model.thetas, &model.betas);
        let chol = CholeskyDecomp::new(&null_eval.info)?;
        let info_inv = chol.inverse();

        let eta = x.mat_vec(&model.betas);
        let mut terms = ObservationTerms::new(kt + 1);
        let mut sd = vec![0.0; n];
        let mut sw = vec![0.0; n];
        let mut h = DenseMatrix::zeros(n, m);
        let mut xi = vec![0.0; p];
        for i in 0..n {
            if !terms.evaluate(link, &model.thetas, eta[i], model.y[i]) {
                bail!("Null model gives sample {} zero probability", model.sample_ids[i]);
            }
            let s = model.weights[i];
            sd[i] = s * terms.d_eta;
            sw[i] = s * terms.w;
            for j in 0..kt {
                h.set(i, j, s * terms.cross(j));
            }
            x.row_into(i, &mut xi);
            for (a, &xa) in xi.iter().enumerate() {
                h.set(i, kt + a, s * terms.w * xa);
            }
        }

        Ok(Self {
            n,
            m,
            sd,
            sw,
            h,
            info_inv,
            zh: Vec::new(),
            u: Vec::new(),
            active: 0,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.n
    }

    fn set_active(&mut self, q: usize) {
        if self.u.len() < q {
            self.u.resize(q, 0.0);
            self.zh.resize(q * self.m, 0.0);
        }
        self.active = q;
    }

    /// Test the columns jointly. Each column has length n.
    ///
    /// A numerically singular V, or a column the null model already
    /// explains, gives a NaN statistic and p-value.
    pub fn test(&mut self, columns: &[&[f64]]) -> ScoreOutcome {
        let q = columns.len();
        self.set_active(q);
        let m = self.m;

        for (a, z) in columns.iter().enumerate() {
            debug_assert_eq!(z.len(), self.n);
            self.u[a] = DenseMatrix::dot(z, &self.sd);
            let row = &mut self.zh[a * m..(a + 1) * m];
            row.iter_mut().for_each(|v| *v = 0.0);
            for (i, &zi) in z.iter().enumerate() {
                if zi == 0.0 {
                    continue;
                }
                for (k, r) in row.iter_mut().enumerate() {
                    *r += zi * self.h.get(i, k);
                }
            }
        }

        // V = Z' diag(sw) Z - ZH I^-1 HZ
        let mut v = DenseMatrix::zeros(q, q);
        let mut explained = false;
        let mut tmp = vec![0.0; m];
        for a in 0..q {
            let zh_a = &self.zh[a * m..(a + 1) * m];
            for (k, t) in tmp.iter_mut().enumerate() {
                *t = (0..m).map(|l| self.info_inv.get(k, l) * zh_a[l]).sum();
            }
            for b in a..q {
                let zwz: f64 = columns[a]
                    .iter()
                    .zip(columns[b].iter())
                    .zip(self.sw.iter())
                    .map(|((za, zb), w)| za * w * zb)
                    .sum();
                let adj = DenseMatrix::dot(&tmp, &self.zh[b * m..(b + 1) * m]);
                v.set(a, b, zwz - adj);
                v.set(b, a, zwz - adj);
                if a == b && !(zwz - adj > RESIDUAL_RTOL * zwz.abs()) {
                    explained = true;
                }
            }
        }

        let statistic = if explained {
            f64::NAN
        } else {
            match CholeskyDecomp::new(&v) {
                Ok(chol) => chol.inv_quad_form(&self.u[..self.active]),
                Err(_) => f64::NAN,
            }
        };
        ScoreOutcome {
            statistic,
            df: q,
            pvalue: chi_square_sf(statistic, q),
        }
    }
}

/// Upper-tail chi-square probability; NaN for unusable input.
pub fn chi_square_sf(statistic: f64, df: usize) -> f64 {
    if !statistic.is_finite() || df == 0 {
        return f64::NAN;
    }
    match ChiSquared::new(df as f64) {
        Ok(dist) => dist.sf(statistic.max(0.0)),
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::null_model::tests::small_model;
    use crate::polr::fit::{FisherScoring, FitConfig, OrdinalFitter};

    fn column(n: usize, seed: usize) -> Vec<f64> {
        (0..n).map(|i| ((i * seed + 3) % 3) as f64).collect()
    }

    #[test]
    fn test_chi_square_sf() {
        assert!((chi_square_sf(3.841458820694124, 1) - 0.05).abs() < 1e-9);
        assert!((chi_square_sf(0.0, 2) - 1.0).abs() < 1e-12);
        assert!(chi_square_sf(f64::NAN, 1).is_nan());
    }

    #[test]
    fn test_pvalue_in_unit_interval() {
        let model = small_model();
        let mut ctx = model.score_context().unwrap();
        for seed in [5, 7, 11] {
            let z = column(60, seed);
            let out = ctx.test(&[&z[..]]);
            assert_eq!(out.df, 1);
            assert!(out.statistic >= 0.0);
            assert!((0.0..=1.0).contains(&out.pvalue));
        }
    }

    #[test]
    fn test_covariate_copy_is_explained() {
        let model = small_model();
        let mut ctx = model.score_context().unwrap();
        let x_col = model.x().col(0);
        let out = ctx.test(&[&x_col[..]]);
        assert!(out.statistic.is_nan());
        assert!(out.pvalue.is_nan());

        let z = column(60, 7);
        assert!(ctx.test(&[&z[..]]).pvalue.is_finite());
    }

    #[test]
    fn test_scratch_reuse_across_widths() {
        let model = small_model();
        let mut ctx = model.score_context().unwrap();
        let a = column(60, 5);
        let b = column(60, 13);
        let single_first = ctx.test(&[&a[..]]);
        let _wide = ctx.test(&[&a[..], &b[..]]);
        let single_again = ctx.test(&[&a[..]]);
        assert_eq!(single_first, single_again);
    }

    #[test]
    fn test_score_close_to_lrt_for_weak_effect() {
        let model = small_model();
        let mut ctx = model.score_context().unwrap();
        let z = column(60, 7);
        let score = ctx.test(&[&z[..]]);

        let xz = model.x().hcat(&DenseMatrix::from_col_major(60, 1, z.clone()));
        let fitter = FisherScoring::new(model.link, FitConfig::default());
        let alt = fitter
            .fit(&model.y, &xz, &model.weights, model.n_levels(), Some(&model.warm_start(1)))
            .unwrap();
        let lrt = (model.deviance - alt.deviance()).max(0.0);
        // Asymptotically equivalent; on 60 samples they agree loosely.
        assert!((score.statistic - lrt).abs() < 0.5 * (1.0 + lrt), "score {} lrt {}", score.statistic, lrt);
    }
}
