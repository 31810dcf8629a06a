//! Likelihood-ratio test by refitting with the candidate columns.
//!
//! The alternative model is the null design with Z appended, fitted from
//! the null estimates with zero genetic effects. The statistic is
//! null deviance minus alternative deviance, referred to chi-square(q).

use tracing::debug;

use ordgwas_linalg::dense::DenseMatrix;

use crate::model::null_model::FittedNullModel;
use crate::polr::fit::{FisherScoring, FitConfig, OrdinalFitter};

use super::ordinal::chi_square_sf;

/// Statistic, p-value and fitted genetic effects of one LRT.
#[derive(Debug, Clone, PartialEq)]
pub struct LrtOutcome {
    pub statistic: f64,
    pub df: usize,
    pub pvalue: f64,
    /// Coefficients of the appended columns, in column order.
    pub effects: Vec<f64>,
    pub converged: bool,
}

impl LrtOutcome {
    fn failed(q: usize) -> Self {
        Self {
            statistic: f64::NAN,
            df: q,
            pvalue: f64::NAN,
            effects: vec![f64::NAN; q],
            converged: false,
        }
    }
}

/// Refitting LRT bound to a null model.
pub struct LikelihoodRatioTest<'a> {
    model: &'a FittedNullModel,
    x: DenseMatrix,
    fitter: FisherScoring,
}

impl<'a> LikelihoodRatioTest<'a> {
    pub fn new(model: &'a FittedNullModel, config: FitConfig) -> Self {
        Self {
            model,
            x: model.x(),
            fitter: FisherScoring::new(model.link, config),
        }
    }

    /// Test the columns jointly. Each column has length n.
    ///
    /// A fit that fails or does not converge gives NaN statistic, p-value
    /// and effects.
    pub fn test(&self, columns: &[&[f64]]) -> LrtOutcome {
        let q = columns.len();
        let n = self.model.n_samples;
        let mut z = DenseMatrix::zeros(n, q);
        for (a, col) in columns.iter().enumerate() {
            z.set_col(a, col);
        }
        let xz = self.x.hcat(&z);
        let start = self.model.warm_start(q);

        let fit = match self.fitter.fit(
            &self.model.y,
            &xz,
            &self.model.weights,
            self.model.n_levels(),
            Some(&start),
        ) {
            Ok(fit) => fit,
            Err(e) => {
                debug!("LRT refit failed: {:#}", e);
                return LrtOutcome::failed(q);
            }
        };
        if !fit.converged {
            debug!("LRT refit did not converge after {} iterations", fit.iterations);
            return LrtOutcome::failed(q);
        }

        let statistic = (self.model.deviance - fit.deviance()).max(0.0);
        LrtOutcome {
            statistic,
            df: q,
            pvalue: chi_square_sf(statistic, q),
            effects: fit.betas[self.model.x_ncols..].to_vec(),
            converged: true,
        }
    }
}
