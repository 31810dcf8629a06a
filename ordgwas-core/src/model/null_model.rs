//! FittedNullModel: the fitted proportional-odds null model, used as
//! read-only input for every test unit of a scan.
//!
//! Holds the design matrix, the coded response, link, weights, fitted
//! thresholds and coefficients, and the deviance. The score-test helper
//! is bound to it through [`FittedNullModel::score_context`].

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ordgwas_linalg::dense::DenseMatrix;

use crate::polr::fit::{FisherScoring, FitConfig, OrdinalFitter, PolrStart};
use crate::polr::link::LinkKind;
use crate::scan::error::ScanError;
use crate::score_test::ordinal::ScoreTestContext;

/// The fitted null model, serialized to .ordgwas.model files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedNullModel {
    /// Magic bytes for validation.
    pub magic: [u8; 4],
    /// Version number for forward compatibility.
    pub version: u32,
    pub link: LinkKind,
    /// Sample IDs in model order.
    pub sample_ids: Vec<String>,
    pub n_samples: usize,
    /// Response as levels 1..=n_levels.
    pub y: Vec<usize>,
    /// Original response value of each level, ascending.
    pub levels: Vec<f64>,
    /// Design matrix X as flat col-major vector (n x p), no intercept.
    pub x_flat: Vec<f64>,
    /// Number of columns in X.
    pub x_ncols: usize,
    pub covariate_names: Vec<String>,
    /// Per-sample weights (all 1 when none were given).
    pub weights: Vec<f64>,
    /// Thresholds theta_1 < ... < theta_{K-1}.
    pub thetas: Vec<f64>,
    /// Covariate coefficients.
    pub betas: Vec<f64>,
    pub loglik: f64,
    /// -2 * loglik.
    pub deviance: f64,
    pub converged: bool,
    pub iterations: usize,
}

impl FittedNullModel {
    /// Magic bytes: "ORDM" (ORDinal Model).
    pub const MAGIC: [u8; 4] = [b'O', b'R', b'D', b'M'];
    /// Current model version.
    pub const VERSION: u32 = 1;

    /// Fit the null model.
    ///
    /// `response` holds raw values; the distinct values, sorted, become
    /// levels 1..=K. `x_flat` is column-major n x p without an intercept.
    #[allow(clippy::too_many_arguments)]
    pub fn fit(
        sample_ids: Vec<String>,
        response: &[f64],
        x_flat: Vec<f64>,
        x_ncols: usize,
        covariate_names: Vec<String>,
        weights: Option<Vec<f64>>,
        link: LinkKind,
        config: &FitConfig,
    ) -> Result<Self> {
        let n = response.len();
        if sample_ids.len() != n || x_flat.len() != n * x_ncols {
            return Err(ScanError::Configuration(format!(
                "null model inputs disagree: {} responses, {} sample IDs, {} design values for {} columns",
                n,
                sample_ids.len(),
                x_flat.len(),
                x_ncols
            ))
            .into());
        }
        let weights = weights.unwrap_or_else(|| vec![1.0; n]);
        if weights.len() != n {
            return Err(ScanError::Configuration(format!(
                "{} weights for {} samples",
                weights.len(),
                n
            ))
            .into());
        }
        let (y, levels) = code_levels(response)?;

        let x = DenseMatrix::from_col_major(n, x_ncols, x_flat.clone());
        let fitter = FisherScoring::new(link, config.clone());
        let fit = fitter.fit(&y, &x, &weights, levels.len(), None)?;
        if fit.converged {
            info!(
                "Null model converged in {} iterations: loglik = {:.6}",
                fit.iterations, fit.loglik
            );
        } else {
            warn!(
                "Null model did not converge after {} iterations (loglik = {:.6})",
                fit.iterations, fit.loglik
            );
        }

        Ok(Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            link,
            n_samples: n,
            sample_ids,
            y,
            levels,
            x_flat,
            x_ncols,
            covariate_names,
            weights,
            deviance: fit.deviance(),
            loglik: fit.loglik,
            thetas: fit.thetas,
            betas: fit.betas,
            converged: fit.converged,
            iterations: fit.iterations,
        })
    }

    /// Number of response levels K.
    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    /// Design matrix X (n x p).
    pub fn x(&self) -> DenseMatrix {
        DenseMatrix::from_col_major(self.n_samples, self.x_ncols, self.x_flat.clone())
    }

    /// Fitted parameters as a warm start, with `extra` zero coefficients
    /// appended for additional columns.
    pub fn warm_start(&self, extra: usize) -> PolrStart {
        let mut betas = self.betas.clone();
        betas.resize(self.betas.len() + extra, 0.0);
        PolrStart {
            thetas: self.thetas.clone(),
            betas,
        }
    }

    /// Score-test helper bound to this fit.
    pub fn score_context(&self) -> Result<ScoreTestContext> {
        ScoreTestContext::new(self)
    }
}

/// Map raw response values to levels 1..=K by ascending distinct value.
fn code_levels(response: &[f64]) -> Result<(Vec<usize>, Vec<f64>)> {
    if let Some(bad) = response.iter().find(|v| !v.is_finite()) {
        return Err(ScanError::Configuration(format!(
            "response contains a non-finite value ({})",
            bad
        ))
        .into());
    }
    let mut levels: Vec<f64> = response.to_vec();
    levels.sort_by(|a, b| a.total_cmp(b));
    levels.dedup();
    if levels.len() < 2 {
        return Err(ScanError::Configuration(format!(
            "an ordinal response needs at least 2 distinct values, found {}",
            levels.len()
        ))
        .into());
    }
    let y = response
        .iter()
        .map(|v| levels.partition_point(|l| l < v) + 1)
        .collect();
    Ok((y, levels))
}
