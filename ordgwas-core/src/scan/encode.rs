//! Genotype encoding and mean imputation.
//!
//! Raw hard calls (0/1/2 copies of the counted allele, NaN missing) are
//! folded under the genetic model; dosages are copied as they are.
//! Missing entries then take the mean of the observed entries of the
//! same column.

use std::str::FromStr;

use ordgwas_geno::traits::GenotypeBlock;

use super::error::ScanError;

/// How copy counts become a covariate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeneticModel {
    /// Copy count.
    #[default]
    Additive,
    /// 0 -> 0; 1, 2 -> 1.
    Dominant,
    /// 0, 1 -> 0; 2 -> 1.
    Recessive,
}

impl GeneticModel {
    pub fn name(&self) -> &'static str {
        match self {
            GeneticModel::Additive => "additive",
            GeneticModel::Dominant => "dominant",
            GeneticModel::Recessive => "recessive",
        }
    }

    /// Encode one observed hard call.
    #[inline]
    pub fn encode_call(&self, copies: f64) -> f64 {
        match self {
            GeneticModel::Additive => copies,
            GeneticModel::Dominant => {
                if copies >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            GeneticModel::Recessive => {
                if copies >= 1.5 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

impl FromStr for GeneticModel {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "additive" | "add" => Ok(GeneticModel::Additive),
            "dominant" | "dom" => Ok(GeneticModel::Dominant),
            "recessive" | "rec" => Ok(GeneticModel::Recessive),
            other => Err(ScanError::Configuration(format!(
                "unknown genetic model '{}' (expected additive, dominant or recessive)",
                other
            ))),
        }
    }
}

/// What encoding found in one column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnSummary {
    pub n_observed: usize,
    /// Mean of the observed encoded values (0 when none observed).
    pub mean: f64,
    /// Observed values are not all equal.
    pub informative: bool,
}

/// Encode `raw` into `out` and impute missing entries with the column mean.
pub fn encode_column(raw: &[f64], out: &mut [f64], model: GeneticModel, is_dosage: bool) -> ColumnSummary {
    debug_assert_eq!(raw.len(), out.len());
    let mut sum = 0.0;
    let mut n_observed = 0usize;
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for (o, &r) in out.iter_mut().zip(raw.iter()) {
        if r.is_nan() {
            *o = f64::NAN;
            continue;
        }
        let v = if is_dosage { r } else { model.encode_call(r) };
        *o = v;
        sum += v;
        n_observed += 1;
        lo = lo.min(v);
        hi = hi.max(v);
    }
    let mean = if n_observed > 0 { sum / n_observed as f64 } else { 0.0 };
    if n_observed < out.len() {
        for o in out.iter_mut().filter(|o| o.is_nan()) {
            *o = mean;
        }
    }
    ColumnSummary {
        n_observed,
        mean,
        informative: n_observed > 0 && lo < hi,
    }
}

/// Encoded columns for one test unit.
///
/// Storage only grows; `width` columns are live.
#[derive(Debug, Clone)]
pub struct EncodedBlock {
    n_samples: usize,
    width: usize,
    values: Vec<f64>,
    summaries: Vec<ColumnSummary>,
}

impl EncodedBlock {
    /// Buffer presized for units of up to `width` members.
    pub fn with_capacity(n_samples: usize, width: usize) -> Self {
        Self {
            n_samples,
            width: 0,
            values: vec![0.0; n_samples * width],
            summaries: Vec::with_capacity(width),
        }
    }

    /// Encode every live member of `block`.
    pub fn encode(&mut self, block: &GenotypeBlock, model: GeneticModel) {
        debug_assert_eq!(block.n_samples(), self.n_samples);
        let width = block.width();
        let needed = width * self.n_samples;
        if self.values.len() < needed {
            self.values.resize(needed, 0.0);
        }
        self.summaries.clear();
        let n = self.n_samples;
        for j in 0..width {
            let out = &mut self.values[j * n..(j + 1) * n];
            self.summaries
                .push(encode_column(block.column(j), out, model, block.is_dosage()));
        }
        self.width = width;
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn column(&self, j: usize) -> &[f64] {
        assert!(j < self.width, "column {} out of active width {}", j, self.width);
        &self.values[j * self.n_samples..(j + 1) * self.n_samples]
    }

    /// Positions of the informative columns.
    pub fn informative(&self) -> Vec<usize> {
        (0..self.width)
            .filter(|&j| self.summaries[j].informative)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genetic_model_coding() {
        let calls = [0.0, 1.0, 2.0];
        let enc = |m: GeneticModel| calls.iter().map(|&c| m.encode_call(c)).collect::<Vec<_>>();
        assert_eq!(enc(GeneticModel::Additive), vec![0.0, 1.0, 2.0]);
        assert_eq!(enc(GeneticModel::Dominant), vec![0.0, 1.0, 1.0]);
        assert_eq!(enc(GeneticModel::Recessive), vec![0.0, 0.0, 1.0]);
        assert_eq!("DOM".parse::<GeneticModel>().unwrap(), GeneticModel::Dominant);
        assert!("multiplicative".parse::<GeneticModel>().is_err());
    }

    #[test]
    fn test_mean_imputation_uses_observed_mean() {
        let raw = [0.0, f64::NAN, 2.0, 1.0, f64::NAN];
        let mut out = [0.0; 5];
        let s = encode_column(&raw, &mut out, GeneticModel::Additive, false);
        assert_eq!(s.n_observed, 3);
        assert!((s.mean - 1.0).abs() < 1e-12);
        assert_eq!(out, [0.0, 1.0, 2.0, 1.0, 1.0]);
        assert!(s.informative);

        // Imputation follows encoding: the recessive mean is 1/3.
        let s = encode_column(&raw, &mut out, GeneticModel::Recessive, false);
        assert!((out[1] - 1.0 / 3.0).abs() < 1e-12);
        assert!(s.informative);
    }

    #[test]
    fn test_dosage_is_not_remapped() {
        let raw = [0.2, 1.7, f64::NAN];
        let mut out = [0.0; 3];
        let s = encode_column(&raw, &mut out, GeneticModel::Recessive, true);
        assert_eq!(&out[..2], &[0.2, 1.7]);
        assert!((out[2] - 0.95).abs() < 1e-12);
        assert!(s.informative);
    }

    #[test]
    fn test_constant_columns_are_not_informative() {
        let mut out = [0.0; 4];
        assert!(!encode_column(&[0.0, 0.0, f64::NAN, 0.0], &mut out, GeneticModel::Additive, false).informative);
        // Polymorphic, but constant once folded.
        assert!(!encode_column(&[1.0, 2.0, 1.0, 2.0], &mut out, GeneticModel::Dominant, false).informative);
        let s = encode_column(&[f64::NAN; 4], &mut out, GeneticModel::Additive, false);
        assert!(!s.informative);
        assert_eq!(out, [0.0; 4]);
    }

    #[test]
    fn test_encoded_block_tracks_width() {
        let mut block = GenotypeBlock::new(3);
        block.reset(2);
        block.column_mut(0).copy_from_slice(&[0.0, 1.0, 2.0]);
        block.column_mut(1).copy_from_slice(&[1.0, 1.0, 1.0]);
        let mut enc = EncodedBlock::with_capacity(3, 1);
        enc.encode(&block, GeneticModel::Additive);
        assert_eq!(enc.width(), 2);
        assert_eq!(enc.informative(), vec![0]);

        block.reset(1);
        block.column_mut(0).copy_from_slice(&[2.0, f64::NAN, 0.0]);
        enc.encode(&block, GeneticModel::Additive);
        assert_eq!(enc.width(), 1);
        assert_eq!(enc.column(0), &[2.0, 1.0, 0.0]);
    }
}
