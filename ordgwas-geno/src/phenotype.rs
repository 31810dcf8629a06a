//! Covariate table parser for null-model fitting.
//!
//! Reads a delimited file with a header row (tab, comma, or whitespace
//! separated). One column holds the ordinal response, others hold
//! covariates, and an optional column holds per-sample weights.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};

/// Columns pulled from a covariate file, in file row order.
#[derive(Debug, Clone)]
pub struct CovariateTable {
    pub sample_ids: Vec<String>,
    /// Response values (NaN for missing).
    pub response: Vec<f64>,
    /// covariates[i][j] = sample i, covariate j.
    pub covariates: Vec<Vec<f64>>,
    pub covariate_names: Vec<String>,
    pub weights: Option<Vec<f64>>,
}

/// Which columns to read.
#[derive(Debug, Clone)]
pub struct CovariateColumns<'a> {
    pub sample_id: &'a str,
    pub response: &'a str,
    pub covariates: &'a [String],
    pub weights: Option<&'a str>,
}

fn detect_delimiter(header: &str) -> Option<char> {
    if header.contains('\t') {
        Some('\t')
    } else if header.contains(',') {
        Some(',')
    } else {
        None
    }
}

fn split_fields(line: &str, delim: Option<char>) -> Vec<&str> {
    match delim {
        Some(d) => line.split(d).map(|s| s.trim()).collect(),
        None => line.split_whitespace().collect(),
    }
}

/// Parse a string value to f64, treating NA/missing as NaN.
fn parse_value(s: &str) -> f64 {
    match s {
        "NA" | "na" | "Na" | "." | "" | "-" | "NaN" | "nan" => f64::NAN,
        _ => s.parse().unwrap_or(f64::NAN),
    }
}

impl CovariateTable {
    pub fn parse(path: &Path, columns: &CovariateColumns<'_>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read covariate file: {}", path.display()))?;

        let mut lines = contents.lines().filter(|l| !l.trim().is_empty());
        let header_line = lines
            .next()
            .ok_or_else(|| anyhow!("Empty covariate file: {}", path.display()))?;
        let delim = detect_delimiter(header_line);
        let headers = split_fields(header_line, delim);

        let find = |name: &str, what: &str| {
            headers
                .iter()
                .position(|&h| h == name)
                .ok_or_else(|| anyhow!("{} column '{}' not found in header", what, name))
        };
        let id_idx = find(columns.sample_id, "Sample ID")?;
        let response_idx = find(columns.response, "Response")?;
        let covar_indices = columns
            .covariates
            .iter()
            .map(|name| find(name, "Covariate"))
            .collect::<Result<Vec<_>>>()?;
        let weight_idx = columns.weights.map(|w| find(w, "Weights")).transpose()?;

        let mut table = CovariateTable {
            sample_ids: Vec::new(),
            response: Vec::new(),
            covariates: Vec::new(),
            covariate_names: columns.covariates.to_vec(),
            weights: weight_idx.map(|_| Vec::new()),
        };

        for (line_num, line) in lines.enumerate() {
            let fields = split_fields(line, delim);
            if fields.len() != headers.len() {
                bail!(
                    "Line {} has {} fields, header has {}",
                    line_num + 2,
                    fields.len(),
                    headers.len()
                );
            }
            table.sample_ids.push(fields[id_idx].to_string());
            table.response.push(parse_value(fields[response_idx]));
            table
                .covariates
                .push(covar_indices.iter().map(|&ci| parse_value(fields[ci])).collect());
            if let (Some(wi), Some(w)) = (weight_idx, table.weights.as_mut()) {
                w.push(parse_value(fields[wi]));
            }
        }
        Ok(table)
    }

    pub fn n_rows(&self) -> usize {
        self.sample_ids.len()
    }

    /// Rows with a response, every covariate, and (if present) a positive
    /// weight.
    pub fn complete_rows(&self) -> Vec<usize> {
        (0..self.n_rows())
            .filter(|&i| {
                !self.response[i].is_nan()
                    && self.covariates[i].iter().all(|v| !v.is_nan())
                    && self
                        .weights
                        .as_ref()
                        .map_or(true, |w| w[i].is_finite() && w[i] > 0.0)
            })
            .collect()
    }

    /// Covariate matrix for `rows`, flat column-major, without an
    /// intercept column (the thresholds play that role).
    pub fn design_matrix(&self, rows: &[usize]) -> (Vec<f64>, usize, usize) {
        let n = rows.len();
        let p = self.covariate_names.len();
        let mut x = vec![0.0; n * p];
        for j in 0..p {
            for (r, &i) in rows.iter().enumerate() {
                x[j * n + r] = self.covariates[i][j];
            }
        }
        (x, n, p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("1.5"), 1.5);
        assert!(parse_value("NA").is_nan());
        assert!(parse_value(".").is_nan());
        assert!(parse_value("").is_nan());
    }

    #[test]
    fn test_parse_tab_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cov.tsv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "IID\ty\tage\tsex").unwrap();
        writeln!(f, "S1\t1\t45\t1").unwrap();
        writeln!(f, "S2\t3\t50\t2").unwrap();
        writeln!(f, "S3\tNA\t55\t1").unwrap();

        let covars = vec!["age".to_string(), "sex".to_string()];
        let cols = CovariateColumns {
            sample_id: "IID",
            response: "y",
            covariates: &covars,
            weights: None,
        };
        let t = CovariateTable::parse(&path, &cols).unwrap();
        assert_eq!(t.sample_ids, vec!["S1", "S2", "S3"]);
        assert_eq!(t.response[1], 3.0);
        assert_eq!(t.covariates[0], vec![45.0, 1.0]);
        assert_eq!(t.complete_rows(), vec![0, 1]);

        let (x, n, p) = t.design_matrix(&[0, 1]);
        assert_eq!((n, p), (2, 2));
        assert_eq!(x, vec![45.0, 50.0, 1.0, 2.0]);
    }

    #[test]
    fn test_parse_csv_with_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cov.csv");
        std::fs::write(&path, "id,grade,w\nA,1,1.0\nB,2,0\nC,2,2.5\n").unwrap();
        let cols = CovariateColumns {
            sample_id: "id",
            response: "grade",
            covariates: &[],
            weights: Some("w"),
        };
        let t = CovariateTable::parse(&path, &cols).unwrap();
        assert_eq!(t.weights.as_deref(), Some(&[1.0, 0.0, 2.5][..]));
        // Zero weight drops the row.
        assert_eq!(t.complete_rows(), vec![0, 2]);
    }

    #[test]
    fn test_missing_column_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cov.txt");
        std::fs::write(&path, "IID y\nS1 1\n").unwrap();
        let covars = vec!["age".to_string()];
        let cols = CovariateColumns {
            sample_id: "IID",
            response: "y",
            covariates: &covars,
            weights: None,
        };
        let err = CovariateTable::parse(&path, &cols).unwrap_err();
        assert!(err.to_string().contains("age"));
    }
}
