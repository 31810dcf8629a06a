//! Sample and variant selectors.
//!
//! A selector is either everything, a boolean mask over the dimension, or
//! a list of indices. Selector files hold one value per line; index files
//! are 1-based.

use std::path::Path;

use anyhow::{bail, Context, Result};

/// Which rows (samples) or columns (variants) to keep.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    Mask(Vec<bool>),
    /// 0-based indices.
    Indices(Vec<usize>),
}

impl Selection {
    /// Build an index selection from 1-based positions.
    pub fn from_one_based(positions: &[usize]) -> Result<Self> {
        let indices = positions
            .iter()
            .map(|&p| {
                p.checked_sub(1)
                    .with_context(|| "Indices are 1-based; 0 is not a valid index".to_string())
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Selection::Indices(indices))
    }

    /// Resolve to sorted, unique, in-range 0-based indices over `len` items.
    pub fn resolve(&self, len: usize) -> Result<Vec<usize>> {
        match self {
            Selection::All => Ok((0..len).collect()),
            Selection::Mask(mask) => {
                if mask.len() != len {
                    bail!("Mask has {} entries, expected {}", mask.len(), len);
                }
                Ok(mask
                    .iter()
                    .enumerate()
                    .filter(|(_, &keep)| keep)
                    .map(|(i, _)| i)
                    .collect())
            }
            Selection::Indices(indices) => {
                if let Some(&bad) = indices.iter().find(|&&i| i >= len) {
                    bail!("Index {} out of range (1..={})", bad + 1, len);
                }
                let mut sorted = indices.clone();
                sorted.sort_unstable();
                sorted.dedup();
                Ok(sorted)
            }
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }
}

fn selector_lines(path: &Path) -> Result<Vec<(usize, String)>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read selector file: {}", path.display()))?;
    Ok(contents
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim().to_string()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'))
        .collect())
}

/// Read a mask file: one `0`/`1`/`true`/`false` per line.
pub fn read_mask_file(path: &Path) -> Result<Selection> {
    let mut mask = Vec::new();
    for (line_num, value) in selector_lines(path)? {
        let keep = match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "t" => true,
            "0" | "false" | "f" => false,
            other => bail!(
                "{} line {}: expected a boolean, got '{}'",
                path.display(),
                line_num,
                other
            ),
        };
        mask.push(keep);
    }
    Ok(Selection::Mask(mask))
}

/// Read an index file: one 1-based index per line.
pub fn read_index_file(path: &Path) -> Result<Selection> {
    let mut positions = Vec::new();
    for (line_num, value) in selector_lines(path)? {
        let p: usize = value.parse().with_context(|| {
            format!("{} line {}: bad index '{}'", path.display(), line_num, value)
        })?;
        positions.push(p);
    }
    Selection::from_one_based(&positions)
}
