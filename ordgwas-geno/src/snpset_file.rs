//! SNP-set mapping file parser.
//!
//! One line per variant, in the genotype source's variant order:
//! ```text
//! # set_id  variant_id
//! GENE1 rs1
//! GENE1 rs2
//! GENE2 rs3
//! GENE1 rs4
//! ```
//! Members of a set need not be contiguous. Sets are reported in order
//! of first appearance.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// A named set and the variant indices (mapping row numbers) it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnpSet {
    pub name: String,
    pub members: Vec<usize>,
}

/// Parsed (set id, variant id) rows.
#[derive(Debug, Clone, Default)]
pub struct SnpSetMapping {
    set_ids: Vec<String>,
    variant_ids: Vec<String>,
}

impl SnpSetMapping {
    /// Parse a whitespace-delimited mapping file.
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snp-set file: {}", path.display()))?;

        let mut mapping = SnpSetMapping::default();
        for (line_num, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 2 {
                bail!(
                    "{} line {}: expected 'set_id variant_id'",
                    path.display(),
                    line_num + 1
                );
            }
            mapping.set_ids.push(fields[0].to_string());
            mapping.variant_ids.push(fields[1].to_string());
        }
        Ok(mapping)
    }

    pub fn from_pairs<S: AsRef<str>, V: AsRef<str>>(pairs: &[(S, V)]) -> Self {
        Self {
            set_ids: pairs.iter().map(|(s, _)| s.as_ref().to_string()).collect(),
            variant_ids: pairs.iter().map(|(_, v)| v.as_ref().to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.variant_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variant_ids.is_empty()
    }

    pub fn variant_ids(&self) -> &[String] {
        &self.variant_ids
    }

    /// Describe the first disagreement with the source's variant order.
    ///
    /// Returns `None` when the variant-id column equals `source_ids`
    /// element for element.
    pub fn order_mismatch(&self, source_ids: &[String]) -> Option<String> {
        if let Some((row, (mapped, actual))) = self
            .variant_ids
            .iter()
            .zip(source_ids.iter())
            .enumerate()
            .find(|(_, (m, a))| m != a)
        {
            return Some(format!(
                "row {} maps '{}' but variant {} of the genotype file is '{}'",
                row + 1,
                mapped,
                row + 1,
                actual
            ));
        }
        if self.variant_ids.len() != source_ids.len() {
            return Some(format!(
                "mapping lists {} variants, genotype file has {}",
                self.variant_ids.len(),
                source_ids.len()
            ));
        }
        None
    }

    /// Group rows by set id, in order of first appearance.
    pub fn sets(&self) -> Vec<SnpSet> {
        let mut order: HashMap<&str, usize> = HashMap::new();
        let mut sets: Vec<SnpSet> = Vec::new();
        for (row, set_id) in self.set_ids.iter().enumerate() {
            let slot = *order.entry(set_id.as_str()).or_insert_with(|| {
                sets.push(SnpSet {
                    name: set_id.clone(),
                    members: Vec::new(),
                });
                sets.len() - 1
            });
            sets[slot].members.push(row);
        }
        sets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_mapping_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sets.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "# set variant").unwrap();
        writeln!(f, "GENE1 rs1").unwrap();
        writeln!(f, "GENE2\trs2").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "GENE1   rs3").unwrap();

        let m = SnpSetMapping::parse(&path).unwrap();
        assert_eq!(m.len(), 3);
        let sets = m.sets();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].name, "GENE1");
        assert_eq!(sets[0].members, vec![0, 2]);
        assert_eq!(sets[1].members, vec![1]);
    }

    #[test]
    fn test_parse_rejects_short_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sets.txt");
        std::fs::write(&path, "GENE1\n").unwrap();
        assert!(SnpSetMapping::parse(&path).is_err());
    }

    #[test]
    fn test_order_mismatch() {
        let m = SnpSetMapping::from_pairs(&[("A", "rs1"), ("A", "rs2"), ("B", "rs3")]);
        assert!(m.order_mismatch(&ids(&["rs1", "rs2", "rs3"])).is_none());

        let swapped = m.order_mismatch(&ids(&["rs2", "rs1", "rs3"])).unwrap();
        assert!(swapped.contains("row 1"));

        assert!(m.order_mismatch(&ids(&["rs1", "rs2"])).is_some());
        assert!(m.order_mismatch(&ids(&["rs1", "rs2", "rs3", "rs4"])).is_some());
    }
}
