//! In-memory copy of a whole source.
//!
//! Grouping strategies that pick members out of file order cannot run
//! against a forward-only stream, so the stream is read once into memory
//! and served back with random access.

use anyhow::{bail, Result};
use tracing::info;

use crate::traits::{AccessPattern, ClassCounts, GenotypeBlock, VariantInfo, VariantSource};

/// Random-access source over values read into memory.
pub struct MaterializedSource {
    n_samples: usize,
    sample_ids: Vec<String>,
    /// Column-major, one column per variant over the selected samples.
    values: Vec<f64>,
    infos: Vec<VariantInfo>,
    counts: Vec<Option<ClassCounts>>,
    is_dosage: bool,
    records_consumed: usize,
}

/// Variants read per block while materializing.
const FILL_BLOCK: usize = 256;

impl MaterializedSource {
    /// Read every variant of `source` (over its current sample selection).
    ///
    /// The source is left fully consumed.
    pub fn from_source<S: VariantSource + ?Sized>(source: &mut S) -> Result<Self> {
        let n_samples = source.n_samples();
        let n_variants = source.n_variants();
        let mut values = Vec::with_capacity(n_samples * n_variants);
        let mut infos = Vec::with_capacity(n_variants);
        let mut counts = Vec::with_capacity(n_variants);
        let mut block = GenotypeBlock::new(n_samples);

        let mut start = 0;
        while start < n_variants {
            let end = (start + FILL_BLOCK).min(n_variants);
            let indices: Vec<usize> = (start..end).collect();
            source.read_block(&indices, &mut block)?;
            for j in 0..block.width() {
                values.extend_from_slice(block.column(j));
                infos.push(block.info(j).clone());
                counts.push(block.counts(j).copied());
            }
            start = end;
        }
        source.drain()?;

        info!(
            "Materialized {} variants x {} samples in memory",
            n_variants, n_samples
        );

        Ok(Self {
            n_samples,
            sample_ids: source.sample_ids().to_vec(),
            values,
            infos,
            counts,
            is_dosage: source.is_dosage(),
            records_consumed: source.records_consumed(),
        })
    }

    /// Records the wrapped source read while materializing.
    pub fn source_records_consumed(&self) -> usize {
        self.records_consumed
    }
}

impl VariantSource for MaterializedSource {
    fn n_variants(&self) -> usize {
        self.infos.len()
    }

    fn n_samples_total(&self) -> usize {
        self.n_samples
    }

    fn n_samples(&self) -> usize {
        self.n_samples
    }

    fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    fn select_samples(&mut self, indices: &[usize]) -> Result<()> {
        if indices.iter().enumerate().all(|(i, &s)| i == s) && indices.len() == self.n_samples {
            return Ok(());
        }
        bail!("Sample selection must be applied before materializing")
    }

    fn access_pattern(&self) -> AccessPattern {
        AccessPattern::RandomAccess
    }

    fn is_dosage(&self) -> bool {
        self.is_dosage
    }

    fn variant_info(&self, index: usize) -> Option<&VariantInfo> {
        self.infos.get(index)
    }

    fn read_block(&mut self, indices: &[usize], block: &mut GenotypeBlock) -> Result<()> {
        if block.n_samples() != self.n_samples {
            bail!(
                "Block sized for {} samples, source has {}",
                block.n_samples(),
                self.n_samples
            );
        }
        block.reset(indices.len());
        block.set_dosage(self.is_dosage);
        let n = self.n_samples;
        for (j, &index) in indices.iter().enumerate() {
            if index >= self.infos.len() {
                bail!("Variant index {} out of range ({})", index, self.infos.len());
            }
            block
                .column_mut(j)
                .copy_from_slice(&self.values[index * n..(index + 1) * n]);
            block.set_member(j, self.infos[index].clone(), self.counts[index]);
        }
        Ok(())
    }

    fn records_consumed(&self) -> usize {
        self.records_consumed
    }

    fn drain(&mut self) -> Result<usize> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcf::{VcfDataKind, VcfSource};

    #[test]
    fn test_materialize_vcf_allows_random_access() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.vcf");
        std::fs::write(
            &path,
            "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tA\tB\n\
             1\t10\tv1\tA\tG\t.\t.\t.\tGT\t0/0\t0/1\n\
             1\t20\tv2\tA\tG\t.\t.\t.\tGT\t1/1\t0/1\n\
             1\t30\tv3\tA\tG\t.\t.\t.\tGT\t0/1\t./.\n",
        )
        .unwrap();
        let mut vcf = VcfSource::open(&path, VcfDataKind::Genotype).unwrap();
        vcf.select_samples(&[1]).unwrap();
        let mut mat = MaterializedSource::from_source(&mut vcf).unwrap();

        assert_eq!(vcf.records_consumed(), 3);
        assert_eq!(mat.source_records_consumed(), 3);
        assert_eq!(mat.access_pattern(), AccessPattern::RandomAccess);
        assert_eq!(mat.sample_ids(), &["B"]);
        assert_eq!(mat.variant_info(2).unwrap().id, "v3");

        let mut block = GenotypeBlock::new(1);
        mat.read_block(&[2, 0], &mut block).unwrap();
        assert!(block.column(0)[0].is_nan());
        assert_eq!(block.column(1), &[1.0]);
        assert_eq!(block.counts(1).unwrap().het, 1);
    }
}
