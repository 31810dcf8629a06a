//! Core traits and buffers for reading variants.

use anyhow::Result;

/// Identity of a genetic variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantInfo {
    /// Chromosome (e.g. "1", "22", "X").
    pub chrom: String,
    /// Position in base pairs.
    pub pos: u64,
    /// Variant ID (e.g. rsID, or `chrom:pos` when the file has none).
    pub id: String,
    /// Reference allele.
    pub ref_allele: String,
    /// Counted allele (ALT for VCF, allele 1 for PLINK).
    pub alt_allele: String,
}

/// Hard-call genotype class counts over the selected samples.
///
/// "alt" is the counted allele: allele 1 for PLINK, ALT for VCF.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassCounts {
    pub hom_alt: u64,
    pub het: u64,
    pub hom_ref: u64,
    pub missing: u64,
}

impl ClassCounts {
    /// Tally hard calls (0, 1, 2 copies; NaN missing).
    ///
    /// Non-integer values are rounded to the nearest class.
    pub fn from_calls(values: &[f64]) -> Self {
        let mut counts = ClassCounts::default();
        for &v in values {
            if v.is_nan() {
                counts.missing += 1;
            } else if v < 0.5 {
                counts.hom_ref += 1;
            } else if v < 1.5 {
                counts.het += 1;
            } else {
                counts.hom_alt += 1;
            }
        }
        counts
    }

    /// Number of non-missing calls.
    pub fn n_observed(&self) -> u64 {
        self.hom_alt + self.het + self.hom_ref
    }

    /// Frequency of the counted allele among observed calls.
    pub fn alt_freq(&self) -> f64 {
        let n = self.n_observed();
        if n == 0 {
            return 0.0;
        }
        (2 * self.hom_alt + self.het) as f64 / (2 * n) as f64
    }

    /// Minor allele frequency.
    pub fn maf(&self) -> f64 {
        let af = self.alt_freq();
        af.min(1.0 - af)
    }
}

/// Reusable buffer holding raw values for one block of variants.
///
/// Values are stored column-major, one column of length `n_samples` per
/// member, in a buffer that only grows. `width` is the number of columns
/// that are live for the current block; anything past it is stale.
#[derive(Debug, Clone)]
pub struct GenotypeBlock {
    n_samples: usize,
    width: usize,
    values: Vec<f64>,
    infos: Vec<VariantInfo>,
    counts: Vec<Option<ClassCounts>>,
    is_dosage: bool,
}

impl GenotypeBlock {
    pub fn new(n_samples: usize) -> Self {
        Self {
            n_samples,
            width: 0,
            values: Vec::new(),
            infos: Vec::new(),
            counts: Vec::new(),
            is_dosage: false,
        }
    }

    /// Prepare the block for `width` members, growing storage if needed.
    pub fn reset(&mut self, width: usize) {
        let needed = width * self.n_samples;
        if self.values.len() < needed {
            self.values.resize(needed, f64::NAN);
        }
        if self.infos.len() < width {
            self.infos.resize(width, VariantInfo::default());
            self.counts.resize(width, None);
        }
        self.width = width;
    }

    /// Number of live members.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Largest width this buffer has been sized for.
    pub fn capacity(&self) -> usize {
        self.infos.len()
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Whether the values are dosages (true) or hard-call copy counts.
    pub fn is_dosage(&self) -> bool {
        self.is_dosage
    }

    pub fn set_dosage(&mut self, is_dosage: bool) {
        self.is_dosage = is_dosage;
    }

    /// Raw values of member `j` (NaN = missing).
    pub fn column(&self, j: usize) -> &[f64] {
        assert!(j < self.width, "column {} out of active width {}", j, self.width);
        &self.values[j * self.n_samples..(j + 1) * self.n_samples]
    }

    pub fn column_mut(&mut self, j: usize) -> &mut [f64] {
        assert!(j < self.width, "column {} out of active width {}", j, self.width);
        &mut self.values[j * self.n_samples..(j + 1) * self.n_samples]
    }

    pub fn info(&self, j: usize) -> &VariantInfo {
        &self.infos[j]
    }

    pub fn counts(&self, j: usize) -> Option<&ClassCounts> {
        self.counts[j].as_ref()
    }

    /// Record metadata for member `j`.
    pub fn set_member(&mut self, j: usize, info: VariantInfo, counts: Option<ClassCounts>) {
        self.infos[j] = info;
        self.counts[j] = counts;
    }
}

/// How a source can be traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPattern {
    /// Any index list, in any order.
    RandomAccess,
    /// Forward only: every record is read exactly once, in file order.
    Sequential,
}

/// Uniform access to a genotype backend.
///
/// Grouping and testing code depends only on this trait. Random-access
/// sources accept any index list; sequential sources require ascending
/// indices at or past the cursor and read (without returning) every
/// record skipped on the way, so the stream stays aligned with the
/// variant index space.
pub trait VariantSource {
    /// Total number of variants (records) in the source.
    fn n_variants(&self) -> usize;

    /// Number of samples in the file, before selection.
    fn n_samples_total(&self) -> usize;

    /// Number of samples after selection.
    fn n_samples(&self) -> usize;

    /// Sample IDs after selection.
    fn sample_ids(&self) -> &[String];

    /// Restrict subsequent reads to these sample indices (file order).
    fn select_samples(&mut self, indices: &[usize]) -> Result<()>;

    fn access_pattern(&self) -> AccessPattern;

    /// Whether values are dosages rather than hard calls.
    fn is_dosage(&self) -> bool;

    /// Metadata for a variant without reading genotypes.
    ///
    /// Sequential sources return `None`: metadata is only known once the
    /// record has been read.
    fn variant_info(&self, index: usize) -> Option<&VariantInfo>;

    /// Read the listed variants into `block` (member `j` <- `indices[j]`).
    fn read_block(&mut self, indices: &[usize], block: &mut GenotypeBlock) -> Result<()>;

    /// Records read from the underlying file so far.
    fn records_consumed(&self) -> usize;

    /// Read and discard every remaining record. Returns how many were read.
    fn drain(&mut self) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_counts_from_calls() {
        let c = ClassCounts::from_calls(&[0.0, 1.0, 2.0, f64::NAN, 2.0, 0.0]);
        assert_eq!(c.hom_ref, 2);
        assert_eq!(c.het, 1);
        assert_eq!(c.hom_alt, 2);
        assert_eq!(c.missing, 1);
        assert_eq!(c.n_observed(), 5);
        // (2*2 + 1) / 10
        assert!((c.alt_freq() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_maf_folds() {
        let c = ClassCounts {
            hom_alt: 8,
            het: 2,
            hom_ref: 0,
            missing: 0,
        };
        assert!((c.alt_freq() - 0.9).abs() < 1e-12);
        assert!((c.maf() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_all_missing_is_monomorphic() {
        let c = ClassCounts::from_calls(&[f64::NAN, f64::NAN]);
        assert_eq!(c.maf(), 0.0);
    }

    #[test]
    fn test_block_reuse_tracks_active_width() {
        let mut block = GenotypeBlock::new(3);
        block.reset(4);
        assert_eq!(block.width(), 4);
        block.column_mut(3).copy_from_slice(&[1.0, 2.0, 0.0]);
        block.reset(2);
        assert_eq!(block.width(), 2);
        assert_eq!(block.capacity(), 4);
        block.column_mut(1).copy_from_slice(&[0.0, 0.0, 1.0]);
        assert_eq!(block.column(1), &[0.0, 0.0, 1.0]);
    }

    #[test]
    #[should_panic]
    fn test_block_rejects_stale_column() {
        let mut block = GenotypeBlock::new(2);
        block.reset(3);
        block.reset(1);
        let _ = block.column(2);
    }
}
