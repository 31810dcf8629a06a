//! PLINK bed/bim/fam source using memory-mapped files.
//!
//! PLINK binary format consists of three files:
//! - .bed: Binary genotype data (2 bits per genotype, packed)
//! - .bim: Variant information (chrom, id, cm, pos, a1, a2)
//! - .fam: Sample information (fid, iid, father, mother, sex, pheno)
//!
//! Each of the three may carry one of the supported compression
//! suffixes. A plain .bed is memory-mapped; a compressed one is
//! decompressed into memory once at open.
//!
//! Reference: https://www.cog-genomics.org/plink/1.9/formats#bed

use std::io::BufRead;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use memmap2::Mmap;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::compression::{self, Compression};
use crate::traits::{AccessPattern, ClassCounts, GenotypeBlock, VariantInfo, VariantSource};

/// Raw .bed bytes, mapped or decompressed.
enum BedBytes {
    Mapped(Mmap),
    Buffered(Vec<u8>),
}

impl Deref for BedBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            BedBytes::Mapped(m) => m,
            BedBytes::Buffered(v) => v,
        }
    }
}

/// Random-access source over a PLINK binary fileset.
///
/// Genotype values are copies of allele 1 (0, 1, 2; NaN missing).
/// Class counts for every variant are computed over the selected
/// samples whenever the selection changes, so MAF and HWE are
/// available without a separate pass.
pub struct PlinkSource {
    bed: BedBytes,
    variants: Vec<VariantInfo>,
    fam_ids: Vec<String>,
    bytes_per_variant: usize,
    sample_ids: Vec<String>,
    /// Selected sample indices (None = all samples).
    sample_subset: Option<Vec<usize>>,
    counts: Vec<ClassCounts>,
    reads: usize,
}

fn companion(prefix: &Path, ext: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_os_string();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

impl PlinkSource {
    /// Open a fileset from its prefix (with or without a trailing `.bed`).
    ///
    /// All three companion files are located before anything is parsed.
    pub fn open<P: AsRef<Path>>(prefix: P) -> Result<Self> {
        let prefix = prefix.as_ref();
        let prefix = match prefix.to_str().and_then(|s| s.strip_suffix(".bed")) {
            Some(stripped) => PathBuf::from(stripped),
            None => prefix.to_path_buf(),
        };

        let (bed_path, bed_c) = compression::resolve(&companion(&prefix, "bed"))?;
        let (bim_path, bim_c) = compression::resolve(&companion(&prefix, "bim"))?;
        let (fam_path, fam_c) = compression::resolve(&companion(&prefix, "fam"))?;

        let fam_ids = Self::parse_fam(&fam_path, fam_c)?;
        let variants = Self::parse_bim(&bim_path, bim_c)?;
        let n_samples = fam_ids.len();

        let bed = match bed_c {
            Compression::None => {
                let bed_file = std::fs::File::open(&bed_path)
                    .with_context(|| format!("Failed to open bed file: {}", bed_path.display()))?;
                // SAFETY: the mapping is read-only and lives as long as `self`.
                BedBytes::Mapped(unsafe { Mmap::map(&bed_file)? })
            }
            c => BedBytes::Buffered(compression::read_all(&bed_path, c)?),
        };

        if bed.len() < 3 {
            bail!("Bed file too small: {}", bed_path.display());
        }
        if bed[0] != 0x6C || bed[1] != 0x1B {
            bail!("Invalid PLINK bed file magic number: {}", bed_path.display());
        }
        if bed[2] != 0x01 {
            bail!("Only SNP-major bed files are supported (mode byte = 0x01)");
        }

        let bytes_per_variant = n_samples.div_ceil(4);
        let expected_size = 3 + bytes_per_variant * variants.len();
        if bed.len() < expected_size {
            bail!(
                "Bed file too small: expected at least {} bytes, got {}",
                expected_size,
                bed.len()
            );
        }

        info!(
            "PLINK {}: {} variants x {} samples (bed {})",
            prefix.display(),
            variants.len(),
            n_samples,
            bed_c.name()
        );

        let mut source = Self {
            bed,
            variants,
            sample_ids: fam_ids.clone(),
            fam_ids,
            bytes_per_variant,
            sample_subset: None,
            counts: Vec::new(),
            reads: 0,
        };
        source.refresh_counts();
        Ok(source)
    }

    /// Parse a .fam file into individual IDs.
    fn parse_fam(path: &Path, compression: Compression) -> Result<Vec<String>> {
        let reader = compression::open_reader(path, compression)?;
        let mut ids = Vec::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read fam file: {}", path.display()))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                bail!("Fam file line {} has fewer than 6 fields", line_num + 1);
            }
            ids.push(fields[1].to_string());
        }
        Ok(ids)
    }

    /// Parse a .bim file.
    fn parse_bim(path: &Path, compression: Compression) -> Result<Vec<VariantInfo>> {
        let reader = compression::open_reader(path, compression)?;
        let mut entries = Vec::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read bim file: {}", path.display()))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                bail!("Bim file line {} has fewer than 6 fields", line_num + 1);
            }
            let pos = fields[3]
                .parse()
                .with_context(|| format!("Bim file line {}: bad position '{}'", line_num + 1, fields[3]))?;
            entries.push(VariantInfo {
                chrom: fields[0].to_string(),
                id: fields[1].to_string(),
                pos,
                alt_allele: fields[4].to_string(),
                ref_allele: fields[5].to_string(),
            });
        }
        Ok(entries)
    }

    /// Decode a single genotype from the bed file.
    /// Returns copies of allele 1: 0, 1, 2, or NaN for missing.
    #[inline]
    fn decode_genotype(byte: u8, offset: usize) -> f64 {
        let bits = (byte >> (offset * 2)) & 0x03;
        match bits {
            0b00 => 2.0,      // Homozygous A1/A1
            0b01 => f64::NAN, // Missing
            0b10 => 1.0,      // Heterozygous A1/A2
            0b11 => 0.0,      // Homozygous A2/A2
            _ => unreachable!(),
        }
    }

    fn variant_bytes(&self, index: usize) -> &[u8] {
        let offset = 3 + index * self.bytes_per_variant;
        &self.bed[offset..offset + self.bytes_per_variant]
    }

    fn decode_into(&self, index: usize, out: &mut [f64]) {
        let bytes = self.variant_bytes(index);
        match &self.sample_subset {
            Some(indices) => {
                for (o, &s) in out.iter_mut().zip(indices.iter()) {
                    *o = Self::decode_genotype(bytes[s / 4], s % 4);
                }
            }
            None => {
                for (s, o) in out.iter_mut().enumerate() {
                    *o = Self::decode_genotype(bytes[s / 4], s % 4);
                }
            }
        }
    }

    fn count_variant(&self, index: usize) -> ClassCounts {
        let bytes = self.variant_bytes(index);
        let mut c = ClassCounts::default();
        let mut tally = |bits: u8| match bits {
            0b00 => c.hom_alt += 1,
            0b01 => c.missing += 1,
            0b10 => c.het += 1,
            _ => c.hom_ref += 1,
        };
        match &self.sample_subset {
            Some(indices) => {
                for &s in indices {
                    tally((bytes[s / 4] >> ((s % 4) * 2)) & 0x03);
                }
            }
            None => {
                for s in 0..self.fam_ids.len() {
                    tally((bytes[s / 4] >> ((s % 4) * 2)) & 0x03);
                }
            }
        }
        c
    }

    fn refresh_counts(&mut self) {
        let counts: Vec<ClassCounts> = (0..self.variants.len())
            .into_par_iter()
            .map(|v| self.count_variant(v))
            .collect();
        debug!("Computed class counts for {} variants", counts.len());
        self.counts = counts;
    }

    /// Precomputed class counts, one per variant.
    pub fn class_counts(&self) -> &[ClassCounts] {
        &self.counts
    }

    /// Variant metadata in file order.
    pub fn variants(&self) -> &[VariantInfo] {
        &self.variants
    }
}

impl VariantSource for PlinkSource {
    fn n_variants(&self) -> usize {
        self.variants.len()
    }

    fn n_samples_total(&self) -> usize {
        self.fam_ids.len()
    }

    fn n_samples(&self) -> usize {
        match &self.sample_subset {
            Some(indices) => indices.len(),
            None => self.fam_ids.len(),
        }
    }

    fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    fn select_samples(&mut self, indices: &[usize]) -> Result<()> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.fam_ids.len()) {
            bail!("Sample index {} out of range ({})", bad, self.fam_ids.len());
        }
        self.sample_ids = indices.iter().map(|&i| self.fam_ids[i].clone()).collect();
        self.sample_subset = Some(indices.to_vec());
        self.refresh_counts();
        Ok(())
    }

    fn access_pattern(&self) -> AccessPattern {
        AccessPattern::RandomAccess
    }

    fn is_dosage(&self) -> bool {
        false
    }

    fn variant_info(&self, index: usize) -> Option<&VariantInfo> {
        self.variants.get(index)
    }

    fn read_block(&mut self, indices: &[usize], block: &mut GenotypeBlock) -> Result<()> {
        if block.n_samples() != self.n_samples() {
            bail!(
                "Block sized for {} samples, source has {}",
                block.n_samples(),
                self.n_samples()
            );
        }
        block.reset(indices.len());
        block.set_dosage(false);
        for (j, &index) in indices.iter().enumerate() {
            if index >= self.variants.len() {
                bail!("Variant index {} out of range ({})", index, self.variants.len());
            }
            self.decode_into(index, block.column_mut(j));
            block.set_member(j, self.variants[index].clone(), Some(self.counts[index]));
        }
        self.reads += indices.len();
        Ok(())
    }

    fn records_consumed(&self) -> usize {
        self.reads
    }

    fn drain(&mut self) -> Result<usize> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Encode copies of allele 1 (NaN = missing) as a SNP-major bed.
    fn write_fileset(dir: &Path, genotypes: &[Vec<f64>]) -> PathBuf {
        let n = genotypes[0].len();
        let prefix = dir.join("toy");
        let mut fam = std::fs::File::create(companion(&prefix, "fam")).unwrap();
        for i in 0..n {
            writeln!(fam, "F{i} S{i} 0 0 1 -9").unwrap();
        }
        let mut bim = std::fs::File::create(companion(&prefix, "bim")).unwrap();
        let mut bed = vec![0x6C, 0x1B, 0x01];
        for (v, g) in genotypes.iter().enumerate() {
            writeln!(bim, "1 rs{v} 0 {} A G", 100 * (v + 1)).unwrap();
            let mut bytes = vec![0u8; n.div_ceil(4)];
            for (s, &x) in g.iter().enumerate() {
                let code: u8 = if x.is_nan() {
                    0b01
                } else if x == 2.0 {
                    0b00
                } else if x == 1.0 {
                    0b10
                } else {
                    0b11
                };
                bytes[s / 4] |= code << ((s % 4) * 2);
            }
            bed.extend(bytes);
        }
        std::fs::write(companion(&prefix, "bed"), bed).unwrap();
        prefix
    }

    #[test]
    fn test_decode_genotype() {
        assert_eq!(PlinkSource::decode_genotype(0b00_00_00_00, 0), 2.0);
        assert!(PlinkSource::decode_genotype(0b00_00_00_01, 0).is_nan());
        assert_eq!(PlinkSource::decode_genotype(0b00_00_00_10, 0), 1.0);
        assert_eq!(PlinkSource::decode_genotype(0b00_00_00_11, 0), 0.0);
    }

    #[test]
    fn test_decode_genotype_offsets() {
        let byte: u8 = 0b11_10_01_00;
        assert_eq!(PlinkSource::decode_genotype(byte, 0), 2.0);
        assert!(PlinkSource::decode_genotype(byte, 1).is_nan());
        assert_eq!(PlinkSource::decode_genotype(byte, 2), 1.0);
        assert_eq!(PlinkSource::decode_genotype(byte, 3), 0.0);
    }

    #[test]
    fn test_open_and_read_block() {
        let dir = tempfile::tempdir().unwrap();
        let g0 = vec![0.0, 1.0, 2.0, f64::NAN, 0.0];
        let g1 = vec![2.0, 2.0, 2.0, 2.0, 2.0];
        let prefix = write_fileset(dir.path(), &[g0, g1]);

        let mut src = PlinkSource::open(&prefix).unwrap();
        assert_eq!(src.n_variants(), 2);
        assert_eq!(src.n_samples(), 5);
        assert_eq!(src.sample_ids()[2], "S2");

        let counts = src.class_counts()[0];
        assert_eq!((counts.hom_ref, counts.het, counts.hom_alt, counts.missing), (2, 1, 1, 1));
        assert_eq!(src.class_counts()[1].maf(), 0.0);

        let mut block = GenotypeBlock::new(5);
        src.read_block(&[1, 0], &mut block).unwrap();
        assert_eq!(block.width(), 2);
        assert_eq!(block.column(0), &[2.0; 5]);
        assert_eq!(block.info(1).id, "rs0");
        assert_eq!(block.info(1).pos, 100);
        let c0 = block.column(1);
        assert_eq!(&c0[..3], &[0.0, 1.0, 2.0]);
        assert!(c0[3].is_nan());
    }

    #[test]
    fn test_select_samples_recounts() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = write_fileset(dir.path(), &[vec![0.0, 1.0, 2.0, 2.0]]);
        let mut src = PlinkSource::open(prefix.with_extension("bed")).unwrap();
        src.select_samples(&[0, 1]).unwrap();
        assert_eq!(src.n_samples(), 2);
        assert_eq!(src.sample_ids(), &["S0".to_string(), "S1".to_string()]);
        let c = src.class_counts()[0];
        assert_eq!((c.hom_ref, c.het, c.hom_alt), (1, 1, 0));

        let mut block = GenotypeBlock::new(2);
        src.read_block(&[0], &mut block).unwrap();
        assert_eq!(block.column(0), &[0.0, 1.0]);
    }

    #[test]
    fn test_missing_companion_fails_before_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = write_fileset(dir.path(), &[vec![0.0, 1.0]]);
        std::fs::remove_file(companion(&prefix, "fam")).unwrap();
        let err = PlinkSource::open(&prefix).err().unwrap();
        assert!(err.downcast_ref::<compression::SourceError>().is_some());
    }

    #[test]
    fn test_gzipped_bed_is_buffered() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = write_fileset(dir.path(), &[vec![0.0, 1.0, 2.0]]);
        let bed_path = companion(&prefix, "bed");
        let raw = std::fs::read(&bed_path).unwrap();
        std::fs::remove_file(&bed_path).unwrap();
        let f = std::fs::File::create(companion(&prefix, "bed.gz")).unwrap();
        let mut enc = flate2::write::GzEncoder::new(f, flate2::Compression::default());
        enc.write_all(&raw).unwrap();
        enc.finish().unwrap();

        let mut src = PlinkSource::open(&prefix).unwrap();
        let mut block = GenotypeBlock::new(3);
        src.read_block(&[0], &mut block).unwrap();
        assert_eq!(block.column(0), &[0.0, 1.0, 2.0]);
    }
}
