//! Forward-only VCF source.
//!
//! Reads hard calls (GT) or dosages (DS) from a VCF text file, optionally
//! compressed. The file is streamed once: a record can only be read when
//! the cursor reaches it, and records the caller does not ask for are
//! still read so the stream stays aligned with the variant index space.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::compression::{self, Compression, SourceError};
use crate::traits::{AccessPattern, ClassCounts, GenotypeBlock, VariantInfo, VariantSource};

/// Which FORMAT field to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcfDataKind {
    /// Hard calls from GT, counted as ALT copies.
    Genotype,
    /// Dosages from DS.
    Dosage,
}

impl VcfDataKind {
    pub fn format_key(&self) -> &'static str {
        match self {
            VcfDataKind::Genotype => "GT",
            VcfDataKind::Dosage => "DS",
        }
    }
}

impl FromStr for VcfDataKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gt" | "genotype" => Ok(VcfDataKind::Genotype),
            "ds" | "dosage" => Ok(VcfDataKind::Dosage),
            other => bail!("Unknown VCF data type '{}': expected GT or DS", other),
        }
    }
}

/// Sequential source over a VCF file.
pub struct VcfSource {
    path: PathBuf,
    kind: VcfDataKind,
    reader: Box<dyn BufRead + Send>,
    line: String,
    all_sample_ids: Vec<String>,
    sample_ids: Vec<String>,
    sample_subset: Option<Vec<usize>>,
    n_records: usize,
    /// Records read so far; also the index of the next record.
    cursor: usize,
    /// Metadata of the most recent record read past without returning it.
    lookahead: Option<VariantInfo>,
    /// Values for every sample in the current record.
    scratch: Vec<f64>,
}

impl VcfSource {
    /// Open a VCF, counting its records and checking that every record
    /// carries the requested FORMAT field.
    pub fn open<P: AsRef<Path>>(path: P, kind: VcfDataKind) -> Result<Self> {
        let (path, compression) = compression::resolve(path.as_ref())?;
        let (all_sample_ids, n_records) = Self::count_records(&path, compression, kind)?;

        let mut reader = compression::open_reader(&path, compression)?;
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                bail!("VCF {} has no #CHROM header line", path.display());
            }
            if line.starts_with("#CHROM") {
                break;
            }
        }

        info!(
            "VCF {}: {} records x {} samples ({}, {})",
            path.display(),
            n_records,
            all_sample_ids.len(),
            kind.format_key(),
            compression.name()
        );

        Ok(Self {
            path,
            kind,
            reader,
            line,
            sample_ids: all_sample_ids.clone(),
            scratch: vec![f64::NAN; all_sample_ids.len()],
            all_sample_ids,
            sample_subset: None,
            n_records,
            cursor: 0,
            lookahead: None,
        })
    }

    /// One pass over the file: sample IDs from the header and the number
    /// of data records. A record without the requested FORMAT key fails
    /// here, before any genotype is read.
    fn count_records(
        path: &Path,
        compression: Compression,
        kind: VcfDataKind,
    ) -> Result<(Vec<String>, usize)> {
        let reader = compression::open_reader(path, compression)?;
        let mut sample_ids = None;
        let mut n_records = 0usize;
        for line in reader.lines() {
            let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
            if line.starts_with("##") {
                continue;
            }
            if line.starts_with('#') {
                let fields: Vec<&str> = line.split('\t').collect();
                sample_ids = Some(fields.iter().skip(9).map(|s| s.to_string()).collect());
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }
            let format = line.split('\t').nth(8).unwrap_or("");
            if !format.split(':').any(|f| f == kind.format_key()) {
                return Err(SourceError::MissingFormatField {
                    path: path.to_path_buf(),
                    field: kind.format_key().to_string(),
                    record: n_records + 1,
                }
                .into());
            }
            n_records += 1;
        }
        let sample_ids = sample_ids
            .with_context(|| format!("VCF {} has no #CHROM header line", path.display()))?;
        Ok((sample_ids, n_records))
    }

    pub fn kind(&self) -> VcfDataKind {
        self.kind
    }

    /// Metadata of the last record skipped over, if any.
    pub fn lookahead(&self) -> Option<&VariantInfo> {
        self.lookahead.as_ref()
    }

    /// Read the next data line into `self.line`.
    fn next_line(&mut self) -> Result<()> {
        loop {
            self.line.clear();
            let n = self
                .reader
                .read_line(&mut self.line)
                .with_context(|| format!("Failed to read {}", self.path.display()))?;
            if n == 0 {
                bail!(
                    "VCF {} ended after {} records, expected {}",
                    self.path.display(),
                    self.cursor,
                    self.n_records
                );
            }
            if !self.line.trim().is_empty() {
                return Ok(());
            }
        }
    }

    /// Read one record. Values are parsed into `scratch` only when asked.
    fn read_record(&mut self, with_values: bool) -> Result<VariantInfo> {
        self.next_line()?;
        let record = self.cursor + 1;
        let line = self.line.trim_end_matches(['\n', '\r']);
        let mut fields = line.split('\t');
        let mut next = |name: &str| {
            fields
                .next()
                .with_context(|| format!("VCF record {} is missing the {} column", record, name))
        };
        let chrom = next("CHROM")?.to_string();
        let pos_str = next("POS")?;
        let pos: u64 = pos_str
            .parse()
            .with_context(|| format!("VCF record {}: bad position '{}'", record, pos_str))?;
        let id = match next("ID")? {
            "." => format!("{}:{}", chrom, pos),
            id => id.to_string(),
        };
        let ref_allele = next("REF")?.to_string();
        let alt_allele = next("ALT")?.split(',').next().unwrap_or(".").to_string();
        let info = VariantInfo {
            chrom,
            pos,
            id,
            ref_allele,
            alt_allele,
        };

        if with_values {
            let _qual = next("QUAL")?;
            let _filter = next("FILTER")?;
            let _info = next("INFO")?;
            let format = next("FORMAT")?;
            let key = self.kind.format_key();
            let Some(field_idx) = format.split(':').position(|f| f == key) else {
                return Err(SourceError::MissingFormatField {
                    path: self.path.clone(),
                    field: key.to_string(),
                    record,
                }
                .into());
            };
            let mut n_seen = 0;
            for (slot, sample) in self.scratch.iter_mut().zip(fields.by_ref()) {
                let value = sample.split(':').nth(field_idx).unwrap_or(".");
                *slot = match self.kind {
                    VcfDataKind::Genotype => parse_gt_dosage(value),
                    VcfDataKind::Dosage => value.parse().unwrap_or(f64::NAN),
                };
                n_seen += 1;
            }
            if n_seen != self.scratch.len() {
                bail!(
                    "VCF record {} has {} samples, header lists {}",
                    record,
                    n_seen,
                    self.scratch.len()
                );
            }
        }

        self.cursor += 1;
        Ok(info)
    }

    /// Copy `scratch` into `out` for the selected samples.
    fn gather(&self, out: &mut [f64]) {
        match &self.sample_subset {
            Some(indices) => {
                for (o, &s) in out.iter_mut().zip(indices.iter()) {
                    *o = self.scratch[s];
                }
            }
            None => out.copy_from_slice(&self.scratch),
        }
    }
}

/// Parse a GT field (e.g., "0/1", "1|0", "./.") to dosage of ALT allele.
fn parse_gt_dosage(gt: &str) -> f64 {
    let sep = if gt.contains('|') { '|' } else { '/' };
    let mut dosage = 0.0;
    for allele in gt.split(sep) {
        match allele {
            "." | "" => return f64::NAN,
            "0" => {}
            _ => dosage += 1.0,
        }
    }
    dosage
}

impl VariantSource for VcfSource {
    fn n_variants(&self) -> usize {
        self.n_records
    }

    fn n_samples_total(&self) -> usize {
        self.all_sample_ids.len()
    }

    fn n_samples(&self) -> usize {
        match &self.sample_subset {
            Some(indices) => indices.len(),
            None => self.all_sample_ids.len(),
        }
    }

    fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    fn select_samples(&mut self, indices: &[usize]) -> Result<()> {
        let total = self.all_sample_ids.len();
        if let Some(&bad) = indices.iter().find(|&&i| i >= total) {
            bail!("Sample index {} out of range ({})", bad, total);
        }
        self.sample_ids = indices
            .iter()
            .map(|&i| self.all_sample_ids[i].clone())
            .collect();
        self.sample_subset = Some(indices.to_vec());
        Ok(())
    }

    fn access_pattern(&self) -> AccessPattern {
        AccessPattern::Sequential
    }

    fn is_dosage(&self) -> bool {
        self.kind == VcfDataKind::Dosage
    }

    fn variant_info(&self, _index: usize) -> Option<&VariantInfo> {
        None
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
        block.set_dosage(self.is_dosage());
        for (j, &index) in indices.iter().enumerate() {
            if index < self.cursor {
                bail!(
                    "VCF is forward-only: record {} requested after {} were read",
                    index,
                    self.cursor
                );
            }
            if index >= self.n_records {
                bail!("Variant index {} out of range ({})", index, self.n_records);
            }
            while self.cursor < index {
                let skipped = self.read_record(false)?;
                self.lookahead = Some(skipped);
            }
            let info = self.read_record(true)?;
            self.gather(block.column_mut(j));
            let counts = match self.kind {
                VcfDataKind::Genotype => Some(ClassCounts::from_calls(block.column(j))),
                VcfDataKind::Dosage => None,
            };
            block.set_member(j, info, counts);
        }
        Ok(())
    }

    fn records_consumed(&self) -> usize {
        self.cursor
    }

    fn drain(&mut self) -> Result<usize> {
        let mut n = 0;
        while self.cursor < self.n_records {
            let skipped = self.read_record(false)?;
            self.lookahead = Some(skipped);
            n += 1;
        }
        debug!("Drained {} trailing VCF records", n);
        Ok(n)
    }
}
