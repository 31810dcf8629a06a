//! The scan driver: group, read, encode, test, write.
//!
//! [`Scan::new`] performs every check that can fail the run (sample
//! alignment, selectors, grouping, mapping order) before the output file
//! exists. [`Scan::run`] then resolves one unit at a time in plan order
//! and streams its row.

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Result};
use tracing::{debug, info, warn};

use ordgwas_geno::materialized::MaterializedSource;
use ordgwas_geno::selection::Selection;
use ordgwas_geno::traits::{AccessPattern, GenotypeBlock, VariantSource};

use crate::model::null_model::FittedNullModel;
use crate::polr::fit::FitConfig;
use crate::score_test::{TestKind, UnitStatistic, UnitTester};
use crate::util::hwe::hwe_exact;

use super::encode::{EncodedBlock, GeneticModel};
use super::error::ScanError;
use super::grouping::{Grouping, UnitPlan};
use super::writer::{Layout, ResultWriter, UnitReport};

/// Units between progress messages.
const PROGRESS_EVERY: usize = 10_000;

/// What to scan and how.
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    pub test: TestKind,
    pub grouping: Grouping,
    pub genetic_model: GeneticModel,
    /// Samples of the genotype source, in file order.
    pub samples: Selection,
    /// Variants of the genotype source, in file order.
    pub variants: Selection,
    /// Refit settings for the LRT.
    pub fit: FitConfig,
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub units: usize,
    /// Units with no informative column (p = 1, zero effects).
    pub monomorphic: usize,
    /// Units whose statistic could not be computed (NaN row).
    pub failed: usize,
    /// Records read from the genotype file.
    pub records_consumed: usize,
}

/// A validated scan, ready to run.
pub struct Scan<'a> {
    model: &'a FittedNullModel,
    source: Box<dyn VariantSource>,
    test: TestKind,
    genetic_model: GeneticModel,
    plan: UnitPlan,
    layout: Layout,
    tester: UnitTester<'a>,
}

impl<'a> Scan<'a> {
    /// Validate the configuration against the model and the source.
    ///
    /// Fails with [`ScanError::Configuration`] when the selected samples do
    /// not match the model's sample count or a selector or grouping is
    /// invalid, and with [`ScanError::DataConsistency`] when a snp-set
    /// mapping does not follow the source's variant order.
    pub fn new(
        model: &'a FittedNullModel,
        mut source: Box<dyn VariantSource>,
        config: ScanConfig,
    ) -> Result<Self> {
        info!(
            "Genotype source: {} variants x {} samples",
            source.n_variants(),
            source.n_samples_total()
        );

        if !config.samples.is_all() {
            let rows = config
                .samples
                .resolve(source.n_samples_total())
                .map_err(|e| ScanError::Configuration(format!("sample selection: {:#}", e)))?;
            source.select_samples(&rows)?;
        }
        if source.n_samples() != model.n_samples {
            return Err(ScanError::Configuration(format!(
                "genotype source resolves to {} samples but the null model has {}",
                source.n_samples(),
                model.n_samples
            ))
            .into());
        }
        if source.sample_ids() != model.sample_ids.as_slice() {
            warn!("Sample IDs differ from the null model's; samples are matched by position");
        }

        let selected = config
            .variants
            .resolve(source.n_variants())
            .map_err(|e| ScanError::Configuration(format!("variant selection: {:#}", e)))?;

        if config.grouping.needs_random_access()
            && source.access_pattern() == AccessPattern::Sequential
        {
            info!(
                "Grouping by {} needs random access; reading the source into memory",
                config.grouping.describe()
            );
            source = Box::new(MaterializedSource::from_source(source.as_mut())?);
        }

        if let Grouping::NamedSets(mapping) = &config.grouping {
            let ids = (0..source.n_variants())
                .map(|i| source.variant_info(i).map(|v| v.id.clone()))
                .collect::<Option<Vec<String>>>()
                .ok_or_else(|| {
                    ScanError::Configuration("source does not expose variant IDs".into())
                })?;
            if let Some(detail) = mapping.order_mismatch(&ids) {
                return Err(ScanError::DataConsistency(format!(
                    "snp-set mapping does not follow the genotype file's variant order: {}",
                    detail
                ))
                .into());
            }
        }

        let plan = config.grouping.plan(&selected, source.n_variants())?;
        let layout = match config.grouping {
            Grouping::Single => Layout::Single,
            Grouping::FixedWindow(_) => Layout::Window,
            Grouping::NamedSets(_) => Layout::NamedSets,
            Grouping::ExplicitSet(_) => Layout::Explicit,
        };
        let tester = UnitTester::new(config.test, model, &config.fit)?;

        info!(
            "{} test units over {} selected variants ({}, {} test, {} coding)",
            plan.len(),
            selected.len(),
            config.grouping.describe(),
            config.test.name(),
            config.genetic_model.name()
        );

        Ok(Self {
            model,
            source,
            test: config.test,
            genetic_model: config.genetic_model,
            plan,
            layout,
            tester,
        })
    }

    pub fn plan(&self) -> &UnitPlan {
        &self.plan
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn source(&self) -> &dyn VariantSource {
        self.source.as_ref()
    }

    /// Run every unit and write the results to `output`.
    ///
    /// The writer is flushed whether or not the scan succeeds, so a failed
    /// run leaves the rows written so far.
    pub fn run(&mut self, output: &Path) -> Result<ScanSummary> {
        let mut writer = ResultWriter::create(output, self.layout, self.test)?;
        let scanned = self.scan_units(&mut writer);
        let finished = writer.finish();
        let summary = scanned?;
        finished?;

        info!(
            "Scan complete: {} units, {} monomorphic, {} failed",
            summary.units, summary.monomorphic, summary.failed
        );
        info!("Results written to {}", output.display());
        Ok(summary)
    }

    /// Test every unit, writing rows through `writer`.
    pub fn scan_units<W: Write>(&mut self, writer: &mut ResultWriter<W>) -> Result<ScanSummary> {
        let n = self.model.n_samples;
        let max_width = self.plan.max_width();
        let mut block = GenotypeBlock::new(n);
        block.reset(max_width);
        let mut encoded = EncodedBlock::with_capacity(n, max_width);
        let mut summary = ScanSummary::default();
        let total = self.plan.len();

        for unit in self.plan.units() {
            self.source.read_block(unit.members, &mut block)?;
            encoded.encode(&block, self.genetic_model);
            let width = encoded.width();
            let informative = encoded.informative();

            let stat = if informative.is_empty() {
                summary.monomorphic += 1;
                UnitStatistic::trivial(self.test, width)
            } else {
                let columns: Vec<&[f64]> = informative.iter().map(|&j| encoded.column(j)).collect();
                let mut stat = self.tester.test(&columns);
                if let Some(effects) = stat.effects.take() {
                    let mut full = vec![0.0; width];
                    for (&j, &e) in informative.iter().zip(effects.iter()) {
                        full[j] = e;
                    }
                    stat.effects = Some(full);
                }
                if stat.failed() {
                    summary.failed += 1;
                    debug!("Unit {} ({}): statistic not computable", summary.units + 1, block.info(0).id);
                }
                stat
            };

            let (maf, hwe_pval) = if self.layout == Layout::Single {
                single_variant_diagnostics(&block)
            } else {
                (f64::NAN, f64::NAN)
            };
            writer.write_unit(&UnitReport {
                first: block.info(0),
                last: block.info(width - 1),
                name: unit.name,
                n_members: width,
                maf,
                hwe_pval,
                stat: &stat,
            })?;

            summary.units += 1;
            if summary.units % PROGRESS_EVERY == 0 {
                info!("Tested {}/{} units", summary.units, total);
            }
        }

        if self.source.access_pattern() == AccessPattern::Sequential {
            let trailing = self.source.drain()?;
            if trailing > 0 {
                debug!("Read {} trailing records", trailing);
            }
            if self.source.records_consumed() != self.source.n_variants() {
                bail!(
                    "Read {} records but the genotype file has {}",
                    self.source.records_consumed(),
                    self.source.n_variants()
                );
            }
        }
        summary.records_consumed = self.source.records_consumed();
        Ok(summary)
    }
}

/// MAF and HWE p-value for the first member of `block`.
///
/// Hard calls use the class counts; dosages give the folded mean dosage
/// frequency and no HWE test.
fn single_variant_diagnostics(block: &GenotypeBlock) -> (f64, f64) {
    match block.counts(0) {
        Some(c) => (c.maf(), hwe_exact(c.hom_alt, c.het, c.hom_ref)),
        None => {
            let (sum, n) = block
                .column(0)
                .iter()
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
            let af = if n > 0 { sum / (2.0 * n as f64) } else { 0.0 };
            (af.min(1.0 - af), f64::NAN)
        }
    }
}
