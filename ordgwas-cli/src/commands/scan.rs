//! Association scan against a fitted null model.
//!
//! ordgwas scan --model-file ... (--plink-file ... | --vcf-file ... --vcf-type GT|DS) --output-file ...

use std::path::Path;

use anyhow::Result;
use clap::Args;
use tracing::info;

use ordgwas_core::model::serialization::load_model;
use ordgwas_core::polr::fit::FitConfig;
use ordgwas_core::scan::{GeneticModel, Grouping, Scan, ScanConfig, ScanError};
use ordgwas_core::score_test::TestKind;
use ordgwas_geno::selection::{read_index_file, read_mask_file};
use ordgwas_geno::traits::VariantSource;
use ordgwas_geno::{PlinkSource, Selection, SnpSetMapping, VcfDataKind, VcfSource};

#[derive(Args)]
pub struct ScanArgs {
    /// Model file from fit-null (.ordgwas.model)
    #[arg(long)]
    model_file: String,

    /// Output file path
    #[arg(long)]
    output_file: String,

    /// PLINK file prefix (bed/bim/fam)
    #[arg(long, conflicts_with = "vcf_file")]
    plink_file: Option<String>,

    /// VCF file path
    #[arg(long)]
    vcf_file: Option<String>,

    /// VCF field to read: GT (hard calls) or DS (dosages)
    #[arg(long)]
    vcf_type: Option<String>,

    /// Test: score or lrt
    #[arg(long, default_value = "score")]
    test: String,

    /// Genetic model: additive, dominant or recessive
    #[arg(long, default_value = "additive")]
    model: String,

    /// Test consecutive windows of this many variants
    #[arg(long, conflicts_with_all = ["snpset_file", "snpset_indices", "snpset_mask_file"])]
    window: Option<usize>,

    /// Two-column mapping file (set id, variant id) in genotype-file order
    #[arg(long, conflicts_with_all = ["snpset_indices", "snpset_mask_file"])]
    snpset_file: Option<String>,

    /// Test one set given by 1-based variant indices (comma-separated)
    #[arg(long, value_delimiter = ',', conflicts_with = "snpset_mask_file")]
    snpset_indices: Option<Vec<usize>>,

    /// Test one set given by a variant mask file (one 0/1 per line)
    #[arg(long)]
    snpset_mask_file: Option<String>,

    /// Sample mask file (one 0/1 per line, genotype-file order)
    #[arg(long, conflicts_with = "sample_index_file")]
    sample_mask_file: Option<String>,

    /// Sample index file (1-based, one per line)
    #[arg(long)]
    sample_index_file: Option<String>,

    /// Variant mask file (one 0/1 per line, genotype-file order)
    #[arg(long, conflicts_with = "variant_index_file")]
    variant_mask_file: Option<String>,

    /// Variant index file (1-based, one per line)
    #[arg(long)]
    variant_index_file: Option<String>,

    /// Maximum Fisher-scoring iterations for LRT refits
    #[arg(long, default_value = "100")]
    max_iter: usize,

    /// Convergence tolerance for LRT refits
    #[arg(long, default_value = "1e-8")]
    tol: f64,
}

pub fn run(args: ScanArgs) -> Result<()> {
    info!("=== ordgwas: Association Scan ===");

    let test: TestKind = args.test.parse()?;
    let genetic_model: GeneticModel = args.model.parse()?;
    let grouping = grouping(&args)?;
    let samples = selector(args.sample_mask_file.as_deref(), args.sample_index_file.as_deref())?;
    let variants = selector(args.variant_mask_file.as_deref(), args.variant_index_file.as_deref())?;

    // Load model
    let model = load_model(Path::new(&args.model_file))?;
    info!(
        "Loaded model: {} samples, {} levels, {} covariates, link={}",
        model.n_samples,
        model.n_levels(),
        model.x_ncols,
        model.link.name()
    );

    // Open genotype file
    let source: Box<dyn VariantSource> = if let Some(ref prefix) = args.plink_file {
        Box::new(PlinkSource::open(prefix)?)
    } else if let Some(ref vcf_path) = args.vcf_file {
        let kind: VcfDataKind = match args.vcf_type.as_deref() {
            Some(t) => t
                .parse()
                .map_err(|e| ScanError::Configuration(format!("{:#}", e)))?,
            None => {
                return Err(ScanError::Configuration(
                    "--vcf-type (GT or DS) is required with --vcf-file".into(),
                )
                .into())
            }
        };
        Box::new(VcfSource::open(vcf_path, kind)?)
    } else {
        return Err(ScanError::Configuration(
            "Must specify --plink-file or --vcf-file".into(),
        )
        .into());
    };

    let config = ScanConfig {
        test,
        grouping,
        genetic_model,
        samples,
        variants,
        fit: FitConfig {
            max_iter: args.max_iter,
            tol: args.tol,
            ..FitConfig::default()
        },
    };
    let mut scan = Scan::new(&model, source, config)?;
    let summary = scan.run(Path::new(&args.output_file))?;

    info!(
        "{} units tested ({} monomorphic, {} failed), {} records read",
        summary.units, summary.monomorphic, summary.failed, summary.records_consumed
    );

    Ok(())
}

fn grouping(args: &ScanArgs) -> Result<Grouping> {
    if let Some(w) = args.window {
        return Ok(Grouping::FixedWindow(w));
    }
    if let Some(ref path) = args.snpset_file {
        return Ok(Grouping::NamedSets(SnpSetMapping::parse(path)?));
    }
    if let Some(ref indices) = args.snpset_indices {
        let selection = Selection::from_one_based(indices)
            .map_err(|e| ScanError::Configuration(format!("{:#}", e)))?;
        return Ok(Grouping::ExplicitSet(selection));
    }
    if let Some(ref path) = args.snpset_mask_file {
        return Ok(Grouping::ExplicitSet(read_mask_file(Path::new(path))?));
    }
    Ok(Grouping::Single)
}

fn selector(mask_file: Option<&str>, index_file: Option<&str>) -> Result<Selection> {
    match (mask_file, index_file) {
        (Some(path), _) => read_mask_file(Path::new(path)),
        (None, Some(path)) => read_index_file(Path::new(path)),
        (None, None) => Ok(Selection::All),
    }
}
