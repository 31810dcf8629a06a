//! Fit the proportional-odds null model.
//!
//! ordgwas fit-null --cov-file ... --response-col ... --covar-cols ... --output-prefix ...

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use tracing::info;

use ordgwas_core::model::null_model::FittedNullModel;
use ordgwas_core::model::serialization;
use ordgwas_core::polr::fit::FitConfig;
use ordgwas_core::polr::link::LinkKind;
use ordgwas_core::scan::ScanError;
use ordgwas_geno::phenotype::{CovariateColumns, CovariateTable};

#[derive(Args)]
pub struct FitNullArgs {
    /// Covariate file with a header row (tab, comma or whitespace separated)
    #[arg(long)]
    cov_file: String,

    /// Ordinal response column name
    #[arg(long)]
    response_col: String,

    /// Covariate column names (comma-separated)
    #[arg(long, default_value = "")]
    covar_cols: String,

    /// Sample ID column name
    #[arg(long, default_value = "IID")]
    sample_id_col: String,

    /// Link function: logit, probit, cloglog or cauchit
    #[arg(long, default_value = "logit")]
    link: String,

    /// Optional per-sample weight column
    #[arg(long)]
    weights_col: Option<String>,

    /// Maximum Fisher-scoring iterations
    #[arg(long, default_value = "100")]
    max_iter: usize,

    /// Convergence tolerance (relative log-likelihood change)
    #[arg(long, default_value = "1e-8")]
    tol: f64,

    /// Output file prefix
    #[arg(long)]
    output_prefix: String,

    /// Also save JSON sidecar for debugging
    #[arg(long, default_value = "false")]
    save_json: bool,
}

pub fn run(args: FitNullArgs) -> Result<()> {
    let link: LinkKind = args.link.parse()?;

    info!("=== ordgwas: Fit Null Model ===");
    info!("Covariate file: {}", args.cov_file);
    info!("Response column: {}", args.response_col);
    info!("Link: {}", link.name());

    let covar_cols: Vec<String> = if args.covar_cols.is_empty() {
        Vec::new()
    } else {
        args.covar_cols.split(',').map(|s| s.trim().to_string()).collect()
    };

    let table = CovariateTable::parse(
        Path::new(&args.cov_file),
        &CovariateColumns {
            sample_id: &args.sample_id_col,
            response: &args.response_col,
            covariates: &covar_cols,
            weights: args.weights_col.as_deref(),
        },
    )?;
    info!("Loaded {} rows", table.n_rows());

    // Drop rows with a missing response, covariate or weight
    let rows = table.complete_rows();
    if rows.is_empty() {
        return Err(ScanError::Configuration(format!(
            "no complete rows in {}",
            args.cov_file
        ))
        .into());
    }
    info!(
        "Using {} complete rows ({} dropped)",
        rows.len(),
        table.n_rows() - rows.len()
    );

    let (x_flat, _, p) = table.design_matrix(&rows);
    let sample_ids: Vec<String> = rows.iter().map(|&i| table.sample_ids[i].clone()).collect();
    let response: Vec<f64> = rows.iter().map(|&i| table.response[i]).collect();
    let weights = table
        .weights
        .as_ref()
        .map(|w| rows.iter().map(|&i| w[i]).collect::<Vec<f64>>());

    let config = FitConfig {
        max_iter: args.max_iter,
        tol: args.tol,
        ..FitConfig::default()
    };
    let model = FittedNullModel::fit(
        sample_ids,
        &response,
        x_flat,
        p,
        table.covariate_names.clone(),
        weights,
        link,
        &config,
    )?;

    let model_path = PathBuf::from(format!("{}.ordgwas.model", args.output_prefix));
    serialization::save_model(&model, &model_path)?;
    info!("Model saved to {}", model_path.display());

    if args.save_json {
        let json_path = PathBuf::from(format!("{}.ordgwas.model.json", args.output_prefix));
        serialization::save_model_json(&model, &json_path)?;
        info!("JSON sidecar saved to {}", json_path.display());
    }

    println!("{}", serialization::model_summary(&model));

    Ok(())
}
