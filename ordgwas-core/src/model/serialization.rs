//! Model serialization and deserialization.
//!
//! Uses bincode for fast, compact binary serialization.
//! Format: bincode payload whose leading fields are the magic bytes
//! (ORDM) and a version number. Optional JSON sidecar for human
//! inspection.

use std::path::Path;

use anyhow::{bail, Context, Result};

use super::null_model::FittedNullModel;

/// Save a null model to a binary file (.ordgwas.model).
pub fn save_model(model: &FittedNullModel, path: &Path) -> Result<()> {
    let encoded = bincode::serialize(model)?;
    std::fs::write(path, &encoded)
        .with_context(|| format!("Failed to write model file: {}", path.display()))?;
    Ok(())
}

/// Load a null model from a binary file (.ordgwas.model).
pub fn load_model(path: &Path) -> Result<FittedNullModel> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read model file: {}", path.display()))?;
    if data.len() < 4 || data[..4] != FittedNullModel::MAGIC {
        bail!(
            "Invalid model file {}: expected magic bytes {:?}",
            path.display(),
            FittedNullModel::MAGIC
        );
    }
    let model: FittedNullModel = bincode::deserialize(&data)
        .with_context(|| format!("Corrupt model file: {}", path.display()))?;

    if model.version != FittedNullModel::VERSION {
        bail!(
            "Model file {} has version {}, this build reads version {}",
            path.display(),
            model.version,
            FittedNullModel::VERSION
        );
    }

    Ok(model)
}

/// Save a JSON sidecar for debugging (.ordgwas.model.json).
pub fn save_model_json(model: &FittedNullModel, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(model)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Summary of a null model (for display).
pub fn model_summary(model: &FittedNullModel) -> String {
    let thetas: Vec<String> = model.thetas.iter().map(|t| format!("{:.4}", t)).collect();
    let betas: Vec<String> = model
        .covariate_names
        .iter()
        .zip(model.betas.iter())
        .map(|(name, b)| format!("{}={:.4}", name, b))
        .collect();
    format!(
        "Ordinal Null Model v{}\n\
         Link: {}\n\
         Samples: {}\n\
         Levels: {}\n\
         Covariates: {}\n\
         Thresholds: [{}]\n\
         Coefficients: [{}]\n\
         Deviance: {:.4}\n\
         Converged: {} ({} iterations)",
        model.version,
        model.link.name(),
        model.n_samples,
        model.n_levels(),
        model.x_ncols,
        thetas.join(", "),
        betas.join(", "),
        model.deviance,
        if model.converged { "yes" } else { "no" },
        model.iterations,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::null_model::tests::small_model;

    #[test]
    fn test_save_load_roundtrip() {
        let model = small_model();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.ordgwas.model");

        save_model(&model, &path).unwrap();
        let loaded = load_model(&path).unwrap();

        assert_eq!(loaded.n_samples, 60);
        assert_eq!(loaded.sample_ids, model.sample_ids);
        assert_eq!(loaded.thetas, model.thetas);
        assert_eq!(loaded.link, model.link);
        assert_eq!(loaded.deviance, model.deviance);
    }

    #[test]
    fn test_rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.model");
        std::fs::write(&path, b"SGMD\x01\x00\x00\x00").unwrap();
        let err = load_model(&path).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_json_sidecar_and_summary() {
        let model = small_model();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        save_model_json(&model, &path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["link"], "Logit");
        assert_eq!(value["n_samples"], 60);

        let summary = model_summary(&model);
        assert!(summary.contains("Link: logit"));
        assert!(summary.contains("Levels: 3"));
    }
}
