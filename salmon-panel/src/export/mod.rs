//! Export des résultats
//!
//! - `tables`: couverture et panel en CSV
//! - `geojson`: bassins avec leur couverture, unions protégées par bassin

pub mod geojson;
pub mod tables;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const COVERAGE_CSV: &str = "coverage.csv";
pub const PANEL_CSV: &str = "panel.csv";
pub const COVERAGE_GEOJSON: &str = "coverage.geojson";
pub const UNION_GEOJSON: &str = "protected_union.geojson";
pub const REPORT_JSON: &str = "report.json";
pub const MODELS_JSON: &str = "models.json";

/// Crée le répertoire de sortie et retourne le chemin d'un fichier
pub fn output_path(dir: &Path, file: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    Ok(dir.join(file))
}
