//! Configuration d'un run

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use watershed_coverage::{CoverageError, Crs, CutoffPolicy, PanelConfig};

use crate::regression::ModelSpec;

/// Presets embarqués
pub const PRESETS: [&str; 2] = ["watershed", "population"];

/// Configuration principale
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// CRS de travail, projeté
    pub crs_epsg: u32,

    /// Les aires protégées établies à partir de cette année sont écartées
    pub cutoff_year: i32,

    /// Encodage de repli du tableau de populations (sans BOM)
    pub encoding: String,

    pub fields: FieldNames,
    pub panel: PanelConfig,
    pub models: Vec<ModelSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crs_epsg: Crs::CALIFORNIA_ALBERS.epsg,
            cutoff_year: CutoffPolicy::default().cutoff_year,
            encoding: "utf-8".to_string(),
            fields: FieldNames::default(),
            panel: PanelConfig::default(),
            models: vec![ModelSpec::trend_protection(), ModelSpec::trend_protection_area()],
        }
    }
}

/// Noms des champs des couches
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FieldNames {
    pub watershed_id: String,
    pub watershed_name: String,
    pub protected_name: String,
    pub protected_year: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            watershed_id: "GEO_ID_POLY".to_string(),
            watershed_name: "Watershed".to_string(),
            protected_name: "UNIT_NAME".to_string(),
            protected_year: "YR_EST".to_string(),
        }
    }
}

impl Config {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Charge une configuration depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "watershed" => Self::load_embedded(include_str!("presets/watershed.json")),
            "population" => Self::load_embedded(include_str!("presets/population.json")),
            _ => anyhow::bail!("Unknown preset: {}. Use: {}", preset, PRESETS.join(", ")),
        }
    }

    /// Nom de preset ou chemin de fichier JSON
    pub fn resolve(spec: &str) -> Result<Self> {
        if PRESETS.contains(&spec) {
            Self::from_preset(spec)
        } else {
            Self::load(Path::new(spec))
        }
    }

    fn load_embedded(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse embedded config")
    }

    pub fn crs(&self) -> Result<Crs, CoverageError> {
        Crs::planar(self.crs_epsg)
    }

    pub fn cutoff(&self) -> Result<CutoffPolicy, CoverageError> {
        CutoffPolicy::new(self.cutoff_year)
    }

    /// Contrôle des années, du CRS et des modèles
    pub fn validate(&self) -> Result<(), CoverageError> {
        self.crs()?;
        self.cutoff()?;
        self.panel.baseline.validate()?;

        if !self.panel.usable_threshold.is_finite() {
            return Err(CoverageError::Configuration(format!(
                "usable threshold must be finite, got {}",
                self.panel.usable_threshold
            )));
        }
        if encoding_rs::Encoding::for_label(self.encoding.as_bytes()).is_none() {
            return Err(CoverageError::Configuration(format!(
                "unknown text encoding: {}",
                self.encoding
            )));
        }
        for model in &self.models {
            if model.name.trim().is_empty() || model.terms.is_empty() {
                return Err(CoverageError::Configuration(format!(
                    "model {:?} needs a name and at least one term",
                    model.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watershed_coverage::{ErrorKind, PanelUnit};

    #[test]
    fn test_presets_parse_and_validate() {
        for preset in PRESETS {
            let config = Config::from_preset(preset).unwrap();
            config.validate().unwrap();
            assert_eq!(config.crs_epsg, 3310);
            assert_eq!(config.cutoff_year, 1981);
        }
        assert_eq!(
            Config::from_preset("population").unwrap().panel.unit,
            PanelUnit::Population
        );
    }

    #[test]
    fn test_watershed_preset_matches_default() {
        assert_eq!(Config::from_preset("watershed").unwrap(), Config::default());
    }

    #[test]
    fn test_unknown_preset() {
        assert!(Config::from_preset("nope").is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"cutoff_year": 1990, "panel": {"baseline": {"per_species": {"Chinook salmon": 1985}}}}"#,
        )
        .unwrap();
        assert_eq!(config.cutoff_year, 1990);
        assert_eq!(config.fields.protected_year, "YR_EST");
        assert_eq!(config.panel.baseline.default_year, 1981);
        assert_eq!(config.panel.baseline.baseline_for("Chinook salmon"), 1985);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_geographic_crs() {
        let config = Config {
            crs_epsg: 4326,
            ..Config::default()
        };
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_validate_rejects_implausible_years() {
        let config = Config {
            cutoff_year: 1200,
            ..Config::default()
        };
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::Configuration);

        let mut config = Config::default();
        config.panel.baseline.default_year = 3000;
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_validate_rejects_unknown_encoding() {
        let config = Config {
            encoding: "klingon".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join("salmon_panel_config_test.json");
        std::fs::write(&path, r#"{"crs_epsg": 26910}"#).unwrap();

        let config = Config::resolve(path.to_str().unwrap()).unwrap();
        assert_eq!(config.crs().unwrap().epsg, 26910);

        std::fs::remove_file(path).ok();
    }
}
