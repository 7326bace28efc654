//! Enchaînement complet: chargement, couverture, panel, modèles
//!
//! Le rapport est tenu par le [`Pipeline`] et reste disponible quand une
//! étape échoue, pour être sauvegardé avec le statut `Failed`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, warn};

use watershed_coverage::{
    build_panel, run_coverage, CoverageRun, Panel, ProtectedAreaPolygon, WatershedPolygon,
};

use crate::config::Config;
use crate::export::{self, geojson, tables};
use crate::io::{self, Layer, PopulationTable};
use crate::regression::{self, RegressionEngine, RegressionResult};
use crate::report::RunReport;
use crate::reproject::align_layer;

/// Chemins des trois entrées
#[derive(Debug, Clone)]
pub struct Inputs {
    pub watersheds: PathBuf,
    pub protected: PathBuf,
    pub population: PathBuf,
}

/// Dernière étape à exécuter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Validation, filtres, intersection, couverture
    Coverage,
    /// Plus le panel
    Panel,
    /// Plus les modèles
    Fit,
}

/// Entrées chargées et alignées sur le CRS de travail
#[derive(Debug)]
pub struct LoadedInputs {
    pub watersheds: Layer<WatershedPolygon>,
    pub protected: Layer<ProtectedAreaPolygon>,
    pub population: PopulationTable,
}

/// Sorties d'un run
#[derive(Debug)]
pub struct RunOutput {
    pub coverage: CoverageRun,
    pub panel: Option<Panel>,
    pub models: Vec<RegressionResult>,
}

pub struct Pipeline<'a> {
    config: &'a Config,
    pub report: RunReport,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, command: &str) -> Self {
        let mut report = RunReport::new(command);
        report.crs = config
            .crs()
            .map(|c| c.to_string())
            .unwrap_or_else(|_| format!("EPSG:{}", config.crs_epsg));
        Self { config, report }
    }

    /// Lit les trois entrées, enregistre leurs empreintes et aligne les CRS
    pub fn load(&mut self, inputs: &Inputs) -> Result<LoadedInputs> {
        let crs = self.config.crs()?;

        for (name, path) in [
            ("watersheds", &inputs.watersheds),
            ("protected", &inputs.protected),
            ("population", &inputs.population),
        ] {
            self.report.record_checksum(name, io::file_checksum(path)?);
        }

        let mut watersheds = io::load_watersheds(&inputs.watersheds, &self.config.fields)?;
        watersheds.items = align_layer(
            "watersheds",
            std::mem::take(&mut watersheds.items),
            watersheds.declared_epsg,
            &crs,
        )?;

        let mut protected = io::load_protected_areas(&inputs.protected, &self.config.fields)?;
        protected.items = align_layer(
            "protected",
            std::mem::take(&mut protected.items),
            protected.declared_epsg,
            &crs,
        )?;

        let population = io::load_population_table(&inputs.population, &self.config.encoding)?;

        Ok(LoadedInputs {
            watersheds,
            protected,
            population,
        })
    }

    /// Exécute les étapes jusqu'à `stage`
    pub fn execute(
        &mut self,
        loaded: LoadedInputs,
        stage: Stage,
        engine: &dyn RegressionEngine,
    ) -> Result<RunOutput> {
        let config = self.config;
        let crs = config.crs()?;
        let cutoff = config.cutoff()?;

        self.report.record_watershed_layer(&loaded.watersheds);
        self.report.record_protected_layer(&loaded.protected);
        self.report.record_population_table(&loaded.population);

        let observations = loaded.population.observations;
        let coverage = run_coverage(
            loaded.watersheds.items,
            loaded.protected.items,
            &observations,
            &config.panel,
            cutoff,
            crs,
        )
        .map_err(|e| {
            self.report.record_coverage_error("coverage", &e);
            e
        })?;
        self.report.record_coverage(&coverage);

        info!(
            records = coverage.coverage.records.len(),
            zero_match = coverage.coverage.zero_match.len(),
            "Coverage computed"
        );

        if stage == Stage::Coverage {
            return Ok(RunOutput {
                coverage,
                panel: None,
                models: Vec::new(),
            });
        }

        let panel = build_panel(&observations, &coverage.coverage, &config.panel).map_err(|e| {
            self.report.record_coverage_error("panel", &e);
            e
        })?;
        self.report.record_panel(&panel.stats);

        let mut models = Vec::new();
        if stage == Stage::Fit {
            for spec in &config.models {
                match engine.fit(&panel.rows, spec) {
                    Ok(result) => {
                        self.report.record_model_success();
                        models.push(result);
                    }
                    Err(e) => {
                        warn!(model = %spec.name, error = %e, "Model not fitted");
                        self.report.record_model_failure(&spec.name, &e.to_string());
                    }
                }
            }
        }

        Ok(RunOutput {
            coverage,
            panel: Some(panel),
            models,
        })
    }

    /// Finalise le rapport et l'écrit à côté des autres sorties
    pub fn finish(&mut self, output_dir: &Path) -> Result<PathBuf> {
        self.report.finalize();
        let path = export::output_path(output_dir, export::REPORT_JSON)?;
        self.report.save_to_file(&path)?;
        Ok(path)
    }
}

/// Écrit les sorties disponibles
pub fn write_outputs(output: &RunOutput, config: &Config, output_dir: &Path) -> Result<()> {
    let crs = config.crs()?;
    let coverage = &output.coverage.coverage;

    tables::export_coverage(
        &coverage.records,
        &export::output_path(output_dir, export::COVERAGE_CSV)?,
    )?;
    geojson::export_to_geojson(
        &geojson::coverage_features(&output.coverage.watershed_filter.retained, coverage),
        &crs,
        &export::output_path(output_dir, export::COVERAGE_GEOJSON)?,
    )?;
    geojson::export_to_geojson(
        &geojson::union_features(coverage),
        &crs,
        &export::output_path(output_dir, export::UNION_GEOJSON)?,
    )?;

    if let Some(panel) = &output.panel {
        tables::export_panel(&panel.rows, &export::output_path(output_dir, export::PANEL_CSV)?)?;
    }

    if !output.models.is_empty() {
        regression::save_results(
            &output.models,
            &export::output_path(output_dir, export::MODELS_JSON)?,
        )?;
    }

    Ok(())
}
