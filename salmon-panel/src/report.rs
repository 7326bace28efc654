//! Rapport de run avec dégradation gracieuse
//!
//! Collecte les compteurs de chaque étape et les entités écartées, pour
//! affichage console et sauvegarde JSON.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use watershed_coverage::{CoverageError, CoverageRun, ErrorKind, PanelStats};

use crate::io::{Layer, PopulationTable};

/// Statut global du run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    /// Run complet sans entité écartée
    Success,
    /// Sorties produites, certaines entités écartées
    PartialSuccess,
    /// Run interrompu
    Failed,
}

/// Niveau de sévérité
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IssueLevel {
    /// Run interrompu
    Fatal,
    /// Entité écartée
    Error,
    /// Entité conservée avec correction
    Warning,
}

/// Problème rencontré pendant le run
#[derive(Debug, Clone, Serialize)]
pub struct RunIssue {
    pub level: IssueLevel,

    /// Étape: load, validate, coverage, panel, fit
    pub stage: String,
    pub entity_id: Option<String>,
    pub message: String,
}

/// Rapport complet d'un run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub command: String,
    pub crs: String,
    pub duration_secs: f64,
    pub status: RunStatus,

    // Bassins
    pub watersheds_loaded: usize,
    pub watersheds_skipped: usize,
    pub watersheds_repaired: usize,
    pub watersheds_rejected: usize,
    /// Lignes valides avant dissolution par identifiant
    pub watershed_rows: usize,
    pub watersheds_retained: usize,
    pub watersheds_dropped: usize,

    // Aires protégées
    pub protected_loaded: usize,
    pub protected_skipped: usize,
    pub protected_repaired: usize,
    pub protected_rejected: usize,
    pub protected_retained: usize,
    pub protected_excluded: usize,
    pub unknown_year_percent: f64,

    // Couverture
    pub fragments: usize,
    pub coverage_records: usize,
    pub zero_match: usize,

    // Populations et panel
    pub observation_rows: usize,
    pub observations_rejected: usize,
    pub panel_rows: usize,
    pub units_usable: usize,
    pub units_unusable: usize,
    pub rows_filled_coverage: usize,

    // Modèles
    pub models_fitted: usize,
    pub models_failed: usize,

    /// Empreinte blake3 de chaque entrée
    pub checksums: BTreeMap<String, String>,

    pub issues: Vec<RunIssue>,
}

impl RunReport {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            crs: String::new(),
            duration_secs: 0.0,
            status: RunStatus::Success,
            watersheds_loaded: 0,
            watersheds_skipped: 0,
            watersheds_repaired: 0,
            watersheds_rejected: 0,
            watershed_rows: 0,
            watersheds_retained: 0,
            watersheds_dropped: 0,
            protected_loaded: 0,
            protected_skipped: 0,
            protected_repaired: 0,
            protected_rejected: 0,
            protected_retained: 0,
            protected_excluded: 0,
            unknown_year_percent: 0.0,
            fragments: 0,
            coverage_records: 0,
            zero_match: 0,
            observation_rows: 0,
            observations_rejected: 0,
            panel_rows: 0,
            units_usable: 0,
            units_unusable: 0,
            rows_filled_coverage: 0,
            models_fitted: 0,
            models_failed: 0,
            checksums: BTreeMap::new(),
            issues: Vec::new(),
        }
    }

    pub fn record_issue(
        &mut self,
        level: IssueLevel,
        stage: &str,
        entity_id: Option<&str>,
        message: impl Into<String>,
    ) {
        self.issues.push(RunIssue {
            level,
            stage: stage.to_string(),
            entity_id: entity_id.map(str::to_string),
            message: message.into(),
        });
    }

    /// Enregistre une erreur du pipeline; les erreurs de qualité écartent une entité
    pub fn record_coverage_error(&mut self, stage: &str, error: &CoverageError) {
        let level = match error.kind() {
            ErrorKind::DataQuality => IssueLevel::Error,
            ErrorKind::JoinIntegrity | ErrorKind::Configuration => IssueLevel::Fatal,
        };
        self.record_issue(level, stage, error.entity_id(), error.to_string());
    }

    pub fn record_checksum(&mut self, input: &str, checksum: String) {
        self.checksums.insert(input.to_string(), checksum);
    }

    pub fn record_watershed_layer<T>(&mut self, layer: &Layer<T>) {
        self.watersheds_loaded = layer.items.len();
        self.watersheds_skipped = layer.skipped.len();
        for e in &layer.skipped {
            self.record_coverage_error("load", e);
        }
    }

    pub fn record_protected_layer<T>(&mut self, layer: &Layer<T>) {
        self.protected_loaded = layer.items.len();
        self.protected_skipped = layer.skipped.len();
        for e in &layer.skipped {
            self.record_coverage_error("load", e);
        }
    }

    pub fn record_population_table(&mut self, table: &PopulationTable) {
        self.observation_rows = table.rows;
        self.observations_rejected = table.rejected.len();
        for e in &table.rejected {
            self.record_coverage_error("load", e);
        }
    }

    /// Compteurs des étapes 1 à 4
    pub fn record_coverage(&mut self, run: &CoverageRun) {
        self.watersheds_repaired = run.watershed_validation.repaired.len();
        self.watersheds_rejected = run.watershed_validation.rejected.len();
        self.watershed_rows = run.watershed_rows;
        self.watersheds_retained = run.watershed_filter.retained.len();
        self.watersheds_dropped = run.watershed_filter.dropped.len();

        self.protected_repaired = run.protected_validation.repaired.len();
        self.protected_rejected = run.protected_validation.rejected.len();
        self.protected_retained = run.protected_filter.retained.len();
        self.protected_excluded = run.protected_filter.excluded;
        self.unknown_year_percent = run.protected_filter.unknown_year_percent();

        self.fragments = run.fragments.len();
        self.coverage_records = run.coverage.records.len();
        self.zero_match = run.coverage.zero_match.len();

        for id in run
            .watershed_validation
            .repaired
            .iter()
            .chain(&run.protected_validation.repaired)
        {
            self.record_issue(
                IssueLevel::Warning,
                "validate",
                Some(id.as_str()),
                "geometry repaired",
            );
        }
        for e in run
            .watershed_validation
            .rejected
            .iter()
            .chain(&run.protected_validation.rejected)
        {
            self.record_coverage_error("validate", e);
        }
    }

    /// Compteurs de l'étape 5
    pub fn record_panel(&mut self, stats: &PanelStats) {
        self.panel_rows = stats.rows;
        self.units_usable = stats.usable_units;
        self.units_unusable = stats.unusable_units.len();
        self.rows_filled_coverage = stats.rows_filled_coverage;

        for id in &stats.filled_watersheds {
            self.record_issue(
                IssueLevel::Warning,
                "panel",
                Some(id.as_str()),
                "no coverage record, percent protected set to 0",
            );
        }
        for population in &stats.missing_geo_populations {
            self.record_issue(
                IssueLevel::Warning,
                "panel",
                Some(population.as_str()),
                "observations without GEO_ID_POLY dropped",
            );
        }
    }

    pub fn record_model_success(&mut self) {
        self.models_fitted += 1;
    }

    pub fn record_model_failure(&mut self, model: &str, message: &str) {
        self.models_failed += 1;
        self.record_issue(IssueLevel::Error, "fit", Some(model), message);
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    fn count(&self, level: IssueLevel) -> usize {
        self.issues.iter().filter(|i| i.level == level).count()
    }

    pub fn has_fatal(&self) -> bool {
        self.count(IssueLevel::Fatal) > 0
    }

    /// Détermine le statut final
    pub fn finalize(&mut self) {
        let has_fatal = self.has_fatal();
        let has_errors = self.count(IssueLevel::Error) > 0;
        let has_output = self.coverage_records > 0;

        self.status = if has_fatal || (has_errors && !has_output) {
            RunStatus::Failed
        } else if has_errors {
            RunStatus::PartialSuccess
        } else {
            RunStatus::Success
        };
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("RUN REPORT - {} ({})", self.command, self.crs);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);

        println!("\n--- WATERSHEDS ---");
        println!(
            "{} loaded, {} skipped, {} repaired, {} rejected",
            self.watersheds_loaded,
            self.watersheds_skipped,
            self.watersheds_repaired,
            self.watersheds_rejected
        );
        println!(
            "{} rows dissolved, {} retained, {} without observations",
            self.watershed_rows, self.watersheds_retained, self.watersheds_dropped
        );

        println!("\n--- PROTECTED AREAS ---");
        println!(
            "{} loaded, {} skipped, {} repaired, {} rejected",
            self.protected_loaded,
            self.protected_skipped,
            self.protected_repaired,
            self.protected_rejected
        );
        println!(
            "{} retained, {} established after cutoff, {:.1}% with unknown year",
            self.protected_retained, self.protected_excluded, self.unknown_year_percent
        );

        println!("\n--- COVERAGE ---");
        println!(
            "{} fragments, {} records, {} watersheds without protected land",
            self.fragments, self.coverage_records, self.zero_match
        );

        if self.observation_rows > 0 {
            println!("\n--- PANEL ---");
            println!(
                "{} observation rows, {} rejected",
                self.observation_rows, self.observations_rejected
            );
            println!(
                "{} panel rows, {} usable units, {} unusable, {} rows with filled coverage",
                self.panel_rows, self.units_usable, self.units_unusable, self.rows_filled_coverage
            );
        }

        if self.models_fitted + self.models_failed > 0 {
            println!("\n--- MODELS ---");
            println!("{} fitted, {} failed", self.models_fitted, self.models_failed);
        }

        if !self.checksums.is_empty() {
            println!("\n--- INPUTS ---");
            for (input, checksum) in &self.checksums {
                println!("  {}: {}", input, &checksum[..checksum.len().min(16)]);
            }
        }

        let warnings: Vec<&RunIssue> = self
            .issues
            .iter()
            .filter(|i| i.level == IssueLevel::Warning)
            .collect();
        if !warnings.is_empty() {
            println!("\n--- WARNINGS ({}) ---", warnings.len());
            for w in warnings.iter().take(10) {
                println!(
                    "  [{}] {}: {}",
                    w.stage,
                    w.entity_id.as_deref().unwrap_or("-"),
                    w.message
                );
            }
            if warnings.len() > 10 {
                println!("  ... and {} more", warnings.len() - 10);
            }
        }

        let errors: Vec<&RunIssue> = self
            .issues
            .iter()
            .filter(|i| i.level != IssueLevel::Warning)
            .collect();
        if !errors.is_empty() {
            println!("\n--- ERRORS ({}) ---", errors.len());
            for e in errors.iter().take(20) {
                let location = match &e.entity_id {
                    Some(id) => format!("[{}:{}]", e.stage, id),
                    None => format!("[{}]", e.stage),
                };
                println!("  {:?} {} {}", e.level, location, e.message);
            }
            if errors.len() > 20 {
                println!("  ... and {} more", errors.len() - 20);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{}: {} coverage records, {} panel rows, {} models, {} errors, {} warnings",
            self.command,
            self.coverage_records,
            self.panel_rows,
            self.models_fitted,
            self.count(IssueLevel::Error) + self.count(IssueLevel::Fatal),
            self.count(IssueLevel::Warning)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_report_new() {
        let report = RunReport::new("coverage");
        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.command, "coverage");
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_record_coverage_error_levels() {
        let mut report = RunReport::new("panel");
        report.record_coverage_error("validate", &CoverageError::repair_failed("W9", "empty"));
        report.record_coverage_error(
            "panel",
            &CoverageError::join_integrity("panel", ["P1"], "fan-out"),
        );

        assert_eq!(report.issues[0].level, IssueLevel::Error);
        assert_eq!(report.issues[0].entity_id.as_deref(), Some("W9"));
        assert_eq!(report.issues[1].level, IssueLevel::Fatal);
    }

    #[test]
    fn test_finalize_success_with_warnings_only() {
        let mut report = RunReport::new("coverage");
        report.coverage_records = 4;
        report.record_issue(IssueLevel::Warning, "validate", Some("E"), "geometry repaired");
        report.finalize();
        assert_eq!(report.status, RunStatus::Success);
    }

    #[test]
    fn test_finalize_partial_success() {
        let mut report = RunReport::new("coverage");
        report.coverage_records = 4;
        report.record_coverage_error("validate", &CoverageError::repair_failed("F", "degenerate"));
        report.finalize();
        assert_eq!(report.status, RunStatus::PartialSuccess);
    }

    #[test]
    fn test_finalize_failed() {
        let mut report = RunReport::new("coverage");
        report.coverage_records = 4;
        report.record_coverage_error(
            "coverage",
            &CoverageError::Configuration("cutoff year 1200".to_string()),
        );
        report.finalize();
        assert_eq!(report.status, RunStatus::Failed);

        let mut empty = RunReport::new("coverage");
        empty.record_coverage_error("validate", &CoverageError::repair_failed("F", "degenerate"));
        empty.finalize();
        assert_eq!(empty.status, RunStatus::Failed);
    }

    #[test]
    fn test_model_counters() {
        let mut report = RunReport::new("fit");
        report.record_model_success();
        report.record_model_failure("pooled", "singular design matrix");
        assert_eq!(report.models_fitted, 1);
        assert_eq!(report.models_failed, 1);
        assert_eq!(report.issues[0].stage, "fit");
    }

    #[test]
    fn test_summary() {
        let mut report = RunReport::new("panel");
        report.coverage_records = 12;
        report.panel_rows = 340;

        let summary = report.summary();
        assert!(summary.contains("panel"));
        assert!(summary.contains("12 coverage records"));
        assert!(summary.contains("340 panel rows"));
    }

    #[test]
    fn test_save_to_file() {
        let mut report = RunReport::new("coverage");
        report.record_checksum("watersheds", "abc123".to_string());

        let path = std::env::temp_dir().join("salmon_panel_report_test.json");
        report.save_to_file(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(r#""status": "Success""#));
        assert!(content.contains("abc123"));

        std::fs::remove_file(path).ok();
    }
}
