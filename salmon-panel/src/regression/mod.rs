//! Régression sur le panel: effets fixes, erreurs-types en clusters
//!
//! Le moteur est derrière le trait [`RegressionEngine`]; [`WithinOls`] est
//! l'implémentation de référence (transformation within + MCO).

mod ols;

pub use ols::WithinOls;

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use watershed_coverage::PanelRow;

/// Échec d'ajustement d'un modèle
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegressionError {
    #[error("Model {model}: no panel rows to fit")]
    EmptyPanel { model: String },

    #[error("Model {model}: no estimable term left after absorbing fixed effects")]
    NoEstimableTerm { model: String },

    #[error("Model {model}: singular design matrix (collinear terms)")]
    Singular { model: String },

    #[error("Model {model}: {observations} observations leave no residual degrees of freedom for {parameters} parameters")]
    DegreesOfFreedom {
        model: String,
        observations: usize,
        parameters: usize,
    },

    #[error("Model {model}: clustered errors need at least two clusters, got {clusters}")]
    TooFewClusters { model: String, clusters: usize },

    #[error("Model {model}: term {term} missing for unit {unit_id}")]
    MissingCovariate {
        model: String,
        term: &'static str,
        unit_id: String,
    },
}

/// Covariable du modèle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    YearOffset,
    PercentProtected,
    /// `year_offset × percent_protected`
    Interaction,
    /// Superficie totale du bassin
    Area,
}

impl Term {
    pub fn name(&self) -> &'static str {
        match self {
            Self::YearOffset => "year_offset",
            Self::PercentProtected => "percent_protected",
            Self::Interaction => "year_offset:percent_protected",
            Self::Area => "area",
        }
    }

    /// Valeur de la covariable pour une ligne; `None` si la superficie manque
    pub fn value(&self, row: &PanelRow) -> Option<f64> {
        match self {
            Self::YearOffset => Some(f64::from(row.year_offset)),
            Self::PercentProtected => Some(row.percent_protected),
            Self::Interaction => Some(f64::from(row.year_offset) * row.percent_protected),
            Self::Area => row.total_area,
        }
    }
}

/// Regroupement des effets fixes et des clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    Unit,
    Watershed,
}

impl Grouping {
    pub fn key<'a>(&self, row: &'a PanelRow) -> &'a str {
        match self {
            Self::Unit => &row.unit_id,
            Self::Watershed => &row.watershed_id,
        }
    }
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit => write!(f, "unit"),
            Self::Watershed => write!(f, "watershed"),
        }
    }
}

/// Spécification d'un modèle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub terms: Vec<Term>,

    #[serde(default)]
    pub fixed_effects: Option<Grouping>,

    #[serde(default)]
    pub cluster: Option<Grouping>,

    /// Restreint l'ajustement à une espèce
    #[serde(default)]
    pub species: Option<String>,
}

impl ModelSpec {
    /// Tendance, protection et interaction; effets fixes et clusters par unité
    pub fn trend_protection() -> Self {
        Self {
            name: "trend_protection".to_string(),
            terms: vec![Term::YearOffset, Term::PercentProtected, Term::Interaction],
            fixed_effects: Some(Grouping::Unit),
            cluster: Some(Grouping::Unit),
            species: None,
        }
    }

    /// Variante avec la superficie du bassin
    pub fn trend_protection_area() -> Self {
        let mut spec = Self::trend_protection();
        spec.name = "trend_protection_area".to_string();
        spec.terms.push(Term::Area);
        spec
    }

    /// Même modèle sans effets fixes, erreurs homoscédastiques
    pub fn pooled() -> Self {
        Self {
            name: "pooled".to_string(),
            terms: vec![Term::YearOffset, Term::PercentProtected, Term::Interaction],
            fixed_effects: None,
            cluster: None,
            species: None,
        }
    }

    /// Lignes concernées par le modèle
    pub fn select<'a>(&self, rows: &'a [PanelRow]) -> Vec<&'a PanelRow> {
        rows.iter()
            .filter(|r| self.species.as_deref().map_or(true, |s| r.species == s))
            .collect()
    }
}

/// Type de matrice de variance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceKind {
    Homoskedastic,
    /// Sandwich CR1 par cluster
    Clustered,
}

/// Estimation d'une covariable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coefficient {
    pub term: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
    pub ci_low: f64,
    pub ci_high: f64,
}

/// Résultat d'un modèle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionResult {
    pub model: String,
    pub engine: String,
    pub observations: usize,

    /// Nombre de groupes d'effets fixes
    pub groups: Option<usize>,
    pub clusters: Option<usize>,

    /// Degrés de liberté de la loi de Student
    pub df: usize,
    pub variance: VarianceKind,
    pub coefficients: Vec<Coefficient>,

    /// Covariables sans variation intra-groupe, omises
    pub absorbed: Vec<String>,
}

impl RegressionResult {
    pub fn coefficient(&self, term: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.term == term)
    }

    /// Tableau des coefficients pour la console
    pub fn display(&self) {
        println!("\n--- MODEL {} ({}) ---", self.model, self.engine);
        println!(
            "Observations: {}, groups: {}, clusters: {}, df: {}",
            self.observations,
            self.groups.map_or("-".to_string(), |g| g.to_string()),
            self.clusters.map_or("-".to_string(), |g| g.to_string()),
            self.df
        );
        println!(
            "  {:<32} {:>12} {:>12} {:>8} {:>12} {:>12}",
            "term", "estimate", "std.error", "t", "ci.low", "ci.high"
        );
        for c in &self.coefficients {
            println!(
                "  {:<32} {:>12.5} {:>12.5} {:>8.3} {:>12.5} {:>12.5}",
                c.term, c.estimate, c.std_error, c.t_value, c.ci_low, c.ci_high
            );
        }
        if !self.absorbed.is_empty() {
            println!("  absorbed: {}", self.absorbed.join(", "));
        }
    }
}

/// Moteur d'estimation
pub trait RegressionEngine {
    fn name(&self) -> &'static str;

    /// Ajuste `spec` sur le panel; fonction pure des lignes et du modèle
    fn fit(&self, rows: &[PanelRow], spec: &ModelSpec) -> Result<RegressionResult, RegressionError>;
}

/// Écrit les résultats en JSON
pub fn save_results(results: &[RegressionResult], path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write model results: {}", path.display()))?;
    Ok(())
}
