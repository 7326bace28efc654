//! Filtres spatiaux: bassins observés et aires protégées antérieures au seuil

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::panel::{select_adult_observations, PanelConfig};
use crate::types::{PopulationObservation, ProtectedAreaPolygon, WatershedPolygon};
use crate::CoverageError;

/// Bornes plausibles pour toute année de configuration
pub const PLAUSIBLE_YEARS: std::ops::RangeInclusive<i32> = 1850..=2100;

/// Politique de seuil sur l'année d'établissement
///
/// Une aire est retenue si son année est inconnue ou strictement antérieure
/// au seuil. Les années inconnues sont incluses par prudence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutoffPolicy {
    pub cutoff_year: i32,
}

impl Default for CutoffPolicy {
    fn default() -> Self {
        Self { cutoff_year: 1981 }
    }
}

impl CutoffPolicy {
    /// Crée une politique après contrôle de plage
    pub fn new(cutoff_year: i32) -> Result<Self, CoverageError> {
        if !PLAUSIBLE_YEARS.contains(&cutoff_year) {
            return Err(CoverageError::Configuration(format!(
                "cutoff year {cutoff_year} outside {}..={}",
                PLAUSIBLE_YEARS.start(),
                PLAUSIBLE_YEARS.end()
            )));
        }
        Ok(Self { cutoff_year })
    }

    /// L'aire établie en `year` est-elle retenue ?
    pub fn retains(&self, year: Option<i32>) -> bool {
        match year {
            None => true,
            Some(y) => y < self.cutoff_year,
        }
    }
}

/// Bassins conservés et identifiants écartés
#[derive(Debug)]
pub struct WatershedFilterOutcome {
    pub retained: Vec<WatershedPolygon>,

    /// Bassins sans aucune observation
    pub dropped: Vec<String>,
}

/// Aires protégées conservées et compteurs associés
#[derive(Debug)]
pub struct ProtectedFilterOutcome {
    pub retained: Vec<ProtectedAreaPolygon>,

    /// Nombre d'aires postérieures au seuil
    pub excluded: usize,

    /// Nombre d'aires d'année inconnue (toutes retenues)
    pub unknown_year: usize,

    /// Nombre d'aires en entrée
    pub total: usize,
}

impl ProtectedFilterOutcome {
    /// Part des années d'établissement inconnues, en pourcentage
    pub fn unknown_year_percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * self.unknown_year as f64 / self.total as f64
        }
    }
}

/// Identifiants spatiaux des observations qui entreront dans le panel
///
/// Même sélection que le panel: stade de vie, métriques autorisées, clé
/// spatiale renseignée. Un bassin suivi seulement au stade juvénile n'est
/// donc pas retenu.
pub fn observed_watershed_ids(
    observations: &[PopulationObservation],
    panel: &PanelConfig,
) -> BTreeSet<String> {
    select_adult_observations(observations, panel)
        .rows
        .into_iter()
        .filter_map(|o| o.geo_id.as_deref())
        .map(|id| id.trim().to_string())
        .collect()
}

/// Conserve les bassins dont l'identifiant a été observé
pub fn filter_watersheds(
    watersheds: Vec<WatershedPolygon>,
    observed: &BTreeSet<String>,
) -> WatershedFilterOutcome {
    let (retained, dropped): (Vec<_>, Vec<_>) = watersheds
        .into_iter()
        .partition(|w| observed.contains(&w.id));

    let dropped: Vec<String> = dropped.into_iter().map(|w| w.id).collect();

    info!(
        retained = retained.len(),
        dropped = dropped.len(),
        "Filtered watersheds without observations"
    );

    WatershedFilterOutcome { retained, dropped }
}

/// Applique la politique de seuil aux aires protégées
pub fn filter_protected_areas(
    areas: Vec<ProtectedAreaPolygon>,
    policy: CutoffPolicy,
) -> ProtectedFilterOutcome {
    let total = areas.len();
    let unknown_year = areas.iter().filter(|a| a.year_established.is_none()).count();

    let retained: Vec<ProtectedAreaPolygon> = areas
        .into_iter()
        .filter(|a| policy.retains(a.year_established))
        .collect();

    let outcome = ProtectedFilterOutcome {
        excluded: total - retained.len(),
        retained,
        unknown_year,
        total,
    };

    info!(
        cutoff_year = policy.cutoff_year,
        retained = outcome.retained.len(),
        excluded = outcome.excluded,
        unknown_year_pct = %format!("{:.1}", outcome.unknown_year_percent()),
        "Filtered protected areas"
    );

    outcome
}
