//! Enchaînement des étapes géométriques, de la validation à la couverture

use tracing::info;

use crate::aggregate::{aggregate_coverage, dissolve_watersheds, CoverageTable};
use crate::crs::Crs;
use crate::filter::{
    filter_protected_areas, filter_watersheds, observed_watershed_ids, CutoffPolicy,
    ProtectedFilterOutcome, WatershedFilterOutcome,
};
use crate::overlay::OverlayEngine;
use crate::panel::PanelConfig;
use crate::repair::{validate_collection, ValidationOutcome};
use crate::types::{IntersectionFragment, PopulationObservation, ProtectedAreaPolygon, WatershedPolygon};
use crate::CoverageError;

/// Résultat complet des étapes 1 à 4
///
/// Les sorties intermédiaires sont conservées pour le rapport et l'export.
#[derive(Debug)]
pub struct CoverageRun {
    pub watershed_validation: ValidationOutcome<WatershedPolygon>,
    pub protected_validation: ValidationOutcome<ProtectedAreaPolygon>,

    /// Nombre de lignes bassin avant dissolution
    pub watershed_rows: usize,
    pub watershed_filter: WatershedFilterOutcome,
    pub protected_filter: ProtectedFilterOutcome,
    pub fragments: Vec<IntersectionFragment>,
    pub coverage: CoverageTable,
}

/// Valide, filtre, intersecte et agrège
///
/// `panel` décide quelles observations rendent un bassin « observé ».
///
/// Les géométries non réparables sont exclues (voir `ValidationOutcome`);
/// les erreurs de configuration et d'intégrité interrompent le run.
pub fn run_coverage(
    watersheds: Vec<WatershedPolygon>,
    protected_areas: Vec<ProtectedAreaPolygon>,
    observations: &[PopulationObservation],
    panel: &PanelConfig,
    policy: CutoffPolicy,
    crs: Crs,
) -> Result<CoverageRun, CoverageError> {
    crs.ensure_planar()?;
    CutoffPolicy::new(policy.cutoff_year)?;

    info!(
        crs = %crs,
        watersheds = watersheds.len(),
        protected_areas = protected_areas.len(),
        observations = observations.len(),
        "Starting coverage run"
    );

    let mut watershed_validation = validate_collection(watersheds);
    let watershed_rows = watershed_validation.valid.len();
    let dissolved = dissolve_watersheds(std::mem::take(&mut watershed_validation.valid));

    let observed = observed_watershed_ids(observations, panel);
    let watershed_filter = filter_watersheds(dissolved, &observed);

    let mut protected_validation = validate_collection(protected_areas);
    let protected_filter =
        filter_protected_areas(std::mem::take(&mut protected_validation.valid), policy);

    let engine = OverlayEngine::new(&protected_filter.retained, crs)?;
    let fragments = engine.intersect(&watershed_filter.retained);

    let coverage = aggregate_coverage(&watershed_filter.retained, &fragments, &crs)?;

    Ok(CoverageRun {
        watershed_validation,
        protected_validation,
        watershed_rows,
        watershed_filter,
        protected_filter,
        fragments,
        coverage,
    })
}
