//! Agrégation de la couverture protégée par bassin
//!
//! Les fragments d'un même bassin sont unis avant toute mesure: deux aires
//! protégées qui se recouvrent ne comptent qu'une fois.

use std::collections::{BTreeMap, BTreeSet};

use geo::{Area, MultiPolygon};
use tracing::{debug, info, warn};

use crate::crs::Crs;
use crate::repair::topology::union_all;
use crate::types::{CoverageRecord, IntersectionFragment, WatershedPolygon};
use crate::CoverageError;

/// Tolérance relative entre aire protégée et aire totale
const AREA_RELATIVE_TOLERANCE: f64 = 1e-6;

/// Table de couverture d'un run
#[derive(Debug, Clone)]
pub struct CoverageTable {
    /// Un enregistrement par bassin, dans l'ordre des bassins
    pub records: Vec<CoverageRecord>,

    /// Union des fragments par bassin (bassins sans recouvrement absents)
    pub unions: BTreeMap<String, MultiPolygon<f64>>,

    /// Bassins sans aucune aire protégée
    pub zero_match: Vec<String>,
}

impl CoverageTable {
    /// Enregistrement d'un bassin
    pub fn get(&self, watershed_id: &str) -> Option<&CoverageRecord> {
        self.records.iter().find(|r| r.watershed_id == watershed_id)
    }

    /// Index identifiant → enregistrement
    pub fn by_watershed(&self) -> BTreeMap<&str, &CoverageRecord> {
        self.records
            .iter()
            .map(|r| (r.watershed_id.as_str(), r))
            .collect()
    }
}

/// Fusionne les lignes partageant un même identifiant de bassin
///
/// La sortie est triée par identifiant; le premier nom non vide est conservé.
pub fn dissolve_watersheds(watersheds: Vec<WatershedPolygon>) -> Vec<WatershedPolygon> {
    let mut groups: BTreeMap<String, (Option<String>, Vec<MultiPolygon<f64>>)> = BTreeMap::new();

    for w in watersheds {
        let entry = groups.entry(w.id).or_insert_with(|| (None, Vec::new()));
        if entry.0.is_none() {
            entry.0 = w.name;
        }
        entry.1.push(w.geometry);
    }

    groups
        .into_iter()
        .map(|(id, (name, parts))| {
            if parts.len() > 1 {
                debug!(watershed_id = %id, parts = parts.len(), "Dissolving watershed rows");
            }
            WatershedPolygon {
                id,
                name,
                geometry: union_all(parts),
            }
        })
        .collect()
}

/// Union des fragments polygonaux, par bassin
pub fn protected_unions(fragments: &[IntersectionFragment]) -> BTreeMap<String, MultiPolygon<f64>> {
    let mut groups: BTreeMap<&str, Vec<MultiPolygon<f64>>> = BTreeMap::new();
    for fragment in fragments.iter().filter(|f| f.is_polygonal()) {
        groups
            .entry(fragment.watershed_id.as_str())
            .or_default()
            .push(fragment.geometry.clone());
    }

    groups
        .into_iter()
        .map(|(id, parts)| (id.to_string(), union_all(parts)))
        .collect()
}

/// Politique « pas d'intersection → aire protégée nulle »
pub fn fill_missing_protected(protected_area: Option<f64>) -> f64 {
    protected_area.unwrap_or(0.0)
}

/// Pourcentage protégé arrondi à l'entier, borné à [0, 100]
///
/// Les demis vont à l'entier pair (0.5 → 0, 1.5 → 2). Vaut 0 quand l'aire
/// totale est nulle ou indéfinie: la régression ne consomme pas de valeurs
/// manquantes.
pub fn percent_protected(protected_area: f64, total_area: f64) -> f64 {
    if !total_area.is_finite() || total_area <= 0.0 || !protected_area.is_finite() {
        return 0.0;
    }
    (100.0 * protected_area / total_area)
        .round_ties_even()
        .clamp(0.0, 100.0)
}

/// Calcule un enregistrement de couverture par bassin
///
/// # Errors
///
/// - `GeographicCrs` si `crs` n'est pas projeté
/// - `JoinIntegrity` si un identifiant est dupliqué, si un fragment vise un
///   bassin inconnu, si l'aire protégée dépasse l'aire totale, ou si un
///   bassin n'a pas exactement un enregistrement
pub fn aggregate_coverage(
    watersheds: &[WatershedPolygon],
    fragments: &[IntersectionFragment],
    crs: &Crs,
) -> Result<CoverageTable, CoverageError> {
    crs.ensure_planar()?;

    let mut seen = BTreeSet::new();
    let duplicates: BTreeSet<&str> = watersheds
        .iter()
        .filter(|w| !seen.insert(w.id.as_str()))
        .map(|w| w.id.as_str())
        .collect();
    if !duplicates.is_empty() {
        return Err(CoverageError::join_integrity(
            "coverage",
            duplicates,
            "duplicate watershed identifiers, rows must be dissolved first",
        ));
    }

    let unions = protected_unions(fragments);

    let orphans: Vec<&str> = unions
        .keys()
        .map(String::as_str)
        .filter(|id| !seen.contains(id))
        .collect();
    if !orphans.is_empty() {
        return Err(CoverageError::join_integrity(
            "coverage",
            orphans,
            "intersection fragments reference unknown watersheds",
        ));
    }

    let mut records = Vec::with_capacity(watersheds.len());
    let mut zero_match = Vec::new();

    for w in watersheds {
        let total_area = w.total_area();
        let union_area = unions.get(&w.id).map(|u| u.unsigned_area());
        if union_area.is_none() {
            zero_match.push(w.id.clone());
        }
        let protected_area = fill_missing_protected(union_area);

        if protected_area > total_area * (1.0 + AREA_RELATIVE_TOLERANCE) {
            return Err(CoverageError::join_integrity(
                "coverage",
                [w.id.as_str()],
                format!("protected area {protected_area} exceeds total area {total_area}"),
            ));
        }
        let protected_area = protected_area.min(total_area);

        if total_area <= 0.0 {
            warn!(watershed_id = %w.id, "Watershed has zero area, percent set to 0");
        }

        records.push(CoverageRecord {
            watershed_id: w.id.clone(),
            total_area,
            protected_area,
            percent_protected: percent_protected(protected_area, total_area),
        });
    }

    check_one_record_per_watershed(watersheds, &records)?;

    info!(
        watersheds = records.len(),
        zero_match = zero_match.len(),
        "Aggregated coverage"
    );

    Ok(CoverageTable {
        records,
        unions,
        zero_match,
    })
}

/// Chaque bassin doit avoir exactement un enregistrement
pub fn check_one_record_per_watershed(
    watersheds: &[WatershedPolygon],
    records: &[CoverageRecord],
) -> Result<(), CoverageError> {
    let mut counts: BTreeMap<&str, usize> = watersheds.iter().map(|w| (w.id.as_str(), 0)).collect();
    let mut unexpected = Vec::new();

    for r in records {
        match counts.get_mut(r.watershed_id.as_str()) {
            Some(count) => *count += 1,
            None => unexpected.push(r.watershed_id.as_str()),
        }
    }
    if !unexpected.is_empty() {
        return Err(CoverageError::join_integrity(
            "coverage",
            unexpected,
            "coverage records without a watershed",
        ));
    }

    let missing: Vec<&str> = counts
        .iter()
        .filter(|(_, &n)| n == 0)
        .map(|(&id, _)| id)
        .collect();
    if !missing.is_empty() {
        return Err(CoverageError::join_integrity(
            "coverage",
            missing,
            "watersheds without a coverage record",
        ));
    }

    let duplicated: Vec<&str> = counts
        .iter()
        .filter(|(_, &n)| n > 1)
        .map(|(&id, _)| id)
        .collect();
    if !duplicated.is_empty() {
        return Err(CoverageError::join_integrity(
            "coverage",
            duplicated,
            "watersheds with several coverage records",
        ));
    }

    Ok(())
}
