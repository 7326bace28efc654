//! Validation et réparation des géométries
//!
//! Équivalent d'un `buffer(0)` qui ne perd pas d'aire: les rings
//! auto-intersectants sont découpés en boucles simples, chaque polygone est
//! reconstruit avec ses propres trous, puis les polygones sont dissous.

pub mod ring;
pub mod topology;

use geo::orient::{Direction, Orient};
use geo::{
    Area, BooleanOps, BoundingRect, Contains, Intersects, LineString, MultiPolygon, Polygon, Rect,
};
use tracing::{debug, warn};

use crate::types::{ProtectedAreaPolygon, WatershedPolygon};
use crate::CoverageError;

/// Entité portant une géométrie polygonale réparable
pub trait Polygonal: Sized {
    /// Identifiant utilisé dans les erreurs et les logs
    fn label(&self) -> &str;

    fn geometry(&self) -> &MultiPolygon<f64>;

    fn with_geometry(self, geometry: MultiPolygon<f64>) -> Self;
}

impl Polygonal for WatershedPolygon {
    fn label(&self) -> &str {
        &self.id
    }

    fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    fn with_geometry(self, geometry: MultiPolygon<f64>) -> Self {
        Self { geometry, ..self }
    }
}

impl Polygonal for ProtectedAreaPolygon {
    fn label(&self) -> &str {
        &self.name
    }

    fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    fn with_geometry(self, geometry: MultiPolygon<f64>) -> Self {
        Self { geometry, ..self }
    }
}

/// Résultat de la validation d'une collection
#[derive(Debug)]
pub struct ValidationOutcome<T> {
    /// Entités valides (réparées ou non), dans l'ordre d'entrée
    pub valid: Vec<T>,

    /// Identifiants des entités réparées
    pub repaired: Vec<String>,

    /// Entités exclues, une erreur chacune
    pub rejected: Vec<CoverageError>,
}

/// Valide chaque entité et répare celles qui doivent l'être
///
/// Une entité non réparable est exclue et son erreur conservée: le run
/// continue avec une couverture réduite.
pub fn validate_collection<T: Polygonal>(items: Vec<T>) -> ValidationOutcome<T> {
    let mut outcome = ValidationOutcome {
        valid: Vec::with_capacity(items.len()),
        repaired: Vec::new(),
        rejected: Vec::new(),
    };

    for item in items {
        match check_validity(item.geometry()) {
            Ok(()) => {
                let oriented = item.geometry().orient(Direction::Default);
                outcome.valid.push(item.with_geometry(oriented));
            }
            Err(reason) => {
                debug!(entity_id = %item.label(), reason = %reason, "Invalid geometry, repairing");
                match repair(item.label(), item.geometry()) {
                    Ok(geometry) => {
                        warn!(entity_id = %item.label(), reason = %reason, "Repaired invalid geometry");
                        outcome.repaired.push(item.label().to_string());
                        outcome.valid.push(item.with_geometry(geometry));
                    }
                    Err(e) => {
                        warn!(entity_id = %item.label(), error = %e, "Excluding unrepairable geometry");
                        outcome.rejected.push(e);
                    }
                }
            }
        }
    }

    outcome
}

/// Vérifie la validité OGC d'un multipolygone
///
/// Retourne la raison de l'invalidité.
pub fn check_validity(geom: &MultiPolygon<f64>) -> Result<(), String> {
    if geom.0.is_empty() {
        return Err("empty geometry".to_string());
    }

    for (idx, polygon) in geom.0.iter().enumerate() {
        check_ring(polygon.exterior()).map_err(|r| format!("polygon {idx} exterior: {r}"))?;
        for interior in polygon.interiors() {
            check_ring(interior).map_err(|r| format!("polygon {idx} interior: {r}"))?;
            let shell = Polygon::new(polygon.exterior().clone(), vec![]);
            if !shell.contains(&Polygon::new(interior.clone(), vec![])) {
                return Err(format!("polygon {idx} has a hole outside its shell"));
            }
        }
    }

    // Les composantes d'un multipolygone ne doivent pas se recouvrir
    let rects: Vec<Option<Rect<f64>>> = geom.0.iter().map(|p| p.bounding_rect()).collect();
    for i in 0..geom.0.len() {
        for j in (i + 1)..geom.0.len() {
            let (Some(a), Some(b)) = (rects[i], rects[j]) else {
                continue;
            };
            if !a.intersects(&b) {
                continue;
            }
            let shared = geom.0[i].intersection(&geom.0[j]).unsigned_area();
            if shared > ring::AREA_EPSILON {
                return Err(format!("polygons {i} and {j} overlap"));
            }
        }
    }

    Ok(())
}

fn check_ring(ring: &LineString<f64>) -> Result<(), String> {
    if ring.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err("non-finite coordinate".to_string());
    }
    if ring.0.len() < 4 {
        return Err(format!("{} coordinates, at least 4 required", ring.0.len()));
    }
    if !ring.is_closed() {
        return Err("ring is not closed".to_string());
    }
    let open = ring::open_ring(ring);
    if open.len() + 1 != ring.0.len() {
        return Err("repeated consecutive vertices".to_string());
    }
    if ring::ring_area(&open) <= ring::AREA_EPSILON {
        return Err("ring encloses no area".to_string());
    }
    if !ring::is_simple(&open) {
        return Err("self-intersection".to_string());
    }
    Ok(())
}

/// Répare un multipolygone invalide
///
/// # Errors
///
/// `RepairFailed` si une coordonnée n'est pas finie ou si rien ne reste
/// après réparation.
pub fn repair(entity_id: &str, geom: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, CoverageError> {
    let finite = geom
        .0
        .iter()
        .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
        .flat_map(|r| r.0.iter())
        .all(|c| c.x.is_finite() && c.y.is_finite());
    if !finite {
        return Err(CoverageError::repair_failed(entity_id, "non-finite coordinate"));
    }

    // Chaque polygone garde ses propres trous: un îlot situé dans le trou
    // d'un autre polygone n'est pas effacé
    let mut parts = Vec::with_capacity(geom.0.len());
    for polygon in &geom.0 {
        let shells = ring::simple_loops(polygon.exterior());
        if shells.is_empty() {
            continue;
        }
        let holes: Vec<_> = polygon.interiors().iter().flat_map(ring::simple_loops).collect();
        parts.push(topology::assemble(&shells, &holes));
    }

    if parts.is_empty() {
        return Err(CoverageError::repair_failed(
            entity_id,
            "no ring encloses a non-zero area",
        ));
    }

    let repaired = topology::union_all(parts).orient(Direction::Default);
    if repaired.0.is_empty() || repaired.unsigned_area() <= ring::AREA_EPSILON {
        return Err(CoverageError::repair_failed(entity_id, "empty after repair"));
    }

    Ok(repaired)
}
