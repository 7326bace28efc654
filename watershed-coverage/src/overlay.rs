//! Intersection des bassins avec les aires protégées
//!
//! Un R-tree sur les enveloppes des aires protégées évite le produit complet
//! W × P. Chaque bassin est traité indépendamment (rayon); l'ordre de sortie
//! est celui des bassins puis des aires, identique à un parcours séquentiel.

use geo::{BooleanOps, BoundingRect, Intersects, MultiPolygon};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use tracing::{debug, info};

use crate::crs::Crs;
use crate::types::{IntersectionFragment, ProtectedAreaPolygon, WatershedPolygon};
use crate::CoverageError;

/// Aire protégée indexée avec sa position d'origine
struct IndexedArea<'a> {
    index: usize,
    area: &'a ProtectedAreaPolygon,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedArea<'_> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Moteur d'intersection sur une collection d'aires protégées filtrées
pub struct OverlayEngine<'a> {
    tree: RTree<IndexedArea<'a>>,
    crs: Crs,
}

impl<'a> OverlayEngine<'a> {
    /// Indexe les aires protégées
    ///
    /// # Errors
    ///
    /// `GeographicCrs` si `crs` n'est pas projeté.
    pub fn new(areas: &'a [ProtectedAreaPolygon], crs: Crs) -> Result<Self, CoverageError> {
        crs.ensure_planar()?;

        let entries: Vec<IndexedArea<'a>> = areas
            .iter()
            .enumerate()
            .filter_map(|(index, area)| {
                envelope(&area.geometry).map(|envelope| IndexedArea {
                    index,
                    area,
                    envelope,
                })
            })
            .collect();

        Ok(Self {
            tree: RTree::bulk_load(entries),
            crs,
        })
    }

    /// CRS de travail
    pub fn crs(&self) -> Crs {
        self.crs
    }

    /// Nombre d'aires indexées
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Fragments d'un bassin, dans l'ordre des aires protégées
    pub fn intersect_one(&self, watershed: &WatershedPolygon) -> Vec<IntersectionFragment> {
        let Some(query) = envelope(&watershed.geometry) else {
            return Vec::new();
        };

        let mut candidates: Vec<&IndexedArea<'a>> =
            self.tree.locate_in_envelope_intersecting(&query).collect();
        candidates.sort_by_key(|c| c.index);

        let fragments: Vec<IntersectionFragment> = candidates
            .into_iter()
            .filter(|c| watershed.geometry.intersects(&c.area.geometry))
            .map(|c| IntersectionFragment {
                watershed_id: watershed.id.clone(),
                protected_name: c.area.name.clone(),
                geometry: watershed.geometry.intersection(&c.area.geometry),
            })
            .collect();

        debug!(
            watershed_id = %watershed.id,
            fragments = fragments.len(),
            "Intersected watershed"
        );

        fragments
    }

    /// Fragments de tous les bassins
    pub fn intersect(&self, watersheds: &[WatershedPolygon]) -> Vec<IntersectionFragment> {
        let fragments: Vec<IntersectionFragment> = watersheds
            .par_iter()
            .map(|w| self.intersect_one(w))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect();

        let polygonal = fragments.iter().filter(|f| f.is_polygonal()).count();
        info!(
            watersheds = watersheds.len(),
            protected_areas = self.len(),
            fragments = fragments.len(),
            polygonal,
            "Computed overlay"
        );

        fragments
    }
}

/// Enveloppe R-tree d'un multipolygone
fn envelope(geom: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    geom.bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area, Polygon};

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        let p: Polygon<f64> = polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
        ];
        MultiPolygon::new(vec![p])
    }

    #[test]
    fn test_geographic_crs_is_refused() {
        let areas: Vec<ProtectedAreaPolygon> = Vec::new();
        let crs = Crs::from_epsg(4326).unwrap();
        assert!(OverlayEngine::new(&areas, crs).is_err());
    }

    #[test]
    fn test_intersect_keeps_only_touching_pairs() {
        let areas = vec![
            ProtectedAreaPolygon::new("inside", Some(1970), rect(10.0, 0.0, 40.0, 10.0)),
            ProtectedAreaPolygon::new("far", None, rect(500.0, 500.0, 600.0, 600.0)),
            ProtectedAreaPolygon::new("edge", None, rect(100.0, 0.0, 120.0, 10.0)),
        ];
        let watersheds = vec![WatershedPolygon::new("A", rect(0.0, 0.0, 100.0, 10.0))];

        let engine = OverlayEngine::new(&areas, Crs::default()).unwrap();
        assert_eq!(engine.len(), 3);

        let fragments = engine.intersect(&watersheds);
        let names: Vec<&str> = fragments.iter().map(|f| f.protected_name.as_str()).collect();
        assert_eq!(names, vec!["inside", "edge"]);

        assert!((fragments[0].geometry.unsigned_area() - 300.0).abs() < 1e-9);
        // Contact sur une arête: pas d'aire
        assert!(fragments[1].geometry.unsigned_area() < 1e-9);
    }

    #[test]
    fn test_fragment_order_follows_watersheds() {
        let areas = vec![ProtectedAreaPolygon::new("big", None, rect(0.0, 0.0, 300.0, 10.0))];
        let watersheds = vec![
            WatershedPolygon::new("B", rect(100.0, 0.0, 200.0, 10.0)),
            WatershedPolygon::new("A", rect(0.0, 0.0, 100.0, 10.0)),
        ];

        let engine = OverlayEngine::new(&areas, Crs::default()).unwrap();
        let ids: Vec<String> = engine
            .intersect(&watersheds)
            .into_iter()
            .map(|f| f.watershed_id)
            .collect();
        assert_eq!(ids, vec!["B".to_string(), "A".to_string()]);
    }
}
