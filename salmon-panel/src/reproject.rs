//! Alignement des couches sur le CRS de travail
//!
//! Avec le feature `reproject`, une couche déclarée dans un autre CRS est
//! reprojetée par PROJ. Sans lui, un CRS différent est une erreur de
//! configuration.
//!
//! Une couche sans membre `crs` dont toutes les coordonnées tiennent dans
//! ±180 / ±90 est lue en EPSG:4326 (RFC 7946).

use anyhow::Result;
use geo::BoundingRect;
use tracing::{debug, warn};
#[cfg(feature = "reproject")]
use anyhow::Context;
#[cfg(feature = "reproject")]
use geo::{Coord, LineString, MultiPolygon, Polygon};
#[cfg(feature = "reproject")]
use proj::Proj;
#[cfg(feature = "reproject")]
use tracing::info;

use watershed_coverage::repair::Polygonal;
use watershed_coverage::Crs;
#[cfg(not(feature = "reproject"))]
use watershed_coverage::CoverageError;

/// Reprojection de multipolygones entre deux EPSG
#[cfg(feature = "reproject")]
pub struct Reprojector {
    proj: Proj,
    source_epsg: u32,
    target_epsg: u32,
}

#[cfg(feature = "reproject")]
impl Reprojector {
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self> {
        let source = format!("EPSG:{}", source_epsg);
        let target = format!("EPSG:{}", target_epsg);

        let proj = Proj::new_known_crs(&source, &target, None).context(format!(
            "Failed to create projection from {} to {}",
            source, target
        ))?;

        Ok(Self {
            proj,
            source_epsg,
            target_epsg,
        })
    }

    pub fn transform_multipolygon(&self, mp: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
        if self.source_epsg == self.target_epsg {
            return Ok(mp.clone());
        }
        let polygons: Result<Vec<Polygon<f64>>> =
            mp.0.iter().map(|p| self.transform_polygon(p)).collect();
        Ok(MultiPolygon::new(polygons?))
    }

    fn transform_ring(&self, ls: &LineString<f64>) -> Result<LineString<f64>> {
        let mut coords: Vec<(f64, f64)> = ls.0.iter().map(|c| (c.x, c.y)).collect();

        self.proj
            .convert_array(&mut coords)
            .context("Batch coordinate transformation failed")?;

        Ok(LineString::new(
            coords.into_iter().map(|(x, y)| Coord { x, y }).collect(),
        ))
    }

    fn transform_polygon(&self, p: &Polygon<f64>) -> Result<Polygon<f64>> {
        let exterior = self.transform_ring(p.exterior())?;
        let interiors: Result<Vec<LineString<f64>>> = p
            .interiors()
            .iter()
            .map(|ls| self.transform_ring(ls))
            .collect();
        Ok(Polygon::new(exterior, interiors?))
    }
}

/// CRS implicite d'un GeoJSON sans membre `crs`
pub const RFC7946_EPSG: u32 = 4326;

/// Vrai si la couche est non vide et tient entièrement dans ±180 / ±90
pub fn within_lon_lat<T: Polygonal>(items: &[T]) -> bool {
    let mut seen = false;
    for rect in items.iter().filter_map(|i| i.geometry().bounding_rect()) {
        seen = true;
        let (min, max) = (rect.min(), rect.max());
        if min.x < -180.0 || max.x > 180.0 || min.y < -90.0 || max.y > 90.0 {
            return false;
        }
    }
    seen
}

/// Ramène une couche dans le CRS de travail
///
/// Sans CRS déclaré, des coordonnées lon/lat désignent EPSG:4326; les
/// autres sont prises dans le CRS de travail.
pub fn align_layer<T: Polygonal>(
    layer: &str,
    items: Vec<T>,
    declared: Option<u32>,
    working: &Crs,
) -> Result<Vec<T>> {
    let source = match declared {
        Some(epsg) => epsg,
        None if within_lon_lat(&items) => {
            warn!(layer, "No crs member and lon/lat coordinates, reading layer as EPSG:4326");
            RFC7946_EPSG
        }
        None => {
            debug!(layer, working = %working, "No crs member, coordinates taken in the working CRS");
            working.epsg
        }
    };

    if source == working.epsg {
        Ok(items)
    } else {
        reproject_items(layer, items, source, working)
    }
}

#[cfg(feature = "reproject")]
fn reproject_items<T: Polygonal>(
    layer: &str,
    items: Vec<T>,
    source: u32,
    working: &Crs,
) -> Result<Vec<T>> {
    let reprojector = Reprojector::new(source, working.epsg)?;
    info!(
        layer,
        from = source,
        to = working.epsg,
        features = items.len(),
        "Reprojecting layer"
    );

    items
        .into_iter()
        .map(|item| {
            let geometry = reprojector
                .transform_multipolygon(item.geometry())
                .with_context(|| format!("Failed to reproject {} in {layer}", item.label()))?;
            Ok(item.with_geometry(geometry))
        })
        .collect()
}

#[cfg(not(feature = "reproject"))]
fn reproject_items<T: Polygonal>(
    layer: &str,
    _items: Vec<T>,
    source: u32,
    working: &Crs,
) -> Result<Vec<T>> {
    Err(CoverageError::Configuration(format!(
        "{layer} layer is in EPSG:{source} but the working CRS is {working}; \
         reproject the input or build with the `reproject` feature"
    ))
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use watershed_coverage::WatershedPolygon;

    fn square() -> WatershedPolygon {
        WatershedPolygon::new(
            "W1",
            geo::MultiPolygon::new(vec![polygon![
                (x: -120.0, y: 37.0),
                (x: -119.9, y: 37.0),
                (x: -119.9, y: 37.1),
                (x: -120.0, y: 37.1),
            ]]),
        )
    }

    /// Carré en mètres, EPSG:3310
    fn albers_square() -> WatershedPolygon {
        WatershedPolygon::new(
            "W2",
            geo::MultiPolygon::new(vec![polygon![
                (x: -150_000.0, y: 40_000.0),
                (x: -149_000.0, y: 40_000.0),
                (x: -149_000.0, y: 41_000.0),
                (x: -150_000.0, y: 41_000.0),
            ]]),
        )
    }

    #[test]
    fn test_within_lon_lat() {
        assert!(within_lon_lat(&[square()]));
        assert!(!within_lon_lat(&[square(), albers_square()]));
        assert!(!within_lon_lat::<WatershedPolygon>(&[]));
    }

    #[test]
    fn test_projected_or_matching_crs_is_untouched() {
        let working = Crs::default();
        let items = align_layer("watersheds", vec![albers_square()], None, &working).unwrap();
        assert_eq!(items[0].geometry, albers_square().geometry);

        let items = align_layer("watersheds", vec![square()], Some(3310), &working).unwrap();
        assert_eq!(items[0].geometry, square().geometry);
    }

    #[cfg(not(feature = "reproject"))]
    #[test]
    fn test_mismatch_without_proj_is_configuration_error() {
        let err = align_layer("watersheds", vec![square()], Some(4326), &Crs::default()).unwrap_err();
        let coverage = err.downcast_ref::<CoverageError>().unwrap();
        assert_eq!(
            coverage.kind(),
            watershed_coverage::ErrorKind::Configuration
        );
        assert!(err.to_string().contains("EPSG:4326"));
    }

    #[cfg(not(feature = "reproject"))]
    #[test]
    fn test_undeclared_lon_lat_layer_fails_fast() {
        let err = align_layer("protected", vec![square()], None, &Crs::default()).unwrap_err();
        let coverage = err.downcast_ref::<CoverageError>().unwrap();
        assert_eq!(
            coverage.kind(),
            watershed_coverage::ErrorKind::Configuration
        );
        assert!(err.to_string().contains("EPSG:4326"));
    }

    #[cfg(feature = "reproject")]
    #[test]
    fn test_wgs84_to_california_albers() {
        let items = align_layer("watersheds", vec![square()], Some(4326), &Crs::default()).unwrap();
        let first = items[0].geometry.0[0].exterior().0[0];

        // -120° est le méridien central de EPSG:3310
        assert!(first.x.abs() < 1.0, "x should be near 0, got {}", first.x);
        assert!(first.y.abs() < 500_000.0, "y out of range: {}", first.y);
        assert_eq!(items[0].geometry.0[0].exterior().0.len(), 5);
    }

    #[cfg(feature = "reproject")]
    #[test]
    fn test_undeclared_lon_lat_layer_is_reprojected() {
        let items = align_layer("protected", vec![square()], None, &Crs::default()).unwrap();
        assert!(items[0].geometry.0[0].exterior().0[0].x.abs() < 1.0);
    }
}
