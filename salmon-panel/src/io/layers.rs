//! Couches de polygones GeoJSON (bassins, aires protégées)
//!
//! Seules les features Polygon et MultiPolygon sont retenues. Le CRS d'une
//! couche est lu dans le membre `crs` hérité de GeoJSON 2008; sans ce membre
//! la couche est supposée être dans le CRS de travail.

use std::path::Path;

use anyhow::{Context, Result};
use geo::{Geometry, MultiPolygon};
use geojson::{Feature, FeatureCollection, GeoJson, JsonValue};
use tracing::{info, warn};

use watershed_coverage::{CoverageError, Crs, ProtectedAreaPolygon, WatershedPolygon};

use super::normalize_id;
use crate::config::FieldNames;

/// Couche chargée
#[derive(Debug)]
pub struct Layer<T> {
    pub items: Vec<T>,

    /// EPSG déclaré par le membre `crs`
    pub declared_epsg: Option<u32>,

    /// Features ignorées (géométrie non polygonale, clé manquante)
    pub skipped: Vec<CoverageError>,
}

impl<T> Layer<T> {
    pub fn features(&self) -> usize {
        self.items.len() + self.skipped.len()
    }
}

/// Parse un document GeoJSON en FeatureCollection
pub fn parse_feature_collection(text: &str) -> Result<FeatureCollection> {
    let geojson: GeoJson = text.parse().context("Invalid GeoJSON")?;
    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        GeoJson::Feature(feature) => Ok(FeatureCollection {
            bbox: None,
            features: vec![feature],
            foreign_members: None,
        }),
        GeoJson::Geometry(_) => anyhow::bail!("Expected a FeatureCollection, found a bare geometry"),
    }
}

/// EPSG du membre `crs` (`{"type":"name","properties":{"name":"urn:ogc:def:crs:EPSG::3310"}}`)
pub fn declared_epsg(fc: &FeatureCollection) -> Option<u32> {
    let crs = fc.foreign_members.as_ref()?.get("crs")?;
    let name = crs.get("properties")?.get("name")?.as_str()?;
    Crs::parse_name(name)
}

fn value_kind(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Géométrie polygonale d'une feature
fn feature_geometry(feature: &Feature, label: &str) -> Result<MultiPolygon<f64>, CoverageError> {
    let geometry = feature
        .geometry
        .as_ref()
        .ok_or_else(|| CoverageError::data_quality(label, "feature has no geometry"))?;

    if !matches!(
        geometry.value,
        geojson::Value::Polygon(_) | geojson::Value::MultiPolygon(_)
    ) {
        return Err(CoverageError::data_quality(
            label,
            format!(
                "expected Polygon or MultiPolygon, found {}",
                value_kind(&geometry.value)
            ),
        ));
    }

    let converted: Geometry<f64> = geometry
        .clone()
        .try_into()
        .map_err(|e: geojson::Error| CoverageError::data_quality(label, e.to_string()))?;

    match converted {
        Geometry::Polygon(p) => Ok(MultiPolygon::new(vec![p])),
        Geometry::MultiPolygon(mp) => Ok(mp),
        _ => Err(CoverageError::data_quality(label, "unexpected geometry after conversion")),
    }
}

/// Propriété textuelle ou numérique, normalisée
fn property_text(feature: &Feature, field: &str) -> Option<String> {
    match feature.property(field)? {
        JsonValue::String(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| normalize_id(t))
        }
        JsonValue::Number(n) => Some(match n.as_i64() {
            Some(i) => i.to_string(),
            None => normalize_id(&n.to_string()),
        }),
        _ => None,
    }
}

/// Année d'établissement: nombre ou texte numérique
///
/// `null`, `""`, `"NA"` et `0` sont des années manquantes.
pub fn parse_year(value: Option<&JsonValue>) -> Option<i32> {
    let year = match value? {
        JsonValue::Number(n) => n.as_f64()?,
        JsonValue::String(s) => {
            let t = s.trim();
            if super::is_missing(t) {
                return None;
            }
            t.parse::<f64>().ok()?
        }
        _ => return None,
    };

    if !year.is_finite() || year == 0.0 || year.fract() != 0.0 {
        return None;
    }
    Some(year as i32)
}

fn skip(layer: &str, err: CoverageError, skipped: &mut Vec<CoverageError>) {
    warn!(layer, error = %err, "Skipping feature");
    skipped.push(err);
}

/// Parse la couche des bassins
pub fn parse_watersheds(text: &str, fields: &FieldNames) -> Result<Layer<WatershedPolygon>> {
    let fc = parse_feature_collection(text)?;
    let declared_epsg = declared_epsg(&fc);
    let mut items = Vec::with_capacity(fc.features.len());
    let mut skipped = Vec::new();

    for (index, feature) in fc.features.iter().enumerate() {
        let Some(id) = property_text(feature, &fields.watershed_id) else {
            let err = CoverageError::data_quality(
                format!("feature #{index}"),
                format!("missing {}", fields.watershed_id),
            );
            skip("watersheds", err, &mut skipped);
            continue;
        };

        match feature_geometry(feature, &id) {
            Ok(geometry) => items.push(WatershedPolygon {
                name: property_text(feature, &fields.watershed_name),
                id,
                geometry,
            }),
            Err(e) => skip("watersheds", e, &mut skipped),
        }
    }

    info!(
        features = fc.features.len(),
        loaded = items.len(),
        skipped = skipped.len(),
        declared_epsg = ?declared_epsg,
        "Watershed layer parsed"
    );

    Ok(Layer {
        items,
        declared_epsg,
        skipped,
    })
}

/// Parse la couche des aires protégées
pub fn parse_protected_areas(text: &str, fields: &FieldNames) -> Result<Layer<ProtectedAreaPolygon>> {
    let fc = parse_feature_collection(text)?;
    let declared_epsg = declared_epsg(&fc);
    let mut items = Vec::with_capacity(fc.features.len());
    let mut skipped = Vec::new();

    for (index, feature) in fc.features.iter().enumerate() {
        let name = property_text(feature, &fields.protected_name)
            .unwrap_or_else(|| format!("unnamed #{index}"));

        match feature_geometry(feature, &name) {
            Ok(geometry) => items.push(ProtectedAreaPolygon {
                year_established: parse_year(feature.property(&fields.protected_year)),
                name,
                geometry,
            }),
            Err(e) => skip("protected_areas", e, &mut skipped),
        }
    }

    info!(
        features = fc.features.len(),
        loaded = items.len(),
        skipped = skipped.len(),
        declared_epsg = ?declared_epsg,
        "Protected-area layer parsed"
    );

    Ok(Layer {
        items,
        declared_epsg,
        skipped,
    })
}

pub fn load_watersheds(path: &Path, fields: &FieldNames) -> Result<Layer<WatershedPolygon>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read watershed layer: {}", path.display()))?;
    parse_watersheds(&text, fields)
        .with_context(|| format!("Failed to parse watershed layer: {}", path.display()))
}

pub fn load_protected_areas(path: &Path, fields: &FieldNames) -> Result<Layer<ProtectedAreaPolygon>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read protected-area layer: {}", path.display()))?;
    parse_protected_areas(&text, fields)
        .with_context(|| format!("Failed to parse protected-area layer: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;
    use watershed_coverage::ErrorKind;

    const WATERSHEDS: &str = r#"{
        "type": "FeatureCollection",
        "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::3310"}},
        "features": [
            {"type": "Feature", "properties": {"GEO_ID_POLY": 101, "Watershed": "Scott River"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[10,0],[10,10],[0,10],[0,0]]]}},
            {"type": "Feature", "properties": {"GEO_ID_POLY": "102.0"},
             "geometry": {"type": "MultiPolygon", "coordinates": [[[[20,0],[30,0],[30,10],[20,10],[20,0]]]]}},
            {"type": "Feature", "properties": {"GEO_ID_POLY": "103"},
             "geometry": {"type": "LineString", "coordinates": [[0,0],[1,1]]}},
            {"type": "Feature", "properties": {"Watershed": "No id"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}}
        ]
    }"#;

    #[test]
    fn test_parse_watersheds() {
        let layer = parse_watersheds(WATERSHEDS, &FieldNames::default()).unwrap();

        assert_eq!(layer.declared_epsg, Some(3310));
        assert_eq!(layer.features(), 4);

        let ids: Vec<&str> = layer.items.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["101", "102"]);
        assert_eq!(layer.items[0].name.as_deref(), Some("Scott River"));
        assert!((layer.items[1].geometry.unsigned_area() - 100.0).abs() < 1e-9);

        assert_eq!(layer.skipped.len(), 2);
        assert!(layer
            .skipped
            .iter()
            .all(|e| e.kind() == ErrorKind::DataQuality));
        assert_eq!(layer.skipped[0].entity_id(), Some("103"));
    }

    #[test]
    fn test_parse_protected_areas_years() {
        let text = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"UNIT_NAME": "Old park", "YR_EST": 1960},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
            {"type": "Feature", "properties": {"UNIT_NAME": "Easement", "YR_EST": "1999"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
            {"type": "Feature", "properties": {"UNIT_NAME": "Unknown", "YR_EST": 0},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
            {"type": "Feature", "properties": {"YR_EST": null},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}}
        ]}"#;

        let layer = parse_protected_areas(text, &FieldNames::default()).unwrap();
        assert_eq!(layer.declared_epsg, None);

        let years: Vec<Option<i32>> = layer.items.iter().map(|p| p.year_established).collect();
        assert_eq!(years, vec![Some(1960), Some(1999), None, None]);
        assert_eq!(layer.items[3].name, "unnamed #3");
    }

    #[test]
    fn test_parse_year_missing_markers() {
        assert_eq!(parse_year(None), None);
        assert_eq!(parse_year(Some(&JsonValue::Null)), None);
        assert_eq!(parse_year(Some(&JsonValue::from(""))), None);
        assert_eq!(parse_year(Some(&JsonValue::from("NA"))), None);
        assert_eq!(parse_year(Some(&JsonValue::from(0))), None);
        assert_eq!(parse_year(Some(&JsonValue::from(1980.0))), Some(1980));
        assert_eq!(parse_year(Some(&JsonValue::from(" 1975 "))), Some(1975));
        assert_eq!(parse_year(Some(&JsonValue::from("circa 1900"))), None);
    }

    #[test]
    fn test_custom_field_names() {
        let text = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"HUC12": "180101"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}}
        ]}"#;
        let fields = FieldNames {
            watershed_id: "HUC12".to_string(),
            ..FieldNames::default()
        };
        let layer = parse_watersheds(text, &fields).unwrap();
        assert_eq!(layer.items[0].id, "180101");
    }

    #[test]
    fn test_bare_geometry_rejected() {
        let text = r#"{"type": "Point", "coordinates": [0, 0]}"#;
        assert!(parse_watersheds(text, &FieldNames::default()).is_err());
    }

    #[test]
    fn test_crs84_member() {
        let text = r#"{"type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:OGC:1.3:CRS84"}},
            "features": []}"#;
        let fc = parse_feature_collection(text).unwrap();
        assert_eq!(declared_epsg(&fc), Some(4326));
    }
}
