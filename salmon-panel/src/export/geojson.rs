//! Export vers GeoJSON avec geozero (streaming)

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use geo::Geometry;
use geozero::geojson::GeoJsonWriter;
use geozero::GeozeroGeometry;
use serde_json::{json, Map, Value};
use tracing::info;

use watershed_coverage::{CoverageTable, Crs, WatershedPolygon};

/// Feature à écrire
pub struct ExportFeature {
    pub id: String,
    pub geometry: Geometry<f64>,
    pub properties: Map<String, Value>,
}

/// Bassins retenus avec leur couverture
pub fn coverage_features(watersheds: &[WatershedPolygon], coverage: &CoverageTable) -> Vec<ExportFeature> {
    let lookup = coverage.by_watershed();
    watersheds
        .iter()
        .map(|w| {
            let mut properties = Map::new();
            properties.insert("watershed_id".into(), json!(w.id));
            properties.insert("name".into(), json!(w.name));
            if let Some(record) = lookup.get(w.id.as_str()) {
                properties.insert("total_area".into(), json!(record.total_area));
                properties.insert("protected_area".into(), json!(record.protected_area));
                properties.insert("percent_protected".into(), json!(record.percent_protected));
            }
            ExportFeature {
                id: w.id.clone(),
                geometry: Geometry::MultiPolygon(w.geometry.clone()),
                properties,
            }
        })
        .collect()
}

/// Union des fragments protégés de chaque bassin
pub fn union_features(coverage: &CoverageTable) -> Vec<ExportFeature> {
    coverage
        .unions
        .iter()
        .filter(|(_, union)| !union.0.is_empty())
        .map(|(id, union)| {
            let mut properties = Map::new();
            properties.insert("watershed_id".into(), json!(id));
            if let Some(record) = coverage.get(id) {
                properties.insert("protected_area".into(), json!(record.protected_area));
            }
            ExportFeature {
                id: id.clone(),
                geometry: Geometry::MultiPolygon(union.clone()),
                properties,
            }
        })
        .collect()
}

/// Écrit une FeatureCollection avec le membre `crs`
pub fn export_to_geojson(features: &[ExportFeature], crs: &Crs, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)
        .context(format!("Failed to create file: {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);

    write!(
        writer,
        r#"{{"type":"FeatureCollection","crs":{{"type":"name","properties":{{"name":"urn:ogc:def:crs:EPSG::{}"}}}},"features":["#,
        crs.epsg
    )?;

    for (i, feature) in features.iter().enumerate() {
        if i > 0 {
            write!(writer, ",")?;
        }
        write_feature(&mut writer, feature)?;
    }

    write!(writer, "]}}")?;
    writer.flush()?;

    info!(path = %output_path.display(), features = features.len(), "GeoJSON written");
    Ok(())
}

fn write_feature<W: Write>(writer: &mut W, feature: &ExportFeature) -> Result<()> {
    write!(
        writer,
        r#"{{"type":"Feature","id":{},"#,
        serde_json::to_string(&feature.id)?
    )?;

    write!(writer, r#""geometry":"#)?;
    let mut geom_buf = Vec::new();
    let mut geom_writer = GeoJsonWriter::new(&mut geom_buf);
    feature.geometry.process_geom(&mut geom_writer)?;
    writer.write_all(&geom_buf)?;

    write!(writer, r#","properties":"#)?;
    serde_json::to_writer(&mut *writer, &feature.properties)?;
    write!(writer, "}}")?;

    Ok(())
}
