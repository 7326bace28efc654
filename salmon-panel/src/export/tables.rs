//! Tables CSV

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use watershed_coverage::{CoverageRecord, PanelRow};

/// En-têtes, dans l'ordre des champs de `CoverageRecord`
pub const COVERAGE_HEADERS: [&str; 4] = [
    "watershed_id",
    "total_area",
    "protected_area",
    "percent_protected",
];

/// En-têtes, dans l'ordre des champs de `PanelRow`
pub const PANEL_HEADERS: [&str; 8] = [
    "unit_id",
    "watershed_id",
    "species",
    "brood_year",
    "year_offset",
    "value",
    "percent_protected",
    "total_area",
];

/// Écrit des lignes sérialisables, en-tête compris même sans ligne
pub fn write_csv<T: Serialize>(rows: &[T], headers: &[&str], path: &Path) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;

    writer.write_record(headers)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = rows.len(), "CSV written");
    Ok(())
}

pub fn export_coverage(records: &[CoverageRecord], path: &Path) -> Result<()> {
    write_csv(records, &COVERAGE_HEADERS, path)
}

pub fn export_panel(rows: &[PanelRow], path: &Path) -> Result<()> {
    write_csv(rows, &PANEL_HEADERS, path)
}
