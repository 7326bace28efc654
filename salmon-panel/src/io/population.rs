//! Tableau des populations (CSV)
//!
//! Le texte est décodé avec `encoding_rs`: un BOM l'emporte, sinon
//! l'encodage de repli de la configuration est utilisé.

use std::path::Path;

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use tracing::{debug, info, warn};

use watershed_coverage::{CoverageError, PopulationObservation};

use super::{is_missing, normalize_id};

const POPULATION: &str = "Population";
const WATERSHED: &str = "Watershed";
const SPECIES: &str = "Species";
const LIFE_STAGE: &str = "Life Stage";
const BROOD_YEAR: &str = "Brood Year";
const GEO_ID: &str = "GEO_ID_POLY";
const VALUE: &str = "Value";
const METRIC: &str = "Metric";
const METHOD: &str = "Estimation method";

const REQUIRED: [&str; 6] = [POPULATION, SPECIES, LIFE_STAGE, BROOD_YEAR, GEO_ID, VALUE];

/// Observations lues et lignes écartées
#[derive(Debug)]
pub struct PopulationTable {
    pub observations: Vec<PopulationObservation>,

    /// Nombre de lignes de données
    pub rows: usize,

    /// Lignes écartées (année ou valeur illisible, valeur négative)
    pub rejected: Vec<CoverageError>,

    /// Encodage effectivement utilisé
    pub encoding: &'static str,
}

/// Décode les octets; le BOM prime sur l'encodage de repli
pub fn decode_text(bytes: &[u8], fallback: &str) -> Result<(String, &'static Encoding)> {
    let fallback = Encoding::for_label(fallback.as_bytes())
        .with_context(|| format!("Unknown encoding label: {fallback}"))?;

    let (text, used, had_errors) = fallback.decode(bytes);
    if had_errors {
        warn!(encoding = used.name(), "Malformed byte sequences replaced while decoding");
    }
    Ok((text.into_owned(), used))
}

/// Position de chaque colonne connue dans l'en-tête
struct Columns {
    positions: Vec<(&'static str, usize)>,
}

impl Columns {
    fn from_headers(headers: &[String]) -> Result<Self> {
        let positions: Vec<(&'static str, usize)> = [
            POPULATION, WATERSHED, SPECIES, LIFE_STAGE, BROOD_YEAR, GEO_ID, VALUE, METRIC, METHOD,
        ]
        .into_iter()
        .filter_map(|name| headers.iter().position(|h| h == name).map(|i| (name, i)))
        .collect();

        let missing: Vec<&str> = REQUIRED
            .into_iter()
            .filter(|name| !positions.iter().any(|(n, _)| n == name))
            .collect();
        if !missing.is_empty() {
            anyhow::bail!("Population table is missing columns: {}", missing.join(", "));
        }

        Ok(Self { positions })
    }

    fn get<'r>(&self, record: &'r csv::StringRecord, name: &str) -> &'r str {
        self.positions
            .iter()
            .find(|(n, _)| *n == name)
            .and_then(|&(_, i)| record.get(i))
            .map(str::trim)
            .unwrap_or("")
    }
}

fn parse_brood_year(raw: &str) -> Option<i32> {
    let year: f64 = raw.parse().ok()?;
    (year.is_finite() && year.fract() == 0.0).then_some(year as i32)
}

/// `""`, `"NA"`, `"NaN"` → `None`; valeur négative ou illisible → erreur
pub fn parse_value(raw: &str) -> Result<Option<f64>, String> {
    if is_missing(raw) {
        return Ok(None);
    }
    let value: f64 = raw
        .trim()
        .replace(',', "")
        .parse()
        .map_err(|_| format!("unreadable value {raw:?}"))?;
    if !value.is_finite() {
        return Err(format!("non-finite value {raw:?}"));
    }
    if value < 0.0 {
        return Err(format!("negative value {value}"));
    }
    Ok(Some(value))
}

fn parse_record(
    columns: &Columns,
    record: &csv::StringRecord,
    line: usize,
) -> Result<PopulationObservation, CoverageError> {
    let population = columns.get(record, POPULATION).to_string();
    let label = format!("{population} (line {line})");

    let raw_year = columns.get(record, BROOD_YEAR);
    let brood_year = parse_brood_year(raw_year).ok_or_else(|| {
        CoverageError::data_quality(&label, format!("unreadable brood year {raw_year:?}"))
    })?;

    let value = parse_value(columns.get(record, VALUE))
        .map_err(|reason| CoverageError::data_quality(&label, reason))?;

    let raw_geo = columns.get(record, GEO_ID);
    let geo_id = (!is_missing(raw_geo)).then(|| normalize_id(raw_geo));

    Ok(PopulationObservation {
        population,
        watershed: columns.get(record, WATERSHED).to_string(),
        species: columns.get(record, SPECIES).to_string(),
        life_stage: columns.get(record, LIFE_STAGE).to_string(),
        brood_year,
        geo_id,
        value,
        metric: columns.get(record, METRIC).to_string(),
        estimation_method: columns.get(record, METHOD).to_string(),
    })
}

/// Parse le tableau déjà décodé
pub fn parse_population_table(text: &str) -> Result<PopulationTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read population table header")?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();
    let columns = Columns::from_headers(&headers)?;

    let mut observations = Vec::new();
    let mut rejected = Vec::new();
    let mut rows = 0;

    for (index, result) in reader.records().enumerate() {
        let record = result.context("Malformed population table")?;
        rows += 1;
        // En-tête en ligne 1
        let line = index + 2;

        match parse_record(&columns, &record, line) {
            Ok(obs) => observations.push(obs),
            Err(e) => {
                debug!(error = %e, "Rejected population row");
                rejected.push(e);
            }
        }
    }

    if !rejected.is_empty() {
        warn!(rejected = rejected.len(), rows, "Population rows rejected");
    }

    Ok(PopulationTable {
        observations,
        rows,
        rejected,
        encoding: "",
    })
}

/// Lit et décode le tableau des populations
pub fn load_population_table(path: &Path, fallback_encoding: &str) -> Result<PopulationTable> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read population table: {}", path.display()))?;
    let (text, encoding) = decode_text(&bytes, fallback_encoding)?;

    let mut table = parse_population_table(&text)
        .with_context(|| format!("Failed to parse population table: {}", path.display()))?;
    table.encoding = encoding.name();

    info!(
        path = %path.display(),
        encoding = table.encoding,
        rows = table.rows,
        observations = table.observations.len(),
        rejected = table.rejected.len(),
        "Population table loaded"
    );

    Ok(table)
}
