//! Construction du panel (unité, année, espèce) prêt pour la régression
//!
//! Étapes: sélection des adultes géolocalisés, fusion des méthodes
//! d'estimation, agrégation à l'unité choisie, jointure de la couverture,
//! recalage des années, filtre des unités utilisables.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aggregate::CoverageTable;
use crate::filter::PLAUSIBLE_YEARS;
use crate::types::{CoverageRecord, PanelRow, PanelUnit, PopulationObservation};
use crate::CoverageError;

/// Fusion des valeurs de plusieurs méthodes d'estimation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodPolicy {
    /// Moyenne arithmétique (défaut)
    #[default]
    Mean,
    /// Maximum
    Max,
}

impl MethodPolicy {
    /// Fusionne les valeurs; `None` si aucune valeur
    pub fn collapse(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match self {
            Self::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            Self::Max => values.iter().copied().reduce(f64::max),
        }
    }
}

/// Année de référence, globale ou par espèce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselinePolicy {
    #[serde(default = "default_baseline_year")]
    pub default_year: i32,

    #[serde(default)]
    pub per_species: BTreeMap<String, i32>,
}

fn default_baseline_year() -> i32 {
    1981
}

impl Default for BaselinePolicy {
    fn default() -> Self {
        Self {
            default_year: default_baseline_year(),
            per_species: BTreeMap::new(),
        }
    }
}

impl BaselinePolicy {
    pub fn baseline_for(&self, species: &str) -> i32 {
        self.per_species
            .get(species)
            .copied()
            .unwrap_or(self.default_year)
    }

    /// `brood_year - baseline`
    pub fn year_offset(&self, species: &str, brood_year: i32) -> i32 {
        brood_year - self.baseline_for(species)
    }

    /// Contrôle que toutes les années sont plausibles
    pub fn validate(&self) -> Result<(), CoverageError> {
        let years = std::iter::once(("default", self.default_year))
            .chain(self.per_species.iter().map(|(s, &y)| (s.as_str(), y)));
        for (label, year) in years {
            if !PLAUSIBLE_YEARS.contains(&year) {
                return Err(CoverageError::Configuration(format!(
                    "baseline year {year} for {label} outside {}..={}",
                    PLAUSIBLE_YEARS.start(),
                    PLAUSIBLE_YEARS.end()
                )));
            }
        }
        Ok(())
    }
}

/// Paramètres du panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub unit: PanelUnit,

    /// Stade de vie retenu (comparaison insensible à la casse)
    pub life_stage: String,

    /// Métriques retenues; vide = toutes
    pub metrics: Vec<String>,
    pub method_policy: MethodPolicy,
    pub baseline: BaselinePolicy,

    /// Ne garder que les unités dont le maximum dépasse le seuil
    pub usable_only: bool,
    pub usable_threshold: f64,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            unit: PanelUnit::Watershed,
            life_stage: "Adult".to_string(),
            metrics: Vec::new(),
            method_policy: MethodPolicy::Mean,
            baseline: BaselinePolicy::default(),
            usable_only: true,
            usable_threshold: 0.0,
        }
    }
}

/// Compteurs du panel, pour le rapport
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PanelStats {
    pub observations: usize,
    pub adult_observations: usize,

    /// Lignes adultes sans clé spatiale, exclues
    pub missing_geo_id: usize,
    pub missing_geo_populations: Vec<String>,

    /// Groupes dont toutes les valeurs manquent
    pub groups_without_value: usize,

    /// Lignes sans enregistrement de couverture, pourcentage mis à 0
    pub rows_filled_coverage: usize,
    pub filled_watersheds: Vec<String>,

    pub usable_units: usize,
    pub unusable_units: Vec<String>,
    pub rows: usize,
}

/// Panel final
#[derive(Debug, Clone)]
pub struct Panel {
    pub rows: Vec<PanelRow>,
    pub stats: PanelStats,
}

/// Observation fusionnée pour une population et une année
#[derive(Debug, Clone, PartialEq)]
pub struct CollapsedObservation {
    pub population: String,
    pub watershed_id: String,
    pub species: String,
    pub brood_year: i32,
    pub value: f64,
}

/// Observations adultes retenues pour le panel
#[derive(Debug)]
pub struct AdultSelection<'a> {
    pub rows: Vec<&'a PopulationObservation>,
    pub adult: usize,
    pub missing_geo_id: usize,
    pub missing_geo_populations: BTreeSet<String>,
}

/// Garde le stade de vie voulu, les métriques autorisées et les lignes géolocalisées
pub fn select_adult_observations<'a>(
    observations: &'a [PopulationObservation],
    config: &PanelConfig,
) -> AdultSelection<'a> {
    let stage = config.life_stage.trim();
    let mut selection = AdultSelection {
        rows: Vec::new(),
        adult: 0,
        missing_geo_id: 0,
        missing_geo_populations: BTreeSet::new(),
    };

    for obs in observations {
        if !obs.life_stage.trim().eq_ignore_ascii_case(stage) {
            continue;
        }
        if !config.metrics.is_empty() && !config.metrics.iter().any(|m| m == obs.metric.trim()) {
            continue;
        }
        selection.adult += 1;

        match obs.geo_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => selection.rows.push(obs),
            _ => {
                selection.missing_geo_id += 1;
                selection.missing_geo_populations.insert(obs.population.clone());
            }
        }
    }

    if selection.missing_geo_id > 0 {
        warn!(
            rows = selection.missing_geo_id,
            populations = selection.missing_geo_populations.len(),
            "Adult observations without spatial key excluded"
        );
    }

    selection
}

/// Fusionne les méthodes d'estimation par (population, bassin, espèce, année)
///
/// Retourne aussi le nombre de groupes sans aucune valeur.
pub fn collapse_methods(
    rows: &[&PopulationObservation],
    policy: MethodPolicy,
) -> (Vec<CollapsedObservation>, usize) {
    let mut groups: BTreeMap<(&str, &str, &str, i32), Vec<f64>> = BTreeMap::new();
    for obs in rows {
        let geo_id = obs.geo_id.as_deref().map(str::trim).unwrap_or_default();
        let values = groups
            .entry((obs.population.as_str(), geo_id, obs.species.as_str(), obs.brood_year))
            .or_default();
        if let Some(v) = obs.value.filter(|v| v.is_finite()) {
            values.push(v);
        }
    }

    let mut without_value = 0;
    let collapsed = groups
        .into_iter()
        .filter_map(|((population, geo_id, species, brood_year), values)| {
            let Some(value) = policy.collapse(&values) else {
                without_value += 1;
                return None;
            };
            Some(CollapsedObservation {
                population: population.to_string(),
                watershed_id: geo_id.to_string(),
                species: species.to_string(),
                brood_year,
                value,
            })
        })
        .collect();

    (collapsed, without_value)
}

/// Une population ne doit pointer que vers un seul bassin
pub fn check_population_fan_out(collapsed: &[CollapsedObservation]) -> Result<(), CoverageError> {
    let mut parents: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for c in collapsed {
        parents
            .entry(c.population.as_str())
            .or_default()
            .insert(c.watershed_id.as_str());
    }

    let fanned: Vec<&str> = parents
        .iter()
        .filter(|(_, sheds)| sheds.len() > 1)
        .map(|(&pop, _)| pop)
        .collect();
    if fanned.is_empty() {
        Ok(())
    } else {
        Err(CoverageError::join_integrity(
            "panel",
            fanned,
            "population joined to several watersheds",
        ))
    }
}

/// Somme des sous-populations par (bassin, espèce, année)
pub fn sum_by_watershed(collapsed: &[CollapsedObservation]) -> Vec<CollapsedObservation> {
    let mut totals: BTreeMap<(&str, &str, i32), f64> = BTreeMap::new();
    for c in collapsed {
        *totals
            .entry((c.watershed_id.as_str(), c.species.as_str(), c.brood_year))
            .or_default() += c.value;
    }

    totals
        .into_iter()
        .map(|((watershed_id, species, brood_year), value)| CollapsedObservation {
            population: watershed_id.to_string(),
            watershed_id: watershed_id.to_string(),
            species: species.to_string(),
            brood_year,
            value,
        })
        .collect()
}

/// Politique « pas de couverture → 0 % » pour la jointure gauche
///
/// Retourne (pourcentage, aire totale).
pub fn fill_missing_coverage(record: Option<&CoverageRecord>) -> (f64, Option<f64>) {
    match record {
        Some(r) => (r.percent_protected, Some(r.total_area)),
        None => (0.0, None),
    }
}

/// Le pourcentage doit être unique au sein d'un bassin
pub fn check_uniform_percent(rows: &[PanelRow]) -> Result<(), CoverageError> {
    let mut seen: BTreeMap<&str, f64> = BTreeMap::new();
    let mut conflicts = BTreeSet::new();
    for row in rows {
        let first = *seen
            .entry(row.watershed_id.as_str())
            .or_insert(row.percent_protected);
        if first != row.percent_protected {
            conflicts.insert(row.watershed_id.as_str());
        }
    }

    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(CoverageError::join_integrity(
            "panel",
            conflicts,
            "percent protected differs within a watershed",
        ))
    }
}

/// Au plus une ligne par (unité, année, espèce)
pub fn check_unique_keys(rows: &[PanelRow]) -> Result<(), CoverageError> {
    let mut seen = BTreeSet::new();
    let mut duplicated = BTreeSet::new();
    for row in rows {
        if !seen.insert((row.unit_id.as_str(), row.brood_year, row.species.as_str())) {
            duplicated.insert(format!("{}/{}/{}", row.unit_id, row.species, row.brood_year));
        }
    }

    if duplicated.is_empty() {
        Ok(())
    } else {
        Err(CoverageError::join_integrity(
            "panel",
            duplicated,
            "duplicate (unit, year, species) rows",
        ))
    }
}

/// Unités (unité, espèce) dont le maximum observé dépasse strictement le seuil
///
/// Une série toujours nulle est traitée comme une absence de détection.
pub fn usable_units(rows: &[PanelRow], threshold: f64) -> BTreeSet<(String, String)> {
    let mut maxima: BTreeMap<(&str, &str), f64> = BTreeMap::new();
    for row in rows {
        let max = maxima
            .entry((row.unit_id.as_str(), row.species.as_str()))
            .or_insert(f64::NEG_INFINITY);
        *max = max.max(row.value);
    }

    maxima
        .into_iter()
        .filter(|(_, max)| *max > threshold)
        .map(|((unit, species), _)| (unit.to_string(), species.to_string()))
        .collect()
}

/// Construit le panel
///
/// # Errors
///
/// - `Configuration` si une année de référence est hors plage
/// - `JoinIntegrity` en cas d'éclatement de jointure, de pourcentage non
///   uniforme par bassin ou de clés dupliquées
pub fn build_panel(
    observations: &[PopulationObservation],
    coverage: &CoverageTable,
    config: &PanelConfig,
) -> Result<Panel, CoverageError> {
    config.baseline.validate()?;

    let selection = select_adult_observations(observations, config);
    let (collapsed, groups_without_value) = collapse_methods(&selection.rows, config.method_policy);

    let units = match config.unit {
        PanelUnit::Population => {
            check_population_fan_out(&collapsed)?;
            collapsed
        }
        PanelUnit::Watershed => sum_by_watershed(&collapsed),
    };

    let lookup = coverage.by_watershed();
    let mut filled_watersheds = BTreeSet::new();
    let mut rows_filled_coverage = 0;

    let mut rows: Vec<PanelRow> = units
        .into_iter()
        .map(|u| {
            let record = lookup.get(u.watershed_id.as_str()).copied();
            if record.is_none() {
                rows_filled_coverage += 1;
                filled_watersheds.insert(u.watershed_id.clone());
            }
            let (percent_protected, total_area) = fill_missing_coverage(record);
            PanelRow {
                year_offset: config.baseline.year_offset(&u.species, u.brood_year),
                unit_id: u.population,
                watershed_id: u.watershed_id,
                species: u.species,
                brood_year: u.brood_year,
                value: u.value,
                percent_protected,
                total_area,
            }
        })
        .collect();

    if rows_filled_coverage > 0 {
        warn!(
            rows = rows_filled_coverage,
            watersheds = filled_watersheds.len(),
            "No coverage record, percent protected set to 0"
        );
    }

    check_uniform_percent(&rows)?;

    let all_units: BTreeSet<(String, String)> = rows
        .iter()
        .map(|r| (r.unit_id.clone(), r.species.clone()))
        .collect();
    let usable = usable_units(&rows, config.usable_threshold);
    let unusable_units: Vec<String> = all_units
        .difference(&usable)
        .map(|(unit, species)| format!("{unit} ({species})"))
        .collect();

    if config.usable_only {
        rows.retain(|r| usable.contains(&(r.unit_id.clone(), r.species.clone())));
    }

    rows.sort_by(|a, b| {
        (a.species.as_str(), a.unit_id.as_str(), a.brood_year)
            .cmp(&(b.species.as_str(), b.unit_id.as_str(), b.brood_year))
    });
    check_unique_keys(&rows)?;

    let stats = PanelStats {
        observations: observations.len(),
        adult_observations: selection.adult,
        missing_geo_id: selection.missing_geo_id,
        missing_geo_populations: selection.missing_geo_populations.into_iter().collect(),
        groups_without_value,
        rows_filled_coverage,
        filled_watersheds: filled_watersheds.into_iter().collect(),
        usable_units: usable.len(),
        unusable_units,
        rows: rows.len(),
    };

    info!(
        unit = ?config.unit,
        rows = stats.rows,
        usable_units = stats.usable_units,
        unusable_units = stats.unusable_units.len(),
        "Built panel"
    );

    Ok(Panel { rows, stats })
}
