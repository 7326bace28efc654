//! Types de données pour le crate watershed-coverage

use geo::{Area, MultiPolygon};
use serde::{Deserialize, Serialize};

/// Un bassin versant (unité spatiale d'analyse)
#[derive(Debug, Clone)]
pub struct WatershedPolygon {
    /// Identifiant spatial (GEO_ID_POLY), unique après dissolution
    pub id: String,

    /// Nom lisible, optionnel
    pub name: Option<String>,

    /// Géométrie en CRS projeté
    pub geometry: MultiPolygon<f64>,
}

impl WatershedPolygon {
    pub fn new(id: impl Into<String>, geometry: MultiPolygon<f64>) -> Self {
        Self {
            id: id.into(),
            name: None,
            geometry,
        }
    }

    /// Aire totale dans l'unité native du CRS
    pub fn total_area(&self) -> f64 {
        self.geometry.unsigned_area()
    }
}

/// Une aire protégée avec son année d'établissement
#[derive(Debug, Clone)]
pub struct ProtectedAreaPolygon {
    /// Nom de l'unité (UNIT_NAME)
    pub name: String,

    /// Année d'établissement (YR_EST), `None` si inconnue
    pub year_established: Option<i32>,

    /// Géométrie en CRS projeté
    pub geometry: MultiPolygon<f64>,
}

impl ProtectedAreaPolygon {
    pub fn new(
        name: impl Into<String>,
        year_established: Option<i32>,
        geometry: MultiPolygon<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            year_established,
            geometry,
        }
    }
}

/// Fragment d'intersection bassin × aire protégée
#[derive(Debug, Clone)]
pub struct IntersectionFragment {
    pub watershed_id: String,

    /// Nom de l'aire protégée source
    pub protected_name: String,

    /// Partie polygonale de l'intersection; vide si le contact est un point ou une ligne
    pub geometry: MultiPolygon<f64>,
}

impl IntersectionFragment {
    /// Le fragment contribue-t-il de l'aire ?
    pub fn is_polygonal(&self) -> bool {
        !self.geometry.0.is_empty()
    }
}

/// Couverture protégée d'un bassin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageRecord {
    pub watershed_id: String,
    pub total_area: f64,
    pub protected_area: f64,

    /// Entier dans [0, 100]
    pub percent_protected: f64,
}

/// Une ligne du tableau de suivi des populations
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationObservation {
    pub population: String,
    pub watershed: String,
    pub species: String,
    pub life_stage: String,
    pub brood_year: i32,

    /// Clé de jointure spatiale (GEO_ID_POLY)
    pub geo_id: Option<String>,

    /// Comptage ou indice, `None` si manquant
    pub value: Option<f64>,
    pub metric: String,
    pub estimation_method: String,
}

/// Unité d'agrégation du panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelUnit {
    /// Total par bassin (somme des sous-populations)
    #[default]
    Watershed,
    /// Granularité population, pourcentage du bassin parent
    Population,
}

/// Ligne prête pour la régression
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelRow {
    /// Identifiant de l'unité (bassin ou population)
    pub unit_id: String,

    /// Bassin parent
    pub watershed_id: String,
    pub species: String,
    pub brood_year: i32,

    /// `brood_year - baseline_year`
    pub year_offset: i32,
    pub value: f64,
    pub percent_protected: f64,
    pub total_area: Option<f64>,
}
