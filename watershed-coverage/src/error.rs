//! Types d'erreurs pour le crate watershed-coverage

use thiserror::Error;

/// Famille d'erreur, qui détermine la politique de propagation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Donnée source défectueuse: l'entité est exclue, le run continue
    DataQuality,
    /// Défaut logique d'une jointure: fatal pour le run
    JoinIntegrity,
    /// Paramètre hors plage ou CRS inadapté: fatal avant tout calcul
    Configuration,
}

/// Erreurs pouvant survenir dans le pipeline de couverture
#[derive(Debug, Clone, Error)]
pub enum CoverageError {
    /// Donnée invalide (clé spatiale manquante, géométrie non polygonale, ...)
    #[error("Data quality error for {entity_id}: {reason}")]
    DataQuality { entity_id: String, reason: String },

    /// Géométrie non réparable (dégénérée ou vide après réparation)
    #[error("Geometry repair failed for {entity_id}: {reason}")]
    RepairFailed { entity_id: String, reason: String },

    /// Jointure incohérente (bassin perdu, doublons inattendus)
    #[error("Join integrity violated in {stage} ({}): {reason}", .ids.join(", "))]
    JoinIntegrity {
        stage: &'static str,
        ids: Vec<String>,
        reason: String,
    },

    /// Paramètre de configuration invalide
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// CRS géographique: les aires planes n'ont pas de sens
    #[error("EPSG:{epsg} is a geographic CRS, planar areas would be meaningless")]
    GeographicCrs { epsg: u32 },

    /// Code EPSG absent du registre
    #[error("Unknown CRS: EPSG:{0}")]
    UnknownCrs(u32),
}

impl CoverageError {
    /// Crée une erreur de qualité de donnée
    pub fn data_quality(entity_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataQuality {
            entity_id: entity_id.into(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur d'échec de réparation
    pub fn repair_failed(entity_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RepairFailed {
            entity_id: entity_id.into(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur d'intégrité de jointure
    pub fn join_integrity(
        stage: &'static str,
        ids: impl IntoIterator<Item = impl Into<String>>,
        reason: impl Into<String>,
    ) -> Self {
        Self::JoinIntegrity {
            stage,
            ids: ids.into_iter().map(Into::into).collect(),
            reason: reason.into(),
        }
    }

    /// Famille de l'erreur
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DataQuality { .. } | Self::RepairFailed { .. } => ErrorKind::DataQuality,
            Self::JoinIntegrity { .. } => ErrorKind::JoinIntegrity,
            Self::Configuration(_) | Self::GeographicCrs { .. } | Self::UnknownCrs(_) => {
                ErrorKind::Configuration
            }
        }
    }

    /// Identifiant de l'entité impliquée, si l'erreur en porte un
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            Self::DataQuality { entity_id, .. } | Self::RepairFailed { entity_id, .. } => {
                Some(entity_id)
            }
            Self::JoinIntegrity { ids, .. } => ids.first().map(String::as_str),
            _ => None,
        }
    }
}
