//! Registre des systèmes de coordonnées
//!
//! Toute mesure d'aire ou d'intersection reçoit un `&Crs` explicite. Un CRS
//! géographique (lat/long) est refusé: les formules planes y sont fausses.

use crate::CoverageError;

/// Système de coordonnées d'une couche
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crs {
    /// Code EPSG
    pub epsg: u32,

    /// Nom usuel
    pub name: &'static str,

    /// `true` si le CRS est projeté (coordonnées planes en mètres)
    pub planar: bool,
}

/// (epsg, nom, projeté)
const KNOWN: &[(u32, &str, bool)] = &[
    (3310, "NAD83 / California Albers", true),
    (3311, "NAD83(HARN) / California Albers", true),
    (3488, "NAD83(NSRS2007) / California Albers", true),
    (3500, "NAD83(NSRS2007) / California Albers", true),
    (6414, "NAD83(2011) / California Albers", true),
    (26910, "NAD83 / UTM zone 10N", true),
    (26911, "NAD83 / UTM zone 11N", true),
    (32610, "WGS 84 / UTM zone 10N", true),
    (32611, "WGS 84 / UTM zone 11N", true),
    (5070, "NAD83 / Conus Albers", true),
    (3857, "WGS 84 / Pseudo-Mercator", true),
    (4326, "WGS 84", false),
    (4269, "NAD83", false),
    (4267, "NAD27", false),
    (4019, "Unknown datum based upon the GRS 1980 ellipsoid", false),
];

impl Crs {
    /// California Albers, le CRS de travail par défaut
    pub const CALIFORNIA_ALBERS: Crs = Crs {
        epsg: 3310,
        name: "NAD83 / California Albers",
        planar: true,
    };

    /// Cherche un code EPSG dans le registre
    pub fn from_epsg(epsg: u32) -> Result<Self, CoverageError> {
        KNOWN
            .iter()
            .find(|(code, _, _)| *code == epsg)
            .map(|&(epsg, name, planar)| Crs { epsg, name, planar })
            .ok_or(CoverageError::UnknownCrs(epsg))
    }

    /// Retourne un CRS projeté, ou une erreur de configuration
    pub fn planar(epsg: u32) -> Result<Self, CoverageError> {
        let crs = Self::from_epsg(epsg)?;
        crs.ensure_planar()?;
        Ok(crs)
    }

    /// Échoue immédiatement si le CRS est géographique
    pub fn ensure_planar(&self) -> Result<(), CoverageError> {
        if self.planar {
            Ok(())
        } else {
            Err(CoverageError::GeographicCrs { epsg: self.epsg })
        }
    }

    /// Parse un nom de CRS GeoJSON (`urn:ogc:def:crs:EPSG::3310`, `EPSG:3310`)
    pub fn parse_name(name: &str) -> Option<u32> {
        let upper = name.trim().to_ascii_uppercase();
        if upper.ends_with("CRS84") {
            return Some(4326);
        }
        let pos = upper.rfind("EPSG")?;
        upper[pos + 4..]
            .trim_start_matches(':')
            .parse::<u32>()
            .ok()
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::CALIFORNIA_ALBERS
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{} ({})", self.epsg, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geographic_is_rejected() {
        assert!(Crs::planar(3310).is_ok());
        assert!(matches!(
            Crs::planar(4326),
            Err(CoverageError::GeographicCrs { epsg: 4326 })
        ));
        assert!(matches!(
            Crs::from_epsg(99999),
            Err(CoverageError::UnknownCrs(99999))
        ));
    }

    #[test]
    fn test_parse_name() {
        assert_eq!(Crs::parse_name("urn:ogc:def:crs:EPSG::3310"), Some(3310));
        assert_eq!(Crs::parse_name("EPSG:26910"), Some(26910));
        assert_eq!(Crs::parse_name("urn:ogc:def:crs:OGC:1.3:CRS84"), Some(4326));
        assert_eq!(Crs::parse_name("local"), None);
    }
}
