//! Lecture des entrées: couches GeoJSON et tableau des populations

pub mod layers;
pub mod population;

pub use layers::{load_protected_areas, load_watersheds, Layer};
pub use population::{load_population_table, PopulationTable};

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

/// Empreinte blake3 d'un fichier d'entrée
pub fn file_checksum(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 65536];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Normalise un identifiant: `"1234.0"` et `1234` désignent le même bassin
pub fn normalize_id(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains('.') {
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
                return format!("{}", f as i64);
            }
        }
    }
    trimmed.to_string()
}

/// Marqueurs de valeur manquante
pub(crate) fn is_missing(raw: &str) -> bool {
    let t = raw.trim();
    t.is_empty() || t.eq_ignore_ascii_case("NA") || t.eq_ignore_ascii_case("NaN")
}
