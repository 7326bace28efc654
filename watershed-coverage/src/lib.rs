//! # watershed-coverage
//!
//! Couverture des bassins versants par les aires protégées, et panel de
//! comptages de salmonidés prêt pour la régression.
//!
//! ## Étapes
//!
//! - Validation et réparation des polygones (`repair`)
//! - Filtres: bassins observés, aires protégées antérieures au seuil (`filter`)
//! - Intersection bassins × aires protégées avec préfiltre R-tree (`overlay`)
//! - Union des fragments et pourcentage protégé par bassin (`aggregate`)
//! - Jointure avec les comptages et recalage des années (`panel`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use watershed_coverage::{build_panel, run_coverage, Crs, CutoffPolicy, PanelConfig};
//!
//! let config = PanelConfig::default();
//! let run = run_coverage(watersheds, protected, &observations, &config, CutoffPolicy::default(), Crs::default())?;
//! let panel = build_panel(&observations, &run.coverage, &config)?;
//! for row in &panel.rows {
//!     println!("{} {} {}: {}", row.unit_id, row.species, row.year_offset, row.value);
//! }
//! ```

pub mod aggregate;
pub mod crs;
pub mod error;
pub mod filter;
pub mod overlay;
pub mod panel;
pub mod pipeline;
pub mod repair;
pub mod types;

pub use aggregate::{aggregate_coverage, percent_protected, CoverageTable};
pub use crs::Crs;
pub use error::{CoverageError, ErrorKind};
pub use filter::CutoffPolicy;
pub use overlay::OverlayEngine;
pub use panel::{build_panel, BaselinePolicy, MethodPolicy, Panel, PanelConfig, PanelStats};
pub use pipeline::{run_coverage, CoverageRun};
pub use types::{
    CoverageRecord, IntersectionFragment, PanelRow, PanelUnit, PopulationObservation,
    ProtectedAreaPolygon, WatershedPolygon,
};
