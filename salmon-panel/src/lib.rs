//! # salmon-panel
//!
//! Application autour de `watershed-coverage`: chargement des couches et du
//! tableau des populations, export, régression à effets fixes.
//!
//! ## Usage CLI
//!
//! ```bash
//! # Couverture protégée par bassin
//! salmon-panel coverage --watersheds sheds.geojson --protected cpad.geojson \
//!     --population populations.csv --output ./out
//!
//! # Panel à la granularité population, seuil 1990
//! salmon-panel panel --config population --cutoff 1990
//!
//! # Panel et modèles (entrées lues dans SALMON_* ou .env)
//! salmon-panel fit
//! ```

pub mod config;
pub mod export;
pub mod io;
pub mod pipeline;
pub mod regression;
pub mod report;
pub mod reproject;

pub use config::Config;
pub use pipeline::{Inputs, Pipeline, RunOutput, Stage};
pub use regression::{ModelSpec, RegressionEngine, RegressionResult, WithinOls};
pub use report::{RunReport, RunStatus};
