//! Définition et implémentation des commandes CLI
//!
//! - `coverage`: couverture protégée par bassin
//! - `panel`: couverture puis panel prêt pour la régression
//! - `fit`: panel puis modèles de la configuration

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::{error, info};

use salmon_panel::config::Config;
use salmon_panel::pipeline::{write_outputs, Inputs, Pipeline, Stage};
use salmon_panel::regression::WithinOls;
use salmon_panel::report::IssueLevel;

pub const ENV_WATERSHEDS: &str = "SALMON_WATERSHEDS";
pub const ENV_PROTECTED: &str = "SALMON_PROTECTED";
pub const ENV_POPULATION: &str = "SALMON_POPULATION";

#[derive(Subcommand)]
pub enum Commands {
    /// Compute protected-land coverage per watershed
    Coverage(RunArgs),

    /// Compute coverage and build the regression-ready panel
    Panel(RunArgs),

    /// Build the panel and fit the configured models
    Fit(RunArgs),
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Coverage(_) => "coverage",
            Self::Panel(_) => "panel",
            Self::Fit(_) => "fit",
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::Coverage(_) => Stage::Coverage,
            Self::Panel(_) => Stage::Panel,
            Self::Fit(_) => Stage::Fit,
        }
    }

    pub fn args(&self) -> &RunArgs {
        match self {
            Self::Coverage(args) | Self::Panel(args) | Self::Fit(args) => args,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Watershed layer, GeoJSON (défaut : env SALMON_WATERSHEDS)
    #[arg(long)]
    pub watersheds: Option<PathBuf>,

    /// Protected-area layer, GeoJSON (défaut : env SALMON_PROTECTED)
    #[arg(long)]
    pub protected: Option<PathBuf>,

    /// Population monitoring table, CSV (défaut : env SALMON_POPULATION)
    #[arg(long)]
    pub population: Option<PathBuf>,

    /// Config preset name (watershed/population) or path to a JSON config
    #[arg(long, default_value = "watershed")]
    pub config: String,

    /// Output directory
    #[arg(short, long, default_value = "output")]
    pub output: PathBuf,

    /// Protected areas established in or after this year are excluded
    #[arg(long)]
    pub cutoff: Option<i32>,

    /// Working CRS (projected EPSG code)
    #[arg(long)]
    pub srid: Option<u32>,

    /// Baseline year for every species
    #[arg(long)]
    pub baseline: Option<i32>,

    /// Fallback text encoding of the population table (e.g. windows-1252)
    #[arg(long)]
    pub encoding: Option<String>,

    /// Keep units whose values never exceed the usability threshold
    #[arg(long)]
    pub keep_unusable: bool,
}

/// Chemin passé en option, sinon variable d'environnement
fn resolve_input(flag: Option<PathBuf>, var: &str, label: &str) -> Result<PathBuf> {
    flag.or_else(|| std::env::var_os(var).map(PathBuf::from))
        .with_context(|| format!("Missing {label} input: pass --{label} or set {var}"))
}

fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(cutoff) = args.cutoff {
        config.cutoff_year = cutoff;
    }
    if let Some(srid) = args.srid {
        config.crs_epsg = srid;
    }
    if let Some(baseline) = args.baseline {
        config.panel.baseline.default_year = baseline;
        config.panel.baseline.per_species.clear();
    }
    if let Some(encoding) = &args.encoding {
        config.encoding = encoding.clone();
    }
    if args.keep_unusable {
        config.panel.usable_only = false;
    }
}

/// Exécute une commande de run
pub fn cmd_run(command: &Commands) -> Result<()> {
    let start = Instant::now();
    let args = command.args();

    let mut config = Config::resolve(&args.config)?;
    apply_overrides(&mut config, args);
    config.validate()?;

    let inputs = Inputs {
        watersheds: resolve_input(args.watersheds.clone(), ENV_WATERSHEDS, "watersheds")?,
        protected: resolve_input(args.protected.clone(), ENV_PROTECTED, "protected")?,
        population: resolve_input(args.population.clone(), ENV_POPULATION, "population")?,
    };

    info!(
        command = command.name(),
        config = %args.config,
        cutoff_year = config.cutoff_year,
        crs_epsg = config.crs_epsg,
        output = %args.output.display(),
        "Starting run"
    );

    let mut pipeline = Pipeline::new(&config, command.name());
    let result = pipeline
        .load(&inputs)
        .and_then(|loaded| pipeline.execute(loaded, command.stage(), &WithinOls));

    let outcome = match result {
        Ok(output) => {
            write_outputs(&output, &config, &args.output)?;
            for model in &output.models {
                model.display();
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "Run failed");
            if !pipeline.report.has_fatal() {
                pipeline
                    .report
                    .record_issue(IssueLevel::Fatal, command.name(), None, format!("{e:#}"));
            }
            Err(e)
        }
    };

    pipeline.report.set_duration(start.elapsed());
    let report_path = pipeline.finish(&args.output)?;
    pipeline.report.display();

    info!(
        summary = %pipeline.report.summary(),
        report = %report_path.display(),
        "Run finished"
    );

    outcome
}
