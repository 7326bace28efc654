//! Point d'entrée CLI pour salmon-panel

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

// Charger .env au démarrage
fn load_env() {
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

mod cli;

use cli::Commands;

/// Couverture des bassins par les aires protégées et panel de comptages de salmonidés
#[derive(Parser)]
#[command(name = "salmon-panel")]
#[command(author, version)]
#[command(about = "Protected-land coverage per watershed and salmonid population panel")]
#[command(long_about = "Computes the share of each watershed covered by protected areas established before a cutoff year, joins it with salmonid monitoring counts and fits fixed-effects trend models.\n\nInputs can be given as flags or through SALMON_WATERSHEDS, SALMON_PROTECTED and SALMON_POPULATION (a .env file is honoured).")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    load_env();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    cli::cmd_run(&cli.command)
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
