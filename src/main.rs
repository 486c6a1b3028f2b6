use anyhow::Result;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, PoisonError};
use tracing::{info, warn};

use trailstamp::accesslink::{HttpAccessLink, SessionKey, SessionRegistry, TransactionSession};
use trailstamp::catalog::ImageCatalog;
use trailstamp::config::Config;
use trailstamp::logging;
use trailstamp::materialize::{sync_exercises, ExerciseMaterializer};

#[derive(Debug, Default)]
struct Args {
    config_path: Option<PathBuf>,
    exercises_only: bool,
    images_only: bool,
    prune: bool,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("trailstamp {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--exercises-only" => parsed.exercises_only = true,
            "--images-only" => parsed.images_only = true,
            "--prune" => parsed.prune = true,
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    if parsed.exercises_only && parsed.images_only {
        eprintln!("Error: --exercises-only and --images-only are mutually exclusive");
        std::process::exit(1);
    }

    parsed
}

fn print_help() {
    println!(
        r#"trailstamp - sync exercise routes and index photo metadata

USAGE:
    trailstamp [OPTIONS]

OPTIONS:
    --config, -c PATH   Path to config file
    --exercises-only    Only pull exercises from AccessLink
    --images-only       Only update the image catalog
    --prune             Remove catalogued images that no longer exist
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    TRAILSTAMP_CONFIG   Path to config file (overrides default location)
    TRAILSTAMP_LOG      Log filter (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/trailstamp/config.toml"#
    );
}

/// Returns false when the session stopped at its retry limit.
fn run_exercises(config: &Config, registry: &SessionRegistry) -> Result<bool> {
    let Some((token, user)) = config.accesslink.credentials() else {
        info!("AccessLink credentials not configured, skipping exercise sync");
        return Ok(true);
    };

    let api = Arc::new(HttpAccessLink::from_config(&config.accesslink)?);
    let retry_limit = config.accesslink.retry_limit;
    let session = registry.session(SessionKey::new(token, user), || {
        TransactionSession::with_retry_limit(api, retry_limit)
    });
    let mut session = session.lock().unwrap_or_else(PoisonError::into_inner);

    let mut sink = ExerciseMaterializer::new(config.db.exercise_path(), config.db.route_path());
    match sync_exercises(&mut session, &mut sink) {
        Ok(_) => Ok(true),
        Err(e) if e.is_retry_limit() => {
            warn!("More exercises are pending than one run may fetch: {}", e);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

fn run_images(config: &Config, prune: bool) -> Result<()> {
    if config.catalog.lookup_path.is_none() {
        info!("catalog.lookup_path not configured, skipping image catalog");
        return Ok(());
    }

    let mut catalog = ImageCatalog::from_config(config)?;
    let outcome = catalog.sync()?;
    info!(?outcome, "Image catalog synced");

    if prune {
        catalog.reconcile_deletions()?;
    }
    Ok(())
}

fn main() -> Result<ExitCode> {
    let args = parse_args();

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Initialize logging (uses journald on Linux, file fallback otherwise)
    if let Err(e) = logging::init(&config.logging) {
        eprintln!("Warning: logging disabled: {:#}", e);
    }

    let registry = SessionRegistry::new();
    let mut complete = true;

    if !args.images_only {
        complete = run_exercises(&config, &registry)?;
    }

    if !args.exercises_only {
        run_images(&config, args.prune)?;
    }

    if complete {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("Exercise sync stopped at the retry limit; run again to fetch the rest");
        Ok(ExitCode::from(2))
    }
}
