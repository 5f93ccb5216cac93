use crate::error::{CliError, Result};
use std::fs::File;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt::{self},
    prelude::*,
};

/// Module path prefix shared by the sampling library and this binary.
const DOSMC_TARGET: &str = "dosmc";

/// Verbosity applies to our own events; dependencies only ever surface warnings.
fn level_for(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn targets(level: LevelFilter) -> Targets {
    Targets::new()
        .with_target(DOSMC_TARGET, level)
        .with_default(level.min(LevelFilter::WARN))
}

/// Installs the global subscriber: compact stderr output plus an optional plain-text
/// run log carrying thread ids, so replica walkers can be told apart.
pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<()> {
    let level = level_for(verbosity, quiet);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact();

    let subscriber = tracing_subscriber::registry()
        .with(targets(level))
        .with(stderr_layer);

    match &log_file {
        Some(path) => {
            let file = File::create(path).map_err(CliError::Io)?;
            let run_log = fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_target(true);
            subscriber.with(run_log).init();
        }
        None => subscriber.init(),
    }

    debug!(%level, log_file = ?log_file, "Logging initialized");
    Ok(())
}
