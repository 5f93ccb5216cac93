use crate::cli::RunArgs;
use crate::config::builder::build_config;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use dosmc::engine::ensemble::DosResult;
use dosmc::engine::error::EngineError;
use dosmc::engine::progress::ProgressReporter;
use dosmc::workflows;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub fn run(args: RunArgs) -> Result<()> {
    info!("Merging configuration from file and CLI arguments...");
    let app = build_config(&args)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Starting density-of-states sampling...");
    let results = if app.replicas > 1 {
        let (min, max) = app.dos.interval;
        let windows = workflows::replicas::split_interval(min, max, app.replicas, app.overlap)
            .map_err(EngineError::from)?;
        info!("Invoking the replica workflow over {} windows...", windows.len());
        workflows::replicas::run(&app.system, &app.order_parameter, &app.dos, &windows, &reporter)?
    } else {
        info!("Invoking the density-of-states workflow...");
        vec![workflows::dos::run(
            &app.system,
            &app.order_parameter,
            app.dos,
            &reporter,
        )?]
    };

    let total = results.len();
    for (i, result) in results.iter().enumerate() {
        let output_path = generate_output_path(&app.histogram_output, i + 1, total);
        write_result(result, &output_path)?;
    }
    Ok(())
}

fn write_result(result: &DosResult, path: &Path) -> Result<()> {
    info!("Writing density of states to {:?}", path);
    result
        .histogram
        .write_csv(path)
        .map_err(EngineError::from)?;

    if !result.converged {
        warn!(
            "Walker {} stopped after {} of its stages without converging.",
            result.snapshot.walker, result.stages_completed
        );
    }
    println!(
        "✓ Walker {}: {} stage(s), {} iterations, final ln f = {:.3e}, written to: {}",
        result.snapshot.walker,
        result.stages_completed,
        result.iterations,
        result.scale_factor,
        path.display()
    );
    for acceptance in &result.snapshot.acceptance {
        match acceptance.ratio {
            Some(ratio) => println!(
                "    {:<12} acceptance {:.3} over {} attempts",
                acceptance.name, ratio, acceptance.attempted
            ),
            None => println!("    {:<12} never attempted", acceptance.name),
        }
    }
    Ok(())
}

/// Inserts the 1-based walker index before the extension when there are several walkers.
fn generate_output_path(base: &Path, index: usize, total: usize) -> PathBuf {
    if total <= 1 {
        return base.to_path_buf();
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let file_name = match base.extension() {
        Some(ext) => format!("{}-{}.{}", stem, index, ext.to_string_lossy()),
        None => format!("{}-{}", stem, index),
    };
    base.with_file_name(file_name)
}
