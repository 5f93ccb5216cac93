use super::defaults::DefaultsConfig;
use super::file::FileConfig;
use super::models::AppConfig;
use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use dosmc::engine::config::{BoundaryPolicy, DosConfigBuilder};
use dosmc::engine::histogram::Histogram;
use std::str::FromStr;
use tracing::{info, warn};

pub fn build_config(args: &RunArgs) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let file_config = FileConfig::from_file(&args.config)?;
    let file_config = apply_set_values(file_config, &args.set_values)?;
    let FileConfig {
        system,
        order_parameter,
        ensemble,
        output,
    } = file_config;

    let [min, max] = ensemble.interval.ok_or_else(|| {
        CliError::Config("`ensemble.interval` is required.".to_string())
    })?;
    let stages = args.stages.or(ensemble.stages).unwrap_or(defaults.stages);
    let seed = args.seed.or(ensemble.seed).unwrap_or(system.seed);

    let mut builder = DosConfigBuilder::new()
        .interval(min, max)
        .stages(stages)
        .seed(seed)
        .boundary_policy(ensemble.boundary_policy.unwrap_or_default());
    if let Some(count) = ensemble.bin_count {
        builder = builder.bin_count(count);
    }
    if let Some(width) = ensemble.bin_width {
        builder = builder.bin_width(width);
    }
    if let Some(flatness) = args.target_flatness.or(ensemble.target_flatness) {
        builder = builder.target_flatness(flatness);
    }
    if let Some(factor) = ensemble.initial_scale_factor {
        builder = builder.initial_scale_factor(factor);
    }
    if let Some(order) = ensemble.reduction_order {
        builder = builder.reduction_order(order);
    }
    if let Some(tolerance) = ensemble.scale_factor_tolerance {
        builder = builder.scale_factor_tolerance(tolerance);
    }
    if let Some(sweeps) = ensemble.max_sweeps_per_stage {
        builder = builder.max_sweeps_per_stage(sweeps);
    }
    if let Some(path) = &args.restart {
        let previous = Histogram::read_csv(path).map_err(|e| CliError::FileParsing {
            path: path.clone(),
            source: e.into(),
        })?;
        if previous.min() != min || previous.max() != max {
            warn!(
                "Restart histogram spans [{}, {}] but the configured interval is [{}, {}]",
                previous.min(),
                previous.max(),
                min,
                max
            );
        }
        info!("Restarting from the log density of states in {:?}", path);
        builder = builder.initial_log_dos(previous.log_dos().to_vec());
    }

    let dos = builder.build().map_err(|e| CliError::Config(e.to_string()))?;

    let replicas = args
        .replicas
        .or(ensemble.replicas)
        .unwrap_or(defaults.replicas);
    if replicas == 0 {
        return Err(CliError::Argument(
            "at least one replica is required".to_string(),
        ));
    }
    if replicas > 1 && args.restart.is_some() {
        warn!("Restart weights are ignored when sampling with several replicas");
    }

    let histogram_output = args
        .output
        .clone()
        .or(output.histogram)
        .unwrap_or(defaults.histogram_output);

    Ok(AppConfig {
        system,
        order_parameter,
        dos,
        replicas,
        overlap: ensemble.overlap.unwrap_or(defaults.overlap),
        histogram_output,
    })
}

fn parse_value<T: FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value)))
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        let Some((key, value_str)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };

        let ensemble = &mut config.ensemble;
        match key {
            "system.seed" => config.system.seed = parse_value(key, value_str, "integer")?,
            "ensemble.seed" => ensemble.seed = Some(parse_value(key, value_str, "integer")?),
            "ensemble.stages" => ensemble.stages = Some(parse_value(key, value_str, "integer")?),
            "ensemble.bin-count" => {
                ensemble.bin_count = Some(parse_value(key, value_str, "integer")?);
                ensemble.bin_width = None;
            }
            "ensemble.bin-width" => {
                ensemble.bin_width = Some(parse_value(key, value_str, "float")?);
                ensemble.bin_count = None;
            }
            "ensemble.target-flatness" => {
                ensemble.target_flatness = Some(parse_value(key, value_str, "float")?)
            }
            "ensemble.initial-scale-factor" => {
                ensemble.initial_scale_factor = Some(parse_value(key, value_str, "float")?)
            }
            "ensemble.reduction-order" => {
                ensemble.reduction_order = Some(parse_value(key, value_str, "float")?)
            }
            "ensemble.scale-factor-tolerance" => {
                ensemble.scale_factor_tolerance = Some(parse_value(key, value_str, "float")?)
            }
            "ensemble.max-sweeps-per-stage" => {
                ensemble.max_sweeps_per_stage = Some(parse_value(key, value_str, "integer")?)
            }
            "ensemble.replicas" => {
                ensemble.replicas = Some(parse_value(key, value_str, "integer")?)
            }
            "ensemble.overlap" => ensemble.overlap = Some(parse_value(key, value_str, "float")?),
            "ensemble.boundary-policy" => {
                ensemble.boundary_policy = Some(match value_str {
                    "drag-inward" => BoundaryPolicy::DragInward,
                    "reject-outside" => BoundaryPolicy::RejectOutside,
                    other => {
                        return Err(CliError::Config(format!(
                            "Invalid boundary policy for {}: {} (expected 'drag-inward' or 'reject-outside')",
                            key, other
                        )));
                    }
                })
            }
            "output.histogram" => config.output.histogram = Some(value_str.into()),
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dosmc::engine::config::{Binning, DEFAULT_TARGET_FLATNESS};
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::{TempDir, tempdir};

    const SIMULATION: &str = r#"
        [system]
        seed = 41

        [[system.blueprints]]
        name = "atom"
        sites = [{ species = "A" }]

        [[system.worlds]]
        size = [10.0, 10.0, 10.0]
        cutoff = 3.0
        temperature = 1.0
        components = [{ blueprint = "atom", count = 8 }]

        [ensemble]
        interval = [-10.0, 0.0]
        bin-count = 20
        stages = 6

        [output]
        histogram = "from-file.csv"
    "#;

    fn write_config(content: &str) -> (TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sim.toml");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    fn base_run_args(config: &Path) -> RunArgs {
        RunArgs {
            config: config.to_path_buf(),
            output: None,
            stages: None,
            seed: None,
            target_flatness: None,
            restart: None,
            replicas: None,
            set_values: vec![],
        }
    }

    #[test]
    fn file_values_and_defaults_are_merged() {
        let (_dir, path) = write_config(SIMULATION);
        let app = build_config(&base_run_args(&path)).expect("build ok");

        assert_eq!(app.dos.interval, (-10.0, 0.0));
        assert_eq!(app.dos.binning, Binning::Count(20));
        assert_eq!(app.dos.stages, 6);
        assert_eq!(app.dos.seed, 41);
        assert_eq!(app.dos.target_flatness, DEFAULT_TARGET_FLATNESS);
        assert_eq!(app.replicas, DefaultsConfig::default().replicas);
        assert_eq!(app.histogram_output, PathBuf::from("from-file.csv"));
        assert!(app.dos.initial_log_dos.is_none());
    }

    #[test]
    fn cli_overrides_file_values() {
        let (_dir, path) = write_config(SIMULATION);
        let mut args = base_run_args(&path);
        args.stages = Some(2);
        args.seed = Some(7);
        args.target_flatness = Some(0.95);
        args.output = Some(PathBuf::from("cli.csv"));

        let app = build_config(&args).expect("build ok");
        assert_eq!(app.dos.stages, 2);
        assert_eq!(app.dos.seed, 7);
        assert_eq!(app.dos.target_flatness, 0.95);
        assert_eq!(app.histogram_output, PathBuf::from("cli.csv"));
    }

    #[test]
    fn set_values_override() {
        let (_dir, path) = write_config(SIMULATION);
        let mut args = base_run_args(&path);
        args.set_values = vec![
            "ensemble.bin-width=0.5".to_string(),
            "ensemble.reduction-order=0.25".to_string(),
            "ensemble.max-sweeps-per-stage=1000".to_string(),
            "ensemble.boundary-policy=reject-outside".to_string(),
            "ensemble.replicas=4".to_string(),
            "ensemble.overlap=0.25".to_string(),
            "system.seed=3".to_string(),
            "output.histogram=set.csv".to_string(),
        ];

        let app = build_config(&args).expect("build ok");
        assert_eq!(app.dos.binning, Binning::Width(0.5));
        assert!((app.dos.reduction_order - 0.25).abs() < 1e-12);
        assert_eq!(app.dos.max_sweeps_per_stage, Some(1000));
        assert_eq!(app.dos.boundary_policy, BoundaryPolicy::RejectOutside);
        assert_eq!(app.dos.seed, 3);
        assert_eq!(app.replicas, 4);
        assert!((app.overlap - 0.25).abs() < 1e-12);
        assert_eq!(app.histogram_output, PathBuf::from("set.csv"));
    }

    #[test]
    fn unsupported_or_malformed_set_values_are_rejected() {
        let (_dir, path) = write_config(SIMULATION);
        for bad in ["ensemble.stages", "ensemble.colour=red", "ensemble.stages=many"] {
            let mut args = base_run_args(&path);
            args.set_values = vec![bad.to_string()];
            assert!(matches!(build_config(&args), Err(CliError::Config(_))), "{bad}");
        }
    }

    #[test]
    fn missing_interval_is_reported() {
        let (_dir, path) = write_config(&SIMULATION.replace("interval = [-10.0, 0.0]", ""));
        let result = build_config(&base_run_args(&path));
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("interval")));
    }

    #[test]
    fn invalid_ensemble_values_surface_as_config_errors() {
        let (_dir, path) = write_config(SIMULATION);
        let mut args = base_run_args(&path);
        args.target_flatness = Some(1.5);
        assert!(matches!(build_config(&args), Err(CliError::Config(_))));
    }

    #[test]
    fn restart_loads_previous_log_dos() {
        let (dir, path) = write_config(SIMULATION);
        let mut previous = Histogram::with_bin_count(-10.0, 0.0, 20).unwrap();
        previous.set_log_dos((0..20).map(f64::from).collect()).unwrap();
        let csv_path = dir.path().join("previous.csv");
        previous.write_csv(&csv_path).unwrap();

        let mut args = base_run_args(&path);
        args.restart = Some(csv_path);
        let app = build_config(&args).expect("build ok");
        let restored = app.dos.initial_log_dos.unwrap();
        assert_eq!(restored.len(), 20);
        assert_eq!(restored[19], 19.0);
    }

    #[test]
    fn unreadable_restart_file_is_a_parsing_error() {
        let (dir, path) = write_config(SIMULATION);
        let mut args = base_run_args(&path);
        args.restart = Some(dir.path().join("missing.csv"));
        assert!(matches!(
            build_config(&args),
            Err(CliError::FileParsing { .. })
        ));
    }
}
