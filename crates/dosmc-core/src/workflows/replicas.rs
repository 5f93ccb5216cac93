use super::dos;
use crate::core::io::spec::{OrderParameterSpec, SystemSpec};
use crate::engine::config::{ConfigError, DosConfig};
use crate::engine::ensemble::DosResult;
use crate::engine::error::EngineError;
use crate::engine::progress::ProgressReporter;
use tracing::{info, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Splits `[min, max]` into `count` equal windows, neighbours sharing `overlap` of a window.
pub fn split_interval(
    min: f64,
    max: f64,
    count: usize,
    overlap: f64,
) -> Result<Vec<(f64, f64)>, ConfigError> {
    if count == 0 {
        return Err(ConfigError::Invalid {
            parameter: "replicas",
            reason: "at least one window is required".to_string(),
        });
    }
    if !(min.is_finite() && max.is_finite() && min < max) {
        return Err(ConfigError::Invalid {
            parameter: "interval",
            reason: format!("expected finite min < max, got [{min}, {max}]"),
        });
    }
    if !(0.0..1.0).contains(&overlap) {
        return Err(ConfigError::Invalid {
            parameter: "overlap",
            reason: format!("must lie in [0, 1), got {overlap}"),
        });
    }

    let width = (max - min) / (1.0 + (count - 1) as f64 * (1.0 - overlap));
    let stride = width * (1.0 - overlap);
    Ok((0..count)
        .map(|i| {
            let lower = min + i as f64 * stride;
            let upper = if i + 1 == count { max } else { lower + width };
            (lower, upper)
        })
        .collect())
}

/// Configuration of the walker that samples `window`.
///
/// Each walker gets its own seed and index; restart weights only make sense for the
/// full interval, so they are dropped.
fn window_config(base: &DosConfig, index: usize, window: (f64, f64)) -> DosConfig {
    DosConfig {
        interval: window,
        seed: base.seed.wrapping_add(index as u64),
        walker: index,
        initial_log_dos: None,
        ..base.clone()
    }
}

/// Runs one independent density-of-states walker per window, each on its own copy of the
/// system built from `spec`.
///
/// Results come back in window order. The first failing walker's error is returned.
#[instrument(skip_all, name = "replicas_workflow", fields(windows = windows.len()))]
pub fn run(
    spec: &SystemSpec,
    order_parameter: &OrderParameterSpec,
    base: &DosConfig,
    windows: &[(f64, f64)],
    reporter: &ProgressReporter,
) -> Result<Vec<DosResult>, EngineError> {
    info!(replicas = windows.len(), "Launching independent walkers");
    let configs: Vec<DosConfig> = windows
        .iter()
        .enumerate()
        .map(|(i, &window)| window_config(base, i, window))
        .collect();

    #[cfg(feature = "parallel")]
    let results = configs
        .into_par_iter()
        .map(|config| dos::run(spec, order_parameter, config, reporter))
        .collect::<Result<Vec<_>, _>>()?;
    #[cfg(not(feature = "parallel"))]
    let results = configs
        .into_iter()
        .map(|config| dos::run(spec, order_parameter, config, reporter))
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        converged = results.iter().filter(|r| r.converged).count(),
        "All walkers finished"
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::DosConfigBuilder;
    use crate::engine::progress::Progress;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    const TOLERANCE: f64 = 1e-12;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    #[test]
    fn single_window_covers_whole_interval() {
        let windows = split_interval(-2.0, 4.0, 1, 0.5).unwrap();
        assert_eq!(windows, vec![(-2.0, 4.0)]);
    }

    #[test]
    fn windows_overlap_by_requested_fraction() {
        let windows = split_interval(0.0, 10.0, 3, 0.5).unwrap();
        assert_eq!(windows.len(), 3);
        assert!(approx_eq(windows[0].0, 0.0));
        assert!(approx_eq(windows[2].1, 10.0));
        for pair in windows.windows(2) {
            let width = pair[0].1 - pair[0].0;
            let shared = pair[0].1 - pair[1].0;
            assert!(approx_eq(shared / width, 0.5));
        }
    }

    #[test]
    fn disjoint_windows_tile_the_interval() {
        let windows = split_interval(1.0, 5.0, 4, 0.0).unwrap();
        for (i, (lower, upper)) in windows.iter().enumerate() {
            assert!(approx_eq(*lower, 1.0 + i as f64));
            assert!(approx_eq(*upper, 2.0 + i as f64));
        }
    }

    #[test]
    fn invalid_split_parameters_are_rejected() {
        assert!(split_interval(0.0, 1.0, 0, 0.0).is_err());
        assert!(split_interval(1.0, 0.0, 2, 0.0).is_err());
        assert!(split_interval(0.0, 1.0, 2, 1.0).is_err());
        assert!(split_interval(0.0, 1.0, 2, -0.1).is_err());
    }

    #[test]
    fn window_configs_get_distinct_seeds_and_drop_restart_weights() {
        let base = DosConfigBuilder::new()
            .interval(0.0, 1.0)
            .bin_count(2)
            .stages(1)
            .seed(100)
            .initial_log_dos(vec![0.0, 1.0])
            .build()
            .unwrap();
        let config = window_config(&base, 3, (0.25, 0.75));
        assert_eq!(config.seed, 103);
        assert_eq!(config.walker, 3);
        assert_eq!(config.interval, (0.25, 0.75));
        assert!(config.initial_log_dos.is_none());
        assert_eq!(config.stages, base.stages);
    }

    #[test]
    fn each_window_runs_its_own_walker() {
        let spec = SystemSpec::from_toml_str(
            r#"
            [[blueprints]]
            name = "bead"
            sites = [{ species = "A" }]

            [[worlds]]
            size = [8.0, 8.0, 8.0]
            cutoff = 3.0
            temperature = 1.0
            particles = [
                { blueprint = "bead", position = [2.0, 4.0, 4.0] },
                { blueprint = "bead", position = [4.0, 4.0, 4.0] },
            ]

            [[moves]]
            type = "translate"
            dx = 1.0
            "#,
        )
        .unwrap();
        let op = OrderParameterSpec::ParticleDistance {
            world: 0,
            first: vec![0],
            second: vec![1],
        };
        let base = DosConfigBuilder::new()
            .interval(0.5, 3.5)
            .bin_count(2)
            .stages(1)
            .target_flatness(0.6)
            .max_sweeps_per_stage(200_000)
            .seed(5)
            .build()
            .unwrap();
        let windows = split_interval(0.5, 3.5, 2, 0.5).unwrap();

        let walkers = Mutex::new(BTreeSet::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::RunFinish(snapshot) = event {
                walkers.lock().unwrap().insert(snapshot.walker);
            }
        }));
        let results = run(&spec, &op, &base, &windows, &reporter).unwrap();
        drop(reporter);

        assert_eq!(results.len(), 2);
        for (result, window) in results.iter().zip(&windows) {
            assert!(approx_eq(result.histogram.min(), window.0));
            assert_eq!(result.stages_completed, 1);
        }
        assert_eq!(walkers.into_inner().unwrap(), BTreeSet::from([0, 1]));
    }
}
