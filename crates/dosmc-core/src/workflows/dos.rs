use super::build::{System, build_order_parameter, build_system};
use crate::core::io::spec::{OrderParameterSpec, SystemSpec};
use crate::engine::config::DosConfig;
use crate::engine::ensemble::{DosEnsemble, DosResult};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use tracing::{info, instrument};

/// Builds the system described by `spec` and runs one density-of-states walker on it.
#[instrument(skip_all, name = "dos_workflow", fields(walker = config.walker))]
pub fn run(
    spec: &SystemSpec,
    order_parameter: &OrderParameterSpec,
    config: DosConfig,
    reporter: &ProgressReporter,
) -> Result<DosResult, EngineError> {
    reporter.report(Progress::Message("Building system".to_string()));
    let system = build_system(spec)?;
    run_system(system, order_parameter, config, reporter)
}

/// Runs one density-of-states walker on an already constructed system.
pub fn run_system(
    system: System,
    order_parameter: &OrderParameterSpec,
    config: DosConfig,
    reporter: &ProgressReporter,
) -> Result<DosResult, EngineError> {
    let order_parameter = build_order_parameter(order_parameter, &system.worlds)?;
    info!(
        order_parameter = order_parameter.name(),
        interval = ?config.interval,
        stages = config.stages,
        "Configured density-of-states walker"
    );
    let mut ensemble = DosEnsemble::new(
        system.worlds,
        system.forcefield,
        system.moves,
        order_parameter,
        config,
    )?;
    ensemble.run(reporter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::DosConfigBuilder;

    const DIMER_SYSTEM: &str = r#"
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
    "#;

    #[test]
    fn free_pair_distance_run_completes_all_stages() {
        let spec = SystemSpec::from_toml_str(DIMER_SYSTEM).unwrap();
        let op = OrderParameterSpec::ParticleDistance {
            world: 0,
            first: vec![0],
            second: vec![1],
        };
        let config = DosConfigBuilder::new()
            .interval(0.5, 3.5)
            .bin_count(3)
            .stages(2)
            .target_flatness(0.7)
            .max_sweeps_per_stage(200_000)
            .seed(8)
            .build()
            .unwrap();

        let result = run(&spec, &op, config, &ProgressReporter::new()).unwrap();
        assert_eq!(result.stages_completed, 2);
        assert!(result.histogram.flatness() >= 0.7);
        assert_eq!(result.snapshot.worlds[0].particle_count, 2);
    }

    #[test]
    fn build_errors_surface_before_sampling() {
        let spec = SystemSpec::from_toml_str(
            r#"
            blueprints = []
            worlds = []
            "#,
        )
        .unwrap();
        let config = DosConfigBuilder::new()
            .interval(0.0, 1.0)
            .bin_count(2)
            .stages(1)
            .build()
            .unwrap();
        let result = run(
            &spec,
            &OrderParameterSpec::TotalEnergy,
            config,
            &ProgressReporter::new(),
        );
        assert!(matches!(result, Err(EngineError::Build(_))));
    }
}
