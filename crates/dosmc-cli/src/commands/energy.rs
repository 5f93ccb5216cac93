use crate::cli::EnergyArgs;
use crate::config::file::FileConfig;
use crate::error::{CliError, Result};
use dosmc::engine::error::EngineError;
use dosmc::workflows::build::{build_system, species_names};
use dosmc::workflows::evaluate::{self, EnergyReport};
use serde::Serialize;
use tracing::info;

#[derive(Serialize)]
struct EnergyFile<'a> {
    worlds: &'a [EnergyReport],
}

pub fn run(args: EnergyArgs) -> Result<()> {
    let file_config = FileConfig::from_file(&args.config)?;

    info!("Building system from {:?}", &args.config);
    let system = build_system(&file_config.system).map_err(EngineError::from)?;
    let species: Vec<String> = species_names(&system.species)
        .into_iter()
        .map(|(id, name)| format!("{name} ({id})"))
        .collect();
    println!("Species: {}", species.join(", "));

    let reports = evaluate::report(&system.worlds, &system.forcefield);

    for report in &reports {
        println!("{}", format_report(report));
    }

    if let Some(path) = &args.output {
        info!("Writing energy report to {:?}", path);
        let content = toml::to_string(&EnergyFile { worlds: &reports }).map_err(|e| {
            CliError::FileParsing {
                path: path.clone(),
                source: e.into(),
            }
        })?;
        std::fs::write(path, content)?;
    }
    Ok(())
}

fn format_report(report: &EnergyReport) -> String {
    let EnergyReport {
        world,
        energy,
        pressure,
    } = report;
    format!(
        "{world}: energy {:.6} (inter {:.6}, intra {:.6}, tail {:.6}) | pressure {:.6} (ideal {:.6}, virial {:.6}, tail {:.6})",
        energy.total(),
        energy.inter,
        energy.intra,
        energy.tail,
        pressure.total(),
        pressure.ideal,
        pressure.virial,
        pressure.tail
    )
}
