use crate::core::forcefield::registry::ForceFieldManager;
use crate::core::forcefield::term::{Energy, Pressure};
use crate::core::models::blueprint::ParticleBlueprint;
use crate::core::models::ids::{SpeciesId, WorldId};
use crate::core::world::geometry::SimulationBox;
use crate::core::world::manager::WorldManager;
use crate::core::world::world::World;
use crate::engine::config::ConfigError;
use crate::engine::error::EngineError;
use nalgebra::Point3;
use serde::Serialize;
use tracing::{debug, instrument};

/// Raw coordinates of single-site particles handed in from outside the sampler.
#[derive(Debug, Clone)]
pub struct Frame {
    pub positions: Vec<Point3<f64>>,
    pub species: Vec<SpeciesId>,
    pub charges: Vec<f64>,
    /// Unit masses when absent.
    pub masses: Option<Vec<f64>>,
    pub geometry: SimulationBox,
    pub cutoff: f64,
    pub temperature: f64,
    /// Selects the per-world entries of the potential cutoff tables.
    pub world: WorldId,
}

impl Frame {
    fn check_lengths(&self) -> Result<(), ConfigError> {
        let n = self.positions.len();
        let mismatch = |parameter: &'static str, len: usize| ConfigError::Invalid {
            parameter,
            reason: format!("expected {n} entries to match the positions, got {len}"),
        };
        if self.species.len() != n {
            return Err(mismatch("species", self.species.len()));
        }
        if self.charges.len() != n {
            return Err(mismatch("charges", self.charges.len()));
        }
        match &self.masses {
            Some(masses) if masses.len() != n => Err(mismatch("masses", masses.len())),
            _ => Ok(()),
        }
    }
}

/// Energy breakdown and pressure of one world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnergyReport {
    pub world: WorldId,
    pub energy: Energy,
    pub pressure: Pressure,
}

impl EnergyReport {
    fn of(world: &World, forcefield: &ForceFieldManager) -> Self {
        Self {
            world: world.id(),
            energy: forcefield.evaluate_energy(world),
            pressure: forcefield.evaluate_pressure(world),
        }
    }
}

/// Evaluates the energy and pressure of `frame` without keeping any sampling state.
///
/// # Errors
///
/// Fails if the per-atom arrays disagree in length, or if the box, cutoff, temperature or
/// a position is rejected by [`World`].
#[instrument(skip_all, name = "single_point", fields(atoms = frame.positions.len()))]
pub fn single_point(frame: &Frame, forcefield: &ForceFieldManager) -> Result<EnergyReport, EngineError> {
    frame.check_lengths()?;

    let mut world = World::new(frame.geometry.clone(), frame.cutoff, frame.temperature)?;
    world.set_id(frame.world);

    let blueprints: Vec<ParticleBlueprint> = (0..frame.positions.len())
        .map(|i| {
            let mass = frame.masses.as_ref().map_or(1.0, |m| m[i]);
            ParticleBlueprint::monatomic("atom", frame.species[i], mass, frame.charges[i])
        })
        .collect();
    world.add_particles(blueprints.iter().zip(frame.positions.iter().copied()))?;

    let report = EnergyReport::of(&world, forcefield);
    debug!(
        energy = report.energy.total(),
        pressure = report.pressure.total(),
        "Single-point evaluation finished"
    );
    Ok(report)
}

/// Energy breakdown and pressure of every registered world, computed from scratch.
pub fn report(worlds: &WorldManager, forcefield: &ForceFieldManager) -> Vec<EnergyReport> {
    worlds
        .iter()
        .map(|world| EnergyReport::of(world, forcefield))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::potentials::{DebyeHuckel, LennardJones};
    use std::sync::Arc;

    const TOLERANCE: f64 = 1e-10;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    fn lj_forcefield() -> ForceFieldManager {
        let mut forcefield = ForceFieldManager::new();
        forcefield.add_nonbonded(
            SpeciesId(0),
            SpeciesId(0),
            Arc::new(LennardJones::new(1.0, 1.0, vec![3.0]).unwrap()),
        );
        forcefield
    }

    fn pair_frame(separation: f64) -> Frame {
        Frame {
            positions: vec![Point3::new(2.0, 5.0, 5.0), Point3::new(2.0 + separation, 5.0, 5.0)],
            species: vec![SpeciesId(0), SpeciesId(0)],
            charges: vec![0.0, 0.0],
            masses: None,
            geometry: SimulationBox::cubic(10.0).unwrap(),
            cutoff: 3.0,
            temperature: 1.0,
            world: WorldId(0),
        }
    }

    #[test]
    fn lennard_jones_pair_matches_reference_energy() {
        let report = single_point(&pair_frame(1.5), &lj_forcefield()).unwrap();
        assert!(approx_eq(report.energy.inter, -0.3203365942785745));
        assert!(approx_eq(report.energy.intra, 0.0));
        assert!(report.energy.tail < 0.0);
        assert!(approx_eq(report.pressure.ideal, 2.0 / 1000.0));
        assert!(report.pressure.tail < 0.0);
    }

    #[test]
    fn pair_beyond_cutoff_has_only_tail_energy() {
        let report = single_point(&pair_frame(4.0), &lj_forcefield()).unwrap();
        assert!(approx_eq(report.energy.inter, 0.0));
        assert!(approx_eq(report.pressure.virial, 0.0));
    }

    #[test]
    fn charges_feed_screened_coulomb() {
        let mut forcefield = ForceFieldManager::new();
        forcefield.add_nonbonded(
            SpeciesId(0),
            SpeciesId(0),
            Arc::new(DebyeHuckel::new(1.0, vec![3.0]).unwrap()),
        );
        let mut frame = pair_frame(2.0);
        frame.charges = vec![1.0, -1.0];
        let report = single_point(&frame, &forcefield).unwrap();
        assert!(approx_eq(report.energy.inter, -0.06766764161830635));
    }

    #[test]
    fn mismatched_arrays_are_rejected() {
        let mut frame = pair_frame(1.5);
        frame.charges.pop();
        let result = single_point(&frame, &lj_forcefield());
        assert!(matches!(
            result,
            Err(EngineError::Config(ConfigError::Invalid { parameter: "charges", .. }))
        ));
    }

    #[test]
    fn oversized_cutoff_is_rejected() {
        let mut frame = pair_frame(1.5);
        frame.cutoff = 6.0;
        assert!(matches!(
            single_point(&frame, &lj_forcefield()),
            Err(EngineError::World(_))
        ));
    }

    #[test]
    fn report_covers_every_world() {
        let forcefield = lj_forcefield();
        let mut worlds = WorldManager::new();
        for _ in 0..2 {
            let mut world = World::new(SimulationBox::cubic(10.0).unwrap(), 3.0, 1.0).unwrap();
            let atom = ParticleBlueprint::monatomic("atom", SpeciesId(0), 1.0, 0.0);
            world
                .add_particles([(&atom, Point3::new(1.0, 1.0, 1.0)), (&atom, Point3::new(2.5, 1.0, 1.0))])
                .unwrap();
            worlds.add_world(world);
        }
        let reports = report(&worlds, &forcefield);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].world, WorldId(1));
        assert!(approx_eq(reports[0].energy.inter, -0.3203365942785745));
        assert!(approx_eq(reports[0].energy.total(), reports[1].energy.total()));
    }
}
