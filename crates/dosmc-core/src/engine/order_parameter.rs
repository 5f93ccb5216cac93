use super::error::EngineError;
use crate::core::models::ids::{ParticleId, WorldId};
use crate::core::world::manager::WorldManager;
use crate::core::world::world::World;
use nalgebra::Vector3;
use std::fmt;

/// Scalar reaction coordinate sampled by the density-of-states ensemble.
pub trait OrderParameter: Send + Sync + fmt::Debug {
    fn evaluate(&self, worlds: &WorldManager) -> Result<f64, EngineError>;

    /// Whether the physical Boltzmann factor enters the acceptance rule alongside the
    /// density-of-states ratio. Energy-like parameters absorb it into g(E) and return false.
    fn boltzmann_weighted(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}

/// Sum of the running energies of every world.
#[derive(Debug, Clone, Copy, Default)]
pub struct TotalEnergy;

impl OrderParameter for TotalEnergy {
    fn evaluate(&self, worlds: &WorldManager) -> Result<f64, EngineError> {
        Ok(worlds.iter().map(|w| w.energy().total()).sum())
    }

    fn name(&self) -> &'static str {
        "total-energy"
    }
}

/// Minimum-imaged distance between the mass-weighted centers of two particle groups.
#[derive(Debug, Clone)]
pub struct ParticleDistance {
    world: WorldId,
    first: Vec<ParticleId>,
    second: Vec<ParticleId>,
}

impl ParticleDistance {
    pub fn new(world: WorldId, first: Vec<ParticleId>, second: Vec<ParticleId>) -> Self {
        Self {
            world,
            first,
            second,
        }
    }

    fn group_center(world: &World, group: &[ParticleId]) -> Result<Vector3<f64>, EngineError> {
        let (&head, rest) = group
            .split_first()
            .ok_or_else(|| EngineError::Internal("empty particle group".to_string()))?;
        let fetch = |id: ParticleId| {
            world
                .particle(id)
                .ok_or_else(|| EngineError::Internal(format!("particle {id:?} is not in {}", world.id())))
        };

        let reference = fetch(head)?;
        let origin = reference.position().coords;
        let mut mass = reference.mass();
        let mut weighted = Vector3::zeros();
        for &id in rest {
            let particle = fetch(id)?;
            let rel = world.minimum_image(&(particle.position().coords - origin));
            weighted += rel * particle.mass();
            mass += particle.mass();
        }
        let offset = if mass > 0.0 {
            weighted / mass
        } else {
            weighted / group.len() as f64
        };
        Ok(origin + offset)
    }
}

impl OrderParameter for ParticleDistance {
    fn evaluate(&self, worlds: &WorldManager) -> Result<f64, EngineError> {
        let world = worlds
            .get(self.world)
            .ok_or_else(|| EngineError::Internal(format!("{} is not registered", self.world)))?;
        let a = Self::group_center(world, &self.first)?;
        let b = Self::group_center(world, &self.second)?;
        Ok(world.minimum_image(&(a - b)).norm())
    }

    fn boltzmann_weighted(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "particle-distance"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::term::Energy;
    use crate::core::models::blueprint::ParticleBlueprint;
    use crate::core::models::ids::SpeciesId;
    use crate::core::world::geometry::SimulationBox;
    use nalgebra::Point3;

    fn world_with(positions: &[[f64; 3]]) -> (WorldManager, Vec<ParticleId>) {
        let mut world = World::new(SimulationBox::cubic(10.0).unwrap(), 2.5, 1.0).unwrap();
        let blueprint = ParticleBlueprint::monatomic("atom", SpeciesId(0), 1.0, 0.0);
        let ids = positions
            .iter()
            .map(|p| world.add_particle(&blueprint, Point3::new(p[0], p[1], p[2])).unwrap())
            .collect();
        let mut worlds = WorldManager::new();
        worlds.add_world(world);
        (worlds, ids)
    }

    #[test]
    fn total_energy_sums_world_energies() {
        let (mut worlds, _) = world_with(&[]);
        worlds.add_world(World::new(SimulationBox::cubic(10.0).unwrap(), 2.5, 1.0).unwrap());
        worlds.get_mut(WorldId(0)).unwrap().set_energy(Energy::new(-2.0, 0.5, -0.1));
        worlds.get_mut(WorldId(1)).unwrap().set_energy(Energy::new(-1.0, 0.0, 0.0));
        let value = TotalEnergy.evaluate(&worlds).unwrap();
        assert!((value + 2.6).abs() < 1e-12);
        assert!(!TotalEnergy.boltzmann_weighted());
    }

    #[test]
    fn particle_distance_uses_minimum_image() {
        let (worlds, ids) = world_with(&[[0.5, 5.0, 5.0], [9.5, 5.0, 5.0]]);
        let op = ParticleDistance::new(WorldId(0), vec![ids[0]], vec![ids[1]]);
        assert!((op.evaluate(&worlds).unwrap() - 1.0).abs() < 1e-12);
        assert!(op.boltzmann_weighted());
    }

    #[test]
    fn particle_distance_averages_groups_across_the_boundary() {
        let (worlds, ids) = world_with(&[[9.5, 5.0, 5.0], [0.5, 5.0, 5.0], [3.0, 5.0, 5.0]]);
        let op = ParticleDistance::new(WorldId(0), vec![ids[0], ids[1]], vec![ids[2]]);
        assert!((op.evaluate(&worlds).unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn particle_distance_reports_missing_particles() {
        let (mut worlds, ids) = world_with(&[[1.0, 1.0, 1.0], [2.0, 2.0, 2.0]]);
        let op = ParticleDistance::new(WorldId(0), vec![ids[0]], vec![ids[1]]);
        worlds.get_mut(WorldId(0)).unwrap().remove_particle(ids[1]);
        assert!(matches!(op.evaluate(&worlds), Err(EngineError::Internal(_))));
    }
}
