use super::{AcceptanceCounter, Move, Proposal, Undo};
use crate::core::forcefield::registry::ForceFieldManager;
use crate::core::forcefield::term::Energy;
use crate::core::models::ids::{SiteId, SpeciesId};
use crate::core::world::manager::WorldManager;
use crate::engine::config::ConfigError;
use crate::engine::error::EngineError;
use rand::{Rng, RngCore};
use tracing::trace;

/// Reassigns one random site to a different species drawn uniformly from a fixed set.
///
/// Only sites whose current species belongs to the set are eligible, which keeps the
/// proposal symmetric. Site composition changes, so the long-range tail correction is
/// part of the energy delta.
#[derive(Debug, Clone)]
pub struct SpeciesSwapMove {
    species: Vec<SpeciesId>,
    counter: AcceptanceCounter,
}

impl SpeciesSwapMove {
    pub fn new(mut species: Vec<SpeciesId>) -> Result<Self, ConfigError> {
        species.sort_unstable();
        species.dedup();
        if species.len() < 2 {
            return Err(ConfigError::Invalid {
                parameter: "species",
                reason: format!("at least two distinct species are needed, got {}", species.len()),
            });
        }
        Ok(Self {
            species,
            counter: AcceptanceCounter::default(),
        })
    }

    pub fn species(&self) -> &[SpeciesId] {
        &self.species
    }
}

impl Move for SpeciesSwapMove {
    fn name(&self) -> &'static str {
        "species-swap"
    }

    fn propose(
        &self,
        worlds: &mut WorldManager,
        forcefield: &ForceFieldManager,
        rng: &mut dyn RngCore,
    ) -> Result<Option<Proposal>, EngineError> {
        let Some(world_id) = worlds.draw_random_world(rng) else {
            return Ok(None);
        };
        let world = worlds
            .get_mut(world_id)
            .ok_or_else(|| EngineError::Internal(format!("{world_id} was drawn but is not registered")))?;
        let Some(particle) = world.draw_random_particle(rng) else {
            return Ok(None);
        };
        let eligible: Vec<(SiteId, SpeciesId)> = world
            .particle(particle)
            .map(|p| {
                p.sites()
                    .iter()
                    .filter_map(|&sid| world.site(sid).map(|s| (sid, s.species)))
                    .filter(|(_, species)| self.species.contains(species))
                    .collect()
            })
            .unwrap_or_default();
        if eligible.is_empty() {
            trace!(world = %world_id, "Drawn particle has no swappable site");
            return Ok(None);
        }
        let (site, old_species) = eligible[rng.gen_range(0..eligible.len())];
        let others: Vec<SpeciesId> = self
            .species
            .iter()
            .copied()
            .filter(|&s| s != old_species)
            .collect();
        let new_species = others[rng.gen_range(0..others.len())];

        let before = world.energy();
        let old = forcefield.evaluate_particle_energy(world, particle)
            + Energy::new(0.0, 0.0, forcefield.evaluate_tail_energy(world));
        world.set_site_species(site, new_species)?;
        let new = forcefield.evaluate_particle_energy(world, particle)
            + Energy::new(0.0, 0.0, forcefield.evaluate_tail_energy(world));

        let delta = new - old;
        world.set_energy(before + delta);
        Ok(Some(Proposal::new(
            world_id,
            before,
            delta,
            1.0,
            Undo::Species(site, old_species),
        )))
    }

    fn counter(&self) -> &AcceptanceCounter {
        &self.counter
    }

    fn counter_mut(&mut self) -> &mut AcceptanceCounter {
        &mut self.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::potentials::LennardJones;
    use crate::core::models::blueprint::{ParticleBlueprint, SiteBlueprint};
    use crate::core::models::ids::WorldId;
    use crate::core::world::geometry::SimulationBox;
    use crate::core::world::world::World;
    use crate::engine::moves::{MoveOutcome, MoveOverride};
    use nalgebra::Point3;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Arc;

    const ATOM: SpeciesId = SpeciesId(0);
    const A: SpeciesId = SpeciesId(1);
    const B: SpeciesId = SpeciesId(2);

    /// Binary Lennard-Jones mixture where the cross interaction is the most attractive.
    fn mixture(count: usize) -> (WorldManager, ForceFieldManager) {
        let mut world = World::new(SimulationBox::cubic(10.0).unwrap(), 3.0, 1.5).unwrap();
        let atom = ParticleBlueprint::new("atom", ATOM, vec![SiteBlueprint::new(A, 1.0, 0.0)]);
        world.pack(&[(atom, 1.0)], count, 0.1).unwrap();

        let mut forcefield = ForceFieldManager::new();
        let lj = |epsilon: f64| Arc::new(LennardJones::new(epsilon, 1.0, vec![3.0]).unwrap());
        forcefield.add_nonbonded(A, A, lj(1.0));
        forcefield.add_nonbonded(B, B, lj(0.5));
        forcefield.add_nonbonded(A, B, lj(1.5));
        world.set_energy(forcefield.evaluate_energy(&world));

        let mut worlds = WorldManager::new();
        worlds.add_world(world);
        (worlds, forcefield)
    }

    fn species_of_sites(worlds: &WorldManager) -> Vec<SpeciesId> {
        let world = worlds.get(WorldId(0)).unwrap();
        world.site_ids().iter().map(|&sid| world.site(sid).unwrap().species).collect()
    }

    #[test]
    fn fewer_than_two_species_is_rejected() {
        assert!(SpeciesSwapMove::new(vec![A]).is_err());
        assert!(SpeciesSwapMove::new(vec![A, A]).is_err());
        assert_eq!(SpeciesSwapMove::new(vec![B, A, B]).unwrap().species(), &[A, B]);
    }

    #[test]
    fn forced_acceptance_changes_one_site_and_keeps_counts() {
        let (mut worlds, forcefield) = mixture(27);
        let mut mv = SpeciesSwapMove::new(vec![A, B]).unwrap();
        let mut rng = StdRng::seed_from_u64(17);

        let before = species_of_sites(&worlds);
        mv.perform(&mut worlds, &forcefield, &mut rng, MoveOverride::ForceAccept)
            .unwrap();
        let after = species_of_sites(&worlds);
        let changed = before.iter().zip(&after).filter(|(a, b)| a != b).count();
        assert_eq!(changed, 1);

        let world = worlds.get(WorldId(0)).unwrap();
        assert_eq!(world.site_composition(A), 26);
        assert_eq!(world.site_composition(B), 1);
        assert_eq!(world.composition(ATOM), 27);
    }

    #[test]
    fn forced_rejection_restores_species_and_energy_exactly() {
        let (mut worlds, forcefield) = mixture(27);
        let mut mv = SpeciesSwapMove::new(vec![A, B]).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        let energy = worlds.get(WorldId(0)).unwrap().energy();
        let before = species_of_sites(&worlds);

        for _ in 0..100 {
            let outcome = mv
                .perform(&mut worlds, &forcefield, &mut rng, MoveOverride::ForceReject)
                .unwrap();
            assert_eq!(outcome, MoveOutcome::Rejected);
        }
        let world = worlds.get(WorldId(0)).unwrap();
        assert_eq!(world.energy(), energy);
        assert_eq!(species_of_sites(&worlds), before);
        assert_eq!(world.site_composition(B), 0);
    }

    #[test]
    fn incremental_energy_including_tail_matches_full_recomputation() {
        let (mut worlds, forcefield) = mixture(64);
        let mut mv = SpeciesSwapMove::new(vec![A, B]).unwrap();
        let mut rng = StdRng::seed_from_u64(77);

        for _ in 0..3_000 {
            mv.perform(&mut worlds, &forcefield, &mut rng, MoveOverride::None)
                .unwrap();
        }

        let world = worlds.get(WorldId(0)).unwrap();
        let tracked = world.energy();
        let scratch = forcefield.evaluate_energy(world);
        let scale = scratch.total().abs().max(1.0);
        assert!((tracked.total() - scratch.total()).abs() / scale < 1e-8);
        assert!((tracked.tail - scratch.tail).abs() < 1e-10);
        assert!(world.site_composition(B) > 0);
    }

    #[test]
    fn sites_outside_the_species_set_are_never_touched() {
        let mut world = World::new(SimulationBox::cubic(10.0).unwrap(), 3.0, 1.0).unwrap();
        world
            .add_particle(
                &ParticleBlueprint::monatomic("atom", ATOM, 1.0, 0.0),
                Point3::new(5.0, 5.0, 5.0),
            )
            .unwrap();
        let mut worlds = WorldManager::new();
        worlds.add_world(world);
        let mut mv = SpeciesSwapMove::new(vec![A, B]).unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        let outcome = mv
            .perform(&mut worlds, &ForceFieldManager::new(), &mut rng, MoveOverride::ForceAccept)
            .unwrap();
        assert_eq!(outcome, MoveOutcome::Skipped);
        assert_eq!(species_of_sites(&worlds), vec![ATOM]);
    }
}
