use super::{AcceptanceCounter, Move, Proposal, Undo};
use crate::core::forcefield::registry::ForceFieldManager;
use crate::core::models::ids::SiteId;
use crate::core::world::manager::WorldManager;
use crate::engine::error::EngineError;
use nalgebra::Vector3;
use rand::{Rng, RngCore};
use rand_distr::{Distribution, UnitSphere};
use tracing::trace;

/// Replaces the director of one random site with a uniformly random unit vector.
///
/// Only sites that already carry a director are eligible. The new orientation does not
/// depend on the old one, so the proposal is symmetric.
#[derive(Debug, Clone, Default)]
pub struct DirectorRotateMove {
    counter: AcceptanceCounter,
}

impl DirectorRotateMove {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Move for DirectorRotateMove {
    fn name(&self) -> &'static str {
        "director-rotate"
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
        let directed: Vec<SiteId> = world
            .particle(particle)
            .map(|p| {
                p.sites()
                    .iter()
                    .copied()
                    .filter(|&sid| world.site(sid).is_some_and(|s| s.director.is_some()))
                    .collect()
            })
            .unwrap_or_default();
        if directed.is_empty() {
            trace!(world = %world_id, "Drawn particle carries no director");
            return Ok(None);
        }
        let site = directed[rng.gen_range(0..directed.len())];
        let saved = world.site(site).map(|s| s.director).ok_or_else(|| {
            EngineError::Internal(format!("site {site:?} vanished from {world_id}"))
        })?;

        let before = world.energy();
        let old = forcefield.evaluate_particle_energy(world, particle);
        let [x, y, z]: [f64; 3] = UnitSphere.sample(rng);
        world.set_site_director(site, Some(Vector3::new(x, y, z)))?;
        let new = forcefield.evaluate_particle_energy(world, particle);

        let delta = new - old;
        world.set_energy(before + delta);
        Ok(Some(Proposal::new(
            world_id,
            before,
            delta,
            1.0,
            Undo::Directors(vec![(site, saved)]),
        )))
    }

    fn counter(&self) -> &AcceptanceCounter {
        &self.counter
    }

    fn counter_mut(&mut self) -> &mut AcceptanceCounter {
        &mut self.counter
    }
}
