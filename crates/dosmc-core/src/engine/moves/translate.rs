use super::{AcceptanceCounter, Move, Proposal, Undo};
use crate::core::forcefield::registry::ForceFieldManager;
use crate::core::world::manager::WorldManager;
use crate::engine::config::ConfigError;
use crate::engine::error::EngineError;
use nalgebra::Vector3;
use rand::{Rng, RngCore};
use tracing::trace;

/// Rigid displacement of one random particle by up to `dx / 2` along each axis.
#[derive(Debug, Clone)]
pub struct TranslateMove {
    dx: f64,
    counter: AcceptanceCounter,
}

impl TranslateMove {
    pub fn new(dx: f64) -> Result<Self, ConfigError> {
        if !(dx.is_finite() && dx > 0.0) {
            return Err(ConfigError::Invalid {
                parameter: "dx",
                reason: format!("maximum displacement must be positive, got {dx}"),
            });
        }
        Ok(Self {
            dx,
            counter: AcceptanceCounter::default(),
        })
    }

    pub fn dx(&self) -> f64 {
        self.dx
    }
}

impl Move for TranslateMove {
    fn name(&self) -> &'static str {
        "translate"
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
            trace!(world = %world_id, "No particle to translate");
            return Ok(None);
        };
        let saved = world.site_positions(particle).ok_or_else(|| {
            EngineError::Internal(format!("drawn particle {particle:?} has no sites in {world_id}"))
        })?;

        let before = world.energy();
        let old = forcefield.evaluate_particle_energy(world, particle);
        let offset = Vector3::from_fn(|_, _| self.dx * (rng.r#gen::<f64>() - 0.5));
        world.translate_particle(particle, &offset)?;
        let new = forcefield.evaluate_particle_energy(world, particle);

        let delta = new - old;
        world.set_energy(before + delta);
        Ok(Some(Proposal::new(
            world_id,
            before,
            delta,
            1.0,
            Undo::Positions(saved),
        )))
    }

    fn counter(&self) -> &AcceptanceCounter {
        &self.counter
    }

    fn counter_mut(&mut self) -> &mut AcceptanceCounter {
        &mut self.counter
    }
}
