//! Monte Carlo moves.
//!
//! A move perturbs one World and hands back a [`Proposal`] describing what changed. The
//! caller decides acceptance and either commits the proposal or reverts it. Nothing
//! needed for the undo outlives the call, so a move value can be shared freely between
//! independent chains.

pub mod director;
pub mod manager;
pub mod species_swap;
pub mod translate;

use super::error::EngineError;
use super::utils::sampling;
use crate::core::forcefield::registry::ForceFieldManager;
use crate::core::forcefield::term::Energy;
use crate::core::models::ids::{SiteId, SpeciesId, WorldId};
use crate::core::world::manager::WorldManager;
use crate::core::world::world::World;
use nalgebra::{Point3, Unit, Vector3};
use rand::RngCore;
use std::fmt;
use tracing::trace;

/// Externally imposed acceptance decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MoveOverride {
    #[default]
    None,
    ForceAccept,
    ForceReject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Accepted,
    Rejected,
    /// Nothing to move (no world or no particle); no attempt is counted.
    Skipped,
}

/// Attempted and rejected move counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptanceCounter {
    attempted: u64,
    rejected: u64,
}

impl AcceptanceCounter {
    pub fn record(&mut self, accepted: bool) {
        self.attempted += 1;
        if !accepted {
            self.rejected += 1;
        }
    }

    pub fn attempted(&self) -> u64 {
        self.attempted
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Fraction of accepted attempts; `None` before the first attempt.
    pub fn ratio(&self) -> Option<f64> {
        if self.attempted == 0 {
            None
        } else {
            Some((self.attempted - self.rejected) as f64 / self.attempted as f64)
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// State captured before a perturbation, sufficient to undo it exactly.
#[derive(Debug, Clone, PartialEq)]
pub enum Undo {
    Positions(Vec<(SiteId, Point3<f64>)>),
    Directors(Vec<(SiteId, Option<Unit<Vector3<f64>>>)>),
    Species(SiteId, SpeciesId),
}

/// A perturbation that has been applied to a World but not yet decided upon.
///
/// The world's running energy already reflects `delta`. Dropping a proposal without
/// calling [`commit`](Proposal::commit) or [`revert`](Proposal::revert) keeps the change.
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub world: WorldId,
    /// Running energy of the world before the move.
    pub before: Energy,
    pub delta: Energy,
    /// Proposal asymmetry factor entering the acceptance ratio (1 for symmetric moves).
    pub bias: f64,
    undo: Undo,
}

impl Proposal {
    pub fn new(world: WorldId, before: Energy, delta: Energy, bias: f64, undo: Undo) -> Self {
        Self {
            world,
            before,
            delta,
            bias,
            undo,
        }
    }

    /// Running energy of the world after the move.
    pub fn after(&self) -> Energy {
        self.before + self.delta
    }

    /// Keeps the change and returns the energy delta.
    pub fn commit(self) -> Energy {
        self.delta
    }

    /// Restores the captured state and the energy snapshot.
    pub fn revert(self, worlds: &mut WorldManager) -> Result<(), EngineError> {
        let world = worlds.get_mut(self.world).ok_or_else(|| {
            EngineError::Internal(format!("{} vanished while a move was pending", self.world))
        })?;
        match &self.undo {
            Undo::Positions(saved) => world.restore_site_positions(saved)?,
            Undo::Directors(saved) => world.restore_site_directors(saved)?,
            Undo::Species(site, species) => world.set_site_species(*site, *species)?,
        }
        world.set_energy(self.before);
        Ok(())
    }
}

pub trait Move: Send + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Applies a random perturbation to one world.
    ///
    /// # Return
    ///
    /// `Ok(None)` when there is nothing to perturb.
    fn propose(
        &self,
        worlds: &mut WorldManager,
        forcefield: &ForceFieldManager,
        rng: &mut dyn RngCore,
    ) -> Result<Option<Proposal>, EngineError>;

    fn counter(&self) -> &AcceptanceCounter;

    fn counter_mut(&mut self) -> &mut AcceptanceCounter;

    /// Proposes, applies the Metropolis rule (unless overridden) and commits or reverts.
    fn perform(
        &mut self,
        worlds: &mut WorldManager,
        forcefield: &ForceFieldManager,
        rng: &mut dyn RngCore,
        mode: MoveOverride,
    ) -> Result<MoveOutcome, EngineError> {
        let Some(proposal) = self.propose(worlds, forcefield, rng)? else {
            return Ok(MoveOutcome::Skipped);
        };

        let accepted = match mode {
            MoveOverride::ForceAccept => true,
            MoveOverride::ForceReject => false,
            MoveOverride::None => {
                let beta = worlds.get(proposal.world).map(World::beta).ok_or_else(|| {
                    EngineError::Internal(format!("{} vanished while a move was pending", proposal.world))
                })?;
                let p = sampling::metropolis_probability(proposal.delta.total(), beta, proposal.bias);
                sampling::accept(p, rng)
            }
        };

        trace!(
            name = self.name(),
            delta = proposal.delta.total(),
            accepted,
            "Move decided"
        );
        self.counter_mut().record(accepted);
        if accepted {
            let _ = proposal.commit();
            Ok(MoveOutcome::Accepted)
        } else {
            proposal.revert(worlds)?;
            Ok(MoveOutcome::Rejected)
        }
    }

    fn acceptance_ratio(&self) -> Option<f64> {
        self.counter().ratio()
    }

    fn reset_acceptance(&mut self) {
        self.counter_mut().reset();
    }
}
