use super::potentials::{
    BondedPotential, ENERGY_TAIL_PREFACTOR, NonBondedPotential, PRESSURE_TAIL_PREFACTOR,
};
use super::term::{Energy, Pressure};
use crate::core::models::ids::{ParticleId, SiteId, SpeciesId};
use crate::core::world::world::World;
use nalgebra::Matrix3;
use std::sync::Arc;
use tracing::{instrument, trace};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Energy and virial contribution of one site (or a group of sites) with its neighbors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiteContribution {
    pub energy: f64,
    pub virial: Matrix3<f64>,
}

impl Default for SiteContribution {
    fn default() -> Self {
        Self {
            energy: 0.0,
            virial: Matrix3::zeros(),
        }
    }
}

/// Symmetric species-pair table stored flat with index `i + j * N`.
#[derive(Debug)]
struct PairTable<T: ?Sized> {
    size: usize,
    slots: Vec<Option<Arc<T>>>,
}

impl<T: ?Sized> Clone for PairTable<T> {
    fn clone(&self) -> Self {
        Self {
            size: self.size,
            slots: self.slots.clone(),
        }
    }
}

impl<T: ?Sized> Default for PairTable<T> {
    fn default() -> Self {
        Self {
            size: 0,
            slots: Vec::new(),
        }
    }
}

impl<T: ?Sized> PairTable<T> {
    fn grow(&mut self, max_species: usize) {
        let new_size = max_species + 1;
        if new_size <= self.size {
            return;
        }
        let mut slots = vec![None; new_size * new_size];
        for j in 0..self.size {
            for i in 0..self.size {
                slots[i + j * new_size] = self.slots[i + j * self.size].take();
            }
        }
        self.slots = slots;
        self.size = new_size;
    }

    fn insert(&mut self, a: SpeciesId, b: SpeciesId, value: Arc<T>) {
        self.grow(a.index().max(b.index()));
        let (i, j, n) = (a.index(), b.index(), self.size);
        self.slots[i + j * n] = Some(Arc::clone(&value));
        self.slots[j + i * n] = Some(value);
    }

    fn remove(&mut self, a: SpeciesId, b: SpeciesId) -> Option<Arc<T>> {
        let (i, j, n) = (a.index(), b.index(), self.size);
        if i >= n || j >= n {
            return None;
        }
        self.slots[j + i * n] = None;
        self.slots[i + j * n].take()
    }

    #[inline]
    fn get(&self, a: SpeciesId, b: SpeciesId) -> Option<&Arc<T>> {
        let (i, j, n) = (a.index(), b.index(), self.size);
        if i >= n || j >= n {
            return None;
        }
        self.slots[i + j * n].as_ref()
    }

    fn iter_unique(&self) -> impl Iterator<Item = (SpeciesId, SpeciesId, &Arc<T>)> {
        let n = self.size;
        (0..n).flat_map(move |j| {
            (0..=j).filter_map(move |i| {
                self.slots[i + j * n]
                    .as_ref()
                    .map(|p| (SpeciesId(i), SpeciesId(j), p))
            })
        })
    }
}

/// Registry of pair potentials keyed by species pair, and the evaluator of aggregate
/// energies, virials and tail corrections over a [`World`].
///
/// Each potential is stored once per unordered species pair, under both orderings.
#[derive(Debug, Clone, Default)]
pub struct ForceFieldManager {
    nonbonded: PairTable<dyn NonBondedPotential>,
    bonded: PairTable<dyn BondedPotential>,
}

impl ForceFieldManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the non-bonded potential between species `a` and `b`, replacing any
    /// previous one. The table grows if either id is new.
    pub fn add_nonbonded(&mut self, a: SpeciesId, b: SpeciesId, potential: Arc<dyn NonBondedPotential>) {
        trace!(%a, %b, potential = potential.name(), "Registering non-bonded potential");
        self.nonbonded.insert(a, b, potential);
    }

    /// Clears both symmetric entries for `a`/`b`.
    pub fn remove_nonbonded(&mut self, a: SpeciesId, b: SpeciesId) -> Option<Arc<dyn NonBondedPotential>> {
        self.nonbonded.remove(a, b)
    }

    #[inline]
    pub fn nonbonded(&self, a: SpeciesId, b: SpeciesId) -> Option<&dyn NonBondedPotential> {
        self.nonbonded.get(a, b).map(|p| p.as_ref())
    }

    pub fn add_bonded(&mut self, a: SpeciesId, b: SpeciesId, potential: Arc<dyn BondedPotential>) {
        trace!(%a, %b, potential = potential.name(), "Registering bonded potential");
        self.bonded.insert(a, b, potential);
    }

    pub fn remove_bonded(&mut self, a: SpeciesId, b: SpeciesId) -> Option<Arc<dyn BondedPotential>> {
        self.bonded.remove(a, b)
    }

    #[inline]
    pub fn bonded(&self, a: SpeciesId, b: SpeciesId) -> Option<&dyn BondedPotential> {
        self.bonded.get(a, b).map(|p| p.as_ref())
    }

    /// Every registered non-bonded pair once, as `(a, b, potential)` with `a <= b`.
    pub fn nonbonded_pairs(&self) -> impl Iterator<Item = (SpeciesId, SpeciesId, &dyn NonBondedPotential)> {
        self.nonbonded.iter_unique().map(|(a, b, p)| (a, b, p.as_ref()))
    }

    /// Interaction of one site with every neighbor belonging to another particle.
    ///
    /// The virial accumulates `r_ab ⊗ f`, where `r_ab` is the minimum-imaged separation of
    /// the two owning particles' centers.
    pub fn evaluate_site(&self, world: &World, id: SiteId) -> SiteContribution {
        let mut out = SiteContribution::default();
        let Some(site) = world.site(id) else {
            return out;
        };
        let owner = site.particle();
        let Some(owner_center) = world.particle(owner).map(|p| p.position()) else {
            return out;
        };

        for nid in world.neighbors(id) {
            let Some(other) = world.site(nid) else {
                continue;
            };
            if other.particle() == owner {
                continue;
            }
            let Some(potential) = self.nonbonded(site.species, other.species) else {
                continue;
            };
            let rij = world.minimum_image(&(site.position - other.position));
            let interaction = potential.evaluate(site, other, &rij, rij.norm_squared(), world.id());
            out.energy += interaction.energy;
            if let Some(other_center) = world.particle(other.particle()).map(|p| p.position()) {
                let rab = world.minimum_image(&(owner_center - other_center));
                out.virial += rab * interaction.force.transpose();
            }
        }
        out
    }

    /// Non-bonded energy of one site with all sites of other particles.
    #[inline]
    pub fn evaluate_inter_energy(&self, world: &World, id: SiteId) -> f64 {
        self.evaluate_site(world, id).energy
    }

    /// Non-bonded energy of a particle with the rest of the world.
    pub fn evaluate_particle_inter_energy(&self, world: &World, id: ParticleId) -> f64 {
        world.particle(id).map_or(0.0, |p| {
            p.sites()
                .iter()
                .map(|&sid| self.evaluate_inter_energy(world, sid))
                .sum()
        })
    }

    /// Bonded energy inside one particle.
    pub fn evaluate_particle_intra_energy(&self, world: &World, id: ParticleId) -> f64 {
        let Some(particle) = world.particle(id) else {
            return 0.0;
        };
        let sites = particle.sites();
        particle
            .bonded_pairs()
            .filter_map(|(i, j)| {
                let a = world.site(sites[i])?;
                let b = world.site(sites[j])?;
                let potential = self.bonded(a.species, b.species)?;
                let rij = world.minimum_image(&(a.position - b.position));
                Some(potential.evaluate(a, b, &rij, rij.norm_squared()).energy)
            })
            .sum()
    }

    /// Energy terms that change when one particle moves: its non-bonded energy with the
    /// rest of the world and its own bonded energy.
    pub fn evaluate_particle_energy(&self, world: &World, id: ParticleId) -> Energy {
        Energy::new(
            self.evaluate_particle_inter_energy(world, id),
            self.evaluate_particle_intra_energy(world, id),
            0.0,
        )
    }

    /// Total non-bonded energy and virial of a world, each pair counted once.
    #[instrument(level = "trace", skip_all, fields(world = %world.id()))]
    pub fn evaluate_world_inter(&self, world: &World) -> SiteContribution {
        let ids = world.site_ids();
        let contribution = |sid: &SiteId| {
            let c = self.evaluate_site(world, *sid);
            (c.energy, c.virial)
        };
        let combine = |a: (f64, Matrix3<f64>), b: (f64, Matrix3<f64>)| (a.0 + b.0, a.1 + b.1);

        #[cfg(feature = "parallel")]
        let (energy, virial) = ids
            .par_iter()
            .map(contribution)
            .reduce(|| (0.0, Matrix3::zeros()), combine);
        #[cfg(not(feature = "parallel"))]
        let (energy, virial) = ids
            .iter()
            .map(contribution)
            .fold((0.0, Matrix3::zeros()), combine);

        SiteContribution {
            energy: 0.5 * energy,
            virial: 0.5 * virial,
        }
    }

    /// Total non-bonded energy of a world.
    pub fn evaluate_world_inter_energy(&self, world: &World) -> f64 {
        self.evaluate_world_inter(world).energy
    }

    /// Total pair virial tensor of a world.
    pub fn evaluate_virial(&self, world: &World) -> Matrix3<f64> {
        self.evaluate_world_inter(world).virial
    }

    /// Total bonded energy of a world.
    pub fn evaluate_intra_energy(&self, world: &World) -> f64 {
        world
            .particle_ids()
            .iter()
            .map(|&pid| self.evaluate_particle_intra_energy(world, pid))
            .sum()
    }

    /// Sums `f(N_a N_b, potential)` over unordered species pairs, counting cross pairs twice.
    fn sum_over_pairs<F>(&self, world: &World, f: F) -> f64
    where
        F: Fn(f64, &dyn NonBondedPotential) -> f64,
    {
        self.nonbonded_pairs()
            .map(|(a, b, potential)| {
                let na = world.site_composition(a) as f64;
                let nb = world.site_composition(b) as f64;
                let multiplicity = if a == b { 1.0 } else { 2.0 };
                multiplicity * f(na * nb, potential)
            })
            .sum()
    }

    /// Long-range energy correction `2π/V Σ N_a N_b e_tail(a, b)`.
    pub fn evaluate_tail_energy(&self, world: &World) -> f64 {
        let id = world.id();
        let volume = world.volume();
        self.sum_over_pairs(world, |nn, p| ENERGY_TAIL_PREFACTOR * nn * p.energy_tail(id) / volume)
    }

    /// Long-range pressure correction `2π/(3V²) Σ N_a N_b p_tail(a, b)`.
    pub fn evaluate_tail_pressure(&self, world: &World) -> f64 {
        let id = world.id();
        let v2 = world.volume().powi(2);
        self.sum_over_pairs(world, |nn, p| PRESSURE_TAIL_PREFACTOR * nn * p.pressure_tail(id) / v2)
    }

    /// Full energy breakdown of a world, computed from scratch.
    pub fn evaluate_energy(&self, world: &World) -> Energy {
        Energy::new(
            self.evaluate_world_inter_energy(world),
            self.evaluate_intra_energy(world),
            self.evaluate_tail_energy(world),
        )
    }

    /// Isotropic pressure: ideal-gas term from particle density, pair virial, tail.
    pub fn evaluate_pressure(&self, world: &World) -> Pressure {
        let volume = world.volume();
        let virial = self.evaluate_virial(world);
        Pressure {
            ideal: world.particle_count() as f64 * world.boltzmann() * world.temperature() / volume,
            virial: virial.trace() / (3.0 * volume),
            tail: self.evaluate_tail_pressure(world),
        }
    }
}
