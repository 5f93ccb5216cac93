use super::cell_list::CellList;
use super::error::WorldError;
use super::geometry::SimulationBox;
use crate::core::forcefield::term::Energy;
use crate::core::models::blueprint::{ParticleBlueprint, SiteBlueprint};
use crate::core::models::ids::{ParticleId, SiteId, SpeciesId, WorldId};
use crate::core::models::particle::Particle;
use crate::core::models::site::Site;
use nalgebra::{Point3, Unit, Vector3};
use rand::Rng;
use slotmap::SlotMap;
use tracing::{debug, instrument};

pub const DEFAULT_CELL_RATIO: f64 = 1.0;
pub const DEFAULT_BOLTZMANN: f64 = 1.0;

/// A periodic simulation domain owning its particles and their sites.
///
/// Sites live in one arena shared by all particles; particles hold the keys of the sites
/// they own. Per-species composition counts (by particle species and by site species) and
/// the linked-cell index are updated together with every membership or position change,
/// so they always agree with the stored particles.
#[derive(Debug, Clone)]
pub struct World {
    id: WorldId,
    geometry: SimulationBox,
    cutoff: f64,
    cell_ratio: f64,
    temperature: f64,
    boltzmann: f64,
    sites: SlotMap<SiteId, Site>,
    particles: SlotMap<ParticleId, Particle>,
    order: Vec<ParticleId>,
    by_species: Vec<Vec<ParticleId>>,
    site_composition: Vec<usize>,
    cells: CellList,
    energy: Energy,
}

impl World {
    /// Creates an empty world.
    ///
    /// # Errors
    ///
    /// Fails if the cutoff is not positive, exceeds half the smallest box width, or if the
    /// temperature is not positive.
    pub fn new(geometry: SimulationBox, cutoff: f64, temperature: f64) -> Result<Self, WorldError> {
        Self::validate_cutoff(&geometry, cutoff)?;
        if !(temperature.is_finite() && temperature > 0.0) {
            return Err(WorldError::InvalidTemperature(temperature));
        }
        let cells = CellList::new(&geometry, cutoff, DEFAULT_CELL_RATIO);
        Ok(Self {
            id: WorldId::default(),
            geometry,
            cutoff,
            cell_ratio: DEFAULT_CELL_RATIO,
            temperature,
            boltzmann: DEFAULT_BOLTZMANN,
            sites: SlotMap::with_key(),
            particles: SlotMap::with_key(),
            order: Vec::new(),
            by_species: Vec::new(),
            site_composition: Vec::new(),
            cells,
            energy: Energy::default(),
        })
    }

    fn validate_cutoff(geometry: &SimulationBox, cutoff: f64) -> Result<(), WorldError> {
        if !(cutoff.is_finite() && cutoff > 0.0) {
            return Err(WorldError::InvalidCutoff(cutoff));
        }
        let limit = 0.5 * geometry.min_width();
        if cutoff > limit {
            return Err(WorldError::CutoffTooLarge { cutoff, limit });
        }
        Ok(())
    }

    #[inline]
    pub fn id(&self) -> WorldId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: WorldId) {
        self.id = id;
    }

    #[inline]
    pub fn geometry(&self) -> &SimulationBox {
        &self.geometry
    }

    pub fn volume(&self) -> f64 {
        self.geometry.volume()
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn cell_ratio(&self) -> f64 {
        self.cell_ratio
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn boltzmann(&self) -> f64 {
        self.boltzmann
    }

    /// Inverse thermal energy `1 / (kB T)`.
    pub fn beta(&self) -> f64 {
        1.0 / (self.boltzmann * self.temperature)
    }

    pub fn set_temperature(&mut self, temperature: f64) -> Result<(), WorldError> {
        if !(temperature.is_finite() && temperature > 0.0) {
            return Err(WorldError::InvalidTemperature(temperature));
        }
        self.temperature = temperature;
        Ok(())
    }

    pub fn set_boltzmann(&mut self, boltzmann: f64) {
        self.boltzmann = boltzmann;
    }

    /// Changes the neighbor cutoff and regenerates the cell list.
    pub fn set_cutoff(&mut self, cutoff: f64) -> Result<(), WorldError> {
        Self::validate_cutoff(&self.geometry, cutoff)?;
        self.cutoff = cutoff;
        self.rebuild_cell_list();
        Ok(())
    }

    pub fn set_cell_ratio(&mut self, ratio: f64) -> Result<(), WorldError> {
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(WorldError::InvalidCellRatio(ratio));
        }
        self.cell_ratio = ratio;
        self.rebuild_cell_list();
        Ok(())
    }

    /// Replaces the box, mapping every particle center affinely into the new box.
    ///
    /// Particle shapes are preserved; only centers are rescaled.
    pub fn set_geometry(&mut self, geometry: SimulationBox) -> Result<(), WorldError> {
        Self::validate_cutoff(&geometry, self.cutoff)?;
        let old = std::mem::replace(&mut self.geometry, geometry);
        let ids: Vec<ParticleId> = self.order.clone();
        for pid in ids {
            let center = self.particles[pid].position;
            let target = self.geometry.to_cartesian(&old.to_fractional(&center));
            self.shift_particle(pid, &(target - center));
        }
        self.rebuild_cell_list();
        Ok(())
    }

    /// Regenerates grid and stripes, then re-files every site.
    pub fn rebuild_cell_list(&mut self) {
        self.cells
            .generate(&self.geometry, self.cutoff, self.cell_ratio);
        self.cells
            .rebuild(&self.geometry, self.sites.iter().map(|(id, s)| (id, &s.position)));
    }

    pub fn cell_list(&self) -> &CellList {
        &self.cells
    }

    /// Flat cell index for a position, see [`CellList::cell_index`].
    pub fn cell_index(&self, position: &Point3<f64>) -> usize {
        self.cells.cell_index(&self.geometry, position)
    }

    #[inline]
    pub fn minimum_image(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.geometry.minimum_image(v)
    }

    #[inline]
    pub fn wrap(&self, position: &Point3<f64>) -> Point3<f64> {
        self.geometry.wrap(position)
    }

    /// Candidate interaction partners of a site, the site itself included.
    pub fn neighbors(&self, id: SiteId) -> impl Iterator<Item = SiteId> + '_ {
        self.cells.neighbors(id)
    }

    pub fn energy(&self) -> Energy {
        self.energy
    }

    pub fn set_energy(&mut self, energy: Energy) {
        self.energy = energy;
    }

    pub fn particle(&self, id: ParticleId) -> Option<&Particle> {
        self.particles.get(id)
    }

    /// Mutable access for topology edits; aggregates stay under the world's control.
    pub fn particle_mut(&mut self, id: ParticleId) -> Option<&mut Particle> {
        self.particles.get_mut(id)
    }

    pub fn site(&self, id: SiteId) -> Option<&Site> {
        self.sites.get(id)
    }

    /// Particles in insertion order (with removals filled by the last particle).
    pub fn particle_ids(&self) -> &[ParticleId] {
        &self.order
    }

    pub fn particles(&self) -> impl Iterator<Item = (ParticleId, &Particle)> {
        self.order.iter().map(|&id| (id, &self.particles[id]))
    }

    pub fn sites(&self) -> impl Iterator<Item = (SiteId, &Site)> {
        self.sites.iter()
    }

    pub fn site_ids(&self) -> Vec<SiteId> {
        self.sites.keys().collect()
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    /// Number of particles of the given species.
    pub fn composition(&self, species: SpeciesId) -> usize {
        self.by_species.get(species.index()).map_or(0, Vec::len)
    }

    /// Number of sites of the given species.
    pub fn site_composition(&self, species: SpeciesId) -> usize {
        self.site_composition
            .get(species.index())
            .copied()
            .unwrap_or(0)
    }

    /// Per-species particle counts, indexed by species id.
    pub fn particle_composition_table(&self) -> Vec<usize> {
        self.by_species.iter().map(Vec::len).collect()
    }

    /// Per-species site counts, indexed by species id.
    pub fn site_composition_table(&self) -> &[usize] {
        &self.site_composition
    }

    fn grow_tables(&mut self, species: SpeciesId) {
        let needed = species.index() + 1;
        if self.by_species.len() < needed {
            self.by_species.resize_with(needed, Vec::new);
        }
        if self.site_composition.len() < needed {
            self.site_composition.resize(needed, 0);
        }
    }

    /// Instantiates a blueprint with its mass-weighted center at `center`.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidBlueprint`] if the blueprint fails validation.
    #[instrument(level = "trace", skip_all, fields(world = %self.id, particle = %blueprint.name))]
    pub fn add_particle(
        &mut self,
        blueprint: &ParticleBlueprint,
        center: Point3<f64>,
    ) -> Result<ParticleId, WorldError> {
        let id = self.try_insert_particle(blueprint, center)?;
        self.rebuild_cell_list();
        Ok(id)
    }

    /// Adds several particles with a single cell-list rebuild at the end.
    ///
    /// The batch is all-or-nothing: every blueprint and center is checked before the
    /// first insert, so a failure leaves the world untouched.
    pub fn add_particles<'a, I>(&mut self, items: I) -> Result<Vec<ParticleId>, WorldError>
    where
        I: IntoIterator<Item = (&'a ParticleBlueprint, Point3<f64>)>,
    {
        let items: Vec<_> = items.into_iter().collect();
        for (index, (blueprint, center)) in items.iter().enumerate() {
            Self::check_insert(blueprint, center)
                .map_err(|e| WorldError::InvalidBatch { index, source: Box::new(e) })?;
        }
        let ids: Vec<ParticleId> = items
            .into_iter()
            .map(|(blueprint, center)| self.insert_particle(blueprint, center))
            .collect();
        self.rebuild_cell_list();
        Ok(ids)
    }

    fn check_insert(blueprint: &ParticleBlueprint, center: &Point3<f64>) -> Result<(), WorldError> {
        let problems = blueprint.validate();
        if !problems.is_empty() {
            return Err(WorldError::InvalidBlueprint(problems.join("; ")));
        }
        if !center.iter().all(|c| c.is_finite()) {
            return Err(WorldError::InvalidPosition([center.x, center.y, center.z]));
        }
        Ok(())
    }

    fn try_insert_particle(
        &mut self,
        blueprint: &ParticleBlueprint,
        center: Point3<f64>,
    ) -> Result<ParticleId, WorldError> {
        Self::check_insert(blueprint, &center)?;
        Ok(self.insert_particle(blueprint, center))
    }

    /// Inserts an already checked blueprint without touching the cell list.
    fn insert_particle(&mut self, blueprint: &ParticleBlueprint, center: Point3<f64>) -> ParticleId {
        let origin = center - blueprint.center_offset();
        let pid = self
            .particles
            .insert(Particle::new(blueprint.species, &blueprint.name, blueprint.sites.len()));

        for sb in &blueprint.sites {
            let sid = self.sites.insert(Site {
                position: origin + sb.offset,
                director: sb.director,
                species: sb.species,
                charge: sb.charge,
                mass: sb.mass,
                particle: pid,
            });
            self.grow_tables(sb.species);
            self.site_composition[sb.species.index()] += 1;
            self.particles[pid].sites.push(sid);
        }
        for &(i, j) in &blueprint.bonds {
            self.particles[pid].add_bond(i, j);
        }

        self.grow_tables(blueprint.species);
        let species_list = &mut self.by_species[blueprint.species.index()];
        let particle = &mut self.particles[pid];
        particle.species_slot = species_list.len();
        species_list.push(pid);
        particle.order_slot = self.order.len();
        self.order.push(pid);

        self.refresh_particle(pid);
        let shift = self.geometry.wrap_shift(&self.particles[pid].position);
        if shift.norm_squared() > 0.0 {
            self.shift_particle(pid, &shift);
        }
        pid
    }

    /// Removes a particle together with its sites.
    ///
    /// # Return
    ///
    /// The detached particle as a blueprint (offsets relative to its center), or `None` if
    /// the particle is not in this world.
    #[instrument(level = "trace", skip_all, fields(world = %self.id))]
    pub fn remove_particle(&mut self, id: ParticleId) -> Option<ParticleBlueprint> {
        let particle = self.particles.remove(id)?;

        let moved = self.order.swap_remove(particle.order_slot);
        debug_assert_eq!(moved, id);
        if let Some(&filler) = self.order.get(particle.order_slot) {
            self.particles[filler].order_slot = particle.order_slot;
        }
        let list = &mut self.by_species[particle.species.index()];
        list.swap_remove(particle.species_slot);
        if let Some(&filler) = list.get(particle.species_slot) {
            self.particles[filler].species_slot = particle.species_slot;
        }

        let first = particle
            .sites
            .first()
            .and_then(|&sid| self.sites.get(sid))
            .map(|s| s.position)
            .unwrap_or(particle.position);
        let mut sites = Vec::with_capacity(particle.sites.len());
        for &sid in &particle.sites {
            if let Some(site) = self.sites.remove(sid) {
                self.site_composition[site.species.index()] -= 1;
                let unwrapped = particle.position
                    + self.geometry.minimum_image(&(first - particle.position))
                    + self.geometry.minimum_image(&(site.position - first));
                sites.push(SiteBlueprint {
                    offset: unwrapped - particle.position,
                    species: site.species,
                    charge: site.charge,
                    mass: site.mass,
                    director: site.director,
                });
            }
        }
        self.rebuild_cell_list();

        Some(ParticleBlueprint {
            name: particle.name.clone(),
            species: particle.species,
            sites,
            bonds: particle.bonded_pairs().collect(),
        })
    }

    /// Recomputes the cached aggregates of a particle from its sites.
    ///
    /// Site positions are unwrapped relative to the first site, so particles straddling a
    /// periodic boundary still get a sensible center.
    fn refresh_particle(&mut self, id: ParticleId) {
        let Some(particle) = self.particles.get(id) else {
            return;
        };
        let Some(first) = particle.sites.first().and_then(|&s| self.sites.get(s)) else {
            return;
        };
        let reference = first.position;

        let mut mass = 0.0;
        let mut charge = 0.0;
        let mut weighted = Vector3::zeros();
        let mut plain = Vector3::zeros();
        for &sid in &particle.sites {
            let site = &self.sites[sid];
            let rel = self.geometry.minimum_image(&(site.position - reference));
            mass += site.mass;
            charge += site.charge;
            weighted += rel * site.mass;
            plain += rel;
        }
        let rel_center = if mass > 0.0 {
            weighted / mass
        } else {
            plain / particle.sites.len() as f64
        };

        let particle = &mut self.particles[id];
        particle.position = reference + rel_center;
        particle.mass = mass;
        particle.charge = charge;
    }

    /// Rigidly shifts every site of a particle, keeping the cell list in sync.
    fn shift_particle(&mut self, id: ParticleId, delta: &Vector3<f64>) {
        let Some(particle) = self.particles.get_mut(id) else {
            return;
        };
        particle.position += *delta;
        for &sid in &particle.sites {
            let site = &mut self.sites[sid];
            site.position += *delta;
            self.cells.update(&self.geometry, sid, &site.position);
        }
    }

    /// Translates a particle and folds it back into the primary cell as a whole.
    pub fn translate_particle(&mut self, id: ParticleId, delta: &Vector3<f64>) -> Result<(), WorldError> {
        let center = self
            .particles
            .get(id)
            .ok_or(WorldError::UnknownParticle(id))?
            .position;
        let target = center + delta;
        let shift = self.geometry.wrap_shift(&target);
        self.shift_particle(id, &(delta + shift));
        Ok(())
    }

    /// Moves a particle so that its center sits at `position` (wrapped into the box).
    pub fn set_particle_position(&mut self, id: ParticleId, position: Point3<f64>) -> Result<(), WorldError> {
        let center = self
            .particles
            .get(id)
            .ok_or(WorldError::UnknownParticle(id))?
            .position;
        let target = self.geometry.wrap(&position);
        self.shift_particle(id, &(target - center));
        Ok(())
    }

    /// Positions of every site of a particle, in particle order.
    pub fn site_positions(&self, id: ParticleId) -> Option<Vec<(SiteId, Point3<f64>)>> {
        let particle = self.particles.get(id)?;
        Some(
            particle
                .sites
                .iter()
                .map(|&sid| (sid, self.sites[sid].position))
                .collect(),
        )
    }

    /// Restores site positions captured earlier, bit for bit, and refreshes aggregates.
    pub fn restore_site_positions(&mut self, saved: &[(SiteId, Point3<f64>)]) -> Result<(), WorldError> {
        let mut touched: Vec<ParticleId> = Vec::new();
        for &(sid, position) in saved {
            let site = self.sites.get_mut(sid).ok_or(WorldError::UnknownSite(sid))?;
            site.position = position;
            if !touched.contains(&site.particle) {
                touched.push(site.particle);
            }
            self.cells.update(&self.geometry, sid, &position);
        }
        for pid in touched {
            self.refresh_particle(pid);
        }
        Ok(())
    }

    pub fn set_site_position(&mut self, id: SiteId, position: Point3<f64>) -> Result<(), WorldError> {
        let site = self.sites.get_mut(id).ok_or(WorldError::UnknownSite(id))?;
        site.position = position;
        let owner = site.particle;
        self.cells.update(&self.geometry, id, &position);
        self.refresh_particle(owner);
        Ok(())
    }

    pub fn set_site_charge(&mut self, id: SiteId, charge: f64) -> Result<(), WorldError> {
        let site = self.sites.get_mut(id).ok_or(WorldError::UnknownSite(id))?;
        site.charge = charge;
        let owner = site.particle;
        self.refresh_particle(owner);
        Ok(())
    }

    pub fn set_site_mass(&mut self, id: SiteId, mass: f64) -> Result<(), WorldError> {
        let site = self.sites.get_mut(id).ok_or(WorldError::UnknownSite(id))?;
        site.mass = mass;
        let owner = site.particle;
        self.refresh_particle(owner);
        Ok(())
    }

    pub fn set_site_director(&mut self, id: SiteId, director: Option<Vector3<f64>>) -> Result<(), WorldError> {
        let site = self.sites.get_mut(id).ok_or(WorldError::UnknownSite(id))?;
        site.director = director.map(Unit::new_normalize);
        Ok(())
    }

    /// Puts back directors captured earlier without renormalizing them.
    pub fn restore_site_directors(
        &mut self,
        saved: &[(SiteId, Option<Unit<Vector3<f64>>>)],
    ) -> Result<(), WorldError> {
        for &(sid, director) in saved {
            self.sites.get_mut(sid).ok_or(WorldError::UnknownSite(sid))?.director = director;
        }
        Ok(())
    }

    /// Changes the species of one site, keeping the site composition table in sync.
    ///
    /// The owning particle keeps its own species.
    pub fn set_site_species(&mut self, id: SiteId, species: SpeciesId) -> Result<(), WorldError> {
        let old = self.sites.get(id).ok_or(WorldError::UnknownSite(id))?.species;
        if old == species {
            return Ok(());
        }
        self.grow_tables(species);
        self.site_composition[old.index()] -= 1;
        self.site_composition[species.index()] += 1;
        self.sites[id].species = species;
        Ok(())
    }

    /// Uniformly random particle, or `None` if the world is empty.
    pub fn draw_random_particle<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<ParticleId> {
        if self.order.is_empty() {
            return None;
        }
        Some(self.order[rng.gen_range(0..self.order.len())])
    }

    /// Uniformly random particle of one species, or `None` if that species is absent.
    pub fn draw_random_particle_by_species<R: Rng + ?Sized>(
        &self,
        species: SpeciesId,
        rng: &mut R,
    ) -> Option<ParticleId> {
        let list = self.by_species.get(species.index())?;
        if list.is_empty() {
            return None;
        }
        Some(list[rng.gen_range(0..list.len())])
    }

    /// Uniformly random particle among all particles whose species is in `species`.
    ///
    /// Each species is chosen in proportion to its particle count, so every eligible
    /// particle is equally likely.
    pub fn draw_particle_from_species_list<R: Rng + ?Sized>(
        &self,
        species: &[SpeciesId],
        rng: &mut R,
    ) -> Option<ParticleId> {
        let total: usize = species.iter().map(|&s| self.composition(s)).sum();
        if total == 0 {
            return None;
        }
        let mut pick = rng.gen_range(0..total);
        for &s in species {
            let count = self.composition(s);
            if pick < count {
                return Some(self.by_species[s.index()][pick]);
            }
            pick -= count;
        }
        None
    }

    /// Places `count` particles on a simple cubic lattice at the given number density.
    ///
    /// The box is scaled isotropically so that its volume equals `count / density`.
    /// Particles are assigned to blueprints in proportion to `fractions`; rounding is
    /// absorbed by the last blueprint.
    #[instrument(skip_all, fields(world = %self.id, count = count, density = density))]
    pub fn pack(
        &mut self,
        blueprints: &[(ParticleBlueprint, f64)],
        count: usize,
        density: f64,
    ) -> Result<Vec<ParticleId>, WorldError> {
        if blueprints.is_empty() {
            return Err(WorldError::InvalidPacking("no blueprints given".into()));
        }
        if !(density.is_finite() && density > 0.0) {
            return Err(WorldError::InvalidPacking(format!("density must be positive, got {density}")));
        }
        let fraction_sum: f64 = blueprints.iter().map(|(_, f)| *f).sum();
        if blueprints.iter().any(|(_, f)| *f < 0.0) || fraction_sum <= 0.0 {
            return Err(WorldError::InvalidPacking("fractions must be non-negative with a positive sum".into()));
        }

        let target_volume = count as f64 / density;
        let factor = (target_volume / self.volume()).cbrt();
        let scaled = self.geometry.scaled(factor)?;
        self.set_geometry(scaled)?;

        let mut per_blueprint: Vec<usize> = blueprints
            .iter()
            .map(|(_, f)| (f / fraction_sum * count as f64).round() as usize)
            .collect();
        let assigned: usize = per_blueprint[..blueprints.len() - 1].iter().sum();
        if let Some(last) = per_blueprint.last_mut() {
            *last = count.saturating_sub(assigned);
        }

        let side = (count as f64).cbrt().ceil().max(1.0) as usize;
        let lattice = |k: usize| {
            let s = Vector3::new(
                ((k % side) as f64 + 0.5) / side as f64,
                (((k / side) % side) as f64 + 0.5) / side as f64,
                ((k / (side * side)) as f64 + 0.5) / side as f64,
            );
            self.geometry.to_cartesian(&s)
        };
        let placements: Vec<(&ParticleBlueprint, Point3<f64>)> = blueprints
            .iter()
            .zip(&per_blueprint)
            .flat_map(|((bp, _), &n)| std::iter::repeat_n(bp, n))
            .take(count)
            .enumerate()
            .map(|(k, bp)| (bp, lattice(k)))
            .collect();

        let ids = self.add_particles(placements)?;
        debug!(
            placed = ids.len(),
            volume = self.volume(),
            "Packed world on a cubic lattice"
        );
        Ok(ids)
    }
}
