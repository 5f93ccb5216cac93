use super::ids::{SiteId, SpeciesId};
use nalgebra::Point3;

/// An ordered, exclusively owned group of sites.
///
/// Aggregate quantities (center of mass, total mass, total charge) are cached here and are
/// refreshed by the owning `World` every time one of the particle's sites changes, so a
/// `Particle` handed out by a world is always consistent with its sites.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub(crate) species: SpeciesId,
    pub(crate) name: String,
    pub(crate) sites: Vec<SiteId>,
    pub(crate) bonds: Vec<Vec<usize>>,
    pub(crate) position: Point3<f64>,
    pub(crate) mass: f64,
    pub(crate) charge: f64,
    pub(crate) order_slot: usize,
    pub(crate) species_slot: usize,
}

impl Particle {
    pub(crate) fn new(species: SpeciesId, name: &str, site_count: usize) -> Self {
        Self {
            species,
            name: name.to_string(),
            sites: Vec::with_capacity(site_count),
            bonds: vec![Vec::new(); site_count],
            position: Point3::origin(),
            mass: 0.0,
            charge: 0.0,
            order_slot: 0,
            species_slot: 0,
        }
    }

    pub fn species(&self) -> SpeciesId {
        self.species
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Site handles in their original blueprint order.
    pub fn sites(&self) -> &[SiteId] {
        &self.sites
    }

    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    /// Mass-weighted center of the particle, kept inside the primary cell.
    pub fn position(&self) -> Point3<f64> {
        self.position
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }

    /// Records a bond between local site indices `i` and `j`.
    ///
    /// # Return
    ///
    /// `false` if either index is out of range, the indices are equal, or the bond already
    /// exists.
    pub fn add_bond(&mut self, i: usize, j: usize) -> bool {
        if i == j || i >= self.bonds.len() || j >= self.bonds.len() || self.is_bonded(i, j) {
            return false;
        }
        self.bonds[i].push(j);
        self.bonds[j].push(i);
        true
    }

    /// Removes the bond between `i` and `j` from both adjacency lists.
    pub fn remove_bond(&mut self, i: usize, j: usize) -> bool {
        if !self.is_bonded(i, j) {
            return false;
        }
        self.bonds[i].retain(|&k| k != j);
        self.bonds[j].retain(|&k| k != i);
        true
    }

    pub fn is_bonded(&self, i: usize, j: usize) -> bool {
        self.bonds.get(i).is_some_and(|adj| adj.contains(&j))
    }

    /// Local indices bonded to site `i`.
    pub fn bonded_to(&self, i: usize) -> &[usize] {
        self.bonds.get(i).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every bond once, as `(i, j)` with `i < j`.
    pub fn bonded_pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.bonds
            .iter()
            .enumerate()
            .flat_map(|(i, adj)| adj.iter().filter(move |&&j| i < j).map(move |&j| (i, j)))
    }
}
