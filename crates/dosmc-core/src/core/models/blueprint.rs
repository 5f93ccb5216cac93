use super::ids::SpeciesId;
use nalgebra::{Unit, Vector3};

/// One site of a [`ParticleBlueprint`], positioned relative to the particle's center.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteBlueprint {
    pub offset: Vector3<f64>,
    pub species: SpeciesId,
    pub charge: f64,
    pub mass: f64,
    pub director: Option<Unit<Vector3<f64>>>,
}

impl SiteBlueprint {
    pub fn new(species: SpeciesId, mass: f64, charge: f64) -> Self {
        Self {
            offset: Vector3::zeros(),
            species,
            charge,
            mass,
            director: None,
        }
    }

    pub fn with_offset(mut self, offset: Vector3<f64>) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_director(mut self, director: Vector3<f64>) -> Self {
        self.director = Some(Unit::new_normalize(director));
        self
    }
}

/// A detached description of a particle: the template a `World` instantiates from, and
/// the value handed back when a particle is removed from a world.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleBlueprint {
    pub name: String,
    pub species: SpeciesId,
    pub sites: Vec<SiteBlueprint>,
    pub bonds: Vec<(usize, usize)>,
}

impl ParticleBlueprint {
    pub fn new(name: &str, species: SpeciesId, sites: Vec<SiteBlueprint>) -> Self {
        Self {
            name: name.to_string(),
            species,
            sites,
            bonds: Vec::new(),
        }
    }

    /// A single-site particle whose only site shares the particle's species.
    pub fn monatomic(name: &str, species: SpeciesId, mass: f64, charge: f64) -> Self {
        Self::new(name, species, vec![SiteBlueprint::new(species, mass, charge)])
    }

    pub fn with_bond(mut self, i: usize, j: usize) -> Self {
        self.bonds.push((i, j));
        self
    }

    pub fn total_mass(&self) -> f64 {
        self.sites.iter().map(|s| s.mass).sum()
    }

    /// Mass-weighted center of the site offsets (the plain mean when the total mass is zero).
    pub fn center_offset(&self) -> Vector3<f64> {
        let mass = self.total_mass();
        if mass > 0.0 {
            self.sites
                .iter()
                .fold(Vector3::zeros(), |acc, s| acc + s.offset * s.mass)
                / mass
        } else if self.sites.is_empty() {
            Vector3::zeros()
        } else {
            self.sites
                .iter()
                .fold(Vector3::zeros(), |acc, s| acc + s.offset)
                / self.sites.len() as f64
        }
    }

    /// Checks structural validity and returns every problem found.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.sites.is_empty() {
            problems.push(format!("particle '{}' has no sites", self.name));
        }
        for (k, site) in self.sites.iter().enumerate() {
            if site.mass.is_nan() || site.mass < 0.0 {
                problems.push(format!(
                    "particle '{}' site {} has invalid mass {}",
                    self.name, k, site.mass
                ));
            }
        }
        for &(i, j) in &self.bonds {
            if i >= self.sites.len() || j >= self.sites.len() {
                problems.push(format!(
                    "particle '{}' bond ({}, {}) references a site outside 0..{}",
                    self.name,
                    i,
                    j,
                    self.sites.len()
                ));
            } else if i == j {
                problems.push(format!(
                    "particle '{}' bonds site {} to itself",
                    self.name, i
                ));
            }
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_offset_is_mass_weighted() {
        let bp = ParticleBlueprint::new(
            "dimer",
            SpeciesId(0),
            vec![
                SiteBlueprint::new(SpeciesId(0), 1.0, 0.0),
                SiteBlueprint::new(SpeciesId(0), 3.0, 0.0).with_offset(Vector3::new(4.0, 0.0, 0.0)),
            ],
        );
        assert_eq!(bp.center_offset(), Vector3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn validate_reports_every_problem() {
        let bp = ParticleBlueprint::new(
            "bad",
            SpeciesId(0),
            vec![SiteBlueprint::new(SpeciesId(0), -1.0, 0.0)],
        )
        .with_bond(0, 0)
        .with_bond(0, 5);
        let problems = bp.validate();
        assert_eq!(problems.len(), 3);
    }

    #[test]
    fn monatomic_blueprint_is_valid() {
        let bp = ParticleBlueprint::monatomic("LJ", SpeciesId(2), 1.0, 0.5);
        assert!(bp.validate().is_empty());
        assert_eq!(bp.sites[0].species, SpeciesId(2));
    }
}
