use super::ids::{ParticleId, SpeciesId};
use nalgebra::{Point3, Unit, Vector3};

/// A single interaction center.
///
/// Sites are created and destroyed only together with their owning particle; the
/// `particle` field is a plain key back into the world's particle arena and carries no
/// ownership.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub position: Point3<f64>,
    pub director: Option<Unit<Vector3<f64>>>,
    pub species: SpeciesId,
    pub charge: f64,
    pub mass: f64,
    pub(crate) particle: ParticleId,
}

impl Site {
    /// Returns the particle that owns this site.
    #[inline]
    pub fn particle(&self) -> ParticleId {
        self.particle
    }
}
