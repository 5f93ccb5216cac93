use crate::core::models::ids::{ParticleId, SiteId};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum WorldError {
    #[error("Box shape matrix is singular or not finite")]
    SingularBox,

    #[error("Neighbor cutoff must be positive and finite, got {0}")]
    InvalidCutoff(f64),

    #[error("Neighbor cutoff {cutoff} exceeds half of the smallest box width ({limit})")]
    CutoffTooLarge { cutoff: f64, limit: f64 },

    #[error("Cell size ratio must be positive and finite, got {0}")]
    InvalidCellRatio(f64),

    #[error("Temperature must be positive and finite, got {0}")]
    InvalidTemperature(f64),

    #[error("Invalid particle blueprint: {0}")]
    InvalidBlueprint(String),

    #[error("Particle center {0:?} is not finite")]
    InvalidPosition([f64; 3]),

    #[error("Item {index} of the batch was rejected, nothing was inserted: {source}")]
    InvalidBatch { index: usize, source: Box<WorldError> },

    #[error("Particle {0:?} is not part of this world")]
    UnknownParticle(ParticleId),

    #[error("Site {0:?} is not part of this world")]
    UnknownSite(SiteId),

    #[error("Invalid packing request: {0}")]
    InvalidPacking(String),
}
