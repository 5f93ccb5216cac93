use thiserror::Error;

use super::config::ConfigError;
use super::histogram::HistogramError;
use crate::core::forcefield::error::ForceFieldError;
use crate::core::world::error::WorldError;
use crate::workflows::build::BuildError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Histogram error: {0}")]
    Histogram(#[from] HistogramError),

    #[error("World error: {0}")]
    World(#[from] WorldError),

    #[error("Force field error: {0}")]
    ForceField(#[from] ForceFieldError),

    #[error("System construction failed:\n{0}")]
    Build(#[from] BuildError),

    #[error("Stage {stage} did not reach the target flatness within {iterations} iterations")]
    Convergence { stage: usize, iterations: usize },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
