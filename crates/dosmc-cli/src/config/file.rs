use crate::error::{CliError, Result};
use dosmc::core::io::spec::{OrderParameterSpec, SystemSpec};
use dosmc::engine::config::BoundaryPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Contents of a simulation file: the system, what to sample, and where results go.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub system: SystemSpec,
    #[serde(default)]
    pub order_parameter: OrderParameterSpec,
    #[serde(default)]
    pub ensemble: FileEnsembleConfig,
    #[serde(default)]
    pub output: FileOutputConfig,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileEnsembleConfig {
    pub interval: Option<[f64; 2]>,
    pub bin_count: Option<usize>,
    pub bin_width: Option<f64>,
    pub target_flatness: Option<f64>,
    pub initial_scale_factor: Option<f64>,
    pub reduction_order: Option<f64>,
    pub stages: Option<usize>,
    pub scale_factor_tolerance: Option<f64>,
    pub max_sweeps_per_stage: Option<usize>,
    pub boundary_policy: Option<BoundaryPolicy>,
    pub seed: Option<u64>,
    pub replicas: Option<usize>,
    pub overlap: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileOutputConfig {
    pub histogram: Option<PathBuf>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }
}
