use dosmc::core::io::spec::{OrderParameterSpec, SystemSpec};
use dosmc::engine::config::DosConfig;
use std::path::PathBuf;

pub struct AppConfig {
    pub system: SystemSpec,
    pub order_parameter: OrderParameterSpec,
    pub dos: DosConfig,
    pub replicas: usize,
    pub overlap: f64,
    pub histogram_output: PathBuf,
}
