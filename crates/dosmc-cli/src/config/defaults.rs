use std::path::PathBuf;

pub struct DefaultsConfig {
    pub stages: usize,
    pub histogram_output: PathBuf,
    pub replicas: usize,
    pub overlap: f64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            stages: 20,
            histogram_output: PathBuf::from("dos.csv"),
            replicas: 1,
            overlap: 0.5,
        }
    }
}
