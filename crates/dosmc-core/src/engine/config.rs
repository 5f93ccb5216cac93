use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TARGET_FLATNESS: f64 = 0.8;
pub const DEFAULT_INITIAL_SCALE_FACTOR: f64 = 1.0;
pub const DEFAULT_REDUCTION_ORDER: f64 = 0.5;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for parameter '{parameter}': {reason}")]
    Invalid {
        parameter: &'static str,
        reason: String,
    },
}

/// How the histogram is divided into bins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Binning {
    Count(usize),
    Width(f64),
}

/// Acceptance policy for proposals whose order parameter leaves the histogram domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryPolicy {
    /// Accept only when the current value is itself outside the domain and the proposal
    /// moves toward the interior. The lower boundary is tested first.
    #[default]
    DragInward,
    /// Always reject.
    RejectOutside,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DosConfig {
    pub interval: (f64, f64),
    pub binning: Binning,
    pub target_flatness: f64,
    pub initial_scale_factor: f64,
    pub reduction_order: f64,
    pub stages: usize,
    /// The run stops early once the scale factor falls below this value.
    pub scale_factor_tolerance: f64,
    /// Iteration cap per stage; `None` means unbounded.
    pub max_sweeps_per_stage: Option<usize>,
    pub boundary_policy: BoundaryPolicy,
    pub seed: u64,
    /// Index of this walker among independent replicas.
    pub walker: usize,
    /// Log density of states to start from, e.g. when restarting a run.
    pub initial_log_dos: Option<Vec<f64>>,
}

#[derive(Default)]
pub struct DosConfigBuilder {
    interval: Option<(f64, f64)>,
    bin_count: Option<usize>,
    bin_width: Option<f64>,
    target_flatness: Option<f64>,
    initial_scale_factor: Option<f64>,
    reduction_order: Option<f64>,
    stages: Option<usize>,
    scale_factor_tolerance: Option<f64>,
    max_sweeps_per_stage: Option<usize>,
    boundary_policy: Option<BoundaryPolicy>,
    seed: Option<u64>,
    walker: Option<usize>,
    initial_log_dos: Option<Vec<f64>>,
}

impl DosConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interval(mut self, min: f64, max: f64) -> Self {
        self.interval = Some((min, max));
        self
    }
    pub fn bin_count(mut self, count: usize) -> Self {
        self.bin_count = Some(count);
        self
    }
    pub fn bin_width(mut self, width: f64) -> Self {
        self.bin_width = Some(width);
        self
    }
    pub fn target_flatness(mut self, flatness: f64) -> Self {
        self.target_flatness = Some(flatness);
        self
    }
    pub fn initial_scale_factor(mut self, factor: f64) -> Self {
        self.initial_scale_factor = Some(factor);
        self
    }
    pub fn reduction_order(mut self, order: f64) -> Self {
        self.reduction_order = Some(order);
        self
    }
    pub fn stages(mut self, stages: usize) -> Self {
        self.stages = Some(stages);
        self
    }
    pub fn scale_factor_tolerance(mut self, tolerance: f64) -> Self {
        self.scale_factor_tolerance = Some(tolerance);
        self
    }
    pub fn max_sweeps_per_stage(mut self, sweeps: usize) -> Self {
        self.max_sweeps_per_stage = Some(sweeps);
        self
    }
    pub fn boundary_policy(mut self, policy: BoundaryPolicy) -> Self {
        self.boundary_policy = Some(policy);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn walker(mut self, walker: usize) -> Self {
        self.walker = Some(walker);
        self
    }
    pub fn initial_log_dos(mut self, values: Vec<f64>) -> Self {
        self.initial_log_dos = Some(values);
        self
    }

    pub fn build(self) -> Result<DosConfig, ConfigError> {
        let interval = self
            .interval
            .ok_or(ConfigError::MissingParameter("interval"))?;
        if !(interval.0.is_finite() && interval.1.is_finite() && interval.0 < interval.1) {
            return Err(ConfigError::Invalid {
                parameter: "interval",
                reason: format!("expected finite min < max, got [{}, {}]", interval.0, interval.1),
            });
        }

        let binning = match (self.bin_count, self.bin_width) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Invalid {
                    parameter: "bin_count",
                    reason: "bin_count and bin_width are mutually exclusive".to_string(),
                });
            }
            (Some(0), None) => {
                return Err(ConfigError::Invalid {
                    parameter: "bin_count",
                    reason: "at least one bin is required".to_string(),
                });
            }
            (Some(n), None) => Binning::Count(n),
            (None, Some(w)) if w.is_finite() && w > 0.0 => Binning::Width(w),
            (None, Some(w)) => {
                return Err(ConfigError::Invalid {
                    parameter: "bin_width",
                    reason: format!("must be positive, got {w}"),
                });
            }
            (None, None) => return Err(ConfigError::MissingParameter("bin_count")),
        };

        let target_flatness = self.target_flatness.unwrap_or(DEFAULT_TARGET_FLATNESS);
        if !(target_flatness > 0.0 && target_flatness <= 1.0) {
            return Err(ConfigError::Invalid {
                parameter: "target_flatness",
                reason: format!("must lie in (0, 1], got {target_flatness}"),
            });
        }

        let initial_scale_factor = self
            .initial_scale_factor
            .unwrap_or(DEFAULT_INITIAL_SCALE_FACTOR);
        if !(initial_scale_factor.is_finite() && initial_scale_factor > 0.0) {
            return Err(ConfigError::Invalid {
                parameter: "initial_scale_factor",
                reason: format!("must be positive, got {initial_scale_factor}"),
            });
        }

        let reduction_order = self.reduction_order.unwrap_or(DEFAULT_REDUCTION_ORDER);
        if !(reduction_order > 0.0 && reduction_order < 1.0) {
            return Err(ConfigError::Invalid {
                parameter: "reduction_order",
                reason: format!("must lie in (0, 1), got {reduction_order}"),
            });
        }

        let scale_factor_tolerance = self.scale_factor_tolerance.unwrap_or(0.0);
        if scale_factor_tolerance.is_nan() || scale_factor_tolerance < 0.0 {
            return Err(ConfigError::Invalid {
                parameter: "scale_factor_tolerance",
                reason: format!("must be non-negative, got {scale_factor_tolerance}"),
            });
        }

        if self.max_sweeps_per_stage == Some(0) {
            return Err(ConfigError::Invalid {
                parameter: "max_sweeps_per_stage",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(DosConfig {
            interval,
            binning,
            target_flatness,
            initial_scale_factor,
            reduction_order,
            stages: self.stages.ok_or(ConfigError::MissingParameter("stages"))?,
            scale_factor_tolerance,
            max_sweeps_per_stage: self.max_sweeps_per_stage,
            boundary_policy: self.boundary_policy.unwrap_or_default(),
            seed: self.seed.unwrap_or(0),
            walker: self.walker.unwrap_or(0),
            initial_log_dos: self.initial_log_dos,
        })
    }
}
