use super::ensemble::EnsembleState;
use crate::core::forcefield::term::Energy;
use crate::core::models::ids::WorldId;
use serde::Serialize;

/// Observable state of one world.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorldSnapshot {
    pub id: WorldId,
    pub energy: Energy,
    pub temperature: f64,
    pub particle_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoveAcceptance {
    pub name: String,
    pub attempted: u64,
    /// `None` until the move has been attempted.
    pub ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSnapshot {
    pub min: f64,
    pub max: f64,
    pub log_dos: Vec<f64>,
    pub counts: Vec<u64>,
}

/// Read-only summary of a walker, handed to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub walker: usize,
    pub iteration: u64,
    pub stage: usize,
    pub state: EnsembleState,
    pub worlds: Vec<WorldSnapshot>,
    pub scale_factor: f64,
    pub flatness: f64,
    pub acceptance: Vec<MoveAcceptance>,
    pub histogram: HistogramSnapshot,
}

#[derive(Debug, Clone)]
pub enum Progress {
    RunStart(Snapshot),
    Iteration(Snapshot),
    StageComplete(Snapshot),
    RunFinish(Snapshot),

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    /// Whether anyone is listening; lets callers skip building snapshots.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.callback.is_some()
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}
