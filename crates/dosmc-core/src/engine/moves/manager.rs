use super::{AcceptanceCounter, Move};
use crate::engine::config::ConfigError;
use rand::Rng;
use tracing::debug;

/// Weighted collection of moves.
///
/// Weights are relative; after every add or remove they are renormalized into a
/// non-decreasing cumulative distribution whose last entry is 1.
#[derive(Debug, Default)]
pub struct MoveManager {
    moves: Vec<(Box<dyn Move>, f64)>,
    cumulative: Vec<f64>,
}

impl MoveManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a move with a relative selection weight.
    ///
    /// # Return
    ///
    /// The index of the move.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `weight` is not positive and finite.
    pub fn add_move(&mut self, mv: Box<dyn Move>, weight: f64) -> Result<usize, ConfigError> {
        if !(weight.is_finite() && weight > 0.0) {
            return Err(ConfigError::Invalid {
                parameter: "weight",
                reason: format!("move weight must be positive, got {weight}"),
            });
        }
        debug!(name = mv.name(), weight, "Registering move");
        self.moves.push((mv, weight));
        self.renormalize();
        Ok(self.moves.len() - 1)
    }

    pub fn remove_move(&mut self, index: usize) -> Option<Box<dyn Move>> {
        if index >= self.moves.len() {
            return None;
        }
        let (mv, _) = self.moves.remove(index);
        self.renormalize();
        Some(mv)
    }

    fn renormalize(&mut self) {
        let total: f64 = self.moves.iter().map(|(_, w)| w).sum();
        let mut running = 0.0;
        self.cumulative = self
            .moves
            .iter()
            .map(|(_, w)| {
                running += w;
                running / total
            })
            .collect();
        if let Some(last) = self.cumulative.last_mut() {
            *last = 1.0;
        }
    }

    /// Index of the first move whose cumulative weight is at least `u`.
    pub fn select_index(&self, u: f64) -> Option<usize> {
        if self.moves.is_empty() {
            return None;
        }
        let index = self.cumulative.partition_point(|&c| c < u);
        Some(index.min(self.moves.len() - 1))
    }

    /// Draws a move index according to the weights.
    pub fn select_random_move<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        self.select_index(rng.r#gen::<f64>())
    }

    pub fn select_move(&mut self, index: usize) -> Option<&mut dyn Move> {
        match self.moves.get_mut(index) {
            Some((mv, _)) => Some(&mut **mv),
            None => None,
        }
    }

    pub fn get(&self, index: usize) -> Option<&dyn Move> {
        self.moves.get(index).map(|(mv, _)| &**mv)
    }

    /// Moves with their normalized selection probabilities.
    pub fn iter(&self) -> impl Iterator<Item = (&dyn Move, f64)> {
        self.moves.iter().zip(&self.cumulative).scan(0.0, |prev, ((mv, _), &c)| {
            let p = c - *prev;
            *prev = c;
            Some((&**mv, p))
        })
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn cumulative_weights(&self) -> &[f64] {
        &self.cumulative
    }

    pub fn reset_acceptances(&mut self) {
        for (mv, _) in &mut self.moves {
            mv.reset_acceptance();
        }
    }

    /// Acceptance counters keyed by move name, in registration order.
    pub fn acceptance_counters(&self) -> Vec<(&'static str, AcceptanceCounter)> {
        self.moves
            .iter()
            .map(|(mv, _)| (mv.name(), *mv.counter()))
            .collect()
    }
}
