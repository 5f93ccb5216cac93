use super::config::{Binning, BoundaryPolicy, ConfigError, DosConfig};
use super::error::EngineError;
use super::histogram::Histogram;
use super::moves::MoveOutcome;
use super::moves::manager::MoveManager;
use super::order_parameter::OrderParameter;
use super::progress::{
    HistogramSnapshot, MoveAcceptance, Progress, ProgressReporter, Snapshot, WorldSnapshot,
};
use super::utils::sampling;
use crate::core::forcefield::registry::ForceFieldManager;
use crate::core::forcefield::term::ENERGY_SENTINEL;
use crate::core::world::manager::WorldManager;
use crate::core::world::world::World;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, info, instrument, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnsembleState {
    Sampling,
    Flattened,
    Converged,
}

/// Outcome of a completed density-of-states run.
#[derive(Debug, Clone)]
pub struct DosResult {
    /// Histogram as it stood when the last stage reached flatness, counts included.
    pub histogram: Histogram,
    pub stages_completed: usize,
    pub iterations: u64,
    pub scale_factor: f64,
    pub converged: bool,
    pub snapshot: Snapshot,
}

/// Wang-Landau walker over a scalar order parameter.
///
/// Every step attempts one move, accepts it with the density-of-states ratio (times the
/// Boltzmann factor for order parameters that request it), and records the resulting
/// order parameter whether or not the move was accepted.
#[derive(Debug)]
pub struct DosEnsemble {
    worlds: WorldManager,
    forcefield: ForceFieldManager,
    moves: MoveManager,
    order_parameter: Box<dyn OrderParameter>,
    histogram: Histogram,
    config: DosConfig,
    rng: StdRng,
    state: EnsembleState,
    iteration: u64,
    stage: usize,
    scale_factor: f64,
    flatness: f64,
}

impl DosEnsemble {
    /// Assembles a walker and initializes every world's running energy from scratch.
    ///
    /// # Errors
    ///
    /// Returns an error if no move is registered, the histogram cannot be built from the
    /// configuration (including a restart log density of the wrong length), or a world
    /// starts in a forbidden configuration whose energy is at the sentinel scale.
    pub fn new(
        mut worlds: WorldManager,
        forcefield: ForceFieldManager,
        moves: MoveManager,
        order_parameter: Box<dyn OrderParameter>,
        config: DosConfig,
    ) -> Result<Self, EngineError> {
        if moves.is_empty() {
            return Err(ConfigError::Invalid {
                parameter: "moves",
                reason: "at least one move must be registered".to_string(),
            }
            .into());
        }
        let (min, max) = config.interval;
        let mut histogram = match config.binning {
            Binning::Count(n) => Histogram::with_bin_count(min, max, n)?,
            Binning::Width(w) => Histogram::with_bin_width(min, max, w)?,
        };
        if let Some(values) = &config.initial_log_dos {
            histogram.set_log_dos(values.clone())?;
        }

        refresh_energies(&mut worlds, &forcefield);
        for world in worlds.iter() {
            let energy = world.energy().total();
            if !(energy.abs() < 0.5 * ENERGY_SENTINEL) {
                return Err(ConfigError::Invalid {
                    parameter: "initial configuration",
                    reason: format!(
                        "{} starts with energy {energy:e}; remove overlaps or broken bonds first",
                        world.id()
                    ),
                }
                .into());
            }
            debug!(world = %world.id(), energy, "Initialized running energy");
        }

        Ok(Self {
            worlds,
            forcefield,
            moves,
            order_parameter,
            histogram,
            rng: StdRng::seed_from_u64(config.seed),
            state: EnsembleState::Sampling,
            iteration: 0,
            stage: 0,
            scale_factor: config.initial_scale_factor,
            flatness: 0.0,
            config,
        })
    }

    pub fn worlds(&self) -> &WorldManager {
        &self.worlds
    }

    pub fn forcefield(&self) -> &ForceFieldManager {
        &self.forcefield
    }

    pub fn moves(&self) -> &MoveManager {
        &self.moves
    }

    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    pub fn config(&self) -> &DosConfig {
        &self.config
    }

    pub fn state(&self) -> EnsembleState {
        self.state
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn stage(&self) -> usize {
        self.stage
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn flatness(&self) -> f64 {
        self.flatness
    }

    pub fn into_worlds(self) -> WorldManager {
        self.worlds
    }

    /// Probability of accepting a transition of the order parameter from `old` to `new`.
    ///
    /// `ln_physical` is the log of any factor the move itself imposes (proposal bias and,
    /// for Boltzmann-weighted order parameters, `-beta * delta_E`).
    pub fn acceptance_probability(
        histogram: &Histogram,
        policy: BoundaryPolicy,
        old: f64,
        new: f64,
        ln_physical: f64,
    ) -> f64 {
        if !histogram.contains(new) {
            return match policy {
                BoundaryPolicy::RejectOutside => 0.0,
                BoundaryPolicy::DragInward => {
                    if old < histogram.min() {
                        if new > old { 1.0 } else { 0.0 }
                    } else if old > histogram.max() {
                        if new < old { 1.0 } else { 0.0 }
                    } else {
                        0.0
                    }
                }
            };
        }
        sampling::acceptance_probability(histogram.value_at(old) - histogram.value_at(new) + ln_physical)
    }

    /// Attempts a single move and records the resulting order parameter.
    pub fn step(&mut self) -> Result<MoveOutcome, EngineError> {
        let index = self
            .moves
            .select_random_move(&mut self.rng)
            .ok_or_else(|| EngineError::Internal("move list became empty".to_string()))?;
        let old = self.order_parameter.evaluate(&self.worlds)?;

        let mv = self
            .moves
            .select_move(index)
            .ok_or_else(|| EngineError::Internal(format!("move {index} disappeared")))?;
        let Some(proposal) = mv.propose(&mut self.worlds, &self.forcefield, &mut self.rng)? else {
            self.histogram.record(old, self.scale_factor);
            return Ok(MoveOutcome::Skipped);
        };

        let new = self.order_parameter.evaluate(&self.worlds)?;
        let mut ln_physical = proposal.bias.ln();
        if self.order_parameter.boltzmann_weighted() {
            let beta = self.worlds.get(proposal.world).map(World::beta).ok_or_else(|| {
                EngineError::Internal(format!("{} vanished while a move was pending", proposal.world))
            })?;
            ln_physical -= beta * proposal.delta.total();
        }
        let p = Self::acceptance_probability(
            &self.histogram,
            self.config.boundary_policy,
            old,
            new,
            ln_physical,
        );
        let accepted = sampling::accept(p, &mut self.rng);
        trace!(move_name = mv.name(), old, new, p, accepted, "Ensemble step");
        mv.counter_mut().record(accepted);

        let current = if accepted {
            let _ = proposal.commit();
            new
        } else {
            proposal.revert(&mut self.worlds)?;
            old
        };
        self.histogram.record(current, self.scale_factor);
        Ok(if accepted {
            MoveOutcome::Accepted
        } else {
            MoveOutcome::Rejected
        })
    }

    /// One attempted move per particle (at least one), followed by a flatness update.
    pub fn iterate(&mut self) -> Result<(), EngineError> {
        let steps = self.worlds.particle_count().max(1);
        for _ in 0..steps {
            self.step()?;
        }
        self.iteration += 1;
        self.flatness = self.histogram.flatness();
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            walker: self.config.walker,
            iteration: self.iteration,
            stage: self.stage,
            state: self.state,
            worlds: self
                .worlds
                .iter()
                .map(|w| WorldSnapshot {
                    id: w.id(),
                    energy: w.energy(),
                    temperature: w.temperature(),
                    particle_count: w.particle_count(),
                })
                .collect(),
            scale_factor: self.scale_factor,
            flatness: self.flatness,
            acceptance: self
                .moves
                .acceptance_counters()
                .into_iter()
                .map(|(name, counter)| MoveAcceptance {
                    name: name.to_string(),
                    attempted: counter.attempted(),
                    ratio: counter.ratio(),
                })
                .collect(),
            histogram: HistogramSnapshot {
                min: self.histogram.min(),
                max: self.histogram.max(),
                log_dos: self.histogram.log_dos().to_vec(),
                counts: self.histogram.counts().to_vec(),
            },
        }
    }

    /// Runs the configured stages.
    ///
    /// Each stage iterates until the histogram reaches the target flatness, then clears the
    /// visit counts and reduces the scale factor. The run ends when the stages are exhausted
    /// or the scale factor falls below the tolerance.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Convergence`] if a stage exceeds the configured iteration cap.
    #[instrument(skip_all, name = "dos_run", fields(walker = self.config.walker, stages = self.config.stages))]
    pub fn run(&mut self, reporter: &ProgressReporter) -> Result<DosResult, EngineError> {
        info!(
            order_parameter = self.order_parameter.name(),
            bins = self.histogram.bin_count(),
            "Starting density-of-states sampling"
        );
        reporter.report(Progress::RunStart(self.snapshot()));

        let mut flattened: Option<Histogram> = None;
        let mut completed = 0;
        for stage in 0..self.config.stages {
            if self.scale_factor < self.config.scale_factor_tolerance {
                info!(
                    scale_factor = self.scale_factor,
                    tolerance = self.config.scale_factor_tolerance,
                    "Scale factor below tolerance, stopping early"
                );
                break;
            }
            self.stage = stage;
            self.state = EnsembleState::Sampling;

            let mut sweeps = 0;
            loop {
                self.iterate()?;
                sweeps += 1;
                debug!(
                    stage,
                    iteration = self.iteration,
                    flatness = self.flatness,
                    "Iteration finished"
                );
                if reporter.is_active() {
                    reporter.report(Progress::Iteration(self.snapshot()));
                }
                if self.flatness >= self.config.target_flatness {
                    break;
                }
                if let Some(cap) = self.config.max_sweeps_per_stage {
                    if sweeps >= cap {
                        warn!(stage, sweeps, flatness = self.flatness, "Stage sweep limit reached");
                        return Err(EngineError::Convergence {
                            stage,
                            iterations: sweeps,
                        });
                    }
                }
            }

            self.state = EnsembleState::Flattened;
            info!(
                stage,
                sweeps,
                flatness = self.flatness,
                scale_factor = self.scale_factor,
                "Stage reached target flatness"
            );
            reporter.report(Progress::StageComplete(self.snapshot()));

            refresh_energies(&mut self.worlds, &self.forcefield);
            flattened = Some(self.histogram.clone());
            completed += 1;
            self.histogram.reset_counts();
            self.scale_factor *= self.config.reduction_order;
        }

        self.state = EnsembleState::Converged;
        let snapshot = self.snapshot();
        reporter.report(Progress::RunFinish(snapshot.clone()));
        info!(
            stages = completed,
            iterations = self.iteration,
            scale_factor = self.scale_factor,
            "Density-of-states sampling finished"
        );

        Ok(DosResult {
            histogram: flattened.unwrap_or_else(|| self.histogram.clone()),
            stages_completed: completed,
            iterations: self.iteration,
            scale_factor: self.scale_factor,
            converged: completed == self.config.stages
                || self.scale_factor < self.config.scale_factor_tolerance,
            snapshot,
        })
    }
}

/// Replaces each world's running energy with a full recomputation, discarding any
/// rounding accumulated from incremental updates.
fn refresh_energies(worlds: &mut WorldManager, forcefield: &ForceFieldManager) {
    for world in worlds.iter_mut() {
        let energy = forcefield.evaluate_energy(world);
        trace!(world = %world.id(), drift = world.energy().total() - energy.total(), "Refreshing running energy");
        world.set_energy(energy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::potentials::{HardSphere, LennardJones};
    use crate::core::forcefield::term::Energy;
    use crate::core::models::blueprint::ParticleBlueprint;
    use crate::core::models::ids::{SpeciesId, WorldId};
    use crate::core::world::geometry::SimulationBox;
    use crate::engine::config::DosConfigBuilder;
    use crate::engine::moves::translate::TranslateMove;
    use crate::engine::order_parameter::TotalEnergy;
    use nalgebra::Point3;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// x coordinate of the first particle of world 0.
    #[derive(Debug)]
    struct FirstParticleX;

    impl OrderParameter for FirstParticleX {
        fn evaluate(&self, worlds: &WorldManager) -> Result<f64, EngineError> {
            let world = worlds
                .get(WorldId(0))
                .ok_or_else(|| EngineError::Internal("no world".to_string()))?;
            let id = world
                .particle_ids()
                .first()
                .copied()
                .ok_or_else(|| EngineError::Internal("no particle".to_string()))?;
            Ok(world.particle(id).map(|p| p.position().x).unwrap_or_default())
        }

        fn name(&self) -> &'static str {
            "first-particle-x"
        }
    }

    fn free_particle() -> (WorldManager, ForceFieldManager, MoveManager) {
        let mut world = World::new(SimulationBox::cubic(10.0).unwrap(), 2.5, 1.0).unwrap();
        world
            .add_particle(
                &ParticleBlueprint::monatomic("probe", SpeciesId(0), 1.0, 0.0),
                Point3::new(5.0, 5.0, 5.0),
            )
            .unwrap();
        let mut worlds = WorldManager::new();
        worlds.add_world(world);
        let mut moves = MoveManager::new();
        moves.add_move(Box::new(TranslateMove::new(2.0).unwrap()), 1.0).unwrap();
        (worlds, ForceFieldManager::new(), moves)
    }

    fn lj_liquid() -> (WorldManager, ForceFieldManager, MoveManager) {
        let species = SpeciesId(0);
        let mut world = World::new(SimulationBox::cubic(10.0).unwrap(), 3.0, 1.5).unwrap();
        world
            .pack(&[(ParticleBlueprint::monatomic("lj", species, 1.0, 0.0), 1.0)], 32, 0.1)
            .unwrap();
        let mut forcefield = ForceFieldManager::new();
        forcefield.add_nonbonded(
            species,
            species,
            Arc::new(LennardJones::new(1.0, 1.0, vec![3.0]).unwrap()),
        );
        let mut worlds = WorldManager::new();
        worlds.add_world(world);
        let mut moves = MoveManager::new();
        moves.add_move(Box::new(TranslateMove::new(0.3).unwrap()), 1.0).unwrap();
        (worlds, forcefield, moves)
    }

    #[test]
    fn drag_inward_accepts_only_moves_toward_the_domain() {
        let histogram = Histogram::with_bin_count(0.0, 10.0, 10).unwrap();
        let policy = BoundaryPolicy::DragInward;
        let p = |old, new| DosEnsemble::acceptance_probability(&histogram, policy, old, new, 0.0);
        assert_eq!(p(-5.0, -2.0), 1.0);
        assert_eq!(p(-5.0, -7.0), 0.0);
        assert_eq!(p(15.0, 12.0), 1.0);
        assert_eq!(p(15.0, 16.0), 0.0);
        assert_eq!(p(5.0, 11.0), 0.0);
        assert_eq!(p(5.0, f64::NAN), 0.0);
    }

    #[test]
    fn reject_outside_never_leaves_the_domain() {
        let histogram = Histogram::with_bin_count(0.0, 10.0, 10).unwrap();
        let policy = BoundaryPolicy::RejectOutside;
        assert_eq!(
            DosEnsemble::acceptance_probability(&histogram, policy, -5.0, -2.0, 0.0),
            0.0
        );
    }

    #[test]
    fn in_domain_acceptance_uses_log_dos_ratio() {
        let mut histogram = Histogram::with_bin_count(0.0, 2.0, 2).unwrap();
        histogram.set_log_dos(vec![1.0, 3.0]).unwrap();
        let policy = BoundaryPolicy::DragInward;
        let uphill = DosEnsemble::acceptance_probability(&histogram, policy, 0.5, 1.5, 0.0);
        assert!((uphill - (-2.0f64).exp()).abs() < 1e-12);
        let downhill = DosEnsemble::acceptance_probability(&histogram, policy, 1.5, 0.5, 0.0);
        assert_eq!(downhill, 1.0);
        let weighted = DosEnsemble::acceptance_probability(&histogram, policy, 1.5, 0.5, -3.0);
        assert!((weighted - (-1.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn construction_requires_a_move() {
        let (worlds, forcefield, _) = free_particle();
        let config = DosConfigBuilder::new()
            .interval(0.0, 10.0)
            .bin_count(10)
            .stages(1)
            .build()
            .unwrap();
        let result = DosEnsemble::new(
            worlds,
            forcefield,
            MoveManager::new(),
            Box::new(FirstParticleX),
            config,
        );
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn overlapping_start_is_rejected() {
        let mut world = World::new(SimulationBox::cubic(10.0).unwrap(), 2.5, 1.0).unwrap();
        let atom = ParticleBlueprint::monatomic("atom", SpeciesId(0), 1.0, 0.0);
        world.add_particle(&atom, Point3::new(5.0, 5.0, 5.0)).unwrap();
        world.add_particle(&atom, Point3::new(5.2, 5.0, 5.0)).unwrap();
        let mut worlds = WorldManager::new();
        worlds.add_world(world);
        let mut forcefield = ForceFieldManager::new();
        forcefield.add_nonbonded(SpeciesId(0), SpeciesId(0), Arc::new(HardSphere::new(1.0).unwrap()));
        let mut moves = MoveManager::new();
        moves.add_move(Box::new(TranslateMove::new(0.5).unwrap()), 1.0).unwrap();
        let config = DosConfigBuilder::new()
            .interval(0.0, 10.0)
            .bin_count(10)
            .stages(1)
            .build()
            .unwrap();

        let result = DosEnsemble::new(worlds, forcefield, moves, Box::new(FirstParticleX), config);
        assert!(matches!(
            result,
            Err(EngineError::Config(ConfigError::Invalid { parameter: "initial configuration", .. }))
        ));
    }

    #[test]
    fn running_energy_is_recomputed_at_the_end_of_each_stage() {
        let (worlds, forcefield, moves) = free_particle();
        let config = DosConfigBuilder::new()
            .interval(0.0, 10.0)
            .bin_count(5)
            .stages(1)
            .max_sweeps_per_stage(500_000)
            .seed(5)
            .build()
            .unwrap();
        let mut ensemble =
            DosEnsemble::new(worlds, forcefield, moves, Box::new(FirstParticleX), config).unwrap();
        ensemble
            .worlds
            .get_mut(WorldId(0))
            .unwrap()
            .set_energy(Energy::new(3.0, 0.0, 0.0));

        ensemble.run(&ProgressReporter::new()).unwrap();
        assert_eq!(ensemble.worlds().get(WorldId(0)).unwrap().energy(), Energy::default());
    }

    #[test]
    fn restart_weights_must_match_bin_count() {
        let (worlds, forcefield, moves) = free_particle();
        let config = DosConfigBuilder::new()
            .interval(0.0, 10.0)
            .bin_count(10)
            .stages(1)
            .initial_log_dos(vec![0.0; 3])
            .build()
            .unwrap();
        let result = DosEnsemble::new(worlds, forcefield, moves, Box::new(FirstParticleX), config);
        assert!(matches!(result, Err(EngineError::Histogram(_))));
    }

    #[test]
    fn uniform_walk_reaches_target_flatness_in_every_stage() {
        let (worlds, forcefield, moves) = free_particle();
        let config = DosConfigBuilder::new()
            .interval(0.0, 10.0)
            .bin_count(10)
            .stages(3)
            .target_flatness(0.8)
            .max_sweeps_per_stage(500_000)
            .seed(17)
            .build()
            .unwrap();
        let mut ensemble =
            DosEnsemble::new(worlds, forcefield, moves, Box::new(FirstParticleX), config).unwrap();

        let stage_events = AtomicUsize::new(0);
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::StageComplete(snapshot) = event {
                assert_eq!(snapshot.state, EnsembleState::Flattened);
                stage_events.fetch_add(1, Ordering::Relaxed);
            }
        }));
        let result = ensemble.run(&reporter).unwrap();
        drop(reporter);

        assert_eq!(stage_events.load(Ordering::Relaxed), 3);
        assert_eq!(result.stages_completed, 3);
        assert!(result.converged);
        assert!(result.histogram.flatness() >= 0.8);
        assert!((result.scale_factor - 0.125).abs() < 1e-15);
        assert_eq!(ensemble.state(), EnsembleState::Converged);
        assert_eq!(ensemble.histogram().total_count(), 0);
        assert_eq!(result.snapshot.acceptance[0].name, "translate");
    }

    #[test]
    fn stage_sweep_cap_reports_convergence_failure() {
        let (worlds, forcefield, moves) = free_particle();
        let config = DosConfigBuilder::new()
            .interval(0.0, 10.0)
            .bin_count(10)
            .stages(1)
            .target_flatness(1.0)
            .max_sweeps_per_stage(1)
            .build()
            .unwrap();
        let mut ensemble =
            DosEnsemble::new(worlds, forcefield, moves, Box::new(FirstParticleX), config).unwrap();
        let result = ensemble.run(&ProgressReporter::new());
        assert!(matches!(
            result,
            Err(EngineError::Convergence { stage: 0, iterations: 1 })
        ));
    }

    #[test]
    fn scale_factor_tolerance_stops_the_run_early() {
        let (worlds, forcefield, moves) = free_particle();
        let config = DosConfigBuilder::new()
            .interval(0.0, 10.0)
            .bin_count(5)
            .stages(10)
            .scale_factor_tolerance(0.3)
            .max_sweeps_per_stage(500_000)
            .build()
            .unwrap();
        let mut ensemble =
            DosEnsemble::new(worlds, forcefield, moves, Box::new(FirstParticleX), config).unwrap();
        let result = ensemble.run(&ProgressReporter::new()).unwrap();
        assert_eq!(result.stages_completed, 2);
        assert!(result.converged);
    }

    #[test]
    fn running_energy_tracks_full_recomputation() {
        let (worlds, forcefield, moves) = lj_liquid();
        let config = DosConfigBuilder::new()
            .interval(-200.0, 50.0)
            .bin_width(1.0)
            .stages(1)
            .seed(99)
            .build()
            .unwrap();
        let mut ensemble =
            DosEnsemble::new(worlds, forcefield, moves, Box::new(TotalEnergy), config).unwrap();
        let world = ensemble.worlds().get(WorldId(0)).unwrap();
        let initial = ensemble.forcefield().evaluate_energy(world).total();
        assert!((world.energy().total() - initial).abs() < 1e-10);

        for _ in 0..100 {
            ensemble.iterate().unwrap();
        }

        let world = ensemble.worlds().get(WorldId(0)).unwrap();
        let tracked = world.energy().total();
        let scratch = ensemble.forcefield().evaluate_energy(world).total();
        assert!(
            (tracked - scratch).abs() / scratch.abs().max(1.0) < 1e-8,
            "tracked {tracked} vs recomputed {scratch}"
        );
        assert_eq!(ensemble.iteration(), 100);
        assert_eq!(ensemble.histogram().total_count(), 3_200);
    }
}
