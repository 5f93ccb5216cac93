//! # dosmc Core Library
//!
//! The sampling core of a particle-based Monte Carlo engine: periodic worlds indexed by a
//! linked-cell list, a pair-potential registry with analytic tail corrections, a weighted
//! Metropolis move framework, and an adaptive Wang-Landau density-of-states sampler.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture.
//!
//! - **[`core`]: The Foundation.** Passive data models (`Site`, `Particle`, `World`), box
//!   geometry and the cell list, the potential catalog and the `ForceFieldManager`, and
//!   structured construction input.
//!
//! - **[`engine`]: The Logic Core.** The stateful Markov chain: moves with explicit undo
//!   records, weighted move selection, order parameters, the histogram and the
//!   `DosEnsemble` state machine, plus progress reporting and configuration.
//!
//! - **[`workflows`]: The Public API.** Complete procedures built on the two layers below:
//!   validated construction of a system, a full density-of-states run, independent replica
//!   walkers, and one-shot energy evaluation of externally supplied coordinates.

pub mod core;
pub mod engine;
pub mod workflows;
