//! # Engine Module
//!
//! Stateful sampling machinery built on top of the [`crate::core`] layer.
//!
//! ## Overview
//!
//! A sampling run is a single Markov chain. Each step selects a move from the
//! [`moves::manager::MoveManager`], lets it perturb one World, and decides whether to keep the
//! perturbation. The density-of-states ensemble ([`ensemble`]) drives these steps through
//! flatness-seeking stages while accumulating a log density of states in a
//! [`histogram::Histogram`].
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Ensemble parameters and their builder
//! - **Moves** ([`moves`]) - Move trait, proposals with undo records, weighted selection
//! - **Histogram** ([`histogram`]) - Binned log-weights, visit counts and flatness
//! - **Order Parameters** ([`order_parameter`]) - Scalar reaction coordinates
//! - **Ensemble** ([`ensemble`]) - The Wang-Landau state machine
//! - **Progress Monitoring** ([`progress`]) - Observer hook fed with snapshots
//! - **Error Handling** ([`error`]) - Engine-level error type

pub mod config;
pub mod ensemble;
pub mod error;
pub mod histogram;
pub mod moves;
pub mod order_parameter;
pub mod progress;
pub(crate) mod utils;
