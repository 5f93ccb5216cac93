//! # Forcefield Module
//!
//! Pair interactions and their aggregation over a world.
//!
//! - [`term`] - Energy, pressure and per-pair interaction values
//! - [`potentials`] - The potential contracts and the built-in catalog
//! - [`registry`] - The [`registry::ForceFieldManager`], which maps species pairs to potentials
//!   and evaluates site, particle and world energies, virials and tail corrections

pub mod error;
pub mod potentials;
pub mod registry;
pub mod term;
