//! # Workflows Module
//!
//! Top-level entry points that combine the [`crate::core`] and [`crate::engine`] layers
//! into complete procedures.
//!
//! - **Construction** ([`build`]) - Validated system construction from a [`SystemSpec`]
//! - **Density of States** ([`dos`]) - A full Wang-Landau run for one walker
//! - **Replicas** ([`replicas`]) - Independent walkers over order-parameter windows
//! - **Evaluation** ([`evaluate`]) - One-shot energy and pressure of given coordinates
//!
//! [`SystemSpec`]: crate::core::io::spec::SystemSpec

pub mod build;
pub mod dos;
pub mod evaluate;
pub mod replicas;
