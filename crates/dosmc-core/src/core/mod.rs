//! # Core Module
//!
//! Stateless building blocks of the simulation.
//!
//! - **Data model** ([`models`]) - Sites, particles, blueprints and species naming
//! - **Spatial domain** ([`world`]) - Periodic box geometry, linked-cell index, worlds
//! - **Interactions** ([`forcefield`]) - Pair potentials and the potential registry
//! - **Construction input** ([`io`]) - Serializable system descriptions loaded from TOML

pub mod forcefield;
pub mod io;
pub mod models;
pub mod world;
