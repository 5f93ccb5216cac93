//! # World Module
//!
//! The periodic spatial domain: box geometry with minimum-image and wrapping rules, the
//! linked-cell neighbor index, the [`world::World`] that owns particle and site storage,
//! and the [`manager::WorldManager`] that owns every world of a simulation.

pub mod cell_list;
pub mod error;
pub mod geometry;
pub mod manager;
pub mod world;
