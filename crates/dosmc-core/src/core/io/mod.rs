//! # I/O Module
//!
//! Structured construction input. A [`spec::SystemSpec`] describes blueprints, worlds,
//! potentials and moves in plain serializable form and is usually read from TOML; turning
//! it into live objects (with validation) is the job of `workflows::build`.

pub mod spec;
