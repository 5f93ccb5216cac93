use crate::core::forcefield::potentials::{
    BondedPotential, DebyeHuckel, Fene, HardSphere, Harmonic, LebwohlLasher, LennardJones,
    NonBondedPotential,
};
use crate::core::forcefield::registry::ForceFieldManager;
use crate::core::io::spec::{
    BlueprintSpec, BondedPotentialSpec, MoveSpec, NonBondedPotentialSpec, OrderParameterSpec,
    SystemSpec, WorldSpec,
};
use crate::core::models::blueprint::{ParticleBlueprint, SiteBlueprint};
use crate::core::models::ids::{ParticleId, SpeciesId, WorldId};
use crate::core::models::species::SpeciesRegistry;
use crate::core::world::geometry::SimulationBox;
use crate::core::world::manager::WorldManager;
use crate::core::world::world::World;
use crate::engine::moves::Move;
use crate::engine::moves::director::DirectorRotateMove;
use crate::engine::moves::manager::MoveManager;
use crate::engine::moves::species_swap::SpeciesSwapMove;
use crate::engine::moves::translate::TranslateMove;
use crate::engine::order_parameter::{OrderParameter, ParticleDistance, TotalEnergy};
use nalgebra::{Point3, Vector3};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Aggregated validation failure; every problem found is reported, one per line.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", .messages.join("\n"))]
pub struct BuildError {
    pub messages: Vec<String>,
}

/// A fully constructed, validated system.
#[derive(Debug)]
pub struct System {
    pub worlds: WorldManager,
    pub forcefield: ForceFieldManager,
    pub moves: MoveManager,
    pub species: SpeciesRegistry,
}

/// Builds worlds, potentials and moves from a [`SystemSpec`].
///
/// Nothing is returned unless the whole description is valid; all problems are collected first.
///
/// # Errors
///
/// Returns [`BuildError`] listing unknown species or blueprints, invalid geometry,
/// cutoffs exceeding half the box, potential cutoffs beyond a world's neighbor cutoff,
/// and invalid potential or move parameters.
#[instrument(skip_all, name = "build_system")]
pub fn build_system(spec: &SystemSpec) -> Result<System, BuildError> {
    let mut messages = Vec::new();
    let mut species = SpeciesRegistry::new();

    let blueprints = build_blueprints(&spec.blueprints, &mut species, &mut messages);

    let mut worlds = WorldManager::new();
    for (index, world_spec) in spec.worlds.iter().enumerate() {
        if let Some(world) = build_world(index, world_spec, &blueprints, &mut messages) {
            worlds.add_world(world);
        }
    }
    if spec.worlds.is_empty() {
        messages.push("at least one world is required".to_string());
    }

    let neighbor_cutoffs: Vec<f64> = spec.worlds.iter().map(|w| w.cutoff).collect();
    let forcefield = build_forcefield(spec, &species, &neighbor_cutoffs, &mut messages);
    let moves = build_moves(&spec.moves, &species, &mut messages);

    if !messages.is_empty() {
        return Err(BuildError { messages });
    }
    info!(
        worlds = worlds.len(),
        particles = worlds.particle_count(),
        species = species.len(),
        moves = moves.len(),
        "System constructed"
    );
    Ok(System {
        worlds,
        forcefield,
        moves,
        species,
    })
}

fn build_blueprints(
    specs: &[BlueprintSpec],
    species: &mut SpeciesRegistry,
    messages: &mut Vec<String>,
) -> HashMap<String, ParticleBlueprint> {
    let mut blueprints = HashMap::new();
    for spec in specs {
        let particle_species = species.register(spec.species.as_deref().unwrap_or(&spec.name));
        let sites = spec
            .sites
            .iter()
            .map(|s| {
                let mut site = SiteBlueprint::new(species.register(&s.species), s.mass, s.charge)
                    .with_offset(Vector3::from(s.offset));
                if let Some(d) = s.director {
                    let director = Vector3::from(d);
                    if director.norm_squared() > 0.0 {
                        site = site.with_director(director);
                    } else {
                        messages.push(format!(
                            "blueprint '{}' has a site with a zero-length director",
                            spec.name
                        ));
                    }
                }
                site
            })
            .collect();
        let mut blueprint = ParticleBlueprint::new(&spec.name, particle_species, sites);
        for &[i, j] in &spec.bonds {
            blueprint = blueprint.with_bond(i, j);
        }
        messages.extend(blueprint.validate());
        if blueprints.insert(spec.name.clone(), blueprint).is_some() {
            messages.push(format!("blueprint '{}' is defined more than once", spec.name));
        }
    }
    blueprints
}

fn build_world(
    index: usize,
    spec: &WorldSpec,
    blueprints: &HashMap<String, ParticleBlueprint>,
    messages: &mut Vec<String>,
) -> Option<World> {
    let label = format!("world {index}");
    let mut fail = |e: &dyn fmt::Display| {
        messages.push(format!("{label}: {e}"));
    };

    if spec.size.iter().any(|&l| !(l.is_finite() && l > 0.0)) {
        fail(&format!("box edges must be positive, got {:?}", spec.size));
        return None;
    }
    let geometry = match SimulationBox::rectangular(spec.size[0], spec.size[1], spec.size[2]) {
        Ok(g) => g.with_periodicity(spec.periodic),
        Err(e) => {
            fail(&e);
            return None;
        }
    };
    let mut world = match World::new(geometry, spec.cutoff, spec.temperature) {
        Ok(w) => w,
        Err(e) => {
            fail(&e);
            return None;
        }
    };
    if let Err(e) = world.set_cell_ratio(spec.cell_ratio) {
        fail(&e);
    }
    if !(spec.boltzmann.is_finite() && spec.boltzmann > 0.0) {
        fail(&format!("Boltzmann constant must be positive, got {}", spec.boltzmann));
    }
    world.set_boltzmann(spec.boltzmann);

    let mut lookup = |name: &str| {
        let found = blueprints.get(name);
        if found.is_none() {
            fail(&format!("unknown blueprint '{name}'"));
        }
        found
    };
    let components: Vec<(ParticleBlueprint, f64)> = spec
        .components
        .iter()
        .filter_map(|c| lookup(&c.blueprint).map(|bp| (bp.clone(), c.count as f64)))
        .collect();
    let placements: Vec<(&ParticleBlueprint, Point3<f64>)> = spec
        .particles
        .iter()
        .filter_map(|p| lookup(&p.blueprint).map(|bp| (bp, Point3::from(p.position))))
        .collect();

    let total: usize = spec.components.iter().map(|c| c.count).sum();
    if total > 0 && components.len() == spec.components.len() {
        let density = spec.density.unwrap_or(total as f64 / world.volume());
        if let Err(e) = world.pack(&components, total, density) {
            fail(&e);
        }
    } else if spec.density.is_some() && total == 0 {
        fail(&"density is set but no components are given");
    }
    if let Err(e) = world.add_particles(placements) {
        fail(&e);
    }

    debug!(
        world = index,
        particles = world.particle_count(),
        volume = world.volume(),
        "World constructed"
    );
    Some(world)
}

fn build_forcefield(
    spec: &SystemSpec,
    species: &SpeciesRegistry,
    neighbor_cutoffs: &[f64],
    messages: &mut Vec<String>,
) -> ForceFieldManager {
    let mut forcefield = ForceFieldManager::new();
    let resolve = |pair: &[String; 2], messages: &mut Vec<String>| {
        let a = species.id(&pair[0]);
        let b = species.id(&pair[1]);
        for (name, id) in [(&pair[0], a), (&pair[1], b)] {
            if id.is_none() {
                messages.push(format!("potential references unknown species '{name}'"));
            }
        }
        Some((a?, b?))
    };
    let default_cutoffs = || {
        if neighbor_cutoffs.is_empty() {
            vec![f64::INFINITY]
        } else {
            neighbor_cutoffs.to_vec()
        }
    };

    for entry in &spec.nonbonded {
        let Some((a, b)) = resolve(&entry.species, messages) else {
            continue;
        };
        let built: Result<Arc<dyn NonBondedPotential>, _> = match &entry.potential {
            NonBondedPotentialSpec::LennardJones {
                epsilon,
                sigma,
                cutoffs,
            } => {
                let cutoffs = if cutoffs.is_empty() {
                    default_cutoffs()
                } else {
                    cutoffs.clone()
                };
                LennardJones::new(*epsilon, *sigma, cutoffs).map(|p| Arc::new(p) as Arc<dyn NonBondedPotential>)
            }
            NonBondedPotentialSpec::HardSphere { sigma } => {
                HardSphere::new(*sigma).map(|p| Arc::new(p) as Arc<dyn NonBondedPotential>)
            }
            NonBondedPotentialSpec::DebyeHuckel { kappa, cutoffs } => {
                let cutoffs = if cutoffs.is_empty() {
                    default_cutoffs()
                } else {
                    cutoffs.clone()
                };
                DebyeHuckel::new(*kappa, cutoffs).map(|p| Arc::new(p) as Arc<dyn NonBondedPotential>)
            }
            NonBondedPotentialSpec::LebwohlLasher {
                epsilon,
                gamma,
                cutoffs,
            } => {
                let cutoffs = if cutoffs.is_empty() {
                    default_cutoffs()
                } else {
                    cutoffs.clone()
                };
                LebwohlLasher::new(*epsilon, *gamma, cutoffs)
                    .map(|p| Arc::new(p) as Arc<dyn NonBondedPotential>)
            }
        };
        match built {
            Ok(potential) => {
                check_potential_cutoffs(&entry.species, &*potential, neighbor_cutoffs, messages);
                forcefield.add_nonbonded(a, b, potential);
            }
            Err(e) => messages.push(format!("{}-{}: {e}", entry.species[0], entry.species[1])),
        }
    }

    for entry in &spec.bonded {
        let Some((a, b)) = resolve(&entry.species, messages) else {
            continue;
        };
        let built: Result<Arc<dyn BondedPotential>, _> = match &entry.potential {
            BondedPotentialSpec::Harmonic { k, r0 } => Harmonic::new(*k, *r0).map(|p| Arc::new(p) as Arc<dyn BondedPotential>),
            BondedPotentialSpec::Fene {
                k,
                rmax,
                epsilon,
                sigma,
            } => Fene::new(*k, *rmax, *epsilon, *sigma).map(|p| Arc::new(p) as Arc<dyn BondedPotential>),
        };
        match built {
            Ok(potential) => forcefield.add_bonded(a, b, potential),
            Err(e) => messages.push(format!("{}-{}: {e}", entry.species[0], entry.species[1])),
        }
    }
    forcefield
}

fn check_potential_cutoffs(
    pair: &[String; 2],
    potential: &dyn NonBondedPotential,
    neighbor_cutoffs: &[f64],
    messages: &mut Vec<String>,
) {
    for (index, &neighbor_cutoff) in neighbor_cutoffs.iter().enumerate() {
        if let Some(cutoff) = potential.cutoff(WorldId(index)) {
            if cutoff > neighbor_cutoff {
                messages.push(format!(
                    "{}-{} {} cutoff {cutoff} exceeds the neighbor cutoff {neighbor_cutoff} of world {index}",
                    pair[0],
                    pair[1],
                    potential.name()
                ));
            }
        }
    }
}

fn build_moves(specs: &[MoveSpec], species: &SpeciesRegistry, messages: &mut Vec<String>) -> MoveManager {
    let mut moves = MoveManager::new();
    for spec in specs {
        let (label, weight, built): (&str, f64, Result<Box<dyn Move>, String>) = match spec {
            MoveSpec::Translate { dx, weight } => (
                "translate",
                *weight,
                TranslateMove::new(*dx)
                    .map(|mv| Box::new(mv) as Box<dyn Move>)
                    .map_err(|e| e.to_string()),
            ),
            MoveSpec::DirectorRotate { weight } => (
                "director-rotate",
                *weight,
                Ok(Box::new(DirectorRotateMove::new()) as Box<dyn Move>),
            ),
            MoveSpec::SpeciesSwap { species: names, weight } => {
                let unknown: Vec<&str> = names
                    .iter()
                    .filter(|name| species.id(name).is_none())
                    .map(String::as_str)
                    .collect();
                let built = if unknown.is_empty() {
                    SpeciesSwapMove::new(names.iter().filter_map(|name| species.id(name)).collect())
                        .map(|mv| Box::new(mv) as Box<dyn Move>)
                        .map_err(|e| e.to_string())
                } else {
                    Err(format!("unknown species {}", unknown.join(", ")))
                };
                ("species-swap", *weight, built)
            }
        };
        match built {
            Ok(mv) => {
                if let Err(e) = moves.add_move(mv, weight) {
                    messages.push(format!("{label} move: {e}"));
                }
            }
            Err(e) => messages.push(format!("{label} move: {e}")),
        }
    }
    moves
}

/// Instantiates an order parameter against a built system.
///
/// Particle indices refer to the order in which particles were added to the world.
pub fn build_order_parameter(
    spec: &OrderParameterSpec,
    worlds: &WorldManager,
) -> Result<Box<dyn OrderParameter>, BuildError> {
    match spec {
        OrderParameterSpec::TotalEnergy => Ok(Box::new(TotalEnergy)),
        OrderParameterSpec::ParticleDistance {
            world,
            first,
            second,
        } => {
            let mut messages = Vec::new();
            let Some(target) = worlds.get(WorldId(*world)) else {
                return Err(BuildError {
                    messages: vec![format!("order parameter references unknown world {world}")],
                });
            };
            let ids = target.particle_ids();
            let mut resolve = |group: &[usize], label: &str| -> Vec<ParticleId> {
                if group.is_empty() {
                    messages.push(format!("order parameter group '{label}' is empty"));
                }
                group
                    .iter()
                    .filter_map(|&i| {
                        let id = ids.get(i).copied();
                        if id.is_none() {
                            messages.push(format!(
                                "order parameter group '{label}' references particle {i}, but world {world} has {}",
                                ids.len()
                            ));
                        }
                        id
                    })
                    .collect()
            };
            let first = resolve(first, "first");
            let second = resolve(second, "second");
            if !messages.is_empty() {
                return Err(BuildError { messages });
            }
            Ok(Box::new(ParticleDistance::new(WorldId(*world), first, second)))
        }
    }
}

/// Species ids in registration order, for reporting.
pub fn species_names(species: &SpeciesRegistry) -> Vec<(SpeciesId, String)> {
    species.iter().map(|(id, name)| (id, name.to_string())).collect()
}
