use serde::{Deserialize, Serialize};

fn one() -> f64 {
    1.0
}

fn all_periodic() -> [bool; 3] {
    [true; 3]
}

/// Complete description of a system to be simulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SystemSpec {
    /// Default seed for stochastic components that are not given their own.
    #[serde(default)]
    pub seed: u64,
    pub blueprints: Vec<BlueprintSpec>,
    pub worlds: Vec<WorldSpec>,
    #[serde(default)]
    pub nonbonded: Vec<NonBondedSpec>,
    #[serde(default)]
    pub bonded: Vec<BondedSpec>,
    #[serde(default)]
    pub moves: Vec<MoveSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BlueprintSpec {
    pub name: String,
    /// Particle-level species; defaults to the blueprint name.
    #[serde(default)]
    pub species: Option<String>,
    pub sites: Vec<SiteSpec>,
    #[serde(default)]
    pub bonds: Vec<[usize; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SiteSpec {
    pub species: String,
    #[serde(default = "one")]
    pub mass: f64,
    #[serde(default)]
    pub charge: f64,
    #[serde(default)]
    pub offset: [f64; 3],
    #[serde(default)]
    pub director: Option<[f64; 3]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct WorldSpec {
    /// Edge lengths of the (rectangular) box.
    pub size: [f64; 3],
    #[serde(default = "all_periodic")]
    pub periodic: [bool; 3],
    pub cutoff: f64,
    #[serde(default = "one")]
    pub cell_ratio: f64,
    pub temperature: f64,
    #[serde(default = "one")]
    pub boltzmann: f64,
    /// Particles placed on a lattice by [`crate::core::world::world::World::pack`].
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
    /// Number density used for lattice packing; when absent the box keeps its size.
    #[serde(default)]
    pub density: Option<f64>,
    /// Particles placed at explicit positions.
    #[serde(default)]
    pub particles: Vec<PlacementSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ComponentSpec {
    pub blueprint: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PlacementSpec {
    pub blueprint: String,
    pub position: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct NonBondedSpec {
    pub species: [String; 2],
    pub potential: NonBondedPotentialSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum NonBondedPotentialSpec {
    LennardJones {
        epsilon: f64,
        sigma: f64,
        /// Per-world cutoffs; empty means "use each world's neighbor cutoff".
        #[serde(default)]
        cutoffs: Vec<f64>,
    },
    HardSphere {
        sigma: f64,
    },
    DebyeHuckel {
        kappa: f64,
        #[serde(default)]
        cutoffs: Vec<f64>,
    },
    LebwohlLasher {
        epsilon: f64,
        #[serde(default)]
        gamma: f64,
        #[serde(default)]
        cutoffs: Vec<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BondedSpec {
    pub species: [String; 2],
    pub potential: BondedPotentialSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum BondedPotentialSpec {
    Harmonic {
        k: f64,
        r0: f64,
    },
    Fene {
        k: f64,
        rmax: f64,
        #[serde(default = "one")]
        epsilon: f64,
        #[serde(default = "one")]
        sigma: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum MoveSpec {
    Translate {
        dx: f64,
        #[serde(default = "one")]
        weight: f64,
    },
    DirectorRotate {
        #[serde(default = "one")]
        weight: f64,
    },
    /// Site species names a site may be switched between.
    SpeciesSwap {
        species: Vec<String>,
        #[serde(default = "one")]
        weight: f64,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum OrderParameterSpec {
    #[default]
    TotalEnergy,
    ParticleDistance {
        #[serde(default)]
        world: usize,
        /// Indices into the world's particle list, in insertion order.
        first: Vec<usize>,
        second: Vec<usize>,
    },
}

impl SystemSpec {
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
