use super::error::ForceFieldError;
use super::term::{ENERGY_SENTINEL, Interaction};
use crate::core::models::ids::WorldId;
use crate::core::models::site::Site;
use nalgebra::Vector3;
use std::f64::consts::PI;
use std::fmt;

const MIN_DISTANCE_SQ: f64 = 1e-12;

/// A non-bonded pair potential.
///
/// `rij` is the minimum-imaged separation `a - b` and `r2` its squared norm. The returned
/// force acts on `a`. The world id selects per-world settings such as the cutoff, since
/// independent replicas may run with different cutoffs.
pub trait NonBondedPotential: Send + Sync + fmt::Debug {
    fn evaluate(&self, a: &Site, b: &Site, rij: &Vector3<f64>, r2: f64, world: WorldId)
    -> Interaction;

    /// Long-range energy correction integral for this pair type beyond the cutoff.
    fn energy_tail(&self, _world: WorldId) -> f64 {
        0.0
    }

    /// Long-range pressure correction integral for this pair type beyond the cutoff.
    fn pressure_tail(&self, _world: WorldId) -> f64 {
        0.0
    }

    /// Interaction range used in `world`, if the potential is truncated.
    fn cutoff(&self, _world: WorldId) -> Option<f64> {
        None
    }

    fn name(&self) -> &'static str;
}

/// A bonded (intramolecular) pair potential.
pub trait BondedPotential: Send + Sync + fmt::Debug {
    fn evaluate(&self, a: &Site, b: &Site, rij: &Vector3<f64>, r2: f64) -> Interaction;

    fn name(&self) -> &'static str;
}

/// Per-world cutoff values; worlds beyond the end of the list reuse the last entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PerWorldCutoff(Vec<f64>);

impl PerWorldCutoff {
    fn new(potential: &'static str, cutoffs: Vec<f64>) -> Result<Self, ForceFieldError> {
        if cutoffs.is_empty() {
            return Err(ForceFieldError::InvalidParameter {
                potential,
                parameter: "cutoff",
                value: f64::NAN,
            });
        }
        if let Some(&bad) = cutoffs.iter().find(|&&rc| !(rc.is_finite() && rc > 0.0)) {
            return Err(ForceFieldError::InvalidParameter {
                potential,
                parameter: "cutoff",
                value: bad,
            });
        }
        Ok(Self(cutoffs))
    }

    #[inline]
    pub fn get(&self, world: WorldId) -> f64 {
        self.0
            .get(world.index())
            .or_else(|| self.0.last())
            .copied()
            .unwrap_or(f64::INFINITY)
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }
}

fn positive(potential: &'static str, parameter: &'static str, value: f64) -> Result<f64, ForceFieldError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ForceFieldError::InvalidParameter {
            potential,
            parameter,
            value,
        })
    }
}

/// 12-6 Lennard-Jones energy and the scalar `F/r` for squared distance `r2`.
#[inline]
pub fn lennard_jones_12_6(r2: f64, epsilon: f64, sigma: f64) -> (f64, f64) {
    let sr2 = sigma * sigma / r2;
    let sr6 = sr2 * sr2 * sr2;
    let sr12 = sr6 * sr6;
    let energy = 4.0 * epsilon * (sr12 - sr6);
    let force_over_r = 48.0 * epsilon / r2 * (sr12 - 0.5 * sr6);
    (energy, force_over_r)
}

/// Truncated (unshifted) 12-6 Lennard-Jones with analytic tail corrections.
#[derive(Debug, Clone, PartialEq)]
pub struct LennardJones {
    epsilon: f64,
    sigma: f64,
    cutoffs: PerWorldCutoff,
}

impl LennardJones {
    pub fn new(epsilon: f64, sigma: f64, cutoffs: Vec<f64>) -> Result<Self, ForceFieldError> {
        Ok(Self {
            epsilon: positive("Lennard-Jones", "epsilon", epsilon)?,
            sigma: positive("Lennard-Jones", "sigma", sigma)?,
            cutoffs: PerWorldCutoff::new("Lennard-Jones", cutoffs)?,
        })
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }
}

impl NonBondedPotential for LennardJones {
    #[inline]
    fn evaluate(&self, _a: &Site, _b: &Site, rij: &Vector3<f64>, r2: f64, world: WorldId) -> Interaction {
        let rc = self.cutoffs.get(world);
        if r2 > rc * rc {
            return Interaction::zero();
        }
        if r2 < MIN_DISTANCE_SQ {
            return Interaction::energy_only(ENERGY_SENTINEL);
        }
        let (energy, force_over_r) = lennard_jones_12_6(r2, self.epsilon, self.sigma);
        Interaction::new(energy, rij * force_over_r)
    }

    fn energy_tail(&self, world: WorldId) -> f64 {
        let rc = self.cutoffs.get(world);
        let s3 = self.sigma.powi(3);
        let sr3 = s3 / rc.powi(3);
        let sr9 = sr3 * sr3 * sr3;
        4.0 / 3.0 * self.epsilon * s3 * (sr9 / 3.0 - sr3)
    }

    fn pressure_tail(&self, world: WorldId) -> f64 {
        let rc = self.cutoffs.get(world);
        let s3 = self.sigma.powi(3);
        let sr3 = s3 / rc.powi(3);
        let sr9 = sr3 * sr3 * sr3;
        8.0 * self.epsilon * s3 * (2.0 / 3.0 * sr9 - sr3)
    }

    fn cutoff(&self, world: WorldId) -> Option<f64> {
        Some(self.cutoffs.get(world))
    }

    fn name(&self) -> &'static str {
        "lennard-jones"
    }
}

/// Hard spheres of diameter `sigma`: overlap costs [`ENERGY_SENTINEL`], contact is free.
#[derive(Debug, Clone, PartialEq)]
pub struct HardSphere {
    sigma: f64,
}

impl HardSphere {
    pub fn new(sigma: f64) -> Result<Self, ForceFieldError> {
        Ok(Self {
            sigma: positive("hard-sphere", "sigma", sigma)?,
        })
    }
}

impl NonBondedPotential for HardSphere {
    #[inline]
    fn evaluate(&self, _a: &Site, _b: &Site, _rij: &Vector3<f64>, r2: f64, _world: WorldId) -> Interaction {
        if r2 < self.sigma * self.sigma {
            Interaction::energy_only(ENERGY_SENTINEL)
        } else {
            Interaction::zero()
        }
    }

    fn cutoff(&self, _world: WorldId) -> Option<f64> {
        Some(self.sigma)
    }

    fn name(&self) -> &'static str {
        "hard-sphere"
    }
}

/// Screened Coulomb interaction `q_a q_b exp(-κ r) / r` between site charges.
#[derive(Debug, Clone, PartialEq)]
pub struct DebyeHuckel {
    kappa: f64,
    cutoffs: PerWorldCutoff,
}

impl DebyeHuckel {
    pub fn new(kappa: f64, cutoffs: Vec<f64>) -> Result<Self, ForceFieldError> {
        if !(kappa.is_finite() && kappa >= 0.0) {
            return Err(ForceFieldError::InvalidParameter {
                potential: "Debye-Huckel",
                parameter: "kappa",
                value: kappa,
            });
        }
        Ok(Self {
            kappa,
            cutoffs: PerWorldCutoff::new("Debye-Huckel", cutoffs)?,
        })
    }
}

impl NonBondedPotential for DebyeHuckel {
    #[inline]
    fn evaluate(&self, a: &Site, b: &Site, rij: &Vector3<f64>, r2: f64, world: WorldId) -> Interaction {
        let rc = self.cutoffs.get(world);
        if r2 > rc * rc {
            return Interaction::zero();
        }
        let qq = a.charge * b.charge;
        if r2 < MIN_DISTANCE_SQ {
            return Interaction::energy_only(if qq < 0.0 { -ENERGY_SENTINEL } else { ENERGY_SENTINEL });
        }
        let r = r2.sqrt();
        let screened = qq * (-self.kappa * r).exp();
        let energy = screened / r;
        let force_over_r = screened * (1.0 + self.kappa * r) / (r2 * r);
        Interaction::new(energy, rij * force_over_r)
    }

    fn cutoff(&self, world: WorldId) -> Option<f64> {
        Some(self.cutoffs.get(world))
    }

    fn name(&self) -> &'static str {
        "debye-huckel"
    }
}

/// Lebwohl-Lasher orientational coupling `-(ε P2(n_a·n_b) + γ)` between site directors,
/// where `P2(x) = (3x² - 1) / 2`.
///
/// Only orientation enters the energy, so the force is zero. Pairs where either site
/// has no director do not interact. Neighbors are every pair within the cutoff, which
/// on a unit lattice means a cutoff just above the lattice spacing.
#[derive(Debug, Clone, PartialEq)]
pub struct LebwohlLasher {
    epsilon: f64,
    gamma: f64,
    cutoffs: PerWorldCutoff,
}

impl LebwohlLasher {
    pub fn new(epsilon: f64, gamma: f64, cutoffs: Vec<f64>) -> Result<Self, ForceFieldError> {
        if !epsilon.is_finite() {
            return Err(ForceFieldError::InvalidParameter {
                potential: "Lebwohl-Lasher",
                parameter: "epsilon",
                value: epsilon,
            });
        }
        if !gamma.is_finite() {
            return Err(ForceFieldError::InvalidParameter {
                potential: "Lebwohl-Lasher",
                parameter: "gamma",
                value: gamma,
            });
        }
        Ok(Self {
            epsilon,
            gamma,
            cutoffs: PerWorldCutoff::new("Lebwohl-Lasher", cutoffs)?,
        })
    }
}

impl NonBondedPotential for LebwohlLasher {
    #[inline]
    fn evaluate(&self, a: &Site, b: &Site, _rij: &Vector3<f64>, r2: f64, world: WorldId) -> Interaction {
        let rc = self.cutoffs.get(world);
        if r2 > rc * rc {
            return Interaction::zero();
        }
        let (Some(na), Some(nb)) = (a.director.as_ref(), b.director.as_ref()) else {
            return Interaction::zero();
        };
        let dot = na.dot(nb);
        Interaction::energy_only(-(self.epsilon * (1.5 * dot * dot - 0.5) + self.gamma))
    }

    fn cutoff(&self, world: WorldId) -> Option<f64> {
        Some(self.cutoffs.get(world))
    }

    fn name(&self) -> &'static str {
        "lebwohl-lasher"
    }
}

/// Harmonic spring `½ k (r - r0)²`.
#[derive(Debug, Clone, PartialEq)]
pub struct Harmonic {
    k: f64,
    r0: f64,
}

impl Harmonic {
    pub fn new(k: f64, r0: f64) -> Result<Self, ForceFieldError> {
        if !(r0.is_finite() && r0 >= 0.0) {
            return Err(ForceFieldError::InvalidParameter {
                potential: "harmonic",
                parameter: "r0",
                value: r0,
            });
        }
        Ok(Self {
            k: positive("harmonic", "k", k)?,
            r0,
        })
    }
}

impl BondedPotential for Harmonic {
    #[inline]
    fn evaluate(&self, _a: &Site, _b: &Site, rij: &Vector3<f64>, r2: f64) -> Interaction {
        let r = r2.sqrt();
        let stretch = r - self.r0;
        let energy = 0.5 * self.k * stretch * stretch;
        if r < 1e-6 {
            return Interaction::energy_only(energy);
        }
        Interaction::new(energy, rij * (-self.k * stretch / r))
    }

    fn name(&self) -> &'static str {
        "harmonic"
    }
}

/// FENE spring with a full Lennard-Jones core shifted by `ε`.
///
/// Beyond the maximum extension `rmax` the bond is broken and the energy is
/// [`ENERGY_SENTINEL`].
#[derive(Debug, Clone, PartialEq)]
pub struct Fene {
    k: f64,
    rmax: f64,
    epsilon: f64,
    sigma: f64,
}

impl Fene {
    pub fn new(k: f64, rmax: f64, epsilon: f64, sigma: f64) -> Result<Self, ForceFieldError> {
        Ok(Self {
            k: positive("FENE", "k", k)?,
            rmax: positive("FENE", "rmax", rmax)?,
            epsilon: positive("FENE", "epsilon", epsilon)?,
            sigma: positive("FENE", "sigma", sigma)?,
        })
    }
}

impl BondedPotential for Fene {
    #[inline]
    fn evaluate(&self, _a: &Site, _b: &Site, rij: &Vector3<f64>, r2: f64) -> Interaction {
        let rmax2 = self.rmax * self.rmax;
        if r2 >= rmax2 || r2 < MIN_DISTANCE_SQ {
            return Interaction::energy_only(ENERGY_SENTINEL);
        }
        let (lj, lj_force_over_r) = lennard_jones_12_6(r2, self.epsilon, self.sigma);
        let spring = -0.5 * self.k * rmax2 * (1.0 - r2 / rmax2).ln();
        let spring_force_over_r = -self.k / (1.0 - r2 / rmax2);
        Interaction::new(
            spring + lj + self.epsilon,
            rij * (spring_force_over_r + lj_force_over_r),
        )
    }

    fn name(&self) -> &'static str {
        "fene"
    }
}

/// Tail prefactor applied to `N_a N_b / V` for the energy correction.
pub const ENERGY_TAIL_PREFACTOR: f64 = 2.0 * PI;

/// Tail prefactor applied to `N_a N_b / V²` for the pressure correction.
pub const PRESSURE_TAIL_PREFACTOR: f64 = 2.0 / 3.0 * PI;
