use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Neg, Sub};

/// Energy returned for forbidden configurations (hard-core overlap, overstretched bonds).
///
/// It is finite so that energy differences stay well defined; the acceptance rule then
/// rejects such configurations without a separate error path.
pub const ENERGY_SENTINEL: f64 = 1e100;

/// Energy breakdown of a particle, a world or a move.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Energy {
    pub inter: f64,
    pub intra: f64,
    pub tail: f64,
}

impl Energy {
    pub fn new(inter: f64, intra: f64, tail: f64) -> Self {
        Self { inter, intra, tail }
    }

    #[inline]
    pub fn total(&self) -> f64 {
        self.inter + self.intra + self.tail
    }
}

impl Add for Energy {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            inter: self.inter + rhs.inter,
            intra: self.intra + rhs.intra,
            tail: self.tail + rhs.tail,
        }
    }
}

impl AddAssign for Energy {
    fn add_assign(&mut self, rhs: Self) {
        self.inter += rhs.inter;
        self.intra += rhs.intra;
        self.tail += rhs.tail;
    }
}

impl Sub for Energy {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            inter: self.inter - rhs.inter,
            intra: self.intra - rhs.intra,
            tail: self.tail - rhs.tail,
        }
    }
}

impl Neg for Energy {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self {
            inter: -self.inter,
            intra: -self.intra,
            tail: -self.tail,
        }
    }
}

/// Isotropic pressure split into its kinetic, virial and long-range parts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pressure {
    pub ideal: f64,
    pub virial: f64,
    pub tail: f64,
}

impl Pressure {
    #[inline]
    pub fn total(&self) -> f64 {
        self.ideal + self.virial + self.tail
    }
}

/// Result of evaluating one pair: energy and the force acting on the first site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interaction {
    pub energy: f64,
    pub force: Vector3<f64>,
}

impl Interaction {
    #[inline]
    pub fn new(energy: f64, force: Vector3<f64>) -> Self {
        Self { energy, force }
    }

    #[inline]
    pub fn zero() -> Self {
        Self::new(0.0, Vector3::zeros())
    }

    #[inline]
    pub fn energy_only(energy: f64) -> Self {
        Self::new(energy, Vector3::zeros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_returns_sum_of_all_terms() {
        let e = Energy::new(1.5, -2.0, 0.25);
        assert_eq!(e.total(), -0.25);
    }

    #[test]
    fn add_and_sub_act_componentwise() {
        let a = Energy::new(1.0, 2.0, 3.0);
        let b = Energy::new(4.0, 5.0, 6.0);
        assert_eq!(a + b, Energy::new(5.0, 7.0, 9.0));
        assert_eq!(b - a, Energy::new(3.0, 3.0, 3.0));
        assert_eq!(-a, Energy::new(-1.0, -2.0, -3.0));
    }

    #[test]
    fn add_assign_accumulates_each_field() {
        let mut a = Energy::default();
        a += Energy::new(1.0, 2.0, 3.0);
        a += Energy::new(1.0, 2.0, 3.0);
        assert_eq!(a, Energy::new(2.0, 4.0, 6.0));
    }

    #[test]
    fn pressure_total_sums_contributions() {
        let p = Pressure {
            ideal: 1.0,
            virial: -0.5,
            tail: -0.125,
        };
        assert_eq!(p.total(), 0.375);
    }
}
