use super::error::WorldError;
use nalgebra::{Matrix3, Point3, Vector3};

/// Periodic simulation cell described by a shape matrix `H` whose columns are the box
/// vectors, together with its inverse and per-axis periodicity flags.
///
/// All periodic operations go through fractional coordinates `s = H⁻¹ r`, which makes
/// them valid for rectangular and triclinic cells alike.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationBox {
    h: Matrix3<f64>,
    h_inv: Matrix3<f64>,
    periodic: [bool; 3],
}

impl SimulationBox {
    /// Creates a box from its shape matrix.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::SingularBox`] if `h` is not invertible or contains
    /// non-finite entries.
    pub fn new(h: Matrix3<f64>, periodic: [bool; 3]) -> Result<Self, WorldError> {
        if h.iter().any(|v| !v.is_finite()) || h.determinant().abs() < f64::EPSILON {
            return Err(WorldError::SingularBox);
        }
        let h_inv = h.try_inverse().ok_or(WorldError::SingularBox)?;
        Ok(Self { h, h_inv, periodic })
    }

    /// A fully periodic rectangular box with edge lengths `x`, `y`, `z`.
    pub fn rectangular(x: f64, y: f64, z: f64) -> Result<Self, WorldError> {
        Self::new(Matrix3::from_diagonal(&Vector3::new(x, y, z)), [true; 3])
    }

    pub fn cubic(length: f64) -> Result<Self, WorldError> {
        Self::rectangular(length, length, length)
    }

    pub fn with_periodicity(mut self, periodic: [bool; 3]) -> Self {
        self.periodic = periodic;
        self
    }

    #[inline]
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.h
    }

    #[inline]
    pub fn inverse(&self) -> &Matrix3<f64> {
        &self.h_inv
    }

    #[inline]
    pub fn periodic(&self) -> [bool; 3] {
        self.periodic
    }

    pub fn volume(&self) -> f64 {
        self.h.determinant().abs()
    }

    /// True when the shape matrix is diagonal.
    pub fn is_orthorhombic(&self) -> bool {
        (0..3).all(|i| (0..3).all(|j| i == j || self.h[(i, j)] == 0.0))
    }

    /// Perpendicular distance between opposite faces along each box vector.
    ///
    /// Equal to the edge lengths for rectangular boxes.
    pub fn widths(&self) -> Vector3<f64> {
        let a = self.h.column(0).into_owned();
        let b = self.h.column(1).into_owned();
        let c = self.h.column(2).into_owned();
        let volume = self.volume();
        Vector3::new(
            volume / b.cross(&c).norm(),
            volume / c.cross(&a).norm(),
            volume / a.cross(&b).norm(),
        )
    }

    pub fn min_width(&self) -> f64 {
        self.widths().min()
    }

    #[inline]
    pub fn to_fractional(&self, position: &Point3<f64>) -> Vector3<f64> {
        self.h_inv * position.coords
    }

    #[inline]
    pub fn to_cartesian(&self, fractional: &Vector3<f64>) -> Point3<f64> {
        Point3::from(self.h * fractional)
    }

    /// Returns the shortest periodic image of a separation vector.
    ///
    /// On every periodic axis the fractional component is shifted by the nearest integer,
    /// so the result never exceeds half a box length along that axis. Non-periodic axes
    /// pass through unchanged.
    #[inline]
    pub fn minimum_image(&self, v: &Vector3<f64>) -> Vector3<f64> {
        let mut s = self.h_inv * v;
        for k in 0..3 {
            if self.periodic[k] {
                s[k] -= s[k].round();
            }
        }
        self.h * s
    }

    /// Folds a position into the primary cell on periodic axes.
    #[inline]
    pub fn wrap(&self, position: &Point3<f64>) -> Point3<f64> {
        let mut s = self.to_fractional(position);
        for k in 0..3 {
            if self.periodic[k] {
                s[k] -= s[k].floor();
                // `x - floor(x)` rounds up to exactly 1.0 for tiny negative inputs.
                if s[k] >= 1.0 {
                    s[k] = 0.0;
                }
            }
        }
        self.to_cartesian(&s)
    }

    /// The lattice translation that carries `position` into the primary cell.
    pub fn wrap_shift(&self, position: &Point3<f64>) -> Vector3<f64> {
        self.wrap(position) - position
    }

    /// Returns a copy of this box with every box vector scaled by `factor`.
    pub fn scaled(&self, factor: f64) -> Result<Self, WorldError> {
        Self::new(self.h * factor, self.periodic)
    }
}
