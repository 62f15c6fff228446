use nalgebra::{matrix, SMatrix, Vector3};

use crate::error::{Error, Result};

/// Two displacement components per node.
pub const DOF: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

impl From<[f64; 2]> for Vertex {
    fn from(p: [f64; 2]) -> Self {
        Vertex { x: p[0], y: p[1] }
    }
}

/// Through-thickness idealization of the 2D domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaneCondition {
    /// Zero through-thickness stress (thin plates).
    #[default]
    Stress,
    /// Zero through-thickness strain (long prismatic bodies).
    Strain,
}

/// Isotropic linear-elastic material, uniform over the domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub youngs_modulus: f64,
    pub poisson_ratio: f64,
    pub part_thickness: f64,
    pub plane: PlaneCondition,
}

impl Default for Material {
    fn default() -> Self {
        Material {
            youngs_modulus: 210e6,
            poisson_ratio: 0.3,
            part_thickness: 1.0,
            plane: PlaneCondition::Stress,
        }
    }
}

impl Material {
    /// Creates a plane-stress material, rejecting non-physical parameters.
    pub fn new(youngs_modulus: f64, poisson_ratio: f64, part_thickness: f64) -> Result<Material> {
        let material = Material {
            youngs_modulus,
            poisson_ratio,
            part_thickness,
            plane: PlaneCondition::Stress,
        };
        material.validate()?;
        Ok(material)
    }

    pub fn with_plane(mut self, plane: PlaneCondition) -> Material {
        self.plane = plane;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.youngs_modulus.is_finite() && self.youngs_modulus > 0.0) {
            return Err(Error::Material(format!(
                "Young's modulus must be positive, got {}",
                self.youngs_modulus
            )));
        }
        if !(self.poisson_ratio > -1.0 && self.poisson_ratio < 0.5) {
            return Err(Error::Material(format!(
                "Poisson's ratio must lie in (-1, 0.5), got {}",
                self.poisson_ratio
            )));
        }
        if !(self.part_thickness.is_finite() && self.part_thickness > 0.0) {
            return Err(Error::Material(format!(
                "Part thickness must be positive, got {}",
                self.part_thickness
            )));
        }
        Ok(())
    }

    /// Calculates the stress-strain matrix `D`
    ///
    /// # Returns
    /// A 3x3 matrix mapping `[ex, ey, gxy]` to `[sx, sy, txy]`
    pub fn stress_strain_matrix(&self) -> SMatrix<f64, 3, 3> {
        let nu = self.poisson_ratio;
        let e = self.youngs_modulus;

        match self.plane {
            PlaneCondition::Stress => {
                let mut stress_strain_mat: SMatrix<f64, 3, 3> = matrix![
                    1.0, nu, 0.0;
                    nu, 1.0, 0.0;
                    0.0, 0.0, (1.0 - nu) / 2.0;
                ];
                stress_strain_mat *= e / (1.0 - f64::powi(nu, 2));
                stress_strain_mat
            }
            PlaneCondition::Strain => {
                let mut stress_strain_mat: SMatrix<f64, 3, 3> = matrix![
                    1.0 - nu, nu, 0.0;
                    nu, 1.0 - nu, 0.0;
                    0.0, 0.0, (1.0 - 2.0 * nu) / 2.0;
                ];
                stress_strain_mat *= e / ((1.0 + nu) * (1.0 - 2.0 * nu));
                stress_strain_mat
            }
        }
    }
}

/// In-plane stress state `(sx, sy, txy)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Stress {
    pub sx: f64,
    pub sy: f64,
    pub txy: f64,
}

impl Stress {
    /// Equivalent von Mises stress of the in-plane components.
    pub fn von_mises(&self) -> f64 {
        f64::sqrt(
            self.sx * self.sx - self.sx * self.sy + self.sy * self.sy + 3.0 * self.txy * self.txy,
        )
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.sx, self.sy, self.txy]
    }
}

impl From<Vector3<f64>> for Stress {
    fn from(v: Vector3<f64>) -> Self {
        Stress {
            sx: v[0],
            sy: v[1],
            txy: v[2],
        }
    }
}

/// In-plane engineering strain `(ex, ey, gxy)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Strain {
    pub ex: f64,
    pub ey: f64,
    pub gxy: f64,
}

impl From<Vector3<f64>> for Strain {
    fn from(v: Vector3<f64>) -> Self {
        Strain {
            ex: v[0],
            ey: v[1],
            gxy: v[2],
        }
    }
}

/// Caller-supplied boundary-value problem. Borrowed, never mutated.
#[derive(Debug, Clone, Copy)]
pub struct Problem<'a> {
    pub nodes: &'a [[f64; 2]],
    pub elements: &'a [Vec<usize>],
    pub fixed_dofs: &'a [usize],
    pub prescribed_values: &'a [f64],
    pub forces: &'a [f64],
}

/// Everything a solve hands back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutput {
    /// `[ux, uy]` per node.
    pub disp: Vec<[f64; 2]>,
    /// One stress state per element, in input element order.
    pub stress: Vec<Stress>,
    /// Strain matching each entry of `stress`.
    pub strain: Vec<Strain>,
    /// Stress averaged over the elements sharing each node.
    pub nodal_stress: Vec<Stress>,
    /// Reaction force at each fixed DOF, parallel to `fixed_dofs`.
    pub reactions: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_material_constants() {
        let material = Material::default();
        assert_eq!(material.youngs_modulus, 210e6);
        assert_eq!(material.poisson_ratio, 0.3);
        assert_eq!(material.part_thickness, 1.0);
        assert_eq!(material.plane, PlaneCondition::Stress);
        assert!(material.validate().is_ok());
    }

    #[test]
    fn rejects_non_physical_material() {
        assert!(matches!(Material::new(-1.0, 0.3, 1.0), Err(Error::Material(_))));
        assert!(matches!(Material::new(1.0, 0.5, 1.0), Err(Error::Material(_))));
        assert!(matches!(Material::new(1.0, 0.3, 0.0), Err(Error::Material(_))));
    }

    #[test]
    fn plane_stress_matrix() {
        let d = Material::new(1.0, 0.25, 1.0).unwrap().stress_strain_matrix();
        let factor = 1.0 / (1.0 - 0.0625);
        assert_relative_eq!(d[(0, 0)], factor, epsilon = 1e-14);
        assert_relative_eq!(d[(0, 1)], 0.25 * factor, epsilon = 1e-14);
        assert_relative_eq!(d[(2, 2)], 0.375 * factor, epsilon = 1e-14);
        assert_eq!(d[(0, 2)], 0.0);
    }

    #[test]
    fn plane_strain_is_stiffer_than_plane_stress() {
        let stress = Material::default();
        let strain = stress.with_plane(PlaneCondition::Strain);
        let d_stress = stress.stress_strain_matrix();
        let d_strain = strain.stress_strain_matrix();
        assert!(d_strain[(0, 0)] > d_stress[(0, 0)]);
        // shear modulus is the same under both idealizations
        assert_relative_eq!(d_strain[(2, 2)], d_stress[(2, 2)], max_relative = 1e-12);
    }

    #[test]
    fn von_mises_of_uniaxial_and_pure_shear() {
        let uniaxial = Stress { sx: 100.0, sy: 0.0, txy: 0.0 };
        assert_relative_eq!(uniaxial.von_mises(), 100.0, epsilon = 1e-12);

        let shear = Stress { sx: 0.0, sy: 0.0, txy: 10.0 };
        assert_relative_eq!(shear.von_mises(), 10.0 * f64::sqrt(3.0), epsilon = 1e-12);
    }
}
