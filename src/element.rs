//! Element kernels for the two supported triangle families.
//!
//! A kernel turns an element's nodal coordinates and the material into its
//! stiffness matrix and the strain-displacement operators that stress
//! recovery needs later. The element family is inferred from the number of
//! nodes in the connectivity list:
//!
//! - 3 nodes: linear, constant-strain triangle, integrated in closed form
//! - 6 nodes: quadratic triangle (corners first, then the mid-edge nodes of
//!   edges 0-1, 1-2 and 2-0), integrated with a 3-point Gauss rule
//!
//! ```text
//!        2
//!       / \
//!      5   4
//!     /     \
//!    0---3---1
//! ```

use nalgebra::{matrix, DMatrix, Matrix2, SMatrix, Vector2};

use crate::{
    datatypes::{Material, Vertex, DOF},
    error::{Error, Result},
};

/// Relative tolerance on area / Jacobian determinant below which an element
/// counts as degenerate.
pub const DEGENERACY_TOLERANCE: f64 = 1e-12;

/// Integration point on the reference triangle `(0,0) (1,0) (0,1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraturePoint {
    pub xi: f64,
    pub eta: f64,
    pub weight: f64,
}

/// Degree-2 Gauss rule. Weights sum to the reference area 1/2.
pub const TRIANGLE_GAUSS_3: [QuadraturePoint; 3] = [
    QuadraturePoint {
        xi: 1.0 / 6.0,
        eta: 1.0 / 6.0,
        weight: 1.0 / 6.0,
    },
    QuadraturePoint {
        xi: 2.0 / 3.0,
        eta: 1.0 / 6.0,
        weight: 1.0 / 6.0,
    },
    QuadraturePoint {
        xi: 1.0 / 6.0,
        eta: 2.0 / 3.0,
        weight: 1.0 / 6.0,
    },
];

/// Reference coordinates of the six quadratic-triangle nodes, in local order.
pub const QUADRATIC_NODE_COORDS: [(f64, f64); 6] = [
    (0.0, 0.0),
    (1.0, 0.0),
    (0.0, 1.0),
    (0.5, 0.0),
    (0.5, 0.5),
    (0.0, 0.5),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// 3-node constant-strain triangle.
    Linear,
    /// 6-node quadratic triangle.
    Quadratic,
}

impl ElementKind {
    pub fn from_node_count(count: usize) -> Option<ElementKind> {
        match count {
            3 => Some(ElementKind::Linear),
            6 => Some(ElementKind::Quadratic),
            _ => None,
        }
    }

    pub fn node_count(self) -> usize {
        match self {
            ElementKind::Linear => 3,
            ElementKind::Quadratic => 6,
        }
    }

    pub fn dof_count(self) -> usize {
        DOF * self.node_count()
    }
}

/// Stiffness and strain operators of one element.
#[derive(Debug, Clone)]
pub struct ElementKernel {
    pub kind: ElementKind,
    /// Area of the element in the plane.
    pub area: f64,
    /// `2n x 2n` element stiffness.
    pub stiffness: DMatrix<f64>,
    /// `3 x 2n` strain operator at the point stress is reported at (the
    /// centroid).
    pub strain_displacement: DMatrix<f64>,
    /// Strain operators at the integration points, in rule order. A linear
    /// element has a single, constant one.
    pub gauss_strain_displacement: Vec<DMatrix<f64>>,
}

impl ElementKernel {
    /// Builds the kernel for one element
    ///
    /// # Arguments
    /// * `kind` - The element family
    /// * `coords` - Nodal coordinates in local node order
    /// * `material` - The model material
    pub fn compute(
        kind: ElementKind,
        coords: &[Vertex],
        material: &Material,
    ) -> Result<ElementKernel> {
        if coords.len() != kind.node_count() {
            return Err(Error::Input(format!(
                "{:?} element needs {} nodes, got {}",
                kind,
                kind.node_count(),
                coords.len()
            )));
        }

        match kind {
            ElementKind::Linear => linear_kernel(coords, material),
            ElementKind::Quadratic => quadratic_kernel(coords, material),
        }
    }
}

/// Calculates the signed area of the triangle spanned by three vertices.
/// Positive when the vertices run counter-clockwise.
pub fn compute_element_area(v0: &Vertex, v1: &Vertex, v2: &Vertex) -> f64 {
    0.5 * (v0.x * (v1.y - v2.y) + v1.x * (v2.y - v0.y) + v2.x * (v0.y - v1.y))
}

/// Square of the longest corner-to-corner edge, used to scale tolerances.
fn characteristic_length_squared(v0: &Vertex, v1: &Vertex, v2: &Vertex) -> f64 {
    let edge = |a: &Vertex, b: &Vertex| (a.x - b.x).powi(2) + (a.y - b.y).powi(2);
    edge(v0, v1).max(edge(v1, v2)).max(edge(v2, v0))
}

fn check_orientation(area: f64, scale: f64) -> Result<()> {
    if !area.is_finite() {
        return Err(Error::Geometry(format!("non-finite element area {area}")));
    }
    if area <= DEGENERACY_TOLERANCE * scale {
        let reason = if area < -DEGENERACY_TOLERANCE * scale {
            "element is inverted (clockwise node order)"
        } else {
            "element is degenerate (zero area)"
        };
        return Err(Error::Geometry(format!("{reason}, signed area {area:e}")));
    }
    Ok(())
}

/// Calculates the strain-displacement matrix of a linear triangle
///
/// # Returns
/// A 3x6 strain-displacement matrix
fn compute_strain_displacement_matrix(
    v0: &Vertex,
    v1: &Vertex,
    v2: &Vertex,
    element_area: f64,
) -> SMatrix<f64, 3, 6> {
    let beta_1 = v1.y - v2.y;
    let beta_2 = v2.y - v0.y;
    let beta_3 = v0.y - v1.y;

    let gamma_1 = v2.x - v1.x;
    let gamma_2 = v0.x - v2.x;
    let gamma_3 = v1.x - v0.x;

    let mut strain_displacement_mat: SMatrix<f64, 3, 6> = matrix![
        beta_1, 0., beta_2, 0., beta_3, 0.;
        0., gamma_1, 0., gamma_2, 0., gamma_3;
        gamma_1, beta_1, gamma_2, beta_2, gamma_3, beta_3;
    ];

    strain_displacement_mat /= 2.0 * element_area;

    strain_displacement_mat
}

fn linear_kernel(coords: &[Vertex], material: &Material) -> Result<ElementKernel> {
    let (v0, v1, v2) = (&coords[0], &coords[1], &coords[2]);
    let element_area = compute_element_area(v0, v1, v2);
    check_orientation(element_area, characteristic_length_squared(v0, v1, v2))?;

    let stress_strain_mat = material.stress_strain_matrix();
    let strain_displacement_mat = compute_strain_displacement_matrix(v0, v1, v2, element_area);

    let stiffness = (strain_displacement_mat.transpose() * stress_strain_mat)
        * strain_displacement_mat
        * element_area
        * material.part_thickness;

    let b = DMatrix::from_column_slice(3, 6, strain_displacement_mat.as_slice());
    Ok(ElementKernel {
        kind: ElementKind::Linear,
        area: element_area,
        stiffness: DMatrix::from_column_slice(6, 6, stiffness.as_slice()),
        strain_displacement: b.clone(),
        gauss_strain_displacement: vec![b],
    })
}

/// Quadratic shape functions at reference coordinates `(xi, eta)`.
#[cfg(test)]
fn shape_functions(xi: f64, eta: f64) -> [f64; 6] {
    let l1 = 1.0 - xi - eta;
    let (l2, l3) = (xi, eta);
    [
        l1 * (2.0 * l1 - 1.0),
        l2 * (2.0 * l2 - 1.0),
        l3 * (2.0 * l3 - 1.0),
        4.0 * l1 * l2,
        4.0 * l2 * l3,
        4.0 * l3 * l1,
    ]
}

/// Quadratic shape function derivatives with respect to `xi` and `eta`.
fn shape_function_derivatives(xi: f64, eta: f64) -> ([f64; 6], [f64; 6]) {
    let l1 = 1.0 - xi - eta;
    let (l2, l3) = (xi, eta);

    let dn_dxi = [
        -(4.0 * l1 - 1.0),
        4.0 * l2 - 1.0,
        0.0,
        4.0 * (l1 - l2),
        4.0 * l3,
        -4.0 * l3,
    ];
    let dn_deta = [
        -(4.0 * l1 - 1.0),
        0.0,
        4.0 * l3 - 1.0,
        -4.0 * l2,
        4.0 * l2,
        4.0 * (l1 - l3),
    ];

    (dn_dxi, dn_deta)
}

fn quadratic_jacobian(coords: &[Vertex], dn_dxi: &[f64; 6], dn_deta: &[f64; 6]) -> Matrix2<f64> {
    let mut jacobian = Matrix2::zeros();
    for (i, node) in coords.iter().enumerate() {
        jacobian[(0, 0)] += dn_dxi[i] * node.x;
        jacobian[(0, 1)] += dn_dxi[i] * node.y;
        jacobian[(1, 0)] += dn_deta[i] * node.x;
        jacobian[(1, 1)] += dn_deta[i] * node.y;
    }
    jacobian
}

/// Rejects a non-positive Jacobian determinant at `(xi, eta)` and returns it.
fn check_jacobian(jacobian: &Matrix2<f64>, xi: f64, eta: f64, scale: f64) -> Result<f64> {
    // reference triangle has area 1/2, so det J is twice the local area ratio
    let det_j = jacobian.determinant();
    check_orientation(0.5 * det_j, scale).map_err(|err| match err {
        Error::Geometry(msg) => {
            Error::Geometry(format!("{msg} (Jacobian at xi={xi:.4}, eta={eta:.4})"))
        }
        other => other,
    })?;
    Ok(det_j)
}

/// Strain-displacement matrix of a quadratic triangle at `(xi, eta)`
///
/// # Returns
/// The 3x12 matrix and the Jacobian determinant at that point
fn quadratic_strain_displacement(
    coords: &[Vertex],
    xi: f64,
    eta: f64,
    scale: f64,
) -> Result<(SMatrix<f64, 3, 12>, f64)> {
    let (dn_dxi, dn_deta) = shape_function_derivatives(xi, eta);
    let jacobian = quadratic_jacobian(coords, &dn_dxi, &dn_deta);
    let det_j = check_jacobian(&jacobian, xi, eta, scale)?;

    let inverse = jacobian.try_inverse().ok_or_else(|| {
        Error::Geometry(format!("singular Jacobian at xi={xi:.4}, eta={eta:.4}"))
    })?;

    let mut b: SMatrix<f64, 3, 12> = SMatrix::zeros();
    for i in 0..6 {
        let d = inverse * Vector2::new(dn_dxi[i], dn_deta[i]);
        b[(0, 2 * i)] = d[0];
        b[(1, 2 * i + 1)] = d[1];
        b[(2, 2 * i)] = d[1];
        b[(2, 2 * i + 1)] = d[0];
    }

    Ok((b, det_j))
}

fn quadratic_kernel(coords: &[Vertex], material: &Material) -> Result<ElementKernel> {
    let scale = characteristic_length_squared(&coords[0], &coords[1], &coords[2]);

    // a misplaced mid-edge node can fold the element near a corner while
    // every interior point still maps forward
    for &(xi, eta) in &QUADRATIC_NODE_COORDS {
        let (dn_dxi, dn_deta) = shape_function_derivatives(xi, eta);
        check_jacobian(&quadratic_jacobian(coords, &dn_dxi, &dn_deta), xi, eta, scale)?;
    }

    let stress_strain_mat = material.stress_strain_matrix();

    let mut stiffness: SMatrix<f64, 12, 12> = SMatrix::zeros();
    let mut area = 0.0;
    let mut gauss_strain_displacement = Vec::with_capacity(TRIANGLE_GAUSS_3.len());

    for point in &TRIANGLE_GAUSS_3 {
        let (b, det_j) = quadratic_strain_displacement(coords, point.xi, point.eta, scale)?;
        stiffness += (b.transpose() * stress_strain_mat) * b
            * (det_j * point.weight * material.part_thickness);
        area += det_j * point.weight;
        gauss_strain_displacement.push(DMatrix::from_column_slice(3, 12, b.as_slice()));
    }

    let (centroid_b, _) = quadratic_strain_displacement(coords, 1.0 / 3.0, 1.0 / 3.0, scale)?;

    Ok(ElementKernel {
        kind: ElementKind::Quadratic,
        area,
        stiffness: DMatrix::from_column_slice(12, 12, stiffness.as_slice()),
        strain_displacement: DMatrix::from_column_slice(3, 12, centroid_b.as_slice()),
        gauss_strain_displacement,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn vertices(points: &[[f64; 2]]) -> Vec<Vertex> {
        points.iter().map(|p| Vertex::from(*p)).collect()
    }

    fn unit_quadratic() -> Vec<Vertex> {
        vertices(&[
            [0.0, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [0.5, 0.0],
            [0.5, 0.5],
            [0.0, 0.5],
        ])
    }

    fn compute(kind: ElementKind, coords: &[Vertex]) -> Result<ElementKernel> {
        ElementKernel::compute(kind, coords, &Material::default())
    }

    fn assert_symmetric(k: &DMatrix<f64>) {
        for i in 0..k.nrows() {
            for j in 0..k.ncols() {
                assert_relative_eq!(k[(i, j)], k[(j, i)], epsilon = 1e-6, max_relative = 1e-10);
            }
        }
    }

    /// Rigid translations must produce no nodal forces.
    fn assert_translation_free(k: &DMatrix<f64>) {
        let n = k.nrows();
        for axis in 0..2 {
            let u = nalgebra::DVector::from_fn(n, |i, _| if i % 2 == axis { 1.0 } else { 0.0 });
            let f = k * u;
            let scale = k.amax();
            for v in f.iter() {
                assert!(v.abs() < 1e-9 * scale, "rigid translation produced force {v}");
            }
        }
    }

    #[test]
    fn kind_from_node_count() {
        assert_eq!(ElementKind::from_node_count(3), Some(ElementKind::Linear));
        assert_eq!(ElementKind::from_node_count(6), Some(ElementKind::Quadratic));
        assert_eq!(ElementKind::from_node_count(4), None);
        assert_eq!(ElementKind::Quadratic.dof_count(), 12);
    }

    #[test]
    fn gauss_weights_sum_to_reference_area() {
        let total: f64 = TRIANGLE_GAUSS_3.iter().map(|p| p.weight).sum();
        assert_relative_eq!(total, 0.5, epsilon = 1e-15);
    }

    #[test]
    fn shape_functions_partition_unity() {
        for (xi, eta) in [(1.0 / 3.0, 1.0 / 3.0), (0.5, 0.0), (0.1, 0.7), (0.0, 0.0)] {
            let sum: f64 = shape_functions(xi, eta).iter().sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-14);
        }
        // interpolatory at the mid-edge node of edge 1-2
        let n = shape_functions(0.5, 0.5);
        assert_relative_eq!(n[4], 1.0, epsilon = 1e-14);
        assert_relative_eq!(n[1], 0.0, epsilon = 1e-14);
    }

    #[test]
    fn linear_area_sign_follows_orientation() {
        let ccw = vertices(&[[0.0, 0.0], [2.0, 0.0], [0.0, 2.0]]);
        assert_relative_eq!(compute_element_area(&ccw[0], &ccw[1], &ccw[2]), 2.0);
        assert_relative_eq!(compute_element_area(&ccw[0], &ccw[2], &ccw[1]), -2.0);
    }

    #[test]
    fn linear_stiffness_is_symmetric_and_translation_free() {
        let coords = vertices(&[[0.0, 0.0], [3.0, 0.5], [1.0, 2.0]]);
        let kernel = compute(ElementKind::Linear, &coords).unwrap();
        assert_eq!(kernel.stiffness.shape(), (6, 6));
        assert_eq!(kernel.strain_displacement.shape(), (3, 6));
        assert_symmetric(&kernel.stiffness);
        assert_translation_free(&kernel.stiffness);
    }

    #[test]
    fn linear_strain_operator_reproduces_uniform_stretch() {
        // u = 0.01 * x gives ex = 0.01 everywhere
        let coords = vertices(&[[0.0, 0.0], [4.0, 1.0], [1.0, 3.0]]);
        let kernel = compute(ElementKind::Linear, &coords).unwrap();
        let u = nalgebra::DVector::from_vec(vec![0.0, 0.0, 0.04, 0.0, 0.01, 0.0]);
        let strain = &kernel.strain_displacement * u;
        assert_relative_eq!(strain[0], 0.01, epsilon = 1e-14);
        assert_relative_eq!(strain[1], 0.0, epsilon = 1e-14);
        assert_relative_eq!(strain[2], 0.0, epsilon = 1e-14);
    }

    #[test]
    fn quadratic_stiffness_is_symmetric_and_translation_free() {
        let kernel = compute(ElementKind::Quadratic, &unit_quadratic()).unwrap();
        assert_eq!(kernel.stiffness.shape(), (12, 12));
        assert_eq!(kernel.gauss_strain_displacement.len(), 3);
        assert_relative_eq!(kernel.area, 0.5, epsilon = 1e-14);
        assert_symmetric(&kernel.stiffness);
        assert_translation_free(&kernel.stiffness);
    }

    #[test]
    fn quadratic_strain_operator_reproduces_quadratic_field() {
        // u = x^2 interpolates exactly, so ex = 2x at the centroid (x = 1/3)
        let coords = unit_quadratic();
        let kernel = compute(ElementKind::Quadratic, &coords).unwrap();
        let mut u = nalgebra::DVector::zeros(12);
        for (i, node) in coords.iter().enumerate() {
            u[2 * i] = node.x * node.x;
        }
        let strain = &kernel.strain_displacement * u;
        assert_relative_eq!(strain[0], 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(strain[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(strain[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn straight_quadratic_matches_linear_on_linear_fields() {
        // both families must agree on the energy of a uniform strain state
        let corners = [[0.0, 0.0], [2.0, 0.0], [0.5, 1.5]];
        let linear = vertices(&corners);
        let mut quadratic = linear.clone();
        for (a, b) in [(0, 1), (1, 2), (2, 0)] {
            quadratic.push(Vertex {
                x: 0.5 * (linear[a].x + linear[b].x),
                y: 0.5 * (linear[a].y + linear[b].y),
            });
        }
        let material = Material::default();
        let k3 = ElementKernel::compute(ElementKind::Linear, &linear, &material).unwrap();
        let k6 = ElementKernel::compute(ElementKind::Quadratic, &quadratic, &material).unwrap();

        let field = |v: &Vertex| [0.001 * v.x + 0.002 * v.y, -0.0005 * v.x];
        let u3 = nalgebra::DVector::from_iterator(6, linear.iter().flat_map(field));
        let u6 = nalgebra::DVector::from_iterator(12, quadratic.iter().flat_map(field));

        let e3 = u3.dot(&(&k3.stiffness * &u3));
        let e6 = u6.dot(&(&k6.stiffness * &u6));
        assert_relative_eq!(e3, e6, max_relative = 1e-10);
        assert_relative_eq!(k3.area, k6.area, max_relative = 1e-12);
    }

    #[test]
    fn collinear_nodes_are_a_geometry_error() {
        let coords = vertices(&[[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]]);
        let err = compute(ElementKind::Linear, &coords).unwrap_err();
        assert!(matches!(err, Error::Geometry(_)), "{err}");
    }

    #[test]
    fn clockwise_elements_are_rejected() {
        let coords = vertices(&[[0.0, 0.0], [0.0, 1.0], [1.0, 0.0]]);
        let err = compute(ElementKind::Linear, &coords).unwrap_err();
        assert!(matches!(err, Error::Geometry(ref msg) if msg.contains("inverted")), "{err}");

        let mut inverted = unit_quadratic();
        inverted.swap(1, 2);
        inverted.swap(3, 5);
        let err = compute(ElementKind::Quadratic, &inverted).unwrap_err();
        assert!(matches!(err, Error::Geometry(_)), "{err}");
    }

    #[test]
    fn mid_edge_node_folding_a_corner_is_rejected() {
        // det J = -0.6 at corner 0, positive at every Gauss point
        let mut folded = unit_quadratic();
        folded[3] = Vertex { x: 0.1, y: 0.0 };
        let err = compute(ElementKind::Quadratic, &folded).unwrap_err();
        assert!(matches!(err, Error::Geometry(ref msg) if msg.contains("xi=0.0000")), "{err}");
    }

    #[test]
    fn wrong_coordinate_count_is_an_input_error() {
        let coords = vertices(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        let err = compute(ElementKind::Quadratic, &coords).unwrap_err();
        assert!(matches!(err, Error::Input(_)));
    }
}
