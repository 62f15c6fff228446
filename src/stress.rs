use nalgebra::{DVector, Vector3};

use crate::{
    assembler::element_dofs,
    datatypes::{Material, Strain, Stress},
    element::{ElementKernel, ElementKind, QUADRATIC_NODE_COORDS, TRIANGLE_GAUSS_3},
};

/// Gathers the element's DOF values out of the global displacement vector.
fn element_displacements(element: &[usize], displacements: &DVector<f64>) -> DVector<f64> {
    let dofs = element_dofs(element);
    DVector::from_iterator(dofs.len(), dofs.iter().map(|&d| displacements[d]))
}

fn strain_at(b: &nalgebra::DMatrix<f64>, element_u: &DVector<f64>) -> Vector3<f64> {
    let strain = b * element_u;
    Vector3::new(strain[0], strain[1], strain[2])
}

/// Calculates the strain and stress in every element
///
/// Linear elements carry a single constant state; quadratic elements are
/// evaluated at their centroid.
///
/// # Arguments
/// * `elements` - Element connectivity
/// * `kernels` - Element kernels, parallel to `elements`
/// * `displacements` - The full displacement vector
/// * `material` - The model material
pub fn compute_stress(
    elements: &[Vec<usize>],
    kernels: &[ElementKernel],
    displacements: &DVector<f64>,
    material: &Material,
) -> (Vec<Strain>, Vec<Stress>) {
    let stress_strain_mat = material.stress_strain_matrix();

    std::iter::zip(elements, kernels)
        .map(|(element, kernel)| {
            let element_u = element_displacements(element, displacements);
            let strain = strain_at(&kernel.strain_displacement, &element_u);
            (Strain::from(strain), Stress::from(stress_strain_mat * strain))
        })
        .unzip()
}

/// Extrapolates the three Gauss-point stresses of a quadratic element to its
/// six nodes through the linear field they define.
fn extrapolate_to_nodes(gauss: &[Vector3<f64>; 3]) -> [Vector3<f64>; 6] {
    let [p1, p2, p3] = TRIANGLE_GAUSS_3;
    // s(xi, eta) = c0 + c1 * xi + c2 * eta through the three points
    let c1 = (gauss[1] - gauss[0]) / (p2.xi - p1.xi);
    let c2 = (gauss[2] - gauss[0]) / (p3.eta - p1.eta);
    let c0 = gauss[0] - c1 * p1.xi - c2 * p1.eta;

    QUADRATIC_NODE_COORDS.map(|(xi, eta)| c0 + c1 * xi + c2 * eta)
}

/// Calculates stress at every node, averaged over the elements sharing it
///
/// Nodes that belong to no element report zero stress.
pub fn compute_nodal_stress(
    node_count: usize,
    elements: &[Vec<usize>],
    kernels: &[ElementKernel],
    displacements: &DVector<f64>,
    material: &Material,
) -> Vec<Stress> {
    let stress_strain_mat = material.stress_strain_matrix();
    let mut nodal_stress = vec![Vector3::zeros(); node_count];
    let mut counter = vec![0_usize; node_count];

    for (element, kernel) in std::iter::zip(elements, kernels) {
        let element_u = element_displacements(element, displacements);
        let gauss: Vec<Vector3<f64>> = kernel
            .gauss_strain_displacement
            .iter()
            .map(|b| stress_strain_mat * strain_at(b, &element_u))
            .collect();

        let at_nodes: Vec<Vector3<f64>> = match kernel.kind {
            ElementKind::Linear => vec![gauss[0]; 3],
            ElementKind::Quadratic => {
                extrapolate_to_nodes(&[gauss[0], gauss[1], gauss[2]]).to_vec()
            }
        };

        for (&node, stress) in std::iter::zip(element, &at_nodes) {
            nodal_stress[node] += stress;
            counter[node] += 1;
        }
    }

    std::iter::zip(nodal_stress, counter)
        .map(|(sum, count)| {
            if count > 0 {
                Stress::from(sum / count as f64)
            } else {
                Stress::default()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::Vertex;
    use approx::assert_relative_eq;

    #[test]
    fn extrapolation_reproduces_linear_fields() {
        let field = |xi: f64, eta: f64| Vector3::new(1.0 + 2.0 * xi - eta, 3.0 * eta, -xi);
        let gauss = TRIANGLE_GAUSS_3.map(|p| field(p.xi, p.eta));
        let nodes = extrapolate_to_nodes(&gauss);
        for (value, (xi, eta)) in std::iter::zip(nodes, QUADRATIC_NODE_COORDS) {
            let expected = field(xi, eta);
            for c in 0..3 {
                assert_relative_eq!(value[c], expected[c], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn uniform_stretch_gives_uniaxial_stress() {
        let nodes = [[0.0, 0.0], [2.0, 0.0], [0.0, 1.0]];
        let elements = vec![vec![0, 1, 2]];
        let coords: Vec<Vertex> = nodes.iter().map(|p| Vertex::from(*p)).collect();
        let material = Material::new(1000.0, 0.0, 1.0).unwrap();
        let kernel = ElementKernel::compute(ElementKind::Linear, &coords, &material).unwrap();

        // ux = 0.01 x
        let u = DVector::from_vec(vec![0.0, 0.0, 0.02, 0.0, 0.0, 0.0]);
        let (strain, stress) = compute_stress(&elements, &[kernel.clone()], &u, &material);
        assert_relative_eq!(strain[0].ex, 0.01, epsilon = 1e-14);
        assert_relative_eq!(stress[0].sx, 10.0, epsilon = 1e-12);
        assert_relative_eq!(stress[0].sy, 0.0, epsilon = 1e-12);

        let nodal = compute_nodal_stress(4, &elements, &[kernel], &u, &material);
        for node in 0..3 {
            assert_relative_eq!(nodal[node].sx, 10.0, epsilon = 1e-12);
        }
        // node 3 is not part of any element
        assert_eq!(nodal[3], Stress::default());
    }
}
