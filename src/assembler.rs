use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CscMatrix};

use crate::{datatypes::DOF, element::ElementKernel};

/// Maps an element's node list to its global DOF indices: local DOFs
/// `2i, 2i+1` become `2*node[i], 2*node[i]+1`.
pub fn element_dofs(element_nodes: &[usize]) -> Vec<usize> {
    element_nodes
        .iter()
        .flat_map(|&node| (0..DOF).map(move |d| DOF * node + d))
        .collect()
}

/// Compiles element stiffness matrices into a total stiffness matrix
///
/// Every element entry is pushed as a triplet; duplicates are summed when the
/// triplets are compressed, so the result is the exact superposition of the
/// element contributions.
///
/// # Arguments
/// * `node_count` - Number of nodes in the mesh
/// * `elements` - Element connectivity, parallel to `kernels`
/// * `kernels` - Element kernels built from `elements`
///
/// # Returns
/// A `2n x 2n` sparse matrix in compressed column form
pub fn build_total_stiffness_matrix(
    node_count: usize,
    elements: &[Vec<usize>],
    kernels: &[ElementKernel],
) -> CscMatrix<f64> {
    let dof_count = DOF * node_count;
    let mut total_stiffness_matrix = CooMatrix::new(dof_count, dof_count);

    for (element, kernel) in std::iter::zip(elements, kernels) {
        let dofs = element_dofs(element);

        for (local_row, &global_row) in dofs.iter().enumerate() {
            for (local_col, &global_col) in dofs.iter().enumerate() {
                total_stiffness_matrix.push(
                    global_row,
                    global_col,
                    kernel.stiffness[(local_row, local_col)],
                );
            }
        }
    }

    CscMatrix::from(&total_stiffness_matrix)
}

/// Sparse matrix-vector product `a * x`.
pub fn multiply(a: &CscMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    let mut y = DVector::zeros(a.nrows());
    for (row, col, value) in a.triplet_iter() {
        y[row] += value * x[col];
    }
    y
}

/// Checks `K[i][j] == K[j][i]` for every stored entry, within `tolerance`
/// relative to the largest magnitude in the matrix.
pub fn is_symmetric(a: &CscMatrix<f64>, tolerance: f64) -> bool {
    if a.nrows() != a.ncols() {
        return false;
    }

    let scale = a.values().iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    a.triplet_iter().all(|(row, col, value)| {
        let mirrored = a
            .get_entry(col, row)
            .map(|entry| entry.into_value())
            .unwrap_or(0.0);
        (value - mirrored).abs() <= tolerance * scale
    })
}
