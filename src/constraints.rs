use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CscMatrix};

use crate::{
    assembler::multiply,
    error::{Error, Result},
};

/// The system left after eliminating the fixed DOFs:
/// `K_FF * u_F = f_F - K_FC * u_C`.
#[derive(Debug, Clone)]
pub struct ReducedSystem {
    /// `K_FF`
    pub matrix: CscMatrix<f64>,
    /// `f_F - K_FC * u_C`
    pub rhs: DVector<f64>,
    /// Global index of each free DOF, in ascending order.
    pub free_dofs: Vec<usize>,
    /// Prescribed value per global DOF, `None` where the DOF is free.
    nodal_displacements: Vec<Option<f64>>,
}

impl ReducedSystem {
    pub fn free_count(&self) -> usize {
        self.free_dofs.len()
    }

    /// Merges a free-DOF solution with the prescribed values into the full
    /// displacement vector.
    pub fn expand(&self, free_solution: &DVector<f64>) -> DVector<f64> {
        let mut solution_cursor = 0;
        DVector::from_iterator(
            self.nodal_displacements.len(),
            self.nodal_displacements.iter().map(|u| match u {
                Some(prescribed) => *prescribed,
                None => {
                    let value = free_solution[solution_cursor];
                    solution_cursor += 1;
                    value
                }
            }),
        )
    }
}

/// Checks the fixed-DOF list against the model and builds the per-DOF
/// prescribed displacement column
///
/// # Arguments
/// * `dof_count` - Number of global DOFs
/// * `fixed_dofs` - Global indices of the constrained DOFs
/// * `prescribed_values` - Displacement of each constrained DOF
///
/// # Returns
/// One entry per global DOF, `Some` when it is fixed
pub fn build_nodal_displacements(
    dof_count: usize,
    fixed_dofs: &[usize],
    prescribed_values: &[f64],
) -> Result<Vec<Option<f64>>> {
    if fixed_dofs.len() != prescribed_values.len() {
        return Err(Error::Input(format!(
            "{} fixed DOFs but {} prescribed values",
            fixed_dofs.len(),
            prescribed_values.len()
        )));
    }

    let mut nodal_displacements: Vec<Option<f64>> = vec![None; dof_count];
    for (&dof, &value) in std::iter::zip(fixed_dofs, prescribed_values) {
        if dof >= dof_count {
            return Err(Error::Input(format!(
                "fixed DOF {dof} is out of range for {dof_count} DOFs"
            )));
        }
        if !value.is_finite() {
            return Err(Error::Input(format!(
                "prescribed value for DOF {dof} is not finite"
            )));
        }
        if nodal_displacements[dof].is_some() {
            return Err(Error::Input(format!("DOF {dof} is fixed more than once")));
        }
        nodal_displacements[dof] = Some(value);
    }

    if fixed_dofs.is_empty() {
        return Err(Error::IllPosed(
            "no fixed DOFs; the model is free to move as a rigid body".to_owned(),
        ));
    }

    Ok(nodal_displacements)
}

/// Eliminates the fixed DOFs from the total system
///
/// # Arguments
/// * `total_stiffness_matrix` - The assembled `K`
/// * `nodal_forces` - The applied load vector `f`
/// * `fixed_dofs` - Global indices of the constrained DOFs
/// * `prescribed_values` - Displacement of each constrained DOF
///
/// # Returns
/// The reduced system over the free DOFs
pub fn reduce(
    total_stiffness_matrix: &CscMatrix<f64>,
    nodal_forces: &DVector<f64>,
    fixed_dofs: &[usize],
    prescribed_values: &[f64],
) -> Result<ReducedSystem> {
    let dof_count = total_stiffness_matrix.nrows();
    let nodal_displacements = build_nodal_displacements(dof_count, fixed_dofs, prescribed_values)?;

    let mut free_dofs = Vec::with_capacity(dof_count - fixed_dofs.len());
    let mut free_index: Vec<Option<usize>> = vec![None; dof_count];
    for (dof, u) in nodal_displacements.iter().enumerate() {
        if u.is_none() {
            free_index[dof] = Some(free_dofs.len());
            free_dofs.push(dof);
        }
    }

    let mut rhs = DVector::from_iterator(
        free_dofs.len(),
        free_dofs.iter().map(|&d| nodal_forces[d]),
    );
    let mut unknown_matrix = CooMatrix::new(free_dofs.len(), free_dofs.len());

    for (row, col, value) in total_stiffness_matrix.triplet_iter() {
        let Some(local_row) = free_index[row] else {
            continue;
        };
        match (free_index[col], nodal_displacements[col]) {
            (Some(local_col), _) => unknown_matrix.push(local_row, local_col, *value),
            (None, Some(prescribed)) => rhs[local_row] -= value * prescribed,
            (None, None) => unreachable!("every DOF is either free or fixed"),
        }
    }

    Ok(ReducedSystem {
        matrix: CscMatrix::from(&unknown_matrix),
        rhs,
        free_dofs,
        nodal_displacements,
    })
}

/// Solves for the reaction forces at the fixed DOFs: `(K u - f)` restricted
/// to `fixed_dofs`, in the same order.
pub fn compute_reactions(
    total_stiffness_matrix: &CscMatrix<f64>,
    displacements: &DVector<f64>,
    nodal_forces: &DVector<f64>,
    fixed_dofs: &[usize],
) -> Vec<f64> {
    let internal = multiply(total_stiffness_matrix, displacements);
    fixed_dofs
        .iter()
        .map(|&dof| internal[dof] - nodal_forces[dof])
        .collect()
}
