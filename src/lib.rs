//! Linear-elastic finite-element solver for planar triangle meshes.
//!
//! Given nodes, 3- or 6-node triangle connectivity, fixed DOFs with their
//! prescribed displacements and a nodal load vector, [`solve`] returns the
//! displacement of every node and the stress in every element. Each call is
//! an independent problem; nothing is cached between calls.
//!
//! ```
//! let nodes = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
//! let elements = vec![vec![0, 1, 2], vec![0, 2, 3]];
//! let mut forces = vec![0.0; 8];
//! forces[2] = 500.0;
//! forces[4] = 500.0;
//!
//! let result = planar_fem::solve(&nodes, &elements, &[0, 1, 6], &[0.0; 3], &forces).unwrap();
//! assert!(result.disp[1][0] > 0.0);
//! ```

pub mod assembler;
pub mod constraints;
pub mod datatypes;
pub mod element;
pub mod error;
pub mod input;
pub mod linear_solver;
pub mod post_processor;
pub mod solver;
pub mod stress;

pub use datatypes::{Material, PlaneCondition, Problem, SolverOutput, Strain, Stress, Vertex};
pub use element::ElementKind;
pub use error::{Error, Result};
pub use linear_solver::{LinearSolverKind, SolverSettings};
pub use solver::{NoopObserver, SolveObserver, Stage};

/// Solves one plane-stress problem with the default material
/// (E = 210e6, nu = 0.3, unit thickness) and default solver settings.
///
/// # Arguments
/// * `nodes` - `(x, y)` per node
/// * `elements` - 3 or 6 node indices per element, counter-clockwise
/// * `fixed_dofs` - Constrained global DOFs (`2*node` for x, `2*node+1` for y)
/// * `prescribed_values` - Displacement of each constrained DOF
/// * `forces` - Nodal load per global DOF, length `2 * nodes.len()`
pub fn solve(
    nodes: &[[f64; 2]],
    elements: &[Vec<usize>],
    fixed_dofs: &[usize],
    prescribed_values: &[f64],
    forces: &[f64],
) -> Result<SolverOutput> {
    let problem = Problem {
        nodes,
        elements,
        fixed_dofs,
        prescribed_values,
        forces,
    };
    solve_with(
        &problem,
        &Material::default(),
        &SolverSettings::default(),
        &mut NoopObserver,
    )
}

/// Solves one problem with an explicit material, solver settings and
/// progress observer.
pub fn solve_with(
    problem: &Problem,
    material: &Material,
    settings: &SolverSettings,
    observer: &mut dyn SolveObserver,
) -> Result<SolverOutput> {
    solver::run(problem, material, settings, observer)
}
