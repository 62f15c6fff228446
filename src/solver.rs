use nalgebra::DVector;

use crate::{
    assembler::build_total_stiffness_matrix,
    constraints::{compute_reactions, reduce},
    datatypes::{Material, Problem, SolverOutput, Vertex, DOF},
    element::{ElementKernel, ElementKind},
    error::{Error, Result},
    linear_solver::{solve_linear_system, LinearSolution, SolverSettings},
    stress::{compute_nodal_stress, compute_stress},
};

/// Phases of a solve, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    BuildingElements { elements: usize },
    Assembling { dofs: usize },
    Constraining { fixed: usize },
    Solving { free: usize },
    RecoveringStress,
}

/// Progress hooks for a solve. All methods default to doing nothing.
///
/// The solver itself never prints; front ends implement this to show
/// progress bars or log lines.
pub trait SolveObserver {
    fn stage(&mut self, _stage: Stage) {}

    /// Called after each element kernel is built.
    fn element_built(&mut self, _index: usize) {}

    /// Called once the reduced system has been solved.
    fn solved(&mut self, _solution: &LinearSolution) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SolveObserver for NoopObserver {}

fn check_finite(values: &[f64], what: &str) -> Result<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(Error::Input(format!("{what} entry {i} is not finite"))),
        None => Ok(()),
    }
}

/// Checks array shapes and element connectivity
///
/// # Returns
/// The node coordinates and the kind of every element
fn validate_problem(problem: &Problem) -> Result<(Vec<Vertex>, Vec<ElementKind>)> {
    let node_count = problem.nodes.len();
    if node_count == 0 {
        return Err(Error::Input("mesh has no nodes".to_owned()));
    }
    if problem.elements.is_empty() {
        return Err(Error::Input("mesh has no elements".to_owned()));
    }

    let nodes: Vec<Vertex> = problem.nodes.iter().map(|p| Vertex::from(*p)).collect();
    if let Some(i) = nodes
        .iter()
        .position(|v| !(v.x.is_finite() && v.y.is_finite()))
    {
        return Err(Error::Input(format!("node {i} has a non-finite coordinate")));
    }

    if problem.forces.len() != DOF * node_count {
        return Err(Error::Input(format!(
            "force vector has {} entries, expected {} for {} nodes",
            problem.forces.len(),
            DOF * node_count,
            node_count
        )));
    }
    check_finite(problem.forces, "force")?;

    let mut kinds = Vec::with_capacity(problem.elements.len());
    for (i, element) in problem.elements.iter().enumerate() {
        let kind = ElementKind::from_node_count(element.len()).ok_or_else(|| {
            Error::Input(format!(
                "element {i} has {} nodes; only 3 (linear) and 6 (quadratic) are supported",
                element.len()
            ))
        })?;

        for (local, &node) in element.iter().enumerate() {
            if node >= node_count {
                return Err(Error::Input(format!(
                    "element {i} references node {node}, but the mesh has {node_count} nodes"
                )));
            }
            if element[..local].contains(&node) {
                return Err(Error::Input(format!(
                    "element {i} references node {node} more than once"
                )));
            }
        }
        kinds.push(kind);
    }

    Ok((nodes, kinds))
}

/// Builds the kernel of every element, tagging geometry failures with the
/// element index.
fn build_element_kernels(
    nodes: &[Vertex],
    elements: &[Vec<usize>],
    kinds: &[ElementKind],
    material: &Material,
    observer: &mut dyn SolveObserver,
) -> Result<Vec<ElementKernel>> {
    let mut element_kernels = Vec::with_capacity(elements.len());

    for (i, (element, &kind)) in std::iter::zip(elements, kinds).enumerate() {
        let coords: Vec<Vertex> = element.iter().map(|&n| nodes[n]).collect();
        let kernel = ElementKernel::compute(kind, &coords, material).map_err(|err| match err {
            Error::Geometry(msg) => Error::Geometry(format!("element {i}: {msg}")),
            other => other,
        })?;
        element_kernels.push(kernel);
        observer.element_built(i);
    }

    Ok(element_kernels)
}

/// Runs the solver on one boundary-value problem
///
/// # Arguments
/// * `problem` - Mesh, constraints and loads
/// * `material` - The model material
/// * `settings` - Linear solver configuration
/// * `observer` - Receives progress events
///
/// # Returns
/// Nodal displacements, element and nodal stresses, and reactions
pub fn run(
    problem: &Problem,
    material: &Material,
    settings: &SolverSettings,
    observer: &mut dyn SolveObserver,
) -> Result<SolverOutput> {
    material.validate()?;
    let (nodes, kinds) = validate_problem(problem)?;

    observer.stage(Stage::BuildingElements {
        elements: problem.elements.len(),
    });
    let element_kernels =
        build_element_kernels(&nodes, problem.elements, &kinds, material, observer)?;

    observer.stage(Stage::Assembling {
        dofs: DOF * nodes.len(),
    });
    let total_stiffness_matrix =
        build_total_stiffness_matrix(nodes.len(), problem.elements, &element_kernels);

    observer.stage(Stage::Constraining {
        fixed: problem.fixed_dofs.len(),
    });
    let nodal_forces = DVector::from_column_slice(problem.forces);
    let reduced = reduce(
        &total_stiffness_matrix,
        &nodal_forces,
        problem.fixed_dofs,
        problem.prescribed_values,
    )?;

    observer.stage(Stage::Solving {
        free: reduced.free_count(),
    });
    let solution = solve_linear_system(&reduced.matrix, &reduced.rhs, settings)?;
    observer.solved(&solution);
    let nodal_displacements = reduced.expand(&solution.values);

    observer.stage(Stage::RecoveringStress);
    let (strain, stress) = compute_stress(
        problem.elements,
        &element_kernels,
        &nodal_displacements,
        material,
    );
    let nodal_stress = compute_nodal_stress(
        nodes.len(),
        problem.elements,
        &element_kernels,
        &nodal_displacements,
        material,
    );
    let reactions = compute_reactions(
        &total_stiffness_matrix,
        &nodal_displacements,
        &nodal_forces,
        problem.fixed_dofs,
    );

    if stress
        .iter()
        .any(|s| !s.as_array().iter().all(|v| v.is_finite()))
    {
        return Err(Error::Numerical("stress result contains NaN/Inf".to_owned()));
    }

    let disp = nodal_displacements
        .as_slice()
        .chunks_exact(DOF)
        .map(|u| [u[0], u[1]])
        .collect();

    Ok(SolverOutput {
        disp,
        stress,
        strain,
        nodal_stress,
        reactions,
    })
}
