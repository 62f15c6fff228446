use argmin::{
    core::{observers::ObserverMode, Executor, Operator, State},
    solver::conjugategradient::ConjugateGradient,
};
use argmin_observer_slog::SlogLogger;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{factorization::CscCholesky, CscMatrix};

use crate::{
    assembler::multiply,
    error::{Error, Result},
};

pub const MAX_CG_ITER: u64 = 100_000;
pub const TARGET_CG_TOLERANCE: f64 = 1e-10;

/// Smallest accepted ratio between the smallest and largest pivot of a
/// factorization. Anything below is treated as singular.
pub const PIVOT_TOLERANCE: f64 = 1e-12;

/// Allowed growth of the true residual over the iteration's own estimate.
const RESIDUAL_SLACK: f64 = 100.0;

/// Strategy for solving the reduced system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinearSolverKind {
    /// Sparse Cholesky, falling back to dense LU when the matrix is not
    /// positive definite.
    #[default]
    Auto,
    /// Sparse Cholesky only.
    Cholesky,
    /// Dense LU only.
    Lu,
    /// Conjugate gradient iteration.
    ConjugateGradient,
}

/// Knobs for the linear solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    pub linear_solver: LinearSolverKind,
    pub max_cg_iter: u64,
    /// Relative residual at which conjugate gradient stops.
    pub cg_tolerance: f64,
    /// Log every conjugate gradient iteration to the terminal.
    pub log_iterations: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            linear_solver: LinearSolverKind::Auto,
            max_cg_iter: MAX_CG_ITER,
            cg_tolerance: TARGET_CG_TOLERANCE,
            log_iterations: false,
        }
    }
}

/// Solution of the reduced system and how it was obtained.
#[derive(Debug, Clone)]
pub struct LinearSolution {
    pub values: DVector<f64>,
    /// Strategy that produced `values`; never `Auto`.
    pub method: LinearSolverKind,
    /// Iteration count, for iterative strategies.
    pub iterations: Option<u64>,
}

enum CholeskyOutcome {
    Solved(DVector<f64>),
    NotPositiveDefinite,
}

/// Runs multiplication for Conjugate Gradient Solver
struct ConjugateGradientOperator<'a> {
    a: &'a CscMatrix<f64>,
}

impl<'a> Operator for ConjugateGradientOperator<'a> {
    type Param = Vec<f64>;
    type Output = Vec<f64>;

    fn apply(&self, x: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        Ok(multiply(self.a, &DVector::from_column_slice(x))
            .data
            .as_vec()
            .clone())
    }
}

fn pivot_ratio(pivots: impl Iterator<Item = f64>) -> f64 {
    let (min, max) = pivots.fold((f64::INFINITY, 0.0_f64), |(lo, hi), p| {
        (lo.min(p.abs()), hi.max(p.abs()))
    });
    if max == 0.0 {
        0.0
    } else {
        min / max
    }
}

fn singular(method: &str, ratio: f64) -> Error {
    Error::IllPosed(format!(
        "{method} factorization is singular (pivot ratio {ratio:e}); \
         the model is under-constrained or disconnected"
    ))
}

/// Factors `a` with sparse Cholesky, rejecting near-singular factors
///
/// # Returns
/// `None` when `a` is not positive definite
fn factor_cholesky(a: &CscMatrix<f64>) -> Result<Option<CscCholesky<f64>>> {
    let factorization = match CscCholesky::factor(a) {
        Ok(f) => f,
        Err(_) => return Ok(None),
    };

    // pivots of K are the squared diagonal of L
    let ratio = pivot_ratio(
        factorization
            .l()
            .triplet_iter()
            .filter(|(row, col, _)| row == col)
            .map(|(_, _, l)| l * l),
    );
    if ratio < PIVOT_TOLERANCE {
        return Err(singular("Cholesky", ratio));
    }

    Ok(Some(factorization))
}

/// Factors `a` with sparse Cholesky and solves `a x = b`
fn run_cholesky(a: &CscMatrix<f64>, b: &DVector<f64>) -> Result<CholeskyOutcome> {
    let Some(factorization) = factor_cholesky(a)? else {
        return Ok(CholeskyOutcome::NotPositiveDefinite);
    };

    let rhs = DMatrix::from_column_slice(b.nrows(), 1, b.as_slice());
    let solution = factorization.solve(&rhs);
    Ok(CholeskyOutcome::Solved(DVector::from_column_slice(
        solution.as_slice(),
    )))
}

/// Solves `a x = b` with a dense LU factorization with partial pivoting
fn run_lu(a: &CscMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
    let lu = DMatrix::from(a).lu();

    let ratio = pivot_ratio(lu.u().diagonal().iter().copied());
    if ratio < PIVOT_TOLERANCE {
        return Err(singular("LU", ratio));
    }

    lu.solve(b).ok_or_else(|| singular("LU", 0.0))
}

/// Solves a system of equations using the conjugate gradient method.
///
/// This function returns an approximation for x in `Ax=b`, and rejects it
/// unless the true residual meets the configured tolerance. The iteration
/// itself cannot tell a singular `A` from a regular one, so `A` is checked
/// for positive definiteness first.
///
/// # Arguments
/// * `a` - A square positive definite matrix
/// * `b` - A vector of the solutions to the system
/// * `settings` - Iteration limits and logging
///
/// # Returns
/// The solution and the number of iterations taken
fn run_conjugate_gradient(
    a: &CscMatrix<f64>,
    b: &DVector<f64>,
    settings: &SolverSettings,
) -> Result<(DVector<f64>, u64)> {
    if factor_cholesky(a)?.is_none() {
        return Err(Error::IllPosed(
            "reduced stiffness matrix is not positive definite".to_owned(),
        ));
    }

    let b_norm = b.norm();
    if b_norm == 0.0 {
        return Ok((DVector::zeros(b.nrows()), 0));
    }

    let b_flat: Vec<f64> = b.iter().copied().collect();
    let solver: ConjugateGradient<_, f64> = ConjugateGradient::new(b_flat);
    let initial_guess: Vec<f64> = vec![0.0; b.nrows()];

    let operator = ConjugateGradientOperator { a };
    let target_cost = settings.cg_tolerance * b_norm;

    let mut executor = Executor::new(operator, solver).configure(|state| {
        state
            .param(initial_guess)
            .max_iters(settings.max_cg_iter)
            .target_cost(target_cost)
    });
    if settings.log_iterations {
        executor = executor.add_observer(SlogLogger::term(), ObserverMode::Always);
    }

    let res = executor
        .run()
        .map_err(|err| Error::Numerical(format!("Conjugate Gradient error: {err}")))?;

    let iterations = res.state().get_iter();
    let best_param = match &res.state().best_param {
        Some(vec) => DVector::from_column_slice(vec),
        None => {
            return Err(Error::Numerical(
                "Conjugate Gradient could not produce best parameter".to_owned(),
            ))
        }
    };

    let residual = (multiply(a, &best_param) - b).norm();
    if !(residual <= RESIDUAL_SLACK * target_cost) {
        return Err(Error::Numerical(format!(
            "Conjugate Gradient did not converge in {iterations} iterations \
             (relative residual {:e})",
            residual / b_norm
        )));
    }

    Ok((best_param, iterations))
}

/// Solves the reduced system `a x = b` with the configured strategy
///
/// # Arguments
/// * `a` - The reduced stiffness matrix `K_FF`
/// * `b` - The reduced load vector
/// * `settings` - Strategy selection
pub fn solve_linear_system(
    a: &CscMatrix<f64>,
    b: &DVector<f64>,
    settings: &SolverSettings,
) -> Result<LinearSolution> {
    if a.nrows() != a.ncols() || a.nrows() != b.nrows() {
        return Err(Error::Numerical(format!(
            "system shape mismatch: {}x{} matrix, {} loads",
            a.nrows(),
            a.ncols(),
            b.nrows()
        )));
    }
    if a.values().iter().any(|v| !v.is_finite()) {
        return Err(Error::Numerical(
            "stiffness matrix contains NaN/Inf".to_owned(),
        ));
    }
    if b.iter().any(|v| !v.is_finite()) {
        return Err(Error::Numerical("load vector contains NaN/Inf".to_owned()));
    }

    let solution = match settings.linear_solver {
        _ if a.nrows() == 0 => LinearSolution {
            values: DVector::zeros(0),
            method: LinearSolverKind::Cholesky,
            iterations: None,
        },
        LinearSolverKind::Auto => match run_cholesky(a, b)? {
            CholeskyOutcome::Solved(values) => LinearSolution {
                values,
                method: LinearSolverKind::Cholesky,
                iterations: None,
            },
            CholeskyOutcome::NotPositiveDefinite => LinearSolution {
                values: run_lu(a, b)?,
                method: LinearSolverKind::Lu,
                iterations: None,
            },
        },
        LinearSolverKind::Cholesky => match run_cholesky(a, b)? {
            CholeskyOutcome::Solved(values) => LinearSolution {
                values,
                method: LinearSolverKind::Cholesky,
                iterations: None,
            },
            CholeskyOutcome::NotPositiveDefinite => {
                return Err(Error::IllPosed(
                    "reduced stiffness matrix is not positive definite".to_owned(),
                ))
            }
        },
        LinearSolverKind::Lu => LinearSolution {
            values: run_lu(a, b)?,
            method: LinearSolverKind::Lu,
            iterations: None,
        },
        LinearSolverKind::ConjugateGradient => {
            let (values, iterations) = run_conjugate_gradient(a, b, settings)?;
            LinearSolution {
                values,
                method: LinearSolverKind::ConjugateGradient,
                iterations: Some(iterations),
            }
        }
    };

    if solution.values.iter().any(|v| !v.is_finite()) {
        return Err(Error::Numerical(
            "solution vector contains NaN/Inf".to_owned(),
        ));
    }

    Ok(solution)
}
