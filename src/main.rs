use std::time::Instant;

use clap::{Parser, ValueEnum};
use indicatif::ProgressBar;

use planar_fem::{
    input, linear_solver::LinearSolution, post_processor, LinearSolverKind, SolveObserver,
    SolverSettings, Stage,
};

/// Solves a planar linear-elastic problem described by a JSON input file
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON problem file (mesh, material metadata, constraints and loads)
    input: String,

    /// Where to write per-node results
    #[arg(long, default_value = "nodes.csv")]
    nodes_out: String,

    /// Where to write per-element results
    #[arg(long, default_value = "elements.csv")]
    elements_out: String,

    /// Linear solver strategy
    #[arg(long, value_enum, default_value_t = SolverChoice::Auto)]
    solver: SolverChoice,

    /// Log every conjugate gradient iteration
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SolverChoice {
    Auto,
    Cholesky,
    Lu,
    Cg,
}

impl From<SolverChoice> for LinearSolverKind {
    fn from(choice: SolverChoice) -> Self {
        match choice {
            SolverChoice::Auto => LinearSolverKind::Auto,
            SolverChoice::Cholesky => LinearSolverKind::Cholesky,
            SolverChoice::Lu => LinearSolverKind::Lu,
            SolverChoice::Cg => LinearSolverKind::ConjugateGradient,
        }
    }
}

/// Prints solver progress to the terminal
struct TerminalObserver {
    requested: LinearSolverKind,
    bar: Option<ProgressBar>,
    start: Instant,
}

impl TerminalObserver {
    fn new(requested: LinearSolverKind) -> TerminalObserver {
        TerminalObserver {
            requested,
            bar: None,
            start: Instant::now(),
        }
    }
}

impl SolveObserver for TerminalObserver {
    fn stage(&mut self, stage: Stage) {
        match stage {
            Stage::BuildingElements { elements } => {
                println!("info: building element stiffness matrices...");
                self.bar = Some(ProgressBar::new(elements as u64));
            }
            Stage::Assembling { dofs } => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_with_message("done");
                }
                println!("info: building total stiffness matrix with {dofs} DOFs...");
            }
            Stage::Constraining { fixed } => {
                println!("info: eliminating {fixed} fixed DOFs...");
            }
            Stage::Solving { free } => {
                println!("info: solving for {free} free DOFs...");
                self.start = Instant::now();
            }
            Stage::RecoveringStress => println!("info: recovering element stress..."),
        }
    }

    fn element_built(&mut self, _index: usize) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    fn solved(&mut self, solution: &LinearSolution) {
        let elapsed = self.start.elapsed().as_secs_f32();
        if self.requested == LinearSolverKind::Auto && solution.method == LinearSolverKind::Lu {
            println!("warning: stiffness matrix is not positive definite, fell back to LU");
        }
        match solution.iterations {
            Some(iterations) => println!(
                "info: solved system with {:?} in {iterations} iterations, {elapsed:.3} seconds",
                solution.method
            ),
            None => println!(
                "info: solved system with {:?} in {elapsed:.3} seconds",
                solution.method
            ),
        }
    }
}

fn run(args: &Args) -> planar_fem::Result<()> {
    let problem_file = input::read_problem_file(&args.input)?;
    println!(
        "info: loaded {} nodes, {} elements and {} boundary rules",
        problem_file.nodes.len(),
        problem_file.elements.len(),
        problem_file.rule_count
    );

    let settings = SolverSettings {
        linear_solver: args.solver.into(),
        log_iterations: args.verbose,
        ..SolverSettings::default()
    };
    let mut observer = TerminalObserver::new(settings.linear_solver);

    let output = planar_fem::solve_with(
        &problem_file.problem(),
        &problem_file.material,
        &settings,
        &mut observer,
    )?;

    let max_disp = output
        .disp
        .iter()
        .map(|u| f64::hypot(u[0], u[1]))
        .fold(0.0, f64::max);
    let max_von_mises = output
        .stress
        .iter()
        .map(|s| s.von_mises())
        .fold(0.0, f64::max);
    println!("info: max displacement {max_disp:e}, max von Mises stress {max_von_mises:e}");

    post_processor::csv_output(
        &problem_file.nodes,
        &problem_file.elements,
        &output,
        &args.nodes_out,
        &args.elements_out,
    )?;
    println!(
        "info: wrote output to {} and {}",
        args.nodes_out, args.elements_out
    );

    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(err) = run(&args) {
        eprintln!("error: {err}");
        std::process::exit(1)
    }
}
