use approx::assert_relative_eq;
use planar_fem::{input, post_processor, solve_with, NoopObserver, SolverSettings};

const CANTILEVER: &str = r#"{
    "metadata": {
        "material_elasticity": 1000.0,
        "poisson_ratio": 0.0,
        "part_thickness": 1.0
    },
    "nodes": [[0, 0], [4, 0], [4, 2], [0, 2], [2, 1]],
    "elements": [[0, 1, 4], [1, 2, 4], [2, 3, 4], [3, 0, 4]],
    "boundary_conditions": {
        "wall": {
            "region": { "x_target_max": 0.1 },
            "targets": { "ux": 0 }
        },
        "pin": {
            "region": { "x_target_max": 0.1, "y_target_max": 0.1 },
            "targets": { "uy": 0 }
        },
        "pull": {
            "region": { "x_target_min": 3.9 },
            "targets": { "fx": 10 }
        }
    }
}"#;

#[test]
fn boundary_rules_drive_a_full_solve() {
    let problem_file = input::parse_problem(&json::parse(CANTILEVER).unwrap()).unwrap();
    assert_eq!(problem_file.fixed_dofs, vec![0, 1, 6]);
    assert_eq!(problem_file.rule_count, 3);

    let output = solve_with(
        &problem_file.problem(),
        &problem_file.material,
        &SolverSettings::default(),
        &mut NoopObserver,
    )
    .unwrap();

    // 20 units of load over a height of 2
    for s in &output.stress {
        assert_relative_eq!(s.sx, 10.0, max_relative = 1e-9);
    }
    assert_relative_eq!(output.disp[1][0], 10.0 / 1000.0 * 4.0, max_relative = 1e-9);
}

#[test]
fn results_are_written_as_csv() {
    let dir = std::env::temp_dir().join(format!("planar-fem-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let input_path = dir.join("problem.json");
    std::fs::write(&input_path, CANTILEVER).unwrap();

    let problem_file = input::read_problem_file(input_path.to_str().unwrap()).unwrap();
    let output = solve_with(
        &problem_file.problem(),
        &problem_file.material,
        &SolverSettings::default(),
        &mut NoopObserver,
    )
    .unwrap();

    let nodes_path = dir.join("nodes.csv");
    let elements_path = dir.join("elements.csv");
    post_processor::csv_output(
        &problem_file.nodes,
        &problem_file.elements,
        &output,
        nodes_path.to_str().unwrap(),
        elements_path.to_str().unwrap(),
    )
    .unwrap();

    let nodes_csv = std::fs::read_to_string(&nodes_path).unwrap();
    assert_eq!(nodes_csv.lines().count(), 1 + 5);
    assert!(nodes_csv.starts_with("x,y,ux,uy,sx,sy,txy"));

    let elements_csv = std::fs::read_to_string(&elements_path).unwrap();
    assert_eq!(elements_csv.lines().count(), 1 + 4);
    assert!(elements_csv.starts_with("n0,n1,n2,sx,sy,txy,von_mises"));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn missing_input_file_is_an_input_error() {
    let err = input::read_problem_file("/nonexistent/planar-fem/problem.json").unwrap_err();
    assert!(matches!(err, planar_fem::Error::Input(_)));
}
