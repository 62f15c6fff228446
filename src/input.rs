use json::JsonValue;

use crate::{
    datatypes::{Material, PlaneCondition, Problem, DOF},
    error::{Error, Result},
};

/// Axis-aligned region a boundary rule applies to. Bounds are exclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryRegion {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl BoundaryRegion {
    fn contains(&self, x: f64, y: f64) -> bool {
        x > self.x_min && x < self.x_max && y > self.y_min && y < self.y_max
    }
}

/// What a rule does to one axis of every node in its region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AxisTarget {
    Displacement(f64),
    Force(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryRule {
    pub name: String,
    pub region: BoundaryRegion,
    /// x and y targets; `None` leaves that axis alone.
    pub targets: [Option<AxisTarget>; DOF],
}

/// A problem read from a JSON input file. Owns its arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemFile {
    pub nodes: Vec<[f64; 2]>,
    pub elements: Vec<Vec<usize>>,
    pub fixed_dofs: Vec<usize>,
    pub prescribed_values: Vec<f64>,
    pub forces: Vec<f64>,
    pub material: Material,
    /// Number of boundary rules that were applied.
    pub rule_count: usize,
}

impl ProblemFile {
    pub fn problem(&self) -> Problem<'_> {
        Problem {
            nodes: &self.nodes,
            elements: &self.elements,
            fixed_dofs: &self.fixed_dofs,
            prescribed_values: &self.prescribed_values,
            forces: &self.forces,
        }
    }
}

/// Parses the input json into a JsonValue object
///
/// # Arguments
/// * `input_file` - The path to the input file
pub fn load_input_file(input_file: &str) -> Result<JsonValue> {
    let file_string = std::fs::read_to_string(input_file)
        .map_err(|err| Error::Input(format!("Unable to open input file {input_file}: {err}")))?;

    json::parse(&file_string)
        .map_err(|err| Error::Input(format!("Error in input file json: {err}")))
}

/// Parses Model Metadata from the input_json
///
/// # Arguments
/// * `input_json`: The input file as a JsonValue object
///
/// # Returns
/// A validated Material
fn parse_input_metadata(input_json: &JsonValue) -> Result<Material> {
    if !input_json.has_key("metadata") {
        return Err(Error::Input("Input json missing metadata field".to_string()));
    }
    let metadata = &input_json["metadata"];

    let field = |key: &str| {
        metadata[key].as_f64().ok_or_else(|| {
            Error::Input(format!("Input json missing {key} field in metadata section"))
        })
    };

    let plane = match metadata["plane"].as_str() {
        None | Some("stress") => PlaneCondition::Stress,
        Some("strain") => PlaneCondition::Strain,
        Some(other) => {
            return Err(Error::Input(format!(
                "Unknown plane condition '{other}', expected 'stress' or 'strain'"
            )))
        }
    };

    let material = Material {
        youngs_modulus: field("material_elasticity")?,
        poisson_ratio: field("poisson_ratio")?,
        part_thickness: field("part_thickness")?,
        plane,
    };
    material.validate()?;

    Ok(material)
}

fn parse_f64_array(value: &JsonValue, what: &str) -> Result<Vec<f64>> {
    if !value.is_array() {
        return Err(Error::Input(format!("{what} must be an array of numbers")));
    }
    value
        .members()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64()
                .ok_or_else(|| Error::Input(format!("{what} entry {i} is not a number")))
        })
        .collect()
}

fn parse_index_array(value: &JsonValue, what: &str) -> Result<Vec<usize>> {
    if !value.is_array() {
        return Err(Error::Input(format!("{what} must be an array of indices")));
    }
    value
        .members()
        .enumerate()
        .map(|(i, v)| {
            v.as_usize().ok_or_else(|| {
                Error::Input(format!("{what} entry {i} is not a non-negative integer"))
            })
        })
        .collect()
}

fn parse_nodes(input_json: &JsonValue) -> Result<Vec<[f64; 2]>> {
    if !input_json["nodes"].is_array() {
        return Err(Error::Input("Input json missing nodes array".to_owned()));
    }
    input_json["nodes"]
        .members()
        .enumerate()
        .map(|(i, node)| match parse_f64_array(node, "node")?.as_slice() {
            [x, y] => Ok([*x, *y]),
            _ => Err(Error::Input(format!("node {i} must be an [x, y] pair"))),
        })
        .collect()
}

fn parse_elements(input_json: &JsonValue) -> Result<Vec<Vec<usize>>> {
    if !input_json["elements"].is_array() {
        return Err(Error::Input("Input json missing elements array".to_owned()));
    }
    input_json["elements"]
        .members()
        .map(|element| parse_index_array(element, "element"))
        .collect()
}

fn parse_bound(region: &JsonValue, key: &str, name: &str, default: f64) -> Result<f64> {
    if !region.has_key(key) {
        return Ok(default);
    }
    region[key]
        .as_f64()
        .ok_or_else(|| Error::Input(format!("Bad value for {key} in {name}")))
}

fn parse_axis(
    targets: &JsonValue,
    name: &str,
    displacement_key: &str,
    force_key: &str,
) -> Result<Option<AxisTarget>> {
    let read = |key: &str| -> Result<Option<f64>> {
        if !targets.has_key(key) {
            return Ok(None);
        }
        targets[key]
            .as_f64()
            .map(Some)
            .ok_or_else(|| Error::Input(format!("Bad value for {key} in {name}")))
    };

    match (read(displacement_key)?, read(force_key)?) {
        (Some(_), Some(_)) => Err(Error::Input(format!(
            "Boundary '{name}' is over-constrained: both {displacement_key} and {force_key} are set"
        ))),
        (Some(u), None) => Ok(Some(AxisTarget::Displacement(u))),
        (None, Some(f)) => Ok(Some(AxisTarget::Force(f))),
        (None, None) => Ok(None),
    }
}

/// Reads the boundary rules from the input json, in file order
pub fn parse_boundary_rules(input_json: &JsonValue) -> Result<Vec<BoundaryRule>> {
    let mut rules: Vec<BoundaryRule> = Vec::new();

    for (name, rule_json) in input_json["boundary_conditions"].entries() {
        if !rule_json.has_key("region") {
            return Err(Error::Input(format!(
                "Boundary rule {name} is missing region field"
            )));
        }
        if !rule_json.has_key("targets") {
            return Err(Error::Input(format!(
                "Boundary rule {name} is missing targets field"
            )));
        }

        let region_json = &rule_json["region"];
        let region = BoundaryRegion {
            x_min: parse_bound(region_json, "x_target_min", name, f64::MIN)?,
            x_max: parse_bound(region_json, "x_target_max", name, f64::MAX)?,
            y_min: parse_bound(region_json, "y_target_min", name, f64::MIN)?,
            y_max: parse_bound(region_json, "y_target_max", name, f64::MAX)?,
        };
        if region.x_min > region.x_max {
            return Err(Error::Input(format!(
                "Boundary '{name}' has x_target_min greater than x_target_max"
            )));
        }
        if region.y_min > region.y_max {
            return Err(Error::Input(format!(
                "Boundary '{name}' has y_target_min greater than y_target_max"
            )));
        }

        let targets = [
            parse_axis(&rule_json["targets"], name, "ux", "fx")?,
            parse_axis(&rule_json["targets"], name, "uy", "fy")?,
        ];
        if targets.iter().all(Option::is_none) {
            return Err(Error::Input(format!(
                "Boundary '{name}' sets none of ux, uy, fx, fy"
            )));
        }

        rules.push(BoundaryRule {
            name: name.to_string(),
            region,
            targets,
        });
    }

    Ok(rules)
}

/// Applies boundary rules to the mesh nodes
///
/// A later rule overrides an earlier one on the same node and axis. Fixed
/// DOFs are appended in ascending order; forces are added to `forces`. A
/// rule force on a DOF already listed in `fixed_dofs` is over-constrained.
pub fn apply_boundary_conditions(
    rules: &[BoundaryRule],
    nodes: &[[f64; 2]],
    fixed_dofs: &mut Vec<usize>,
    prescribed_values: &mut Vec<f64>,
    forces: &mut [f64],
) -> Result<()> {
    let mut dof_targets: Vec<Option<(AxisTarget, &str)>> = vec![None; DOF * nodes.len()];

    for (i, node) in nodes.iter().enumerate() {
        for rule in rules {
            if !rule.region.contains(node[0], node[1]) {
                continue;
            }
            for (axis, target) in rule.targets.iter().enumerate() {
                if let Some(target) = target {
                    dof_targets[DOF * i + axis] = Some((*target, rule.name.as_str()));
                }
            }
        }
    }

    for (dof, target) in dof_targets.into_iter().enumerate() {
        match target {
            Some((AxisTarget::Displacement(u), _)) => {
                fixed_dofs.push(dof);
                prescribed_values.push(u);
            }
            Some((AxisTarget::Force(_), name)) if fixed_dofs.contains(&dof) => {
                return Err(Error::Input(format!(
                    "Boundary '{name}' is over-constrained: it loads DOF {dof}, \
                     which fixed_dofs already constrains"
                )));
            }
            Some((AxisTarget::Force(f), _)) => forces[dof] += f,
            None => {}
        }
    }

    Ok(())
}

/// Builds a problem from a parsed input json
pub fn parse_problem(input_json: &JsonValue) -> Result<ProblemFile> {
    let material = parse_input_metadata(input_json)?;
    let nodes = parse_nodes(input_json)?;
    let elements = parse_elements(input_json)?;

    let optional = |key: &str| !input_json[key].is_null();

    let mut fixed_dofs = if optional("fixed_dofs") {
        parse_index_array(&input_json["fixed_dofs"], "fixed_dofs")?
    } else {
        Vec::new()
    };
    let mut prescribed_values = if optional("prescribed_values") {
        parse_f64_array(&input_json["prescribed_values"], "prescribed_values")?
    } else {
        vec![0.0; fixed_dofs.len()]
    };
    let mut forces = if optional("forces") {
        parse_f64_array(&input_json["forces"], "forces")?
    } else {
        vec![0.0; DOF * nodes.len()]
    };
    if forces.len() != DOF * nodes.len() {
        return Err(Error::Input(format!(
            "forces has {} entries, expected {}",
            forces.len(),
            DOF * nodes.len()
        )));
    }

    let rules = parse_boundary_rules(input_json)?;
    apply_boundary_conditions(
        &rules,
        &nodes,
        &mut fixed_dofs,
        &mut prescribed_values,
        &mut forces,
    )?;

    Ok(ProblemFile {
        nodes,
        elements,
        fixed_dofs,
        prescribed_values,
        forces,
        material,
        rule_count: rules.len(),
    })
}

/// Reads and parses a problem file
pub fn read_problem_file(input_file: &str) -> Result<ProblemFile> {
    parse_problem(&load_input_file(input_file)?)
}
