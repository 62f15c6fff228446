use std::io::Write;

use crate::{
    datatypes::SolverOutput,
    error::{Error, Result},
};

fn write_err(target: &str, err: std::io::Error) -> Error {
    Error::Output(format!("Failed to write {target}: {err}"))
}

/// Writes the nodal results as CSV: position, displacement and averaged stress
pub fn write_nodes_csv<W: Write>(
    mut out: W,
    nodes: &[[f64; 2]],
    output: &SolverOutput,
) -> std::io::Result<()> {
    writeln!(out, "x,y,ux,uy,sx,sy,txy")?;
    for ((node, u), s) in nodes.iter().zip(&output.disp).zip(&output.nodal_stress) {
        writeln!(
            out,
            "{x},{y},{ux},{uy},{sx},{sy},{txy}",
            x = node[0],
            y = node[1],
            ux = u[0],
            uy = u[1],
            sx = s.sx,
            sy = s.sy,
            txy = s.txy,
        )?;
    }
    out.flush()
}

/// Writes the element results as CSV: connectivity, stress and von Mises
/// stress. The connectivity columns cover the widest element in the mesh;
/// narrower rows leave the extra columns empty.
pub fn write_elements_csv<W: Write>(
    mut out: W,
    elements: &[Vec<usize>],
    output: &SolverOutput,
) -> std::io::Result<()> {
    let width = elements.iter().map(Vec::len).max().unwrap_or(0);

    let header: Vec<String> = (0..width).map(|i| format!("n{i}")).collect();
    writeln!(out, "{},sx,sy,txy,von_mises", header.join(","))?;

    for (element, s) in elements.iter().zip(&output.stress) {
        let columns: Vec<String> = (0..width)
            .map(|i| element.get(i).map(usize::to_string).unwrap_or_default())
            .collect();
        writeln!(
            out,
            "{nodes},{sx},{sy},{txy},{vm}",
            nodes = columns.join(","),
            sx = s.sx,
            sy = s.sy,
            txy = s.txy,
            vm = s.von_mises(),
        )?;
    }
    out.flush()
}

/// Writes simulation results to two CSV files
///
/// # Arguments
/// * `nodes` - The mesh nodes
/// * `elements` - The mesh elements
/// * `output` - The solver output for that mesh
/// * `nodes_output` - The filename of the output nodes csv
/// * `elements_output` - The filename of the output elements csv
pub fn csv_output(
    nodes: &[[f64; 2]],
    elements: &[Vec<usize>],
    output: &SolverOutput,
    nodes_output: &str,
    elements_output: &str,
) -> Result<()> {
    let nodes_file =
        std::fs::File::create(nodes_output).map_err(|err| write_err(nodes_output, err))?;
    write_nodes_csv(std::io::BufWriter::new(nodes_file), nodes, output)
        .map_err(|err| write_err(nodes_output, err))?;

    let elements_file =
        std::fs::File::create(elements_output).map_err(|err| write_err(elements_output, err))?;
    write_elements_csv(std::io::BufWriter::new(elements_file), elements, output)
        .map_err(|err| write_err(elements_output, err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::Stress;

    fn output() -> SolverOutput {
        SolverOutput {
            disp: vec![[0.0, 0.0], [0.5, -0.25], [0.0, 0.0]],
            stress: vec![Stress { sx: 3.0, sy: 0.0, txy: 0.0 }],
            strain: vec![Default::default()],
            nodal_stress: vec![Stress { sx: 3.0, sy: 0.0, txy: 0.0 }; 3],
            reactions: vec![],
        }
    }

    #[test]
    fn nodes_csv_has_one_row_per_node() {
        let mut buffer = Vec::new();
        write_nodes_csv(&mut buffer, &[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]], &output()).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "x,y,ux,uy,sx,sy,txy");
        assert_eq!(lines[2], "1,0,0.5,-0.25,3,0,0");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn elements_csv_pads_mixed_meshes() {
        let mut buffer = Vec::new();
        let out = SolverOutput {
            stress: vec![Stress { sx: 3.0, sy: 0.0, txy: 0.0 }; 2],
            ..output()
        };
        write_elements_csv(&mut buffer, &[vec![0, 1, 2], vec![0, 1, 2, 3, 4, 5]], &out).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "n0,n1,n2,n3,n4,n5,sx,sy,txy,von_mises");
        assert_eq!(lines[1], "0,1,2,,,,3,0,0,3");
    }
}
