//! Basic procedural mesh generation routines.
use crate::cell::CellType;
use crate::coordinate_map::CoordinateMap;
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use itertools::Itertools;
use std::f64::consts::PI;

/// A uniform mesh of `[0, 1]` with `num_cells` intervals.
pub fn create_unit_interval(num_cells: usize) -> Result<Mesh> {
    let h = 1.0 / num_cells as f64;
    let coordinates: Vec<f64> = (0..=num_cells).map(|i| i as f64 * h).collect();
    let cells = (0..num_cells).flat_map(|i| [i, i + 1]).collect();
    Mesh::new(CoordinateMap::new(CellType::Interval, 1)?, 1, &coordinates, cells)
}

/// A uniform mesh of `[0, 1]^2` with `nx x ny` squares, each square either kept as a
/// quadrilateral or split into two triangles along its diagonal.
pub fn create_unit_square(nx: usize, ny: usize, cell_type: CellType) -> Result<Mesh> {
    let idx = |i: usize, j: usize| (nx + 1) * j + i;
    let coordinates: Vec<f64> = (0..=ny)
        .cartesian_product(0..=nx)
        .flat_map(|(j, i)| [i as f64 / nx as f64, j as f64 / ny as f64])
        .collect();

    let mut cells = Vec::new();
    for j in 0..ny {
        for i in 0..nx {
            let (v00, v10, v01, v11) = (idx(i, j), idx(i + 1, j), idx(i, j + 1), idx(i + 1, j + 1));
            match cell_type {
                CellType::Triangle => cells.extend([v00, v10, v11, v00, v01, v11]),
                CellType::Quadrilateral => cells.extend([v00, v10, v01, v11]),
                _ => return Err(unsupported_cell(cell_type, "unit square")),
            }
        }
    }
    Mesh::new(CoordinateMap::new(cell_type, 1)?, 2, &coordinates, cells)
}

/// A uniform mesh of `[0, 1]^3` with `n^3` cubes, each cube either kept as a hexahedron or
/// split into six tetrahedra sharing the main diagonal.
pub fn create_unit_cube(n: usize, cell_type: CellType) -> Result<Mesh> {
    let idx = |i: usize, j: usize, k: usize| (n + 1) * (n + 1) * k + (n + 1) * j + i;
    let h = 1.0 / n as f64;
    let coordinates: Vec<f64> = (0..=n)
        .cartesian_product(0..=n)
        .cartesian_product(0..=n)
        .flat_map(|((k, j), i)| [i as f64 * h, j as f64 * h, k as f64 * h])
        .collect();

    let mut cells = Vec::new();
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                // Corner c of the cube has offsets given by its bits (x fastest)
                let corner = |c: usize| idx(i + (c & 1), j + ((c >> 1) & 1), k + ((c >> 2) & 1));
                match cell_type {
                    CellType::Hexahedron => cells.extend((0..8).map(corner)),
                    CellType::Tetrahedron => {
                        for axes in (0..3).permutations(3) {
                            let first = 1 << axes[0];
                            let second = first | (1 << axes[1]);
                            cells.extend([corner(0), corner(first), corner(second), corner(7)]);
                        }
                    }
                    _ => return Err(unsupported_cell(cell_type, "unit cube")),
                }
            }
        }
    }
    Mesh::new(CoordinateMap::new(cell_type, 1)?, 3, &coordinates, cells)
}

/// Converts a mesh of affine triangles into a mesh with a quadratic coordinate map, adding a
/// node at the midpoint of every edge.
pub fn convert_to_quadratic_triangles(mesh: &Mesh) -> Result<Mesh> {
    let cmap = mesh.geometry().cmap();
    if cmap.cell_type() != CellType::Triangle || cmap.degree() != 1 {
        return Err(Error::invalid_argument("expected a mesh of affine triangles"));
    }
    let gdim = mesh.gdim();
    let geometry = mesh.geometry();
    let topology = mesh.topology();
    let num_nodes = geometry.num_nodes();

    let mut coordinates: Vec<f64> = geometry
        .x()
        .chunks_exact(3)
        .flat_map(|x| x[..gdim].to_vec())
        .collect();

    // The vertices of an edge are topology vertices, the nodes of a cell are geometry nodes
    let cell_edges = topology.connectivity(2, 1);
    let num_edges = topology.num_entities(1);
    let mut edge_midpoint: Vec<Option<Vec<f64>>> = vec![None; num_edges];
    let mut cells = Vec::with_capacity(mesh.num_cells() * 6);
    for cell in 0..mesh.num_cells() {
        let nodes = geometry.dofmap().links(cell);
        cells.extend_from_slice(nodes);
        for (local, edge) in CellType::Triangle.sub_entities(1).iter().enumerate() {
            let global_edge = cell_edges.links(cell)[local];
            if edge_midpoint[global_edge].is_none() {
                let (a, b) = (3 * nodes[edge[0]], 3 * nodes[edge[1]]);
                let x = geometry.x();
                edge_midpoint[global_edge] = Some((0..gdim).map(|j| 0.5 * (x[a + j] + x[b + j])).collect());
            }
            cells.push(num_nodes + global_edge);
        }
    }
    for midpoint in edge_midpoint.into_iter() {
        match midpoint {
            Some(x) => coordinates.extend(x),
            None => return Err(Error::invalid_argument("edge not attached to any cell")),
        }
    }

    Mesh::new(CoordinateMap::new(CellType::Triangle, 2)?, gdim, &coordinates, cells)
}

/// A quadratic triangle mesh of the unit square whose edge midpoints are displaced by
/// `amplitude * sin(pi x) sin(pi y) (1, 1/2)`, which curves the interior edges.
pub fn create_curved_unit_square(n: usize, amplitude: f64) -> Result<Mesh> {
    let mut mesh = convert_to_quadratic_triangles(&create_unit_square(n, n, CellType::Triangle)?)?;
    let num_vertices = (n + 1) * (n + 1);
    let x = mesh.geometry_mut().x_mut();
    for node in x.chunks_exact_mut(3).skip(num_vertices) {
        let bump = amplitude * (PI * node[0]).sin() * (PI * node[1]).sin();
        node[0] += bump;
        node[1] += 0.5 * bump;
    }
    Ok(mesh)
}

fn unsupported_cell(cell_type: CellType, domain: &str) -> Error {
    Error::unsupported(format!("{:?} cells for a {} mesh", cell_type, domain))
}
