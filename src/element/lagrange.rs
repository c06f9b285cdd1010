//! Continuous Lagrange elements of degree 1 and 2.
//!
//! Simplices (triangles, tetrahedra) are tabulated in terms of barycentric coordinates,
//! intervals, quadrilaterals and hexahedra as tensor products of one-dimensional nodal bases.
//! Local dofs are ordered by entity: one per vertex, then one per edge (degree 2), then one
//! interior dof on quadrilaterals (degree 2).
use crate::array::Array;
use crate::cell::CellType;
use crate::element::{derivative_indices, EntityDofs};
use crate::error::{Error, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LagrangeElement {
    cell: CellType,
    degree: usize,
}

impl LagrangeElement {
    pub fn new(cell: CellType, degree: usize) -> Result<Self> {
        use CellType::*;
        let supported = match (cell, degree) {
            (Interval | Triangle | Tetrahedron | Quadrilateral, 1 | 2) => true,
            (Hexahedron, 1) => true,
            _ => false,
        };
        if supported {
            Ok(Self { cell, degree })
        } else {
            Err(Error::unsupported(format!(
                "Lagrange element of degree {} on {:?}",
                degree, cell
            )))
        }
    }

    pub fn cell_type(&self) -> CellType {
        self.cell
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn is_affine(&self) -> bool {
        self.cell.is_simplex() && self.degree == 1
    }

    pub fn dim(&self) -> usize {
        self.entity_dofs().iter().flatten().map(Vec::len).sum()
    }

    pub fn entity_dofs(&self) -> EntityDofs {
        let tdim = self.cell.topological_dimension();
        let mut dofs: EntityDofs = (0..=tdim)
            .map(|d| vec![Vec::new(); self.cell.num_sub_entities(d)])
            .collect();
        let mut next = 0;
        for vertex_dofs in dofs[0].iter_mut() {
            vertex_dofs.push(next);
            next += 1;
        }
        if self.degree == 2 {
            for edge_dofs in dofs[1].iter_mut() {
                edge_dofs.push(next);
                next += 1;
            }
            if self.cell == CellType::Quadrilateral {
                dofs[2][0].push(next);
            }
        }
        dofs
    }

    /// The reference nodes of the dofs, one per row.
    ///
    /// Every entity carries at most one dof, located at the barycenter of the entity.
    pub fn points(&self) -> DMatrix<f64> {
        let tdim = self.cell.topological_dimension();
        let vertices = self.cell.reference_vertices();
        let mut points = DMatrix::zeros(self.dim(), tdim);
        for (d, dim_dofs) in self.entity_dofs().iter().enumerate() {
            let entities = self.cell.sub_entities(d);
            for (entity, dofs) in entities.iter().zip(dim_dofs) {
                for &dof in dofs {
                    for &v in entity.iter() {
                        let mut row = points.row_mut(dof);
                        row += vertices.row(v) / entity.len() as f64;
                    }
                }
            }
        }
        points
    }

    /// Tabulates the basis and its derivatives up to order `nd` at the given points.
    ///
    /// The result has shape `(num_derivatives, num_points, dim)`, with derivatives ordered as
    /// described by [`derivative_indices`].
    pub fn tabulate(&self, nd: usize, points: &DMatrix<f64>) -> Result<Array<3>> {
        let tdim = self.cell.topological_dimension();
        if nd > 2 {
            return Err(Error::unsupported(format!(
                "tabulation of derivatives of order {}",
                nd
            )));
        }
        if points.ncols() != tdim {
            return Err(Error::invalid_argument(format!(
                "points have dimension {}, expected {}",
                points.ncols(),
                tdim
            )));
        }

        let derivatives = derivative_indices(tdim, nd);
        let dim = self.dim();
        let mut table = Array::zeros([derivatives.len(), points.nrows(), dim]);
        for p in 0..points.nrows() {
            let mut x = [0.0; 3];
            for i in 0..tdim {
                x[i] = points[(p, i)];
            }
            for (d, alpha) in derivatives.iter().enumerate() {
                let row = table.lane_mut(&[d, p]);
                match self.cell {
                    CellType::Triangle | CellType::Tetrahedron => {
                        self.tabulate_simplex(&x, tdim, alpha, row)
                    }
                    _ => self.tabulate_tensor(&x, tdim, alpha, row),
                }
            }
        }
        Ok(table)
    }

    fn tabulate_simplex(&self, x: &[f64; 3], tdim: usize, alpha: &[usize; 3], out: &mut [f64]) {
        let (lambda, grad) = barycentric(x, tdim);
        let axes = derivative_axes(alpha);
        let vertices = self.cell.sub_entities(0);
        let edges = self.cell.sub_entities(1);

        for (v, basis) in vertices.iter().zip(out.iter_mut()) {
            let (l, g) = (lambda[v[0]], &grad[v[0]]);
            *basis = match (self.degree, axes.as_slice()) {
                (1, []) => l,
                (1, [a]) => g[*a],
                (1, _) => 0.0,
                (_, []) => l * (2.0 * l - 1.0),
                (_, [a]) => (4.0 * l - 1.0) * g[*a],
                (_, [a, b]) => 4.0 * g[*a] * g[*b],
                _ => unreachable!(),
            };
        }

        if self.degree == 2 {
            for (edge, basis) in edges.iter().zip(out[vertices.len()..].iter_mut()) {
                let (la, lb) = (lambda[edge[0]], lambda[edge[1]]);
                let (ga, gb) = (&grad[edge[0]], &grad[edge[1]]);
                *basis = match axes.as_slice() {
                    [] => 4.0 * la * lb,
                    [a] => 4.0 * (lb * ga[*a] + la * gb[*a]),
                    [a, b] => 4.0 * (ga[*a] * gb[*b] + gb[*a] * ga[*b]),
                    _ => unreachable!(),
                };
            }
        }
    }

    fn tabulate_tensor(&self, x: &[f64; 3], tdim: usize, alpha: &[usize; 3], out: &mut [f64]) {
        for (node, basis) in self.tensor_nodes().iter().zip(out.iter_mut()) {
            *basis = (0..tdim)
                .map(|k| lagrange_1d(self.degree, node[k], x[k], alpha[k]))
                .product();
        }
    }

    /// One-dimensional node indices per axis for each dof of a tensor product cell.
    ///
    /// Index 0 and 1 refer to the end points, index 2 to the midpoint.
    fn tensor_nodes(&self) -> Vec<[usize; 3]> {
        match (self.cell, self.degree) {
            (CellType::Interval, 1) => vec![[0, 0, 0], [1, 0, 0]],
            (CellType::Interval, _) => vec![[0, 0, 0], [1, 0, 0], [2, 0, 0]],
            (CellType::Quadrilateral, 1) => vec![[0, 0, 0], [1, 0, 0], [0, 1, 0], [1, 1, 0]],
            (CellType::Quadrilateral, _) => vec![
                [0, 0, 0],
                [1, 0, 0],
                [0, 1, 0],
                [1, 1, 0],
                [2, 0, 0],
                [0, 2, 0],
                [1, 2, 0],
                [2, 1, 0],
                [2, 2, 0],
            ],
            (CellType::Hexahedron, _) => (0..8).map(|k| [k % 2, (k / 2) % 2, k / 4]).collect(),
            _ => unreachable!("Simplices are not tabulated as tensor products"),
        }
    }
}

/// Barycentric coordinates and their (constant) gradients on the reference simplex.
fn barycentric(x: &[f64; 3], tdim: usize) -> ([f64; 4], [[f64; 3]; 4]) {
    let mut lambda = [0.0; 4];
    let mut grad = [[0.0; 3]; 4];
    lambda[0] = 1.0 - x[..tdim].iter().sum::<f64>();
    for i in 0..tdim {
        lambda[i + 1] = x[i];
        grad[0][i] = -1.0;
        grad[i + 1][i] = 1.0;
    }
    (lambda, grad)
}

/// Expands a derivative multi-index into the list of axes it differentiates along.
fn derivative_axes(alpha: &[usize; 3]) -> Vec<usize> {
    alpha
        .iter()
        .enumerate()
        .flat_map(|(axis, &count)| std::iter::repeat(axis).take(count))
        .collect()
}

/// Derivative of the given order of the one-dimensional nodal basis function `i`.
///
/// Degree 1 uses the nodes `(0, 1)`, degree 2 the nodes `(0, 1, 0.5)`.
fn lagrange_1d(degree: usize, i: usize, x: f64, order: usize) -> f64 {
    match (degree, i, order) {
        (1, 0, 0) => 1.0 - x,
        (1, 0, 1) => -1.0,
        (1, 1, 0) => x,
        (1, 1, 1) => 1.0,
        (1, _, _) => 0.0,
        (_, 0, 0) => 2.0 * x * x - 3.0 * x + 1.0,
        (_, 0, 1) => 4.0 * x - 3.0,
        (_, 0, 2) => 4.0,
        (_, 1, 0) => 2.0 * x * x - x,
        (_, 1, 1) => 4.0 * x - 1.0,
        (_, 1, 2) => 4.0,
        (_, 2, 0) => 4.0 * x - 4.0 * x * x,
        (_, 2, 1) => 4.0 - 8.0 * x,
        (_, 2, 2) => -8.0,
        _ => 0.0,
    }
}
