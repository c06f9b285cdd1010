//! Lowest-order Nédélec (first kind) and Raviart–Thomas elements as Whitney forms.
//!
//! The basis function of edge `(a, b)` (local vertices, `a < b`) is
//! `phi = lambda_a grad(lambda_b) - lambda_b grad(lambda_a)`, whose tangential component is
//! oriented from `a` to `b`. Raviart–Thomas functions on triangles are the Nédélec functions
//! rotated by a quarter turn. Because the orientation is local, neighboring cells disagree
//! on the sign of a shared edge unless the basis is reflected according to the cell
//! permutation info.
use crate::array::Array;
use crate::cell::CellType;
use crate::element::{derivative_indices, EntityDofs, MapType};
use crate::error::{Error, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WhitneyFamily {
    Nedelec,
    RaviartThomas,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WhitneyElement {
    family: WhitneyFamily,
    cell: CellType,
}

impl WhitneyElement {
    pub fn nedelec(cell: CellType) -> Result<Self> {
        match cell {
            CellType::Triangle | CellType::Tetrahedron => Ok(Self {
                family: WhitneyFamily::Nedelec,
                cell,
            }),
            _ => Err(Error::unsupported(format!("Nédélec element on {:?}", cell))),
        }
    }

    pub fn raviart_thomas(cell: CellType) -> Result<Self> {
        match cell {
            CellType::Triangle => Ok(Self {
                family: WhitneyFamily::RaviartThomas,
                cell,
            }),
            _ => Err(Error::unsupported(format!("Raviart–Thomas element on {:?}", cell))),
        }
    }

    pub fn family(&self) -> WhitneyFamily {
        self.family
    }

    pub fn cell_type(&self) -> CellType {
        self.cell
    }

    pub fn dim(&self) -> usize {
        self.cell.num_sub_entities(1)
    }

    pub fn reference_value_size(&self) -> usize {
        self.cell.topological_dimension()
    }

    pub fn map_type(&self) -> MapType {
        match self.family {
            WhitneyFamily::Nedelec => MapType::CovariantPiola,
            WhitneyFamily::RaviartThomas => MapType::ContravariantPiola,
        }
    }

    pub fn entity_dofs(&self) -> EntityDofs {
        let tdim = self.cell.topological_dimension();
        let mut dofs: EntityDofs = (0..=tdim)
            .map(|d| vec![Vec::new(); self.cell.num_sub_entities(d)])
            .collect();
        for (e, edge_dofs) in dofs[1].iter_mut().enumerate() {
            edge_dofs.push(e);
        }
        dofs
    }

    /// Tabulates the basis at the given points, with shape
    /// `(num_derivatives, num_points, dim, tdim)`.
    ///
    /// The basis is affine, so derivatives of order two vanish.
    pub fn tabulate(&self, nd: usize, points: &DMatrix<f64>) -> Result<Array<4>> {
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
        let edges = self.cell.sub_entities(1);
        let mut table = Array::zeros([derivatives.len(), points.nrows(), edges.len(), tdim]);
        // The barycentric gradients are constant on the reference cell
        let grad = |v: usize, i: usize| match v {
            0 => -1.0,
            _ if v == i + 1 => 1.0,
            _ => 0.0,
        };
        let lambda = |p: usize, v: usize| match v {
            0 => 1.0 - points.row(p).sum(),
            _ => points[(p, v - 1)],
        };

        for p in 0..points.nrows() {
            for (d, alpha) in derivatives.iter().enumerate() {
                let order: usize = alpha.iter().sum();
                if order > 1 {
                    continue;
                }
                let axis = alpha.iter().position(|&a| a == 1);
                for (e, edge) in edges.iter().enumerate() {
                    let (a, b) = (edge[0], edge[1]);
                    let mut phi = [0.0; 3];
                    for c in 0..tdim {
                        phi[c] = match axis {
                            None => lambda(p, a) * grad(b, c) - lambda(p, b) * grad(a, c),
                            Some(s) => grad(a, s) * grad(b, c) - grad(b, s) * grad(a, c),
                        };
                    }
                    let values = table.lane_mut(&[d, p, e]);
                    match self.family {
                        WhitneyFamily::Nedelec => values.copy_from_slice(&phi[..tdim]),
                        WhitneyFamily::RaviartThomas => {
                            values[0] = phi[1];
                            values[1] = -phi[0];
                        }
                    }
                }
            }
        }
        Ok(table)
    }

    /// Reflects the basis functions of edges whose orientation in the cell disagrees with the
    /// global (low-to-high vertex index) orientation.
    ///
    /// `data` holds one row of `ncols` entries per local dof.
    pub fn apply_dof_transformation(&self, data: &mut [f64], cell_info: u32, ncols: usize) {
        for e in 0..self.dim() {
            if (cell_info >> self.cell.edge_reflection_bit(e)) & 1 == 1 {
                for value in &mut data[e * ncols..(e + 1) * ncols] {
                    *value = -*value;
                }
            }
        }
    }
}
