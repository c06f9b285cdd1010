//! Evaluation of finite element basis functions at physical points.
//!
//! Physical points are pulled back into the reference cell, where the element is tabulated.
//! The reference values are then corrected for the orientation of the cell (dof
//! transformation) and mapped to the physical cell (push-forward), in that order.
//!
//! Derivatives are taken with respect to the reference coordinates: the push-forward is applied
//! to each derivative slab as if it were a value.
use crate::array::Array;
use crate::coordinate_map::CoordinateMap;
use crate::element::{FiniteElement, MapType};
use crate::error::{Error, Result};
use crate::geometry_map::{GeometryMap, JacobianData};
use crate::space::FunctionSpace;
use log::trace;
use nalgebra::DMatrix;

/// Physical basis values at a set of points in a single cell, and the Jacobians used to
/// compute them.
#[derive(Debug, Clone, PartialEq)]
pub struct BasisEvaluation {
    pub jacobians: JacobianData,
    /// Shape `(num_derivatives * tdim + 1, num_points, space_dimension * bs, value_size * bs)`.
    pub values: Array<4>,
}

fn check_num_derivatives(num_derivatives: usize) -> Result<()> {
    if num_derivatives > 1 {
        Err(Error::unsupported(format!(
            "basis evaluation with derivatives of order {}",
            num_derivatives
        )))
    } else {
        Ok(())
    }
}

fn map_type(element: &FiniteElement) -> Result<MapType> {
    element
        .map_type()
        .ok_or_else(|| Error::unsupported("basis evaluation of a mixed element, extract the sub-spaces first"))
}

/// Evaluates the basis of `element` at the physical points `x` (`num_points x gdim`) of a
/// cell with the given coordinate dofs and permutation info.
///
/// Blocked elements are expanded: scalar basis function `i` in block `b` becomes basis
/// function `i * bs + b`, which is non-zero only in value component `j * bs + b`.
///
/// A negative `cell` produces zero basis values (and zero Jacobians) of the full shape.
pub fn get_basis_functions(
    x: &DMatrix<f64>,
    coordinate_dofs: &DMatrix<f64>,
    cell: i32,
    perm: u32,
    element: &FiniteElement,
    cmap: &CoordinateMap,
    num_derivatives: usize,
) -> Result<BasisEvaluation> {
    check_num_derivatives(num_derivatives)?;
    let map = map_type(element)?;

    let num_points = x.nrows();
    let tdim = cmap.topological_dimension();
    let gdim = coordinate_dofs.ncols();
    let bs = element.block_size();
    let rvs = element.base_reference_value_size();
    let vs = element.base_value_size(gdim);
    let space_dimension = element.base_space_dimension();
    let nd = num_derivatives * tdim + 1;

    let mut values = Array::zeros([nd, num_points, space_dimension * bs, vs * bs]);
    if cell < 0 {
        return Ok(BasisEvaluation {
            jacobians: JacobianData::zeros(num_points, gdim, tdim),
            values,
        });
    }

    let pull_back = GeometryMap::new(cmap)?
        .pull_back(x, coordinate_dofs)
        .map_err(|err| err.in_cell(cell as usize))?;
    let table = element.tabulate(num_derivatives, &pull_back.reference_points_matrix())?;
    let jacobians = pull_back.jacobians;

    let mut reference = vec![0.0; space_dimension * rvs];
    let mut physical = vec![0.0; space_dimension * vs];
    for q in 0..num_points {
        let (j, k) = (jacobians.j(q), jacobians.k(q));
        for d in 0..nd {
            reference.copy_from_slice(table.lane(&[d, q]));
            element.apply_dof_transformation(&mut reference, perm, rvs);
            map.push_forward(&reference, &mut physical, space_dimension, &j, jacobians.det_j[q], &k);

            for block in 0..bs {
                for i in 0..space_dimension {
                    for c in 0..vs {
                        values[[d, q, i * bs + block, c * bs + block]] = physical[i * vs + c];
                    }
                }
            }
        }
    }

    Ok(BasisEvaluation { jacobians, values })
}

/// The shape `(num_derivatives * tdim + 1, num_points, space_dimension, value_size)` of the
/// output of [`evaluate_basis_functions`], per block of the element.
pub fn evaluate_basis_shape(space: &FunctionSpace, num_points: usize, num_derivatives: usize) -> [usize; 4] {
    let mesh = space.mesh();
    let element = space.element();
    [
        num_derivatives * mesh.tdim() + 1,
        num_points,
        element.base_space_dimension(),
        element.base_value_size(mesh.gdim()),
    ]
}

/// Evaluates the (unblocked) basis of a function space at arbitrary physical points, each
/// located in its own cell.
///
/// Point `p` (row `p` of `x`) is pulled back through `cells[p]`. Entries for negative cell
/// indices are set to zero.
pub fn evaluate_basis_functions(
    space: &FunctionSpace,
    x: &DMatrix<f64>,
    cells: &[i32],
    basis_values: &mut Array<4>,
    num_derivatives: usize,
) -> Result<()> {
    check_num_derivatives(num_derivatives)?;
    if x.nrows() != cells.len() {
        return Err(Error::invalid_argument(format!(
            "number of points ({}) and number of cells ({}) must be equal",
            x.nrows(),
            cells.len()
        )));
    }
    if x.nrows() != basis_values.shape()[1] {
        return Err(Error::invalid_argument(format!(
            "basis value array holds {} points, but {} points were given",
            basis_values.shape()[1],
            x.nrows()
        )));
    }
    if x.nrows() == 0 {
        return Ok(());
    }

    let element = space.element();
    if element.is_mixed() {
        return Err(Error::unsupported(
            "basis evaluation of a mixed function space, extract the sub-spaces first",
        ));
    }
    let map = map_type(element)?;
    let expected_shape = evaluate_basis_shape(space, x.nrows(), num_derivatives);
    if basis_values.shape() != expected_shape {
        return Err(Error::invalid_argument(format!(
            "basis value array has shape {:?}, expected {:?}",
            basis_values.shape(),
            expected_shape
        )));
    }

    let mesh = space.mesh();
    let geometry = mesh.geometry();
    let cmap = geometry.cmap();
    let (tdim, gdim) = (mesh.tdim(), mesh.gdim());
    if x.ncols() != gdim {
        return Err(Error::invalid_argument(format!(
            "points have dimension {}, expected {}",
            x.ncols(),
            gdim
        )));
    }
    if let Some(&cell) = cells.iter().find(|&&c| c >= 0 && c as usize >= mesh.num_cells()) {
        return Err(Error::invalid_argument(format!("cell {} is out of range", cell)));
    }

    let cell_info = if element.needs_dof_transformations() {
        Some(mesh.topology().cell_permutation_info())
    } else {
        None
    };

    let geometry_map = GeometryMap::new(cmap)?;
    let mut coordinate_dofs = DMatrix::zeros(cmap.dim(), gdim);
    let mut reference_points = DMatrix::zeros(x.nrows(), tdim);
    let mut jacobians = JacobianData::zeros(x.nrows(), gdim, tdim);
    for (p, &cell) in cells.iter().enumerate() {
        if cell < 0 {
            continue;
        }
        trace!("Pulling back point {} in cell {}.", p, cell);
        geometry.copy_cell_coordinate_dofs(cell as usize, &mut coordinate_dofs);
        let x_p = x.rows(p, 1).clone_owned();
        let pull_back = geometry_map
            .pull_back(&x_p, &coordinate_dofs)
            .map_err(|err| err.in_cell(cell as usize))?;
        reference_points
            .row_mut(p)
            .copy_from(&pull_back.reference_points_matrix());
        jacobians.set(
            p,
            &pull_back.jacobians.j(0),
            &pull_back.jacobians.k(0),
            pull_back.jacobians.det_j[0],
        );
    }

    let table = element.tabulate(num_derivatives, &reference_points)?;
    let space_dimension = element.base_space_dimension();
    let rvs = element.base_reference_value_size();
    let mut reference = vec![0.0; space_dimension * rvs];
    for (p, &cell) in cells.iter().enumerate() {
        if cell < 0 {
            for d in 0..expected_shape[0] {
                basis_values.lane_mut(&[d, p]).fill(0.0);
            }
            continue;
        }
        let perm = cell_info.map_or(0, |info| info[cell as usize]);
        let (j, k) = (jacobians.j(p), jacobians.k(p));
        for d in 0..expected_shape[0] {
            reference.copy_from_slice(table.lane(&[d, p]));
            element.apply_dof_transformation(&mut reference, perm, rvs);
            map.push_forward(
                &reference,
                basis_values.lane_mut(&[d, p]),
                space_dimension,
                &j,
                jacobians.det_j[p],
                &k,
            );
        }
    }
    Ok(())
}
