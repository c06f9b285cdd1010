//! Geometric quantities on facets: circumradii, facet Jacobians and physical facet normals.
use crate::array::Array;
use crate::cell::CellType;
use crate::coefficients::facet_to_cell_local;
use crate::coordinate_map::CoordinateMap;
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::quadrature::QuadratureRule;
use log::debug;
use nalgebra::{DMatrix, DVector};

/// Computes the circumradius of a simplex cell from the determinant of its (affine) Jacobian
/// and its coordinate dofs, of which the first rows must be the vertices.
pub fn compute_circumradius(cell_type: CellType, det_j: f64, coordinate_dofs: &DMatrix<f64>) -> Result<f64> {
    let nv = cell_type.num_vertices();
    if coordinate_dofs.nrows() < nv {
        return Err(Error::invalid_argument(format!(
            "{:?} needs {} vertices, got {} coordinate dofs",
            cell_type,
            nv,
            coordinate_dofs.nrows()
        )));
    }
    let distance = |a: usize, b: usize| (coordinate_dofs.row(a) - coordinate_dofs.row(b)).norm();

    match cell_type {
        CellType::Interval => Ok(det_j.abs() / 2.0),
        CellType::Triangle => {
            let area = det_j.abs() / 2.0;
            let (a, b, c) = (distance(1, 2), distance(0, 2), distance(0, 1));
            Ok(a * b * c / (4.0 * area))
        }
        CellType::Tetrahedron => {
            let volume = det_j.abs() / 6.0;
            // Products of the lengths of opposite edges
            let la = distance(1, 2) * distance(0, 3);
            let lb = distance(0, 2) * distance(1, 3);
            let lc = distance(0, 1) * distance(2, 3);
            let s = (la + lb + lc) * (la + lb - lc) * (la - lb + lc) * (-la + lb + lc);
            Ok(s.sqrt() / (24.0 * volume))
        }
        other => Err(Error::unsupported(format!("circumradius of {:?} cells", other))),
    }
}

/// Computes the circumradius of the cell attached to each (cell, local facet) pair.
///
/// The Jacobian is evaluated at the single point of a degree 0 rule on the facet. Only affine
/// geometries are supported. Returns one value per pair and a stride of 1.
pub fn pack_circumradius(mesh: &Mesh, active_facets: &[(usize, usize)]) -> Result<(Vec<f64>, usize)> {
    let geometry = mesh.geometry();
    let cmap = geometry.cmap();
    if !cmap.is_affine() {
        return Err(Error::unsupported("circumradius of a non-affine geometry"));
    }

    let cell_type = mesh.cell_type();
    let tdim = mesh.tdim();
    let rule = QuadratureRule::new(cell_type, 0, tdim - 1)?;
    let num_points = rule.num_points();
    let table = cmap.tabulate(1, &rule.stacked_points())?;
    debug!("Packing circumradius on {} facets.", active_facets.len());

    let mut coordinate_dofs = DMatrix::zeros(cmap.dim(), mesh.gdim());
    active_facets
        .iter()
        .map(|&(cell, local_index)| {
            if cell >= mesh.num_cells() || local_index >= cell_type.num_facets() {
                return Err(Error::invalid_argument(format!(
                    "({}, {}) is not a facet of the mesh",
                    cell, local_index
                )));
            }
            geometry.copy_cell_coordinate_dofs(cell, &mut coordinate_dofs);
            let dphi = CoordinateMap::derivative_matrix(&table, local_index * num_points, 1..tdim + 1);
            let j = CoordinateMap::compute_jacobian(&dphi, &coordinate_dofs);
            let det_j = CoordinateMap::compute_jacobian_determinant(&j);
            compute_circumradius(cell_type, det_j, &coordinate_dofs)
        })
        .collect::<Result<Vec<_>>>()
        .map(|circumradius| (circumradius, 1))
}

/// Like [`pack_circumradius`], for boundary facets given by their mesh index.
///
/// Negative facet indices yield zero.
pub fn pack_circumradius_on_facets(mesh: &Mesh, facets: &[i32]) -> Result<(Vec<f64>, usize)> {
    let entities = facet_to_cell_local(mesh, facets)?;
    let active: Vec<_> = entities.iter().flatten().copied().collect();
    let (packed, stride) = pack_circumradius(mesh, &active)?;
    let mut packed = packed.into_iter();
    let circumradius = entities
        .iter()
        .map(|entity| entity.and_then(|_| packed.next()).unwrap_or(0.0))
        .collect();
    Ok((circumradius, stride))
}

/// Work space for the Jacobians of a cell and of one of its facets.
#[derive(Debug, Clone, PartialEq)]
pub struct FacetJacobians {
    /// Jacobian of the cell, `gdim x tdim`.
    pub j: DMatrix<f64>,
    /// (Pseudo-)inverse of the cell Jacobian, `tdim x gdim`.
    pub k: DMatrix<f64>,
    /// `J J_f`, the Jacobian of the map from the reference facet, `gdim x (tdim - 1)`.
    pub j_tot: DMatrix<f64>,
}

impl FacetJacobians {
    pub fn new(gdim: usize, tdim: usize) -> Self {
        Self {
            j: DMatrix::zeros(gdim, tdim),
            k: DMatrix::zeros(tdim, gdim),
            j_tot: DMatrix::zeros(gdim, tdim.saturating_sub(1)),
        }
    }
}

/// Computes the cell Jacobian at point `q` of a coordinate map tabulation with first
/// derivatives, composes it with the reference facet Jacobian `j_f` and returns
/// `|det(J J_f)|`.
pub fn compute_facet_jacobians(
    q: usize,
    jacobians: &mut FacetJacobians,
    j_f: &DMatrix<f64>,
    table: &Array<3>,
    coordinate_dofs: &DMatrix<f64>,
) -> f64 {
    let tdim = j_f.nrows();
    let dphi = CoordinateMap::derivative_matrix(table, q, 1..tdim + 1);
    jacobians.j = CoordinateMap::compute_jacobian(&dphi, coordinate_dofs);
    jacobians.k = CoordinateMap::compute_jacobian_inverse(&jacobians.j);
    jacobians.j_tot = &jacobians.j * j_f;
    CoordinateMap::compute_jacobian_determinant(&jacobians.j_tot).abs()
}

/// How the facet integration measure changes from one quadrature point to the next.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FacetJacobianUpdate {
    /// The measure is constant, the given determinant is returned as is.
    Constant,
    /// The Jacobians are recomputed at every point.
    Recompute,
}

impl FacetJacobianUpdate {
    pub fn for_coordinate_map(cmap: &CoordinateMap) -> Self {
        if cmap.is_affine() {
            Self::Constant
        } else {
            Self::Recompute
        }
    }

    /// Returns the facet measure at point `q`, updating `jacobians` if it is not constant.
    pub fn update(
        self,
        q: usize,
        det_j: f64,
        jacobians: &mut FacetJacobians,
        j_f: &DMatrix<f64>,
        table: &Array<3>,
        coordinate_dofs: &DMatrix<f64>,
    ) -> f64 {
        match self {
            Self::Constant => det_j,
            Self::Recompute => compute_facet_jacobians(q, jacobians, j_f, table, coordinate_dofs),
        }
    }
}

/// Maps a reference facet normal to the unit normal of the physical facet, `K^T n / |K^T n|`.
pub fn physical_facet_normal(k: &DMatrix<f64>, n_ref: &DVector<f64>) -> DVector<f64> {
    let n = k.tr_mul(n_ref);
    let norm = n.norm();
    n / norm
}

/// How the physical facet normal changes from one quadrature point to the next.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NormalUpdate {
    Constant,
    Recompute,
}

impl NormalUpdate {
    pub fn for_coordinate_map(cmap: &CoordinateMap) -> Self {
        if cmap.is_affine() {
            Self::Constant
        } else {
            Self::Recompute
        }
    }

    /// Updates `n` from row `local_index` of the reference normals `n_ref` (`num_facets x tdim`)
    /// unless the normal is constant over the facet.
    pub fn update(self, n: &mut DVector<f64>, k: &DMatrix<f64>, n_ref: &DMatrix<f64>, local_index: usize) {
        if let Self::Recompute = self {
            *n = physical_facet_normal(k, &n_ref.row(local_index).transpose());
        }
    }
}
