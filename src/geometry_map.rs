//! Pull-back of physical points and Jacobians of the geometric map of a cell.
//!
//! The affine and non-affine code paths are selected once per coordinate map through
//! [`GeometryMap`]. Affine maps tabulate the gradients of the map basis once and reuse the
//! constant Jacobian for all points, while non-affine maps solve for the reference
//! coordinates of each point and evaluate the Jacobian there.
use crate::array::Array;
use crate::coordinate_map::CoordinateMap;
use crate::error::{Error, Result};
use log::{debug, trace};
use nalgebra::DMatrix;

/// Jacobians `J` (`gdim x tdim`), their (pseudo-)inverses `K` (`tdim x gdim`) and
/// determinants at a set of points.
#[derive(Debug, Clone, PartialEq)]
pub struct JacobianData {
    pub j: Array<3>,
    pub k: Array<3>,
    pub det_j: Vec<f64>,
}

impl JacobianData {
    pub fn zeros(num_points: usize, gdim: usize, tdim: usize) -> Self {
        Self {
            j: Array::zeros([num_points, gdim, tdim]),
            k: Array::zeros([num_points, tdim, gdim]),
            det_j: vec![0.0; num_points],
        }
    }

    /// The same Jacobian and inverse `k` at every point.
    pub fn broadcast(j: &DMatrix<f64>, k: &DMatrix<f64>, num_points: usize) -> Self {
        let (gdim, tdim) = j.shape();
        let det_j = CoordinateMap::compute_jacobian_determinant(j);
        let mut data = Self::zeros(num_points, gdim, tdim);
        for p in 0..num_points {
            data.set(p, j, k, det_j);
        }
        data
    }

    pub fn num_points(&self) -> usize {
        self.det_j.len()
    }

    pub fn set(&mut self, p: usize, j: &DMatrix<f64>, k: &DMatrix<f64>, det_j: f64) {
        copy_matrix(&mut self.j, p, j);
        copy_matrix(&mut self.k, p, k);
        self.det_j[p] = det_j;
    }

    pub fn j(&self, p: usize) -> DMatrix<f64> {
        let [_, gdim, _] = self.j.shape();
        self.j.matrix(p, 0..gdim)
    }

    pub fn k(&self, p: usize) -> DMatrix<f64> {
        let [_, tdim, _] = self.k.shape();
        self.k.matrix(p, 0..tdim)
    }
}

/// Copies a matrix into the `[p, .., ..]` slab of an array in row-major order.
pub(crate) fn copy_matrix(array: &mut Array<3>, p: usize, m: &DMatrix<f64>) {
    let ncols = m.ncols();
    for (idx, value) in array.lane_mut(&[p]).iter_mut().enumerate() {
        *value = m[(idx / ncols, idx % ncols)];
    }
}

/// Reference coordinates (`num_points x tdim`) of pulled back points and the Jacobians there.
#[derive(Debug, Clone, PartialEq)]
pub struct PullBack {
    pub reference_points: Array<2>,
    pub jacobians: JacobianData,
}

impl PullBack {
    pub fn reference_points_matrix(&self) -> DMatrix<f64> {
        let [np, tdim] = self.reference_points.shape();
        DMatrix::from_row_slice(np, tdim, self.reference_points.as_slice())
    }
}

/// A pull-back together with the Hessian of the map at each point, with shape
/// `(num_points, gdim, tdim (tdim + 1) / 2)`. Second derivatives are ordered as in
/// [`derivative_indices`](crate::element::derivative_indices).
#[derive(Debug, Clone, PartialEq)]
pub struct PullBackHessian {
    pub pull_back: PullBack,
    pub hessian: Array<3>,
}

/// The geometric map of the cells of a mesh, specialized on whether it is affine.
#[derive(Debug, Clone)]
pub enum GeometryMap<'a> {
    /// Gradients of the map basis (`tdim x num_nodes`) are constant and tabulated once.
    Affine { cmap: &'a CoordinateMap, dphi: DMatrix<f64> },
    NonAffine { cmap: &'a CoordinateMap },
}

impl<'a> GeometryMap<'a> {
    pub fn new(cmap: &'a CoordinateMap) -> Result<Self> {
        if cmap.is_affine() {
            debug!("Using affine geometry map for {:?}.", cmap.cell_type());
            let tdim = cmap.topological_dimension();
            let origin = DMatrix::zeros(1, tdim);
            let table = cmap.tabulate(1, &origin)?;
            let dphi = CoordinateMap::derivative_matrix(&table, 0, 1..tdim + 1);
            Ok(Self::Affine { cmap, dphi })
        } else {
            debug!(
                "Using non-affine geometry map for {:?} of degree {}.",
                cmap.cell_type(),
                cmap.degree()
            );
            Ok(Self::NonAffine { cmap })
        }
    }

    pub fn cmap(&self) -> &'a CoordinateMap {
        match self {
            Self::Affine { cmap, .. } | Self::NonAffine { cmap } => cmap,
        }
    }

    pub fn is_affine(&self) -> bool {
        matches!(self, Self::Affine { .. })
    }

    fn check_dimensions(&self, x: &DMatrix<f64>, coordinate_dofs: &DMatrix<f64>) -> Result<()> {
        let num_nodes = self.cmap().dim();
        if coordinate_dofs.nrows() != num_nodes {
            return Err(Error::invalid_argument(format!(
                "got {} coordinate dofs, the coordinate map has {}",
                coordinate_dofs.nrows(),
                num_nodes
            )));
        }
        let gdim = coordinate_dofs.ncols();
        if x.ncols() != gdim {
            return Err(Error::invalid_argument(format!(
                "points have dimension {}, expected {}",
                x.ncols(),
                gdim
            )));
        }
        Ok(())
    }

    /// Pulls back the physical points `x` (`num_points x gdim`) into the reference cell of the
    /// cell with the given coordinate dofs.
    ///
    /// Fails if the points and the coordinate dofs disagree on the geometric dimension, or if
    /// the number of coordinate dofs does not match the coordinate map.
    pub fn pull_back(&self, x: &DMatrix<f64>, coordinate_dofs: &DMatrix<f64>) -> Result<PullBack> {
        self.check_dimensions(x, coordinate_dofs)?;
        let num_points = x.nrows();
        trace!("Pulling back {} points.", num_points);
        match self {
            Self::Affine { dphi, .. } => {
                let j = CoordinateMap::compute_jacobian(dphi, coordinate_dofs);
                let k = CoordinateMap::compute_jacobian_inverse(&j);
                let x0 = CoordinateMap::x0(coordinate_dofs);
                let reference = CoordinateMap::pull_back_affine(x, &k, &x0);
                let jacobians = JacobianData::broadcast(&j, &k, num_points);
                Ok(PullBack {
                    reference_points: to_array(&reference),
                    jacobians,
                })
            }
            Self::NonAffine { cmap } => {
                let reference = cmap.pull_back_nonaffine(x, coordinate_dofs)?;
                let table = cmap.tabulate(1, &reference)?;
                Ok(PullBack {
                    reference_points: to_array(&reference),
                    jacobians: compute_jacobian_data(&table, cmap.topological_dimension(), coordinate_dofs),
                })
            }
        }
    }

    /// Like [`GeometryMap::pull_back`], but also computes the Hessian of the map, which
    /// vanishes for affine maps.
    pub fn pull_back_with_hessian(&self, x: &DMatrix<f64>, coordinate_dofs: &DMatrix<f64>) -> Result<PullBackHessian> {
        self.check_dimensions(x, coordinate_dofs)?;
        let cmap = self.cmap();
        let tdim = cmap.topological_dimension();
        let gdim = coordinate_dofs.ncols();
        let num_second = tdim * (tdim + 1) / 2;
        match self {
            Self::Affine { .. } => Ok(PullBackHessian {
                pull_back: self.pull_back(x, coordinate_dofs)?,
                hessian: Array::zeros([x.nrows(), gdim, num_second]),
            }),
            Self::NonAffine { cmap } => {
                let reference = cmap.pull_back_nonaffine(x, coordinate_dofs)?;
                let table = cmap.tabulate(2, &reference)?;
                let mut hessian = Array::zeros([x.nrows(), gdim, num_second]);
                for p in 0..x.nrows() {
                    let ddphi = CoordinateMap::derivative_matrix(&table, p, tdim + 1..tdim + 1 + num_second);
                    let h = CoordinateMap::compute_jacobian(&ddphi, coordinate_dofs);
                    copy_matrix(&mut hessian, p, &h);
                }
                Ok(PullBackHessian {
                    pull_back: PullBack {
                        reference_points: to_array(&reference),
                        jacobians: compute_jacobian_data(&table, tdim, coordinate_dofs),
                    },
                    hessian,
                })
            }
        }
    }
}

/// Computes `J`, `K` and `det J` at every point of a tabulation of the coordinate map with
/// at least first derivatives, on cells of topological dimension `tdim`.
pub fn compute_jacobian_data(table: &Array<3>, tdim: usize, coordinate_dofs: &DMatrix<f64>) -> JacobianData {
    let [_, num_points, _] = table.shape();
    let gdim = coordinate_dofs.ncols();
    let mut data = JacobianData::zeros(num_points, gdim, tdim);
    for p in 0..num_points {
        let dphi = CoordinateMap::derivative_matrix(table, p, 1..tdim + 1);
        let j = CoordinateMap::compute_jacobian(&dphi, coordinate_dofs);
        let k = CoordinateMap::compute_jacobian_inverse(&j);
        let det_j = CoordinateMap::compute_jacobian_determinant(&j);
        data.set(p, &j, &k, det_j);
    }
    data
}

/// Pulls back physical points through the coordinate map of a cell.
pub fn pull_back(x: &DMatrix<f64>, coordinate_dofs: &DMatrix<f64>, cmap: &CoordinateMap) -> Result<PullBack> {
    GeometryMap::new(cmap)?.pull_back(x, coordinate_dofs)
}

/// Pulls back physical points and computes the Hessian of the map at each of them.
pub fn pull_back_with_hessian(
    x: &DMatrix<f64>,
    coordinate_dofs: &DMatrix<f64>,
    cmap: &CoordinateMap,
) -> Result<PullBackHessian> {
    GeometryMap::new(cmap)?.pull_back_with_hessian(x, coordinate_dofs)
}

fn to_array(m: &DMatrix<f64>) -> Array<2> {
    let (nrows, ncols) = m.shape();
    let mut array = Array::zeros([nrows, ncols]);
    for r in 0..nrows {
        for c in 0..ncols {
            array[[r, c]] = m[(r, c)];
        }
    }
    array
}
