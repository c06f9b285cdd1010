//! The coordinate map: a Lagrange element describing the geometry of each cell.
//!
//! The physical coordinates of a cell are `x(X) = sum_i phi_i(X) x_i`, where `x_i` are the
//! coordinate dofs (geometry nodes) of the cell and `phi_i` the Lagrange basis of the map.
//! Coordinate dofs are passed as `num_nodes x gdim` matrices, and sets of points as
//! `num_points x dim` matrices.
use crate::array::Array;
use crate::cell::CellType;
use crate::element::{DofLayout, LagrangeElement};
use crate::error::{Error, Result};
use fenris_optimize::calculus::{DifferentiableVectorFunction, VectorFunction};
use fenris_optimize::newton::{newton, NewtonError, NewtonSettings};
use log::{debug, warn};
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Settings for the Newton iteration used to pull back points through non-affine maps.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullBackSettings {
    pub max_iterations: usize,
    /// Convergence threshold. For square maps it bounds the physical residual relative to the
    /// size of the cell, for manifolds the Euclidean norm of the reference coordinate update.
    pub tolerance: f64,
}

impl Default for PullBackSettings {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            tolerance: 1e-10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateMap {
    element: LagrangeElement,
    settings: PullBackSettings,
}

impl CoordinateMap {
    pub fn new(cell: CellType, degree: usize) -> Result<Self> {
        Ok(Self {
            element: LagrangeElement::new(cell, degree)?,
            settings: PullBackSettings::default(),
        })
    }

    pub fn with_pull_back_settings(self, settings: PullBackSettings) -> Self {
        Self { settings, ..self }
    }

    pub fn pull_back_settings(&self) -> &PullBackSettings {
        &self.settings
    }

    pub fn cell_type(&self) -> CellType {
        self.element.cell_type()
    }

    pub fn degree(&self) -> usize {
        self.element.degree()
    }

    pub fn topological_dimension(&self) -> usize {
        self.cell_type().topological_dimension()
    }

    /// Whether the map has a constant Jacobian, i.e. whether it is a degree 1 map on a simplex.
    pub fn is_affine(&self) -> bool {
        self.element.is_affine()
    }

    /// The number of coordinate dofs (geometry nodes) per cell.
    pub fn dim(&self) -> usize {
        self.element.dim()
    }

    pub fn dof_layout(&self) -> DofLayout {
        DofLayout::new(self.element.entity_dofs(), 1)
    }

    /// Tabulates the basis of the map, with shape `(num_derivatives, num_points, dim)`.
    pub fn tabulate(&self, nd: usize, points: &DMatrix<f64>) -> Result<Array<3>> {
        self.element.tabulate(nd, points)
    }

    /// Extracts the derivatives in the range `derivatives` of all basis functions at point `p`
    /// from a tabulation, as a `derivatives.len() x dim` matrix.
    ///
    /// With `derivatives = 1..tdim + 1` this gives the reference gradients `dphi`.
    pub fn derivative_matrix(table: &Array<3>, p: usize, derivatives: Range<usize>) -> DMatrix<f64> {
        let [_, _, ndofs] = table.shape();
        DMatrix::from_fn(derivatives.len(), ndofs, |d, i| table[[derivatives.start + d, p, i]])
    }

    /// `J = coordinate_dofs^T dphi^T`, a `gdim x tdim` matrix.
    ///
    /// Applied to second derivatives (`tdim (tdim + 1) / 2 x dim`), the same product yields the
    /// Hessian of the map.
    pub fn compute_jacobian(dphi: &DMatrix<f64>, coordinate_dofs: &DMatrix<f64>) -> DMatrix<f64> {
        coordinate_dofs.transpose() * dphi.transpose()
    }

    /// The inverse of `J` if it is square, otherwise the pseudo-inverse `(J^T J)^-1 J^T`.
    ///
    /// A singular Jacobian yields a matrix of NaNs.
    pub fn compute_jacobian_inverse(j: &DMatrix<f64>) -> DMatrix<f64> {
        let (gdim, tdim) = j.shape();
        let inverse = if gdim == tdim {
            j.clone().try_inverse()
        } else {
            (j.transpose() * j).try_inverse().map(|jtj_inv| jtj_inv * j.transpose())
        };
        inverse.unwrap_or_else(|| {
            warn!("Singular Jacobian {:?}, inverse is undefined.", j.as_slice());
            DMatrix::from_element(tdim, gdim, f64::NAN)
        })
    }

    /// `det(J)` if `J` is square, otherwise the generalized determinant `sqrt(det(J^T J))`.
    pub fn compute_jacobian_determinant(j: &DMatrix<f64>) -> f64 {
        if j.is_square() {
            j.determinant()
        } else {
            (j.transpose() * j).determinant().sqrt()
        }
    }

    /// The physical image of the reference origin, i.e. the first coordinate dof.
    pub fn x0(coordinate_dofs: &DMatrix<f64>) -> DVector<f64> {
        coordinate_dofs.row(0).transpose()
    }

    /// Maps reference points to physical points.
    pub fn push_forward(&self, reference_points: &DMatrix<f64>, coordinate_dofs: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let phi = self.tabulate(0, reference_points)?;
        let [_, np, ndofs] = phi.shape();
        let phi = DMatrix::from_row_slice(np, ndofs, phi.as_slice());
        Ok(phi * coordinate_dofs)
    }

    /// `X = K (x - x0)` for every point, valid when the map is affine.
    pub fn pull_back_affine(x: &DMatrix<f64>, k: &DMatrix<f64>, x0: &DVector<f64>) -> DMatrix<f64> {
        let mut reference = DMatrix::zeros(x.nrows(), k.nrows());
        for (p, x_p) in x.row_iter().enumerate() {
            let dx = x_p.transpose() - x0;
            reference.row_mut(p).copy_from(&(k * dx).transpose());
        }
        reference
    }

    /// Pulls back physical points by Newton's method, starting from the reference midpoint.
    ///
    /// For manifolds (`gdim > tdim`) the pseudo-inverse turns the iteration into a
    /// Gauss–Newton method, which finds the reference coordinates of the closest point on the
    /// cell.
    pub fn pull_back_nonaffine(&self, x: &DMatrix<f64>, coordinate_dofs: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let tdim = self.topological_dimension();
        let gdim = coordinate_dofs.ncols();
        if x.ncols() != gdim {
            return Err(Error::invalid_argument(format!(
                "points have dimension {}, expected {}",
                x.ncols(),
                gdim
            )));
        }

        let midpoint = self.cell_type().midpoint();
        let mut reference = DMatrix::zeros(x.nrows(), tdim);
        for (p, x_p) in x.row_iter().enumerate() {
            let x_p = x_p.transpose();
            let mut xi = midpoint.clone();
            // The residual of a point off a manifold cell does not vanish, so Newton's method on
            // the residual is only applicable to square maps
            let iterations = if gdim == tdim {
                self.solve_square(&x_p, coordinate_dofs, &mut xi)?
            } else {
                self.solve_gauss_newton(&x_p, coordinate_dofs, &mut xi)?
            };
            debug!("Non-affine pull-back converged after {} iterations.", iterations);
            reference.row_mut(p).copy_from(&xi.transpose());
        }
        Ok(reference)
    }

    /// Solves `x(xi) - x = 0` with `fenris-optimize`, converging when the physical residual is
    /// below the tolerance relative to the size of the cell.
    fn solve_square(&self, x: &DVector<f64>, coordinate_dofs: &DMatrix<f64>, xi: &mut DVector<f64>) -> Result<usize> {
        let settings = NewtonSettings {
            max_iterations: Some(self.settings.max_iterations),
            tolerance: self.settings.tolerance * cell_size(coordinate_dofs),
        };
        let mut residual = PhysicalResidual {
            cmap: self,
            coordinate_dofs,
            x,
            steps: 0,
            error: None,
        };
        let mut f = DVector::zeros(x.len());
        let mut dx = DVector::zeros(x.len());
        let result = newton(&mut residual, &mut *xi, &mut f, &mut dx, settings);

        if let Some(error) = residual.error {
            return Err(error);
        }
        let not_converged = |iterations| Error::Convergence {
            point: x.as_slice().to_vec(),
            cell: None,
            iterations,
        };
        match result {
            // A non-finite residual stops the iteration without reaching the tolerance
            Ok(_) if !xi.iter().chain(f.iter()).all(|v| v.is_finite()) => Err(not_converged(residual.steps)),
            Ok(iterations) => Ok(iterations),
            Err(NewtonError::MaximumIterationsReached(iterations)) => Err(not_converged(iterations)),
            Err(err) => {
                debug!("Newton pull-back failed: {}", err);
                Err(not_converged(residual.steps))
            }
        }
    }

    /// Gauss–Newton iteration `xi += K (x - x(xi))` with the pseudo-inverse `K`, converging when
    /// the reference update is below the tolerance.
    fn solve_gauss_newton(
        &self,
        x: &DVector<f64>,
        coordinate_dofs: &DMatrix<f64>,
        xi: &mut DVector<f64>,
    ) -> Result<usize> {
        let PullBackSettings {
            max_iterations,
            tolerance,
        } = self.settings;
        let tdim = self.topological_dimension();
        let mut iterations = 0;
        while iterations < max_iterations {
            let table = self.tabulate(1, &DMatrix::from_row_slice(1, tdim, xi.as_slice()))?;
            let phi = Self::derivative_matrix(&table, 0, 0..1);
            let dphi = Self::derivative_matrix(&table, 0, 1..tdim + 1);
            let x_k = DVector::from_column_slice((phi * coordinate_dofs).as_slice());
            let j = Self::compute_jacobian(&dphi, coordinate_dofs);
            let k = Self::compute_jacobian_inverse(&j);
            let dxi = k * (x - x_k);
            *xi += &dxi;
            iterations += 1;

            let norm = dxi.norm();
            if !norm.is_finite() {
                break;
            }
            if norm <= tolerance {
                return Ok(iterations);
            }
        }
        Err(Error::Convergence {
            point: x.as_slice().to_vec(),
            cell: None,
            iterations,
        })
    }
}

/// The largest distance from the first coordinate dof to any other.
fn cell_size(coordinate_dofs: &DMatrix<f64>) -> f64 {
    let x0 = coordinate_dofs.row(0);
    coordinate_dofs
        .row_iter()
        .map(|x| (x - x0).norm())
        .fold(0.0, f64::max)
}

/// The residual `x(xi) - x` of the pull-back of a single point through a square map.
struct PhysicalResidual<'a> {
    cmap: &'a CoordinateMap,
    coordinate_dofs: &'a DMatrix<f64>,
    x: &'a DVector<f64>,
    /// Number of successfully solved Jacobian systems.
    steps: usize,
    error: Option<Error>,
}

impl<'a> PhysicalResidual<'a> {
    fn tabulate_at(&self, nd: usize, xi: &DVectorView<f64>) -> Result<Array<3>> {
        let point = DMatrix::from_fn(1, xi.len(), |_, d| xi[d]);
        self.cmap.tabulate(nd, &point)
    }
}

impl<'a> VectorFunction<f64> for PhysicalResidual<'a> {
    fn dimension(&self) -> usize {
        self.x.len()
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, xi: &DVectorView<f64>) {
        match self.tabulate_at(0, xi) {
            Ok(table) => {
                let phi = CoordinateMap::derivative_matrix(&table, 0, 0..1);
                let x_k = DVector::from_column_slice((phi * self.coordinate_dofs).as_slice());
                f.copy_from(&(x_k - self.x));
            }
            Err(err) => {
                self.error.get_or_insert(err);
                f.fill(f64::NAN);
            }
        }
    }
}

impl<'a> DifferentiableVectorFunction<f64> for PhysicalResidual<'a> {
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<f64>,
        xi: &DVectorView<f64>,
        rhs: &DVectorView<f64>,
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let table = self.tabulate_at(1, xi)?;
        let dphi = CoordinateMap::derivative_matrix(&table, 0, 1..xi.len() + 1);
        let j = CoordinateMap::compute_jacobian(&dphi, self.coordinate_dofs);
        let lu = j.full_piv_lu();
        sol.copy_from(rhs);
        if lu.solve_mut(sol) {
            self.steps += 1;
            Ok(())
        } else {
            Err(Box::<dyn std::error::Error>::from(
                "LU decomposition failed. Jacobian not invertible?",
            ))
        }
    }
}
