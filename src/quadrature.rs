//! Quadrature rules on reference cells and their sub-entities.
//!
//! Rules on quadrilaterals and hexahedra are tensor products of Gauss–Legendre rules. Rules on
//! simplices are the fully symmetric polyquad rules. All rules are provided by
//! `fenris-quadrature` on `[-1, 1]`-based domains and mapped onto the unit reference cells.
use crate::cell::CellType;
use crate::error::{Error, Result};
use fenris_quadrature::{polyquad, tensor};
use nalgebra::DMatrix;

pub use fenris_quadrature::Error as QuadratureError;

pub mod univariate;

use univariate::gauss;

/// Weights and points (one per row) of a rule on a single reference cell.
pub type ReferenceRule = (Vec<f64>, DMatrix<f64>);

/// A quadrature rule for all sub-entities of a given dimension of a reference cell.
///
/// For `dim == tdim` there is a single entity, the cell itself. For `dim == tdim - 1` there is one
/// point set per local facet, each expressed in the coordinates of the parent reference cell.
/// All entities share the same number of points and the same weights (up to the facet shape).
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureRule {
    cell: CellType,
    dim: usize,
    degree: usize,
    points: Vec<DMatrix<f64>>,
    weights: Vec<Vec<f64>>,
}

impl QuadratureRule {
    /// Creates a rule exact for polynomials of total degree `degree` on the sub-entities of
    /// dimension `dim` of `cell`.
    pub fn new(cell: CellType, degree: usize, dim: usize) -> Result<Self> {
        let tdim = cell.topological_dimension();
        let (points, weights) = if dim == tdim {
            let (weights, points) = reference_rule(cell, degree)?;
            (vec![points], vec![weights])
        } else if dim + 1 == tdim {
            let (weights, points) = reference_rule(cell.facet_type(), degree)?;
            (0..cell.num_facets())
                .map(|f| (cell.map_facet_points(f, &points), weights.clone()))
                .unzip()
        } else {
            return Err(Error::unsupported(format!(
                "quadrature on sub-entities of dimension {} of a {:?}",
                dim, cell
            )));
        };

        Ok(Self {
            cell,
            dim,
            degree,
            points,
            weights,
        })
    }

    pub fn cell_type(&self) -> CellType {
        self.cell
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn num_sub_entities(&self) -> usize {
        self.points.len()
    }

    /// Reference points per sub-entity, `num_points x tdim` each.
    pub fn points(&self) -> &[DMatrix<f64>] {
        &self.points
    }

    pub fn weights(&self) -> &[Vec<f64>] {
        &self.weights
    }

    /// The number of points per sub-entity.
    pub fn num_points(&self) -> usize {
        self.weights[0].len()
    }

    /// The points of all sub-entities stacked on top of each other.
    ///
    /// Row `e * num_points + q` holds point `q` of sub-entity `e`. This allows tabulating an
    /// element once for every sub-entity.
    pub fn stacked_points(&self) -> DMatrix<f64> {
        let tdim = self.cell.topological_dimension();
        let np = self.num_points();
        let mut stacked = DMatrix::zeros(np * self.points.len(), tdim);
        for (e, points) in self.points.iter().enumerate() {
            stacked.rows_mut(e * np, np).copy_from(points);
        }
        stacked
    }
}

/// A rule on the reference cell, exact for polynomials of total degree `degree`.
pub fn reference_rule(cell: CellType, degree: usize) -> Result<ReferenceRule> {
    let num_gauss_points = degree / 2 + 1;
    let rule = match cell {
        CellType::Point => (vec![1.0], DMatrix::zeros(1, 0)),
        CellType::Interval => {
            let (weights, points) = gauss(num_gauss_points);
            (weights, DMatrix::from_column_slice(points.len(), 1, &points))
        }
        CellType::Quadrilateral => convert_rule_to_unit_domain(tensor::quadrilateral_gauss(num_gauss_points)),
        CellType::Hexahedron => convert_rule_to_unit_domain(tensor::hexahedron_gauss(num_gauss_points)),
        CellType::Triangle => {
            let rule = polyquad::triangle(degree).map_err(|err| no_rule(cell, degree, err))?;
            convert_rule_to_unit_domain(rule)
        }
        CellType::Tetrahedron => {
            let rule = polyquad::tetrahedron(degree).map_err(|err| no_rule(cell, degree, err))?;
            convert_rule_to_unit_domain(rule)
        }
    };
    Ok(rule)
}

fn no_rule(cell: CellType, degree: usize, err: QuadratureError) -> Error {
    Error::unsupported(format!("quadrature of degree {} on a {:?}: {}", degree, cell, err))
}

/// Maps a rule on a `[-1, 1]`-based reference domain onto the unit reference cell by
/// `x -> (x + 1) / 2`.
fn convert_rule_to_unit_domain<const D: usize>(rule: fenris_quadrature::Rule<D>) -> ReferenceRule {
    let (weights, points) = rule;
    let scale = 0.5f64.powi(D as i32);
    let weights = weights.into_iter().map(|w| scale * w).collect();
    let points = DMatrix::from_fn(points.len(), D, |p, d| 0.5 * (points[p][d] + 1.0));
    (weights, points)
}
