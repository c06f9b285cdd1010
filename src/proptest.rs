//! Strategies for property-based testing of geometric kernels.
use crate::cell::CellType;
use ::proptest::prelude::*;
use nalgebra::{DMatrix, DVector};

/// A point in the interior of the reference cell of the given type.
pub fn reference_point(cell: CellType) -> impl Strategy<Value = DVector<f64>> {
    let tdim = cell.topological_dimension();
    // Stay away from the boundary, where points are ambiguous between neighboring cells
    prop::collection::vec(0.05..0.95, tdim).prop_map(move |mut coords| {
        if cell.is_simplex() {
            // Scale into the simplex while keeping the point interior
            let sum: f64 = coords.iter().sum();
            if sum >= 0.95 {
                let scale = 0.9 / sum;
                coords.iter_mut().for_each(|c| *c *= scale);
            }
        }
        DVector::from_vec(coords)
    })
}

/// Vertex coordinates (`(tdim + 1) x tdim`, one vertex per row) of a positively oriented,
/// well-shaped simplex of dimension `tdim`.
///
/// The simplex is the image of the reference simplex under `x = x0 + A X`, where `A` is upper
/// triangular with diagonal entries in `[0.5, 2]` and off-diagonal entries in `[-1, 1]`.
pub fn affine_simplex(tdim: usize) -> impl Strategy<Value = DMatrix<f64>> {
    let range = -10.0..10.0;
    let origin = prop::collection::vec(range, tdim);
    let diagonal = prop::collection::vec(0.5..2.0, tdim);
    let shear = prop::collection::vec(-1.0..1.0, tdim * tdim);
    (origin, diagonal, shear).prop_map(move |(origin, diagonal, shear)| {
        let a = DMatrix::from_fn(tdim, tdim, |i, j| {
            if i == j {
                diagonal[i]
            } else if i < j {
                shear[i * tdim + j]
            } else {
                0.0
            }
        });
        let mut vertices = DMatrix::zeros(tdim + 1, tdim);
        for v in 0..=tdim {
            for i in 0..tdim {
                let offset = if v == 0 { 0.0 } else { a[(i, v - 1)] };
                vertices[(v, i)] = origin[i] + offset;
            }
        }
        vertices
    })
}

/// Coordinate dofs (`6 x 2`) of a quadratic triangle obtained by moving the edge midpoints
/// of a well-shaped affine triangle by a small amount.
pub fn curved_triangle() -> impl Strategy<Value = DMatrix<f64>> {
    let perturbation = prop::collection::vec(-0.02..0.02, 6);
    (affine_simplex(2), perturbation).prop_map(|(vertices, perturbation)| {
        let edges = CellType::Triangle.sub_entities(1);
        let mut coordinate_dofs = DMatrix::zeros(6, 2);
        coordinate_dofs.rows_mut(0, 3).copy_from(&vertices);
        for (e, edge) in edges.iter().enumerate() {
            for i in 0..2 {
                let midpoint = 0.5 * (vertices[(edge[0], i)] + vertices[(edge[1], i)]);
                coordinate_dofs[(3 + e, i)] = midpoint + perturbation[2 * e + i];
            }
        }
        coordinate_dofs
    })
}
