use fenris_contact::cell::CellType;
use fenris_contact::coordinate_map::{CoordinateMap, PullBackSettings};
use fenris_contact::element::FiniteElement;
use fenris_contact::geometry_map::{pull_back, pull_back_with_hessian, GeometryMap};
use fenris_contact::proptest::{affine_simplex, curved_triangle, reference_point};
use fenris_contact::Error;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::DMatrix;
use proptest::prelude::*;

fn row(x: &nalgebra::DVector<f64>) -> DMatrix<f64> {
    DMatrix::from_row_slice(1, x.len(), x.as_slice())
}

/// Coordinate dofs of a quadratic triangle whose nodes are the images of the reference nodes
/// under `(X, Y) -> (X + a X^2, Y)`, which the quadratic map represents exactly.
fn stretched_quadratic_triangle(a: f64) -> DMatrix<f64> {
    let nodes = FiniteElement::lagrange(CellType::Triangle, 2)
        .unwrap()
        .interpolation_points()
        .unwrap();
    DMatrix::from_fn(nodes.nrows(), 2, |i, j| match j {
        0 => nodes[(i, 0)] + a * nodes[(i, 0)].powi(2),
        _ => nodes[(i, 1)],
    })
}

#[test]
fn affine_pull_back_of_vertices() {
    let cmap = CoordinateMap::new(CellType::Triangle, 1).unwrap();
    let coordinate_dofs = DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 3.0, 1.0, 1.0, 2.0]);
    let x = DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 3.0, 1.0, 2.0, 1.5]);
    let result = pull_back(&x, &coordinate_dofs, &cmap).unwrap();

    let expected = DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 1.0, 0.0, 0.5, 0.5]);
    assert_matrix_eq!(result.reference_points_matrix(), expected, comp = abs, tol = 1e-14);
    for p in 0..3 {
        assert_scalar_eq!(result.jacobians.det_j[p], 2.0, comp = abs, tol = 1e-14);
    }
    let j = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 1.0]);
    assert_matrix_eq!(result.jacobians.j(1), j, comp = abs, tol = 1e-14);
}

#[test]
fn manifold_pull_back_uses_pseudo_inverse() {
    // A triangle in the plane z = 1 embedded in 3D
    let cmap = CoordinateMap::new(CellType::Triangle, 1).unwrap();
    let coordinate_dofs = DMatrix::from_row_slice(3, 3, &[0.0, 0.0, 1.0, 2.0, 0.0, 1.0, 0.0, 2.0, 1.0]);
    // Points above the plane are projected onto it
    let x = DMatrix::from_row_slice(1, 3, &[0.5, 1.0, 4.0]);
    let result = pull_back(&x, &coordinate_dofs, &cmap).unwrap();
    assert_matrix_eq!(
        result.reference_points_matrix(),
        DMatrix::from_row_slice(1, 2, &[0.25, 0.5]),
        comp = abs,
        tol = 1e-14
    );
    assert_scalar_eq!(result.jacobians.det_j[0], 4.0, comp = abs, tol = 1e-13);
    let jk = result.jacobians.k(0) * result.jacobians.j(0);
    assert_matrix_eq!(jk, DMatrix::<f64>::identity(2, 2), comp = abs, tol = 1e-13);
}

#[test]
fn geometry_map_dispatch_follows_affinity() {
    let p1 = CoordinateMap::new(CellType::Triangle, 1).unwrap();
    let p2 = CoordinateMap::new(CellType::Triangle, 2).unwrap();
    let q1 = CoordinateMap::new(CellType::Quadrilateral, 1).unwrap();
    assert!(GeometryMap::new(&p1).unwrap().is_affine());
    assert!(!GeometryMap::new(&p2).unwrap().is_affine());
    assert!(!GeometryMap::new(&q1).unwrap().is_affine());
}

#[test]
fn pull_back_rejects_mismatched_dimensions() {
    let coordinate_dofs = DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 3.0, 1.0, 1.0, 2.0]);
    let x = DMatrix::from_row_slice(1, 3, &[2.0, 1.5, 0.0]);
    for degree in [1, 2] {
        let cmap = CoordinateMap::new(CellType::Triangle, degree).unwrap();
        let map = GeometryMap::new(&cmap).unwrap();
        let coordinate_dofs = if degree == 1 {
            coordinate_dofs.clone()
        } else {
            stretched_quadratic_triangle(0.0)
        };
        assert!(matches!(
            map.pull_back(&x, &coordinate_dofs),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            map.pull_back_with_hessian(&x, &coordinate_dofs),
            Err(Error::InvalidArgument(_))
        ));
    }

    // Coordinate dofs of a linear triangle on a quadratic map
    let p2 = CoordinateMap::new(CellType::Triangle, 2).unwrap();
    let x = DMatrix::from_row_slice(1, 2, &[2.0, 1.5]);
    assert!(matches!(
        pull_back(&x, &coordinate_dofs, &p2),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn affine_pull_back_of_no_points() {
    let cmap = CoordinateMap::new(CellType::Triangle, 1).unwrap();
    let coordinate_dofs = DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 3.0, 1.0, 1.0, 2.0]);
    let result = pull_back(&DMatrix::zeros(0, 2), &coordinate_dofs, &cmap).unwrap();
    assert_eq!(result.reference_points.shape(), [0, 2]);
    assert_eq!(result.jacobians.num_points(), 0);
}

#[test]
fn nonaffine_pull_back_of_bilinear_quadrilateral() {
    let cmap = CoordinateMap::new(CellType::Quadrilateral, 1).unwrap();
    // A trapezoid: the map is bilinear, not affine
    let coordinate_dofs = DMatrix::from_row_slice(4, 2, &[0.0, 0.0, 2.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    let reference = DMatrix::from_row_slice(2, 2, &[0.3, 0.6, 0.9, 0.1]);
    let x = cmap.push_forward(&reference, &coordinate_dofs).unwrap();
    let result = pull_back(&x, &coordinate_dofs, &cmap).unwrap();
    assert_matrix_eq!(result.reference_points_matrix(), reference, comp = abs, tol = 1e-9);
}

#[test]
fn nonaffine_manifold_pull_back_projects_onto_the_cell() {
    let a = 0.3;
    let cmap = CoordinateMap::new(CellType::Triangle, 2).unwrap();
    // The stretched triangle lifted into the plane z = 1
    let planar = stretched_quadratic_triangle(a);
    let coordinate_dofs = DMatrix::from_fn(6, 3, |i, j| if j < 2 { planar[(i, j)] } else { 1.0 });
    let reference = DMatrix::from_row_slice(2, 2, &[0.2, 0.3, 0.6, 0.1]);
    let mut x = cmap.push_forward(&reference, &coordinate_dofs).unwrap();
    x[(0, 2)] += 2.0;
    x[(1, 2)] -= 0.5;

    let result = pull_back(&x, &coordinate_dofs, &cmap).unwrap();
    assert_matrix_eq!(result.reference_points_matrix(), reference, comp = abs, tol = 1e-9);
    for p in 0..2 {
        let expected_det_j = 1.0 + 2.0 * a * reference[(p, 0)];
        assert_scalar_eq!(result.jacobians.det_j[p], expected_det_j, comp = abs, tol = 1e-8);
    }
}

#[test]
fn hessian_of_quadratic_map() {
    let a = 0.3;
    let cmap = CoordinateMap::new(CellType::Triangle, 2).unwrap();
    let coordinate_dofs = stretched_quadratic_triangle(a);
    let reference = DMatrix::from_row_slice(2, 2, &[0.2, 0.3, 0.6, 0.1]);
    let x = cmap.push_forward(&reference, &coordinate_dofs).unwrap();
    assert_scalar_eq!(x[(0, 0)], 0.2 + a * 0.04, comp = abs, tol = 1e-14);

    let result = pull_back_with_hessian(&x, &coordinate_dofs, &cmap).unwrap();
    assert_matrix_eq!(
        result.pull_back.reference_points_matrix(),
        reference,
        comp = abs,
        tol = 1e-9
    );
    assert_eq!(result.hessian.shape(), [2, 2, 3]);
    for p in 0..2 {
        // Only d^2 x / dX^2 is non-zero
        assert_scalar_eq!(result.hessian[[p, 0, 0]], 2.0 * a, comp = abs, tol = 1e-12);
        for (i, k) in [(0, 1), (0, 2), (1, 0), (1, 1), (1, 2)] {
            assert_scalar_eq!(result.hessian[[p, i, k]], 0.0, comp = abs, tol = 1e-12);
        }
        let expected_j = DMatrix::from_row_slice(2, 2, &[1.0 + 2.0 * a * reference[(p, 0)], 0.0, 0.0, 1.0]);
        assert_matrix_eq!(result.pull_back.jacobians.j(p), expected_j, comp = abs, tol = 1e-9);
    }
}

#[test]
fn hessian_of_affine_map_vanishes() {
    let cmap = CoordinateMap::new(CellType::Tetrahedron, 1).unwrap();
    let coordinate_dofs = DMatrix::from_row_slice(4, 3, &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 3.0]);
    let x = DMatrix::from_row_slice(1, 3, &[0.25, 0.5, 0.75]);
    let result = pull_back_with_hessian(&x, &coordinate_dofs, &cmap).unwrap();
    assert_eq!(result.hessian.shape(), [1, 3, 6]);
    assert!(result.hessian.as_slice().iter().all(|&h| h == 0.0));
    assert_scalar_eq!(result.pull_back.jacobians.det_j[0], 6.0, comp = abs, tol = 1e-14);
}

#[test]
fn pull_back_reports_non_convergence() {
    let settings = PullBackSettings {
        max_iterations: 1,
        tolerance: 1e-10,
    };
    let cmap = CoordinateMap::new(CellType::Triangle, 2)
        .unwrap()
        .with_pull_back_settings(settings);
    let coordinate_dofs = stretched_quadratic_triangle(0.3);
    let x = DMatrix::from_row_slice(1, 2, &[0.1, 0.2]);
    let err = pull_back(&x, &coordinate_dofs, &cmap).unwrap_err();
    assert_eq!(
        err,
        Error::Convergence {
            point: vec![0.1, 0.2],
            cell: None,
            iterations: 1
        }
    );
    assert!(matches!(err.in_cell(7), Error::Convergence { cell: Some(7), .. }));
}

#[test]
fn degenerate_cell_does_not_converge() {
    let cmap = CoordinateMap::new(CellType::Triangle, 2).unwrap();
    let coordinate_dofs = DMatrix::from_element(6, 2, 1.0);
    let x = DMatrix::from_row_slice(1, 2, &[0.5, 0.5]);
    assert!(matches!(
        pull_back(&x, &coordinate_dofs, &cmap),
        Err(Error::Convergence { .. })
    ));
}

proptest! {
    #[test]
    fn affine_triangle_round_trip(vertices in affine_simplex(2), xi in reference_point(CellType::Triangle)) {
        let cmap = CoordinateMap::new(CellType::Triangle, 1).unwrap();
        let x = cmap.push_forward(&row(&xi), &vertices).unwrap();
        let result = pull_back(&x, &vertices, &cmap).unwrap();
        assert_matrix_eq!(result.reference_points_matrix(), row(&xi), comp = abs, tol = 1e-10);
    }

    #[test]
    fn affine_tetrahedron_round_trip(vertices in affine_simplex(3), xi in reference_point(CellType::Tetrahedron)) {
        let cmap = CoordinateMap::new(CellType::Tetrahedron, 1).unwrap();
        let x = cmap.push_forward(&row(&xi), &vertices).unwrap();
        let result = pull_back(&x, &vertices, &cmap).unwrap();
        assert_matrix_eq!(result.reference_points_matrix(), row(&xi), comp = abs, tol = 1e-10);
        let jk = result.jacobians.j(0) * result.jacobians.k(0);
        assert_matrix_eq!(jk, DMatrix::<f64>::identity(3, 3), comp = abs, tol = 1e-10);
    }

    #[test]
    fn affine_determinant_has_constant_sign(
        vertices in affine_simplex(2),
        points in prop::collection::vec(reference_point(CellType::Triangle), 1..6)
    ) {
        let cmap = CoordinateMap::new(CellType::Triangle, 1).unwrap();
        let reference = DMatrix::from_fn(points.len(), 2, |p, i| points[p][i]);
        let x = cmap.push_forward(&reference, &vertices).unwrap();
        let result = pull_back(&x, &vertices, &cmap).unwrap();
        let det_j = &result.jacobians.det_j;
        prop_assert!(det_j.iter().all(|&d| d > 0.0));
        prop_assert!(det_j.iter().all(|&d| d == det_j[0]));
    }

    #[test]
    fn curved_triangle_round_trip(coordinate_dofs in curved_triangle(), xi in reference_point(CellType::Triangle)) {
        let cmap = CoordinateMap::new(CellType::Triangle, 2).unwrap();
        let x = cmap.push_forward(&row(&xi), &coordinate_dofs).unwrap();
        let result = pull_back(&x, &coordinate_dofs, &cmap).unwrap();
        assert_matrix_eq!(result.reference_points_matrix(), row(&xi), comp = abs, tol = 1e-8);
        let jk = result.jacobians.j(0) * result.jacobians.k(0);
        assert_matrix_eq!(jk, DMatrix::<f64>::identity(2, 2), comp = abs, tol = 1e-10);
    }
}
