use fenris_contact::array::Array;
use fenris_contact::basis::{evaluate_basis_functions, evaluate_basis_shape, get_basis_functions};
use fenris_contact::cell::CellType;
use fenris_contact::coordinate_map::CoordinateMap;
use fenris_contact::element::FiniteElement;
use fenris_contact::mesh::procedural::{create_curved_unit_square, create_unit_square};
use fenris_contact::mesh::Mesh;
use fenris_contact::space::FunctionSpace;
use fenris_contact::Error;
use matrixcompare::assert_scalar_eq;
use nalgebra::DMatrix;
use std::sync::Arc;

use super::reordered_unit_square;

fn stretched_triangle() -> DMatrix<f64> {
    DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 3.0, 1.0, 1.0, 2.0])
}

/// One physical point per cell: the image of the reference midpoint.
fn cell_midpoints(mesh: &Mesh) -> DMatrix<f64> {
    let geometry = mesh.geometry();
    let midpoint = mesh.cell_type().midpoint();
    let reference = DMatrix::from_row_slice(1, midpoint.len(), midpoint.as_slice());
    let mut x = DMatrix::zeros(mesh.num_cells(), mesh.gdim());
    for cell in 0..mesh.num_cells() {
        let x_c = geometry
            .cmap()
            .push_forward(&reference, &geometry.cell_coordinate_dofs(cell))
            .unwrap();
        x.row_mut(cell).copy_from(&x_c);
    }
    x
}

#[test]
fn linear_basis_on_affine_triangle() {
    let cmap = CoordinateMap::new(CellType::Triangle, 1).unwrap();
    let element = FiniteElement::lagrange(CellType::Triangle, 1).unwrap();
    let x = DMatrix::from_row_slice(1, 2, &[2.0, 1.5]);
    let result = get_basis_functions(&x, &stretched_triangle(), 0, 0, &element, &cmap, 1).unwrap();

    assert_eq!(result.values.shape(), [3, 1, 3, 1]);
    let expected = [[0.0, 0.5, 0.5], [-1.0, 1.0, 0.0], [-1.0, 0.0, 1.0]];
    for (d, expected_d) in expected.iter().enumerate() {
        for (i, &value) in expected_d.iter().enumerate() {
            assert_scalar_eq!(result.values[[d, 0, i, 0]], value, comp = abs, tol = 1e-14);
        }
    }
    assert_scalar_eq!(result.jacobians.det_j[0], 2.0, comp = abs, tol = 1e-14);
}

#[test]
fn blocked_basis_is_expanded_per_component() {
    let cmap = CoordinateMap::new(CellType::Triangle, 1).unwrap();
    let scalar = FiniteElement::lagrange(CellType::Triangle, 1).unwrap();
    let element = FiniteElement::blocked(scalar, 2).unwrap();
    let x = DMatrix::from_row_slice(1, 2, &[2.0, 1.5]);
    let result = get_basis_functions(&x, &stretched_triangle(), 0, 0, &element, &cmap, 0).unwrap();

    assert_eq!(result.values.shape(), [1, 1, 6, 2]);
    let scalar_values = [0.0, 0.5, 0.5];
    for i in 0..3 {
        for block in 0..2 {
            for component in 0..2 {
                let expected = if component == block { scalar_values[i] } else { 0.0 };
                let value = result.values[[0, 0, 2 * i + block, component]];
                assert_scalar_eq!(value, expected, comp = abs, tol = 1e-14);
            }
        }
    }
}

#[test]
fn negative_cell_gives_zero_basis() {
    let cmap = CoordinateMap::new(CellType::Triangle, 1).unwrap();
    let element = FiniteElement::lagrange(CellType::Triangle, 2).unwrap();
    let x = DMatrix::from_row_slice(2, 2, &[2.0, 1.5, 1.5, 1.2]);
    let result = get_basis_functions(&x, &stretched_triangle(), -1, 0, &element, &cmap, 1).unwrap();
    assert_eq!(result.values.shape(), [3, 2, 6, 1]);
    assert!(result.values.as_slice().iter().all(|&v| v == 0.0));
    assert!(result.jacobians.det_j.iter().all(|&d| d == 0.0));
}

#[test]
fn second_derivatives_are_unsupported() {
    let cmap = CoordinateMap::new(CellType::Triangle, 1).unwrap();
    let element = FiniteElement::lagrange(CellType::Triangle, 1).unwrap();
    let x = DMatrix::from_row_slice(1, 2, &[2.0, 1.5]);
    let result = get_basis_functions(&x, &stretched_triangle(), 0, 0, &element, &cmap, 2);
    assert!(matches!(result, Err(Error::Unsupported(_))));
}

#[test]
fn nedelec_basis_is_covariant_and_reflected() {
    let cmap = CoordinateMap::new(CellType::Triangle, 1).unwrap();
    let element = FiniteElement::nedelec(CellType::Triangle).unwrap();
    let x = DMatrix::from_row_slice(1, 2, &[1.4, 1.3]);
    let reference_point = DMatrix::from_row_slice(1, 2, &[0.2, 0.3]);
    let reference = element.tabulate(0, &reference_point).unwrap();

    let plain = get_basis_functions(&x, &stretched_triangle(), 0, 0, &element, &cmap, 0).unwrap();
    let reflected = get_basis_functions(&x, &stretched_triangle(), 0, 0b001, &element, &cmap, 0).unwrap();

    // K = diag(1/2, 1), so the physical value is (phi_x / 2, phi_y)
    let scale = [0.5, 1.0];
    for i in 0..3 {
        let sign = if i == 0 { -1.0 } else { 1.0 };
        for c in 0..2 {
            let expected = scale[c] * reference[[0, 0, i, c]];
            assert_scalar_eq!(plain.values[[0, 0, i, c]], expected, comp = abs, tol = 1e-14);
            assert_scalar_eq!(reflected.values[[0, 0, i, c]], sign * expected, comp = abs, tol = 1e-14);
        }
    }
}

#[test]
fn nedelec_evaluation_on_reordered_mesh_uses_cell_permutations() {
    let mesh = Arc::new(reordered_unit_square(2));
    let permutations = mesh.topology().cell_permutation_info();
    assert!(permutations.iter().any(|&info| info != 0));

    let element = FiniteElement::nedelec(CellType::Triangle).unwrap();
    let space = FunctionSpace::new(mesh.clone(), element.clone()).unwrap();
    let x = cell_midpoints(&mesh);
    let cells: Vec<i32> = (0..mesh.num_cells() as i32).collect();
    let mut values = Array::zeros(evaluate_basis_shape(&space, x.nrows(), 1));
    evaluate_basis_functions(&space, &x, &cells, &mut values, 1).unwrap();

    let geometry = mesh.geometry();
    let mut num_reflected = 0;
    for cell in 0..mesh.num_cells() {
        let point = DMatrix::from_row_slice(1, 2, &[x[(cell, 0)], x[(cell, 1)]]);
        let coordinate_dofs = geometry.cell_coordinate_dofs(cell);
        let perm = permutations[cell];
        let expected =
            get_basis_functions(&point, &coordinate_dofs, cell as i32, perm, &element, geometry.cmap(), 1).unwrap();
        let unreflected =
            get_basis_functions(&point, &coordinate_dofs, cell as i32, 0, &element, geometry.cmap(), 1).unwrap();
        for d in 0..3 {
            for i in 0..3 {
                for c in 0..2 {
                    let value = values[[d, cell, i, c]];
                    assert_scalar_eq!(value, expected.values[[d, 0, i, c]], comp = abs, tol = 1e-12);
                }
                // Reflected edges flip the sign of their basis function
                let sign = if perm & (1 << i) != 0 { -1.0 } else { 1.0 };
                for c in 0..2 {
                    let flipped = sign * unreflected.values[[0, 0, i, c]];
                    assert_scalar_eq!(values[[0, cell, i, c]], flipped, comp = abs, tol = 1e-12);
                }
            }
        }
        if perm != 0 {
            num_reflected += 1;
        }
    }
    assert!(num_reflected > 0);
}

#[test]
fn quadratic_basis_is_partition_of_unity_on_curved_mesh() {
    let mesh = Arc::new(create_curved_unit_square(3, 0.02).unwrap());
    let element = FiniteElement::lagrange(CellType::Triangle, 2).unwrap();
    let space = FunctionSpace::new(mesh.clone(), element).unwrap();

    let x = cell_midpoints(&mesh);
    let cells: Vec<i32> = (0..mesh.num_cells() as i32).collect();
    let shape = evaluate_basis_shape(&space, x.nrows(), 1);
    assert_eq!(shape, [3, x.nrows(), 6, 1]);
    let mut values = Array::zeros(shape);
    evaluate_basis_functions(&space, &x, &cells, &mut values, 1).unwrap();

    for p in 0..x.nrows() {
        let sum: f64 = (0..6).map(|i| values[[0, p, i, 0]]).sum();
        assert_scalar_eq!(sum, 1.0, comp = abs, tol = 1e-10);
        for d in 1..3 {
            let derivative_sum: f64 = (0..6).map(|i| values[[d, p, i, 0]]).sum();
            assert_scalar_eq!(derivative_sum, 0.0, comp = abs, tol = 1e-10);
        }
    }
}

#[test]
fn negative_cells_are_zero_filled() {
    let mesh = Arc::new(create_unit_square(2, 2, CellType::Triangle).unwrap());
    let element = FiniteElement::lagrange(CellType::Triangle, 1).unwrap();
    let space = FunctionSpace::new(mesh.clone(), element).unwrap();

    let x = cell_midpoints(&mesh).rows(0, 2).clone_owned();
    let mut values = Array::zeros(evaluate_basis_shape(&space, 2, 0));
    values.fill(7.0);
    evaluate_basis_functions(&space, &x, &[0, -1], &mut values, 0).unwrap();

    let first: f64 = (0..3).map(|i| values[[0, 0, i, 0]]).sum();
    assert_scalar_eq!(first, 1.0, comp = abs, tol = 1e-14);
    for i in 0..3 {
        assert_eq!(values[[0, 1, i, 0]], 0.0);
    }
}

#[test]
fn evaluate_basis_functions_rejects_invalid_input() {
    let mesh = Arc::new(create_unit_square(2, 2, CellType::Triangle).unwrap());
    let element = FiniteElement::lagrange(CellType::Triangle, 1).unwrap();
    let space = FunctionSpace::new(mesh.clone(), element).unwrap();
    let x = cell_midpoints(&mesh).rows(0, 2).clone_owned();
    let mut values = Array::zeros(evaluate_basis_shape(&space, 2, 0));

    // Fewer cells than points
    let result = evaluate_basis_functions(&space, &x, &[0], &mut values, 0);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));

    // Output sized for a different number of points
    let mut wrong = Array::zeros(evaluate_basis_shape(&space, 3, 0));
    let result = evaluate_basis_functions(&space, &x, &[0, 1], &mut wrong, 0);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));

    // Cell out of range
    let result = evaluate_basis_functions(&space, &x, &[0, 100], &mut values, 0);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));

    // Empty input is a no-op
    let mut empty = Array::zeros(evaluate_basis_shape(&space, 0, 0));
    evaluate_basis_functions(&space, &DMatrix::zeros(0, 2), &[], &mut empty, 0).unwrap();
}

#[test]
fn mixed_spaces_are_unsupported() {
    let mesh = Arc::new(create_unit_square(1, 1, CellType::Triangle).unwrap());
    let mixed = FiniteElement::mixed(vec![
        FiniteElement::lagrange(CellType::Triangle, 2).unwrap(),
        FiniteElement::lagrange(CellType::Triangle, 1).unwrap(),
    ])
    .unwrap();
    let space = FunctionSpace::new(mesh.clone(), mixed).unwrap();
    let x = cell_midpoints(&mesh);
    let mut values = Array::zeros([1, x.nrows(), 9, 1]);
    let result = evaluate_basis_functions(&space, &x, &[0, 1], &mut values, 0);
    assert!(matches!(result, Err(Error::Unsupported(_))));
}
