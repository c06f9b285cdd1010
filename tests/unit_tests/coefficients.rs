use fenris_contact::array::Array;
use fenris_contact::basis::{evaluate_basis_functions, evaluate_basis_shape};
use fenris_contact::cell::CellType;
use fenris_contact::coefficients::{facet_to_cell_local, pack_coefficient_quadrature, IntegralType};
use fenris_contact::element::FiniteElement;
use fenris_contact::mesh::procedural::{create_curved_unit_square, create_unit_cube, create_unit_square};
use fenris_contact::mesh::Mesh;
use fenris_contact::quadrature::QuadratureRule;
use fenris_contact::space::{Function, FunctionSpace};
use fenris_contact::Error;
use matrixcompare::assert_scalar_eq;
use std::sync::Arc;

use super::reordered_unit_square;

fn interpolated_function(mesh: &Arc<Mesh>, degree: usize, bs: usize, f: impl Fn(&[f64], &mut [f64])) -> Function {
    let scalar = FiniteElement::lagrange(mesh.cell_type(), degree).unwrap();
    let element = FiniteElement::blocked(scalar, bs).unwrap();
    let space = FunctionSpace::new(mesh.clone(), element).unwrap();
    let mut u = Function::new(space);
    u.interpolate(f).unwrap();
    u
}

fn all_cells(mesh: &Mesh) -> Vec<i32> {
    (0..mesh.num_cells() as i32).collect()
}

fn exterior_facets(mesh: &Mesh) -> Vec<i32> {
    mesh.topology()
        .exterior_facets()
        .into_iter()
        .map(|f| f as i32)
        .collect()
}

#[test]
fn constant_field_is_reproduced_on_cells() {
    let mesh = Arc::new(create_unit_square(3, 2, CellType::Triangle).unwrap());
    let u = interpolated_function(&mesh, 1, 1, |_, u| u[0] = 3.0);
    let cells = all_cells(&mesh);
    let (coefficients, cstride) = pack_coefficient_quadrature(&u, 2, IntegralType::Cell, &cells).unwrap();

    let num_points = QuadratureRule::new(CellType::Triangle, 2, 2).unwrap().num_points();
    assert_eq!(cstride, num_points);
    assert_eq!(coefficients.len(), cells.len() * cstride);
    for &c in &coefficients {
        assert_scalar_eq!(c, 3.0, comp = abs, tol = 1e-13);
    }
}

#[test]
fn constant_vector_field_is_reproduced_on_exterior_facets() {
    let mesh = Arc::new(create_unit_cube(2, CellType::Hexahedron).unwrap());
    let u = interpolated_function(&mesh, 1, 3, |_, u| u.copy_from_slice(&[1.0, -2.0, 0.5]));
    let facets = exterior_facets(&mesh);
    assert_eq!(facets.len(), 24);
    let (coefficients, cstride) = pack_coefficient_quadrature(&u, 1, IntegralType::ExteriorFacet, &facets).unwrap();

    let num_points = QuadratureRule::new(CellType::Hexahedron, 1, 2).unwrap().num_points();
    assert_eq!(cstride, 3 * num_points);
    for entity in coefficients.chunks_exact(cstride) {
        for point in entity.chunks_exact(3) {
            assert_scalar_eq!(point[0], 1.0, comp = abs, tol = 1e-13);
            assert_scalar_eq!(point[1], -2.0, comp = abs, tol = 1e-13);
            assert_scalar_eq!(point[2], 0.5, comp = abs, tol = 1e-13);
        }
    }
}

#[test]
fn linear_field_is_exact_at_facet_points_of_curved_mesh() {
    let mesh = Arc::new(create_curved_unit_square(3, 0.02).unwrap());
    let u = interpolated_function(&mesh, 2, 2, |x, u| {
        u[0] = x[0];
        u[1] = 2.0 * x[1] - x[0];
    });
    let facets = exterior_facets(&mesh);
    let q_degree = 3;
    let (coefficients, cstride) =
        pack_coefficient_quadrature(&u, q_degree, IntegralType::ExteriorFacet, &facets).unwrap();

    let rule = QuadratureRule::new(CellType::Triangle, q_degree, 1).unwrap();
    let num_points = rule.num_points();
    assert_eq!(cstride, 2 * num_points);

    let geometry = mesh.geometry();
    let entities = facet_to_cell_local(&mesh, &facets).unwrap();
    for (i, entity) in entities.iter().enumerate() {
        let (cell, local_index) = entity.unwrap();
        let x = geometry
            .cmap()
            .push_forward(&rule.points()[local_index], &geometry.cell_coordinate_dofs(cell))
            .unwrap();
        for q in 0..num_points {
            let (x0, x1) = (x[(q, 0)], x[(q, 1)]);
            let packed = &coefficients[i * cstride + 2 * q..i * cstride + 2 * q + 2];
            assert_scalar_eq!(packed[0], x0, comp = abs, tol = 1e-12);
            assert_scalar_eq!(packed[1], 2.0 * x1 - x0, comp = abs, tol = 1e-12);
        }
    }
}

#[test]
fn negative_entities_are_zero_filled() {
    let mesh = Arc::new(create_unit_square(2, 2, CellType::Quadrilateral).unwrap());
    let u = interpolated_function(&mesh, 1, 2, |_, u| u.copy_from_slice(&[1.0, 1.0]));
    let (coefficients, cstride) = pack_coefficient_quadrature(&u, 2, IntegralType::Cell, &[2, -1, 0]).unwrap();
    assert_eq!(coefficients.len(), 3 * cstride);
    assert!(coefficients[..cstride].iter().all(|&c| (c - 1.0).abs() < 1e-13));
    assert!(coefficients[cstride..2 * cstride].iter().all(|&c| c == 0.0));
    assert!(coefficients[2 * cstride..].iter().all(|&c| (c - 1.0).abs() < 1e-13));
}

#[test]
fn empty_input_gives_empty_output() {
    let mesh = Arc::new(create_unit_square(1, 1, CellType::Triangle).unwrap());
    let u = interpolated_function(&mesh, 1, 1, |_, u| u[0] = 1.0);
    let (coefficients, cstride) = pack_coefficient_quadrature(&u, 2, IntegralType::Cell, &[]).unwrap();
    assert!(coefficients.is_empty());
    assert!(cstride > 0);
}

#[test]
fn unsupported_integrals_and_invalid_facets_are_rejected() {
    let mesh = Arc::new(create_unit_square(2, 2, CellType::Triangle).unwrap());
    let u = interpolated_function(&mesh, 1, 1, |_, u| u[0] = 1.0);

    let result = pack_coefficient_quadrature(&u, 1, IntegralType::InteriorFacet, &[0]);
    assert!(matches!(result, Err(Error::Unsupported(_))));
    let result = pack_coefficient_quadrature(&u, 1, IntegralType::Vertex, &[0]);
    assert!(matches!(result, Err(Error::Unsupported(_))));

    let topology = mesh.topology();
    let tdim = topology.dim();
    let interior = (0..topology.num_entities(tdim - 1))
        .find(|&f| topology.connectivity(tdim - 1, tdim).num_links(f) == 2)
        .unwrap();
    let result = pack_coefficient_quadrature(&u, 1, IntegralType::ExteriorFacet, &[interior as i32]);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));

    let result = pack_coefficient_quadrature(&u, 1, IntegralType::Cell, &[mesh.num_cells() as i32]);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[test]
fn facet_to_cell_local_resolves_boundary_facets() {
    let mesh = create_unit_cube(1, CellType::Tetrahedron).unwrap();
    let topology = mesh.topology();
    let mut facets = exterior_facets(&mesh);
    assert_eq!(facets.len(), 12);
    facets.push(-1);

    let entities = facet_to_cell_local(&mesh, &facets).unwrap();
    assert_eq!(entities.last(), Some(&None));
    let cell_facets = topology.connectivity(3, 2);
    for (&facet, entity) in facets.iter().zip(&entities).take(12) {
        let (cell, local_index) = entity.unwrap();
        assert_eq!(cell_facets.links(cell)[local_index], facet as usize);
    }
}

#[test]
fn nedelec_packing_agrees_with_basis_evaluation() {
    let mesh = Arc::new(reordered_unit_square(2));
    assert!(mesh.topology().cell_permutation_info().iter().any(|&info| info != 0));
    let element = FiniteElement::nedelec(CellType::Triangle).unwrap();
    let space = FunctionSpace::new(mesh.clone(), element).unwrap();
    let num_dofs = space.dofmap().num_dofs();
    let values: Vec<f64> = (0..num_dofs).map(|i| 1.0 + 0.25 * i as f64).collect();
    let u = Function::from_values(space.clone(), values.clone()).unwrap();

    let q_degree = 2;
    let cells = all_cells(&mesh);
    let (coefficients, cstride) = pack_coefficient_quadrature(&u, q_degree, IntegralType::Cell, &cells).unwrap();
    let rule = QuadratureRule::new(CellType::Triangle, q_degree, 2).unwrap();
    let num_points = rule.num_points();
    assert_eq!(cstride, 2 * num_points);

    let geometry = mesh.geometry();
    for cell in 0..mesh.num_cells() {
        let x = geometry
            .cmap()
            .push_forward(&rule.points()[0], &geometry.cell_coordinate_dofs(cell))
            .unwrap();
        let mut basis = Array::zeros(evaluate_basis_shape(&space, num_points, 0));
        evaluate_basis_functions(&space, &x, &vec![cell as i32; num_points], &mut basis, 0).unwrap();

        let dofs = space.dofmap().cell_dofs(cell);
        for q in 0..num_points {
            for c in 0..2 {
                let expected: f64 = dofs
                    .iter()
                    .enumerate()
                    .map(|(i, &dof)| basis[[0, q, i, c]] * values[dof])
                    .sum();
                let packed = coefficients[cell * cstride + 2 * q + c];
                assert_scalar_eq!(packed, expected, comp = abs, tol = 1e-12);
            }
        }
    }
}

#[test]
fn nedelec_tangential_component_is_continuous_across_edges() {
    // Evaluating the field at the midpoint of an interior edge from both sides must agree
    // on the tangential component when the cell orientation is accounted for.
    let mesh = Arc::new(reordered_unit_square(2));
    let element = FiniteElement::nedelec(CellType::Triangle).unwrap();
    let space = FunctionSpace::new(mesh.clone(), element).unwrap();
    let num_dofs = space.dofmap().num_dofs();
    let values: Vec<f64> = (0..num_dofs).map(|i| (i as f64 * 0.7).sin()).collect();

    let topology = mesh.topology();
    let permutations = topology.cell_permutation_info();
    let mut num_mixed = 0;
    let geometry = mesh.geometry();
    let edge_cells = topology.connectivity(1, 2);
    let edge_vertices = topology.connectivity(1, 0);
    let vertex_coordinates = |v: usize| -> [f64; 2] {
        // Vertices of a P1 mesh are its nodes in the same order
        let x = geometry.x();
        [x[3 * v], x[3 * v + 1]]
    };

    let mut num_checked = 0;
    for edge in 0..topology.num_entities(1) {
        let cells = edge_cells.links(edge);
        if cells.len() != 2 {
            continue;
        }
        let [a, b] = [edge_vertices.links(edge)[0], edge_vertices.links(edge)[1]];
        let (xa, xb) = (vertex_coordinates(a), vertex_coordinates(b));
        let midpoint = nalgebra::DMatrix::from_row_slice(1, 2, &[0.5 * (xa[0] + xb[0]), 0.5 * (xa[1] + xb[1])]);
        let tangent = [xb[0] - xa[0], xb[1] - xa[1]];

        let tangential: Vec<f64> = cells
            .iter()
            .map(|&cell| {
                let mut basis = Array::zeros(evaluate_basis_shape(&space, 1, 0));
                evaluate_basis_functions(&space, &midpoint, &[cell as i32], &mut basis, 0).unwrap();
                space
                    .dofmap()
                    .cell_dofs(cell)
                    .iter()
                    .enumerate()
                    .map(|(i, &dof)| values[dof] * (basis[[0, 0, i, 0]] * tangent[0] + basis[[0, 0, i, 1]] * tangent[1]))
                    .sum()
            })
            .collect();
        assert_scalar_eq!(tangential[0], tangential[1], comp = abs, tol = 1e-12);
        num_checked += 1;
        if permutations[cells[0]] != permutations[cells[1]] {
            num_mixed += 1;
        }
    }
    assert!(num_checked > 0);
    // Some shared edges must sit between differently oriented cells
    assert!(num_mixed > 0);
}
