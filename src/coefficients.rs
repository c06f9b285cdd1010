//! Packing of finite element functions at the quadrature points of mesh entities.
//!
//! The packed buffer is entity-major: the values for entity `i` occupy
//! `coefficients[i * cstride..(i + 1) * cstride]` with `cstride = vs * bs * num_points`, and
//! within an entity component `j` of block `k` at quadrature point `q` is stored at
//! `q * (bs * vs) + k * vs + j`.
use crate::coordinate_map::CoordinateMap;
use crate::element::MapType;
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::quadrature::QuadratureRule;
use crate::space::Function;
use log::{debug, trace};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntegralType {
    Cell,
    ExteriorFacet,
    InteriorFacet,
    Vertex,
}

/// Resolves boundary facets to their (cell, local facet index) pair.
///
/// Negative facet indices resolve to `None`.
///
/// # Errors
///
/// Fails if a facet is out of range or not attached to exactly one cell.
pub fn facet_to_cell_local(mesh: &Mesh, facets: &[i32]) -> Result<Vec<Option<(usize, usize)>>> {
    let topology = mesh.topology();
    let tdim = topology.dim();
    let facet_cells = topology.connectivity(tdim - 1, tdim);
    let cell_facets = topology.connectivity(tdim, tdim - 1);

    facets
        .iter()
        .map(|&facet| {
            if facet < 0 {
                return Ok(None);
            }
            let facet = facet as usize;
            let cells = facet_cells
                .get(facet)
                .ok_or_else(|| Error::invalid_argument(format!("facet {} is out of range", facet)))?;
            match cells {
                &[cell] => {
                    let local = cell_facets
                        .links(cell)
                        .iter()
                        .position(|&f| f == facet)
                        .ok_or_else(|| {
                            Error::invalid_argument(format!("facet {} is not a facet of cell {}", facet, cell))
                        })?;
                    Ok(Some((cell, local)))
                }
                _ => Err(Error::invalid_argument(format!(
                    "facet {} is connected to {} cells, expected a boundary facet",
                    facet,
                    cells.len()
                ))),
            }
        })
        .collect()
}

fn cell_entities(mesh: &Mesh, cells: &[i32]) -> Result<Vec<Option<(usize, usize)>>> {
    cells
        .iter()
        .map(|&cell| match cell {
            c if c < 0 => Ok(None),
            c if (c as usize) < mesh.num_cells() => Ok(Some((c as usize, 0))),
            c => Err(Error::invalid_argument(format!("cell {} is out of range", c))),
        })
        .collect()
}

/// Per-thread scratch space for packing.
struct PackingBuffers {
    coordinate_dofs: DMatrix<f64>,
    reference: Vec<f64>,
    physical: Vec<f64>,
}

/// Evaluates `function` at the quadrature points of degree `q_degree` of every active entity.
///
/// For cell integrals the active entities are cells, for exterior facet integrals they are
/// boundary facets. Negative entity indices yield zeros. Returns the packed values and the
/// per-entity stride.
pub fn pack_coefficient_quadrature(
    function: &Function,
    q_degree: usize,
    integral: IntegralType,
    active_entities: &[i32],
) -> Result<(Vec<f64>, usize)> {
    let space = function.function_space();
    let mesh = space.mesh();
    let tdim = mesh.tdim();
    let gdim = mesh.gdim();

    let (rule, entities) = match integral {
        IntegralType::Cell => (
            QuadratureRule::new(mesh.cell_type(), q_degree, tdim)?,
            cell_entities(mesh, active_entities)?,
        ),
        IntegralType::ExteriorFacet => (
            QuadratureRule::new(mesh.cell_type(), q_degree, tdim - 1)?,
            facet_to_cell_local(mesh, active_entities)?,
        ),
        other => {
            return Err(Error::unsupported(format!(
                "coefficient packing for {:?} integrals",
                other
            )))
        }
    };

    let element = space.element();
    let map = element
        .map_type()
        .ok_or_else(|| Error::unsupported("coefficient packing for a mixed element"))?;
    let dofmap = space.dofmap();
    let bs = dofmap.bs();
    let num_dofs = element.base_space_dimension();
    let rvs = element.base_reference_value_size();
    let vs = element.base_value_size(gdim);
    let num_points = rule.num_points();
    let cstride = vs * bs * num_points;

    // Tabulate once at the points of every reference sub-entity
    let points = rule.stacked_points();
    let table = element.tabulate(0, &points)?;

    let mut coefficients = vec![0.0; entities.len() * cstride];
    if coefficients.is_empty() {
        return Ok((coefficients, cstride));
    }
    let data = function.x();

    if !element.needs_dof_transformations() && map == MapType::Identity {
        debug!("Packing coefficients without dof transformations.");
        coefficients
            .par_chunks_mut(cstride)
            .zip(entities.par_iter())
            .for_each(|(entity_coefficients, entity)| {
                let Some((cell, local_index)) = *entity else { return };
                trace!("Packing coefficients on cell {}.", cell);
                for (d, &dof) in dofmap.cell_dofs(cell).iter().enumerate() {
                    for q in 0..num_points {
                        let row = local_index * num_points + q;
                        for k in 0..bs {
                            for j in 0..vs {
                                entity_coefficients[q * (bs * vs) + k * vs + j] +=
                                    table[[0, row, d, j]] * data[bs * dof + k];
                            }
                        }
                    }
                }
            });
        return Ok((coefficients, cstride));
    }

    debug!("Packing coefficients with dof transformations and push-forward.");
    let geometry = mesh.geometry();
    let cmap = geometry.cmap();
    let cmap_table = cmap.tabulate(1, &points)?;
    let cell_info = mesh.topology().cell_permutation_info();
    coefficients
        .par_chunks_mut(cstride)
        .zip(entities.par_iter())
        .for_each_init(
            || PackingBuffers {
                coordinate_dofs: DMatrix::zeros(cmap.dim(), gdim),
                reference: vec![0.0; num_dofs * rvs],
                physical: vec![0.0; num_dofs * vs],
            },
            |buffers, (entity_coefficients, entity)| {
                let Some((cell, local_index)) = *entity else { return };
                trace!("Packing coefficients on cell {}.", cell);
                geometry.copy_cell_coordinate_dofs(cell, &mut buffers.coordinate_dofs);
                let dofs = dofmap.cell_dofs(cell);
                for q in 0..num_points {
                    let row = local_index * num_points + q;
                    let dphi = CoordinateMap::derivative_matrix(&cmap_table, row, 1..tdim + 1);
                    let j = CoordinateMap::compute_jacobian(&dphi, &buffers.coordinate_dofs);
                    let k = CoordinateMap::compute_jacobian_inverse(&j);
                    let det_j = CoordinateMap::compute_jacobian_determinant(&j);

                    buffers.reference.copy_from_slice(table.lane(&[0, row]));
                    element.apply_dof_transformation(&mut buffers.reference, cell_info[cell], rvs);
                    map.push_forward(&buffers.reference, &mut buffers.physical, num_dofs, &j, det_j, &k);

                    for (d, &dof) in dofs.iter().enumerate() {
                        for b in 0..bs {
                            for c in 0..vs {
                                entity_coefficients[q * (bs * vs) + b * vs + c] +=
                                    buffers.physical[d * vs + c] * data[bs * dof + b];
                            }
                        }
                    }
                }
            },
        );

    Ok((coefficients, cstride))
}
