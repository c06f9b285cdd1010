use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::space::Function;
use log::debug;
use nalgebra::RealField;
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The result of [`sort_cells`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortedCells {
    /// `cells[perm[i]]` is non-decreasing in `i`. Equal cells keep their relative order.
    pub perm: Vec<usize>,
    /// The distinct cells in increasing order.
    pub unique: Vec<i32>,
    /// Positions `perm[offsets[i]..offsets[i + 1]]` hold the occurrences of `unique[i]`.
    pub offsets: Vec<usize>,
}

/// Stable argsort of 32-bit keys by least significant digit radix sort.
fn argsort_radix(keys: &[u32]) -> Vec<usize> {
    const BITS: u32 = 8;
    const BUCKETS: usize = 1 << BITS;
    const MASK: u32 = (BUCKETS - 1) as u32;

    let mut perm: Vec<usize> = (0..keys.len()).collect();
    let mut buffer = vec![0; keys.len()];
    for pass in 0..(u32::BITS / BITS) {
        let shift = pass * BITS;
        let digit = |i: usize| ((keys[i] >> shift) & MASK) as usize;

        let mut counts = [0usize; BUCKETS + 1];
        for &i in &perm {
            counts[digit(i) + 1] += 1;
        }
        // All keys share this digit
        if counts.iter().any(|&c| c == keys.len()) {
            continue;
        }
        for b in 0..BUCKETS {
            counts[b + 1] += counts[b];
        }
        for &i in &perm {
            let d = digit(i);
            buffer[counts[d]] = i;
            counts[d] += 1;
        }
        std::mem::swap(&mut perm, &mut buffer);
    }
    perm
}

/// Sorts a list of (possibly repeated) cells, grouping the positions at which each cell occurs.
///
/// For example `[5, 3, 5, 1, 3]` gives the unique cells `[1, 3, 5]`, the offsets `[0, 1, 3, 5]`
/// and the permutation `[3, 1, 4, 0, 2]`.
pub fn sort_cells(cells: &[i32]) -> SortedCells {
    // Flipping the sign bit makes the unsigned order match the signed order
    let keys: Vec<u32> = cells.iter().map(|&c| (c as u32) ^ 0x8000_0000).collect();
    let perm = argsort_radix(&keys);

    let mut unique = Vec::new();
    let mut offsets = vec![0];
    for (i, &p) in perm.iter().enumerate() {
        let cell = cells[p];
        if unique.last() != Some(&cell) {
            if i > 0 {
                offsets.push(i);
            }
            unique.push(cell);
        }
    }
    if !cells.is_empty() {
        offsets.push(cells.len());
    }

    SortedCells { perm, unique, offsets }
}

/// Adds the values of a vector-valued function to the node coordinates of the mesh it is
/// defined on.
///
/// `mesh` must be the mesh of the function space of `u`, whose dof layout must match that of
/// the coordinate map up to the block size, which may not exceed 3. The coordinates are updated
/// in place, so every function space sharing the mesh sees the displaced geometry.
pub fn update_geometry(u: &Function, mesh: &Mesh) -> Result<()> {
    let space = u.function_space();
    if !std::ptr::eq(mesh, Arc::as_ptr(space.mesh())) {
        return Err(Error::invalid_argument(
            "displacement is not defined on the mesh to be updated",
        ));
    }
    let dofmap = space.dofmap();
    let bs = dofmap.bs();
    if bs > 3 {
        return Err(Error::invalid_argument(format!(
            "displacement has block size {}, at most 3 is supported",
            bs
        )));
    }
    if !dofmap
        .element_dof_layout()
        .matches_unblocked(&mesh.geometry().cmap().dof_layout())
    {
        return Err(Error::invalid_argument(
            "dof layout of the displacement does not match the layout of the mesh geometry",
        ));
    }

    let geometry = mesh.geometry();
    let mut dx = vec![0.0; 3 * geometry.num_nodes()];
    let values = u.x();
    for cell in 0..mesh.num_cells() {
        let dofs = dofmap.cell_dofs(cell);
        let nodes = geometry.dofmap().links(cell);
        for (&dof, &node) in dofs.iter().zip(nodes) {
            for j in 0..bs {
                dx[3 * node + j] = values[bs * dof + j];
            }
        }
    }

    debug!("Updating {} geometry nodes.", geometry.num_nodes());
    for (x, dx) in geometry.x_write().iter_mut().zip(dx) {
        *x += dx;
    }
    Ok(())
}

/// The positive part `(|x| + x) / 2`.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn r_plus<T: RealField + Copy>(x: T) -> T {
    0.5 * (x.abs() + x)
}

/// The negative part `(x - |x|) / 2`.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn r_minus<T: RealField + Copy>(x: T) -> T {
    0.5 * (x - x.abs())
}

/// Derivative of [`r_plus`], taken as zero at the origin.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn dr_plus<T: RealField + Copy>(x: T) -> T {
    if x > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Derivative of [`r_minus`], taken as zero at the origin.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn dr_minus<T: RealField + Copy>(x: T) -> T {
    if x < 0.0 {
        1.0
    } else {
        0.0
    }
}
