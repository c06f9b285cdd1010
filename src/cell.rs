//! Reference cells and their sub-entity numbering.
//!
//! All reference cells live on the unit domain: the unit simplex spanned by the origin and
//! the unit vectors, or the unit hypercube `[0, 1]^d`. Sub-entities are numbered following
//! the DOLFINx/basix conventions, so that facet `i` of a simplex is the facet opposite
//! vertex `i`, and the vertices of the hypercube are ordered lexicographically with the
//! first coordinate varying fastest.
use nalgebra::{DMatrix, DVector, Vector3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellType {
    Point,
    Interval,
    Triangle,
    Quadrilateral,
    Tetrahedron,
    Hexahedron,
}

const POINT_VERTICES: [&[usize]; 1] = [&[0]];
const INTERVAL_VERTICES: [&[usize]; 2] = [&[0], &[1]];
const TRIANGLE_VERTICES: [&[usize]; 3] = [&[0], &[1], &[2]];
const QUADRILATERAL_VERTICES: [&[usize]; 4] = [&[0], &[1], &[2], &[3]];
const TETRAHEDRON_VERTICES: [&[usize]; 4] = [&[0], &[1], &[2], &[3]];
const HEXAHEDRON_VERTICES: [&[usize]; 8] = [&[0], &[1], &[2], &[3], &[4], &[5], &[6], &[7]];

const INTERVAL_CELL: [&[usize]; 1] = [&[0, 1]];

const TRIANGLE_EDGES: [&[usize]; 3] = [&[1, 2], &[0, 2], &[0, 1]];
const TRIANGLE_CELL: [&[usize]; 1] = [&[0, 1, 2]];

const QUADRILATERAL_EDGES: [&[usize]; 4] = [&[0, 1], &[0, 2], &[1, 3], &[2, 3]];
const QUADRILATERAL_CELL: [&[usize]; 1] = [&[0, 1, 2, 3]];

const TETRAHEDRON_EDGES: [&[usize]; 6] = [&[2, 3], &[1, 3], &[1, 2], &[0, 3], &[0, 2], &[0, 1]];
const TETRAHEDRON_FACES: [&[usize]; 4] = [&[1, 2, 3], &[0, 2, 3], &[0, 1, 3], &[0, 1, 2]];
const TETRAHEDRON_CELL: [&[usize]; 1] = [&[0, 1, 2, 3]];

#[rustfmt::skip]
const HEXAHEDRON_EDGES: [&[usize]; 12] = [
    &[0, 1], &[0, 2], &[0, 4], &[1, 3], &[1, 5], &[2, 3],
    &[2, 6], &[3, 7], &[4, 5], &[4, 6], &[5, 7], &[6, 7],
];
#[rustfmt::skip]
const HEXAHEDRON_FACES: [&[usize]; 6] = [
    &[0, 1, 2, 3], &[0, 1, 4, 5], &[0, 2, 4, 6],
    &[1, 3, 5, 7], &[2, 3, 6, 7], &[4, 5, 6, 7],
];
const HEXAHEDRON_CELL: [&[usize]; 1] = [&[0, 1, 2, 3, 4, 5, 6, 7]];

impl CellType {
    pub fn topological_dimension(self) -> usize {
        match self {
            Self::Point => 0,
            Self::Interval => 1,
            Self::Triangle | Self::Quadrilateral => 2,
            Self::Tetrahedron | Self::Hexahedron => 3,
        }
    }

    pub fn is_simplex(self) -> bool {
        matches!(self, Self::Point | Self::Interval | Self::Triangle | Self::Tetrahedron)
    }

    pub fn num_vertices(self) -> usize {
        self.sub_entities(0).len()
    }

    /// The local vertex lists of all sub-entities of the given dimension.
    ///
    /// # Panics
    ///
    /// Panics if `dim` exceeds the topological dimension of the cell.
    pub fn sub_entities(self, dim: usize) -> &'static [&'static [usize]] {
        use CellType::*;
        match (self, dim) {
            (Point, 0) => &POINT_VERTICES,
            (Interval, 0) => &INTERVAL_VERTICES,
            (Interval, 1) => &INTERVAL_CELL,
            (Triangle, 0) => &TRIANGLE_VERTICES,
            (Triangle, 1) => &TRIANGLE_EDGES,
            (Triangle, 2) => &TRIANGLE_CELL,
            (Quadrilateral, 0) => &QUADRILATERAL_VERTICES,
            (Quadrilateral, 1) => &QUADRILATERAL_EDGES,
            (Quadrilateral, 2) => &QUADRILATERAL_CELL,
            (Tetrahedron, 0) => &TETRAHEDRON_VERTICES,
            (Tetrahedron, 1) => &TETRAHEDRON_EDGES,
            (Tetrahedron, 2) => &TETRAHEDRON_FACES,
            (Tetrahedron, 3) => &TETRAHEDRON_CELL,
            (Hexahedron, 0) => &HEXAHEDRON_VERTICES,
            (Hexahedron, 1) => &HEXAHEDRON_EDGES,
            (Hexahedron, 2) => &HEXAHEDRON_FACES,
            (Hexahedron, 3) => &HEXAHEDRON_CELL,
            _ => panic!("{:?} has no sub-entities of dimension {}", self, dim),
        }
    }

    pub fn num_sub_entities(self, dim: usize) -> usize {
        self.sub_entities(dim).len()
    }

    /// The cell type of the sub-entities of the given dimension.
    ///
    /// All sub-entities of a given dimension share the same type for the supported cells.
    pub fn sub_entity_type(self, dim: usize) -> CellType {
        match (dim, self.sub_entities(dim)[0].len()) {
            (0, _) => Self::Point,
            (1, _) => Self::Interval,
            (2, 3) => Self::Triangle,
            (2, 4) => Self::Quadrilateral,
            (3, 4) => Self::Tetrahedron,
            (3, _) => Self::Hexahedron,
            _ => unreachable!("Sub-entity tables only contain valid cell types"),
        }
    }

    /// The type of the facets (sub-entities of co-dimension 1) of the cell.
    ///
    /// # Panics
    ///
    /// Panics for `Point`, which has no facets.
    pub fn facet_type(self) -> CellType {
        let tdim = self.topological_dimension();
        assert!(tdim > 0, "A point has no facets.");
        self.sub_entity_type(tdim - 1)
    }

    pub fn num_facets(self) -> usize {
        let tdim = self.topological_dimension();
        assert!(tdim > 0, "A point has no facets.");
        self.num_sub_entities(tdim - 1)
    }

    /// Position of the bit flagging a reflection of local edge `edge` in the cell permutation
    /// info.
    ///
    /// Three-dimensional cells store three bits per face first (reflection followed by a
    /// two-bit rotation count), and the edge bits after those.
    pub fn edge_reflection_bit(self, edge: usize) -> usize {
        match self.topological_dimension() {
            3 => 3 * self.num_sub_entities(2) + edge,
            _ => edge,
        }
    }

    /// Position of the bit flagging a reflection of local face `face` in the cell permutation
    /// info. The two bits above it hold the number of rotations.
    pub fn face_reflection_bit(self, face: usize) -> usize {
        3 * face
    }

    /// The vertices of the reference cell, stored row-wise (`num_vertices x tdim`).
    #[rustfmt::skip]
    pub fn reference_vertices(self) -> DMatrix<f64> {
        let (nrows, coords): (usize, &[f64]) = match self {
            Self::Point => (1, &[]),
            Self::Interval => (2, &[0.0, 1.0]),
            Self::Triangle => (3, &[0.0, 0.0,
                                    1.0, 0.0,
                                    0.0, 1.0]),
            Self::Quadrilateral => (4, &[0.0, 0.0,
                                         1.0, 0.0,
                                         0.0, 1.0,
                                         1.0, 1.0]),
            Self::Tetrahedron => (4, &[0.0, 0.0, 0.0,
                                       1.0, 0.0, 0.0,
                                       0.0, 1.0, 0.0,
                                       0.0, 0.0, 1.0]),
            Self::Hexahedron => (8, &[0.0, 0.0, 0.0,
                                      1.0, 0.0, 0.0,
                                      0.0, 1.0, 0.0,
                                      1.0, 1.0, 0.0,
                                      0.0, 0.0, 1.0,
                                      1.0, 0.0, 1.0,
                                      0.0, 1.0, 1.0,
                                      1.0, 1.0, 1.0]),
        };
        DMatrix::from_row_slice(nrows, self.topological_dimension(), coords)
    }

    /// The volume (length, area) of the reference cell.
    pub fn reference_volume(self) -> f64 {
        match self {
            Self::Point | Self::Interval | Self::Quadrilateral | Self::Hexahedron => 1.0,
            Self::Triangle => 0.5,
            Self::Tetrahedron => 1.0 / 6.0,
        }
    }

    /// The barycenter of the reference vertices.
    pub fn midpoint(self) -> DVector<f64> {
        let vertices = self.reference_vertices();
        let n = vertices.nrows() as f64;
        vertices.row_sum().transpose() / n
    }

    /// The Jacobian of the affine map from the reference facet onto each facet of this cell.
    ///
    /// Each matrix has dimensions `tdim x (tdim - 1)`. Column `k` is the difference between
    /// vertex `k + 1` and vertex `0` of the facet.
    pub fn facet_jacobians(self) -> Vec<DMatrix<f64>> {
        let tdim = self.topological_dimension();
        let vertices = self.reference_vertices();
        self.sub_entities(tdim - 1)
            .iter()
            .map(|facet| {
                DMatrix::from_fn(tdim, tdim - 1, |i, k| {
                    vertices[(facet[k + 1], i)] - vertices[(facet[0], i)]
                })
            })
            .collect()
    }

    /// Maps points on the reference facet (rows of `points`, `num_points x (tdim - 1)`) to the
    /// given facet of this reference cell.
    pub fn map_facet_points(self, facet: usize, points: &DMatrix<f64>) -> DMatrix<f64> {
        let tdim = self.topological_dimension();
        let vertices = self.reference_vertices();
        let origin = self.sub_entities(tdim - 1)[facet][0];
        let j_f = &self.facet_jacobians()[facet];
        let mut mapped = points * j_f.transpose();
        for mut row in mapped.row_iter_mut() {
            row += vertices.row(origin);
        }
        mapped
    }

    /// Outward unit normals of the facets of the reference cell, one per row.
    pub fn facet_outward_normals(self) -> DMatrix<f64> {
        let tdim = self.topological_dimension();
        let vertices = self.reference_vertices();
        let midpoint = self.midpoint();
        let facets = self.sub_entities(tdim - 1);

        let mut normals = DMatrix::zeros(facets.len(), tdim);
        for (f, (facet, j_f)) in facets.iter().zip(self.facet_jacobians()).enumerate() {
            let mut n = match tdim {
                1 => DVector::from_element(1, 1.0),
                2 => DVector::from_column_slice(&[j_f[(1, 0)], -j_f[(0, 0)]]),
                3 => {
                    let t0 = Vector3::new(j_f[(0, 0)], j_f[(1, 0)], j_f[(2, 0)]);
                    let t1 = Vector3::new(j_f[(0, 1)], j_f[(1, 1)], j_f[(2, 1)]);
                    let n = t0.cross(&t1);
                    DVector::from_column_slice(n.as_slice())
                }
                _ => unreachable!("Cells of dimension > 3 are not supported"),
            };
            n.normalize_mut();

            let facet_midpoint = facet
                .iter()
                .map(|&v| vertices.row(v).transpose())
                .fold(DVector::zeros(tdim), |acc, v| acc + v)
                / facet.len() as f64;
            if n.dot(&(facet_midpoint - &midpoint)) < 0.0 {
                n.neg_mut();
            }
            normals.row_mut(f).copy_from(&n.transpose());
        }
        normals
    }
}
