//! Unstructured meshes made of a single cell type.
//!
//! A [`Mesh`] consists of a [`Topology`], which describes how cells, facets, edges and vertices
//! are connected, and a [`Geometry`], which holds the coordinate map and the node coordinates.
//! Connectivity between entities of arbitrary dimensions and the cell permutation info are
//! derived on demand and cached on the topology. Each cache is initialized at most once, so
//! they can be queried from several threads at the same time.
use crate::cell::CellType;
use crate::connectivity::AdjacencyList;
use crate::coordinate_map::CoordinateMap;
use crate::error::{Error, Result};
use log::debug;
use nalgebra::DMatrix;
use once_cell::sync::OnceCell;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rustc_hash::FxHashMap;

pub mod procedural;

/// Entities of one intermediate dimension: cell-to-entity and entity-to-vertex connectivity.
#[derive(Debug, Clone)]
struct Entities {
    cell_entities: AdjacencyList,
    entity_vertices: AdjacencyList,
}

#[derive(Debug, Clone)]
pub struct Topology {
    cell_type: CellType,
    num_vertices: usize,
    cell_vertices: AdjacencyList,
    entities: Vec<OnceCell<Entities>>,
    connectivity: Vec<OnceCell<AdjacencyList>>,
    cell_permutation_info: OnceCell<Vec<u32>>,
}

impl Topology {
    /// Creates a topology from the vertices of each cell, in reference cell order.
    ///
    /// Vertices must be numbered contiguously from zero.
    pub fn new(cell_type: CellType, cell_vertices: AdjacencyList) -> Result<Self> {
        let nv = cell_type.num_vertices();
        if cell_vertices.iter().any(|vertices| vertices.len() != nv) {
            return Err(Error::invalid_argument(format!(
                "every {:?} must have {} vertices",
                cell_type, nv
            )));
        }
        let num_vertices = cell_vertices.iter().flatten().max().map_or(0, |&v| v + 1);
        let tdim = cell_type.topological_dimension();
        Ok(Self {
            cell_type,
            num_vertices,
            cell_vertices,
            entities: (0..=tdim).map(|_| OnceCell::new()).collect(),
            connectivity: (0..(tdim + 1) * (tdim + 1)).map(|_| OnceCell::new()).collect(),
            cell_permutation_info: OnceCell::new(),
        })
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    pub fn dim(&self) -> usize {
        self.cell_type.topological_dimension()
    }

    pub fn num_cells(&self) -> usize {
        self.cell_vertices.num_nodes()
    }

    pub fn num_entities(&self, dim: usize) -> usize {
        let tdim = self.dim();
        if dim == tdim {
            self.num_cells()
        } else if dim == 0 {
            self.num_vertices
        } else {
            self.entities(dim).entity_vertices.num_nodes()
        }
    }

    /// Numbers the entities of dimension `0 < dim < tdim` in the order they are first
    /// encountered when traversing the cells and their local sub-entities.
    fn entities(&self, dim: usize) -> &Entities {
        self.entities[dim].get_or_init(|| {
            debug!("Computing entities of dimension {}.", dim);
            let local_entities = self.cell_type.sub_entities(dim);
            let mut ids: FxHashMap<Vec<usize>, usize> = FxHashMap::default();
            let mut cell_entities = AdjacencyList::new();
            let mut entity_vertices = AdjacencyList::new();
            for vertices in self.cell_vertices.iter() {
                let mut cell = cell_entities.begin_node();
                for local in local_entities {
                    let mut key: Vec<usize> = local.iter().map(|&v| vertices[v]).collect();
                    key.sort_unstable();
                    let next_id = ids.len();
                    let id = *ids.entry(key).or_insert_with_key(|key| {
                        entity_vertices.push(key);
                        next_id
                    });
                    cell.push_single(id);
                }
            }
            Entities {
                cell_entities,
                entity_vertices,
            }
        })
    }

    /// The connectivity from entities of dimension `d0` to entities of dimension `d1`.
    ///
    /// For `d0 = tdim` the links of each cell follow the local sub-entity numbering of the
    /// reference cell, so the position of an entity in the links of a cell is its local index.
    ///
    /// # Panics
    ///
    /// Panics if a dimension exceeds the topological dimension.
    pub fn connectivity(&self, d0: usize, d1: usize) -> &AdjacencyList {
        let tdim = self.dim();
        assert!(d0 <= tdim && d1 <= tdim, "Dimension out of range.");
        match (d0, d1) {
            (d0, 0) if d0 == tdim => &self.cell_vertices,
            (d0, d1) if d0 == tdim && d1 > 0 && d1 < tdim => &self.entities(d1).cell_entities,
            (d0, 0) if d0 > 0 => &self.entities(d0).entity_vertices,
            _ => self.connectivity[d0 * (tdim + 1) + d1].get_or_init(|| {
                debug!("Computing connectivity ({}, {}).", d0, d1);
                self.compute_connectivity(d0, d1)
            }),
        }
    }

    fn compute_connectivity(&self, d0: usize, d1: usize) -> AdjacencyList {
        if d0 == d1 {
            let n = self.num_entities(d0);
            return AdjacencyList::from_fixed(1, (0..n).collect());
        }
        if d0 < d1 {
            return self.connectivity(d1, d0).transpose(self.num_entities(d0));
        }

        // Entities of the lower dimension whose vertices all belong to the higher one
        let e0_vertices = self.connectivity(d0, 0);
        let e1_vertices = self.connectivity(d1, 0);
        let vertex_e1 = self.connectivity(0, d1);
        let mut result = AdjacencyList::new();
        for vertices in e0_vertices.iter() {
            let mut candidates: Vec<usize> = vertices
                .iter()
                .flat_map(|&v| vertex_e1.links(v).iter().copied())
                .filter(|&e1| e1_vertices.links(e1).iter().all(|v| vertices.contains(v)))
                .collect();
            candidates.sort_unstable();
            candidates.dedup();
            result.push(&candidates);
        }
        result
    }

    /// Facets connected to exactly one cell.
    pub fn exterior_facets(&self) -> Vec<usize> {
        let tdim = self.dim();
        if tdim == 0 {
            return Vec::new();
        }
        let facet_cells = self.connectivity(tdim - 1, tdim);
        (0..facet_cells.num_nodes())
            .filter(|&f| facet_cells.num_links(f) == 1)
            .collect()
    }

    /// Bit-encoded orientation of the sub-entities of each cell relative to the global
    /// (low-to-high vertex index) orientation.
    ///
    /// In 2D, bit `e` is set if local edge `e` is reflected. In 3D, bits `3f`, `3f + 1..3f + 3`
    /// hold the reflection and rotation count of face `f`, and edge reflections follow after the
    /// face bits (see [`CellType::edge_reflection_bit`]).
    pub fn cell_permutation_info(&self) -> &[u32] {
        self.cell_permutation_info.get_or_init(|| {
            debug!("Computing cell permutation info.");
            let cell = self.cell_type;
            let tdim = cell.topological_dimension();
            self.cell_vertices
                .iter()
                .map(|vertices| {
                    let mut info = 0u32;
                    if tdim >= 2 {
                        for (e, edge) in cell.sub_entities(1).iter().enumerate() {
                            if vertices[edge[0]] > vertices[edge[1]] {
                                info |= 1 << cell.edge_reflection_bit(e);
                            }
                        }
                    }
                    if tdim == 3 {
                        for (f, face) in cell.sub_entities(2).iter().enumerate() {
                            let (rotations, reflected) = face_orientation(face, vertices);
                            let bit = cell.face_reflection_bit(f);
                            info |= (reflected as u32) << bit;
                            info |= (rotations as u32) << (bit + 1);
                        }
                    }
                    info
                })
                .collect()
        })
    }
}

/// The number of rotations bringing the lowest global vertex of a face first, and whether the
/// rotated face is reflected.
fn face_orientation(face: &[usize], cell_vertices: &[usize]) -> (usize, bool) {
    // Vertices of a quadrilateral face in cyclic order
    let cyclic: Vec<usize> = match face.len() {
        4 => vec![face[0], face[1], face[3], face[2]],
        _ => face.to_vec(),
    };
    let global: Vec<usize> = cyclic.iter().map(|&v| cell_vertices[v]).collect();
    let n = global.len();
    let rotations = (0..n).min_by_key(|&i| global[i]).unwrap_or(0);
    let next = global[(rotations + 1) % n];
    let previous = global[(rotations + n - 1) % n];
    (rotations, next > previous)
}

/// The coordinate map, the geometry nodes of each cell and the node coordinates.
///
/// The coordinates sit behind a lock, so that a mesh shared between function spaces can be
/// moved in place (see [`update_geometry`](crate::util::update_geometry)).
#[derive(Debug)]
pub struct Geometry {
    cmap: CoordinateMap,
    dofmap: AdjacencyList,
    x: RwLock<Vec<f64>>,
    gdim: usize,
}

impl Clone for Geometry {
    fn clone(&self) -> Self {
        Self {
            cmap: self.cmap.clone(),
            dofmap: self.dofmap.clone(),
            x: RwLock::new(self.x.read().clone()),
            gdim: self.gdim,
        }
    }
}

impl Geometry {
    pub fn cmap(&self) -> &CoordinateMap {
        &self.cmap
    }

    /// Geometry nodes of each cell.
    pub fn dofmap(&self) -> &AdjacencyList {
        &self.dofmap
    }

    /// Node coordinates, three components per node regardless of the geometric dimension.
    ///
    /// The coordinates stay locked for reading while the guard is alive.
    pub fn x(&self) -> RwLockReadGuard<'_, Vec<f64>> {
        self.x.read()
    }

    /// Locks the node coordinates for writing through a shared reference.
    pub fn x_write(&self) -> RwLockWriteGuard<'_, Vec<f64>> {
        self.x.write()
    }

    pub fn x_mut(&mut self) -> &mut [f64] {
        self.x.get_mut()
    }

    pub fn dim(&self) -> usize {
        self.gdim
    }

    pub fn num_nodes(&self) -> usize {
        self.x.read().len() / 3
    }

    /// Coordinates of the nodes of a cell, as a `num_nodes x gdim` matrix.
    pub fn cell_coordinate_dofs(&self, cell: usize) -> DMatrix<f64> {
        let mut coordinate_dofs = DMatrix::zeros(self.cmap.dim(), self.gdim);
        self.copy_cell_coordinate_dofs(cell, &mut coordinate_dofs);
        coordinate_dofs
    }

    /// Copies the coordinates of the nodes of a cell into an existing buffer.
    pub fn copy_cell_coordinate_dofs(&self, cell: usize, coordinate_dofs: &mut DMatrix<f64>) {
        let x = self.x.read();
        for (i, &node) in self.dofmap.links(cell).iter().enumerate() {
            for j in 0..self.gdim {
                coordinate_dofs[(i, j)] = x[3 * node + j];
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Mesh {
    topology: Topology,
    geometry: Geometry,
}

impl Mesh {
    /// Creates a mesh from node coordinates (`gdim` per node) and the nodes of each cell (in the
    /// local dof order of the coordinate map).
    ///
    /// The vertices of the topology are the nodes at the cell corners, numbered in increasing
    /// node order.
    pub fn new(cmap: CoordinateMap, gdim: usize, coordinates: &[f64], cells: Vec<usize>) -> Result<Self> {
        let tdim = cmap.topological_dimension();
        if gdim < tdim || gdim > 3 {
            return Err(Error::invalid_argument(format!(
                "geometric dimension {} is invalid for cells of dimension {}",
                gdim, tdim
            )));
        }
        if coordinates.len() % gdim != 0 {
            return Err(Error::invalid_argument(
                "number of coordinates is not a multiple of the geometric dimension",
            ));
        }
        let num_nodes = coordinates.len() / gdim;
        let nodes_per_cell = cmap.dim();
        if cells.len() % nodes_per_cell != 0 {
            return Err(Error::invalid_argument(format!(
                "cell node list is not a multiple of {} nodes per cell",
                nodes_per_cell
            )));
        }
        if let Some(&node) = cells.iter().find(|&&node| node >= num_nodes) {
            return Err(Error::invalid_argument(format!(
                "cell refers to node {}, but there are only {} nodes",
                node, num_nodes
            )));
        }

        let mut x = vec![0.0; 3 * num_nodes];
        for (node, coords) in coordinates.chunks_exact(gdim).enumerate() {
            x[3 * node..3 * node + gdim].copy_from_slice(coords);
        }

        let dofmap = AdjacencyList::from_fixed(nodes_per_cell, cells);
        let nv = cmap.cell_type().num_vertices();
        let mut vertex_of_node: Vec<Option<usize>> = vec![None; num_nodes];
        for nodes in dofmap.iter() {
            for &node in &nodes[..nv] {
                vertex_of_node[node] = Some(0);
            }
        }
        let mut num_vertices = 0;
        for vertex in vertex_of_node.iter_mut().flatten() {
            *vertex = num_vertices;
            num_vertices += 1;
        }
        let mut cell_vertices = AdjacencyList::new();
        for nodes in dofmap.iter() {
            let mut cell = cell_vertices.begin_node();
            for node in &nodes[..nv] {
                if let Some(vertex) = vertex_of_node[*node] {
                    cell.push_single(vertex);
                }
            }
        }

        Ok(Self {
            topology: Topology::new(cmap.cell_type(), cell_vertices)?,
            geometry: Geometry {
                cmap,
                dofmap,
                x: RwLock::new(x),
                gdim,
            },
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Exclusive access to the geometry, e.g. for moving the nodes.
    pub fn geometry_mut(&mut self) -> &mut Geometry {
        &mut self.geometry
    }

    pub fn cell_type(&self) -> CellType {
        self.topology.cell_type()
    }

    pub fn tdim(&self) -> usize {
        self.topology.dim()
    }

    pub fn gdim(&self) -> usize {
        self.geometry.dim()
    }

    pub fn num_cells(&self) -> usize {
        self.topology.num_cells()
    }
}
