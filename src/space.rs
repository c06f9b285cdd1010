//! Function spaces and discrete functions.
use crate::connectivity::AdjacencyList;
use crate::element::{DofLayout, FiniteElement};
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use std::sync::Arc;

/// Global (unblocked) dofs of each cell.
///
/// The value of component `k` of dof `d` is stored at `block_size * d + k` in the dof array of a
/// function.
#[derive(Debug, Clone, PartialEq)]
pub struct DofMap {
    cell_dofs: AdjacencyList,
    block_size: usize,
    layout: DofLayout,
}

impl DofMap {
    pub fn new(cell_dofs: AdjacencyList, block_size: usize, layout: DofLayout) -> Self {
        Self {
            cell_dofs,
            block_size,
            layout,
        }
    }

    /// Numbers dofs entity by entity, starting with the vertices and ending with the cell
    /// interiors.
    pub fn from_layout(mesh: &Mesh, layout: DofLayout) -> Self {
        let topology = mesh.topology();
        let tdim = topology.dim();

        let mut offsets = Vec::with_capacity(tdim + 1);
        let mut offset = 0;
        for d in 0..=tdim {
            offsets.push(offset);
            if layout.num_entity_dofs(d) > 0 {
                offset += topology.num_entities(d) * layout.num_entity_dofs(d);
            }
        }

        let mut cell_dofs = AdjacencyList::new();
        let mut local_dofs = vec![0; layout.num_dofs()];
        for cell in 0..topology.num_cells() {
            for (d, dim_dofs) in layout.entity_dofs().iter().enumerate() {
                let n = layout.num_entity_dofs(d);
                if n == 0 {
                    continue;
                }
                let entities = topology.connectivity(tdim, d).links(cell);
                for (&entity, dofs) in entities.iter().zip(dim_dofs) {
                    for (k, &dof) in dofs.iter().enumerate() {
                        local_dofs[dof] = offsets[d] + entity * n + k;
                    }
                }
            }
            cell_dofs.push(&local_dofs);
        }

        let block_size = layout.block_size();
        Self::new(cell_dofs, block_size, layout)
    }

    pub fn cell_dofs(&self, cell: usize) -> &[usize] {
        self.cell_dofs.links(cell)
    }

    pub fn list(&self) -> &AdjacencyList {
        &self.cell_dofs
    }

    pub fn bs(&self) -> usize {
        self.block_size
    }

    pub fn element_dof_layout(&self) -> &DofLayout {
        &self.layout
    }

    /// The number of (unblocked) global dofs.
    pub fn num_dofs(&self) -> usize {
        self.cell_dofs.iter().flatten().max().map_or(0, |&d| d + 1)
    }
}

#[derive(Debug, Clone)]
pub struct FunctionSpace {
    mesh: Arc<Mesh>,
    element: Arc<FiniteElement>,
    dofmap: Arc<DofMap>,
}

impl FunctionSpace {
    pub fn new(mesh: Arc<Mesh>, element: FiniteElement) -> Result<Self> {
        let dofmap = DofMap::from_layout(&mesh, element.dof_layout());
        Self::from_parts(mesh, Arc::new(element), Arc::new(dofmap))
    }

    pub fn from_parts(mesh: Arc<Mesh>, element: Arc<FiniteElement>, dofmap: Arc<DofMap>) -> Result<Self> {
        if element.cell_type() != mesh.cell_type() {
            return Err(Error::invalid_argument(format!(
                "element defined on {:?}, but mesh consists of {:?}",
                element.cell_type(),
                mesh.cell_type()
            )));
        }
        if dofmap.list().num_nodes() != mesh.num_cells() {
            return Err(Error::invalid_argument("dofmap does not cover every cell of the mesh"));
        }
        Ok(Self { mesh, element, dofmap })
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    pub fn element(&self) -> &Arc<FiniteElement> {
        &self.element
    }

    pub fn dofmap(&self) -> &Arc<DofMap> {
        &self.dofmap
    }
}

/// A finite element function: a function space together with its dof values.
#[derive(Debug, Clone)]
pub struct Function {
    space: FunctionSpace,
    x: Vec<f64>,
}

impl Function {
    pub fn new(space: FunctionSpace) -> Self {
        let len = space.dofmap.num_dofs() * space.dofmap.bs();
        Self {
            space,
            x: vec![0.0; len],
        }
    }

    pub fn from_values(space: FunctionSpace, x: Vec<f64>) -> Result<Self> {
        let expected = space.dofmap.num_dofs() * space.dofmap.bs();
        if x.len() != expected {
            return Err(Error::invalid_argument(format!(
                "function has {} values, expected {}",
                x.len(),
                expected
            )));
        }
        Ok(Self { space, x })
    }

    pub fn function_space(&self) -> &FunctionSpace {
        &self.space
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn x_mut(&mut self) -> &mut [f64] {
        &mut self.x
    }

    /// Sets the dofs of a Lagrange function to the values of `f` at the physical dof nodes.
    ///
    /// `f` receives the `gdim` coordinates of a point and writes one value per block component.
    pub fn interpolate<F>(&mut self, f: F) -> Result<()>
    where
        F: Fn(&[f64], &mut [f64]),
    {
        let element = &self.space.element;
        let points = element
            .interpolation_points()
            .ok_or_else(|| Error::unsupported("interpolation into a non-Lagrange space"))?;
        let mesh = &self.space.mesh;
        let geometry = mesh.geometry();
        let bs = self.space.dofmap.bs();
        let mut values = vec![0.0; bs];
        for cell in 0..mesh.num_cells() {
            let coordinate_dofs = geometry.cell_coordinate_dofs(cell);
            let x = geometry.cmap().push_forward(&points, &coordinate_dofs)?;
            for (i, &dof) in self.space.dofmap.cell_dofs(cell).iter().enumerate() {
                let x_i: Vec<f64> = x.row(i).iter().copied().collect();
                f(&x_i, &mut values);
                self.x[bs * dof..bs * (dof + 1)].copy_from_slice(&values);
            }
        }
        Ok(())
    }
}
