//! Finite element descriptors.
//!
//! A [`FiniteElement`] describes the reference basis of a function space: how to tabulate it,
//! how to correct it for the orientation of the cell it is used on and how to map it to the
//! physical cell. Blocked (vector-valued Lagrange) elements repeat a scalar basis for each
//! component, and mixed elements are collections of sub-elements.
use crate::array::Array;
use crate::cell::CellType;
use crate::error::{Error, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

pub mod lagrange;
pub mod whitney;

pub use lagrange::LagrangeElement;
pub use whitney::{WhitneyElement, WhitneyFamily};

/// Local dofs of each sub-entity, indexed as `[dim][entity] -> dofs`.
pub type EntityDofs = Vec<Vec<Vec<usize>>>;

/// Derivative multi-indices up to total order `nd` for a cell of dimension `tdim`.
///
/// The indices are grouped by total order. Within each order `n` they are enumerated as
/// `(n - q, q)` for `q = 0..=n` in 2D, and `(n - s, s - r, r)` for `s = 0..=n, r = 0..=s` in 3D.
/// Thus the first derivatives follow the coordinate order, and the second derivatives in 3D are
/// ordered `xx, xy, xz, yy, yz, zz`.
pub fn derivative_indices(tdim: usize, nd: usize) -> Vec<[usize; 3]> {
    let mut indices = Vec::new();
    for n in 0..=nd {
        match tdim {
            0 => {
                if n == 0 {
                    indices.push([0, 0, 0]);
                }
            }
            1 => indices.push([n, 0, 0]),
            2 => indices.extend((0..=n).map(|q| [n - q, q, 0])),
            _ => {
                for s in 0..=n {
                    for r in 0..=s {
                        indices.push([n - s, s - r, r]);
                    }
                }
            }
        }
    }
    indices
}

/// The number of derivatives (including the value itself) up to total order `nd`.
pub fn num_derivatives(tdim: usize, nd: usize) -> usize {
    derivative_indices(tdim, nd).len()
}

/// How reference basis values are mapped onto a physical cell.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapType {
    Identity,
    CovariantPiola,
    ContravariantPiola,
}

impl MapType {
    /// The physical value size corresponding to a reference value size.
    pub fn value_size(self, reference_value_size: usize, gdim: usize) -> usize {
        match self {
            Self::Identity => reference_value_size,
            Self::CovariantPiola | Self::ContravariantPiola => gdim,
        }
    }

    /// Pushes reference values forward to the physical cell.
    ///
    /// `reference` holds one row of `tdim` (or `1` for scalar maps) values per basis function
    /// and `physical` receives one row of the corresponding physical value size.
    /// `j` is the `gdim x tdim` Jacobian and `k` its `tdim x gdim` (pseudo-)inverse.
    pub fn push_forward(
        self,
        reference: &[f64],
        physical: &mut [f64],
        num_functions: usize,
        j: &DMatrix<f64>,
        det_j: f64,
        k: &DMatrix<f64>,
    ) {
        match self {
            Self::Identity => physical.copy_from_slice(reference),
            Self::CovariantPiola => {
                let (tdim, gdim) = k.shape();
                for f in 0..num_functions {
                    let reference = &reference[f * tdim..(f + 1) * tdim];
                    let physical = &mut physical[f * gdim..(f + 1) * gdim];
                    for (i, u) in physical.iter_mut().enumerate() {
                        *u = (0..tdim).map(|c| reference[c] * k[(c, i)]).sum();
                    }
                }
            }
            Self::ContravariantPiola => {
                let (gdim, tdim) = j.shape();
                for f in 0..num_functions {
                    let reference = &reference[f * tdim..(f + 1) * tdim];
                    let physical = &mut physical[f * gdim..(f + 1) * gdim];
                    for (i, u) in physical.iter_mut().enumerate() {
                        *u = (0..tdim).map(|c| j[(i, c)] * reference[c]).sum::<f64>() / det_j;
                    }
                }
            }
        }
    }
}

/// The association of local dofs with the sub-entities of the reference cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DofLayout {
    entity_dofs: EntityDofs,
    block_size: usize,
}

impl DofLayout {
    pub fn new(entity_dofs: EntityDofs, block_size: usize) -> Self {
        Self {
            entity_dofs,
            block_size,
        }
    }

    pub fn entity_dofs(&self) -> &EntityDofs {
        &self.entity_dofs
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// The number of (unblocked) local dofs.
    pub fn num_dofs(&self) -> usize {
        self.entity_dofs.iter().flatten().map(Vec::len).sum()
    }

    /// The number of dofs attached to each entity of dimension `dim`.
    pub fn num_entity_dofs(&self, dim: usize) -> usize {
        self.entity_dofs[dim].first().map_or(0, Vec::len)
    }

    /// Whether two layouts associate the same local dofs with the same entities, ignoring
    /// block sizes.
    pub fn matches_unblocked(&self, other: &DofLayout) -> bool {
        self.entity_dofs == other.entity_dofs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum ElementKind {
    Lagrange(LagrangeElement),
    Whitney(WhitneyElement),
    Mixed(Vec<FiniteElement>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiniteElement {
    kind: ElementKind,
    block_size: usize,
}

impl FiniteElement {
    pub fn lagrange(cell: CellType, degree: usize) -> Result<Self> {
        Ok(Self {
            kind: ElementKind::Lagrange(LagrangeElement::new(cell, degree)?),
            block_size: 1,
        })
    }

    pub fn nedelec(cell: CellType) -> Result<Self> {
        Ok(Self {
            kind: ElementKind::Whitney(WhitneyElement::nedelec(cell)?),
            block_size: 1,
        })
    }

    pub fn raviart_thomas(cell: CellType) -> Result<Self> {
        Ok(Self {
            kind: ElementKind::Whitney(WhitneyElement::raviart_thomas(cell)?),
            block_size: 1,
        })
    }

    /// A vector-valued element with `block_size` copies of a scalar Lagrange element.
    pub fn blocked(base: FiniteElement, block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::invalid_argument("block size must be positive"));
        }
        match base.kind {
            ElementKind::Lagrange(_) if base.block_size == 1 => Ok(Self {
                kind: base.kind,
                block_size,
            }),
            _ => Err(Error::invalid_argument(
                "only unblocked scalar Lagrange elements can be blocked",
            )),
        }
    }

    pub fn mixed(sub_elements: Vec<FiniteElement>) -> Result<Self> {
        let cell = match sub_elements.first() {
            Some(first) => first.cell_type(),
            None => return Err(Error::invalid_argument("mixed element without sub-elements")),
        };
        if sub_elements.iter().any(|e| e.cell_type() != cell) {
            return Err(Error::invalid_argument(
                "sub-elements of a mixed element must share the cell type",
            ));
        }
        Ok(Self {
            kind: ElementKind::Mixed(sub_elements),
            block_size: 1,
        })
    }

    pub fn cell_type(&self) -> CellType {
        match &self.kind {
            ElementKind::Lagrange(e) => e.cell_type(),
            ElementKind::Whitney(e) => e.cell_type(),
            ElementKind::Mixed(subs) => subs[0].cell_type(),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn is_mixed(&self) -> bool {
        matches!(self.kind, ElementKind::Mixed(_))
    }

    /// The number of sub-elements: the sub-elements of a mixed element, or the blocks of a
    /// blocked element. Zero for a plain element.
    pub fn num_sub_elements(&self) -> usize {
        match &self.kind {
            ElementKind::Mixed(subs) => subs.len(),
            _ if self.block_size > 1 => self.block_size,
            _ => 0,
        }
    }

    pub fn sub_elements(&self) -> &[FiniteElement] {
        match &self.kind {
            ElementKind::Mixed(subs) => subs,
            _ => &[],
        }
    }

    /// The dimension of the (unblocked) reference basis.
    pub fn base_space_dimension(&self) -> usize {
        match &self.kind {
            ElementKind::Lagrange(e) => e.dim(),
            ElementKind::Whitney(e) => e.dim(),
            ElementKind::Mixed(subs) => subs.iter().map(FiniteElement::space_dimension).sum(),
        }
    }

    /// The total number of local dofs, including all blocks.
    pub fn space_dimension(&self) -> usize {
        self.base_space_dimension() * self.block_size
    }

    /// The number of reference value components per block.
    pub fn base_reference_value_size(&self) -> usize {
        match &self.kind {
            ElementKind::Lagrange(_) => 1,
            ElementKind::Whitney(e) => e.reference_value_size(),
            ElementKind::Mixed(subs) => subs.iter().map(FiniteElement::reference_value_size).sum(),
        }
    }

    pub fn reference_value_size(&self) -> usize {
        self.base_reference_value_size() * self.block_size
    }

    /// The number of physical value components per block on a mesh of geometric dimension
    /// `gdim`.
    pub fn base_value_size(&self, gdim: usize) -> usize {
        match &self.kind {
            ElementKind::Mixed(subs) => subs.iter().map(|e| e.value_size(gdim)).sum(),
            _ => self
                .map_type()
                .map_or(0, |map| map.value_size(self.base_reference_value_size(), gdim)),
        }
    }

    pub fn value_size(&self, gdim: usize) -> usize {
        self.base_value_size(gdim) * self.block_size
    }

    /// The push-forward of the reference basis. Mixed elements have no single map.
    pub fn map_type(&self) -> Option<MapType> {
        match &self.kind {
            ElementKind::Lagrange(_) => Some(MapType::Identity),
            ElementKind::Whitney(e) => Some(e.map_type()),
            ElementKind::Mixed(_) => None,
        }
    }

    /// Reference points at which point evaluation defines the dofs, for Lagrange elements.
    pub fn interpolation_points(&self) -> Option<DMatrix<f64>> {
        match &self.kind {
            ElementKind::Lagrange(e) => Some(e.points()),
            _ => None,
        }
    }

    pub fn needs_dof_transformations(&self) -> bool {
        match &self.kind {
            ElementKind::Lagrange(_) => false,
            ElementKind::Whitney(_) => true,
            ElementKind::Mixed(subs) => subs.iter().any(FiniteElement::needs_dof_transformations),
        }
    }

    /// The unblocked entity dofs. For mixed elements the dofs of each sub-element (with its
    /// blocks expanded) follow the dofs of the preceding sub-elements.
    pub fn entity_dofs(&self) -> EntityDofs {
        match &self.kind {
            ElementKind::Lagrange(e) => e.entity_dofs(),
            ElementKind::Whitney(e) => e.entity_dofs(),
            ElementKind::Mixed(subs) => {
                let cell = self.cell_type();
                let tdim = cell.topological_dimension();
                let mut dofs: EntityDofs = (0..=tdim)
                    .map(|d| vec![Vec::new(); cell.num_sub_entities(d)])
                    .collect();
                let mut offset = 0;
                for sub in subs {
                    let bs = sub.block_size();
                    for (dim_dofs, sub_dim_dofs) in dofs.iter_mut().zip(sub.entity_dofs()) {
                        for (entity_dofs, sub_entity_dofs) in dim_dofs.iter_mut().zip(sub_dim_dofs) {
                            for dof in sub_entity_dofs {
                                entity_dofs.extend((0..bs).map(|k| offset + dof * bs + k));
                            }
                        }
                    }
                    offset += sub.space_dimension();
                }
                dofs
            }
        }
    }

    pub fn dof_layout(&self) -> DofLayout {
        DofLayout::new(self.entity_dofs(), self.block_size)
    }

    /// Tabulates the unblocked reference basis with derivatives up to order `nd`.
    ///
    /// The result has shape `(num_derivatives, num_points, base_space_dimension,
    /// base_reference_value_size)`.
    pub fn tabulate(&self, nd: usize, points: &DMatrix<f64>) -> Result<Array<4>> {
        match &self.kind {
            ElementKind::Lagrange(e) => {
                let table = e.tabulate(nd, points)?;
                let [nderiv, np, dim] = table.shape();
                Ok(Array::from_vec([nderiv, np, dim, 1], table.into_vec()))
            }
            ElementKind::Whitney(e) => e.tabulate(nd, points),
            ElementKind::Mixed(_) => Err(Error::unsupported("tabulation of a mixed element")),
        }
    }

    /// Applies the orientation-dependent dof transformation of a cell in place.
    ///
    /// `data` holds one row of `ncols` entries for every unblocked local dof.
    pub fn apply_dof_transformation(&self, data: &mut [f64], cell_info: u32, ncols: usize) {
        if let ElementKind::Whitney(e) = &self.kind {
            e.apply_dof_transformation(data, cell_info, ncols);
        }
    }
}
