//! Owned, contiguous multi-dimensional arrays with explicit row-major layout.
//!
//! Basis tabulations and packed coefficient data are handed to downstream kernels as flat
//! buffers. [`Array`] keeps the flat storage but makes the shape and the strides explicit, so
//! that indexing is checked and documented rather than hand-computed at each call site.
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut, Range};

/// A dense `N`-dimensional array of `f64` stored in row-major (C) order.
///
/// The element at `[i_0, ..., i_{N-1}]` is stored at offset `sum_k i_k * stride_k`, with
/// `stride_{N-1} = 1` and `stride_k = stride_{k+1} * shape_{k+1}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Array<const N: usize> {
    #[serde(with = "shape_serde")]
    shape: [usize; N],
    data: Vec<f64>,
}

// serde does not support arbitrary const-generic arrays out of the box
mod shape_serde {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(shape: &[usize; N], serializer: S) -> Result<S::Ok, S::Error> {
        shape.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(deserializer: D) -> Result<[usize; N], D::Error> {
        let shape = Vec::<usize>::deserialize(deserializer)?;
        shape
            .try_into()
            .map_err(|shape: Vec<usize>| D::Error::invalid_length(shape.len(), &"array rank"))
    }
}

impl<const N: usize> Array<N> {
    pub fn zeros(shape: [usize; N]) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    /// Wraps existing storage in an array of the given shape.
    ///
    /// # Panics
    ///
    /// Panics if the length of `data` does not equal the product of the shape.
    pub fn from_vec(shape: [usize; N], data: Vec<f64>) -> Self {
        assert_eq!(
            data.len(),
            shape.iter().product::<usize>(),
            "Data length must match the product of the shape."
        );
        Self { shape, data }
    }

    pub fn shape(&self) -> [usize; N] {
        self.shape
    }

    pub fn strides(&self) -> [usize; N] {
        let mut strides = [1; N];
        for k in (0..N.saturating_sub(1)).rev() {
            strides[k] = strides[k + 1] * self.shape[k + 1];
        }
        strides
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// Returns the flat offset of the given multi-index.
    ///
    /// # Panics
    ///
    /// Panics if any index is out of bounds.
    pub fn offset(&self, index: [usize; N]) -> usize {
        let mut offset = 0;
        for k in 0..N {
            assert!(
                index[k] < self.shape[k],
                "Index {} out of bounds for axis {} with extent {}.",
                index[k],
                k,
                self.shape[k]
            );
            offset = offset * self.shape[k] + index[k];
        }
        offset
    }

    /// The flat range occupied by all entries whose leading indices equal `prefix`.
    ///
    /// Since the layout is row-major, this range is contiguous.
    fn lane_range(&self, prefix: &[usize]) -> Range<usize> {
        assert!(prefix.len() <= N, "Prefix is longer than the array rank.");
        let mut begin = 0;
        for (k, &i) in prefix.iter().enumerate() {
            assert!(i < self.shape[k], "Index {} out of bounds for axis {}.", i, k);
            begin = begin * self.shape[k] + i;
        }
        let lane_len: usize = self.shape[prefix.len()..].iter().product();
        begin * lane_len..(begin + 1) * lane_len
    }

    /// The contiguous block of entries whose leading indices equal `prefix`.
    pub fn lane(&self, prefix: &[usize]) -> &[f64] {
        let range = self.lane_range(prefix);
        &self.data[range]
    }

    pub fn lane_mut(&mut self, prefix: &[usize]) -> &mut [f64] {
        let range = self.lane_range(prefix);
        &mut self.data[range]
    }
}

impl Array<3> {
    /// Copies the `[i, .., ..]` slab into a matrix, for the given range of rows.
    pub fn matrix(&self, i: usize, rows: Range<usize>) -> DMatrix<f64> {
        let [_, _, ncols] = self.shape;
        let slab = self.lane(&[i]);
        DMatrix::from_fn(rows.len(), ncols, |r, c| slab[(rows.start + r) * ncols + c])
    }
}

impl<const N: usize> Index<[usize; N]> for Array<N> {
    type Output = f64;

    fn index(&self, index: [usize; N]) -> &f64 {
        &self.data[self.offset(index)]
    }
}

impl<const N: usize> IndexMut<[usize; N]> for Array<N> {
    fn index_mut(&mut self, index: [usize; N]) -> &mut f64 {
        let offset = self.offset(index);
        &mut self.data[offset]
    }
}
