//! Geometry and basis evaluation kernels for contact mechanics.
//!
//! The crate provides the per-entity building blocks that contact forms are assembled from:
//! pull-back of physical points through affine and non-affine coordinate maps, evaluation of
//! pushed-forward basis functions, packing of function values at quadrature points of cells
//! and boundary facets, and auxiliary geometric quantities such as circumradii and facet
//! normals.
pub mod array;
pub mod basis;
pub mod cell;
pub mod coefficients;
pub mod connectivity;
pub mod coordinate_map;
pub mod element;
pub mod error;
pub mod facet;
pub mod geometry_map;
pub mod mesh;
pub mod quadrature;
pub mod space;
pub mod util;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub use error::{Error, Result};

pub extern crate nalgebra;
