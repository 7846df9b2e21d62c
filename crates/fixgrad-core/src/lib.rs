//! # fixgrad-core
//!
//! Fixed-shape tensor algebra for fixgrad.
//!
//! This crate provides:
//! - [`Tensor`]: an inline, row-major array whose shape is part of its type
//! - [`Shape`]: compile-time shapes [`Rank0`] through [`Rank4`]
//! - [`DType`] / [`WithDType`]: numeric element types
//! - [`MatrixProduct`]: matrix products with inferred result shapes
//! - [`Dump`] / [`Load`]: the field-by-field persistence contract
// - dtype: supported numeric element types
// - shape: shape markers and const shape predicates
// - tensor: the Tensor type, construction, views, arithmetic operators
// - apply: ApplyFunction traversal, elementwise math, comparisons, reductions
// - linalg: matrix products, bias broadcast
// - concat: stack/split along an axis
// - persist: Dump/Load

pub mod apply;
pub mod concat;
pub mod dtype;
pub mod error;
pub mod linalg;
pub mod persist;
pub mod shape;
pub mod tensor;

pub use apply::all_close;
pub use dtype::{DType, WithDType};
pub use error::{Error, Result};
pub use linalg::{
    matrix_product, matrix_product_acc, matrix_product_transposed, matrix_product_transposed_acc,
    MatrixProduct,
};
pub use persist::{Dump, Load};
pub use shape::{HasAxis0, Rank0, Rank1, Rank2, Rank3, Rank4, Shape};
pub use tensor::Tensor;
