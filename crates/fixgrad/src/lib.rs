//! # fixgrad
//!
//! Fixed-shape tensors and a reverse-mode autograd graph.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Usage
//!
//! ```rust
//! use fixgrad::prelude::*;
//!
//! let a = Variable::leaf(Tensor::<f64, Rank1<3>>::from([1.0, 2.0, 3.0]));
//! let b = Variable::leaf(Tensor::<f64, Rank1<3>>::from([4.0, 5.0, 6.0]));
//! (&a * &b).sum().backward();
//! assert_eq!(*a.grad(), *b.value());
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `fixgrad-core` | Tensor, Shape, DType, ApplyFunction, matrix products, Dump/Load |
//! | `fixgrad-autograd` | Variable, operation nodes, backward pass |

/// Re-export core types.
pub use fixgrad_core::{
    all_close, matrix_product, matrix_product_acc, matrix_product_transposed,
    matrix_product_transposed_acc, persist, persist_fields, DType, Dump, Error, HasAxis0, Load,
    MatrixProduct, Rank0, Rank1, Rank2, Rank3, Rank4, Result, Shape, Tensor, WithDType,
};

/// Re-export the autograd graph.
pub use fixgrad_autograd::{binary, unary, NodeId, Operand, Variable};

/// Differentiable operations as free functions.
pub mod ops {
    pub use fixgrad_autograd::ops::*;
}

/// Prelude: import this for the most common types.
pub mod prelude {
    pub use crate::{
        all_close, DType, Dump, HasAxis0, Load, MatrixProduct, Rank0, Rank1, Rank2, Rank3, Rank4,
        Shape, Tensor, Variable, WithDType,
    };
}
