//! # fixgrad-autograd
//!
//! Reverse-mode automatic differentiation over [`fixgrad_core::Tensor`].
//!
//! A [`Variable`] wraps a tensor value and a gradient accumulator. Applying an
//! operation to variables computes the result immediately and records, in the
//! result, how to send a gradient back to its inputs. Calling
//! [`Variable::backward`] on a scalar walks that record in reverse.
//!
//! ```
//! use fixgrad_autograd::Variable;
//! use fixgrad_core::{Rank2, Tensor};
//!
//! let a = Variable::leaf(Tensor::<f64, Rank2<2, 3>>::from([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]));
//! let b = Variable::leaf(Tensor::<f64, Rank2<3, 2>>::from([[9.0, 8.0], [7.0, 6.0], [5.0, 4.0]]));
//! a.matrix_product(&b).sum().backward();
//! assert_eq!(*a.grad(), Tensor::from([[17.0, 13.0, 9.0], [17.0, 13.0, 9.0]]));
//! ```
// - variable: Variable handle, graph nodes
// - op: operation-node construction, the backward calling convention
// - ops: the differentiable operations
// - backprop: the backward traversal

mod backprop;
pub mod op;
pub mod ops;
pub mod variable;

pub use op::{binary, unary, Operand};
pub use variable::{NodeId, Variable};
