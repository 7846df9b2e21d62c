use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::io::{Read, Write};
use std::rc::Rc;

use fixgrad_core::{Dump, Load, Rank0, Shape, Tensor, WithDType};

use crate::op::Backward;

// Variable: Shared handle to a node of the computation graph
//
// A Node pairs a forward value with a gradient accumulator of the same shape.
// Nodes come in two kinds:
//
//   Leaf       created directly from a tensor; no parents
//   Operation  created by applying an operation to parent variables; holds
//              the backward rule together with the parents it needs
//
// An operation node whose parents all have requires_grad == false can never
// take part in a backward pass, so it drops its rule (and with it every
// reference to its parents) at construction. Only the live trainable
// sub-graph stays in memory.
//
// OWNERSHIP:
//
//   Variable is an Rc<Node>. Cloning a Variable aliases the same node: a write
//   through `value_mut()` on one handle is visible through every other. The
//   graph is a DAG because a node can only point at nodes that existed before
//   it, so plain Rc is enough and no cycle collection is needed.
//
// INTERIOR MUTABILITY:
//
//   `value` and `grad` live in separate RefCells, so a backward rule can read
//   a parent's value while accumulating into its gradient. The graph is
//   single-threaded; Variable is neither Send nor Sync.

/// Unique identifier for a graph node, used for identity during traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID (uses a global atomic counter).
    pub(crate) fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        NodeId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) enum NodeKind<E: WithDType, S: Shape> {
    Leaf,
    Operation {
        name: &'static str,
        /// `None` once the node has detached from its parents.
        rule: Option<Box<dyn Backward<E, S>>>,
    },
}

pub(crate) struct Node<E: WithDType, S: Shape> {
    pub(crate) id: NodeId,
    pub(crate) value: RefCell<Tensor<E, S>>,
    pub(crate) grad: RefCell<Tensor<E, S>>,
    pub(crate) requires_grad: Cell<bool>,
    pub(crate) kind: NodeKind<E, S>,
}

/// The shape-erased view of a node used by the backward traversal.
pub(crate) trait GraphNode {
    fn id(&self) -> NodeId;

    fn requires_grad(&self) -> bool;

    /// Name of the operation that produced the node, or `"leaf"`.
    fn name(&self) -> &'static str;

    /// Parents this node propagates gradient to. Empty for leaves and for
    /// detached operation nodes.
    fn children(&self) -> Vec<Rc<dyn GraphNode>>;

    /// Run the backward rule with the accumulated gradient, then clear it.
    fn push_gradient(&self);
}

impl<E: WithDType, S: Shape> GraphNode for Node<E, S> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn requires_grad(&self) -> bool {
        self.requires_grad.get()
    }

    fn name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Leaf => "leaf",
            NodeKind::Operation { name, .. } => *name,
        }
    }

    fn children(&self) -> Vec<Rc<dyn GraphNode>> {
        match &self.kind {
            NodeKind::Operation {
                rule: Some(rule), ..
            } => rule.parents(),
            _ => Vec::new(),
        }
    }

    fn push_gradient(&self) {
        let NodeKind::Operation { rule, .. } = &self.kind else {
            return;
        };
        if let Some(rule) = rule {
            let grad = self.grad.borrow();
            let value = self.value.borrow();
            rule.backward(&grad, &value);
        }
        self.grad.borrow_mut().fill_with(E::zero());
    }
}

/// A differentiable value: a shared handle to a graph node holding a tensor
/// value and its gradient accumulator.
///
/// # Example
/// ```
/// use fixgrad_autograd::Variable;
/// use fixgrad_core::{Rank1, Tensor};
///
/// let a = Variable::new(Tensor::<f64, Rank1<3>>::from([1.0, 2.0, 3.0]), true);
/// let b = Variable::new(Tensor::<f64, Rank1<3>>::from([4.0, 5.0, 6.0]), true);
/// let loss = (&a * &b).sum();
/// loss.backward();
/// assert_eq!(a.grad().as_slice(), &[4.0, 5.0, 6.0]);
/// assert_eq!(b.grad().as_slice(), &[1.0, 2.0, 3.0]);
/// ```
pub struct Variable<E: WithDType, S: Shape> {
    pub(crate) node: Rc<Node<E, S>>,
}

impl<E: WithDType, S: Shape> Clone for Variable<E, S> {
    fn clone(&self) -> Self {
        Variable {
            node: Rc::clone(&self.node),
        }
    }
}

impl<E: WithDType, S: Shape> Variable<E, S> {
    /// Create a leaf holding `value`, with a zero gradient.
    pub fn new(value: Tensor<E, S>, requires_grad: bool) -> Self {
        Self::from_node(value, requires_grad, NodeKind::Leaf)
    }

    /// A trainable leaf (`requires_grad == true`).
    pub fn leaf(value: Tensor<E, S>) -> Self {
        Self::new(value, true)
    }

    /// A constant leaf (`requires_grad == false`).
    pub fn constant(value: Tensor<E, S>) -> Self {
        Self::new(value, false)
    }

    pub(crate) fn from_node(value: Tensor<E, S>, requires_grad: bool, kind: NodeKind<E, S>) -> Self {
        Variable {
            node: Rc::new(Node {
                id: NodeId::new(),
                value: RefCell::new(value),
                grad: RefCell::new(Tensor::zeros()),
                requires_grad: Cell::new(requires_grad),
                kind,
            }),
        }
    }

    pub(crate) fn graph_node(&self) -> Rc<dyn GraphNode> {
        self.node.clone()
    }

    /// Borrow the forward value.
    pub fn value(&self) -> Ref<'_, Tensor<E, S>> {
        self.node.value.borrow()
    }

    /// Mutably borrow the forward value (for example, for an optimizer step).
    pub fn value_mut(&self) -> RefMut<'_, Tensor<E, S>> {
        self.node.value.borrow_mut()
    }

    /// Borrow the accumulated gradient.
    pub fn grad(&self) -> Ref<'_, Tensor<E, S>> {
        self.node.grad.borrow()
    }

    pub fn grad_mut(&self) -> RefMut<'_, Tensor<E, S>> {
        self.node.grad.borrow_mut()
    }

    pub fn requires_grad(&self) -> bool {
        self.node.requires_grad.get()
    }

    /// Change whether a leaf takes part in gradient computation.
    ///
    /// Only leaves can be switched: an operation node's flag is fixed by its
    /// parents when it is built. Panics when called on an operation node.
    pub fn set_requires_grad(&self, requires_grad: bool) {
        assert!(
            self.is_leaf(),
            "requires_grad can only be changed on a leaf variable"
        );
        self.node.requires_grad.set(requires_grad);
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.node.kind, NodeKind::Leaf)
    }

    /// Reset the gradient accumulator to zero.
    pub fn zero_grad(&self) {
        self.node.grad.borrow_mut().fill_with(E::zero());
    }

    /// A new, independent leaf with a snapshot of the current value and the
    /// same `requires_grad` flag, detached from any graph history.
    pub fn copy(&self) -> Self {
        Self::new(self.value().clone(), self.requires_grad())
    }

    pub fn id(&self) -> NodeId {
        self.node.id
    }

    /// Name of the operation that produced this variable, or `"leaf"`.
    pub fn op_name(&self) -> &'static str {
        self.node.name()
    }

    /// Whether two handles alias the same node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }
}

impl<E: WithDType> Variable<E, Rank0> {
    /// The scalar forward value.
    pub fn item(&self) -> E {
        self.value().item()
    }
}

impl<E: WithDType, S: Shape> From<Tensor<E, S>> for Variable<E, S> {
    /// A constant leaf; use [`Variable::leaf`] for a trainable one.
    fn from(value: Tensor<E, S>) -> Self {
        Self::constant(value)
    }
}

impl<E: WithDType, S: Shape> fmt::Debug for Variable<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("id", &self.node.id)
            .field("op", &self.op_name())
            .field("requires_grad", &self.requires_grad())
            .field("value", &*self.value())
            .finish()
    }
}

impl<E: WithDType + Dump, S: Shape> Dump for Variable<E, S> {
    fn dump(&self, out: &mut dyn Write) -> fixgrad_core::Result<()> {
        self.value().dump(out)
    }
}

impl<E: WithDType + Load, S: Shape> Load for Variable<E, S> {
    fn load(&mut self, input: &mut dyn Read) -> fixgrad_core::Result<()> {
        self.value_mut().load(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixgrad_core::{persist, Rank2};

    fn sample() -> Tensor<f32, Rank2<2, 2>> {
        Tensor::from([[1.0, 2.0], [3.0, 4.0]])
    }

    #[test]
    fn test_leaf_starts_with_zero_grad() {
        let v = Variable::leaf(sample());
        assert!(v.is_leaf());
        assert!(v.requires_grad());
        assert_eq!(*v.grad(), Tensor::zeros());
        assert_eq!(v.op_name(), "leaf");
    }

    #[test]
    fn test_clone_aliases_node() {
        let v = Variable::leaf(sample());
        let alias = v.clone();
        alias.value_mut()[[0, 0]] = 10.0;
        assert_eq!(v.value()[[0, 0]], 10.0);
        assert!(v.ptr_eq(&alias));
        assert_eq!(v.id(), alias.id());
    }

    #[test]
    fn test_copy_is_detached() {
        let v = Variable::leaf(sample());
        let c = v.copy();
        c.value_mut().fill_with(0.0);
        assert_eq!(v.value()[[1, 1]], 4.0);
        assert!(c.requires_grad());
        assert!(!c.ptr_eq(&v));
        assert_ne!(c.id(), v.id());
    }

    #[test]
    fn test_zero_grad() {
        let v = Variable::leaf(sample());
        v.grad_mut().fill_with(3.0);
        v.zero_grad();
        assert!(v.grad().iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_from_tensor_is_constant() {
        let v: Variable<f32, Rank2<2, 2>> = sample().into();
        assert!(!v.requires_grad());
        v.set_requires_grad(true);
        assert!(v.requires_grad());
    }

    #[test]
    fn test_node_ids_unique() {
        let a = NodeId::new();
        let b = NodeId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_dump_load_value() {
        let v = Variable::leaf(sample());
        let bytes = persist::to_bytes(&v).unwrap();
        let mut w = Variable::leaf(Tensor::<f32, Rank2<2, 2>>::zeros());
        persist::load_from_bytes(&mut w, &bytes).unwrap();
        assert_eq!(*w.value(), sample());
        assert!(w.grad().iter().all(|&g| g == 0.0));
    }
}
