// Backpropagation: reverse pass from a scalar variable
//
//   1. Discover every distinct ancestor reachable through edges whose
//      endpoint requires grad, depth-first, with a visited set keyed by
//      NodeId. A node shared by several paths is found once. Nodes are
//      recorded in post-order: a node only after all its discovered parents.
//
//   2. Seed the root's gradient with 1 and push it.
//
//   3. Walk the recorded order back to front. Every consumer of a node sits
//      later in post-order than the node itself, so by the time a node is
//      pushed all of its incoming contributions have arrived.
//
// Pushing an operation node runs its rule and then zeroes its own gradient,
// leaving intermediate buffers clean for the next pass. Leaves are never
// cleared; their gradient is what the caller reads, and it keeps
// accumulating across passes until `zero_grad`.
//
// The search uses an explicit stack of frames instead of recursion, so the
// depth of the graph is not limited by the call stack.

use std::collections::HashSet;
use std::rc::Rc;

use fixgrad_core::{Rank0, WithDType};

use crate::variable::{GraphNode, NodeId, Variable};

struct Frame {
    node: Rc<dyn GraphNode>,
    children: Vec<Rc<dyn GraphNode>>,
    next: usize,
}

impl Frame {
    fn new(node: Rc<dyn GraphNode>) -> Self {
        let children = node.children();
        Frame {
            node,
            children,
            next: 0,
        }
    }
}

/// Post-order of the gradient-requiring ancestors of `root`, root excluded.
fn topological_order(root: Rc<dyn GraphNode>) -> Vec<Rc<dyn GraphNode>> {
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut order = Vec::new();
    visited.insert(root.id());
    let mut stack = vec![Frame::new(root)];

    while let Some(frame) = stack.last_mut() {
        if let Some(child) = frame.children.get(frame.next).cloned() {
            frame.next += 1;
            if child.requires_grad() && visited.insert(child.id()) {
                stack.push(Frame::new(child));
            }
            continue;
        }
        let Some(done) = stack.pop() else { break };
        if !stack.is_empty() {
            order.push(done.node);
        }
    }
    order
}

impl<E: WithDType> Variable<E, Rank0> {
    /// Run the backward pass from this scalar.
    ///
    /// Accumulates `d self / d leaf` into the gradient of every leaf with
    /// `requires_grad` that contributes to `self`. Only scalars have a
    /// `backward`; reduce with [`Variable::sum`] first.
    pub fn backward(&self) {
        let root = self.graph_node();
        let order = topological_order(root.clone());
        tracing::debug!(root = %self.id(), nodes = order.len(), "backward pass");

        self.grad_mut().fill_with(E::one());
        tracing::trace!(node = %root.id(), op = root.name(), "push gradient");
        root.push_gradient();

        for node in order.iter().rev() {
            tracing::trace!(node = %node.id(), op = node.name(), "push gradient");
            node.push_gradient();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixgrad_core::{Rank1, Rank2, Tensor};

    #[test]
    fn test_sum_grad_is_ones() {
        let v = Variable::leaf(Tensor::<f64, Rank2<2, 3>>::from([[1.0, -2.0, 3.0], [0.0, 5.0, 6.0]]));
        v.sum().backward();
        assert_eq!(*v.grad(), Tensor::ones());
    }

    #[test]
    fn test_order_excludes_root_and_constants() {
        let a = Variable::leaf(Tensor::<f64, Rank1<2>>::from([1.0, 2.0]));
        let b = Variable::constant(Tensor::<f64, Rank1<2>>::from([3.0, 4.0]));
        let loss = (&a * &b).sum();
        let order = topological_order(loss.graph_node());
        let ids: Vec<NodeId> = order.iter().map(|n| n.id()).collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], a.id());
        assert!(!ids.contains(&loss.id()));
        assert!(!ids.contains(&b.id()));
    }

    #[test]
    fn test_shared_node_visited_once() {
        // y = a * b; z = y + y * a
        let a = Variable::leaf(Tensor::<f64, Rank1<1>>::from([2.0]));
        let b = Variable::leaf(Tensor::<f64, Rank1<1>>::from([3.0]));
        let y = &a * &b;
        let z = &y + &(&y * &a);
        let order = topological_order(z.sum().graph_node());
        let mut ids: Vec<NodeId> = order.iter().map(|n| n.id()).collect();
        let n = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), n);

        z.sum().backward();
        // z = ab + a²b: dz/da = b + 2ab, dz/db = a + a²
        assert_eq!(a.grad().as_slice(), &[15.0]);
        assert_eq!(b.grad().as_slice(), &[6.0]);
    }

    #[test]
    fn test_intermediate_grads_cleared() {
        let a = Variable::leaf(Tensor::<f64, Rank1<2>>::from([1.0, 2.0]));
        let h = a.exp();
        let loss = h.sum();
        loss.backward();
        assert!(h.grad().iter().all(|&g| g == 0.0));
        assert_eq!(loss.grad().item(), 0.0);
    }

    #[test]
    fn test_repeated_backward_accumulates_into_leaves() {
        let a = Variable::leaf(Tensor::<f64, Rank1<3>>::from([1.0, 2.0, 3.0]));
        let loss = a.scale(2.0).sum();
        loss.backward();
        loss.backward();
        assert!(a.grad().iter().all(|&g| g == 4.0));
    }

    #[test]
    fn test_leaf_root() {
        let a = Variable::leaf(Tensor::<f64, Rank0>::from(5.0));
        a.backward();
        assert_eq!(a.grad().item(), 1.0);
    }

    #[test]
    fn test_long_chain() {
        let a = Variable::leaf(Tensor::<f64, Rank0>::from(1.0));
        let mut x = a.clone();
        for _ in 0..1000 {
            x = &x + &a;
        }
        x.backward();
        assert_eq!(a.grad().item(), 1001.0);
    }
}
