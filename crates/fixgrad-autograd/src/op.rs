use std::rc::Rc;

use fixgrad_core::{Shape, Tensor, WithDType};

use crate::variable::{GraphNode, Node, NodeKind, Variable};

// Operation nodes: forward now, backward later
//
// Building an operation node does three things:
//
//   1. value = forward(parent values...)            (eager, never deferred)
//   2. requires_grad = OR of the parents' flags
//   3. if requires_grad, keep the backward rule and the parents;
//      otherwise drop both, so the node holds no reference upstream
//
// BACKWARD CONVENTION:
//
//   Every rule has the same shape of call:
//
//     rule(grad, output, operand_0, operand_1, ...)
//
//   `grad` is the gradient accumulated at this node, `output` is this node's
//   own forward value (Exp, Tanh, Sigmoid and Sqrt express their derivative
//   through it), and each operand carries the parent's current value plus
//   `Some(&mut grad)` when the parent requires a gradient, `None` otherwise.
//   Rules must add into the parent gradient, never overwrite it: a node can
//   receive contributions along several edges.
//
// SELF-REFERENCE:
//
//   `v + v` has the same node as both operands. The left operand gets the
//   real accumulator; the right operand's contribution goes to a scratch
//   tensor that is added in once the rule returns, so no RefCell is borrowed
//   mutably twice.

/// One parent of an operation, as seen by its backward rule.
pub struct Operand<'a, E: WithDType, S: Shape> {
    /// The parent's current forward value.
    pub value: &'a Tensor<E, S>,
    /// The parent's gradient accumulator, present only if it requires grad.
    pub grad: Option<&'a mut Tensor<E, S>>,
}

impl<E: WithDType, S: Shape> Operand<'_, E, S> {
    /// `parent.grad += contribution`, if the parent takes gradients.
    pub fn accumulate(&mut self, contribution: &Tensor<E, S>) {
        if let Some(grad) = self.grad.as_deref_mut() {
            *grad += contribution;
        }
    }

    /// `parent.grad -= contribution`, if the parent takes gradients.
    pub fn accumulate_neg(&mut self, contribution: &Tensor<E, S>) {
        if let Some(grad) = self.grad.as_deref_mut() {
            *grad -= contribution;
        }
    }

    /// Whether the parent takes gradients at all; lets a rule skip work.
    pub fn wants_grad(&self) -> bool {
        self.grad.is_some()
    }
}

/// A stored backward rule together with the parents it propagates to.
pub(crate) trait Backward<E: WithDType, S: Shape> {
    fn parents(&self) -> Vec<Rc<dyn GraphNode>>;

    fn backward(&self, grad: &Tensor<E, S>, output: &Tensor<E, S>);
}

struct UnaryOp<E: WithDType, SIn: Shape, F> {
    input: Rc<Node<E, SIn>>,
    rule: F,
}

impl<E, SIn, S, F> Backward<E, S> for UnaryOp<E, SIn, F>
where
    E: WithDType,
    SIn: Shape,
    S: Shape,
    F: Fn(&Tensor<E, S>, &Tensor<E, S>, Operand<'_, E, SIn>),
{
    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        vec![self.input.clone()]
    }

    fn backward(&self, grad: &Tensor<E, S>, output: &Tensor<E, S>) {
        let value = self.input.value.borrow();
        let mut input_grad = self
            .input
            .requires_grad
            .get()
            .then(|| self.input.grad.borrow_mut());
        (self.rule)(
            grad,
            output,
            Operand {
                value: &value,
                grad: input_grad.as_deref_mut(),
            },
        );
    }
}

struct BinaryOp<E: WithDType, SL: Shape, SR: Shape, F> {
    lhs: Rc<Node<E, SL>>,
    rhs: Rc<Node<E, SR>>,
    rule: F,
}

impl<E, SL, SR, S, F> Backward<E, S> for BinaryOp<E, SL, SR, F>
where
    E: WithDType,
    SL: Shape,
    SR: Shape,
    S: Shape,
    F: Fn(&Tensor<E, S>, &Tensor<E, S>, Operand<'_, E, SL>, Operand<'_, E, SR>),
{
    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        vec![self.lhs.clone(), self.rhs.clone()]
    }

    fn backward(&self, grad: &Tensor<E, S>, output: &Tensor<E, S>) {
        let lhs_value = self.lhs.value.borrow();
        let rhs_value = self.rhs.value.borrow();
        let lhs_wants = self.lhs.requires_grad.get();
        let rhs_wants = self.rhs.requires_grad.get();

        if self.lhs.id == self.rhs.id {
            let mut scratch = Tensor::<E, SR>::zeros();
            {
                let mut lhs_grad = lhs_wants.then(|| self.lhs.grad.borrow_mut());
                (self.rule)(
                    grad,
                    output,
                    Operand {
                        value: &lhs_value,
                        grad: lhs_grad.as_deref_mut(),
                    },
                    Operand {
                        value: &rhs_value,
                        grad: rhs_wants.then_some(&mut scratch),
                    },
                );
            }
            if rhs_wants {
                *self.rhs.grad.borrow_mut() += &scratch;
            }
            return;
        }

        let mut lhs_grad = lhs_wants.then(|| self.lhs.grad.borrow_mut());
        let mut rhs_grad = rhs_wants.then(|| self.rhs.grad.borrow_mut());
        (self.rule)(
            grad,
            output,
            Operand {
                value: &lhs_value,
                grad: lhs_grad.as_deref_mut(),
            },
            Operand {
                value: &rhs_value,
                grad: rhs_grad.as_deref_mut(),
            },
        );
    }
}

fn finish<E: WithDType, S: Shape>(
    name: &'static str,
    value: Tensor<E, S>,
    requires_grad: bool,
    rule: impl FnOnce() -> Box<dyn Backward<E, S>>,
) -> Variable<E, S> {
    let rule = if requires_grad {
        Some(rule())
    } else {
        None
    };
    let out = Variable::from_node(value, requires_grad, NodeKind::Operation { name, rule });
    if !requires_grad {
        tracing::trace!(node = %out.id(), op = name, "operation detached from its parents");
    }
    out
}

/// Build an operation node with one parent.
///
/// `forward` computes the value eagerly from the parent's value; `backward`
/// is called later as `backward(grad, output, operand)`.
///
/// ```
/// use fixgrad_autograd::{op, Variable};
/// use fixgrad_core::{Rank1, Tensor};
///
/// // y = x³, dy/dx = 3x²
/// let x = Variable::leaf(Tensor::<f64, Rank1<2>>::from([1.0, 2.0]));
/// let y = op::unary(
///     "cube",
///     &x,
///     |v| v.map(|e| e * e * e),
///     |g, _out, mut x| {
///         let d = x.value.map(|e| 3.0 * e * e);
///         x.accumulate(&(g * &d));
///     },
/// );
/// y.sum().backward();
/// assert_eq!(x.grad().as_slice(), &[3.0, 12.0]);
/// ```
pub fn unary<E, SIn, S, Fwd, Bwd>(
    name: &'static str,
    input: &Variable<E, SIn>,
    forward: Fwd,
    backward: Bwd,
) -> Variable<E, S>
where
    E: WithDType,
    SIn: Shape,
    S: Shape,
    Fwd: FnOnce(&Tensor<E, SIn>) -> Tensor<E, S>,
    Bwd: Fn(&Tensor<E, S>, &Tensor<E, S>, Operand<'_, E, SIn>) + 'static,
{
    let value = forward(&input.value());
    finish(name, value, input.requires_grad(), || {
        Box::new(UnaryOp {
            input: input.node.clone(),
            rule: backward,
        })
    })
}

/// Build an operation node with two parents.
///
/// `backward` is called as `backward(grad, output, lhs, rhs)`.
pub fn binary<E, SL, SR, S, Fwd, Bwd>(
    name: &'static str,
    lhs: &Variable<E, SL>,
    rhs: &Variable<E, SR>,
    forward: Fwd,
    backward: Bwd,
) -> Variable<E, S>
where
    E: WithDType,
    SL: Shape,
    SR: Shape,
    S: Shape,
    Fwd: FnOnce(&Tensor<E, SL>, &Tensor<E, SR>) -> Tensor<E, S>,
    Bwd: Fn(&Tensor<E, S>, &Tensor<E, S>, Operand<'_, E, SL>, Operand<'_, E, SR>) + 'static,
{
    let value = forward(&lhs.value(), &rhs.value());
    let requires_grad = lhs.requires_grad() || rhs.requires_grad();
    finish(name, value, requires_grad, || {
        Box::new(BinaryOp {
            lhs: lhs.node.clone(),
            rhs: rhs.node.clone(),
            rule: backward,
        })
    })
}
