// Differentiable operations
//
// Each operation is a forward function over tensors plus a backward rule in
// the (grad, output, operands...) convention of `op`. `g` is the gradient at
// the operation's output, `o` its forward value.
//
//   Add:        l.grad += g,             r.grad += g
//   Sub:        l.grad += g,             r.grad -= g
//   Mul:        l.grad += g * r,         r.grad += g * l
//   Div:        l.grad += g / r,         r.grad -= g * l / r²
//   Neg:        v.grad -= g
//   Scale(c):   v.grad += g * c
//   MatMul:     l.grad += g @ rᵀ,        r.grad += lᵀ @ g
//   Transpose:  v.grad += gᵀ
//   View:       v.grad += view(g, shape of v)
//   Sum:        v.grad += g broadcast over v
//   Log:        v.grad += g / v
//   Sqrt:       v.grad += g * 0.5 / o
//   Exp:        v.grad += g * o
//   Tanh:       v.grad += g * (1 - o²)
//   Sigmoid:    v.grad += g * o * (1 - o)
//   Abs:        v.grad += g * sign(v)
//   Stack:      split g at l's extent; first part to l, rest to r
//   AddBias:    t.grad += g,             bias.grad += sum of g except axis 1
//   Dropout:    v.grad += g * mask
//
// A plain tensor on either side of `+ - * /` is wrapped in a constant leaf.

use std::ops::{Add, Div, Mul, Neg, Sub};

use fixgrad_core::{
    matrix_product_acc, matrix_product_transposed_acc, Rank0, Rank1, Rank2, Shape, Tensor,
    WithDType,
};
use num_traits::Float;
use rand::Rng;

use crate::op::{binary, unary};
use crate::variable::Variable;

/// `lhs + rhs`.
pub fn add<E: WithDType, S: Shape>(lhs: &Variable<E, S>, rhs: &Variable<E, S>) -> Variable<E, S> {
    binary("add", lhs, rhs, |l, r| l + r, |g, _, mut l, mut r| {
        l.accumulate(g);
        r.accumulate(g);
    })
}

/// `lhs - rhs`.
pub fn sub<E: WithDType, S: Shape>(lhs: &Variable<E, S>, rhs: &Variable<E, S>) -> Variable<E, S> {
    binary("sub", lhs, rhs, |l, r| l - r, |g, _, mut l, mut r| {
        l.accumulate(g);
        r.accumulate_neg(g);
    })
}

/// Elementwise `lhs * rhs`.
pub fn mul<E: WithDType, S: Shape>(lhs: &Variable<E, S>, rhs: &Variable<E, S>) -> Variable<E, S> {
    binary("mul", lhs, rhs, |l, r| l * r, |g, _, mut l, mut r| {
        if l.wants_grad() {
            let d = g * r.value;
            l.accumulate(&d);
        }
        if r.wants_grad() {
            let d = g * l.value;
            r.accumulate(&d);
        }
    })
}

/// Elementwise `lhs / rhs`.
pub fn div<E: WithDType, S: Shape>(lhs: &Variable<E, S>, rhs: &Variable<E, S>) -> Variable<E, S> {
    binary("div", lhs, rhs, |l, r| l / r, |g, _, mut l, mut r| {
        if l.wants_grad() {
            let d = g / r.value;
            l.accumulate(&d);
        }
        if r.wants_grad() {
            let d = (g * l.value) / (r.value * r.value);
            r.accumulate_neg(&d);
        }
    })
}

macro_rules! variable_binary_ops {
    ($trait:ident, $method:ident, $func:ident) => {
        impl<E: WithDType, S: Shape> $trait<&Variable<E, S>> for &Variable<E, S> {
            type Output = Variable<E, S>;

            fn $method(self, rhs: &Variable<E, S>) -> Variable<E, S> {
                $func(self, rhs)
            }
        }

        impl<E: WithDType, S: Shape> $trait<Variable<E, S>> for &Variable<E, S> {
            type Output = Variable<E, S>;

            fn $method(self, rhs: Variable<E, S>) -> Variable<E, S> {
                $func(self, &rhs)
            }
        }

        impl<E: WithDType, S: Shape> $trait<&Variable<E, S>> for Variable<E, S> {
            type Output = Variable<E, S>;

            fn $method(self, rhs: &Variable<E, S>) -> Variable<E, S> {
                $func(&self, rhs)
            }
        }

        impl<E: WithDType, S: Shape> $trait<Variable<E, S>> for Variable<E, S> {
            type Output = Variable<E, S>;

            fn $method(self, rhs: Variable<E, S>) -> Variable<E, S> {
                $func(&self, &rhs)
            }
        }

        impl<E: WithDType, S: Shape> $trait<&Tensor<E, S>> for &Variable<E, S> {
            type Output = Variable<E, S>;

            fn $method(self, rhs: &Tensor<E, S>) -> Variable<E, S> {
                $func(self, &Variable::constant(rhs.clone()))
            }
        }

        impl<E: WithDType, S: Shape> $trait<Tensor<E, S>> for &Variable<E, S> {
            type Output = Variable<E, S>;

            fn $method(self, rhs: Tensor<E, S>) -> Variable<E, S> {
                $func(self, &Variable::constant(rhs))
            }
        }

        impl<E: WithDType, S: Shape> $trait<&Tensor<E, S>> for Variable<E, S> {
            type Output = Variable<E, S>;

            fn $method(self, rhs: &Tensor<E, S>) -> Variable<E, S> {
                $func(&self, &Variable::constant(rhs.clone()))
            }
        }

        impl<E: WithDType, S: Shape> $trait<Tensor<E, S>> for Variable<E, S> {
            type Output = Variable<E, S>;

            fn $method(self, rhs: Tensor<E, S>) -> Variable<E, S> {
                $func(&self, &Variable::constant(rhs))
            }
        }

        impl<E: WithDType, S: Shape> $trait<&Variable<E, S>> for &Tensor<E, S> {
            type Output = Variable<E, S>;

            fn $method(self, rhs: &Variable<E, S>) -> Variable<E, S> {
                $func(&Variable::constant(self.clone()), rhs)
            }
        }

        impl<E: WithDType, S: Shape> $trait<Variable<E, S>> for &Tensor<E, S> {
            type Output = Variable<E, S>;

            fn $method(self, rhs: Variable<E, S>) -> Variable<E, S> {
                $func(&Variable::constant(self.clone()), &rhs)
            }
        }

        impl<E: WithDType, S: Shape> $trait<&Variable<E, S>> for Tensor<E, S> {
            type Output = Variable<E, S>;

            fn $method(self, rhs: &Variable<E, S>) -> Variable<E, S> {
                $func(&Variable::constant(self), rhs)
            }
        }

        impl<E: WithDType, S: Shape> $trait<Variable<E, S>> for Tensor<E, S> {
            type Output = Variable<E, S>;

            fn $method(self, rhs: Variable<E, S>) -> Variable<E, S> {
                $func(&Variable::constant(self), &rhs)
            }
        }
    };
}

variable_binary_ops!(Add, add, add);
variable_binary_ops!(Sub, sub, sub);
variable_binary_ops!(Mul, mul, mul);
variable_binary_ops!(Div, div, div);

impl<E: WithDType + Neg<Output = E>, S: Shape> Neg for &Variable<E, S> {
    type Output = Variable<E, S>;

    fn neg(self) -> Variable<E, S> {
        unary("neg", self, |v| -v, |g, _, mut v| v.accumulate_neg(g))
    }
}

impl<E: WithDType + Neg<Output = E>, S: Shape> Neg for Variable<E, S> {
    type Output = Variable<E, S>;

    fn neg(self) -> Variable<E, S> {
        -&self
    }
}

impl<E: WithDType, S: Shape> Mul<E> for &Variable<E, S> {
    type Output = Variable<E, S>;

    fn mul(self, rhs: E) -> Variable<E, S> {
        self.scale(rhs)
    }
}

impl<E: WithDType, S: Shape> Mul<E> for Variable<E, S> {
    type Output = Variable<E, S>;

    fn mul(self, rhs: E) -> Variable<E, S> {
        self.scale(rhs)
    }
}

impl<E: WithDType, S: Shape> Variable<E, S> {
    /// Multiply every element by the constant `c`.
    pub fn scale(&self, c: E) -> Self {
        unary("scale", self, move |v| v * c, move |g, _, mut v| {
            let d = g * c;
            v.accumulate(&d);
        })
    }

    /// Sum of all elements, as a scalar variable.
    pub fn sum(&self) -> Variable<E, Rank0> {
        unary(
            "sum",
            self,
            |v| Tensor::from(v.sum()),
            |g, _, mut v| {
                if v.wants_grad() {
                    v.accumulate(&Tensor::full(g.item()));
                }
            },
        )
    }

    /// Reinterpret as another shape with the same element count.
    ///
    /// The gradient flows back through the inverse view.
    pub fn view<S2: Shape>(&self) -> Variable<E, S2> {
        unary("view", self, |v| v.reshape::<S2>(), |g, _, mut v| {
            v.accumulate(g.view::<S>());
        })
    }

    /// Alias of [`Variable::view`].
    pub fn reshape<S2: Shape>(&self) -> Variable<E, S2> {
        self.view()
    }

    /// Concatenate with `other` along `AXIS`; the result shape is named by the
    /// caller and checked at compile time.
    pub fn stack_along<const AXIS: usize, S2: Shape, Out: Shape>(
        &self,
        other: &Variable<E, S2>,
    ) -> Variable<E, Out> {
        binary(
            "stack",
            self,
            other,
            |l, r| l.stack_along::<AXIS, S2, Out>(r),
            |g, _, mut l, mut r| {
                let (first, rest) = g.split_along::<AXIS, S, S2>();
                l.accumulate(&first);
                r.accumulate(&rest);
            },
        )
    }

    /// Add `bias[j]` to every element of `self[i][j]`.
    pub fn add_bias<const N: usize>(&self, bias: &Variable<E, Rank1<N>>) -> Self {
        binary(
            "add_bias",
            self,
            bias,
            |t, b| t.add_bias(b),
            |g, _, mut t, mut b| {
                t.accumulate(g);
                if b.wants_grad() {
                    b.accumulate(&g.sum_to_bias::<N>());
                }
            },
        )
    }
}

impl<E: WithDType + Float, S: Shape> Variable<E, S> {
    /// Natural logarithm.
    pub fn log(&self) -> Self {
        unary("log", self, |v| v.log(), |g, _, mut v| {
            let d = g / v.value;
            v.accumulate(&d);
        })
    }

    pub fn sqrt(&self) -> Self {
        unary("sqrt", self, |v| v.sqrt(), |g, o, mut v| {
            let d = (g * E::from_f64(0.5)) / o;
            v.accumulate(&d);
        })
    }

    pub fn exp(&self) -> Self {
        unary("exp", self, |v| v.exp(), |g, o, mut v| {
            let d = g * o;
            v.accumulate(&d);
        })
    }

    pub fn tanh(&self) -> Self {
        unary("tanh", self, |v| v.tanh(), |g, o, mut v| {
            let d = g * &o.map(|y| E::one() - y * y);
            v.accumulate(&d);
        })
    }

    pub fn sigmoid(&self) -> Self {
        unary("sigmoid", self, |v| v.sigmoid(), |g, o, mut v| {
            let d = g * &o.map(|y| y * (E::one() - y));
            v.accumulate(&d);
        })
    }

    /// Absolute value. The gradient at zero is zero.
    pub fn abs(&self) -> Self {
        unary("abs", self, |v| v.abs(), |g, _, mut v| {
            let sign = v.value.map(|x| {
                if x > E::zero() {
                    E::one()
                } else if x < E::zero() {
                    -E::one()
                } else {
                    E::zero()
                }
            });
            let d = g * &sign;
            v.accumulate(&d);
        })
    }

    /// Zero each element with probability `p` and scale the survivors by
    /// `1 / (1 - p)`.
    ///
    /// The mask is drawn once from `rng` and reused by the backward rule.
    /// `p == 0` returns a handle to `self` unchanged. Panics unless
    /// `0 <= p < 1`.
    pub fn dropout<R: Rng + ?Sized>(&self, p: f64, rng: &mut R) -> Self {
        assert!(
            (0.0..1.0).contains(&p),
            "dropout probability must lie in [0, 1), got {p}"
        );
        if p == 0.0 {
            return self.clone();
        }
        let keep = E::from_f64(1.0 / (1.0 - p));
        let mut mask = Tensor::<E, S>::zeros();
        for m in mask.as_mut_slice() {
            if rng.gen_bool(1.0 - p) {
                *m = keep;
            }
        }
        let forward_mask = mask.clone();
        unary(
            "dropout",
            self,
            move |v| v * &forward_mask,
            move |g, _, mut v| {
                let d = g * &mask;
                v.accumulate(&d);
            },
        )
    }
}

impl<E: WithDType, const M: usize, const K: usize> Variable<E, Rank2<M, K>> {
    /// Matrix product `[M, K] × [K, N] → [M, N]`.
    pub fn matrix_product<const N: usize>(&self, rhs: &Variable<E, Rank2<K, N>>) -> Variable<E, Rank2<M, N>> {
        binary(
            "matmul",
            self,
            rhs,
            |l, r| l.matmul(r),
            |g, _, l, r| {
                if let Some(lg) = l.grad {
                    matrix_product_transposed_acc(g, r.value, lg);
                }
                if let Some(rg) = r.grad {
                    matrix_product_acc(&l.value.t(), g, rg);
                }
            },
        )
    }

    /// Alias of [`Variable::matrix_product`].
    pub fn matmul<const N: usize>(&self, rhs: &Variable<E, Rank2<K, N>>) -> Variable<E, Rank2<M, N>> {
        self.matrix_product(rhs)
    }

    /// Matrix transpose.
    pub fn t(&self) -> Variable<E, Rank2<K, M>> {
        unary("transpose", self, |v| v.t(), |g, _, mut v| {
            v.accumulate(&g.t());
        })
    }

    /// Alias of [`Variable::t`].
    pub fn transpose(&self) -> Variable<E, Rank2<K, M>> {
        self.t()
    }
}
