use num_traits::Float;

use crate::dtype::WithDType;
use crate::shape::{self, Rank0, Shape};
use crate::tensor::Tensor;

// ApplyFunction: Structured elementwise traversal
//
// Every unary math function, comparison and reduction over sub-tensors is an
// instance of one traversal: split the shape S into an outer part and an
// `Inner` part, call `f` on each `Inner`-shaped sub-tensor in row-major order
// of the outer part, and write each result into the matching slot of the
// output.
//
//   S = [2, 3, 2], Inner = [2]     f: [2] -> scalar     result: [2, 3]
//   S = [2, 3, 2], Inner = [3, 2]  f: [3, 2] -> scalar  result: [2]
//   S = [2, 3, 2], Inner = []      f: scalar -> scalar  result: [2, 3, 2]
//
// `Inner` and the result shape are named by the caller (usually inferred from
// the closure argument and the binding); `shape::shares_outer` checks at
// compile time that the outer axes agree.
//
// The `Inner = Rank0` case is common enough to get flat fast paths: `map`,
// `map_inplace` and `zip_map`.

impl<E: Copy, S: Shape> Tensor<E, S> {
    /// Map every `Inner`-shaped sub-tensor to a sub-tensor of shape `RS`.
    pub fn apply_function_tensor<Inner, RS, Out, R, F>(&self, mut f: F) -> Tensor<R, Out>
    where
        Inner: Shape,
        RS: Shape,
        Out: Shape,
        R: Copy + Default,
        F: FnMut(&Tensor<E, Inner>) -> Tensor<R, RS>,
    {
        const {
            assert!(
                shape::shares_outer(S::DIMS, Inner::DIMS, Out::DIMS, RS::DIMS),
                "apply_function: result shape does not keep the outer axes"
            )
        };
        let outer = shape::product(S::DIMS, 0, S::RANK - Inner::RANK);
        let (n_in, n_out) = (Inner::NUMEL, RS::NUMEL);
        let mut out = Tensor::<R, Out>::default();
        for i in 0..outer {
            let sub = Tensor::<E, Inner>::ref_from_flat(&self.as_slice()[i * n_in..(i + 1) * n_in]);
            let r = f(sub);
            out.as_mut_slice()[i * n_out..(i + 1) * n_out].copy_from_slice(r.as_slice());
        }
        out
    }

    /// Reduce every `Inner`-shaped sub-tensor to one element.
    ///
    /// ```
    /// use fixgrad_core::{Rank1, Rank2, Tensor};
    ///
    /// let t = Tensor::<i32, Rank2<2, 3>>::from([[1, 2, 3], [4, 5, 6]]);
    /// let row_sums: Tensor<i32, Rank1<2>> = t.apply_function(|row: &Tensor<i32, Rank1<3>>| row.sum());
    /// assert_eq!(row_sums.as_slice(), &[6, 15]);
    /// ```
    pub fn apply_function<Inner, Out, R, F>(&self, mut f: F) -> Tensor<R, Out>
    where
        Inner: Shape,
        Out: Shape,
        R: Copy + Default,
        F: FnMut(&Tensor<E, Inner>) -> R,
    {
        self.apply_function_tensor::<Inner, Rank0, Out, R, _>(|sub| Tensor::from(f(sub)))
    }

    /// Reduce every pair of aligned `Inner`-shaped sub-tensors of `self` and
    /// `other` to one element.
    pub fn apply_function2<Inner, Out, E2, R, F>(
        &self,
        other: &Tensor<E2, S>,
        mut f: F,
    ) -> Tensor<R, Out>
    where
        Inner: Shape,
        Out: Shape,
        E2: Copy,
        R: Copy + Default,
        F: FnMut(&Tensor<E, Inner>, &Tensor<E2, Inner>) -> R,
    {
        const {
            assert!(
                shape::shares_outer(S::DIMS, Inner::DIMS, Out::DIMS, &[]),
                "apply_function2: result shape does not keep the outer axes"
            )
        };
        let n = Inner::NUMEL;
        let mut out = Tensor::<R, Out>::default();
        for (i, slot) in out.as_mut_slice().iter_mut().enumerate() {
            let a = Tensor::<E, Inner>::ref_from_flat(&self.as_slice()[i * n..(i + 1) * n]);
            let b = Tensor::<E2, Inner>::ref_from_flat(&other.as_slice()[i * n..(i + 1) * n]);
            *slot = f(a, b);
        }
        out
    }

    /// Call `f` on every `Inner`-shaped sub-tensor, mutably.
    pub fn apply_function_inplace<Inner, F>(&mut self, mut f: F) -> &mut Self
    where
        Inner: Shape,
        F: FnMut(&mut Tensor<E, Inner>),
    {
        const {
            assert!(
                shape::ends_with(S::DIMS, Inner::DIMS),
                "apply_function_inplace: shape does not end with the sub-tensor shape"
            )
        };
        let n = Inner::NUMEL;
        let outer = shape::product(S::DIMS, 0, S::RANK - Inner::RANK);
        for i in 0..outer {
            f(Tensor::<E, Inner>::mut_from_flat(
                &mut self.as_mut_slice()[i * n..(i + 1) * n],
            ));
        }
        self
    }

    /// Apply `f` to every element.
    pub fn map<R: Copy + Default>(&self, mut f: impl FnMut(E) -> R) -> Tensor<R, S> {
        let mut out = Tensor::<R, S>::default();
        for (o, &x) in out.as_mut_slice().iter_mut().zip(self.as_slice()) {
            *o = f(x);
        }
        out
    }

    /// Apply `f` to every element in place.
    pub fn map_inplace(&mut self, mut f: impl FnMut(E) -> E) -> &mut Self {
        for x in self.as_mut_slice() {
            *x = f(*x);
        }
        self
    }

    /// Combine aligned elements of two same-shape tensors.
    pub fn zip_map<E2: Copy, R: Copy + Default>(
        &self,
        other: &Tensor<E2, S>,
        mut f: impl FnMut(E, E2) -> R,
    ) -> Tensor<R, S> {
        let mut out = Tensor::<R, S>::default();
        for ((o, &a), &b) in out
            .as_mut_slice()
            .iter_mut()
            .zip(self.as_slice())
            .zip(other.as_slice())
        {
            *o = f(a, b);
        }
        out
    }
}

// Reductions

impl<E: WithDType, S: Shape> Tensor<E, S> {
    /// Sum of all elements.
    pub fn sum(&self) -> E {
        self.iter().fold(E::zero(), |acc, &x| acc + x)
    }

    /// Sum over the trailing axes, keeping the leading axes of `Out`.
    ///
    /// `Tensor<_, Rank3<2, 3, 2>>::sum_trailing::<Rank1<2>>()` sums each of
    /// the two `[3, 2]` blocks.
    pub fn sum_trailing<Out: Shape>(&self) -> Tensor<E, Out> {
        const {
            assert!(
                shape::starts_with(S::DIMS, Out::DIMS),
                "sum_trailing: result shape is not a prefix of the tensor shape"
            )
        };
        let n = S::NUMEL / Out::NUMEL.max(1);
        let mut out = Tensor::<E, Out>::zeros();
        for (i, o) in out.as_mut_slice().iter_mut().enumerate() {
            *o = self.as_slice()[i * n..(i + 1) * n]
                .iter()
                .fold(E::zero(), |acc, &x| acc + x);
        }
        out
    }

    /// Largest element. Returns `None` for a tensor with no elements.
    pub fn max(&self) -> Option<E> {
        self.iter()
            .copied()
            .reduce(|a, b| if b > a { b } else { a })
    }

    /// Smallest element. Returns `None` for a tensor with no elements.
    pub fn min(&self) -> Option<E> {
        self.iter()
            .copied()
            .reduce(|a, b| if b < a { b } else { a })
    }
}

// Elementwise math
//
// Domain errors are not intercepted: log of a negative number is NaN,
// log(0) is -inf, exactly as the scalar function returns them.

impl<E: WithDType + Float, S: Shape> Tensor<E, S> {
    pub fn log(&self) -> Self {
        self.map(Float::ln)
    }

    pub fn sqrt(&self) -> Self {
        self.map(Float::sqrt)
    }

    pub fn abs(&self) -> Self {
        self.map(Float::abs)
    }

    pub fn exp(&self) -> Self {
        self.map(Float::exp)
    }

    pub fn tanh(&self) -> Self {
        self.map(Float::tanh)
    }

    /// Logistic sigmoid `1 / (1 + e^-x)`.
    pub fn sigmoid(&self) -> Self {
        self.map(|x| E::one() / (E::one() + (-x).exp()))
    }

    pub fn powi(&self, n: i32) -> Self {
        self.map(|x| x.powi(n))
    }
}

/// Whether every element of `a` is within `eps` of the matching element of `b`.
pub fn all_close<E: WithDType, S: Shape>(a: &Tensor<E, S>, b: &Tensor<E, S>, eps: E) -> bool {
    a.iter().zip(b.iter()).all(|(&x, &y)| {
        let diff = if x > y { x - y } else { y - x };
        diff <= eps
    })
}

// Comparisons

impl<E: Copy + PartialOrd, S: Shape> Tensor<E, S> {
    pub fn lt(&self, other: &Self) -> Tensor<bool, S> {
        self.zip_map(other, |a, b| a < b)
    }

    pub fn gt(&self, other: &Self) -> Tensor<bool, S> {
        self.zip_map(other, |a, b| a > b)
    }

    pub fn le(&self, other: &Self) -> Tensor<bool, S> {
        self.zip_map(other, |a, b| a <= b)
    }

    pub fn ge(&self, other: &Self) -> Tensor<bool, S> {
        self.zip_map(other, |a, b| a >= b)
    }

    pub fn lt_scalar(&self, rhs: E) -> Tensor<bool, S> {
        self.map(|a| a < rhs)
    }

    pub fn gt_scalar(&self, rhs: E) -> Tensor<bool, S> {
        self.map(|a| a > rhs)
    }

    pub fn le_scalar(&self, rhs: E) -> Tensor<bool, S> {
        self.map(|a| a <= rhs)
    }

    pub fn ge_scalar(&self, rhs: E) -> Tensor<bool, S> {
        self.map(|a| a >= rhs)
    }

    /// Elementwise equality, as a boolean tensor. `==` compares whole tensors.
    pub fn eq_elementwise(&self, other: &Self) -> Tensor<bool, S> {
        self.zip_map(other, |a, b| a == b)
    }
}

// Boolean tensors

impl<S: Shape> Tensor<bool, S> {
    /// Logical AND of every element (`true` for an empty tensor).
    pub fn all(&self) -> bool {
        self.iter().all(|&b| b)
    }

    /// Logical OR of every element.
    pub fn any(&self) -> bool {
        self.iter().any(|&b| b)
    }

    pub fn and(&self, other: &Self) -> Self {
        self.zip_map(other, |a, b| a && b)
    }

    pub fn or(&self, other: &Self) -> Self {
        self.zip_map(other, |a, b| a || b)
    }

    /// Number of `true` elements.
    pub fn count_true(&self) -> usize {
        self.iter().filter(|&&b| b).count()
    }
}

impl<S: Shape> std::ops::Not for Tensor<bool, S> {
    type Output = Tensor<bool, S>;
    fn not(mut self) -> Self {
        self.map_inplace(|b| !b);
        self
    }
}

impl<S: Shape> std::ops::Not for &Tensor<bool, S> {
    type Output = Tensor<bool, S>;
    fn not(self) -> Tensor<bool, S> {
        self.map(|b| !b)
    }
}

impl<S: Shape> std::ops::BitAnd for Tensor<bool, S> {
    type Output = Tensor<bool, S>;
    fn bitand(self, rhs: Self) -> Self {
        self.and(&rhs)
    }
}

impl<S: Shape> std::ops::BitAnd for &Tensor<bool, S> {
    type Output = Tensor<bool, S>;
    fn bitand(self, rhs: Self) -> Tensor<bool, S> {
        self.and(rhs)
    }
}

impl<S: Shape> std::ops::BitOr for Tensor<bool, S> {
    type Output = Tensor<bool, S>;
    fn bitor(self, rhs: Self) -> Self {
        self.or(&rhs)
    }
}

impl<S: Shape> std::ops::BitOr for &Tensor<bool, S> {
    type Output = Tensor<bool, S>;
    fn bitor(self, rhs: Self) -> Tensor<bool, S> {
        self.or(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{Rank1, Rank2, Rank3};

    fn sample() -> Tensor<i32, Rank3<2, 3, 2>> {
        Tensor::from([[[1, 2], [3, 4], [5, 1]], [[0, 9], [1, 8], [2, 7]]])
    }

    #[test]
    fn test_sum_all() {
        assert_eq!(sample().sum(), 43);
        let whole: Tensor<i32, Rank0> =
            sample().apply_function(|t: &Tensor<i32, Rank3<2, 3, 2>>| t.sum());
        assert_eq!(whole.item(), 43);
    }

    #[test]
    fn test_apply_function_blocks() {
        let t = sample();
        let blocks: Tensor<i32, Rank1<2>> = t.apply_function(|b: &Tensor<i32, Rank2<3, 2>>| b.sum());
        assert_eq!(blocks.as_slice(), &[16, 27]);
        let pairs: Tensor<i32, Rank2<2, 3>> = t.apply_function(|p: &Tensor<i32, Rank1<2>>| p.sum());
        assert_eq!(pairs, Tensor::from([[3, 7, 6], [9, 9, 9]]));
        let same: Tensor<i32, Rank3<2, 3, 2>> = t.apply_function(|e: &Tensor<i32, Rank0>| e.item());
        assert_eq!(same, t);
    }

    #[test]
    fn test_apply_function_squared_length() {
        let sq: Tensor<i32, Rank2<2, 3>> = sample().apply_function(|v: &Tensor<i32, Rank1<2>>| {
            v.iter().map(|&x| x * x).sum::<i32>()
        });
        assert_eq!(sq, Tensor::from([[5, 25, 26], [81, 65, 53]]));
    }

    #[test]
    fn test_apply_function2_dot() {
        let b = Tensor::<i32, Rank3<2, 3, 2>>::from([
            [[2, 7], [5, 1], [0, 9]],
            [[1, 8], [3, 4], [1, 2]],
        ]);
        let dots: Tensor<i32, Rank2<2, 3>> =
            sample().apply_function2(&b, |x: &Tensor<i32, Rank1<2>>, y| (x * y).sum());
        assert_eq!(dots, Tensor::from([[16, 19, 9], [72, 35, 16]]));
    }

    #[test]
    fn test_apply_function_tensor_rows() {
        let t = Tensor::<i32, Rank2<2, 3>>::from([[1, 2, 3], [4, 5, 6]]);
        let doubled: Tensor<i32, Rank2<2, 3>> =
            t.apply_function_tensor(|row: &Tensor<i32, Rank1<3>>| row * 2);
        assert_eq!(doubled, Tensor::from([[2, 4, 6], [8, 10, 12]]));
    }

    #[test]
    fn test_apply_function_inplace() {
        let mut t = sample();
        t.apply_function_inplace(|row: &mut Tensor<i32, Rank1<2>>| {
            row.fill_with(row.sum());
        });
        assert_eq!(t.at(0).as_slice(), &[3, 3, 7, 7, 6, 6]);
    }

    #[test]
    fn test_sum_trailing() {
        let by_block: Tensor<i32, Rank1<2>> = sample().sum_trailing();
        assert_eq!(by_block.as_slice(), &[16, 27]);
        let by_row: Tensor<i32, Rank2<2, 3>> = sample().sum_trailing();
        assert_eq!(by_row, Tensor::from([[3, 7, 6], [9, 9, 9]]));
        let total: Tensor<i32, Rank0> = sample().sum_trailing();
        assert_eq!(total.item(), 43);
    }

    #[test]
    fn test_min_max() {
        assert_eq!(sample().max(), Some(9));
        assert_eq!(sample().min(), Some(0));
        assert_eq!(Tensor::<f32, Rank1<0>>::zeros().max(), None);
    }

    #[test]
    fn test_float_math() {
        let t = Tensor::<f64, Rank1<3>>::from([1.0, 4.0, 9.0]);
        assert_eq!(t.sqrt().as_slice(), &[1.0, 2.0, 3.0]);
        assert_eq!(t.log().at(0).item(), 0.0);
        let s = Tensor::<f64, Rank0>::from(0.0).sigmoid();
        assert_eq!(s.item(), 0.5);
        let neg = Tensor::<f32, Rank1<2>>::from([-1.5, 2.0]);
        assert_eq!(neg.abs().as_slice(), &[1.5, 2.0]);
    }

    #[test]
    fn test_log_domain_not_checked() {
        let t = Tensor::<f32, Rank1<2>>::from([0.0, -1.0]);
        let l = t.log();
        assert_eq!(l.at(0).item(), f32::NEG_INFINITY);
        assert!(l.at(1).item().is_nan());
    }

    #[test]
    fn test_comparisons() {
        let a = Tensor::<i32, Rank1<4>>::from([1, 5, 3, 3]);
        let b = Tensor::<i32, Rank1<4>>::from([2, 4, 3, 0]);
        assert_eq!(a.lt(&b).as_slice(), &[true, false, false, false]);
        assert_eq!(a.ge(&b).as_slice(), &[false, true, true, true]);
        assert_eq!(a.le_scalar(3).as_slice(), &[true, false, true, true]);
        assert_eq!(a.eq_elementwise(&b).count_true(), 1);
    }

    #[test]
    fn test_boolean_ops() {
        let a = Tensor::<bool, Rank1<3>>::from([true, true, false]);
        let b = Tensor::<bool, Rank1<3>>::from([true, false, false]);
        assert_eq!((&a & &b).as_slice(), &[true, false, false]);
        assert_eq!((&a | &b).as_slice(), &[true, true, false]);
        assert_eq!((!&b).as_slice(), &[false, true, true]);
        assert!(!a.all());
        assert!(a.any());
        assert!((a | !b).all());
    }

    #[test]
    fn test_all_close() {
        let a = Tensor::<f32, Rank1<2>>::from([1.0, 2.0]);
        let b = Tensor::<f32, Rank1<2>>::from([1.0005, 1.9995]);
        assert!(all_close(&a, &b, 1e-3));
        assert!(!all_close(&a, &b, 1e-4));
        let u = Tensor::<u8, Rank1<2>>::from([3, 9]);
        let v = Tensor::<u8, Rank1<2>>::from([4, 8]);
        assert!(all_close(&u, &v, 1));
    }
}
