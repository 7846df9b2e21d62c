use crate::shape::{self, Shape};
use crate::tensor::Tensor;

// StackAlong / SplitAlong
//
// Concatenation along axis AXIS is a sequence of block copies. Everything in
// front of AXIS is the "outer" count; everything from AXIS on is one block.
// For each outer index the output block is A's block followed by B's block.
//
//   A: [2, 3]  B: [2, 1]  AXIS = 1
//   outer = 2, A block = 3, B block = 1, output block = 4
//
// Splitting is the same walk with the copies reversed, so the two are exact
// inverses. The caller names the result shapes; `concat_compatible` checks
// them at compile time.

impl<E: Copy + Default, S: Shape> Tensor<E, S> {
    /// Concatenate `self` and `other` along `AXIS`.
    ///
    /// ```
    /// use fixgrad_core::{Rank2, Tensor};
    ///
    /// let a = Tensor::<i32, Rank2<1, 2>>::from([[1, 2]]);
    /// let b = Tensor::<i32, Rank2<2, 2>>::from([[3, 4], [5, 6]]);
    /// let s: Tensor<i32, Rank2<3, 2>> = a.stack_along::<0, _, _>(&b);
    /// assert_eq!(s.as_slice(), &[1, 2, 3, 4, 5, 6]);
    /// ```
    pub fn stack_along<const AXIS: usize, S2: Shape, Out: Shape>(
        &self,
        other: &Tensor<E, S2>,
    ) -> Tensor<E, Out> {
        const {
            assert!(
                shape::concat_compatible(S::DIMS, S2::DIMS, Out::DIMS, AXIS),
                "stack_along: shapes do not concatenate along the axis"
            )
        };
        let outer = shape::product(S::DIMS, 0, AXIS);
        let a_block = shape::product(S::DIMS, AXIS, S::RANK);
        let b_block = shape::product(S2::DIMS, AXIS, S2::RANK);
        let mut out = Tensor::<E, Out>::default();
        let dst = out.as_mut_slice();
        let mut pos = 0;
        for i in 0..outer {
            dst[pos..pos + a_block].copy_from_slice(&self.as_slice()[i * a_block..(i + 1) * a_block]);
            pos += a_block;
            dst[pos..pos + b_block].copy_from_slice(&other.as_slice()[i * b_block..(i + 1) * b_block]);
            pos += b_block;
        }
        out
    }

    /// Split along `AXIS` into a leading part of shape `A` and the remainder
    /// of shape `B`.
    pub fn split_along<const AXIS: usize, A: Shape, B: Shape>(&self) -> (Tensor<E, A>, Tensor<E, B>) {
        const {
            assert!(
                shape::concat_compatible(A::DIMS, B::DIMS, S::DIMS, AXIS),
                "split_along: parts do not concatenate back to the tensor"
            )
        };
        let outer = shape::product(S::DIMS, 0, AXIS);
        let a_block = shape::product(A::DIMS, AXIS, A::RANK);
        let b_block = shape::product(B::DIMS, AXIS, B::RANK);
        let mut a = Tensor::<E, A>::default();
        let mut b = Tensor::<E, B>::default();
        let src = self.as_slice();
        let mut pos = 0;
        for i in 0..outer {
            a.as_mut_slice()[i * a_block..(i + 1) * a_block].copy_from_slice(&src[pos..pos + a_block]);
            pos += a_block;
            b.as_mut_slice()[i * b_block..(i + 1) * b_block].copy_from_slice(&src[pos..pos + b_block]);
            pos += b_block;
        }
        (a, b)
    }
}

#[cfg(test)]
mod tests {
    use crate::shape::{Rank1, Rank2, Rank3};
    use crate::tensor::Tensor;

    #[test]
    fn test_stack_axis0() {
        let a = Tensor::<i32, Rank2<2, 3>>::from([[1, 2, 3], [4, 5, 6]]);
        let b = Tensor::<i32, Rank2<1, 3>>::from([[7, 8, 9]]);
        let s: Tensor<i32, Rank2<3, 3>> = a.stack_along::<0, _, _>(&b);
        assert_eq!(s, Tensor::from([[1, 2, 3], [4, 5, 6], [7, 8, 9]]));
    }

    #[test]
    fn test_stack_axis1() {
        let a = Tensor::<i32, Rank2<2, 2>>::from([[1, 2], [3, 4]]);
        let b = Tensor::<i32, Rank2<2, 1>>::from([[9], [8]]);
        let s: Tensor<i32, Rank2<2, 3>> = a.stack_along::<1, _, _>(&b);
        assert_eq!(s, Tensor::from([[1, 2, 9], [3, 4, 8]]));
    }

    #[test]
    fn test_stack_vectors() {
        let a = Tensor::<f32, Rank1<2>>::from([1.0, 2.0]);
        let b = Tensor::<f32, Rank1<3>>::from([3.0, 4.0, 5.0]);
        let s: Tensor<f32, Rank1<5>> = a.stack_along::<0, _, _>(&b);
        assert_eq!(s.as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_split_inverts_stack() {
        let a = Tensor::<i32, Rank3<2, 1, 2>>::from([[[1, 2]], [[3, 4]]]);
        let b = Tensor::<i32, Rank3<2, 2, 2>>::from([[[5, 6], [7, 8]], [[9, 10], [11, 12]]]);
        let s: Tensor<i32, Rank3<2, 3, 2>> = a.stack_along::<1, _, _>(&b);
        assert_eq!(s.at(1).as_slice(), &[3, 4, 9, 10, 11, 12]);
        let (a2, b2) = s.split_along::<1, Rank3<2, 1, 2>, Rank3<2, 2, 2>>();
        assert_eq!(a2, a);
        assert_eq!(b2, b);
    }
}
