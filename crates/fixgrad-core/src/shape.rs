use std::fmt;

// Shape: Compile-time tensor shapes
//
// A Shape is a zero-sized marker type that carries the dimension sizes of a
// tensor in its type:
//   - Scalar: Rank0 (0 dimensions, 1 element)
//   - Vector: Rank1<5> (1 dimension, 5 elements)
//   - Matrix: Rank2<3, 4> (2 dimensions, 12 elements)
//   - Batch:  Rank3<2, 3, 4> (3 dimensions, 24 elements)
//
// The shape decides:
//   1. How many elements the tensor holds (product of all dims)
//   2. The inline storage type (nested fixed-size arrays, row-major)
//   3. Which operations type-check (matching shapes, 2-D transpose, ...)
//
// Shapes that would need arithmetic on const parameters (M1 + M2 for a stack,
// a reshape target) are named by the caller instead, and the relationship is
// checked by the `const fn` predicates at the bottom of this file inside
// `const { assert!(..) }` blocks. Those run when the generic function is
// instantiated, so a wrong shape is still a compile error.

/// Compile-time shape of a tensor.
pub trait Shape: 'static + Copy + Default + fmt::Debug + Send + Sync {
    /// Number of dimensions (0 for scalar, 1 for vector, 2 for matrix, etc.).
    const RANK: usize;

    /// Total number of elements. A scalar has 1 element.
    const NUMEL: usize;

    /// The dimension sizes, outermost first.
    const DIMS: &'static [usize];

    /// Inline, contiguous row-major storage for elements of type `E`.
    type Storage<E: Copy>: Copy;

    /// A full multi-index into a tensor of this shape (`[usize; RANK]`).
    type Index: Copy + AsRef<[usize]>;

    /// Storage with every element set to `value`.
    fn filled<E: Copy>(value: E) -> Self::Storage<E>;

    /// View the storage as a flat row-major slice of length `NUMEL`.
    fn flat<E: Copy>(storage: &Self::Storage<E>) -> &[E];

    /// Mutable flat row-major view of the storage.
    fn flat_mut<E: Copy>(storage: &mut Self::Storage<E>) -> &mut [E];
}

/// A shape with at least one axis, which can be peeled into sub-tensors.
///
/// `Rank2<M, N>` has `LEN = M` sub-tensors of shape `Rank1<N>`.
pub trait HasAxis0: Shape {
    /// Size of the outermost axis.
    const LEN: usize;

    /// Shape of one slice along the outermost axis.
    type Inner: Shape;
}

/// Scalar shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rank0;

/// 1-D shape `[M]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rank1<const M: usize>;

/// 2-D shape `[M, N]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rank2<const M: usize, const N: usize>;

/// 3-D shape `[M, N, K]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rank3<const M: usize, const N: usize, const K: usize>;

/// 4-D shape `[M, N, K, L]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rank4<const M: usize, const N: usize, const K: usize, const L: usize>;

impl Shape for Rank0 {
    const RANK: usize = 0;
    const NUMEL: usize = 1;
    const DIMS: &'static [usize] = &[];
    type Storage<E: Copy> = [E; 1];
    type Index = [usize; 0];

    fn filled<E: Copy>(value: E) -> Self::Storage<E> {
        [value]
    }

    fn flat<E: Copy>(storage: &Self::Storage<E>) -> &[E] {
        storage
    }

    fn flat_mut<E: Copy>(storage: &mut Self::Storage<E>) -> &mut [E] {
        storage
    }
}

impl<const M: usize> Shape for Rank1<M> {
    const RANK: usize = 1;
    const NUMEL: usize = M;
    const DIMS: &'static [usize] = &[M];
    type Storage<E: Copy> = [E; M];
    type Index = [usize; 1];

    fn filled<E: Copy>(value: E) -> Self::Storage<E> {
        [value; M]
    }

    fn flat<E: Copy>(storage: &Self::Storage<E>) -> &[E] {
        storage
    }

    fn flat_mut<E: Copy>(storage: &mut Self::Storage<E>) -> &mut [E] {
        storage
    }
}

impl<const M: usize, const N: usize> Shape for Rank2<M, N> {
    const RANK: usize = 2;
    const NUMEL: usize = M * N;
    const DIMS: &'static [usize] = &[M, N];
    type Storage<E: Copy> = [[E; N]; M];
    type Index = [usize; 2];

    fn filled<E: Copy>(value: E) -> Self::Storage<E> {
        [[value; N]; M]
    }

    fn flat<E: Copy>(storage: &Self::Storage<E>) -> &[E] {
        storage.as_flattened()
    }

    fn flat_mut<E: Copy>(storage: &mut Self::Storage<E>) -> &mut [E] {
        storage.as_flattened_mut()
    }
}

impl<const M: usize, const N: usize, const K: usize> Shape for Rank3<M, N, K> {
    const RANK: usize = 3;
    const NUMEL: usize = M * N * K;
    const DIMS: &'static [usize] = &[M, N, K];
    type Storage<E: Copy> = [[[E; K]; N]; M];
    type Index = [usize; 3];

    fn filled<E: Copy>(value: E) -> Self::Storage<E> {
        [[[value; K]; N]; M]
    }

    fn flat<E: Copy>(storage: &Self::Storage<E>) -> &[E] {
        storage.as_flattened().as_flattened()
    }

    fn flat_mut<E: Copy>(storage: &mut Self::Storage<E>) -> &mut [E] {
        storage.as_flattened_mut().as_flattened_mut()
    }
}

impl<const M: usize, const N: usize, const K: usize, const L: usize> Shape
    for Rank4<M, N, K, L>
{
    const RANK: usize = 4;
    const NUMEL: usize = M * N * K * L;
    const DIMS: &'static [usize] = &[M, N, K, L];
    type Storage<E: Copy> = [[[[E; L]; K]; N]; M];
    type Index = [usize; 4];

    fn filled<E: Copy>(value: E) -> Self::Storage<E> {
        [[[[value; L]; K]; N]; M]
    }

    fn flat<E: Copy>(storage: &Self::Storage<E>) -> &[E] {
        storage.as_flattened().as_flattened().as_flattened()
    }

    fn flat_mut<E: Copy>(storage: &mut Self::Storage<E>) -> &mut [E] {
        storage
            .as_flattened_mut()
            .as_flattened_mut()
            .as_flattened_mut()
    }
}

impl<const M: usize> HasAxis0 for Rank1<M> {
    const LEN: usize = M;
    type Inner = Rank0;
}

impl<const M: usize, const N: usize> HasAxis0 for Rank2<M, N> {
    const LEN: usize = M;
    type Inner = Rank1<N>;
}

impl<const M: usize, const N: usize, const K: usize> HasAxis0 for Rank3<M, N, K> {
    const LEN: usize = M;
    type Inner = Rank2<N, K>;
}

impl<const M: usize, const N: usize, const K: usize, const L: usize> HasAxis0
    for Rank4<M, N, K, L>
{
    const LEN: usize = M;
    type Inner = Rank3<N, K, L>;
}

// Shape arithmetic
//
// `const fn`s over dimension slices so they can be evaluated inside
// `const { assert!(..) }` blocks at instantiation time.

/// Product of `dims[start..end]` (1 for an empty range).
pub const fn product(dims: &[usize], start: usize, end: usize) -> usize {
    let mut acc = 1;
    let mut i = start;
    while i < end {
        acc *= dims[i];
        i += 1;
    }
    acc
}

/// Whether `dims` begins with `prefix`.
pub const fn starts_with(dims: &[usize], prefix: &[usize]) -> bool {
    if prefix.len() > dims.len() {
        return false;
    }
    let mut i = 0;
    while i < prefix.len() {
        if dims[i] != prefix[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// Whether `dims` ends with `suffix`.
pub const fn ends_with(dims: &[usize], suffix: &[usize]) -> bool {
    if suffix.len() > dims.len() {
        return false;
    }
    let offset = dims.len() - suffix.len();
    let mut i = 0;
    while i < suffix.len() {
        if dims[offset + i] != suffix[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// Whether `whole` ends with `inner`, `out` ends with `out_inner`, and the
/// leading axes left over on both sides are identical.
///
/// This is the relationship between a tensor and the result of mapping each
/// of its `inner`-shaped sub-tensors to an `out_inner`-shaped one.
pub const fn shares_outer(
    whole: &[usize],
    inner: &[usize],
    out: &[usize],
    out_inner: &[usize],
) -> bool {
    if inner.len() > whole.len() || out_inner.len() > out.len() {
        return false;
    }
    let outer = whole.len() - inner.len();
    if out.len() - out_inner.len() != outer {
        return false;
    }
    let mut i = 0;
    while i < outer {
        if whole[i] != out[i] {
            return false;
        }
        i += 1;
    }
    let mut i = 0;
    while i < inner.len() {
        if whole[outer + i] != inner[i] {
            return false;
        }
        i += 1;
    }
    let mut i = 0;
    while i < out_inner.len() {
        if out[outer + i] != out_inner[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// Whether `out` is `a` and `b` concatenated along `axis`.
///
/// All three must have the same rank, agree on every other axis, and
/// `out[axis] == a[axis] + b[axis]`.
pub const fn concat_compatible(a: &[usize], b: &[usize], out: &[usize], axis: usize) -> bool {
    if a.len() != b.len() || a.len() != out.len() || axis >= a.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if i == axis {
            if out[i] != a[i] + b[i] {
                return false;
            }
        } else if a[i] != b[i] || a[i] != out[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// Row-major flat offset of a full multi-index.
///
/// Panics if the index has the wrong length or any coordinate is out of range.
pub fn row_major_offset(dims: &[usize], index: &[usize]) -> usize {
    assert_eq!(
        dims.len(),
        index.len(),
        "index {:?} does not match shape {:?}",
        index,
        dims
    );
    let mut offset = 0;
    for (axis, (&d, &i)) in dims.iter().zip(index).enumerate() {
        assert!(
            i < d,
            "index {} out of range for axis {} of size {}",
            i,
            axis,
            d
        );
        offset = offset * d + i;
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_shape() {
        assert_eq!(Rank0::RANK, 0);
        assert_eq!(Rank0::NUMEL, 1);
        assert!(Rank0::DIMS.is_empty());
        assert_eq!(row_major_offset(Rank0::DIMS, &[]), 0);
    }

    #[test]
    fn test_vector_shape() {
        assert_eq!(Rank1::<5>::RANK, 1);
        assert_eq!(Rank1::<5>::NUMEL, 5);
        assert_eq!(row_major_offset(Rank1::<5>::DIMS, &[4]), 4);
    }

    #[test]
    fn test_matrix_shape() {
        assert_eq!(Rank2::<3, 4>::DIMS, &[3, 4]);
        assert_eq!(Rank2::<3, 4>::NUMEL, 12);
        // Row-major: one step along dim0 skips a full row of 4
        assert_eq!(row_major_offset(Rank2::<3, 4>::DIMS, &[1, 0]), 4);
    }

    #[test]
    fn test_higher_rank_shapes() {
        assert_eq!(row_major_offset(Rank3::<2, 3, 4>::DIMS, &[1, 0, 0]), 12);
        assert_eq!(Rank3::<2, 3, 4>::NUMEL, 24);
        assert_eq!(Rank4::<2, 3, 4, 5>::NUMEL, 120);
    }

    #[test]
    fn test_flat_storage_is_row_major() {
        let storage = [[1, 2, 3], [4, 5, 6]];
        assert_eq!(Rank2::<2, 3>::flat(&storage), &[1, 2, 3, 4, 5, 6]);
        let filled = Rank3::<2, 2, 2>::filled(7u8);
        assert_eq!(Rank3::<2, 2, 2>::flat(&filled), &[7; 8]);
    }

    #[test]
    fn test_prefix_and_suffix() {
        assert!(starts_with(&[2, 3], &[2]));
        assert!(!starts_with(&[2, 3], &[3]));
        assert!(ends_with(&[2, 3], &[3]));
        assert!(ends_with(&[2, 3], &[]));
        assert!(!ends_with(&[2, 3], &[2]));
    }

    #[test]
    fn test_shares_outer() {
        // [2,3] rows mapped to scalars -> [2]
        assert!(shares_outer(&[2, 3], &[3], &[2], &[]));
        // elementwise
        assert!(shares_outer(&[2, 3], &[], &[2, 3], &[]));
        // [2,3,4] with [4]-vectors mapped to [5]-vectors -> [2,3,5]
        assert!(shares_outer(&[2, 3, 4], &[4], &[2, 3, 5], &[5]));
        assert!(!shares_outer(&[2, 3], &[3], &[3], &[]));
        assert!(!shares_outer(&[2, 3], &[2], &[2], &[]));
    }

    #[test]
    fn test_concat_compatible() {
        assert!(concat_compatible(&[2, 3], &[4, 3], &[6, 3], 0));
        assert!(concat_compatible(&[2, 3], &[2, 1], &[2, 4], 1));
        assert!(!concat_compatible(&[2, 3], &[4, 2], &[6, 3], 0));
        assert!(!concat_compatible(&[2, 3], &[4, 3], &[6, 3], 2));
    }

    #[test]
    fn test_row_major_offset() {
        assert_eq!(row_major_offset(&[2, 3, 4], &[1, 2, 3]), 23);
        assert_eq!(row_major_offset(&[], &[]), 0);
        assert_eq!(product(&[2, 3, 4], 1, 3), 12);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_row_major_offset_out_of_range() {
        row_major_offset(&[2, 3], &[0, 3]);
    }
}
