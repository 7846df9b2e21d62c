use std::fmt;
use std::ops::{Index, IndexMut};

use crate::dtype::{DType, WithDType};
use crate::error::{Error, Result};
use crate::shape::{self, HasAxis0, Rank0, Rank1, Rank2, Rank3, Rank4, Shape};

// Tensor: Fixed-shape, inline, row-major array
//
// A Tensor<E, S> holds S::NUMEL elements of type E directly inside the value:
// no heap allocation, no strides, no offset. The storage is the nested array
// type the shape picks (`[[E; N]; M]` for Rank2<M, N>), so the elements are
// contiguous and the last dimension varies fastest.
//
// MEMORY MODEL:
//
//   Tensor is a plain value. Cloning copies the elements. Because every shape
//   of the same element count has the same byte layout, a tensor can be
//   reinterpreted as another shape in place (`view`) or copied into one
//   (`reshape`), and a sub-range of a flat slice can be borrowed as a smaller
//   tensor (`at`, `rows`). Those casts are the only `unsafe` in the crate and
//   live in `ref_from_flat` / `mut_from_flat`.
//
// SHAPE CHECKS:
//
//   Binary operations require identical `S` at the type level. Operations
//   whose result shape is named by the caller check the relationship with
//   `const { assert!(..) }`, which fails the build when instantiated with
//   mismatching shapes.

/// A fixed-shape multidimensional array stored inline in row-major order.
///
/// # Example
/// ```
/// use fixgrad_core::{Rank2, Tensor};
///
/// let a = Tensor::<i32, Rank2<2, 3>>::from([[1, 2, 3], [4, 5, 6]]);
/// let b = Tensor::<i32, Rank2<2, 3>>::full(1);
/// let c = &a + &b;
/// assert_eq!(c.as_slice(), &[2, 3, 4, 5, 6, 7]);
/// assert_eq!(c.t().dims(), &[3, 2]);
/// ```
#[repr(transparent)]
pub struct Tensor<E: Copy, S: Shape> {
    data: S::Storage<E>,
}

impl<E: Copy, S: Shape> Clone for Tensor<E, S> {
    fn clone(&self) -> Self {
        Tensor { data: self.data }
    }
}

impl<E: Copy, S: Shape> Tensor<E, S> {
    /// Rank of this tensor type.
    pub const RANK: usize = S::RANK;

    /// Total element count of this tensor type.
    pub const NUMEL: usize = S::NUMEL;

    // Construction

    /// Wrap existing nested-array storage.
    pub fn new(data: S::Storage<E>) -> Self {
        Tensor { data }
    }

    /// Create a tensor with every element set to `value`.
    pub fn full(value: E) -> Self {
        Tensor {
            data: S::filled(value),
        }
    }

    /// Build a tensor from a flat row-major slice of exactly `NUMEL` elements.
    pub fn try_from_slice(values: &[E]) -> Result<Self> {
        if values.len() != S::NUMEL {
            return Err(Error::ElementCountMismatch {
                shape: S::DIMS,
                expected: S::NUMEL,
                got: values.len(),
            });
        }
        let mut out = match values.first() {
            Some(&first) => Self::full(first),
            // Empty shape: the empty slice already is the tensor.
            None => return Ok(Self::ref_from_flat(values).clone()),
        };
        out.as_mut_slice().copy_from_slice(values);
        Ok(out)
    }

    // Accessors

    /// The underlying nested-array storage.
    pub fn storage(&self) -> &S::Storage<E> {
        &self.data
    }

    /// Mutable access to the underlying storage.
    pub fn storage_mut(&mut self) -> &mut S::Storage<E> {
        &mut self.data
    }

    /// Consume the tensor and return its storage.
    pub fn into_storage(self) -> S::Storage<E> {
        self.data
    }

    /// All elements as a flat row-major slice.
    pub fn as_slice(&self) -> &[E] {
        S::flat(&self.data)
    }

    /// All elements as a mutable flat row-major slice.
    pub fn as_mut_slice(&mut self) -> &mut [E] {
        S::flat_mut(&mut self.data)
    }

    /// Iterate over all elements in row-major order.
    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.as_slice().iter()
    }

    /// Number of dimensions (0 for scalar, 1 for vector, 2 for matrix, etc.).
    pub fn rank(&self) -> usize {
        S::RANK
    }

    /// The dimension sizes, outermost first.
    pub fn dims(&self) -> &'static [usize] {
        S::DIMS
    }

    /// Total number of elements (product of all dimensions).
    pub fn elem_count(&self) -> usize {
        S::NUMEL
    }

    /// Element at a full multi-index. Panics when out of range.
    pub fn get(&self, index: S::Index) -> &E {
        &self.as_slice()[shape::row_major_offset(S::DIMS, index.as_ref())]
    }

    /// Mutable element at a full multi-index. Panics when out of range.
    pub fn get_mut(&mut self, index: S::Index) -> &mut E {
        let offset = shape::row_major_offset(S::DIMS, index.as_ref());
        &mut self.as_mut_slice()[offset]
    }

    /// Set every element to `value`.
    ///
    /// This is how gradient accumulators are cleared between backward passes.
    pub fn fill_with(&mut self, value: E) -> &mut Self {
        self.as_mut_slice().fill(value);
        self
    }

    // Views

    /// Reinterpret the storage as another shape of the same element count.
    ///
    /// Zero-cost: the returned reference aliases `self`. Asking for a shape
    /// with a different element count fails to compile.
    pub fn view<S2: Shape>(&self) -> &Tensor<E, S2> {
        const {
            assert!(
                S::NUMEL == S2::NUMEL,
                "view: element counts of the two shapes differ"
            )
        };
        Tensor::<E, S2>::ref_from_flat(self.as_slice())
    }

    /// Mutable reinterpretation of the storage as another shape.
    pub fn view_mut<S2: Shape>(&mut self) -> &mut Tensor<E, S2> {
        const {
            assert!(
                S::NUMEL == S2::NUMEL,
                "view_mut: element counts of the two shapes differ"
            )
        };
        Tensor::<E, S2>::mut_from_flat(self.as_mut_slice())
    }

    /// Copy into another shape of the same element count.
    pub fn reshape<S2: Shape>(&self) -> Tensor<E, S2> {
        self.view::<S2>().clone()
    }

    /// Borrow a flat slice of exactly `NUMEL` elements as a tensor.
    pub(crate) fn ref_from_flat(values: &[E]) -> &Self {
        assert_eq!(values.len(), S::NUMEL);
        // SAFETY: `Tensor` is `repr(transparent)` over `S::Storage<E>`, which
        // is a (possibly nested) array of exactly `NUMEL` elements of `E`.
        // Nested arrays have no padding, so its layout is that of `[E; NUMEL]`
        // with the alignment of `E`, matching the checked slice.
        unsafe { &*(values.as_ptr() as *const Self) }
    }

    pub(crate) fn mut_from_flat(values: &mut [E]) -> &mut Self {
        assert_eq!(values.len(), S::NUMEL);
        // SAFETY: see `ref_from_flat`; the borrow is unique because `values` is.
        unsafe { &mut *(values.as_mut_ptr() as *mut Self) }
    }
}

impl<E: Copy + Default, S: Shape> Tensor<E, S> {
    /// Build a tensor from an iterator yielding exactly `NUMEL` elements.
    ///
    /// At most one element past `NUMEL` is pulled, so an endless iterator
    /// fails with `got == NUMEL + 1` instead of running forever.
    pub fn try_from_iter<I: IntoIterator<Item = E>>(iter: I) -> Result<Self> {
        let mut out = Self::full(E::default());
        let mut iter = iter.into_iter();
        let mut filled = 0;
        for (slot, value) in out.as_mut_slice().iter_mut().zip(&mut iter) {
            *slot = value;
            filled += 1;
        }
        if filled == S::NUMEL && iter.next().is_some() {
            filled += 1;
        }
        if filled != S::NUMEL {
            return Err(Error::ElementCountMismatch {
                shape: S::DIMS,
                expected: S::NUMEL,
                got: filled,
            });
        }
        Ok(out)
    }
}

impl<E: WithDType, S: Shape> Tensor<E, S> {
    /// All zeros.
    pub fn zeros() -> Self {
        Self::full(E::zero())
    }

    /// All ones.
    pub fn ones() -> Self {
        Self::full(E::one())
    }

    /// Runtime tag of the element type.
    pub fn dtype(&self) -> DType {
        E::DTYPE
    }

    /// Convert every element to another numeric type.
    pub fn cast<F: WithDType>(&self) -> Tensor<F, S> {
        let mut out = Tensor::<F, S>::zeros();
        for (o, &x) in out.as_mut_slice().iter_mut().zip(self.as_slice()) {
            *o = F::from_f64(x.to_f64());
        }
        out
    }
}

impl<E: WithDType, const N: usize> Tensor<E, Rank2<N, N>> {
    /// The `N × N` identity matrix.
    pub fn eye() -> Self {
        let mut out = Self::zeros();
        for i in 0..N {
            out.data[i][i] = E::one();
        }
        out
    }
}

impl<E: Copy> Tensor<E, Rank0> {
    /// The single element of a scalar tensor.
    pub fn item(&self) -> E {
        self.data[0]
    }
}

impl<E: Copy, const M: usize, const N: usize> Tensor<E, Rank2<M, N>> {
    /// Matrix transpose: `result[j][i] = self[i][j]`.
    pub fn t(&self) -> Tensor<E, Rank2<N, M>> {
        Tensor::new(std::array::from_fn(|j| {
            std::array::from_fn(|i| self.data[i][j])
        }))
    }
}

// Sub-tensor access along the outermost axis

impl<E: Copy, S: HasAxis0> Tensor<E, S> {
    /// Size of the outermost axis.
    pub fn len(&self) -> usize {
        S::LEN
    }

    /// Whether the outermost axis is empty.
    pub fn is_empty(&self) -> bool {
        S::LEN == 0
    }

    /// Borrow the `i`-th slice along the outermost axis.
    pub fn at(&self, i: usize) -> &Tensor<E, S::Inner> {
        assert!(i < S::LEN, "index {} out of range for axis of size {}", i, S::LEN);
        let n = <S::Inner as Shape>::NUMEL;
        Tensor::ref_from_flat(&self.as_slice()[i * n..(i + 1) * n])
    }

    /// Mutably borrow the `i`-th slice along the outermost axis.
    pub fn at_mut(&mut self, i: usize) -> &mut Tensor<E, S::Inner> {
        assert!(i < S::LEN, "index {} out of range for axis of size {}", i, S::LEN);
        let n = <S::Inner as Shape>::NUMEL;
        Tensor::mut_from_flat(&mut self.as_mut_slice()[i * n..(i + 1) * n])
    }

    /// Iterate over the slices along the outermost axis.
    pub fn rows(&self) -> impl Iterator<Item = &Tensor<E, S::Inner>> + '_ {
        (0..S::LEN).map(move |i| self.at(i))
    }
}

impl<E: Copy, S: Shape> Index<S::Index> for Tensor<E, S> {
    type Output = E;

    fn index(&self, index: S::Index) -> &E {
        self.get(index)
    }
}

impl<E: Copy, S: Shape> IndexMut<S::Index> for Tensor<E, S> {
    fn index_mut(&mut self, index: S::Index) -> &mut E {
        self.get_mut(index)
    }
}

// Conversions

impl<E: Copy> From<E> for Tensor<E, Rank0> {
    fn from(value: E) -> Self {
        Tensor { data: [value] }
    }
}

impl<E: Copy, const M: usize> From<[E; M]> for Tensor<E, Rank1<M>> {
    fn from(data: [E; M]) -> Self {
        Tensor { data }
    }
}

impl<E: Copy, const M: usize, const N: usize> From<[[E; N]; M]> for Tensor<E, Rank2<M, N>> {
    fn from(data: [[E; N]; M]) -> Self {
        Tensor { data }
    }
}

impl<E: Copy, const M: usize, const N: usize, const K: usize> From<[[[E; K]; N]; M]>
    for Tensor<E, Rank3<M, N, K>>
{
    fn from(data: [[[E; K]; N]; M]) -> Self {
        Tensor { data }
    }
}

impl<E: Copy, const M: usize, const N: usize, const K: usize, const L: usize>
    From<[[[[E; L]; K]; N]; M]> for Tensor<E, Rank4<M, N, K, L>>
{
    fn from(data: [[[[E; L]; K]; N]; M]) -> Self {
        Tensor { data }
    }
}

impl<E: Copy, S: Shape> TryFrom<&[E]> for Tensor<E, S> {
    type Error = Error;

    fn try_from(values: &[E]) -> Result<Self> {
        Self::try_from_slice(values)
    }
}

/// Collect exactly `NUMEL` elements into a tensor.
///
/// A length mismatch is a programming error and panics; use
/// [`Tensor::try_from_iter`] for data of unknown length.
impl<E: Copy + Default, S: Shape> FromIterator<E> for Tensor<E, S> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        match Self::try_from_iter(iter) {
            Ok(t) => t,
            Err(e) => panic!("{}", e),
        }
    }
}

impl<'a, E: Copy, S: Shape> IntoIterator for &'a Tensor<E, S> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<E: Copy + Default, S: Shape> Default for Tensor<E, S> {
    fn default() -> Self {
        Self::full(E::default())
    }
}

impl<E: Copy + PartialEq, S: Shape> PartialEq for Tensor<E, S> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<E: Copy + Eq, S: Shape> Eq for Tensor<E, S> {}

impl<E: Copy + fmt::Debug, S: Shape> fmt::Debug for Tensor<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("dims", &S::DIMS)
            .field("data", &self.as_slice())
            .finish()
    }
}

/// Renders `Tensor<2, 3>{1, 2, 3, 4, 5, 6}`; a scalar renders as `{21}`.
impl<E: Copy + fmt::Display, S: Shape> fmt::Display for Tensor<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if S::RANK > 0 {
            write!(f, "Tensor<")?;
            for (i, d) in S::DIMS.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", d)?;
            }
            write!(f, ">")?;
        }
        write!(f, "{{")?;
        for (i, x) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", x)?;
        }
        write!(f, "}}")
    }
}

// Elementwise arithmetic
//
// Tensor ⊕ Tensor requires the same shape type. Tensor ⊕ scalar applies the
// scalar to every element. All combinations of owned and borrowed operands
// are provided; the borrowed forms copy once into the result.

macro_rules! elementwise_op {
    ($trait:ident, $method:ident, $assign_trait:ident, $assign_method:ident, $aop:tt) => {
        impl<E: WithDType, S: Shape> std::ops::$assign_trait<&Tensor<E, S>> for Tensor<E, S> {
            fn $assign_method(&mut self, rhs: &Tensor<E, S>) {
                for (a, &b) in self.as_mut_slice().iter_mut().zip(rhs.as_slice()) {
                    *a $aop b;
                }
            }
        }

        impl<E: WithDType, S: Shape> std::ops::$assign_trait<Tensor<E, S>> for Tensor<E, S> {
            fn $assign_method(&mut self, rhs: Tensor<E, S>) {
                std::ops::$assign_trait::$assign_method(self, &rhs);
            }
        }

        impl<E: WithDType, S: Shape> std::ops::$assign_trait<E> for Tensor<E, S> {
            fn $assign_method(&mut self, rhs: E) {
                for a in self.as_mut_slice() {
                    *a $aop rhs;
                }
            }
        }

        impl<E: WithDType, S: Shape> std::ops::$trait<&Tensor<E, S>> for &Tensor<E, S> {
            type Output = Tensor<E, S>;
            fn $method(self, rhs: &Tensor<E, S>) -> Tensor<E, S> {
                let mut out = self.clone();
                out $aop rhs;
                out
            }
        }

        impl<E: WithDType, S: Shape> std::ops::$trait<Tensor<E, S>> for &Tensor<E, S> {
            type Output = Tensor<E, S>;
            fn $method(self, rhs: Tensor<E, S>) -> Tensor<E, S> {
                let mut out = self.clone();
                out $aop &rhs;
                out
            }
        }

        impl<E: WithDType, S: Shape> std::ops::$trait<&Tensor<E, S>> for Tensor<E, S> {
            type Output = Tensor<E, S>;
            fn $method(mut self, rhs: &Tensor<E, S>) -> Tensor<E, S> {
                self $aop rhs;
                self
            }
        }

        impl<E: WithDType, S: Shape> std::ops::$trait<Tensor<E, S>> for Tensor<E, S> {
            type Output = Tensor<E, S>;
            fn $method(mut self, rhs: Tensor<E, S>) -> Tensor<E, S> {
                self $aop &rhs;
                self
            }
        }

        impl<E: WithDType, S: Shape> std::ops::$trait<E> for Tensor<E, S> {
            type Output = Tensor<E, S>;
            fn $method(mut self, rhs: E) -> Tensor<E, S> {
                self $aop rhs;
                self
            }
        }

        impl<E: WithDType, S: Shape> std::ops::$trait<E> for &Tensor<E, S> {
            type Output = Tensor<E, S>;
            fn $method(self, rhs: E) -> Tensor<E, S> {
                let mut out = self.clone();
                out $aop rhs;
                out
            }
        }
    };
}

elementwise_op!(Add, add, AddAssign, add_assign, +=);
elementwise_op!(Sub, sub, SubAssign, sub_assign, -=);
elementwise_op!(Mul, mul, MulAssign, mul_assign, *=);
elementwise_op!(Div, div, DivAssign, div_assign, /=);

impl<E: WithDType + std::ops::Neg<Output = E>, S: Shape> std::ops::Neg for Tensor<E, S> {
    type Output = Tensor<E, S>;
    fn neg(mut self) -> Tensor<E, S> {
        for a in self.as_mut_slice() {
            *a = -*a;
        }
        self
    }
}

impl<E: WithDType + std::ops::Neg<Output = E>, S: Shape> std::ops::Neg for &Tensor<E, S> {
    type Output = Tensor<E, S>;
    fn neg(self) -> Tensor<E, S> {
        -self.clone()
    }
}

// Scalar on the left: `2.0 * t`, `1.0 - t`, `b + t`.
macro_rules! scalar_lhs_ops {
    ($($ty:ty),* $(,)?) => {
        $(
            impl<S: Shape> std::ops::Add<Tensor<$ty, S>> for $ty {
                type Output = Tensor<$ty, S>;
                fn add(self, rhs: Tensor<$ty, S>) -> Tensor<$ty, S> {
                    rhs + self
                }
            }

            impl<S: Shape> std::ops::Add<&Tensor<$ty, S>> for $ty {
                type Output = Tensor<$ty, S>;
                fn add(self, rhs: &Tensor<$ty, S>) -> Tensor<$ty, S> {
                    rhs + self
                }
            }

            impl<S: Shape> std::ops::Sub<Tensor<$ty, S>> for $ty {
                type Output = Tensor<$ty, S>;
                fn sub(self, mut rhs: Tensor<$ty, S>) -> Tensor<$ty, S> {
                    for a in rhs.as_mut_slice() {
                        *a = self - *a;
                    }
                    rhs
                }
            }

            impl<S: Shape> std::ops::Sub<&Tensor<$ty, S>> for $ty {
                type Output = Tensor<$ty, S>;
                fn sub(self, rhs: &Tensor<$ty, S>) -> Tensor<$ty, S> {
                    self - rhs.clone()
                }
            }

            impl<S: Shape> std::ops::Mul<Tensor<$ty, S>> for $ty {
                type Output = Tensor<$ty, S>;
                fn mul(self, rhs: Tensor<$ty, S>) -> Tensor<$ty, S> {
                    rhs * self
                }
            }

            impl<S: Shape> std::ops::Mul<&Tensor<$ty, S>> for $ty {
                type Output = Tensor<$ty, S>;
                fn mul(self, rhs: &Tensor<$ty, S>) -> Tensor<$ty, S> {
                    rhs * self
                }
            }
        )*
    };
}

scalar_lhs_ops!(f32, f64, u8, u32, i32, i64);
