use crate::dtype::WithDType;
use crate::shape::{Rank1, Rank2, Rank3, Shape};
use crate::tensor::Tensor;

// MatrixProduct: Contraction of the last axis of A with the first axis of B
//
// The result shape is inferred from the operand shapes through the trait's
// associated `Output` type:
//
//   [M, K]    × [K, N] → [M, N]     classic matmul
//   [M, K]    × [K]    → [M]        matrix-vector
//   [K]       × [K, N] → [N]        vector-matrix
//   [B, M, K] × [K, N] → [B, M, N]  batch of rows against one weight matrix
//
// Every form reduces to the same row-major kernel on flat slices with
// (rows, inner, cols) = (product of A's leading axes, K, product of B's
// trailing axes). The kernel accumulates into its output, so gradients can be
// added in place without a temporary.
//
// `matrix_product_transposed` takes the right operand already transposed
// ([N, K] instead of [K, N]) and walks it row by row, which keeps both inner
// loops contiguous. The backward pass of a matrix product uses it to form
// `g × rᵀ` without materializing the transpose.

/// Shapes that can be matrix-multiplied, with the result shape as `Output`.
pub trait MatrixProduct<Rhs> {
    type Output;

    fn matrix_product(&self, rhs: &Rhs) -> Self::Output;
}

/// `lhs × rhs`, for any pair of shapes implementing [`MatrixProduct`].
pub fn matrix_product<L: MatrixProduct<R>, R>(lhs: &L, rhs: &R) -> L::Output {
    lhs.matrix_product(rhs)
}

// out[i][k] += Σ_j a[i][j] * b[j][k]
fn gemm_acc<E: WithDType>(a: &[E], b: &[E], out: &mut [E], rows: usize, inner: usize, cols: usize) {
    for i in 0..rows {
        let out_row = &mut out[i * cols..(i + 1) * cols];
        for j in 0..inner {
            let a_ij = a[i * inner + j];
            let b_row = &b[j * cols..(j + 1) * cols];
            for (o, &b_jk) in out_row.iter_mut().zip(b_row) {
                *o += a_ij * b_jk;
            }
        }
    }
}

// out[i][k] += Σ_j a[i][j] * bt[k][j]
fn gemm_transposed_acc<E: WithDType>(
    a: &[E],
    bt: &[E],
    out: &mut [E],
    rows: usize,
    inner: usize,
    cols: usize,
) {
    for i in 0..rows {
        let a_row = &a[i * inner..(i + 1) * inner];
        for k in 0..cols {
            let bt_row = &bt[k * inner..(k + 1) * inner];
            let dot = a_row
                .iter()
                .zip(bt_row)
                .fold(E::zero(), |acc, (&x, &y)| acc + x * y);
            out[i * cols + k] += dot;
        }
    }
}

impl<E: WithDType, const M: usize, const K: usize, const N: usize>
    MatrixProduct<Tensor<E, Rank2<K, N>>> for Tensor<E, Rank2<M, K>>
{
    type Output = Tensor<E, Rank2<M, N>>;

    fn matrix_product(&self, rhs: &Tensor<E, Rank2<K, N>>) -> Self::Output {
        let mut out = Tensor::zeros();
        matrix_product_acc(self, rhs, &mut out);
        out
    }
}

impl<E: WithDType, const M: usize, const K: usize> MatrixProduct<Tensor<E, Rank1<K>>>
    for Tensor<E, Rank2<M, K>>
{
    type Output = Tensor<E, Rank1<M>>;

    fn matrix_product(&self, rhs: &Tensor<E, Rank1<K>>) -> Self::Output {
        let mut out = Tensor::<E, Rank1<M>>::zeros();
        gemm_acc(self.as_slice(), rhs.as_slice(), out.as_mut_slice(), M, K, 1);
        out
    }
}

impl<E: WithDType, const K: usize, const N: usize> MatrixProduct<Tensor<E, Rank2<K, N>>>
    for Tensor<E, Rank1<K>>
{
    type Output = Tensor<E, Rank1<N>>;

    fn matrix_product(&self, rhs: &Tensor<E, Rank2<K, N>>) -> Self::Output {
        let mut out = Tensor::<E, Rank1<N>>::zeros();
        gemm_acc(self.as_slice(), rhs.as_slice(), out.as_mut_slice(), 1, K, N);
        out
    }
}

impl<E: WithDType, const B: usize, const M: usize, const K: usize, const N: usize>
    MatrixProduct<Tensor<E, Rank2<K, N>>> for Tensor<E, Rank3<B, M, K>>
{
    type Output = Tensor<E, Rank3<B, M, N>>;

    fn matrix_product(&self, rhs: &Tensor<E, Rank2<K, N>>) -> Self::Output {
        let mut out = Tensor::<E, Rank3<B, M, N>>::zeros();
        gemm_acc(self.as_slice(), rhs.as_slice(), out.as_mut_slice(), B * M, K, N);
        out
    }
}

/// `out += lhs × rhs` for two matrices.
pub fn matrix_product_acc<E: WithDType, const M: usize, const K: usize, const N: usize>(
    lhs: &Tensor<E, Rank2<M, K>>,
    rhs: &Tensor<E, Rank2<K, N>>,
    out: &mut Tensor<E, Rank2<M, N>>,
) {
    gemm_acc(lhs.as_slice(), rhs.as_slice(), out.as_mut_slice(), M, K, N);
}

/// `lhs × rhs_tᵀ`, where `rhs_t` is the right operand stored transposed.
pub fn matrix_product_transposed<E: WithDType, const M: usize, const K: usize, const N: usize>(
    lhs: &Tensor<E, Rank2<M, K>>,
    rhs_t: &Tensor<E, Rank2<N, K>>,
) -> Tensor<E, Rank2<M, N>> {
    let mut out = Tensor::zeros();
    matrix_product_transposed_acc(lhs, rhs_t, &mut out);
    out
}

/// `out += lhs × rhs_tᵀ`.
pub fn matrix_product_transposed_acc<
    E: WithDType,
    const M: usize,
    const K: usize,
    const N: usize,
>(
    lhs: &Tensor<E, Rank2<M, K>>,
    rhs_t: &Tensor<E, Rank2<N, K>>,
    out: &mut Tensor<E, Rank2<M, N>>,
) {
    gemm_transposed_acc(lhs.as_slice(), rhs_t.as_slice(), out.as_mut_slice(), M, K, N);
}

impl<E: Copy, S: Shape> Tensor<E, S> {
    /// Matrix product with the result shape inferred from both operands.
    ///
    /// ```
    /// use fixgrad_core::{Rank2, Tensor};
    ///
    /// let a = Tensor::<i32, Rank2<2, 3>>::from([[1, 2, 3], [4, 5, 6]]);
    /// let b = Tensor::<i32, Rank2<3, 2>>::from([[9, 8], [7, 6], [5, 4]]);
    /// assert_eq!(a.matmul(&b), Tensor::<i32, Rank2<2, 2>>::from([[38, 32], [101, 86]]));
    /// ```
    pub fn matmul<Rhs>(&self, rhs: &Rhs) -> <Self as MatrixProduct<Rhs>>::Output
    where
        Self: MatrixProduct<Rhs>,
    {
        self.matrix_product(rhs)
    }
}

// Bias broadcast over a batch axis
//
// A tensor of shape [B, N, ...] and a bias of shape [N]: bias[j] is added to
// every element of the sub-tensor t[i][j], for every batch index i. The
// reverse direction, `sum_to_bias`, folds a [B, N, ...] gradient back onto
// the bias by summing everything except axis 1.

impl<E: WithDType, S: Shape> Tensor<E, S> {
    /// Add `bias[j]` to every element of `self[i][j]`.
    pub fn add_bias<const N: usize>(&self, bias: &Tensor<E, Rank1<N>>) -> Self {
        let mut out = self.clone();
        out.add_bias_inplace(bias);
        out
    }

    pub fn add_bias_inplace<const N: usize>(&mut self, bias: &Tensor<E, Rank1<N>>) -> &mut Self {
        let block = bias_block::<S, N>();
        for (chunk_idx, chunk) in self.as_mut_slice().chunks_mut(block.max(1)).enumerate() {
            let b = bias.as_slice()[chunk_idx % N];
            for x in chunk {
                *x += b;
            }
        }
        self
    }

    /// Sum over every axis except axis 1, giving one value per bias entry.
    pub fn sum_to_bias<const N: usize>(&self) -> Tensor<E, Rank1<N>> {
        let block = bias_block::<S, N>();
        let mut out = Tensor::<E, Rank1<N>>::zeros();
        for (chunk_idx, chunk) in self.as_slice().chunks(block.max(1)).enumerate() {
            out.as_mut_slice()[chunk_idx % N] += chunk.iter().fold(E::zero(), |acc, &x| acc + x);
        }
        out
    }
}

// Elements per t[i][j] block for a [B, N, ...] shape.
fn bias_block<S: Shape, const N: usize>() -> usize {
    const {
        assert!(
            S::RANK >= 2 && S::DIMS[1] == N,
            "bias length must match axis 1 of a tensor with a batch axis"
        )
    };
    crate::shape::product(S::DIMS, 2, S::RANK)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data1() -> Tensor<i32, Rank2<3, 4>> {
        Tensor::from([[4, 7, 1, 3], [9, 0, 8, 8], [3, 2, 6, 0]])
    }

    fn data3() -> Tensor<i32, Rank2<4, 3>> {
        Tensor::from([[4, 2, 7], [2, 5, 4], [5, 3, 1], [0, 3, 6]])
    }

    #[test]
    fn test_matrix_product() {
        let mul1 = Tensor::<i32, Rank2<3, 3>>::from([[35, 55, 75], [76, 66, 119], [46, 34, 35]]);
        let mul2 = Tensor::<i32, Rank2<4, 4>>::from([
            [55, 42, 62, 28],
            [65, 22, 66, 46],
            [50, 37, 35, 39],
            [45, 12, 60, 24],
        ]);
        assert_eq!(matrix_product(&data1(), &data3()), mul1);
        assert_eq!(data3().matmul(&data1()), mul2);
    }

    #[test]
    fn test_matrix_product_transposed() {
        let expected = data1().matmul(&data3());
        assert_eq!(matrix_product_transposed(&data1(), &data3().t()), expected);
        assert_eq!(
            matrix_product_transposed(&data3(), &data1().t()),
            data3().matmul(&data1())
        );
    }

    #[test]
    fn test_matrix_product_accumulates() {
        let mut out = Tensor::<i32, Rank2<3, 3>>::full(1);
        matrix_product_acc(&data1(), &data3(), &mut out);
        assert_eq!(out[[0, 0]], 36);
        matrix_product_transposed_acc(&data1(), &data3().t(), &mut out);
        assert_eq!(out[[0, 0]], 71);
    }

    #[test]
    fn test_matrix_vector_forms() {
        let v = Tensor::<i32, Rank1<4>>::from([1, 0, 0, 1]);
        let mv: Tensor<i32, Rank1<3>> = data1().matmul(&v);
        assert_eq!(mv.as_slice(), &[7, 17, 3]);
        let w = Tensor::<i32, Rank1<3>>::from([1, 1, 0]);
        let vm: Tensor<i32, Rank1<4>> = w.matmul(&data1());
        assert_eq!(vm.as_slice(), &[13, 7, 9, 11]);
    }

    #[test]
    fn test_batched_matrix_product() {
        let batch = Tensor::<i32, Rank3<2, 3, 4>>::try_from_iter(
            data1().iter().chain(data1().iter()).copied(),
        )
        .unwrap();
        let out = batch.matmul(&data3());
        let single = data1().matmul(&data3());
        assert_eq!(out.at(0), &single);
        assert_eq!(out.at(1), &single);
    }

    #[test]
    fn test_identity() {
        let a = Tensor::<f64, Rank2<3, 3>>::from([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.5]]);
        assert_eq!(a.matmul(&Tensor::<f64, Rank2<3, 3>>::eye()), a);
    }

    #[test]
    fn test_add_bias() {
        let t = Tensor::<i32, Rank2<2, 3>>::from([[1, 2, 3], [4, 5, 6]]);
        let bias = Tensor::<i32, Rank1<3>>::from([10, 20, 30]);
        assert_eq!(t.add_bias(&bias), Tensor::from([[11, 22, 33], [14, 25, 36]]));
        assert_eq!(t.sum_to_bias::<3>().as_slice(), &[5, 7, 9]);
    }

    #[test]
    fn test_add_bias_rank3() {
        let t = Tensor::<i32, Rank3<2, 2, 2>>::zeros();
        let bias = Tensor::<i32, Rank1<2>>::from([1, 2]);
        let out = t.add_bias(&bias);
        assert_eq!(out.as_slice(), &[1, 1, 2, 2, 1, 1, 2, 2]);
        assert_eq!(out.sum_to_bias::<2>().as_slice(), &[4, 8]);
    }
}
