//! The compute contract the decoder drives
//!
//! The runtime is written against these operations; the real GPU library
//! lives behind them. The crate ships a reference f32 implementation used
//! by the tests.

use anyhow::Result;

/// An opaque tensor handle
pub trait Tensor: Clone + Send + Sync + std::fmt::Debug {
    /// The tensor's dimensions
    fn dims(&self) -> Vec<usize>;
}

/// The operations a compute backend must offer
pub trait Backend: Clone + Send + Sync {
    /// The backend's tensor type
    type Tensor: Tensor;

    /// Build a tensor from host data
    fn from_slice(&self, data: &[f32], dims: &[usize]) -> Result<Self::Tensor>;

    /// Copy a tensor back to host data
    fn to_vec(&self, x: &Self::Tensor) -> Result<Vec<f32>>;

    /// Gather embedding rows for token ids: `(vocab, d)` → `(len(ids), d)`
    fn embed(&self, table: &Self::Tensor, ids: &[i32]) -> Result<Self::Tensor>;

    /// Linear projection without bias: `x (seq, in) · wᵀ (out, in)` → `(seq, out)`
    fn linear(&self, w: &Self::Tensor, x: &Self::Tensor) -> Result<Self::Tensor>;

    /// Root-mean-square normalization over the last axis
    fn rms_norm(&self, x: &Self::Tensor, w: &Self::Tensor, eps: f32) -> Result<Self::Tensor>;

    /// Element-wise addition
    fn add(&self, a: &Self::Tensor, b: &Self::Tensor) -> Result<Self::Tensor>;

    /// Element-wise multiplication; a single-element tensor broadcasts
    fn mul(&self, a: &Self::Tensor, b: &Self::Tensor) -> Result<Self::Tensor>;

    /// SiLU activation
    fn silu(&self, x: &Self::Tensor) -> Result<Self::Tensor>;

    /// Hyperbolic tangent
    fn tanh(&self, x: &Self::Tensor) -> Result<Self::Tensor>;

    /// Softmax over the last axis
    fn softmax(&self, x: &Self::Tensor) -> Result<Self::Tensor>;

    /// Multiply by a scalar
    fn scale(&self, x: &Self::Tensor, s: f32) -> Result<Self::Tensor>;

    /// Reshape into new dimensions of equal volume
    fn reshape(&self, x: &Self::Tensor, dims: &[usize]) -> Result<Self::Tensor>;

    /// Reorder axes
    fn permute(&self, x: &Self::Tensor, axes: &[usize]) -> Result<Self::Tensor>;

    /// Force standard layout
    fn contiguous(&self, x: &Self::Tensor) -> Result<Self::Tensor>;

    /// Gather rows along the first axis
    fn rows(&self, x: &Self::Tensor, idx: &[i32]) -> Result<Self::Tensor>;

    /// Concatenate along an axis
    fn concat(&self, a: &Self::Tensor, b: &Self::Tensor, axis: usize) -> Result<Self::Tensor>;

    /// Rotary positional embedding on `(seq, heads, head_dim)`.
    ///
    /// The first `dim` components of each head rotate; `factors`, when
    /// present, divides the per-pair frequencies.
    #[allow(clippy::too_many_arguments)]
    fn rope(
        &self,
        x: &Self::Tensor,
        positions: &[i32],
        factors: Option<&Self::Tensor>,
        dim: u32,
        base: f32,
        scale: f32,
    ) -> Result<Self::Tensor>;

    /// Matrix product. 2-D inputs multiply plainly; 3-D inputs multiply per
    /// batch, broadcasting grouped batches when one side has fewer.
    fn matmul(&self, a: &Self::Tensor, b: &Self::Tensor) -> Result<Self::Tensor>;

    /// Fused scaled dot-product attention.
    ///
    /// `q (qseq, heads, d)`, `k/v (kseq, kv_heads, d)`; grouped-query models
    /// map each query head onto `kv_heads * head / heads`. The optional mask
    /// is `(qseq, kseq)` and is added to the scores before softmax. Returns
    /// `(qseq, heads * d)`.
    fn attention(
        &self,
        q: &Self::Tensor,
        k: &Self::Tensor,
        v: &Self::Tensor,
        scale: f32,
        mask: Option<&Self::Tensor>,
    ) -> Result<Self::Tensor>;
}
