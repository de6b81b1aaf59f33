//! Transformer decoder blocks

use crate::backend::Backend;
use crate::cache::Cache;
use crate::model::TextConfig;
use anyhow::Result;

/// A bias-free linear projection
#[derive(Debug, Clone)]
pub struct Linear<T> {
    /// The `(out, in)` weight matrix
    pub weight: T,
}

impl<T> Linear<T> {
    /// Project `x` through the weight
    pub fn forward<B: Backend<Tensor = T>>(&self, backend: &B, x: &T) -> Result<T> {
        backend.linear(&self.weight, x)
    }
}

/// RMS normalization weights
#[derive(Debug, Clone)]
pub struct RmsNorm<T> {
    /// The per-channel gain
    pub weight: T,
}

impl<T> RmsNorm<T> {
    /// Normalize `x` over its last axis
    pub fn forward<B: Backend<Tensor = T>>(&self, backend: &B, x: &T, eps: f32) -> Result<T> {
        backend.rms_norm(x, &self.weight, eps)
    }
}

/// Causal self-attention with rotary positions
#[derive(Debug, Clone)]
pub struct SelfAttention<T> {
    pub query: Linear<T>,
    pub key: Linear<T>,
    pub value: Linear<T>,
    pub output: Linear<T>,

    /// Per-layer rope frequency factors, when the model carries them
    pub rope_factors: Option<T>,
}

impl<T: Clone> SelfAttention<T> {
    /// One attention pass over `hidden (seq, d)` at the given positions
    pub fn forward<B: Backend<Tensor = T>>(
        &self,
        backend: &B,
        hidden: &T,
        positions: &[i32],
        cache: &mut Cache<B>,
        opts: &TextConfig,
    ) -> Result<T> {
        let seq = positions.len();
        let hd = opts.head_dim();

        let q = self.query.forward(backend, hidden)?;
        let q = backend.reshape(&q, &[seq, opts.n_heads, hd])?;
        let q = backend.rope(
            &q,
            positions,
            self.rope_factors.as_ref(),
            opts.rope_dim,
            opts.rope_base,
            opts.rope_scale,
        )?;

        let k = self.key.forward(backend, hidden)?;
        let k = backend.reshape(&k, &[seq, opts.n_kv_heads, hd])?;
        let k = backend.rope(
            &k,
            positions,
            self.rope_factors.as_ref(),
            opts.rope_dim,
            opts.rope_base,
            opts.rope_scale,
        )?;

        let v = self.value.forward(backend, hidden)?;
        let v = backend.reshape(&v, &[seq, opts.n_kv_heads, hd])?;

        cache.put(k, v)?;
        let (k, v, mask) = cache.get()?;

        let scale = 1.0 / (hd as f32).sqrt();
        let attn = backend.attention(&q, &k, &v, scale, mask.as_ref())?;
        self.output.forward(backend, &attn)
    }
}

/// Cross-attention against cached encoder output
#[derive(Debug, Clone)]
pub struct CrossAttention<T> {
    pub query_norm: RmsNorm<T>,
    pub query: Linear<T>,
    pub key_norm: RmsNorm<T>,
    pub key: Linear<T>,
    pub value: Linear<T>,
    pub output: Linear<T>,
}

impl<T: Clone> CrossAttention<T> {
    /// One cross-attention pass; projects fresh k/v when encoder output is
    /// present, otherwise reuses the cache
    pub fn forward<B: Backend<Tensor = T>>(
        &self,
        backend: &B,
        hidden: &T,
        encoder: Option<&T>,
        cache: &mut Cache<B>,
        opts: &TextConfig,
    ) -> Result<T>
    where
        T: crate::backend::Tensor,
    {
        let seq = hidden.dims()[0];
        let hd = opts.head_dim();

        let q = self.query.forward(backend, hidden)?;
        let q = backend.reshape(&q, &[seq, opts.n_heads, hd])?;
        let q = self.query_norm.forward(backend, &q, opts.rms_eps)?;

        if let Some(encoder) = encoder {
            let enc_seq = encoder.dims()[0];

            let k = self.key.forward(backend, encoder)?;
            let k = backend.reshape(&k, &[enc_seq, opts.n_kv_heads, hd])?;
            let k = self.key_norm.forward(backend, &k, opts.rms_eps)?;

            let v = self.value.forward(backend, encoder)?;
            let v = backend.reshape(&v, &[enc_seq, opts.n_kv_heads, hd])?;

            cache.put(k, v)?;
        }

        let (k, v, _) = cache.get()?;
        let scale = 1.0 / (hd as f32).sqrt();

        // explicit attention: softmax(scale · q·kᵀ) applied to v, per head
        let qp = backend.permute(&q, &[1, 0, 2])?;
        let qp = backend.contiguous(&qp)?;
        let kp = backend.permute(&k, &[1, 2, 0])?;
        let kp = backend.contiguous(&kp)?;

        let scores = backend.matmul(&qp, &kp)?;
        let scores = backend.scale(&scores, scale)?;
        let scores = backend.softmax(&scores)?;

        let vp = backend.permute(&v, &[1, 0, 2])?;
        let vp = backend.contiguous(&vp)?;
        let ctx = backend.matmul(&scores, &vp)?;

        let ctx = backend.permute(&ctx, &[1, 0, 2])?;
        let ctx = backend.contiguous(&ctx)?;
        let ctx = backend.reshape(&ctx, &[seq, opts.n_heads * hd])?;

        self.output.forward(backend, &ctx)
    }
}

/// The gated feed-forward network
#[derive(Debug, Clone)]
pub struct Mlp<T> {
    pub up: Linear<T>,
    pub down: Linear<T>,
    pub gate: Linear<T>,
}

impl<T> Mlp<T> {
    /// `down(silu(gate(x)) * up(x))`
    pub fn forward<B: Backend<Tensor = T>>(&self, backend: &B, x: &T) -> Result<T> {
        let gate = backend.silu(&self.gate.forward(backend, x)?)?;
        let up = self.up.forward(backend, x)?;
        let hidden = backend.mul(&gate, &up)?;
        self.down.forward(backend, &hidden)
    }
}

/// A standard self-attention decoder block
#[derive(Debug, Clone)]
pub struct SelfDecoderLayer<T> {
    pub attention_norm: RmsNorm<T>,
    pub attention: SelfAttention<T>,
    pub mlp_norm: RmsNorm<T>,
    pub mlp: Mlp<T>,
}

impl<T: Clone> SelfDecoderLayer<T> {
    /// `residual → norm → attn → +res → norm → mlp → +res`, gathering
    /// `outputs` rows right after attention when requested
    pub fn forward<B: Backend<Tensor = T>>(
        &self,
        backend: &B,
        hidden: &T,
        positions: &[i32],
        outputs: Option<&[i32]>,
        cache: &mut Cache<B>,
        opts: &TextConfig,
    ) -> Result<T> {
        let mut residual = hidden.clone();

        let mut hidden = self.attention_norm.forward(backend, hidden, opts.rms_eps)?;
        hidden = self
            .attention
            .forward(backend, &hidden, positions, cache, opts)?;

        if let Some(outputs) = outputs {
            hidden = backend.rows(&hidden, outputs)?;
            residual = backend.rows(&residual, outputs)?;
        }

        hidden = backend.add(&hidden, &residual)?;
        let residual = hidden.clone();

        hidden = self.mlp_norm.forward(backend, &hidden, opts.rms_eps)?;
        hidden = self.mlp.forward(backend, &hidden)?;
        backend.add(&hidden, &residual)
    }
}

/// A cross-attention decoder block with tanh-gated residuals
#[derive(Debug, Clone)]
pub struct CrossDecoderLayer<T> {
    pub attention_norm: RmsNorm<T>,
    pub attention: CrossAttention<T>,
    /// Learned scalar gate on the attention residual
    pub attention_gate: T,
    pub mlp_norm: RmsNorm<T>,
    pub mlp: Mlp<T>,
    /// Learned scalar gate on the feed-forward residual
    pub mlp_gate: T,
}

impl<T: Clone + crate::backend::Tensor> CrossDecoderLayer<T> {
    /// As the self block, but both residual additions are scaled by
    /// `tanh(gate)`
    pub fn forward<B: Backend<Tensor = T>>(
        &self,
        backend: &B,
        hidden: &T,
        encoder: Option<&T>,
        cache: &mut Cache<B>,
        opts: &TextConfig,
    ) -> Result<T> {
        let residual = hidden.clone();

        let mut hidden = self.attention_norm.forward(backend, hidden, opts.rms_eps)?;
        hidden = self
            .attention
            .forward(backend, &hidden, encoder, cache, opts)?;
        let gate = backend.tanh(&self.attention_gate)?;
        hidden = backend.mul(&hidden, &gate)?;
        hidden = backend.add(&hidden, &residual)?;

        let residual = hidden.clone();
        hidden = self.mlp_norm.forward(backend, &hidden, opts.rms_eps)?;
        hidden = self.mlp.forward(backend, &hidden)?;
        let gate = backend.tanh(&self.mlp_gate)?;
        hidden = backend.mul(&hidden, &gate)?;
        backend.add(&hidden, &residual)
    }
}

/// A decoder block, tagged by attention kind
#[derive(Debug, Clone)]
pub enum DecoderLayer<T> {
    /// Causal self-attention block
    SelfAttention(SelfDecoderLayer<T>),
    /// Encoder cross-attention block
    CrossAttention(CrossDecoderLayer<T>),
}

impl<T: Clone + crate::backend::Tensor> DecoderLayer<T> {
    /// Dispatch the forward pass by block kind
    #[allow(clippy::too_many_arguments)]
    pub fn forward<B: Backend<Tensor = T>>(
        &self,
        backend: &B,
        hidden: &T,
        positions: &[i32],
        outputs: Option<&[i32]>,
        encoder: Option<&T>,
        cache: &mut Cache<B>,
        opts: &TextConfig,
    ) -> Result<T> {
        match self {
            DecoderLayer::SelfAttention(layer) => {
                layer.forward(backend, hidden, positions, outputs, cache, opts)
            }
            DecoderLayer::CrossAttention(layer) => {
                layer.forward(backend, hidden, encoder, cache, opts)
            }
        }
    }
}
