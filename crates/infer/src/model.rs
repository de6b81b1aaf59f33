//! Decoder stack assembly and the full forward pass

use crate::backend::Backend;
use crate::cache::{Cache, LayerKind};
use crate::layer::{DecoderLayer, Linear, RmsNorm};
use anyhow::Result;

/// Model-wide hyperparameters, read from the weight file's metadata
#[derive(Debug, Clone, Default)]
pub struct TextConfig {
    /// Number of decoder blocks
    pub block_count: usize,

    /// Embedding width
    pub hidden_size: usize,

    /// Query heads per block
    pub n_heads: usize,

    /// Key/value heads per block
    pub n_kv_heads: usize,

    /// RMS-norm epsilon
    pub rms_eps: f32,

    /// Rotated dimensions per head
    pub rope_dim: u32,

    /// Rope frequency base
    pub rope_base: f32,

    /// Rope position scale
    pub rope_scale: f32,

    /// Block indexes that cross-attend to encoder output
    pub cross_attention_layers: Vec<u32>,
}

impl TextConfig {
    /// Width of one attention head
    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.n_heads
    }

    /// Whether block `i` is a cross-attention block
    pub fn is_cross(&self, i: usize) -> bool {
        self.cross_attention_layers.contains(&(i as u32))
    }

    /// The cache layer kinds for this stack
    pub fn layer_kinds(&self) -> Vec<LayerKind> {
        (0..self.block_count)
            .map(|i| {
                if self.is_cross(i) {
                    LayerKind::CrossAttention
                } else {
                    LayerKind::SelfAttention
                }
            })
            .collect()
    }
}

/// The assembled decoder-only text model
#[derive(Debug, Clone)]
pub struct TextModel<T> {
    /// The `(vocab, d)` token embedding table
    pub token_embedding: T,

    /// The decoder blocks, self or cross per the config
    pub layers: Vec<DecoderLayer<T>>,

    /// The final normalization
    pub output_norm: RmsNorm<T>,

    /// The output head producing logits
    pub output: Linear<T>,

    /// The hyperparameters the stack was built with
    pub config: TextConfig,
}

impl<T: Clone + crate::backend::Tensor> TextModel<T> {
    /// One forward pass.
    ///
    /// `ids` and `positions` describe the batch; `outputs` selects which
    /// positions' logits are produced (all when `None`); only the last
    /// block's work narrows, which is where the saving is. `encoder`
    /// carries projector output for multimodal steps. Cross blocks are
    /// skipped until encoder state exists.
    pub fn forward<B: Backend<Tensor = T>>(
        &self,
        backend: &B,
        ids: &[i32],
        positions: &[i32],
        outputs: Option<&[i32]>,
        encoder: Option<&T>,
        cache: &mut Cache<B>,
    ) -> Result<T> {
        cache.start_forward(positions);

        let mut hidden = backend.embed(&self.token_embedding, ids)?;

        let last = self.layers.len().saturating_sub(1);
        for (i, layer) in self.layers.iter().enumerate() {
            cache.set_layer(i);
            cache.set_layer_type(if self.config.is_cross(i) {
                LayerKind::CrossAttention
            } else {
                LayerKind::SelfAttention
            });

            if self.config.is_cross(i) && encoder.is_none() && !cache.encoder_cached() {
                continue;
            }

            let out_rows = if i == last { outputs } else { None };
            hidden = layer.forward(
                backend,
                &hidden,
                positions,
                out_rows,
                encoder,
                cache,
                &self.config,
            )?;
        }

        let hidden = self.output_norm.forward(backend, &hidden, self.config.rms_eps)?;
        self.output.forward(backend, &hidden)
    }

    /// Re-rope cached keys after the context window slides.
    ///
    /// Self-attention blocks shift with their own rope factors; cross
    /// blocks hold encoder state and pass through.
    pub fn shift<B: Backend<Tensor = T>>(
        &self,
        cache: &mut Cache<B>,
        layer: usize,
        offset: i32,
    ) -> Result<()> {
        if let DecoderLayer::SelfAttention(block) = &self.layers[layer] {
            cache.shift(
                layer,
                offset,
                block.attention.rope_factors.as_ref(),
                self.config.rope_dim,
                self.config.rope_base,
                self.config.rope_scale,
            )?;
        }
        Ok(())
    }
}
