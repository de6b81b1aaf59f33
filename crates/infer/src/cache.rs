//! Key/value cache for incremental decoding

use crate::backend::{Backend, Tensor};
use anyhow::{bail, Context, Result};

/// How a layer participates in caching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Causal self-attention over prior token positions
    SelfAttention,
    /// Cross-attention over cached encoder outputs
    CrossAttention,
}

/// Per-layer cached state
#[derive(Debug)]
struct Slot<T> {
    kind: LayerKind,
    k: Option<T>,
    v: Option<T>,
    /// Token positions covered by `k`/`v`; unused by cross slots
    positions: Vec<i32>,
    /// Whether a cross slot holds encoder output
    encoder_cached: bool,
}

/// The cache serving one request at a time.
///
/// One exclusive writer holds the cache per inference request; the
/// scheduler serializes requests onto each loaded model.
pub struct Cache<B: Backend> {
    backend: B,
    slots: Vec<Slot<B::Tensor>>,
    active: usize,
    /// Positions of the batch currently being decoded
    batch_positions: Vec<i32>,
}

impl<B: Backend> Cache<B> {
    /// Create a cache with one slot per layer
    pub fn new(backend: B, kinds: &[LayerKind]) -> Self {
        let slots = kinds
            .iter()
            .map(|&kind| Slot {
                kind,
                k: None,
                v: None,
                positions: Vec::new(),
                encoder_cached: false,
            })
            .collect();
        Self {
            backend,
            slots,
            active: 0,
            batch_positions: Vec::new(),
        }
    }

    /// Record the positions of the batch about to be decoded
    pub fn start_forward(&mut self, positions: &[i32]) {
        self.batch_positions = positions.to_vec();
    }

    /// Switch the active layer slot
    pub fn set_layer(&mut self, layer: usize) {
        self.active = layer;
    }

    /// Retag the active slot
    pub fn set_layer_type(&mut self, kind: LayerKind) {
        self.slots[self.active].kind = kind;
    }

    /// Whether the active cross slot holds encoder output
    pub fn encoder_cached(&self) -> bool {
        self.slots[self.active].encoder_cached
    }

    /// Store keys/values for the active layer.
    ///
    /// Self-attention slots append along the sequence axis at the batch
    /// positions; cross slots replace their encoder state wholesale.
    pub fn put(&mut self, k: B::Tensor, v: B::Tensor) -> Result<()> {
        let batch = self.batch_positions.clone();
        let slot = &mut self.slots[self.active];
        match slot.kind {
            LayerKind::CrossAttention => {
                slot.k = Some(k);
                slot.v = Some(v);
                slot.encoder_cached = true;
            }
            LayerKind::SelfAttention => {
                if k.dims().first() != Some(&batch.len()) {
                    bail!(
                        "cached {} keys for a batch of {}",
                        k.dims().first().copied().unwrap_or(0),
                        batch.len()
                    );
                }
                slot.k = Some(match slot.k.take() {
                    Some(prev) => self.backend.concat(&prev, &k, 0)?,
                    None => k,
                });
                slot.v = Some(match slot.v.take() {
                    Some(prev) => self.backend.concat(&prev, &v, 0)?,
                    None => v,
                });
                slot.positions.extend_from_slice(&batch);
            }
        }
        Ok(())
    }

    /// Fetch the active layer's full keys, values, and attention mask.
    ///
    /// Self-attention slots return a causal mask built from the cached and
    /// batch positions; cross slots return no mask.
    pub fn get(&self) -> Result<(B::Tensor, B::Tensor, Option<B::Tensor>)> {
        let slot = &self.slots[self.active];
        let k = slot.k.clone().context("no cached keys for layer")?;
        let v = slot.v.clone().context("no cached values for layer")?;

        let mask = match slot.kind {
            LayerKind::CrossAttention => None,
            LayerKind::SelfAttention => Some(self.causal_mask(&slot.positions)?),
        };
        Ok((k, v, mask))
    }

    /// Re-rope the keys of one self-attention layer after the context
    /// window slides.
    ///
    /// `offset` is applied to every cached position; cross slots pass
    /// through untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn shift(
        &mut self,
        layer: usize,
        offset: i32,
        factors: Option<&B::Tensor>,
        dim: u32,
        base: f32,
        scale: f32,
    ) -> Result<()> {
        let backend = self.backend.clone();
        let slot = &mut self.slots[layer];
        if slot.kind != LayerKind::SelfAttention {
            return Ok(());
        }
        let Some(k) = slot.k.take() else {
            return Ok(());
        };

        let shifts = vec![offset; slot.positions.len()];
        slot.k = Some(backend.rope(&k, &shifts, factors, dim, base, scale)?);
        for p in &mut slot.positions {
            *p += offset;
        }
        Ok(())
    }

    /// The cached positions of a layer, mostly for diagnostics and tests
    pub fn positions(&self, layer: usize) -> &[i32] {
        &self.slots[layer].positions
    }

    /// Drop all cached state, ready for the next request
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.k = None;
            slot.v = None;
            slot.positions.clear();
            slot.encoder_cached = false;
        }
        self.batch_positions.clear();
    }

    /// A `(batch, cached)` additive mask hiding positions after each query
    fn causal_mask(&self, cached: &[i32]) -> Result<B::Tensor> {
        let q = &self.batch_positions;
        let mut data = Vec::with_capacity(q.len() * cached.len());
        for &qp in q {
            for &kp in cached {
                data.push(if kp <= qp { 0.0 } else { f32::NEG_INFINITY });
            }
        }
        self.backend.from_slice(&data, &[q.len(), cached.len()])
    }
}
