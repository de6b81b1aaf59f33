//! Reference f32 backend over ndarray
//!
//! Correctness baseline for the decoder math; nothing here is tuned for
//! speed.

use crate::backend::{Backend, Tensor};
use anyhow::{bail, Context, Result};
use ndarray::{ArrayD, Axis, Ix2, IxDyn};

/// The reference backend handle
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

/// A dense row-major f32 tensor
#[derive(Debug, Clone)]
pub struct CpuTensor(pub ArrayD<f32>);

impl Tensor for CpuTensor {
    fn dims(&self) -> Vec<usize> {
        self.0.shape().to_vec()
    }
}

impl CpuTensor {
    fn standard(&self) -> ArrayD<f32> {
        self.0.as_standard_layout().to_owned()
    }
}

impl Backend for CpuBackend {
    type Tensor = CpuTensor;

    fn from_slice(&self, data: &[f32], dims: &[usize]) -> Result<CpuTensor> {
        let array = ArrayD::from_shape_vec(IxDyn(dims), data.to_vec())
            .context("shape does not match data length")?;
        Ok(CpuTensor(array))
    }

    fn to_vec(&self, x: &CpuTensor) -> Result<Vec<f32>> {
        Ok(x.standard().iter().copied().collect())
    }

    fn embed(&self, table: &CpuTensor, ids: &[i32]) -> Result<CpuTensor> {
        let rows: Vec<usize> = ids
            .iter()
            .map(|&id| {
                if id < 0 || id as usize >= table.0.shape()[0] {
                    bail!("token id {id} out of embedding range");
                }
                Ok(id as usize)
            })
            .collect::<Result<_>>()?;
        Ok(CpuTensor(table.0.select(Axis(0), &rows)))
    }

    fn linear(&self, w: &CpuTensor, x: &CpuTensor) -> Result<CpuTensor> {
        let w = as_2d(w)?;
        let x = as_2d(x)?;
        Ok(CpuTensor(x.dot(&w.t()).into_dyn()))
    }

    fn rms_norm(&self, x: &CpuTensor, w: &CpuTensor, eps: f32) -> Result<CpuTensor> {
        let mut out = x.standard();
        let weight = w.standard();
        let d = *out.shape().last().context("rms_norm on 0-d tensor")?;
        if weight.len() != d {
            bail!("rms_norm weight length {} != {}", weight.len(), d);
        }

        let weight: Vec<f32> = weight.iter().copied().collect();
        for mut row in out.rows_mut() {
            let mean_sq = row.iter().map(|v| v * v).sum::<f32>() / d as f32;
            let inv = 1.0 / (mean_sq + eps).sqrt();
            for (v, w) in row.iter_mut().zip(&weight) {
                *v = *v * inv * w;
            }
        }
        Ok(CpuTensor(out))
    }

    fn add(&self, a: &CpuTensor, b: &CpuTensor) -> Result<CpuTensor> {
        if a.0.shape() != b.0.shape() {
            bail!("add shape mismatch {:?} vs {:?}", a.0.shape(), b.0.shape());
        }
        Ok(CpuTensor(&a.0 + &b.0))
    }

    fn mul(&self, a: &CpuTensor, b: &CpuTensor) -> Result<CpuTensor> {
        if b.0.len() == 1 {
            let s = b.0.iter().next().copied().unwrap_or(0.0);
            return self.scale(a, s);
        }
        if a.0.shape() != b.0.shape() {
            bail!("mul shape mismatch {:?} vs {:?}", a.0.shape(), b.0.shape());
        }
        Ok(CpuTensor(&a.0 * &b.0))
    }

    fn silu(&self, x: &CpuTensor) -> Result<CpuTensor> {
        Ok(CpuTensor(x.0.mapv(|v| v / (1.0 + (-v).exp()))))
    }

    fn tanh(&self, x: &CpuTensor) -> Result<CpuTensor> {
        Ok(CpuTensor(x.0.mapv(f32::tanh)))
    }

    fn softmax(&self, x: &CpuTensor) -> Result<CpuTensor> {
        let mut out = x.standard();
        for mut row in out.rows_mut() {
            let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let mut sum = 0.0;
            for v in row.iter_mut() {
                *v = (*v - max).exp();
                sum += *v;
            }
            for v in row.iter_mut() {
                *v /= sum;
            }
        }
        Ok(CpuTensor(out))
    }

    fn scale(&self, x: &CpuTensor, s: f32) -> Result<CpuTensor> {
        Ok(CpuTensor(x.0.mapv(|v| v * s)))
    }

    fn reshape(&self, x: &CpuTensor, dims: &[usize]) -> Result<CpuTensor> {
        let data: Vec<f32> = x.standard().iter().copied().collect();
        let array = ArrayD::from_shape_vec(IxDyn(dims), data)
            .with_context(|| format!("reshape to {dims:?}"))?;
        Ok(CpuTensor(array))
    }

    fn permute(&self, x: &CpuTensor, axes: &[usize]) -> Result<CpuTensor> {
        if axes.len() != x.0.ndim() {
            bail!("permute axes {:?} for {}-d tensor", axes, x.0.ndim());
        }
        Ok(CpuTensor(x.0.clone().permuted_axes(IxDyn(axes))))
    }

    fn contiguous(&self, x: &CpuTensor) -> Result<CpuTensor> {
        Ok(CpuTensor(x.standard()))
    }

    fn rows(&self, x: &CpuTensor, idx: &[i32]) -> Result<CpuTensor> {
        let rows: Vec<usize> = idx
            .iter()
            .map(|&i| {
                if i < 0 || i as usize >= x.0.shape()[0] {
                    bail!("row index {i} out of range");
                }
                Ok(i as usize)
            })
            .collect::<Result<_>>()?;
        Ok(CpuTensor(x.0.select(Axis(0), &rows)))
    }

    fn concat(&self, a: &CpuTensor, b: &CpuTensor, axis: usize) -> Result<CpuTensor> {
        let joined = ndarray::concatenate(Axis(axis), &[a.0.view(), b.0.view()])
            .context("concat shape mismatch")?;
        Ok(CpuTensor(joined))
    }

    fn rope(
        &self,
        x: &CpuTensor,
        positions: &[i32],
        factors: Option<&CpuTensor>,
        dim: u32,
        base: f32,
        scale: f32,
    ) -> Result<CpuTensor> {
        let mut out = x.standard();
        let shape = out.shape().to_vec();
        let [seq, heads, head_dim] = shape.as_slice() else {
            bail!("rope expects (seq, heads, head_dim), got {shape:?}");
        };
        let (seq, heads, head_dim) = (*seq, *heads, *head_dim);
        if positions.len() != seq {
            bail!("rope positions {} != seq {}", positions.len(), seq);
        }
        let dim = (dim as usize).min(head_dim);

        let factors: Option<Vec<f32>> = factors.map(|f| f.standard().iter().copied().collect());

        for s in 0..seq {
            let pos = positions[s] as f32 * scale;
            for h in 0..heads {
                for i in 0..dim / 2 {
                    let mut freq = base.powf(-2.0 * i as f32 / dim as f32);
                    if let Some(factors) = &factors {
                        if let Some(f) = factors.get(i) {
                            freq /= f;
                        }
                    }
                    let theta = pos * freq;
                    let (sin, cos) = theta.sin_cos();
                    let a = out[[s, h, 2 * i]];
                    let b = out[[s, h, 2 * i + 1]];
                    out[[s, h, 2 * i]] = a * cos - b * sin;
                    out[[s, h, 2 * i + 1]] = a * sin + b * cos;
                }
            }
        }
        Ok(CpuTensor(out))
    }

    fn matmul(&self, a: &CpuTensor, b: &CpuTensor) -> Result<CpuTensor> {
        match (a.0.ndim(), b.0.ndim()) {
            (2, 2) => {
                let a = as_2d(a)?;
                let b = as_2d(b)?;
                Ok(CpuTensor(a.dot(&b).into_dyn()))
            }
            (3, 3) => {
                let a = a.standard();
                let b = b.standard();
                let (ba, m, ka) = (a.shape()[0], a.shape()[1], a.shape()[2]);
                let (bb, kb, n) = (b.shape()[0], b.shape()[1], b.shape()[2]);
                if ka != kb {
                    bail!("matmul inner dims {ka} vs {kb}");
                }
                // grouped broadcast: the smaller batch repeats over groups,
                // matching grouped-query attention layouts
                let batch = ba.max(bb);
                if batch % ba != 0 || batch % bb != 0 {
                    bail!("matmul batches {ba} and {bb} do not broadcast");
                }
                let (div_a, div_b) = (batch / ba, batch / bb);

                let mut out = ArrayD::zeros(IxDyn(&[batch, m, n]));
                for i in 0..batch {
                    let ai = a.index_axis(Axis(0), i / div_a).into_dimensionality::<Ix2>()?;
                    let bi = b.index_axis(Axis(0), i / div_b).into_dimensionality::<Ix2>()?;
                    let prod = ai.dot(&bi);
                    out.index_axis_mut(Axis(0), i).assign(&prod.into_dyn());
                }
                Ok(CpuTensor(out))
            }
            (na, nb) => bail!("matmul over {na}-d and {nb}-d tensors"),
        }
    }

    fn attention(
        &self,
        q: &CpuTensor,
        k: &CpuTensor,
        v: &CpuTensor,
        scale: f32,
        mask: Option<&CpuTensor>,
    ) -> Result<CpuTensor> {
        let q = q.standard();
        let k = k.standard();
        let v = v.standard();

        let (qseq, heads, d) = dims3(q.shape())?;
        let (kseq, kv_heads, kd) = dims3(k.shape())?;
        if d != kd {
            bail!("attention head dims {d} vs {kd}");
        }
        if heads % kv_heads != 0 {
            bail!("query heads {heads} not grouped over {kv_heads}");
        }
        let group = heads / kv_heads;

        let mask = mask.map(|m| m.standard());
        let mut out = ArrayD::zeros(IxDyn(&[qseq, heads * d]));

        for h in 0..heads {
            let kv = h / group;
            for i in 0..qseq {
                let mut scores = vec![0.0f32; kseq];
                for (j, score) in scores.iter_mut().enumerate() {
                    let mut dot = 0.0;
                    for c in 0..d {
                        dot += q[[i, h, c]] * k[[j, kv, c]];
                    }
                    *score = dot * scale;
                    if let Some(mask) = &mask {
                        *score += mask[[i, j]];
                    }
                }

                let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                let mut sum = 0.0;
                for s in scores.iter_mut() {
                    *s = (*s - max).exp();
                    sum += *s;
                }

                for c in 0..d {
                    let mut acc = 0.0;
                    for (j, s) in scores.iter().enumerate() {
                        acc += s / sum * v[[j, kv, c]];
                    }
                    out[[i, h * d + c]] = acc;
                }
            }
        }
        Ok(CpuTensor(out))
    }
}

fn as_2d(x: &CpuTensor) -> Result<ndarray::Array2<f32>> {
    Ok(x.standard().into_dimensionality::<Ix2>()?)
}

fn dims3(shape: &[usize]) -> Result<(usize, usize, usize)> {
    let [a, b, c] = shape else {
        bail!("expected 3-d tensor, got {shape:?}");
    };
    Ok((*a, *b, *c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;

    #[test]
    fn linear_matches_hand_product() {
        let b = CpuBackend;
        // w: (2 out, 3 in), x: (1, 3)
        let w = b.from_slice(&[1.0, 0.0, 0.0, 0.0, 2.0, 0.0], &[2, 3]).unwrap();
        let x = b.from_slice(&[3.0, 4.0, 5.0], &[1, 3]).unwrap();
        let y = b.linear(&w, &x).unwrap();
        assert_eq!(b.to_vec(&y).unwrap(), vec![3.0, 8.0]);
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let b = CpuBackend;
        let x = b.from_slice(&[0.0, 1.0, 2.0, 5.0, 5.0, 5.0], &[2, 3]).unwrap();
        let y = b.softmax(&x).unwrap();
        let v = b.to_vec(&y).unwrap();
        assert!((v[0..3].iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!((v[3] - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn rope_at_position_zero_is_identity() {
        let b = CpuBackend;
        let x = b.from_slice(&[1.0, 2.0, 3.0, 4.0], &[1, 1, 4]).unwrap();
        let y = b.rope(&x, &[0], None, 4, 10000.0, 1.0).unwrap();
        assert_eq!(b.to_vec(&y).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn rope_preserves_norm() {
        let b = CpuBackend;
        let x = b.from_slice(&[1.0, 2.0, 3.0, 4.0], &[1, 1, 4]).unwrap();
        let y = b.rope(&x, &[7], None, 4, 10000.0, 1.0).unwrap();
        let v = b.to_vec(&y).unwrap();
        let norm_in = 30.0f32;
        let norm_out: f32 = v.iter().map(|a| a * a).sum();
        assert!((norm_in - norm_out).abs() < 1e-3);
    }

    #[test]
    fn grouped_attention_repeats_kv_heads() {
        let b = CpuBackend;
        // 2 query heads share 1 kv head
        let q = b
            .from_slice(&[1.0, 0.0, 0.0, 1.0], &[1, 2, 2])
            .unwrap();
        let k = b.from_slice(&[1.0, 0.0], &[1, 1, 2]).unwrap();
        let v = b.from_slice(&[5.0, 7.0], &[1, 1, 2]).unwrap();
        let out = b.attention(&q, &k, &v, 1.0, None).unwrap();
        // single kv position: both heads return v exactly
        assert_eq!(b.to_vec(&out).unwrap(), vec![5.0, 7.0, 5.0, 7.0]);
    }

    #[test]
    fn attention_mask_blocks_future() {
        let b = CpuBackend;
        let q = b.from_slice(&[1.0, 1.0], &[2, 1, 1]).unwrap();
        let k = b.from_slice(&[1.0, 1.0], &[2, 1, 1]).unwrap();
        let v = b.from_slice(&[1.0, 3.0], &[2, 1, 1]).unwrap();
        let mask = b
            .from_slice(&[0.0, f32::NEG_INFINITY, 0.0, 0.0], &[2, 2])
            .unwrap();
        let out = b.attention(&q, &k, &v, 1.0, Some(&mask)).unwrap();
        let out = b.to_vec(&out).unwrap();
        // first query sees only the first value
        assert!((out[0] - 1.0).abs() < 1e-6);
        // second sees both equally
        assert!((out[1] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn batched_matmul_broadcasts_groups() {
        let b = CpuBackend;
        let a = b
            .from_slice(&[1.0, 0.0, 0.0, 1.0], &[2, 1, 2])
            .unwrap();
        let c = b.from_slice(&[3.0, 4.0], &[1, 2, 1]).unwrap();
        let out = b.matmul(&a, &c).unwrap();
        assert_eq!(out.0.shape(), &[2, 1, 1]);
        assert_eq!(b.to_vec(&out).unwrap(), vec![3.0, 4.0]);
    }
}
