//! Transformer decoder cores over a pluggable compute backend

pub use crate::{
    backend::{Backend, Tensor},
    cache::{Cache, LayerKind},
    cpu::{CpuBackend, CpuTensor},
    layer::{
        CrossAttention, CrossDecoderLayer, DecoderLayer, Linear, Mlp, RmsNorm, SelfAttention,
        SelfDecoderLayer,
    },
    model::{TextConfig, TextModel},
};

mod backend;
mod cache;
mod cpu;
mod layer;
mod model;
