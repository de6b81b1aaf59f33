//! GGUF metadata access for loaded weight files

use anyhow::{Context, Result};
use candle_core::quantized::gguf_file::{Content, Value};
use infer::TextConfig;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tokenizer::{SentencePiece, TokenType, Vocabulary};

/// Read the metadata table from a GGUF file, skipping tensor data
pub fn metadata(path: &Path) -> Result<HashMap<String, Value>> {
    let mut file = File::open(path)
        .with_context(|| format!("open weight file {}", path.display()))?;
    let content = Content::read(&mut file)
        .with_context(|| format!("decode gguf header {}", path.display()))?;
    Ok(content.metadata)
}

/// The architecture name the file declares
pub fn architecture(md: &HashMap<String, Value>) -> Result<String> {
    Ok(md
        .get("general.architecture")
        .context("gguf missing general.architecture")?
        .to_string()?
        .clone())
}

/// Whether the file describes a pooling-only embedding model
pub fn is_pooling_only(md: &HashMap<String, Value>) -> bool {
    match architecture(md) {
        Ok(arch) => md.contains_key(&format!("{arch}.pooling_type")),
        Err(_) => false,
    }
}

/// Assemble the decoder hyperparameters from the metadata table
pub fn text_config(md: &HashMap<String, Value>) -> Result<TextConfig> {
    let arch = architecture(md)?;
    let key = |suffix: &str| format!("{arch}.{suffix}");

    let hidden_size = get_u32(md, &key("embedding_length"))
        .context("gguf missing embedding_length")? as usize;
    let n_heads =
        get_u32(md, &key("attention.head_count")).context("gguf missing head_count")? as usize;

    Ok(TextConfig {
        block_count: get_u32(md, &key("block_count")).context("gguf missing block_count")?
            as usize,
        hidden_size,
        n_heads,
        n_kv_heads: get_u32(md, &key("attention.head_count_kv")).unwrap_or(n_heads as u32)
            as usize,
        rms_eps: get_f32(md, &key("attention.layer_norm_rms_epsilon")).unwrap_or(1e-5),
        rope_dim: get_u32(md, &key("rope.dimension_count"))
            .unwrap_or((hidden_size / n_heads) as u32),
        rope_base: get_f32(md, &key("rope.freq_base")).unwrap_or(10000.0),
        rope_scale: get_f32(md, &key("rope.freq_scale")).unwrap_or(1.0),
        cross_attention_layers: get_u32s(md, &key("attention.cross_attention_layers")),
    })
}

/// Build the tokenizer vocabulary from the metadata table.
///
/// Token values, scores, and types come from the `tokenizer.ggml.*` keys;
/// missing score or type arrays fall back to zeros and `Normal`.
pub fn vocabulary(md: &HashMap<String, Value>) -> Result<Vocabulary> {
    let values: Vec<String> = match md.get("tokenizer.ggml.tokens") {
        Some(Value::Array(vals)) => vals
            .iter()
            .filter_map(|v| v.to_string().ok().cloned())
            .collect(),
        _ => anyhow::bail!("gguf missing tokenizer.ggml.tokens"),
    };

    let scores: Vec<f32> = match md.get("tokenizer.ggml.scores") {
        Some(Value::Array(vals)) => vals.iter().filter_map(|v| v.to_f32().ok()).collect(),
        _ => vec![0.0; values.len()],
    };

    let types: Vec<TokenType> = match md.get("tokenizer.ggml.token_type") {
        Some(Value::Array(vals)) => vals
            .iter()
            .map(|v| match int_of(v) {
                Some(2) => TokenType::Unknown,
                Some(3) => TokenType::Control,
                Some(4) => TokenType::UserDefined,
                Some(5) => TokenType::Unused,
                Some(6) => TokenType::Byte,
                _ => TokenType::Normal,
            })
            .collect(),
        _ => vec![TokenType::Normal; values.len()],
    };

    Vocabulary::new(
        values,
        types,
        scores,
        get_int(md, "tokenizer.ggml.bos_token_id").unwrap_or(-1) as i32,
        get_int(md, "tokenizer.ggml.eos_token_id").unwrap_or(-1) as i32,
        get_bool(md, "tokenizer.ggml.add_bos_token").unwrap_or(false),
        get_bool(md, "tokenizer.ggml.add_eos_token").unwrap_or(false),
    )
}

/// Build the text processor for a weight file.
///
/// The pre-tokenization pattern comes from the model implementation, not
/// the file; each architecture supplies its own.
pub fn text_processor(md: &HashMap<String, Value>, pre: &str) -> Result<SentencePiece> {
    SentencePiece::new(pre, vocabulary(md)?)
}

fn get_u32(md: &HashMap<String, Value>, key: &str) -> Option<u32> {
    md.get(key).and_then(|v| v.to_u32().ok())
}

fn get_f32(md: &HashMap<String, Value>, key: &str) -> Option<f32> {
    md.get(key).and_then(|v| v.to_f32().ok())
}

fn get_int(md: &HashMap<String, Value>, key: &str) -> Option<i64> {
    md.get(key).and_then(int_of)
}

fn get_bool(md: &HashMap<String, Value>, key: &str) -> Option<bool> {
    match md.get(key) {
        Some(Value::Bool(b)) => Some(*b),
        _ => None,
    }
}

/// Integer metadata values come in whatever width the converter chose
fn int_of(v: &Value) -> Option<i64> {
    match v {
        Value::U8(v) => Some(*v as i64),
        Value::I8(v) => Some(*v as i64),
        Value::U16(v) => Some(*v as i64),
        Value::I16(v) => Some(*v as i64),
        Value::U32(v) => Some(*v as i64),
        Value::I32(v) => Some(*v as i64),
        Value::U64(v) => Some(*v as i64),
        Value::I64(v) => Some(*v),
        _ => None,
    }
}

fn get_u32s(md: &HashMap<String, Value>, key: &str) -> Vec<u32> {
    match md.get(key) {
        Some(Value::Array(values)) => values.iter().filter_map(|v| v.to_u32().ok()).collect(),
        _ => Vec::new(),
    }
}
