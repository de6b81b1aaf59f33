//! Tests for capability checks and GGUF metadata reading.

mod common;

use common::{install, layer, llama_entries, put_blob, test_store, write_gguf};
use model::{gguf, Capability};
use tcore::{MediaType, ModelName};

fn name() -> ModelName {
    ModelName::parse("registry.example.com/acme/tiny:latest").unwrap()
}

fn loaded_with_template(source: &[u8]) -> model::Model {
    let (dir, store) = test_store();
    let config = put_blob(&store, b"{}");
    let tmpl = put_blob(&store, source);
    let n = name();
    install(&store, &n, &config, vec![layer(MediaType::Template, &tmpl, 0)]);
    let m = model::load(&store, &n).unwrap();
    drop(dir);
    m
}

#[test]
fn tools_capability_requires_template_variable() {
    let m = loaded_with_template(b"{{ .Prompt }}");
    let err = m.check_capabilities(&[Capability::Tools]).unwrap_err();
    let msg = err.to_string();
    assert!(msg.starts_with("does not support"), "{msg}");
    assert!(msg.contains("tools"), "{msg}");
}

#[test]
fn tools_capability_passes_with_variable() {
    let m = loaded_with_template(
        b"{{ if .Tools }}{{ range .Tools }}{{ json .Function }}{{ end }}{{ end }}{{ .Prompt }}{{ .Response }}",
    );
    m.check_capabilities(&[Capability::Tools]).unwrap();
}

#[test]
fn insert_capability_requires_suffix() {
    let m = loaded_with_template(b"{{ .Prompt }}");
    assert!(m.check_capabilities(&[Capability::Insert]).is_err());

    let m = loaded_with_template(b"<PRE>{{ .Prompt }}<SUF>{{ .Suffix }}<MID>{{ .Response }}");
    m.check_capabilities(&[Capability::Insert]).unwrap();
}

#[test]
fn missing_capabilities_join_into_one_error() {
    let m = loaded_with_template(b"{{ .Prompt }}");
    let err = m
        .check_capabilities(&[Capability::Tools, Capability::Insert])
        .unwrap_err();
    assert_eq!(err.to_string(), "does not support tools insert");
}

#[test]
fn unknown_capability_name_rejected() {
    let err = Capability::parse("telepathy").unwrap_err();
    assert!(err.to_string().contains("unknown capability"));
    assert_eq!(Capability::parse("tools").unwrap(), Capability::Tools);
}

#[test]
fn pooling_only_models_lack_completion() {
    let dir = tempfile::tempdir().unwrap();
    let weights = dir.path().join("embedder.gguf");
    write_gguf(&weights, &llama_entries(true));

    let mut m = loaded_with_template(b"{{ .Prompt }}{{ .Response }}");
    m.model_path = Some(weights);

    let err = m.check_capabilities(&[Capability::Completion]).unwrap_err();
    assert!(err.to_string().contains("completion"));
}

#[test]
fn generative_models_support_completion() {
    let dir = tempfile::tempdir().unwrap();
    let weights = dir.path().join("model.gguf");
    write_gguf(&weights, &llama_entries(false));

    let mut m = loaded_with_template(b"{{ .Prompt }}{{ .Response }}");
    m.model_path = Some(weights);
    m.check_capabilities(&[Capability::Completion]).unwrap();
}

#[test]
fn text_config_reads_gguf_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let weights = dir.path().join("model.gguf");
    write_gguf(&weights, &llama_entries(false));

    let md = gguf::metadata(&weights).unwrap();
    assert_eq!(gguf::architecture(&md).unwrap(), "llama");
    assert!(!gguf::is_pooling_only(&md));

    let config = gguf::text_config(&md).unwrap();
    assert_eq!(config.block_count, 2);
    assert_eq!(config.hidden_size, 4);
    assert_eq!(config.n_heads, 2);
    assert_eq!(config.n_kv_heads, 1);
    assert_eq!(config.rope_dim, 2);
    assert_eq!(config.cross_attention_layers, vec![1]);
}

#[test]
fn vocabulary_builds_from_gguf_metadata() {
    use common::Val;

    let dir = tempfile::tempdir().unwrap();
    let weights = dir.path().join("model.gguf");
    let mut entries = llama_entries(false);
    entries.push((
        "tokenizer.ggml.tokens",
        Val::StrArray(vec!["<s>", "</s>", "a", "b", "ab", "\u{2581}"]),
    ));
    entries.push((
        "tokenizer.ggml.scores",
        Val::F32Array(vec![0.0, 0.0, -1.0, -1.0, -0.5, -10.0]),
    ));
    entries.push((
        "tokenizer.ggml.token_type",
        Val::U32Array(vec![3, 3, 1, 1, 1, 1]),
    ));
    entries.push(("tokenizer.ggml.bos_token_id", Val::U32(0)));
    entries.push(("tokenizer.ggml.eos_token_id", Val::U32(1)));
    entries.push(("tokenizer.ggml.add_bos_token", Val::Bool(true)));
    entries.push(("tokenizer.ggml.add_eos_token", Val::Bool(false)));
    write_gguf(&weights, &entries);

    let md = gguf::metadata(&weights).unwrap();
    let vocab = gguf::vocabulary(&md).unwrap();
    assert_eq!(vocab.len(), 6);
    assert_eq!(vocab.encode("ab"), 4);
    assert_eq!(vocab.bos(), 0);
    assert_eq!(vocab.eos(), 1);
    assert!(vocab.add_bos());
    assert!(!vocab.add_eos());
    assert_eq!(vocab.special_vocabulary(), ["<s>", "</s>"]);

    // the assembled processor tokenizes with the packaged scores
    let spm = gguf::text_processor(&md, r"\s?\S+|\s+").unwrap();
    assert_eq!(spm.encode("a b", false), vec![2, 5, 3]);
    assert_eq!(spm.encode("ab", true), vec![0, 4]);
}

#[test]
fn pooling_flag_detected() {
    let dir = tempfile::tempdir().unwrap();
    let weights = dir.path().join("embedder.gguf");
    write_gguf(&weights, &llama_entries(true));

    let md = gguf::metadata(&weights).unwrap();
    assert!(gguf::is_pooling_only(&md));
}
