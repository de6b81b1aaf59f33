//! Shared fixtures: an on-disk store and a minimal GGUF writer.

use std::fs;
use std::path::Path;
use store::ModelStore;
use tcore::{Digest, Layer, Manifest, MediaType, ModelName};

pub fn test_store() -> (tempfile::TempDir, ModelStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = ModelStore::new(dir.path());
    fs::create_dir_all(store.blobs_dir()).unwrap();
    fs::create_dir_all(store.manifests_dir()).unwrap();
    (dir, store)
}

pub fn put_blob(store: &ModelStore, bytes: &[u8]) -> Digest {
    let digest = Digest::of(bytes);
    fs::write(store.blob_path(&digest), bytes).unwrap();
    digest
}

pub fn layer(media_type: MediaType, digest: &Digest, size: u64) -> Layer {
    Layer {
        media_type: media_type.as_str().into(),
        digest: digest.clone(),
        size,
        from: None,
    }
}

pub fn install(store: &ModelStore, name: &ModelName, config: &Digest, layers: Vec<Layer>) {
    let manifest = Manifest {
        schema_version: 2,
        media_type: tcore::manifest::MANIFEST_MEDIA_TYPE.into(),
        config: Layer {
            media_type: "application/vnd.docker.container.image.v1+json".into(),
            digest: config.clone(),
            size: 0,
            from: None,
        },
        layers,
    };
    store.write_manifest(name, &manifest).unwrap();
}

/// A metadata value for the GGUF writer
pub enum Val {
    U32(u32),
    F32(f32),
    Bool(bool),
    Str(&'static str),
    U32Array(Vec<u32>),
    F32Array(Vec<f32>),
    StrArray(Vec<&'static str>),
}

/// Write a tensorless GGUF v3 file holding only a metadata table
pub fn write_gguf(path: &Path, entries: &[(&str, Val)]) {
    let mut out = Vec::new();
    out.extend(0x4655_4747u32.to_le_bytes()); // GGUF
    out.extend(3u32.to_le_bytes()); // version
    out.extend(0u64.to_le_bytes()); // tensor count
    out.extend((entries.len() as u64).to_le_bytes());

    for (key, value) in entries {
        write_string(&mut out, key);
        match value {
            Val::U32(v) => {
                out.extend(4u32.to_le_bytes());
                out.extend(v.to_le_bytes());
            }
            Val::F32(v) => {
                out.extend(6u32.to_le_bytes());
                out.extend(v.to_le_bytes());
            }
            Val::Str(v) => {
                out.extend(8u32.to_le_bytes());
                write_string(&mut out, v);
            }
            Val::Bool(v) => {
                out.extend(7u32.to_le_bytes());
                out.push(*v as u8);
            }
            Val::U32Array(vs) => {
                out.extend(9u32.to_le_bytes());
                out.extend(4u32.to_le_bytes()); // element type
                out.extend((vs.len() as u64).to_le_bytes());
                for v in vs {
                    out.extend(v.to_le_bytes());
                }
            }
            Val::F32Array(vs) => {
                out.extend(9u32.to_le_bytes());
                out.extend(6u32.to_le_bytes());
                out.extend((vs.len() as u64).to_le_bytes());
                for v in vs {
                    out.extend(v.to_le_bytes());
                }
            }
            Val::StrArray(vs) => {
                out.extend(9u32.to_le_bytes());
                out.extend(8u32.to_le_bytes());
                out.extend((vs.len() as u64).to_le_bytes());
                for v in vs {
                    write_string(&mut out, v);
                }
            }
        }
    }

    fs::write(path, out).unwrap();
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.extend((s.len() as u64).to_le_bytes());
    out.extend(s.as_bytes());
}

/// The standard tiny llama metadata table
pub fn llama_entries(pooling: bool) -> Vec<(&'static str, Val)> {
    let mut entries = vec![
        ("general.architecture", Val::Str("llama")),
        ("llama.block_count", Val::U32(2)),
        ("llama.embedding_length", Val::U32(4)),
        ("llama.attention.head_count", Val::U32(2)),
        ("llama.attention.head_count_kv", Val::U32(1)),
        ("llama.attention.layer_norm_rms_epsilon", Val::F32(1e-5)),
        ("llama.rope.freq_base", Val::F32(10000.0)),
        ("llama.rope.dimension_count", Val::U32(2)),
        (
            "llama.attention.cross_attention_layers",
            Val::U32Array(vec![1]),
        ),
    ];
    if pooling {
        entries.push(("llama.pooling_type", Val::U32(1)));
    }
    entries
}
