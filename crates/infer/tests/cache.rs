//! Tests for the key/value cache.

use infer::{Backend, Cache, CpuBackend, LayerKind, Tensor};

fn backend() -> CpuBackend {
    CpuBackend
}

fn kv(b: &CpuBackend, seq: usize, data: &[f32]) -> infer::CpuTensor {
    b.from_slice(data, &[seq, 1, 2]).unwrap()
}

#[test]
fn put_appends_and_masks_causally() {
    let b = backend();
    let mut cache = Cache::new(b, &[LayerKind::SelfAttention]);

    cache.start_forward(&[0, 1]);
    cache.set_layer(0);
    cache
        .put(kv(&b, 2, &[1.0, 2.0, 3.0, 4.0]), kv(&b, 2, &[5.0, 6.0, 7.0, 8.0]))
        .unwrap();

    let (k, v, mask) = cache.get().unwrap();
    assert_eq!(k.dims(), vec![2, 1, 2]);
    assert_eq!(v.dims(), vec![2, 1, 2]);

    let mask = mask.expect("self-attention layers are masked");
    assert_eq!(
        b.to_vec(&mask).unwrap(),
        vec![0.0, f32::NEG_INFINITY, 0.0, 0.0]
    );
}

#[test]
fn incremental_decode_extends_positions() {
    let b = backend();
    let mut cache = Cache::new(b, &[LayerKind::SelfAttention]);

    cache.start_forward(&[0, 1]);
    cache
        .put(kv(&b, 2, &[1.0; 4]), kv(&b, 2, &[1.0; 4]))
        .unwrap();

    cache.start_forward(&[2]);
    cache.put(kv(&b, 1, &[2.0; 2]), kv(&b, 1, &[2.0; 2])).unwrap();

    assert_eq!(cache.positions(0), &[0, 1, 2]);
    let (k, _, mask) = cache.get().unwrap();
    assert_eq!(k.dims(), vec![3, 1, 2]);
    // the new token sees the whole prefix
    assert_eq!(b.to_vec(&mask.unwrap()).unwrap(), vec![0.0, 0.0, 0.0]);
}

#[test]
fn batch_size_mismatch_rejected() {
    let b = backend();
    let mut cache = Cache::new(b, &[LayerKind::SelfAttention]);
    cache.start_forward(&[0]);
    let err = cache
        .put(kv(&b, 2, &[1.0; 4]), kv(&b, 2, &[1.0; 4]))
        .unwrap_err();
    assert!(err.to_string().contains("batch"));
}

#[test]
fn cross_slot_replaces_and_reports_cached() {
    let b = backend();
    let mut cache = Cache::new(b, &[LayerKind::CrossAttention]);
    cache.set_layer(0);
    assert!(!cache.encoder_cached());

    cache.start_forward(&[0]);
    cache
        .put(kv(&b, 2, &[1.0; 4]), kv(&b, 2, &[1.0; 4]))
        .unwrap();
    assert!(cache.encoder_cached());

    // a later encoder pass replaces wholesale rather than appending
    cache
        .put(kv(&b, 3, &[2.0; 6]), kv(&b, 3, &[2.0; 6]))
        .unwrap();
    let (k, _, mask) = cache.get().unwrap();
    assert_eq!(k.dims(), vec![3, 1, 2]);
    assert!(mask.is_none());
}

#[test]
fn shift_re_ropes_keys() {
    let b = backend();
    let mut cache = Cache::new(b, &[LayerKind::SelfAttention]);

    let raw = kv(&b, 1, &[0.3, 0.8]);
    let at_five = b.rope(&raw, &[5], None, 2, 10000.0, 1.0).unwrap();

    cache.start_forward(&[5]);
    cache.put(at_five, kv(&b, 1, &[1.0; 2])).unwrap();
    cache.shift(0, 3, None, 2, 10000.0, 1.0).unwrap();

    assert_eq!(cache.positions(0), &[8]);
    let (k, _, _) = cache.get().unwrap();
    let expected = b.rope(&raw, &[8], None, 2, 10000.0, 1.0).unwrap();
    for (got, want) in b
        .to_vec(&k)
        .unwrap()
        .iter()
        .zip(b.to_vec(&expected).unwrap())
    {
        assert!((got - want).abs() < 1e-5, "{got} vs {want}");
    }
}

#[test]
fn shift_passes_cross_layers_through() {
    let b = backend();
    let mut cache = Cache::new(b, &[LayerKind::CrossAttention]);
    cache.start_forward(&[0]);
    cache.put(kv(&b, 1, &[0.5; 2]), kv(&b, 1, &[0.5; 2])).unwrap();

    let before = b.to_vec(&cache.get().unwrap().0).unwrap();
    cache.shift(0, 4, None, 2, 10000.0, 1.0).unwrap();
    let after = b.to_vec(&cache.get().unwrap().0).unwrap();
    assert_eq!(before, after);
}

#[test]
fn clear_resets_all_slots() {
    let b = backend();
    let mut cache = Cache::new(b, &[LayerKind::SelfAttention, LayerKind::CrossAttention]);
    cache.start_forward(&[0]);
    cache.put(kv(&b, 1, &[1.0; 2]), kv(&b, 1, &[1.0; 2])).unwrap();
    cache.set_layer(1);
    cache.put(kv(&b, 1, &[1.0; 2]), kv(&b, 1, &[1.0; 2])).unwrap();

    cache.clear();
    cache.set_layer(0);
    assert!(cache.get().is_err());
    assert!(cache.positions(0).is_empty());
    cache.set_layer(1);
    assert!(!cache.encoder_cached());
}
