//! Tests for SentencePiece encoding.

use tokenizer::{SentencePiece, Special, TokenType, Vocabulary};

/// The tiny scored vocabulary used across these tests.
fn tiny_vocab() -> Vocabulary {
    let entries: Vec<(&str, TokenType, f32)> = vec![
        ("a", TokenType::Normal, -1.0),
        ("b", TokenType::Normal, -1.0),
        ("ab", TokenType::Normal, -0.5),
        ("\u{2581}", TokenType::Normal, -10.0),
    ];
    build(entries, -1, -1, false, false)
}

fn build(
    entries: Vec<(&str, TokenType, f32)>,
    bos: i32,
    eos: i32,
    add_bos: bool,
    add_eos: bool,
) -> Vocabulary {
    let values = entries.iter().map(|(v, _, _)| v.to_string()).collect();
    let types = entries.iter().map(|(_, t, _)| *t).collect();
    let scores = entries.iter().map(|(_, _, s)| *s).collect();
    Vocabulary::new(values, types, scores, bos, eos, add_bos, add_eos).unwrap()
}

fn tokenizer(vocab: Vocabulary) -> SentencePiece {
    SentencePiece::new(r"\s?\S+|\s+", vocab).unwrap()
}

#[test]
fn merges_adjacent_pair() {
    let spm = tokenizer(tiny_vocab());
    assert_eq!(spm.encode("ab", false), vec![2]);
}

#[test]
fn whitespace_becomes_sentinel() {
    let spm = tokenizer(tiny_vocab());
    assert_eq!(spm.encode("a b", false), vec![0, 3, 1]);
}

#[test]
fn whole_piece_shortcut() {
    let spm = tokenizer(tiny_vocab());
    // "b" is in the vocabulary directly, no merge loop needed
    assert_eq!(spm.encode("b", false), vec![1]);
}

#[test]
fn decode_round_trip() {
    let spm = tokenizer(tiny_vocab());
    for s in ["a", "b", "ab", "a b", "ab ab", "a ab b"] {
        let ids = spm.encode(s, false);
        assert_eq!(spm.decode(&ids), s, "round trip failed for {s:?}");
    }
}

#[test]
fn encode_is_deterministic() {
    let spm = tokenizer(tiny_vocab());
    let first = spm.encode("ab a b ab", true);
    for _ in 0..16 {
        assert_eq!(spm.encode("ab a b ab", true), first);
    }
}

#[test]
fn tie_break_prefers_left_pair() {
    // "aa" and the concatenations score equally; the left pair must merge
    // first so "aaa" becomes ["aa", "a"], not ["a", "aa"].
    let vocab = build(
        vec![
            ("a", TokenType::Normal, -1.0),
            ("aa", TokenType::Normal, -0.5),
        ],
        -1,
        -1,
        false,
        false,
    );
    let spm = tokenizer(vocab);
    assert_eq!(spm.encode("aaa", false), vec![1, 0]);
}

#[test]
fn special_tokens_split_out() {
    let vocab = build(
        vec![
            ("a", TokenType::Normal, -1.0),
            ("b", TokenType::Normal, -1.0),
            ("<eot>", TokenType::Control, 0.0),
            ("\u{2581}", TokenType::Normal, -10.0),
        ],
        -1,
        -1,
        false,
        false,
    );
    let spm = tokenizer(vocab);
    assert_eq!(spm.encode("a<eot>b", false), vec![0, 2, 1]);
    assert_eq!(spm.encode("<eot><eot>", false), vec![2, 2]);
}

#[test]
fn bos_and_eos_bookends() {
    let vocab = build(
        vec![
            ("<s>", TokenType::Control, 0.0),
            ("</s>", TokenType::Control, 0.0),
            ("a", TokenType::Normal, -1.0),
        ],
        0,
        1,
        true,
        true,
    );
    let spm = tokenizer(vocab);
    assert_eq!(spm.encode("a", true), vec![0, 2, 1]);
    assert_eq!(spm.encode("a", false), vec![2]);
    // empty input gets no bookends
    assert_eq!(spm.encode("", true), Vec::<i32>::new());
}

#[test]
fn special_classification() {
    let vocab = build(
        vec![
            ("<s>", TokenType::Control, 0.0),
            ("</s>", TokenType::Control, 0.0),
            ("a", TokenType::Normal, -1.0),
        ],
        0,
        1,
        true,
        false,
    );
    let spm = tokenizer(vocab);
    assert!(spm.is(0, Special::Bos));
    assert!(spm.is(1, Special::Eos));
    assert!(!spm.is(2, Special::Bos));
}

#[test]
fn byte_tokens_decode_raw() {
    let vocab = build(
        vec![
            ("<0x41>", TokenType::Byte, 0.0),
            ("<0x42>", TokenType::Byte, 0.0),
        ],
        -1,
        -1,
        false,
        false,
    );
    let spm = tokenizer(vocab);
    assert_eq!(spm.decode(&[0, 1]), "AB");
}

#[test]
fn unknown_merge_tokens_are_skipped() {
    // "c" is not in the vocabulary at all; encoding must not fail
    let spm = tokenizer(tiny_vocab());
    assert_eq!(spm.encode("acb", false), vec![0, 1]);
}

#[test]
fn invalid_pattern_is_a_construction_error() {
    assert!(SentencePiece::new(r"(unclosed", tiny_vocab()).is_err());
}

#[test]
fn vocabulary_length_mismatch_rejected() {
    let result = Vocabulary::new(
        vec!["a".into(), "b".into()],
        vec![TokenType::Normal],
        vec![-1.0, -1.0],
        -1,
        -1,
        false,
        false,
    );
    assert!(result.is_err());
}

#[test]
fn out_of_range_ids() {
    let vocab = tiny_vocab();
    assert_eq!(vocab.encode("zzz"), -1);
    assert!(vocab.decode(99).is_empty());
    assert!(vocab.decode(-1).is_empty());
}
