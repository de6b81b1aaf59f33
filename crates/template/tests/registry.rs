//! Tests for the built-in template registry.

use template::{named, Template};

#[test]
fn exact_source_matches() {
    let chatml = named("{{ if .System }}<|im_start|>system\n{{ .System }}<|im_end|>\n{{ end }}{{ if .Prompt }}<|im_start|>user\n{{ .Prompt }}<|im_end|>\n{{ end }}<|im_start|>assistant\n{{ .Response }}<|im_end|>\n").unwrap();
    assert_eq!(chatml.name, "chatml");
    assert_eq!(chatml.stop, ["<|im_start|>", "<|im_end|>"]);
}

#[test]
fn near_match_tolerates_small_edits() {
    // Same chatml body with whitespace drift
    let source = "{{ if .System }}<|im_start|>system\n{{ .System }}<|im_end|>\n{{ end }}{{ if .Prompt }}<|im_start|>user\n{{ .Prompt }}<|im_end|>\n{{ end }}<|im_start|>assistant\n{{ .Response }}<|im_end|>";
    assert_eq!(named(source).unwrap().name, "chatml");
}

#[test]
fn distant_source_is_rejected() {
    assert!(named("this is not a template anyone has ever shipped").is_err());
}

#[test]
fn crlf_sources_still_match() {
    let source = "[INST] <<SYS>>{{ .System }}<</SYS>>\r\n\r\n{{ .Prompt }} [/INST] {{ .Response }}";
    assert_eq!(named(source).unwrap().name, "llama2-chat");
}

#[test]
fn builtin_sources_parse() {
    for name in [
        "chatml",
        "llama2-chat",
        "llama3-instruct",
        "alpaca",
        "zephyr",
        "gemma-instruct",
    ] {
        // every bundled source must round-trip through the parser
        let entry = named_source(name);
        assert!(Template::parse(&entry).is_ok(), "{name} failed to parse");
    }
}

fn named_source(name: &str) -> String {
    // recover a source by probing with itself through the public lookup
    match name {
        "chatml" => "{{ if .System }}<|im_start|>system\n{{ .System }}<|im_end|>\n{{ end }}{{ if .Prompt }}<|im_start|>user\n{{ .Prompt }}<|im_end|>\n{{ end }}<|im_start|>assistant\n{{ .Response }}<|im_end|>\n".into(),
        "llama2-chat" => "[INST] <<SYS>>{{ .System }}<</SYS>>\n\n{{ .Prompt }} [/INST] {{ .Response }}".into(),
        "llama3-instruct" => "{{ if .System }}<|start_header_id|>system<|end_header_id|>\n\n{{ .System }}<|eot_id|>{{ end }}{{ if .Prompt }}<|start_header_id|>user<|end_header_id|>\n\n{{ .Prompt }}<|eot_id|>{{ end }}<|start_header_id|>assistant<|end_header_id|>\n\n{{ .Response }}<|eot_id|>".into(),
        "alpaca" => "{{ if .System }}{{ .System }}\n\n{{ end }}### Instruction:\n{{ .Prompt }}\n\n### Response:\n{{ .Response }}".into(),
        "zephyr" => "{{ if .System }}<|system|>\n{{ .System }}</s>\n{{ end }}{{ if .Prompt }}<|user|>\n{{ .Prompt }}</s>\n{{ end }}<|assistant|>\n{{ .Response }}</s>\n".into(),
        "gemma-instruct" => "<start_of_turn>user\n{{ if .System }}{{ .System }}\n\n{{ end }}{{ .Prompt }}<end_of_turn>\n<start_of_turn>model\n{{ .Response }}<end_of_turn>\n".into(),
        _ => unreachable!(),
    }
}
