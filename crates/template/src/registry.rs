//! Built-in named templates

use anyhow::{bail, Result};
use std::sync::OnceLock;

/// A built-in template with its metadata
#[derive(Debug, Clone)]
pub struct Named {
    /// The template name
    pub name: &'static str,

    /// The template source, line endings normalized
    pub source: String,

    /// Stop sequences bundled with the template
    pub stop: Vec<String>,
}

/// The raw built-in table: name, source, stop sequences
const BUILTINS: &[(&str, &str, &[&str])] = &[
    (
        "chatml",
        "{{ if .System }}<|im_start|>system\n{{ .System }}<|im_end|>\n{{ end }}{{ if .Prompt }}<|im_start|>user\n{{ .Prompt }}<|im_end|>\n{{ end }}<|im_start|>assistant\n{{ .Response }}<|im_end|>\n",
        &["<|im_start|>", "<|im_end|>"],
    ),
    (
        "llama2-chat",
        "[INST] <<SYS>>{{ .System }}<</SYS>>\n\n{{ .Prompt }} [/INST] {{ .Response }}",
        &["[INST]", "[/INST]", "<<SYS>>", "<</SYS>>"],
    ),
    (
        "llama3-instruct",
        "{{ if .System }}<|start_header_id|>system<|end_header_id|>\n\n{{ .System }}<|eot_id|>{{ end }}{{ if .Prompt }}<|start_header_id|>user<|end_header_id|>\n\n{{ .Prompt }}<|eot_id|>{{ end }}<|start_header_id|>assistant<|end_header_id|>\n\n{{ .Response }}<|eot_id|>",
        &["<|start_header_id|>", "<|end_header_id|>", "<|eot_id|>"],
    ),
    (
        "alpaca",
        "{{ if .System }}{{ .System }}\n\n{{ end }}### Instruction:\n{{ .Prompt }}\n\n### Response:\n{{ .Response }}",
        &["### Instruction:", "### Response:"],
    ),
    (
        "zephyr",
        "{{ if .System }}<|system|>\n{{ .System }}</s>\n{{ end }}{{ if .Prompt }}<|user|>\n{{ .Prompt }}</s>\n{{ end }}<|assistant|>\n{{ .Response }}</s>\n",
        &["<|system|>", "<|user|>", "<|assistant|>", "</s>"],
    ),
    (
        "gemma-instruct",
        "<start_of_turn>user\n{{ if .System }}{{ .System }}\n\n{{ end }}{{ .Prompt }}<end_of_turn>\n<start_of_turn>model\n{{ .Response }}<end_of_turn>\n",
        &["<start_of_turn>", "<end_of_turn>"],
    ),
];

/// Sources farther than this are not considered a match
const MAX_DISTANCE: usize = 100;

/// The process-wide template table, built once and read-only after
fn registry() -> &'static [Named] {
    static REGISTRY: OnceLock<Vec<Named>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        BUILTINS
            .iter()
            .map(|(name, source, stop)| Named {
                name,
                source: source.replace("\r\n", "\n"),
                stop: stop.iter().map(|s| s.to_string()).collect(),
            })
            .collect()
    })
}

/// Look up the closest built-in template by edit distance.
///
/// Model packages often embed lightly-edited copies of well-known templates;
/// matching tolerates small diffs but rejects anything farther than the
/// distance cap.
pub fn named(source: &str) -> Result<&'static Named> {
    let source = source.replace("\r\n", "\n");
    let best = registry()
        .iter()
        .map(|t| (strsim::levenshtein(&source, &t.source), t))
        .min_by_key(|(dist, _)| *dist);

    match best {
        Some((dist, t)) if dist < MAX_DISTANCE => Ok(t),
        _ => bail!("no matching template found"),
    }
}
