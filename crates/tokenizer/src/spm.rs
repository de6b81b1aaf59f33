//! SentencePiece-style subword encoding

use crate::{Special, TokenType, Vocabulary};
use anyhow::{Context, Result};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::{debug, warn};

/// The whitespace sentinel, U+2581
const WHITESPACE_SEP: &str = "\u{2581}";

/// A SentencePiece byte-pair tokenizer over a scored vocabulary
#[derive(Debug, Clone)]
pub struct SentencePiece {
    pre: Regex,
    vocab: Vocabulary,
    max_token_len: usize,
}

impl SentencePiece {
    /// Build a tokenizer from a pre-tokenization pattern and a vocabulary.
    ///
    /// The pattern is the model's own configuration string; failing to
    /// compile it is a construction error.
    pub fn new(pre: &str, vocab: Vocabulary) -> Result<Self> {
        let pre = Regex::new(pre)
            .with_context(|| format!("invalid pre-tokenization pattern {pre:?}"))?;

        let max_token_len = (0..vocab.len() as i32)
            .filter(|&id| {
                matches!(
                    vocab.token_type(id),
                    Some(TokenType::Normal | TokenType::UserDefined | TokenType::Unused)
                )
            })
            .map(|id| vocab.decode(id).len())
            .max()
            .unwrap_or(0);
        debug!(tokens = vocab.len(), max_token_len, "built tokenizer");

        Ok(Self {
            pre,
            vocab,
            max_token_len,
        })
    }

    /// The backing vocabulary
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// The longest mergeable token, in bytes
    pub fn max_token_len(&self) -> usize {
        self.max_token_len
    }

    /// Whether the id plays the given special role
    pub fn is(&self, id: i32, special: Special) -> bool {
        self.vocab.is(id, special)
    }

    /// Encode text into token ids.
    ///
    /// Special tokens are split out verbatim first; remaining fragments go
    /// through pre-tokenization, whitespace substitution, and the BPE merge
    /// loop. With `add_special`, BOS/EOS bookends follow the vocabulary's
    /// flags.
    pub fn encode(&self, s: &str, add_special: bool) -> Vec<i32> {
        let mut fragments = vec![Fragment::text(s)];
        for special in self.vocab.special_vocabulary() {
            let id = self.vocab.encode(special);
            let mut i = 0;
            while i < fragments.len() {
                if !fragments[i].ids.is_empty() {
                    i += 1;
                    continue;
                }

                let Some(at) = fragments[i].value.find(special.as_str()) else {
                    i += 1;
                    continue;
                };

                let frag = fragments.remove(i);
                let mut middle = Vec::with_capacity(3);
                if at > 0 {
                    middle.push(Fragment::text(&frag.value[..at]));
                }
                middle.push(Fragment::encoded(special, id));
                let rest = &frag.value[at + special.len()..];
                if !rest.is_empty() {
                    middle.push(Fragment::text(rest));
                }

                for (j, frag) in middle.into_iter().enumerate() {
                    fragments.insert(i + j, frag);
                }
                i += 1;
            }
        }

        let mut ids = Vec::new();
        for frag in &fragments {
            if !frag.ids.is_empty() {
                ids.extend_from_slice(&frag.ids);
                continue;
            }

            for piece in self.pre.find_iter(&frag.value) {
                let piece = piece.as_str().replace(' ', WHITESPACE_SEP);

                let id = self.vocab.encode(&piece);
                if id >= 0 {
                    ids.push(id);
                    continue;
                }

                self.merge(&piece, &mut ids);
            }
        }

        if add_special && !ids.is_empty() {
            if self.vocab.add_bos() {
                if ids[0] == self.vocab.bos() {
                    warn!(id = self.vocab.bos(), "prompt already begins with bos token");
                }
                ids.insert(0, self.vocab.bos());
            }
            if self.vocab.add_eos() {
                if *ids.last().unwrap() == self.vocab.eos() {
                    warn!(id = self.vocab.eos(), "prompt already ends with eos token");
                }
                ids.push(self.vocab.eos());
            }
        }

        ids
    }

    /// Run the merge loop over one pre-tokenized piece
    fn merge(&self, piece: &str, ids: &mut Vec<i32>) {
        let runes: Vec<char> = piece.chars().collect();
        let mut merges: Vec<Merge> = runes
            .iter()
            .enumerate()
            .map(|(r, &c)| Merge {
                prev: r as isize - 1,
                next: r + 1,
                runes: vec![c],
            })
            .collect();

        let pairwise = |merges: &[Merge], a: isize, b: usize| -> Option<Candidate> {
            if a < 0 || b >= merges.len() {
                return None;
            }
            let mut joined = String::new();
            joined.extend(&merges[a as usize].runes);
            joined.extend(&merges[b].runes);
            let id = self.vocab.encode(&joined);
            if id < 0 {
                return None;
            }
            Some(Candidate {
                a: a as usize,
                b,
                score: self.vocab.score(id),
            })
        };

        let mut queue = BinaryHeap::new();
        for i in 0..runes.len().saturating_sub(1) {
            if let Some(pair) = pairwise(&merges, i as isize, i + 1) {
                queue.push(pair);
            }
        }

        while let Some(pair) = queue.pop() {
            if merges[pair.a].runes.is_empty() || merges[pair.b].runes.is_empty() {
                continue;
            }

            let mut joined = String::new();
            joined.extend(&merges[pair.a].runes);
            joined.extend(&merges[pair.b].runes);
            if self.vocab.encode(&joined) < 0 {
                continue;
            }

            let right = std::mem::take(&mut merges[pair.b].runes);
            merges[pair.a].runes.extend(right);
            let right_next = merges[pair.b].next;
            merges[pair.a].next = right_next;
            if right_next < merges.len() {
                merges[right_next].prev = pair.a as isize;
            }

            if let Some(pair) = pairwise(&merges, merges[pair.a].prev, pair.a) {
                queue.push(pair);
            }
            if let Some(next) = pairwise(&merges, pair.a as isize, merges[pair.a].next) {
                queue.push(next);
            }
        }

        for merge in &merges {
            if merge.runes.is_empty() {
                continue;
            }
            let piece: String = merge.runes.iter().collect();
            match self.vocab.encode(&piece) {
                id if id >= 0 => ids.push(id),
                _ => debug!(token = %piece, "missing token after merge"),
            }
        }
    }

    /// Decode ids back into text, restoring plain whitespace
    pub fn decode(&self, ids: &[i32]) -> String {
        let mut bytes = Vec::new();
        for &id in ids {
            bytes.extend(self.vocab.decode(id));
        }
        String::from_utf8_lossy(&bytes).replace(WHITESPACE_SEP, " ")
    }
}

/// A stretch of input, pre-encoded when it was split out as a special token
#[derive(Debug)]
struct Fragment {
    value: String,
    ids: Vec<i32>,
}

impl Fragment {
    fn text(value: &str) -> Self {
        Self {
            value: value.to_string(),
            ids: Vec::new(),
        }
    }

    fn encoded(value: &str, id: i32) -> Self {
        Self {
            value: value.to_string(),
            ids: vec![id],
        }
    }
}

/// A node of the doubly-linked rune list built during merging
#[derive(Debug)]
struct Merge {
    prev: isize,
    next: usize,
    runes: Vec<char>,
}

/// A mergeable adjacent pair, ordered by score then left index
#[derive(Debug, Clone, Copy)]
struct Candidate {
    a: usize,
    b: usize,
    score: f32,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // highest score wins, ties broken by the lower left index
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.a.cmp(&self.a))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}
