//! Token vocabulary with special-token classification

use anyhow::{bail, Result};
use std::collections::HashMap;

/// The classification of one vocabulary entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    /// An ordinary subword piece
    Normal,
    /// The unknown-token placeholder
    Unknown,
    /// A control token, e.g. BOS/EOS
    Control,
    /// A user-defined token emitted verbatim
    UserDefined,
    /// A reserved but unused slot
    Unused,
    /// A raw byte fallback token, `<0xNN>`
    Byte,
}

/// Special tokens addressable by role rather than id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Special {
    /// Beginning of sequence
    Bos,
    /// End of sequence
    Eos,
}

/// Token ↔ id lookup backed by parallel value/type/score arrays
#[derive(Debug, Clone)]
pub struct Vocabulary {
    values: Vec<String>,
    types: Vec<TokenType>,
    scores: Vec<f32>,

    bos: i32,
    eos: i32,
    add_bos: bool,
    add_eos: bool,

    index: HashMap<String, i32>,
    special: Vec<String>,
}

impl Vocabulary {
    /// Build a vocabulary from parallel arrays.
    ///
    /// The arrays must have equal length; lookup tables and the special
    /// vocabulary are derived once here.
    pub fn new(
        values: Vec<String>,
        types: Vec<TokenType>,
        scores: Vec<f32>,
        bos: i32,
        eos: i32,
        add_bos: bool,
        add_eos: bool,
    ) -> Result<Self> {
        if values.len() != types.len() || values.len() != scores.len() {
            bail!(
                "mismatched vocabulary arrays: {} values, {} types, {} scores",
                values.len(),
                types.len(),
                scores.len()
            );
        }

        let index = values
            .iter()
            .enumerate()
            .map(|(i, v)| (v.clone(), i as i32))
            .collect();

        let special = values
            .iter()
            .zip(&types)
            .filter(|(_, t)| matches!(t, TokenType::Control | TokenType::UserDefined))
            .map(|(v, _)| v.clone())
            .collect();

        Ok(Self {
            values,
            types,
            scores,
            bos,
            eos,
            add_bos,
            add_eos,
            index,
            special,
        })
    }

    /// Exact string lookup, −1 when absent
    pub fn encode(&self, s: &str) -> i32 {
        self.index.get(s).copied().unwrap_or(-1)
    }

    /// Reverse lookup; raw bytes for byte-type tokens, empty for bad ids
    pub fn decode(&self, id: i32) -> Vec<u8> {
        let Some(i) = self.slot(id) else {
            return Vec::new();
        };

        match self.types[i] {
            TokenType::Byte => parse_byte_token(&self.values[i])
                .map(|b| vec![b])
                .unwrap_or_else(|| self.values[i].clone().into_bytes()),
            _ => self.values[i].clone().into_bytes(),
        }
    }

    /// The score of a token id
    pub fn score(&self, id: i32) -> f32 {
        self.slot(id).map(|i| self.scores[i]).unwrap_or(0.0)
    }

    /// Whether the id plays the given special role
    pub fn is(&self, id: i32, special: Special) -> bool {
        match special {
            Special::Bos => id == self.bos,
            Special::Eos => id == self.eos,
        }
    }

    /// Strings to be matched verbatim before subword encoding
    pub fn special_vocabulary(&self) -> &[String] {
        &self.special
    }

    /// The number of entries
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the vocabulary is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The beginning-of-sequence id
    pub fn bos(&self) -> i32 {
        self.bos
    }

    /// The end-of-sequence id
    pub fn eos(&self) -> i32 {
        self.eos
    }

    /// Whether encoding should prepend BOS
    pub fn add_bos(&self) -> bool {
        self.add_bos
    }

    /// Whether encoding should append EOS
    pub fn add_eos(&self) -> bool {
        self.add_eos
    }

    /// The type of a token id
    pub fn token_type(&self, id: i32) -> Option<TokenType> {
        self.slot(id).map(|i| self.types[i])
    }

    fn slot(&self, id: i32) -> Option<usize> {
        if id < 0 || id as usize >= self.values.len() {
            return None;
        }
        Some(id as usize)
    }
}

/// Parse a `<0xNN>` byte-fallback token value
fn parse_byte_token(s: &str) -> Option<u8> {
    let hex = s.strip_prefix("<0x")?.strip_suffix('>')?;
    u8::from_str_radix(hex, 16).ok()
}
