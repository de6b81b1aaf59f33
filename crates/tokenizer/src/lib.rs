//! Byte/subword tokenization for model prompts

pub use crate::{
    spm::SentencePiece,
    vocab::{Special, TokenType, Vocabulary},
};

mod spm;
mod vocab;
