//! Lexical layer: source text, character rules, tokens and the two
//! tokenizers, plus entity resolution.

pub mod chars;
pub mod dtd_tokenizer;
pub mod entities;
pub mod source;
pub mod token;
pub mod tokenizer;
