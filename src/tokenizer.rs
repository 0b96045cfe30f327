// tokenizer.rs
// Description: Reversible word and symbol tokenizer. Builds a first seen vocabulary with a
//              padding token at index 0, encodes texts to fixed length id sequences and decodes
//              network outputs back to text. Vocabulary save and load.
// History:
// - 2026-02-01: Consolidate project into 6 files: main, layer, train, math, tokenizer, utils.
// - 2026-02-03: Replace BPE with a regex word and symbol tokenizer.
// - 2026-02-05: Add join modes and multi row decoding.
// Author: Marcus Schlieper

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::utils;

pub const S_PAD: &str = "<PAD>";
pub const I_PAD: usize = 0;
pub const VOCAB_SUFFIX: &str = ".nqv";

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Words, or any single other character (spaces and punctuation included).
    PATTERN.get_or_init(|| Regex::new(r"\w+|[^\w]").expect("token pattern is valid"))
}

fn word_start_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\w").expect("word start pattern is valid"))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinMode {
    /// Space before word tokens only, symbols attach directly.
    #[default]
    WordAware,
    /// Single space between all tokens.
    Space,
    /// No separator.
    Concat,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizerConfig {
    pub b_lowercase: bool,
    pub join_mode: JoinMode,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tokenizer {
    pub config: TokenizerConfig,
    tokens: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    max_sequence_length: usize,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(TokenizerConfig::default())
    }
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Self {
        let mut tokenizer = Self {
            config,
            tokens: Vec::new(),
            index: HashMap::new(),
            max_sequence_length: 0,
        };
        tokenizer.push_token(S_PAD);
        tokenizer
    }

    fn push_token(&mut self, s_token: &str) {
        if !self.index.contains_key(s_token) {
            self.index.insert(s_token.to_string(), self.tokens.len());
            self.tokens.push(s_token.to_string());
        }
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .tokens
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i))
            .collect();
    }

    pub fn split_tokens(&self, s_text: &str) -> Vec<String> {
        let s_source = if self.config.b_lowercase {
            s_text.to_lowercase()
        } else {
            s_text.to_string()
        };
        token_pattern()
            .find_iter(&s_source)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// Adds unseen tokens in first seen order and grows the maximum sequence length.
    /// Sequences encoded earlier are not resized.
    pub fn register<S: AsRef<str>>(&mut self, v_texts: &[S]) {
        for s_text in v_texts.iter() {
            let v_tokens = self.split_tokens(s_text.as_ref());
            self.max_sequence_length = self.max_sequence_length.max(v_tokens.len());
            for s_token in v_tokens.iter() {
                self.push_token(s_token);
            }
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.tokens.len()
    }

    pub fn max_sequence_length(&self) -> usize {
        self.max_sequence_length
    }

    pub fn token(&self, i_index: usize) -> Option<&str> {
        self.tokens.get(i_index).map(|s| s.as_str())
    }

    pub fn index_of(&self, s_token: &str) -> Option<usize> {
        self.index.get(s_token).copied()
    }

    /// Ids without padding. Unknown tokens map to the padding id.
    pub fn encode_unpadded(&self, s_text: &str) -> Vec<usize> {
        self.split_tokens(s_text)
            .iter()
            .map(|s| self.index_of(s).unwrap_or(I_PAD))
            .collect()
    }

    /// Exactly max_sequence_length ids, right padded with 0 (longer texts are cut).
    pub fn encode(&self, s_text: &str) -> Vec<usize> {
        let mut v_ids = self.encode_unpadded(s_text);
        v_ids.resize(self.max_sequence_length, I_PAD);
        v_ids
    }

    /// Tokens for a sequence of numbers, rounded to the nearest id (ties to even).
    /// Padding is dropped, ids outside the vocabulary render as their number.
    pub fn tokens_of(&self, v_seq: &[f64]) -> Vec<String> {
        v_seq
            .iter()
            .map(|d| d.round_ties_even())
            .filter(|&d| d != I_PAD as f64)
            .map(|d| {
                // The casts below saturate, so only exact in-range values may use them.
                if d >= 0.0 && d < self.tokens.len() as f64 {
                    return self.tokens[d as usize].clone();
                }
                if d.is_finite() && d.abs() < i64::MAX as f64 {
                    format!("{}", d as i64)
                } else {
                    format!("{}", d)
                }
            })
            .collect()
    }

    pub fn decode(&self, v_seq: &[f64]) -> String {
        self.join(&self.tokens_of(v_seq))
    }

    pub fn decode_ids(&self, v_ids: &[usize]) -> String {
        let v_seq: Vec<f64> = v_ids.iter().map(|&i| i as f64).collect();
        self.decode(&v_seq)
    }

    /// One line per row.
    pub fn decode_rows(&self, v_rows: &[Vec<f64>]) -> String {
        v_rows
            .iter()
            .map(|v_row| self.decode(v_row))
            .collect::<Vec<String>>()
            .join("\n")
    }

    fn join(&self, v_tokens: &[String]) -> String {
        match self.config.join_mode {
            JoinMode::Space => v_tokens.join(" "),
            JoinMode::Concat => v_tokens.concat(),
            JoinMode::WordAware => {
                let mut s_text = String::new();
                for s_token in v_tokens.iter() {
                    if !s_text.is_empty() && word_start_pattern().is_match(s_token) {
                        s_text.push(' ');
                    }
                    s_text.push_str(s_token);
                }
                s_text
            }
        }
    }

    pub fn save(&self, s_name: &str) -> Result<PathBuf> {
        let path = utils::artifact_path(s_name, VOCAB_SUFFIX)?;
        let v_bytes = bincode::serialize(self)?;
        utils::write_file_atomic(&path, &v_bytes)?;
        info!(path = %path.display(), tokens = self.tokens.len(), "saved vocabulary");
        Ok(path)
    }

    pub fn load(s_name: &str) -> Result<Self> {
        let path = utils::artifact_path(s_name, VOCAB_SUFFIX)?;
        let v_bytes = std::fs::read(&path)?;
        let mut tokenizer: Tokenizer = bincode::deserialize(&v_bytes)?;
        tokenizer.rebuild_index();
        Ok(tokenizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tokenizer {
        let mut tokenizer = Tokenizer::default();
        tokenizer.register(&["hello, world!", "hello there"]);
        tokenizer
    }

    #[test]
    fn test_split_words_and_symbols() {
        let tokenizer = Tokenizer::default();
        assert_eq!(
            tokenizer.split_tokens("hi, you!"),
            vec!["hi", ",", " ", "you", "!"]
        );
    }

    #[test]
    fn test_register_first_seen_order_and_max_len() {
        let tokenizer = sample();
        assert_eq!(tokenizer.token(0), Some(S_PAD));
        assert_eq!(tokenizer.token(1), Some("hello"));
        assert_eq!(tokenizer.token(2), Some(","));
        assert_eq!(tokenizer.index_of("there"), Some(6));
        assert_eq!(tokenizer.vocab_size(), 7);
        // "hello" "," " " "world" "!"
        assert_eq!(tokenizer.max_sequence_length(), 5);
    }

    #[test]
    fn test_encode_pads_and_maps_unknown_to_zero() {
        let tokenizer = sample();
        assert_eq!(tokenizer.encode("hello there"), vec![1, 3, 6, 0, 0]);
        assert_eq!(tokenizer.encode("hello stranger"), vec![1, 3, 0, 0, 0]);
    }

    #[test]
    fn test_round_trip_word_aware() {
        let tokenizer = sample();
        let v_ids: Vec<f64> = tokenizer.encode("hello, world!").iter().map(|&i| i as f64).collect();
        assert_eq!(tokenizer.tokens_of(&v_ids), vec!["hello", ",", " ", "world", "!"]);
        // the registered space token plus the word-aware space
        assert_eq!(tokenizer.decode(&v_ids), "hello,  world!");
    }

    #[test]
    fn test_decode_rounds_and_renders_out_of_range() {
        let tokenizer = sample();
        assert_eq!(tokenizer.tokens_of(&[0.9, 0.4, 42.0, -3.0]), vec!["hello", "42", "-3"]);
        // ties to even
        assert_eq!(tokenizer.tokens_of(&[2.5]), vec![","]);
    }

    #[test]
    fn test_decode_non_finite_and_huge_values_keep_their_number() {
        let tokenizer = sample();
        assert_eq!(
            tokenizer.tokens_of(&[f64::NAN, 1e30, -1e30, f64::INFINITY]),
            vec!["NaN", "1000000000000000000000000000000", "-1000000000000000000000000000000", "inf"]
        );
        assert_eq!(tokenizer.decode(&[1.0, f64::NAN]), "hello NaN");
    }

    #[test]
    fn test_join_modes() {
        let mut tokenizer = sample();
        tokenizer.config.join_mode = JoinMode::Space;
        assert_eq!(tokenizer.decode_ids(&[1, 6]), "hello there");
        tokenizer.config.join_mode = JoinMode::Concat;
        assert_eq!(tokenizer.decode_ids(&[1, 2, 5]), "hello,!");
    }

    #[test]
    fn test_decode_rows() {
        let tokenizer = sample();
        let s_out = tokenizer.decode_rows(&[vec![1.0, 0.0], vec![4.0, 5.0]]);
        assert_eq!(s_out, "hello\nworld!");
    }

    #[test]
    fn test_lowercase_config() {
        let mut tokenizer = Tokenizer::new(TokenizerConfig {
            b_lowercase: true,
            join_mode: JoinMode::WordAware,
        });
        tokenizer.register(&["Hello HELLO"]);
        assert_eq!(tokenizer.vocab_size(), 3);
    }

    #[test]
    fn test_save_load_rebuilds_index() {
        let dir = tempfile::tempdir().unwrap();
        let s_name = dir.path().join("vocab").to_string_lossy().to_string();
        let tokenizer = sample();
        let path = tokenizer.save(&s_name).unwrap();
        assert!(path.to_string_lossy().ends_with(VOCAB_SUFFIX));
        let loaded = Tokenizer::load(&s_name).unwrap();
        assert_eq!(loaded.index_of("world"), Some(4));
        assert_eq!(loaded.encode("hello there"), tokenizer.encode("hello there"));
    }
}
