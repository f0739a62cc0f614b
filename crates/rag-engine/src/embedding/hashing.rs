//! Hashing embedder (§4.4): deterministic, offline, word-tokenized hashing
//! vectorizer with non-negative bucket counts, row-L2 normalized. A pure
//! function of its input — no network, no model weights, no secondary
//! character-trigram signal.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::embedding::Embedder;
use crate::error::EngineError;
use crate::utils::similarity::l2_normalize;

pub const DEFAULT_DIMENSIONS: usize = 2048;

fn word_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+").expect("static pattern"))
}

/// Lowercased word tokens of `s`, in order of appearance.
pub fn tokenize(s: &str) -> Vec<String> {
    word_pattern()
        .find_iter(s)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

fn hash_bucket(word: &str, dim: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    word.hash(&mut hasher);
    (hasher.finish() as usize) % dim
}

pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dim];
        for word in tokenize(text) {
            let idx = hash_bucket(&word, self.dim);
            vec[idx] += 1.0;
        }
        l2_normalize(&mut vec);
        vec
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dim
    }

    fn backend_name(&self) -> &'static str {
        "hashing"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder() -> HashingEmbedder {
        HashingEmbedder::new(DEFAULT_DIMENSIONS)
    }

    #[tokio::test]
    async fn deterministic_across_calls() {
        let e = embedder();
        let a = e.embed(&["hello world".to_string()]).await.unwrap();
        let b = e.embed(&["hello world".to_string()]).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn empty_input_yields_empty_matrix() {
        let e = embedder();
        let out = e.embed(&[]).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn rows_are_unit_normalized() {
        let e = embedder();
        let out = e.embed(&["some words here".to_string()]).await.unwrap();
        let mag: f32 = out[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((mag - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn counts_are_non_negative() {
        let e = embedder();
        let out = e.embed(&["repeat repeat repeat different".to_string()]).await.unwrap();
        assert!(out[0].iter().all(|&x| x >= 0.0));
    }

    #[tokio::test]
    async fn empty_text_is_zero_vector() {
        let e = embedder();
        let out = e.embed(&["".to_string()]).await.unwrap();
        assert!(out[0].iter().all(|&x| x == 0.0));
    }

    #[test]
    fn tokenize_lowercases_words() {
        assert_eq!(tokenize("Hello, World!"), vec!["hello", "world"]);
    }
}
