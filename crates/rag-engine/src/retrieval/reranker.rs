//! Lexical reranker (§4.7): blends vector score with token-set overlap
//! against the query. Cheap enough to run on every query without its own
//! backend or model.

use std::collections::HashSet;

use crate::embedding::hashing::tokenize;
use crate::retrieval::Candidate;

fn token_set(s: &str) -> HashSet<String> {
    tokenize(s).into_iter().collect()
}

fn overlap(query_tokens: &HashSet<String>, text: &str) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let candidate_tokens = token_set(text);
    let shared = query_tokens.intersection(&candidate_tokens).count();
    shared as f32 / query_tokens.len().max(1) as f32
}

/// Reorders `candidates` by `score + alpha * overlap(query, candidate.text)`,
/// descending, stable on ties, and replaces each candidate's `score` with
/// that blended value so the returned order and the returned scores agree
/// (§8 requires retrieval output scores to be non-increasing). An empty
/// query token set returns the input unchanged.
pub fn rerank(query: &str, mut candidates: Vec<Candidate>, alpha: f32) -> Vec<Candidate> {
    let query_tokens = token_set(query);
    if query_tokens.is_empty() {
        return candidates;
    }

    let mut blended: Vec<Candidate> = candidates
        .drain(..)
        .map(|c| {
            let score = c.score + alpha * overlap(&query_tokens, &c.text);
            Candidate { score, ..c }
        })
        .collect();

    blended.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    blended
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, score: f32, text: &str) -> Candidate {
        Candidate {
            chunk_id: id.to_string(),
            path: "doc.txt".to_string(),
            score,
            text: text.to_string(),
        }
    }

    #[test]
    fn empty_query_returns_input_unchanged() {
        let candidates = vec![candidate("a", 0.5, "hello"), candidate("b", 0.9, "world")];
        let out = rerank("   ", candidates.clone(), 0.1);
        assert_eq!(out, candidates);
    }

    #[test]
    fn overlap_can_promote_a_lower_scoring_candidate() {
        let candidates = vec![
            candidate("low-overlap", 0.50, "completely unrelated text"),
            candidate("high-overlap", 0.49, "rust memory safety guarantees"),
        ];
        let out = rerank("rust memory safety", candidates, 1.0);
        assert_eq!(out[0].chunk_id, "high-overlap");
    }

    #[test]
    fn ties_are_broken_stably() {
        let candidates = vec![candidate("first", 0.3, "xyz"), candidate("second", 0.3, "xyz")];
        let out = rerank("unrelated query terms", candidates, 0.1);
        assert_eq!(out[0].chunk_id, "first");
        assert_eq!(out[1].chunk_id, "second");
    }

    #[test]
    fn default_alpha_has_bounded_influence() {
        let candidates = vec![candidate("a", 0.9, "no match here"), candidate("b", 0.89, "rust")];
        let out = rerank("rust", candidates, 0.10);
        // overlap contributes at most alpha=0.10, not enough to overturn a 0.01 gap plus full overlap (0.10 > 0.01, so b wins)
        assert_eq!(out[0].chunk_id, "b");
    }

    #[test]
    fn returned_scores_carry_the_blended_value_and_stay_non_increasing() {
        let candidates = vec![
            candidate("low-overlap", 0.50, "completely unrelated text"),
            candidate("high-overlap", 0.49, "rust memory safety guarantees"),
        ];
        let out = rerank("rust memory safety", candidates, 1.0);

        assert_eq!(out[0].chunk_id, "high-overlap");
        assert!((out[0].score - 1.49).abs() < 1e-6);
        assert!((out[1].score - 0.5).abs() < 1e-6);
        assert!(out[0].score >= out[1].score);
    }
}
