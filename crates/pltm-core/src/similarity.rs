//! # Similarity & the Vector Backend Abstraction
//!
//! The embedding and vector search layer is optional: a capability
//! interface with three operations (`embed`, `upsert`, `knn`) plus a
//! `similarity(text_a, text_b) -> float` helper that callers fall back to
//! when no backend is configured, trading recall for always being able to
//! answer.
//!
//! No embedding model is bundled in this crate; `strsim`
//! (pulled in from `surrealdb-surrealdb`'s dependency stack, the pack's
//! closest example of string-distance use — see
//! `surrealdb-surrealdb/core/src/fnc/util/string/distance.rs`) provides the
//! deterministic fallback used whenever no [`VectorBackend`] is configured.

use std::collections::BTreeSet;

/// A pluggable embedding/vector-search capability. The reconciler, the
/// retriever, and the conflict detector all accept `Option<&dyn
/// VectorBackend>`; absent it, they call [`string_similarity`] instead.
pub trait VectorBackend: Send + Sync {
    /// Compute (or fetch a cached) embedding for `text`.
    fn embed(&self, text: &str) -> Vec<f32>;

    /// Persist an embedding for `id`, associated with `text`.
    fn upsert(&self, id: u64, text: &str, embedding: &[f32]);

    /// Return up to `k` nearest neighbours to `query`, as `(id, similarity)`
    /// pairs sorted by similarity descending.
    fn knn(&self, query: &str, k: usize) -> Vec<(u64, f64)>;

    /// Cosine similarity between two embedded pieces of text, in `[-1, 1]`
    /// (in practice `[0, 1]` for non-negative embedding spaces).
    fn similarity(&self, text_a: &str, text_b: &str) -> f64 {
        cosine_similarity(&self.embed(text_a), &self.embed(text_b))
    }
}

#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Deterministic string similarity used when no [`VectorBackend`] is
/// configured: a blend of Jaro-Winkler (good for short near-duplicate
/// strings, e.g. typos/synonyms) and token-overlap (good for substring and
/// phrase containment), both in `[0, 1]`.
#[must_use]
pub fn string_similarity(a: &str, b: &str) -> f64 {
    if a.eq_ignore_ascii_case(b) {
        return 1.0;
    }
    let jw = strsim::jaro_winkler(&a.to_lowercase(), &b.to_lowercase());
    let overlap = token_overlap(a, b);
    jw.max(overlap)
}

/// Normalized token overlap: `|tokens(a) ∩ tokens(b)| / |tokens(a) ∪ tokens(b)|`.
/// Used as the token-overlap fallback for `relevance` in the retriever
/// when no vector backend is configured.
#[must_use]
pub fn token_overlap(a: &str, b: &str) -> f64 {
    let ta = tokenize(a);
    let tb = tokenize(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Lowercase, punctuation-stripped whitespace tokenization, shared by the
/// fallback similarity metric and the store's inverted full-text index.
#[must_use]
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|tok| !tok.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_are_fully_similar() {
        assert_eq!(string_similarity("Python", "python"), 1.0);
    }

    #[test]
    fn substring_has_high_token_overlap() {
        let sim = token_overlap("likes programming", "likes Python programming");
        assert!(sim > 0.5);
    }

    #[test]
    fn unrelated_strings_are_dissimilar() {
        let sim = string_similarity("coffee", "xyz123");
        assert!(sim < 0.5);
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0_f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        let a = vec![1.0_f32, 0.0];
        let b = vec![0.0_f32, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn cosine_similarity_mismatched_length_is_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn tokenize_strips_punctuation_and_lowercases() {
        let tokens = tokenize("I like Python!");
        assert!(tokens.contains("python"));
        assert!(tokens.contains("like"));
        assert!(!tokens.contains("Python!"));
    }
}
