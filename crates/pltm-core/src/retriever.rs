//! # Retriever
//!
//! Attention-scored, MMR-diversified, domain-filtered retrieval, plus the
//! three entropy-injection operators. A stateless engine over
//! `&dyn AtomStore`: an empty unit struct carrying associated functions.

use crate::clock::Clock;
use crate::decay;
use crate::similarity::{self, VectorBackend};
use crate::store::AtomStore;
use crate::types::{Atom, AtomId, GraphKind, PltmError};

pub const DEFAULT_TOP_K: usize = 10;
pub const DEFAULT_MMR_LAMBDA: f64 = 0.6;
pub const DEFAULT_MMR_MIN_DISSIM: f64 = 0.25;

/// `(α, β, γ, δ)` weights for relevance/confidence/recency/stability in the
/// attention score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalWeights {
    pub relevance: f64,
    pub confidence: f64,
    pub recency: f64,
    pub stability: f64,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self {
            relevance: 0.5,
            confidence: 0.2,
            recency: 0.15,
            stability: 0.15,
        }
    }
}

impl RetrievalWeights {
    /// The three named heads of the multi-head variant.
    #[must_use]
    pub fn relevance_heavy() -> Self {
        Self {
            relevance: 0.7,
            confidence: 0.15,
            recency: 0.1,
            stability: 0.05,
        }
    }

    #[must_use]
    pub fn recency_heavy() -> Self {
        Self {
            relevance: 0.2,
            confidence: 0.15,
            recency: 0.5,
            stability: 0.15,
        }
    }

    #[must_use]
    pub fn confidence_heavy() -> Self {
        Self {
            relevance: 0.2,
            confidence: 0.55,
            recency: 0.1,
            stability: 0.15,
        }
    }
}

/// An atom paired with the attention score it was ranked by.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub atom: Atom,
    pub score: f64,
}

/// Bound on `recency`'s decay window: an atom accessed this long ago or
/// longer scores the minimum recency contribution.
const RECENCY_HORIZON_HOURS: f64 = 24.0 * 30.0;

pub struct Retriever;

impl Retriever {
    /// Attention retrieval. Over-fetches the candidate pool
    /// via `fts_search` ∪ `get_by_subject` restricted to `domain`, scores
    /// each candidate, sorts descending, takes `top_k`, and reconsolidates
    /// every returned atom in the same logical operation as the read.
    pub fn attention_retrieve(
        store: &dyn AtomStore,
        clock: &dyn Clock,
        backend: Option<&dyn VectorBackend>,
        subject: &str,
        query_text: &str,
        domain: Option<&str>,
        top_k: usize,
        weights: RetrievalWeights,
    ) -> Result<Vec<Scored>, PltmError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let candidates = candidate_pool(store, subject, query_text, domain, top_k)?;
        let now = clock.now();

        let mut scored: Vec<Scored> = candidates
            .into_iter()
            .map(|atom| {
                let score = attention_score(&atom, query_text, now, backend, weights);
                Scored { atom, score }
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        for entry in &mut scored {
            decay::reconsolidate(&mut entry.atom, now, decay::DEFAULT_BOOST_FACTOR);
            // Best-effort: reconsolidation side effects of a read shouldn't
            // fail the read itself.
            let _ = store.update_atom(&entry.atom);
        }

        Ok(scored)
    }

    /// Multi-head variant: run several weight vectors, union the top of
    /// each, dedup on id keeping the best score per atom.
    pub fn attention_multihead(
        store: &dyn AtomStore,
        clock: &dyn Clock,
        backend: Option<&dyn VectorBackend>,
        subject: &str,
        query_text: &str,
        domain: Option<&str>,
        top_k: usize,
        heads: &[RetrievalWeights],
    ) -> Result<Vec<Scored>, PltmError> {
        use std::collections::HashMap;

        let mut best: HashMap<AtomId, Scored> = HashMap::new();
        for weights in heads {
            let head_results =
                Self::attention_retrieve(store, clock, backend, subject, query_text, domain, top_k, *weights)?;
            for scored in head_results {
                best.entry(scored.atom.id)
                    .and_modify(|existing| {
                        if scored.score > existing.score {
                            *existing = scored.clone();
                        }
                    })
                    .or_insert(scored);
            }
        }

        let mut merged: Vec<Scored> = best.into_values().collect();
        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(merged)
    }

    /// MMR greedy diversity selection: over-sample `3·top_k`
    /// from attention retrieval, then greedily pick atoms maximizing
    /// `λ·relevance − (1−λ)·max_sim_to_selected`, rejecting any candidate
    /// whose minimum dissimilarity to the selected set falls below
    /// `min_dissim`.
    pub fn mmr_retrieve(
        store: &dyn AtomStore,
        clock: &dyn Clock,
        backend: Option<&dyn VectorBackend>,
        subject: &str,
        query_text: &str,
        domain: Option<&str>,
        top_k: usize,
        lambda: f64,
        min_dissim: f64,
    ) -> Result<Vec<Atom>, PltmError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let oversampled = Self::attention_retrieve(
            store,
            clock,
            backend,
            subject,
            query_text,
            domain,
            top_k.saturating_mul(3),
            RetrievalWeights::default(),
        )?;

        let mut candidates: Vec<Atom> = oversampled.into_iter().map(|s| s.atom).collect();
        let mut selected: Vec<Atom> = Vec::new();

        while selected.len() < top_k && !candidates.is_empty() {
            let mut best_idx = None;
            let mut best_mmr = f64::NEG_INFINITY;

            for (idx, candidate) in candidates.iter().enumerate() {
                let relevance = similarity_of(backend, query_text, &candidate.object);
                let max_sim_to_selected = selected
                    .iter()
                    .map(|s| similarity_of(backend, &candidate.object, &s.object))
                    .fold(0.0_f64, f64::max);

                if !selected.is_empty() && (1.0 - max_sim_to_selected) < min_dissim {
                    continue;
                }

                let mmr = lambda * relevance - (1.0 - lambda) * max_sim_to_selected;
                if mmr > best_mmr {
                    best_mmr = mmr;
                    best_idx = Some(idx);
                }
            }

            match best_idx {
                Some(idx) => selected.push(candidates.remove(idx)),
                None => break,
            }
        }

        Ok(selected)
    }

    /// Random entropy injection: sample `n` atoms from the
    /// least-accessed domains (lowest `access_count`).
    pub fn inject_entropy_random(store: &dyn AtomStore, subject: &str, n: usize) -> Result<Vec<Atom>, PltmError> {
        let mut atoms = store.get_by_subject(subject, None)?;
        atoms.retain(Atom::is_default_visible);
        atoms.sort_by_key(|a| a.access_count);
        atoms.truncate(n);
        Ok(atoms)
    }

    /// Antipodal entropy injection: the `n` atoms maximally dissimilar to
    /// `query_text`.
    pub fn inject_entropy_antipodal(
        store: &dyn AtomStore,
        backend: Option<&dyn VectorBackend>,
        subject: &str,
        query_text: &str,
        n: usize,
    ) -> Result<Vec<Atom>, PltmError> {
        let mut atoms = store.get_by_subject(subject, None)?;
        atoms.retain(Atom::is_default_visible);
        atoms.sort_by(|a, b| {
            similarity_of(backend, query_text, &a.object)
                .partial_cmp(&similarity_of(backend, query_text, &b.object))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        atoms.truncate(n);
        Ok(atoms)
    }

    /// Temporal entropy injection: a mix of the oldest and newest atoms by
    /// `first_observed`, biasing away from mid-recency.
    pub fn inject_entropy_temporal(store: &dyn AtomStore, subject: &str, n: usize) -> Result<Vec<Atom>, PltmError> {
        let mut atoms = store.get_by_subject(subject, None)?;
        atoms.retain(Atom::is_default_visible);
        atoms.sort_by_key(|a| a.first_observed);

        let half = n / 2;
        let mut result: Vec<Atom> = atoms.iter().take(half).cloned().collect();
        let remaining = n - result.len();
        let newest: Vec<Atom> = atoms.iter().rev().take(remaining).cloned().collect();
        for atom in newest {
            if !result.iter().any(|a| a.id == atom.id) {
                result.push(atom);
            }
        }
        Ok(result)
    }
}

fn candidate_pool(
    store: &dyn AtomStore,
    subject: &str,
    query_text: &str,
    domain: Option<&str>,
    top_k: usize,
) -> Result<Vec<Atom>, PltmError> {
    use std::collections::BTreeMap;

    let mut pool: BTreeMap<AtomId, Atom> = BTreeMap::new();

    for atom in store.fts_search(query_text, domain, top_k.saturating_mul(10))? {
        pool.insert(atom.id, atom);
    }

    for atom in store.get_by_subject(subject, None)? {
        if !atom.is_default_visible() {
            continue;
        }
        if let Some(d) = domain
            && !crate::types::contexts_intersect(&atom.contexts, d)
        {
            continue;
        }
        pool.insert(atom.id, atom);
    }

    Ok(pool.into_values().collect())
}

fn attention_score(
    atom: &Atom,
    query_text: &str,
    now: chrono::DateTime<chrono::Utc>,
    backend: Option<&dyn VectorBackend>,
    weights: RetrievalWeights,
) -> f64 {
    let relevance = similarity_of(backend, query_text, &atom.object);
    let confidence = atom.confidence;
    let recency = recency_score(atom, now);
    let stability = decay::stability(atom, now);

    weights.relevance * relevance
        + weights.confidence * confidence
        + weights.recency * recency
        + weights.stability * stability
}

/// Bounded decreasing function of `now − last_accessed`: `1.0` at `t=0`,
/// decaying linearly to `0.0` at [`RECENCY_HORIZON_HOURS`] and beyond.
fn recency_score(atom: &Atom, now: chrono::DateTime<chrono::Utc>) -> f64 {
    let hours = now
        .signed_duration_since(atom.last_accessed)
        .num_milliseconds() as f64
        / 3_600_000.0;
    (1.0 - hours.max(0.0) / RECENCY_HORIZON_HOURS).clamp(0.0, 1.0)
}

fn similarity_of(backend: Option<&dyn VectorBackend>, a: &str, b: &str) -> f64 {
    match backend {
        Some(backend) => backend.similarity(a, b),
        None => similarity::string_similarity(a, b),
    }
}
