//! # Store
//!
//! Durable persistence for atoms and the prediction book. `AtomStore` is a
//! small set of required primitives per backend, with higher-level
//! operations (`find_by_triple`, `fts_search`, ...) provided once as default
//! methods built on top of them.
//!
//! Two implementations: [`MemStore`] (`BTreeMap`-backed, for tests and
//! ephemeral CLI use) and `RedbStore` (`redb`-backed, ACID, the default
//! production backend; see `redb_store.rs`).

mod mem_store;
pub mod redb_store;

pub use mem_store::MemStore;
pub use redb_store::RedbStore;

use crate::similarity::VectorBackend;
use crate::types::{
    Atom, AtomId, CalibrationCache, ClaimId, EpistemicIntervention, GraphKind, InterventionId,
    PltmError, PredictionRow,
};

/// Durable persistence for atoms, the prediction book, the calibration
/// cache, and epistemic interventions.
///
/// Every single required method commits before returning; `apply_reconciliation` is the one operation that
/// must cover multiple logical writes (winner update/insert + losers'
/// demotion) in a single backend transaction.
pub trait AtomStore: Send + Sync {
    // -- atoms: required primitives -----------------------------------
    fn insert_atom(&self, atom: &Atom) -> Result<(), PltmError>;
    fn get_atom(&self, id: AtomId) -> Result<Atom, PltmError>;
    fn update_atom(&self, atom: &Atom) -> Result<(), PltmError>;
    fn delete_atom(&self, id: AtomId) -> Result<(), PltmError>;
    fn next_atom_id(&self) -> Result<AtomId, PltmError>;

    /// All atom ids currently stored, ascending (`BTreeMap`/redb table
    /// order), including historical ones — callers filter as needed.
    fn all_atom_ids(&self) -> Result<Vec<AtomId>, PltmError>;
    fn ids_by_subject(&self, subject: &str) -> Result<Vec<AtomId>, PltmError>;
    fn ids_by_graph(&self, graph: GraphKind) -> Result<Vec<AtomId>, PltmError>;
    fn ids_by_token(&self, token: &str) -> Result<Vec<AtomId>, PltmError>;

    /// Atomically apply a reconciliation decision: persist `winner` (insert
    /// or update) and move every atom in `losers` to `GraphKind::Historical`
    /// with its `last_accessed`/`confidence` frozen at the values already
    /// set on the passed-in copy. One transaction.
    fn apply_reconciliation(&self, winner: &Atom, losers: &[Atom]) -> Result<(), PltmError>;

    // -- prediction book -------------------------------------------------
    fn insert_prediction(&self, row: &PredictionRow) -> Result<(), PltmError>;
    fn get_prediction(&self, id: ClaimId) -> Result<PredictionRow, PltmError>;
    fn update_prediction(&self, row: &PredictionRow) -> Result<(), PltmError>;
    fn next_claim_id(&self) -> Result<ClaimId, PltmError>;
    fn ids_by_domain(&self, domain: &str) -> Result<Vec<ClaimId>, PltmError>;
    fn all_claim_ids(&self) -> Result<Vec<ClaimId>, PltmError>;

    // -- calibration cache -----------------------------------------------
    fn get_calibration(&self, domain: &str) -> Result<Option<CalibrationCache>, PltmError>;
    fn put_calibration(&self, cache: &CalibrationCache) -> Result<(), PltmError>;
    /// Every cached domain's calibration, for full-state export.
    fn all_calibration(&self) -> Result<Vec<CalibrationCache>, PltmError>;

    // -- epistemic interventions ------------------------------------------
    fn insert_intervention(&self, row: &EpistemicIntervention) -> Result<(), PltmError>;
    fn next_intervention_id(&self) -> Result<InterventionId, PltmError>;
    fn get_intervention(&self, id: InterventionId) -> Result<EpistemicIntervention, PltmError>;
    fn all_intervention_ids(&self) -> Result<Vec<InterventionId>, PltmError>;

    // -- derived operations, provided -------------------------

    /// `find_by_triple(subject, predicate?, object?, exclude_historical)`,
    /// ordered by `confidence` descending.
    fn find_by_triple(
        &self,
        subject: &str,
        predicate: Option<&str>,
        object: Option<&str>,
        exclude_historical: bool,
    ) -> Result<Vec<Atom>, PltmError> {
        let mut results = Vec::new();
        for id in self.ids_by_subject(subject)? {
            let atom = self.get_atom(id)?;
            if atom.subject != subject {
                continue;
            }
            if let Some(p) = predicate
                && atom.predicate != p
            {
                continue;
            }
            if let Some(o) = object
                && atom.object != o
            {
                continue;
            }
            if exclude_historical && matches!(atom.graph, GraphKind::Historical) {
                continue;
            }
            results.push(atom);
        }
        results.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(results)
    }

    /// Subject-scoped scan, optionally restricted to one sub-graph.
    fn get_by_subject(&self, subject: &str, graph: Option<GraphKind>) -> Result<Vec<Atom>, PltmError> {
        let mut results = Vec::new();
        for id in self.ids_by_subject(subject)? {
            let atom = self.get_atom(id)?;
            if atom.subject != subject {
                continue;
            }
            if let Some(g) = graph
                && atom.graph != g
            {
                continue;
            }
            results.push(atom);
        }
        Ok(results)
    }

    /// Scan one sub-graph, optionally restricted to one subject.
    fn get_by_graph(&self, graph: GraphKind, subject: Option<&str>) -> Result<Vec<Atom>, PltmError> {
        let mut results = Vec::new();
        for id in self.ids_by_graph(graph)? {
            let atom = self.get_atom(id)?;
            if let Some(s) = subject
                && atom.subject != s
            {
                continue;
            }
            results.push(atom);
        }
        Ok(results)
    }

    /// Full-text match over `subject+predicate+object` using the backend's
    /// token inverted index; `domain` restricts to atoms whose `contexts`
    /// contain it.
    fn fts_search(&self, terms: &str, domain: Option<&str>, limit: usize) -> Result<Vec<Atom>, PltmError> {
        use std::collections::BTreeMap;

        let query_tokens = crate::similarity::tokenize(terms);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: BTreeMap<AtomId, usize> = BTreeMap::new();
        for token in &query_tokens {
            for id in self.ids_by_token(token)? {
                *hits.entry(id).or_insert(0) += 1;
            }
        }

        let mut scored: Vec<(Atom, usize)> = Vec::new();
        for (id, count) in hits {
            let atom = self.get_atom(id)?;
            if matches!(atom.graph, GraphKind::Historical) {
                continue;
            }
            if let Some(d) = domain
                && !crate::types::contexts_intersect(&atom.contexts, d)
            {
                continue;
            }
            scored.push((atom, count));
        }
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(scored.into_iter().take(limit).map(|(atom, _)| atom).collect())
    }

    /// Optional vector-similarity lookup. Degrades gracefully:
    /// when `backend` is `None`, similarity comes from
    /// [`crate::similarity::string_similarity`].
    fn vector_search(
        &self,
        backend: Option<&dyn VectorBackend>,
        query_text: &str,
        subject: Option<&str>,
        predicate: Option<&str>,
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<(AtomId, String, f64)>, PltmError> {
        let candidate_ids = if let Some(s) = subject {
            self.ids_by_subject(s)?
        } else {
            self.all_atom_ids()?
        };

        let mut scored = Vec::new();
        for id in candidate_ids {
            let atom = self.get_atom(id)?;
            if matches!(atom.graph, GraphKind::Historical) {
                continue;
            }
            if let Some(p) = predicate
                && atom.predicate != p
            {
                continue;
            }
            let sim = match backend {
                Some(b) => b.similarity(query_text, &atom.object),
                None => crate::similarity::string_similarity(query_text, &atom.object),
            };
            if sim >= threshold {
                scored.push((atom.id, atom.object.clone(), sim));
            }
        }
        scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AtomType, Provenance};
    use chrono::Utc;

    fn make_atom(store: &dyn AtomStore, subject: &str, predicate: &str, object: &str, graph: GraphKind) -> Atom {
        let now = Utc::now();
        let id = store.next_atom_id().expect("id");
        Atom {
            id,
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            atom_type: AtomType::Preference,
            provenance: Provenance::UserStated,
            graph,
            confidence: 0.9,
            strength: 0.9,
            first_observed: now,
            last_accessed: now,
            assertion_count: 1,
            access_count: 0,
            contexts: vec![],
            source_user: subject.into(),
            metadata: Default::default(),
        }
    }

    fn exercise_store(store: &dyn AtomStore) {
        let atom = make_atom(store, "user", "likes", "Python programming", GraphKind::Substantiated);
        store.insert_atom(&atom).expect("insert");

        let fetched = store.get_atom(atom.id).expect("get");
        assert_eq!(fetched.object, "Python programming");

        let by_triple = store
            .find_by_triple("user", Some("likes"), None, true)
            .expect("find");
        assert_eq!(by_triple.len(), 1);

        let fts = store.fts_search("python", None, 10).expect("fts");
        assert_eq!(fts.len(), 1);

        let by_subject = store.get_by_subject("user", None).expect("subject");
        assert_eq!(by_subject.len(), 1);

        let by_graph = store
            .get_by_graph(GraphKind::Substantiated, None)
            .expect("graph");
        assert_eq!(by_graph.len(), 1);

        store.delete_atom(atom.id).expect("delete");
        assert!(store.get_atom(atom.id).is_err());
    }

    #[test]
    fn mem_store_satisfies_contract() {
        let store = MemStore::new();
        exercise_store(&store);
    }

    #[test]
    fn redb_store_satisfies_contract() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("test.redb");
        let store = RedbStore::open(&path).expect("open");
        exercise_store(&store);
    }

    #[test]
    fn insert_duplicate_id_fails() {
        let store = MemStore::new();
        let atom = make_atom(&store, "user", "likes", "tea", GraphKind::Substantiated);
        store.insert_atom(&atom).expect("first insert");
        assert!(matches!(
            store.insert_atom(&atom),
            Err(PltmError::AlreadyExists(_))
        ));
    }

    #[test]
    fn get_missing_atom_not_found() {
        let store = MemStore::new();
        assert!(matches!(
            store.get_atom(AtomId(9999)),
            Err(PltmError::NotFound(_))
        ));
    }

    #[test]
    fn apply_reconciliation_promotes_winner_and_demotes_losers() {
        let store = MemStore::new();
        let mut loser = make_atom(&store, "user", "works_at", "Google", GraphKind::Substantiated);
        store.insert_atom(&loser).expect("insert loser");

        let winner = make_atom(&store, "user", "works_at", "Meta", GraphKind::Substantiated);
        store.insert_atom(&winner).expect("insert winner");

        loser.graph = GraphKind::Historical;
        store
            .apply_reconciliation(&winner, std::slice::from_ref(&loser))
            .expect("reconcile");

        let stored_loser = store.get_atom(loser.id).expect("loser");
        assert_eq!(stored_loser.graph, GraphKind::Historical);

        let visible = store
            .find_by_triple("user", Some("works_at"), None, true)
            .expect("find");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].object, "Meta");
    }
}
