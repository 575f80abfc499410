//! # Reconciler
//!
//! Conflict detection and resolution for candidate atoms. A stateless
//! engine: an empty unit struct carrying associated functions, operating on
//! a `&dyn AtomStore` and an optional `&dyn VectorBackend` passed in by the
//! caller rather than held.

use crate::clock::Clock;
use crate::ontology;
use crate::similarity::{self, VectorBackend};
use crate::store::AtomStore;
use crate::types::{Atom, AtomId, GraphKind, PltmError, Provenance};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.6;
pub const DEFAULT_DUPLICATE_THRESHOLD: f64 = 0.9;

/// Similarity score used at each stage of conflict detection.
const OPPOSITE_CONFLICT_THRESHOLD: f64 = 0.7;
const EXCLUSIVE_FAR_THRESHOLD: f64 = 0.9;

/// Outcome of reconciling one candidate atom against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// No conflicting atom existed; the candidate was inserted as-is.
    Inserted(Atom),
    /// The candidate was an exact-triple re-assertion; the existing atom was
    /// reinforced in place instead of a new atom being created.
    Reinforced(Atom),
    /// The candidate won against one or more conflicting atoms; those move
    /// to HISTORICAL.
    Promoted { winner: Atom, demoted: Vec<Atom> },
    /// The candidate lost against an existing atom; the candidate itself is
    /// not persisted (moved to HISTORICAL only if it was already stored).
    Rejected { existing: Atom },
}

pub struct Reconciler;

impl Reconciler {
    /// Reconcile `candidate` against whatever the store already holds for
    /// `(candidate.subject, candidate.predicate)`, inserting/updating/
    /// demoting atoms as needed. All moves happen inside the store's own
    /// `apply_reconciliation` transaction.
    ///
    /// `candidate.id` is treated as unassigned sentinel `AtomId(0)` (no
    /// backend ever issues id `0`, since `next_atom_id` starts counting at
    /// `1`) and is replaced with a freshly allocated id whenever the
    /// candidate ends up persisted.
    pub fn reconcile(
        store: &dyn AtomStore,
        clock: &dyn Clock,
        backend: Option<&dyn VectorBackend>,
        mut candidate: Atom,
        similarity_threshold: f64,
    ) -> Result<ReconcileOutcome, PltmError> {
        if !ontology::is_predicate_allowed(candidate.atom_type, &candidate.predicate) {
            return Err(PltmError::OntologyViolation(format!(
                "predicate '{}' not allowed for atom type {}",
                candidate.predicate, candidate.atom_type
            )));
        }
        if candidate.id == AtomId(0) {
            candidate.id = store.next_atom_id()?;
        }

        // Identity match stage: same predicate, plus its opposite
        // where one is defined — the opposite-predicate conflict test in
        // stage 3 needs those atoms in the candidate set to compare against.
        let mut existing = store.find_by_triple(&candidate.subject, Some(&candidate.predicate), None, true)?;
        if let Some(opposite) = ontology::opposite_predicate(&candidate.predicate) {
            existing.extend(store.find_by_triple(&candidate.subject, Some(opposite), None, true)?);
        }
        if existing.is_empty() {
            store.insert_atom(&candidate)?;
            return Ok(ReconcileOutcome::Inserted(candidate));
        }

        // Exact-triple re-assertion is always reinforcement, never a conflict
        //, checked before the similarity filter.
        if let Some(same) = existing
            .iter()
            .find(|a| a.predicate == candidate.predicate && a.object == candidate.object)
        {
            let mut reinforced = same.clone();
            crate::decay::reinforce(&mut reinforced, clock.now(), crate::decay::DEFAULT_BOOST_FACTOR);
            store.update_atom(&reinforced)?;
            return Ok(ReconcileOutcome::Reinforced(reinforced));
        }

        let conflicts: Vec<Atom> = existing
            .into_iter()
            .filter(|existing| {
                let sim = similarity_of(backend, &candidate.object, &existing.object);
                // Exclusive same-predicate matches must survive to the semantic
                // conflict test even when their objects are dissimilar — that is
                // precisely the "far under an exclusive predicate" case spec
                // §4.3.1 step 2 asks the similarity filter to keep, not drop.
                let exclusive_same_predicate =
                    candidate.predicate == existing.predicate && ontology::rule_for(candidate.atom_type).exclusive;
                (exclusive_same_predicate || sim >= similarity_threshold)
                    && is_semantic_conflict(&candidate, existing, backend, sim)
            })
            .collect();

        if conflicts.is_empty() {
            store.insert_atom(&candidate)?;
            return Ok(ReconcileOutcome::Inserted(candidate));
        }

        let now = clock.now();
        let candidate_wins = candidate_beats_all(&candidate, &conflicts);

        if candidate_wins {
            candidate.graph = GraphKind::Substantiated;
            crate::decay::reconsolidate(&mut candidate, now, crate::decay::DEFAULT_BOOST_FACTOR);

            let mut demoted = Vec::with_capacity(conflicts.len());
            for mut loser in conflicts {
                loser.graph = GraphKind::Historical;
                demoted.push(loser);
            }
            store.apply_reconciliation(&candidate, &demoted)?;
            Ok(ReconcileOutcome::Promoted {
                winner: candidate,
                demoted,
            })
        } else {
            // The candidate itself loses; nothing new is persisted. Whichever
            // conflict beats every other conflict (and the candidate) is the
            // existing winner returned to the caller, unchanged.
            let winner = conflicts
                .into_iter()
                .reduce(|best, other| if beats(&other, &best) { other } else { best })
                .expect("conflicts is non-empty here");
            Ok(ReconcileOutcome::Rejected { existing: winner })
        }
    }
}

/// Whether `candidate` strictly beats every atom in `conflicts` under the
/// tie-break chain
fn candidate_beats_all(candidate: &Atom, conflicts: &[Atom]) -> bool {
    conflicts.iter().all(|other| beats(candidate, other))
}

fn beats(a: &Atom, b: &Atom) -> bool {
    if a.confidence != b.confidence {
        return a.confidence > b.confidence;
    }
    if a.provenance.rank() != b.provenance.rank() {
        return a.provenance.rank() > b.provenance.rank();
    }
    if a.first_observed != b.first_observed {
        return a.first_observed > b.first_observed;
    }
    if a.assertion_count != b.assertion_count {
        return a.assertion_count > b.assertion_count;
    }
    a.id.0 > b.id.0
}

fn similarity_of(backend: Option<&dyn VectorBackend>, a: &str, b: &str) -> f64 {
    match backend {
        Some(backend) => backend.similarity(a, b),
        None => similarity::string_similarity(a, b),
    }
}

/// Semantic conflict test, run on survivors of the
/// similarity filter.
fn is_semantic_conflict(candidate: &Atom, existing: &Atom, backend: Option<&dyn VectorBackend>, sim: f64) -> bool {
    // Opposite-predicate conflict is checked first and unconditionally: an
    // identical object under opposite predicates (`likes Python` vs.
    // `dislikes Python`) would otherwise be caught by the substring check
    // below (every string contains itself) and wrongly waved through as a
    // refinement.
    if let Some(opposite) = ontology::opposite_predicate(&candidate.predicate)
        && opposite == existing.predicate
        && sim >= OPPOSITE_CONFLICT_THRESHOLD
    {
        return true;
    }

    let (shorter, longer) = if candidate.object.len() <= existing.object.len() {
        (&candidate.object, &existing.object)
    } else {
        (&existing.object, &candidate.object)
    };
    if longer.to_lowercase().contains(&shorter.to_lowercase()) {
        return false; // refinement, not conflict
    }

    let rule = ontology::rule_for(candidate.atom_type);
    if rule.contextual && crate::types::contexts_disjoint(&candidate.contexts, &existing.contexts) {
        return false;
    }

    if candidate.predicate == existing.predicate && rule.exclusive {
        let far = similarity_of(backend, &candidate.object, &existing.object) < EXCLUSIVE_FAR_THRESHOLD;
        return far;
    }

    false
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::MemStore;
    use crate::types::{AtomId, AtomType};
    use chrono::Utc;

    fn base_atom(now: chrono::DateTime<Utc>, predicate: &str, object: &str, confidence: f64) -> Atom {
        Atom {
            id: AtomId(0),
            subject: "user".into(),
            predicate: predicate.into(),
            object: object.into(),
            atom_type: AtomType::Preference,
            provenance: Provenance::UserStated,
            graph: GraphKind::Substantiated,
            confidence,
            strength: confidence,
            first_observed: now,
            last_accessed: now,
            assertion_count: 1,
            access_count: 0,
            contexts: vec![],
            source_user: "user".into(),
            metadata: Default::default(),
        }
    }

    fn insert(store: &MemStore, mut atom: Atom) -> Atom {
        atom.id = store.next_atom_id().expect("id");
        store.insert_atom(&atom).expect("insert");
        atom
    }

    #[test]
    fn opposite_predicate_conflict_demotes_older() {
        let store = MemStore::new();
        let clock = FixedClock::new(Utc::now());

        let first = insert(&store, base_atom(clock.now(), "likes", "Python", 0.9));
        clock.advance(chrono::Duration::hours(1));

        let candidate = base_atom(clock.now(), "dislikes", "Python", 0.9);
        let outcome = Reconciler::reconcile(&store, &clock, None, candidate, DEFAULT_SIMILARITY_THRESHOLD)
            .expect("reconcile");

        match outcome {
            ReconcileOutcome::Promoted { winner, demoted } => {
                assert_eq!(winner.predicate, "dislikes");
                assert_eq!(demoted.len(), 1);
                assert_eq!(demoted[0].id, first.id);
                assert_eq!(demoted[0].graph, GraphKind::Historical);
            }
            other => panic!("expected Promoted, got {other:?}"),
        }

        let visible = store
            .find_by_triple("user", None, Some("Python"), true)
            .expect("find");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].predicate, "dislikes");
    }

    #[test]
    fn exclusive_affiliation_demotes_earlier() {
        let store = MemStore::new();
        let clock = FixedClock::new(Utc::now());
        let now = clock.now();

        let mut google = base_atom(now, "works_at", "Google", 0.8);
        google.atom_type = AtomType::Affiliation;
        insert(&store, google);

        clock.advance(chrono::Duration::hours(2));
        let mut meta = base_atom(clock.now(), "works_at", "Meta", 0.8);
        meta.atom_type = AtomType::Affiliation;

        let outcome = Reconciler::reconcile(&store, &clock, None, meta, DEFAULT_SIMILARITY_THRESHOLD)
            .expect("reconcile");
        assert!(matches!(outcome, ReconcileOutcome::Promoted { .. }));

        let visible = store
            .find_by_triple("user", Some("works_at"), None, true)
            .expect("find");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].object, "Meta");
    }

    #[test]
    fn contextual_coexistence_no_conflict() {
        let store = MemStore::new();
        let clock = FixedClock::new(Utc::now());
        let now = clock.now();

        let mut python = base_atom(now, "likes", "Python", 0.9);
        python.contexts = vec!["data_science".into()];
        insert(&store, python);

        let mut js = base_atom(now, "likes", "JavaScript", 0.9);
        js.contexts = vec!["web_dev".into()];
        let outcome = Reconciler::reconcile(&store, &clock, None, js, DEFAULT_SIMILARITY_THRESHOLD)
            .expect("reconcile");
        assert!(matches!(outcome, ReconcileOutcome::Inserted(_)));

        let all = store.get_by_subject("user", Some(GraphKind::Substantiated)).expect("get");
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn substring_refinement_not_conflict() {
        let store = MemStore::new();
        let clock = FixedClock::new(Utc::now());
        let now = clock.now();

        insert(&store, base_atom(now, "likes", "programming", 0.8));
        let candidate = base_atom(now, "likes", "Python programming", 0.8);
        let outcome = Reconciler::reconcile(&store, &clock, None, candidate, DEFAULT_SIMILARITY_THRESHOLD)
            .expect("reconcile");
        assert!(matches!(outcome, ReconcileOutcome::Inserted(_)));

        let all = store.get_by_subject("user", Some(GraphKind::Substantiated)).expect("get");
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn exact_triple_reassertion_reinforces() {
        let store = MemStore::new();
        let clock = FixedClock::new(Utc::now());
        let now = clock.now();

        let original = insert(&store, base_atom(now, "likes", "tea", 0.5));
        clock.advance(chrono::Duration::hours(1));

        let candidate = base_atom(clock.now(), "likes", "tea", 0.5);
        let outcome = Reconciler::reconcile(&store, &clock, None, candidate, DEFAULT_SIMILARITY_THRESHOLD)
            .expect("reconcile");

        match outcome {
            ReconcileOutcome::Reinforced(atom) => {
                assert_eq!(atom.id, original.id);
                assert_eq!(atom.assertion_count, 2);
            }
            other => panic!("expected Reinforced, got {other:?}"),
        }

        let all = store.get_by_subject("user", None).expect("get");
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn ontology_violation_rejects_disallowed_predicate() {
        let store = MemStore::new();
        let clock = FixedClock::new(Utc::now());
        let candidate = base_atom(clock.now(), "works_at", "Google", 0.8);
        let err = Reconciler::reconcile(&store, &clock, None, candidate, DEFAULT_SIMILARITY_THRESHOLD)
            .expect_err("ontology violation");
        assert!(matches!(err, PltmError::OntologyViolation(_)));
    }
}
