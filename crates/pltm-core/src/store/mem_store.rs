//! In-memory `AtomStore`, `BTreeMap`-backed for deterministic ordering.
//! Used by tests and the CLI's ephemeral mode.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::AtomStore;
use crate::types::{
    Atom, AtomId, CalibrationCache, ClaimId, EpistemicIntervention, GraphKind, InterventionId,
    PltmError, PredictionRow,
};

#[derive(Default)]
pub struct MemStore {
    atoms: RwLock<BTreeMap<AtomId, Atom>>,
    subject_index: RwLock<BTreeMap<String, BTreeSet<AtomId>>>,
    graph_index: RwLock<BTreeMap<GraphKind, BTreeSet<AtomId>>>,
    token_index: RwLock<BTreeMap<String, BTreeSet<AtomId>>>,
    next_atom_id: AtomicU64,

    predictions: RwLock<BTreeMap<ClaimId, PredictionRow>>,
    domain_index: RwLock<BTreeMap<String, BTreeSet<ClaimId>>>,
    next_claim_id: AtomicU64,

    calibration: RwLock<BTreeMap<String, CalibrationCache>>,

    interventions: RwLock<BTreeMap<InterventionId, EpistemicIntervention>>,
    next_intervention_id: AtomicU64,
}

impl MemStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn index_atom(&self, atom: &Atom) {
        self.subject_index
            .write()
            .entry(atom.subject.clone())
            .or_default()
            .insert(atom.id);
        self.graph_index
            .write()
            .entry(atom.graph)
            .or_default()
            .insert(atom.id);
        let text = format!("{} {} {}", atom.subject, atom.predicate, atom.object);
        for token in crate::similarity::tokenize(&text) {
            self.token_index.write().entry(token).or_default().insert(atom.id);
        }
    }

    fn unindex_atom(&self, atom: &Atom) {
        if let Some(set) = self.subject_index.write().get_mut(&atom.subject) {
            set.remove(&atom.id);
        }
        if let Some(set) = self.graph_index.write().get_mut(&atom.graph) {
            set.remove(&atom.id);
        }
        let text = format!("{} {} {}", atom.subject, atom.predicate, atom.object);
        for token in crate::similarity::tokenize(&text) {
            if let Some(set) = self.token_index.write().get_mut(&token) {
                set.remove(&atom.id);
            }
        }
    }
}

impl AtomStore for MemStore {
    fn insert_atom(&self, atom: &Atom) -> Result<(), PltmError> {
        let mut atoms = self.atoms.write();
        if atoms.contains_key(&atom.id) {
            return Err(PltmError::AlreadyExists(format!("atom {:?}", atom.id)));
        }
        atoms.insert(atom.id, atom.clone());
        drop(atoms);
        self.index_atom(atom);
        Ok(())
    }

    fn get_atom(&self, id: AtomId) -> Result<Atom, PltmError> {
        self.atoms
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| PltmError::NotFound(format!("atom {id:?}")))
    }

    fn update_atom(&self, atom: &Atom) -> Result<(), PltmError> {
        let old = {
            let atoms = self.atoms.read();
            atoms
                .get(&atom.id)
                .cloned()
                .ok_or_else(|| PltmError::NotFound(format!("atom {:?}", atom.id)))?
        };
        self.unindex_atom(&old);
        self.atoms.write().insert(atom.id, atom.clone());
        self.index_atom(atom);
        Ok(())
    }

    fn delete_atom(&self, id: AtomId) -> Result<(), PltmError> {
        let atom = self
            .atoms
            .write()
            .remove(&id)
            .ok_or_else(|| PltmError::NotFound(format!("atom {id:?}")))?;
        self.unindex_atom(&atom);
        Ok(())
    }

    fn next_atom_id(&self) -> Result<AtomId, PltmError> {
        Ok(AtomId(self.next_atom_id.fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn all_atom_ids(&self) -> Result<Vec<AtomId>, PltmError> {
        Ok(self.atoms.read().keys().copied().collect())
    }

    fn ids_by_subject(&self, subject: &str) -> Result<Vec<AtomId>, PltmError> {
        Ok(self
            .subject_index
            .read()
            .get(subject)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    fn ids_by_graph(&self, graph: GraphKind) -> Result<Vec<AtomId>, PltmError> {
        Ok(self
            .graph_index
            .read()
            .get(&graph)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    fn ids_by_token(&self, token: &str) -> Result<Vec<AtomId>, PltmError> {
        Ok(self
            .token_index
            .read()
            .get(token)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    fn apply_reconciliation(&self, winner: &Atom, losers: &[Atom]) -> Result<(), PltmError> {
        if self.atoms.read().contains_key(&winner.id) {
            self.update_atom(winner)?;
        } else {
            self.insert_atom(winner)?;
        }
        for loser in losers {
            let mut demoted = loser.clone();
            demoted.graph = GraphKind::Historical;
            self.update_atom(&demoted)?;
        }
        Ok(())
    }

    fn insert_prediction(&self, row: &PredictionRow) -> Result<(), PltmError> {
        let mut predictions = self.predictions.write();
        if predictions.contains_key(&row.id) {
            return Err(PltmError::AlreadyExists(format!("claim {:?}", row.id)));
        }
        predictions.insert(row.id, row.clone());
        drop(predictions);
        self.domain_index
            .write()
            .entry(row.domain.clone())
            .or_default()
            .insert(row.id);
        Ok(())
    }

    fn get_prediction(&self, id: ClaimId) -> Result<PredictionRow, PltmError> {
        self.predictions
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| PltmError::NotFound(format!("claim {id:?}")))
    }

    fn update_prediction(&self, row: &PredictionRow) -> Result<(), PltmError> {
        let mut predictions = self.predictions.write();
        if !predictions.contains_key(&row.id) {
            return Err(PltmError::NotFound(format!("claim {:?}", row.id)));
        }
        predictions.insert(row.id, row.clone());
        Ok(())
    }

    fn next_claim_id(&self) -> Result<ClaimId, PltmError> {
        Ok(ClaimId(self.next_claim_id.fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn ids_by_domain(&self, domain: &str) -> Result<Vec<ClaimId>, PltmError> {
        Ok(self
            .domain_index
            .read()
            .get(domain)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    fn all_claim_ids(&self) -> Result<Vec<ClaimId>, PltmError> {
        Ok(self.predictions.read().keys().copied().collect())
    }

    fn get_calibration(&self, domain: &str) -> Result<Option<CalibrationCache>, PltmError> {
        Ok(self.calibration.read().get(domain).cloned())
    }

    fn put_calibration(&self, cache: &CalibrationCache) -> Result<(), PltmError> {
        self.calibration
            .write()
            .insert(cache.domain.clone(), cache.clone());
        Ok(())
    }

    fn all_calibration(&self) -> Result<Vec<CalibrationCache>, PltmError> {
        Ok(self.calibration.read().values().cloned().collect())
    }

    fn insert_intervention(&self, row: &EpistemicIntervention) -> Result<(), PltmError> {
        self.interventions.write().insert(row.id, row.clone());
        Ok(())
    }

    fn next_intervention_id(&self) -> Result<InterventionId, PltmError> {
        Ok(InterventionId(
            self.next_intervention_id.fetch_add(1, Ordering::SeqCst) + 1,
        ))
    }

    fn get_intervention(&self, id: InterventionId) -> Result<EpistemicIntervention, PltmError> {
        self.interventions
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| PltmError::NotFound(format!("intervention {id:?}")))
    }

    fn all_intervention_ids(&self) -> Result<Vec<InterventionId>, PltmError> {
        Ok(self.interventions.read().keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AtomType, Provenance};
    use chrono::Utc;

    #[test]
    fn update_reindexes_on_subject_change() {
        let store = MemStore::new();
        let now = Utc::now();
        let id = store.next_atom_id().expect("id");
        let mut atom = Atom {
            id,
            subject: "alice".into(),
            predicate: "likes".into(),
            object: "tea".into(),
            atom_type: AtomType::Preference,
            provenance: Provenance::UserStated,
            graph: GraphKind::Substantiated,
            confidence: 0.9,
            strength: 0.9,
            first_observed: now,
            last_accessed: now,
            assertion_count: 1,
            access_count: 0,
            contexts: vec![],
            source_user: "alice".into(),
            metadata: Default::default(),
        };
        store.insert_atom(&atom).expect("insert");

        atom.subject = "bob".into();
        store.update_atom(&atom).expect("update");

        assert!(store.ids_by_subject("alice").expect("ids").is_empty());
        assert_eq!(store.ids_by_subject("bob").expect("ids").len(), 1);
    }
}
