//! # redb-backed `AtomStore`
//!
//! The production backend: ACID transactions, crash safety via
//! copy-on-write B-trees, MVCC. Secondary indexes (subject/graph/token) use
//! a "hash the lookup key into a fixed-width range-scannable prefix" trick
//! so composite keys stay sortable `TableDefinition` keys.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::AtomStore;
use crate::types::{
    Atom, AtomId, CalibrationCache, ClaimId, EpistemicIntervention, GraphKind, InterventionId,
    PltmError, PredictionRow,
};

const ATOMS: TableDefinition<u64, &[u8]> = TableDefinition::new("atoms");
/// `(hash(subject), atom_id) -> ()` (stored as `u8`), range-scanned by hash prefix.
const SUBJECT_INDEX: TableDefinition<(u64, u64), u8> = TableDefinition::new("subject_index");
/// `(graph as u8, atom_id) -> ()`.
const GRAPH_INDEX: TableDefinition<(u8, u64), u8> = TableDefinition::new("graph_index");
/// `(hash(token), atom_id) -> ()`.
const TOKEN_INDEX: TableDefinition<(u64, u64), u8> = TableDefinition::new("token_index");
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const PREDICTIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("predictions");
const DOMAIN_INDEX: TableDefinition<(u64, u64), u8> = TableDefinition::new("domain_index");
const CALIBRATION: TableDefinition<&str, &[u8]> = TableDefinition::new("calibration");
const INTERVENTIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("interventions");

fn hash_key(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

fn io_err(e: impl std::fmt::Display) -> PltmError {
    PltmError::External(e.to_string())
}

fn ser(value: &impl serde::Serialize) -> Result<Vec<u8>, PltmError> {
    postcard::to_allocvec(value).map_err(io_err)
}

fn de<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, PltmError> {
    postcard::from_bytes(bytes).map_err(io_err)
}

pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create a store at `path`, creating any missing tables.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PltmError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;
        {
            let write_txn = db.begin_write().map_err(io_err)?;
            let _ = write_txn.open_table(ATOMS).map_err(io_err)?;
            let _ = write_txn.open_table(SUBJECT_INDEX).map_err(io_err)?;
            let _ = write_txn.open_table(GRAPH_INDEX).map_err(io_err)?;
            let _ = write_txn.open_table(TOKEN_INDEX).map_err(io_err)?;
            let _ = write_txn.open_table(METADATA).map_err(io_err)?;
            let _ = write_txn.open_table(PREDICTIONS).map_err(io_err)?;
            let _ = write_txn.open_table(DOMAIN_INDEX).map_err(io_err)?;
            let _ = write_txn.open_table(CALIBRATION).map_err(io_err)?;
            let _ = write_txn.open_table(INTERVENTIONS).map_err(io_err)?;
            write_txn.commit().map_err(io_err)?;
        }
        Ok(Self { db })
    }

    fn next_counter(&self, key: &str) -> Result<u64, PltmError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        let next = {
            let mut table = write_txn.open_table(METADATA).map_err(io_err)?;
            let current = table
                .get(key)
                .map_err(io_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            let next = current + 1;
            table.insert(key, next).map_err(io_err)?;
            next
        };
        write_txn.commit().map_err(io_err)?;
        Ok(next)
    }

    fn index_tokens(&self, table: &mut redb::Table<'_, (u64, u64), u8>, text: &str, id: u64) -> Result<(), PltmError> {
        for token in crate::similarity::tokenize(text) {
            table.insert((hash_key(&token), id), 0u8).map_err(io_err)?;
        }
        Ok(())
    }

    /// Write `atom` (and its secondary index entries) within an
    /// already-open write transaction, so a caller can batch several atom
    /// writes into one commit. `previous` is the prior stored value (if
    /// any) whose stale index entries must be retracted first.
    fn write_atom_in_txn(&self, write_txn: &redb::WriteTransaction, atom: &Atom, previous: Option<&Atom>) -> Result<(), PltmError> {
        let bytes = ser(atom)?;
        let mut atoms = write_txn.open_table(ATOMS).map_err(io_err)?;
        let mut subject_idx = write_txn.open_table(SUBJECT_INDEX).map_err(io_err)?;
        let mut graph_idx = write_txn.open_table(GRAPH_INDEX).map_err(io_err)?;
        let mut token_idx = write_txn.open_table(TOKEN_INDEX).map_err(io_err)?;

        if let Some(old) = previous {
            subject_idx
                .remove((hash_key(&old.subject), old.id.0))
                .map_err(io_err)?;
            graph_idx
                .remove((old.graph as u8, old.id.0))
                .map_err(io_err)?;
            let old_text = format!("{} {} {}", old.subject, old.predicate, old.object);
            for token in crate::similarity::tokenize(&old_text) {
                token_idx
                    .remove((hash_key(&token), old.id.0))
                    .map_err(io_err)?;
            }
        }

        atoms.insert(atom.id.0, bytes.as_slice()).map_err(io_err)?;
        subject_idx
            .insert((hash_key(&atom.subject), atom.id.0), 0u8)
            .map_err(io_err)?;
        graph_idx
            .insert((atom.graph as u8, atom.id.0), 0u8)
            .map_err(io_err)?;
        let text = format!("{} {} {}", atom.subject, atom.predicate, atom.object);
        self.index_tokens(&mut token_idx, &text, atom.id.0)?;
        Ok(())
    }

    /// Write `atom` in its own transaction. Thin wrapper around
    /// [`Self::write_atom_in_txn`] for the single-atom mutation paths
    /// (`insert_atom`/`update_atom`/`delete_atom`'s sibling).
    fn write_atom(&self, atom: &Atom, previous: Option<&Atom>) -> Result<(), PltmError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        self.write_atom_in_txn(&write_txn, atom, previous)?;
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }
}

impl AtomStore for RedbStore {
    fn insert_atom(&self, atom: &Atom) -> Result<(), PltmError> {
        if self.get_atom(atom.id).is_ok() {
            return Err(PltmError::AlreadyExists(format!("atom {:?}", atom.id)));
        }
        self.write_atom(atom, None)
    }

    fn get_atom(&self, id: AtomId) -> Result<Atom, PltmError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(ATOMS).map_err(io_err)?;
        match table.get(id.0).map_err(io_err)? {
            Some(bytes) => de(bytes.value()),
            None => Err(PltmError::NotFound(format!("atom {id:?}"))),
        }
    }

    fn update_atom(&self, atom: &Atom) -> Result<(), PltmError> {
        let old = self.get_atom(atom.id)?;
        self.write_atom(atom, Some(&old))
    }

    fn delete_atom(&self, id: AtomId) -> Result<(), PltmError> {
        let old = self.get_atom(id)?;
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut atoms = write_txn.open_table(ATOMS).map_err(io_err)?;
            let mut subject_idx = write_txn.open_table(SUBJECT_INDEX).map_err(io_err)?;
            let mut graph_idx = write_txn.open_table(GRAPH_INDEX).map_err(io_err)?;
            let mut token_idx = write_txn.open_table(TOKEN_INDEX).map_err(io_err)?;

            atoms.remove(id.0).map_err(io_err)?;
            subject_idx
                .remove((hash_key(&old.subject), id.0))
                .map_err(io_err)?;
            graph_idx.remove((old.graph as u8, id.0)).map_err(io_err)?;
            let text = format!("{} {} {}", old.subject, old.predicate, old.object);
            for token in crate::similarity::tokenize(&text) {
                token_idx.remove((hash_key(&token), id.0)).map_err(io_err)?;
            }
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn next_atom_id(&self) -> Result<AtomId, PltmError> {
        Ok(AtomId(self.next_counter("next_atom_id")?))
    }

    fn all_atom_ids(&self) -> Result<Vec<AtomId>, PltmError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(ATOMS).map_err(io_err)?;
        let mut ids = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (key, _) = entry.map_err(io_err)?;
            ids.push(AtomId(key.value()));
        }
        Ok(ids)
    }

    fn ids_by_subject(&self, subject: &str) -> Result<Vec<AtomId>, PltmError> {
        let hash = hash_key(subject);
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(SUBJECT_INDEX).map_err(io_err)?;
        let mut ids = Vec::new();
        for entry in table
            .range((hash, 0u64)..=(hash, u64::MAX))
            .map_err(io_err)?
        {
            let (key, _) = entry.map_err(io_err)?;
            ids.push(AtomId(key.value().1));
        }
        Ok(ids)
    }

    fn ids_by_graph(&self, graph: GraphKind) -> Result<Vec<AtomId>, PltmError> {
        let tag = graph as u8;
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(GRAPH_INDEX).map_err(io_err)?;
        let mut ids = Vec::new();
        for entry in table.range((tag, 0u64)..=(tag, u64::MAX)).map_err(io_err)? {
            let (key, _) = entry.map_err(io_err)?;
            ids.push(AtomId(key.value().1));
        }
        Ok(ids)
    }

    fn ids_by_token(&self, token: &str) -> Result<Vec<AtomId>, PltmError> {
        let hash = hash_key(token);
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(TOKEN_INDEX).map_err(io_err)?;
        let mut ids = Vec::new();
        for entry in table
            .range((hash, 0u64)..=(hash, u64::MAX))
            .map_err(io_err)?
        {
            let (key, _) = entry.map_err(io_err)?;
            ids.push(AtomId(key.value().1));
        }
        Ok(ids)
    }

    /// One transaction covers the whole reconciliation decision: the
    /// winner's insert/update and every loser's demotion to HISTORICAL
    /// commit together, or none of them do.
    fn apply_reconciliation(&self, winner: &Atom, losers: &[Atom]) -> Result<(), PltmError> {
        let winner_previous = self.get_atom(winner.id).ok();
        let loser_previous: Vec<Option<Atom>> = losers.iter().map(|l| self.get_atom(l.id).ok()).collect();

        let write_txn = self.db.begin_write().map_err(io_err)?;
        self.write_atom_in_txn(&write_txn, winner, winner_previous.as_ref())?;
        for (loser, previous) in losers.iter().zip(loser_previous.iter()) {
            self.write_atom_in_txn(&write_txn, loser, previous.as_ref())?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn insert_prediction(&self, row: &PredictionRow) -> Result<(), PltmError> {
        if self.get_prediction(row.id).is_ok() {
            return Err(PltmError::AlreadyExists(format!("claim {:?}", row.id)));
        }
        let bytes = ser(row)?;
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut predictions = write_txn.open_table(PREDICTIONS).map_err(io_err)?;
            let mut domain_idx = write_txn.open_table(DOMAIN_INDEX).map_err(io_err)?;
            predictions.insert(row.id.0, bytes.as_slice()).map_err(io_err)?;
            domain_idx
                .insert((hash_key(&row.domain), row.id.0), 0u8)
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn get_prediction(&self, id: ClaimId) -> Result<PredictionRow, PltmError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(PREDICTIONS).map_err(io_err)?;
        match table.get(id.0).map_err(io_err)? {
            Some(bytes) => de(bytes.value()),
            None => Err(PltmError::NotFound(format!("claim {id:?}"))),
        }
    }

    fn update_prediction(&self, row: &PredictionRow) -> Result<(), PltmError> {
        self.get_prediction(row.id)?;
        let bytes = ser(row)?;
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut predictions = write_txn.open_table(PREDICTIONS).map_err(io_err)?;
            predictions.insert(row.id.0, bytes.as_slice()).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn next_claim_id(&self) -> Result<ClaimId, PltmError> {
        Ok(ClaimId(self.next_counter("next_claim_id")?))
    }

    fn ids_by_domain(&self, domain: &str) -> Result<Vec<ClaimId>, PltmError> {
        let hash = hash_key(domain);
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(DOMAIN_INDEX).map_err(io_err)?;
        let mut ids = Vec::new();
        for entry in table
            .range((hash, 0u64)..=(hash, u64::MAX))
            .map_err(io_err)?
        {
            let (key, _) = entry.map_err(io_err)?;
            ids.push(ClaimId(key.value().1));
        }
        Ok(ids)
    }

    fn all_claim_ids(&self) -> Result<Vec<ClaimId>, PltmError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(PREDICTIONS).map_err(io_err)?;
        let mut ids = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (key, _) = entry.map_err(io_err)?;
            ids.push(ClaimId(key.value()));
        }
        Ok(ids)
    }

    fn get_calibration(&self, domain: &str) -> Result<Option<CalibrationCache>, PltmError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(CALIBRATION).map_err(io_err)?;
        match table.get(domain).map_err(io_err)? {
            Some(bytes) => Ok(Some(de(bytes.value())?)),
            None => Ok(None),
        }
    }

    fn put_calibration(&self, cache: &CalibrationCache) -> Result<(), PltmError> {
        let bytes = ser(cache)?;
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = write_txn.open_table(CALIBRATION).map_err(io_err)?;
            table.insert(cache.domain.as_str(), bytes.as_slice()).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn all_calibration(&self) -> Result<Vec<CalibrationCache>, PltmError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(CALIBRATION).map_err(io_err)?;
        let mut caches = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            caches.push(de(value.value())?);
        }
        Ok(caches)
    }

    fn insert_intervention(&self, row: &EpistemicIntervention) -> Result<(), PltmError> {
        let bytes = ser(row)?;
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = write_txn.open_table(INTERVENTIONS).map_err(io_err)?;
            table.insert(row.id.0, bytes.as_slice()).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn next_intervention_id(&self) -> Result<InterventionId, PltmError> {
        Ok(InterventionId(self.next_counter("next_intervention_id")?))
    }

    fn get_intervention(&self, id: InterventionId) -> Result<EpistemicIntervention, PltmError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(INTERVENTIONS).map_err(io_err)?;
        match table.get(id.0).map_err(io_err)? {
            Some(bytes) => de(bytes.value()),
            None => Err(PltmError::NotFound(format!("intervention {id:?}"))),
        }
    }

    fn all_intervention_ids(&self) -> Result<Vec<InterventionId>, PltmError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(INTERVENTIONS).map_err(io_err)?;
        let mut ids = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (key, _) = entry.map_err(io_err)?;
            ids.push(InterventionId(key.value()));
        }
        Ok(ids)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{AtomType, Provenance};
    use chrono::Utc;

    fn sample(id: u64, subject: &str) -> Atom {
        let now = Utc::now();
        Atom {
            id: AtomId(id),
            subject: subject.into(),
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
            source_user: subject.into(),
            metadata: Default::default(),
        }
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("reopen.redb");
        {
            let store = RedbStore::open(&path).expect("open");
            store.insert_atom(&sample(1, "alice")).expect("insert");
        }
        {
            let store = RedbStore::open(&path).expect("reopen");
            let atom = store.get_atom(AtomId(1)).expect("get");
            assert_eq!(atom.subject, "alice");
        }
    }

    #[test]
    fn counters_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("counter.redb");
        let first;
        {
            let store = RedbStore::open(&path).expect("open");
            first = store.next_atom_id().expect("id");
        }
        {
            let store = RedbStore::open(&path).expect("reopen");
            let second = store.next_atom_id().expect("id");
            assert!(second.0 > first.0);
        }
    }

    #[test]
    fn update_moves_subject_index_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("update.redb");
        let store = RedbStore::open(&path).expect("open");
        let mut atom = sample(1, "alice");
        store.insert_atom(&atom).expect("insert");

        atom.subject = "bob".into();
        store.update_atom(&atom).expect("update");

        assert!(store.ids_by_subject("alice").expect("ids").is_empty());
        assert_eq!(store.ids_by_subject("bob").expect("ids").len(), 1);
    }
}
