//! # Canonical Export Module
//!
//! > **The "redb Compromise":**
//! > - Runtime: the store uses `redb` for performance and ACID transactions.
//! > - Verification: `redb` files are NOT guaranteed bit-identical across runs.
//! > - Mandate: `export_snapshot()` serializes to a bit-exact `postcard` stream.
//! >   **This export is the Source of Truth for verification**.
//!
//! Deterministic, bit-exact serialization of the whole engine state: atoms,
//! the prediction book, the calibration cache, and epistemic interventions —
//! sorted by id so two exports of the same logical state always produce
//! identical bytes, independent of redb's on-disk B-tree layout.

use serde::{Deserialize, Serialize};

use crate::store::AtomStore;
use crate::types::{Atom, CalibrationCache, EpistemicIntervention, PltmError, PredictionRow};

pub const CANONICAL_MAGIC: [u8; 4] = *b"PLEX";
pub const CANONICAL_VERSION: u8 = 1;

/// Prevents memory exhaustion from a corrupted or hostile import.
pub const MAX_IMPORT_ATOM_COUNT: u64 = 10_000_000;
pub const MAX_IMPORT_CLAIM_COUNT: u64 = 10_000_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub atom_count: u64,
    pub claim_count: u64,
    pub checksum: u64,
}

impl CanonicalHeader {
    #[must_use]
    pub fn new(atom_count: u64, claim_count: u64, checksum: u64) -> Self {
        Self {
            magic: CANONICAL_MAGIC,
            version: CANONICAL_VERSION,
            atom_count,
            claim_count,
            checksum,
        }
    }

    /// # Security Note
    ///
    /// Error messages are intentionally generic: they must not leak format
    /// internals to whatever produced the corrupted input.
    pub fn validate(&self) -> Result<(), PltmError> {
        if self.magic != CANONICAL_MAGIC {
            return Err(PltmError::InvalidArgument("invalid file format".to_string()));
        }
        if self.version != CANONICAL_VERSION {
            return Err(PltmError::InvalidArgument("unsupported file version".to_string()));
        }
        Ok(())
    }
}

/// A snapshot of the whole engine state, every field sorted for determinism.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalSnapshot {
    pub atoms: Vec<Atom>,
    pub predictions: Vec<PredictionRow>,
    pub calibration: Vec<CalibrationCache>,
    pub interventions: Vec<EpistemicIntervention>,
}

impl CanonicalSnapshot {
    /// Collect and sort every record out of `store`.
    pub fn from_store(store: &dyn AtomStore) -> Result<Self, PltmError> {
        let mut atoms = Vec::new();
        for id in store.all_atom_ids()? {
            atoms.push(store.get_atom(id)?);
        }
        atoms.sort_by_key(|a| a.id);

        let mut predictions = Vec::new();
        for id in store.all_claim_ids()? {
            predictions.push(store.get_prediction(id)?);
        }
        predictions.sort_by_key(|p| p.id);

        let mut calibration = store.all_calibration()?;
        calibration.sort_by(|a, b| a.domain.cmp(&b.domain));

        let mut interventions = Vec::new();
        for id in store.all_intervention_ids()? {
            interventions.push(store.get_intervention(id)?);
        }
        interventions.sort_by_key(|i| i.id);

        Ok(Self {
            atoms,
            predictions,
            calibration,
            interventions,
        })
    }

    #[must_use]
    pub fn with_calibration(mut self, mut calibration: Vec<CalibrationCache>) -> Self {
        calibration.sort_by(|a, b| a.domain.cmp(&b.domain));
        self.calibration = calibration;
        self
    }

    #[must_use]
    pub fn with_interventions(mut self, mut interventions: Vec<EpistemicIntervention>) -> Self {
        interventions.sort_by_key(|i| i.id);
        self.interventions = interventions;
        self
    }

    /// Restore every record into `store` (insert if absent, overwrite if
    /// present — an import is a full state replacement for records it
    /// names).
    pub fn restore_into(&self, store: &dyn AtomStore) -> Result<(), PltmError> {
        for atom in &self.atoms {
            if store.get_atom(atom.id).is_ok() {
                store.update_atom(atom)?;
            } else {
                store.insert_atom(atom)?;
            }
        }
        for row in &self.predictions {
            if store.get_prediction(row.id).is_ok() {
                store.update_prediction(row)?;
            } else {
                store.insert_prediction(row)?;
            }
        }
        for cache in &self.calibration {
            store.put_calibration(cache)?;
        }
        for intervention in &self.interventions {
            store.insert_intervention(intervention)?;
        }
        Ok(())
    }

    /// Deterministic, non-cryptographic XOR/rotate checksum. Detects
    /// accidental corruption and drift between snapshots; it is explicitly
    /// not collision-resistant.
    #[must_use]
    pub fn checksum(&self) -> u64 {
        let mut hash: u64 = 0;

        for atom in &self.atoms {
            hash ^= atom.id.0.rotate_left(13);
            for byte in atom.subject.as_bytes() {
                hash ^= u64::from(*byte).rotate_left(3);
            }
            for byte in atom.predicate.as_bytes() {
                hash ^= u64::from(*byte).rotate_left(5);
            }
            for byte in atom.object.as_bytes() {
                hash ^= u64::from(*byte).rotate_left(7);
            }
            hash ^= atom.confidence.to_bits().rotate_left(11);
            hash ^= atom.strength.to_bits().rotate_left(17);
            hash ^= atom.assertion_count.rotate_left(19);
            hash ^= atom.access_count.rotate_left(23);
        }

        for row in &self.predictions {
            hash ^= row.id.0.rotate_left(29);
            for byte in row.claim.as_bytes() {
                hash ^= u64::from(*byte).rotate_left(31);
            }
            hash ^= row.felt_confidence.to_bits().rotate_left(37);
        }

        for cache in &self.calibration {
            for byte in cache.domain.as_bytes() {
                hash ^= u64::from(*byte).rotate_left(41);
            }
            hash ^= cache.total_claims.rotate_left(43);
        }

        for intervention in &self.interventions {
            hash ^= intervention.id.0.rotate_left(47);
        }

        hash
    }
}

// =============================================================================
// OPTIONAL CRYPTOGRAPHIC HASH
// =============================================================================

/// Compute a BLAKE3 cryptographic hash of a snapshot's canonical postcard
/// bytes. Collision-resistant, unlike [`CanonicalSnapshot::checksum`] — for
/// callers that need to hand a hash to something outside this process.
///
/// Returns the hash as a lowercase hex string (64 characters). Requires the
/// `crypto-hash` feature.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn canonical_crypto_hash(snapshot: &CanonicalSnapshot) -> String {
    let data = export_snapshot(snapshot).unwrap_or_default();
    blake3::hash(&data).to_hex().to_string()
}

/// Verify a snapshot against a previously computed BLAKE3 hash.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn verify_crypto_hash(snapshot: &CanonicalSnapshot, expected_hash: &str) -> bool {
    canonical_crypto_hash(snapshot) == expected_hash
}

/// Hash arbitrary bytes with BLAKE3, independent of the snapshot format.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn compute_blake3_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Export the whole engine state to canonical postcard bytes:
/// `[header_len: u32 LE][header][data]`.
pub fn export_snapshot(snapshot: &CanonicalSnapshot) -> Result<Vec<u8>, PltmError> {
    let checksum = snapshot.checksum();
    let header = CanonicalHeader::new(
        snapshot.atoms.len() as u64,
        snapshot.predictions.len() as u64,
        checksum,
    );

    let header_bytes = postcard::to_allocvec(&header).map_err(|e| PltmError::Internal(format!("header: {e}")))?;
    let data_bytes = postcard::to_allocvec(snapshot).map_err(|e| PltmError::Internal(format!("data: {e}")))?;

    let mut result = Vec::with_capacity(4 + header_bytes.len() + data_bytes.len());
    result.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    result.extend_from_slice(&header_bytes);
    result.extend_from_slice(&data_bytes);
    Ok(result)
}

/// Parse and validate canonical postcard bytes back into a snapshot. Does
/// not touch any store — pair with [`CanonicalSnapshot::restore_into`].
pub fn import_snapshot(data: &[u8]) -> Result<CanonicalSnapshot, PltmError> {
    if data.len() < 4 {
        return Err(PltmError::InvalidArgument("data too short".to_string()));
    }
    let header_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if data.len() < 4 + header_len {
        return Err(PltmError::InvalidArgument("data too short for header".to_string()));
    }

    let header: CanonicalHeader =
        postcard::from_bytes(&data[4..4 + header_len]).map_err(|e| PltmError::InvalidArgument(format!("header: {e}")))?;
    header.validate()?;

    if header.atom_count > MAX_IMPORT_ATOM_COUNT {
        return Err(PltmError::InvalidArgument(format!(
            "atom count {} exceeds maximum allowed {MAX_IMPORT_ATOM_COUNT}",
            header.atom_count
        )));
    }
    if header.claim_count > MAX_IMPORT_CLAIM_COUNT {
        return Err(PltmError::InvalidArgument(format!(
            "claim count {} exceeds maximum allowed {MAX_IMPORT_CLAIM_COUNT}",
            header.claim_count
        )));
    }

    let snapshot: CanonicalSnapshot =
        postcard::from_bytes(&data[4 + header_len..]).map_err(|e| PltmError::InvalidArgument(format!("data: {e}")))?;

    if snapshot.checksum() != header.checksum {
        return Err(PltmError::InvalidArgument(format!(
            "checksum mismatch: expected {}, got {}",
            header.checksum,
            snapshot.checksum()
        )));
    }
    if snapshot.atoms.len() as u64 != header.atom_count {
        return Err(PltmError::InvalidArgument("atom count mismatch".to_string()));
    }
    if snapshot.predictions.len() as u64 != header.claim_count {
        return Err(PltmError::InvalidArgument("claim count mismatch".to_string()));
    }

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;
    use crate::types::{AtomId, AtomType, GraphKind, Provenance};
    use chrono::Utc;

    fn populated_store() -> MemStore {
        let store = MemStore::new();
        let now = Utc::now();
        for (subject, object) in [("alice", "tea"), ("bob", "coffee")] {
            let id = store.next_atom_id().expect("id");
            let atom = Atom {
                id,
                subject: subject.into(),
                predicate: "likes".into(),
                object: object.into(),
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
            };
            store.insert_atom(&atom).expect("insert");
        }
        store
    }

    #[test]
    fn snapshot_roundtrip() {
        let store = populated_store();
        let snapshot = CanonicalSnapshot::from_store(&store).expect("snapshot");
        let bytes = export_snapshot(&snapshot).expect("export");
        let imported = import_snapshot(&bytes).expect("import");
        assert_eq!(imported.atoms.len(), 2);

        let restored = MemStore::new();
        imported.restore_into(&restored).expect("restore");
        assert_eq!(restored.all_atom_ids().expect("ids").len(), 2);
    }

    #[test]
    fn export_is_byte_identical_across_runs() {
        let store = populated_store();
        let snapshot = CanonicalSnapshot::from_store(&store).expect("snapshot");
        let a = export_snapshot(&snapshot).expect("export 1");
        let b = export_snapshot(&snapshot).expect("export 2");
        assert_eq!(a, b);
    }

    #[test]
    fn checksum_detects_corruption() {
        let store = populated_store();
        let snapshot = CanonicalSnapshot::from_store(&store).expect("snapshot");
        let mut bytes = export_snapshot(&snapshot).expect("export");
        if let Some(last) = bytes.last_mut() {
            *last ^= 0xFF;
        }
        assert!(import_snapshot(&bytes).is_err());
    }

    #[test]
    fn rejects_bad_magic() {
        let header = CanonicalHeader {
            magic: *b"XXXX",
            version: CANONICAL_VERSION,
            atom_count: 0,
            claim_count: 0,
            checksum: 0,
        };
        assert!(header.validate().is_err());
    }

    #[test]
    fn atoms_are_sorted_by_id() {
        let store = MemStore::new();
        let now = Utc::now();
        for n in [3u64, 1, 2] {
            let atom = Atom {
                id: AtomId(n),
                subject: "x".into(),
                predicate: "likes".into(),
                object: "y".into(),
                atom_type: AtomType::Preference,
                provenance: Provenance::UserStated,
                graph: GraphKind::Substantiated,
                confidence: 0.5,
                strength: 0.5,
                first_observed: now,
                last_accessed: now,
                assertion_count: 1,
                access_count: 0,
                contexts: vec![],
                source_user: "x".into(),
                metadata: Default::default(),
            };
            store.insert_atom(&atom).expect("insert");
        }
        let snapshot = CanonicalSnapshot::from_store(&store).expect("snapshot");
        let ids: Vec<u64> = snapshot.atoms.iter().map(|a| a.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[cfg(feature = "crypto-hash")]
    #[test]
    fn crypto_hash_is_deterministic_and_detects_changes() {
        let store = populated_store();
        let snapshot = CanonicalSnapshot::from_store(&store).expect("snapshot");
        let hash_a = canonical_crypto_hash(&snapshot);
        let hash_b = canonical_crypto_hash(&snapshot);
        assert_eq!(hash_a, hash_b);
        assert_eq!(hash_a.len(), 64);
        assert!(verify_crypto_hash(&snapshot, &hash_a));

        let mut other_store = populated_store();
        let extra_id = other_store.next_atom_id().expect("id");
        let now = Utc::now();
        other_store
            .insert_atom(&Atom {
                id: extra_id,
                subject: "carol".into(),
                predicate: "likes".into(),
                object: "cocoa".into(),
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
                source_user: "carol".into(),
                metadata: Default::default(),
            })
            .expect("insert");
        let other_snapshot = CanonicalSnapshot::from_store(&other_store).expect("snapshot");
        assert_ne!(canonical_crypto_hash(&other_snapshot), hash_a);
    }

    #[test]
    fn empty_snapshot_roundtrips() {
        let store = MemStore::new();
        let snapshot = CanonicalSnapshot::from_store(&store).expect("snapshot");
        let bytes = export_snapshot(&snapshot).expect("export");
        let imported = import_snapshot(&bytes).expect("import");
        assert!(imported.atoms.is_empty());
    }

    #[test]
    fn calibration_and_interventions_survive_export_roundtrip() {
        use crate::types::{CalibrationCache, EpistemicIntervention, InterventionId, Metadata};

        let store = populated_store();
        let now = Utc::now();

        let mut cache = CalibrationCache::baseline("medical", now);
        cache.total_claims = 5;
        cache.correct_claims = 1;
        store.put_calibration(&cache).expect("put calibration");

        let intervention = EpistemicIntervention {
            id: InterventionId(1),
            timestamp: now,
            claim: "this drug cures everything".into(),
            domain: "medical".into(),
            felt_confidence: 0.9,
            adjusted_confidence: 0.2,
            action_taken: "hedged".into(),
            should_have_verified: true,
            did_verify: false,
            outcome: "pending".into(),
            metadata: Metadata::default(),
        };
        store.insert_intervention(&intervention).expect("insert intervention");

        let snapshot = CanonicalSnapshot::from_store(&store).expect("snapshot");
        assert_eq!(snapshot.calibration.len(), 1);
        assert_eq!(snapshot.interventions.len(), 1);

        let bytes = export_snapshot(&snapshot).expect("export");
        let imported = import_snapshot(&bytes).expect("import");
        assert_eq!(imported.calibration[0].domain, "medical");
        assert_eq!(imported.interventions[0].claim, "this drug cures everything");

        let restored = MemStore::new();
        imported.restore_into(&restored).expect("restore");
        assert_eq!(
            restored
                .get_calibration("medical")
                .expect("get calibration")
                .expect("present")
                .total_claims,
            5
        );
        assert_eq!(
            restored
                .get_intervention(InterventionId(1))
                .expect("get intervention")
                .outcome,
            "pending"
        );
    }
}
