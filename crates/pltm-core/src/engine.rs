//! # Engine
//!
//! `PltmEngine` is the facade `apps/pltm` and `apps/pltm-mcp` actually talk
//! to: one `Arc<dyn AtomStore>`, one `Clock`, an optional vector backend,
//! and a [`PltmConfig`], wrapped with the two pieces of state no stateless
//! engine in this crate owns on its own — per-(subject, predicate) advisory
//! locking around reconciliation, and the idle-activity clock the decay
//! worker's idle-trigger variant needs. Every other operation is a thin
//! pass-through to [`Reconciler`], [`Retriever`], or [`EpistemicMonitor`];
//! callers never touch `AtomStore` directly.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::PltmConfig;
use crate::decay;
use crate::epistemic::{self, CheckResult, EpistemicMonitor};
use crate::export::{CanonicalSnapshot, export_snapshot, import_snapshot};
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::retriever::{RetrievalWeights, Retriever, Scored};
use crate::similarity::VectorBackend;
use crate::store::AtomStore;
use crate::types::{
    Atom, AtomId, AtomType, CalibrationCache, ClaimId, Contexts, EpistemicStatus, GraphKind, Metadata, PltmError,
    Provenance,
};

/// Input to [`PltmEngine::store_atom`]; everything [`Reconciler::reconcile`]
/// needs that isn't derivable from the subject/predicate/object triple
/// itself.
#[derive(Debug, Clone)]
pub struct StoreAtomInput {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub atom_type: AtomType,
    pub provenance: Provenance,
    /// Defaults to `0.7`, the extractor's rule-based confidence.
    pub confidence: Option<f64>,
    pub contexts: Contexts,
    pub source_user: Option<String>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DecayRunReport {
    pub scanned: u64,
    pub dissolved: u64,
    pub reconsolidated: u64,
}

pub struct PltmEngine {
    store: Arc<dyn AtomStore>,
    clock: Arc<dyn Clock>,
    vector_backend: Option<Arc<dyn VectorBackend>>,
    config: PltmConfig,
    /// Sharded advisory locks keyed by `(subject, predicate)`, held for the
    /// duration of one reconciliation so two concurrent writers targeting
    /// the same slot serialize instead of racing the read-then-write
    /// conflict check.
    reconcile_locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
    /// Last time each subject saw a write or retrieval, for
    /// [`PltmEngine::run_idle_if_due`].
    last_activity: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl PltmEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn AtomStore>,
        clock: Arc<dyn Clock>,
        vector_backend: Option<Arc<dyn VectorBackend>>,
        config: PltmConfig,
    ) -> Self {
        Self {
            store,
            clock,
            vector_backend,
            config,
            reconcile_locks: Mutex::new(HashMap::new()),
            last_activity: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PltmConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &dyn AtomStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn backend(&self) -> Option<&dyn VectorBackend> {
        self.vector_backend.as_deref()
    }

    fn lock_for(&self, subject: &str, predicate: &str) -> Arc<Mutex<()>> {
        self.reconcile_locks
            .lock()
            .entry((subject.to_string(), predicate.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn mark_activity(&self, subject: &str) {
        self.last_activity.lock().insert(subject.to_string(), self.clock.now());
    }

    // -- writes -----------------------------------------------------------

    /// `POST /atoms`: build an unreconciled atom from
    /// `input` and run it through the reconciler under the (subject,
    /// predicate) lock.
    pub fn store_atom(&self, input: StoreAtomInput) -> Result<ReconcileOutcome, PltmError> {
        let now = self.clock.now();
        let confidence = input.confidence.unwrap_or(0.7).clamp(0.0, 1.0);
        let source_user = input.source_user.unwrap_or_else(|| input.subject.clone());

        let atom = Atom {
            id: AtomId(0),
            subject: input.subject,
            predicate: input.predicate,
            object: input.object,
            atom_type: input.atom_type,
            provenance: input.provenance,
            graph: input.provenance.default_graph(),
            confidence,
            strength: confidence,
            first_observed: now,
            last_accessed: now,
            assertion_count: 1,
            access_count: 0,
            contexts: input.contexts,
            source_user,
            metadata: input.metadata,
        };
        atom.validate()?;

        let lock = self.lock_for(&atom.subject, &atom.predicate);
        let _guard = lock.lock();
        self.mark_activity(&atom.subject);
        Reconciler::reconcile(
            self.store.as_ref(),
            self.clock.as_ref(),
            self.backend(),
            atom,
            self.config.reconcile.similarity_threshold,
        )
    }

    pub fn get_atom(&self, id: AtomId) -> Result<Atom, PltmError> {
        self.store.get_atom(id)
    }

    pub fn delete_atom(&self, id: AtomId) -> Result<(), PltmError> {
        self.store.delete_atom(id)
    }

    /// `GET /atoms`.
    pub fn find_triples(
        &self,
        subject: &str,
        predicate: Option<&str>,
        object: Option<&str>,
        include_historical: bool,
    ) -> Result<Vec<Atom>, PltmError> {
        self.store.find_by_triple(subject, predicate, object, !include_historical)
    }

    // -- retrieval ----------------------------------------------------------

    pub fn attention_retrieve(
        &self,
        subject: &str,
        query_text: &str,
        domain: Option<&str>,
        top_k: usize,
        weights: Option<RetrievalWeights>,
    ) -> Result<Vec<Scored>, PltmError> {
        self.mark_activity(subject);
        let weights = weights.unwrap_or_else(|| self.config.retrieve.weights());
        Retriever::attention_retrieve(
            self.store.as_ref(),
            self.clock.as_ref(),
            self.backend(),
            subject,
            query_text,
            domain,
            top_k,
            weights,
        )
    }

    /// Runs the three named heads (relevance/recency/
    /// confidence-heavy) and merges them.
    pub fn attention_multihead(
        &self,
        subject: &str,
        query_text: &str,
        domain: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<Scored>, PltmError> {
        self.mark_activity(subject);
        let heads = [
            RetrievalWeights::relevance_heavy(),
            RetrievalWeights::recency_heavy(),
            RetrievalWeights::confidence_heavy(),
        ];
        Retriever::attention_multihead(
            self.store.as_ref(),
            self.clock.as_ref(),
            self.backend(),
            subject,
            query_text,
            domain,
            top_k,
            &heads,
        )
    }

    pub fn mmr_retrieve(
        &self,
        subject: &str,
        query_text: &str,
        domain: Option<&str>,
        top_k: usize,
        lambda: Option<f64>,
        min_dissim: Option<f64>,
    ) -> Result<Vec<Atom>, PltmError> {
        self.mark_activity(subject);
        let lambda = lambda.unwrap_or(self.config.retrieve.mmr_lambda);
        let min_dissim = min_dissim.unwrap_or(self.config.retrieve.mmr_min_dissim);
        Retriever::mmr_retrieve(
            self.store.as_ref(),
            self.clock.as_ref(),
            self.backend(),
            subject,
            query_text,
            domain,
            top_k,
            lambda,
            min_dissim,
        )
    }

    pub fn inject_entropy_random(&self, subject: &str, n: usize) -> Result<Vec<Atom>, PltmError> {
        Retriever::inject_entropy_random(self.store.as_ref(), subject, n)
    }

    pub fn inject_entropy_antipodal(&self, subject: &str, query_text: &str, n: usize) -> Result<Vec<Atom>, PltmError> {
        Retriever::inject_entropy_antipodal(self.store.as_ref(), self.backend(), subject, query_text, n)
    }

    pub fn inject_entropy_temporal(&self, subject: &str, n: usize) -> Result<Vec<Atom>, PltmError> {
        Retriever::inject_entropy_temporal(self.store.as_ref(), subject, n)
    }

    // -- decay ----------------------------------------------------------------

    pub fn decay_stability(&self, id: AtomId) -> Result<f64, PltmError> {
        let atom = self.store.get_atom(id)?;
        Ok(decay::stability(&atom, self.clock.now()))
    }

    /// The scheduled, authoritative decay pass: dissolves UNSUBSTANTIATED
    /// atoms below `dissolve_threshold`, then auto-boosts SUBSTANTIATED
    /// atoms whose stability has fallen below `reconsolidate_threshold`
    /// (weakness), in place, with no graph change. Atoms in between are
    /// left untouched for the next pass.
    pub fn decay_run(&self) -> Result<DecayRunReport, PltmError> {
        let now = self.clock.now();
        let mut report = DecayRunReport::default();
        for id in self.store.ids_by_graph(GraphKind::Unsubstantiated)? {
            let Ok(atom) = self.store.get_atom(id) else { continue };
            self.dissolve_one(atom, now, &mut report)?;
        }
        for id in self.store.ids_by_graph(GraphKind::Substantiated)? {
            let Ok(atom) = self.store.get_atom(id) else { continue };
            self.reconsolidate_weak_one(atom, now, &mut report)?;
        }
        Ok(report)
    }

    /// The idle-trigger variant: runs the same pass scoped to
    /// one subject, but only if `idle_threshold` has elapsed since that
    /// subject's last recorded activity. Returns `None` when not due.
    pub fn run_idle_if_due(&self, subject: &str, idle_threshold: Duration) -> Result<Option<DecayRunReport>, PltmError> {
        let now = self.clock.now();
        let due = {
            let mut activity = self.last_activity.lock();
            let due = activity
                .get(subject)
                .is_none_or(|last| now.signed_duration_since(*last) >= idle_threshold);
            if due {
                activity.insert(subject.to_string(), now);
            }
            due
        };
        if !due {
            return Ok(None);
        }

        let mut report = DecayRunReport::default();
        for id in self.store.ids_by_subject(subject)? {
            let atom = self.store.get_atom(id)?;
            match atom.graph {
                GraphKind::Unsubstantiated => self.dissolve_one(atom, now, &mut report)?,
                GraphKind::Substantiated => self.reconsolidate_weak_one(atom, now, &mut report)?,
                GraphKind::Historical => {}
            }
        }
        Ok(Some(report))
    }

    /// Dissolve `atom` (must be UNSUBSTANTIATED) if its stability has
    /// fallen below `dissolve_threshold`.
    fn dissolve_one(&self, atom: Atom, now: DateTime<Utc>, report: &mut DecayRunReport) -> Result<(), PltmError> {
        report.scanned += 1;
        if decay::should_dissolve(&atom, now, self.config.decay.dissolve_threshold) {
            self.store.delete_atom(atom.id)?;
            report.dissolved += 1;
        }
        Ok(())
    }

    /// Auto-boost `atom` (must be SUBSTANTIATED) in place, with no graph
    /// change, if its stability has fallen below `reconsolidate_threshold`.
    fn reconsolidate_weak_one(&self, atom: Atom, now: DateTime<Utc>, report: &mut DecayRunReport) -> Result<(), PltmError> {
        report.scanned += 1;
        if decay::stability(&atom, now) < self.config.decay.reconsolidate_threshold {
            let mut boosted = atom;
            decay::reconsolidate(&mut boosted, now, decay::DEFAULT_RECONSOLIDATE_BOOST_FACTOR);
            self.store.update_atom(&boosted)?;
            report.reconsolidated += 1;
        }
        Ok(())
    }

    // -- epistemic monitor --------------------------------------------------

    pub fn check_before_claiming(
        &self,
        claim: &str,
        felt_confidence: f64,
        domain: &str,
        has_verified: bool,
        epistemic_status: EpistemicStatus,
    ) -> Result<CheckResult, PltmError> {
        EpistemicMonitor::check_before_claiming(
            self.store.as_ref(),
            self.clock.as_ref(),
            claim,
            felt_confidence,
            domain,
            has_verified,
            epistemic_status,
        )
    }

    pub fn log_claim(
        &self,
        claim: &str,
        felt_confidence: f64,
        domain: &str,
        epistemic_status: EpistemicStatus,
        has_verified: bool,
    ) -> Result<ClaimId, PltmError> {
        EpistemicMonitor::log_claim(
            self.store.as_ref(),
            self.clock.as_ref(),
            claim,
            felt_confidence,
            domain,
            epistemic_status,
            has_verified,
        )
    }

    pub fn resolve_claim(
        &self,
        claim_id: ClaimId,
        was_correct: bool,
        source: Option<&str>,
        detail: Option<&str>,
    ) -> Result<(f64, crate::types::CalibrationVerdict), PltmError> {
        EpistemicMonitor::resolve_claim(self.store.as_ref(), self.clock.as_ref(), claim_id, was_correct, source, detail)
    }

    pub fn get_calibration(&self, domain: &str) -> Result<Option<CalibrationCache>, PltmError> {
        self.store.get_calibration(domain)
    }

    pub fn calibration_curve(&self, domain: &str) -> Result<Vec<epistemic::CalibrationBucket>, PltmError> {
        epistemic::calibration_curve(self.store.as_ref(), domain)
    }

    // -- ambient: hash / export / import --------------------------------------

    /// `GET /hash`: the canonical checksum of the current atom + prediction
    /// state.
    pub fn hash(&self) -> Result<u64, PltmError> {
        Ok(CanonicalSnapshot::from_store(self.store.as_ref())?.checksum())
    }

    pub fn export(&self) -> Result<Vec<u8>, PltmError> {
        let snapshot = CanonicalSnapshot::from_store(self.store.as_ref())?;
        export_snapshot(&snapshot)
    }

    /// BLAKE3 hash of the current state, complementing [`Self::hash`]'s
    /// cheaper checksum for callers that need a collision-resistant digest.
    /// Requires the `crypto-hash` feature.
    #[cfg(feature = "crypto-hash")]
    pub fn crypto_hash(&self) -> Result<String, PltmError> {
        let snapshot = CanonicalSnapshot::from_store(self.store.as_ref())?;
        Ok(crate::export::canonical_crypto_hash(&snapshot))
    }

    pub fn import(&self, data: &[u8]) -> Result<(), PltmError> {
        let snapshot = import_snapshot(data)?;
        snapshot.restore_into(self.store.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::MemStore;

    fn engine_with(clock: Arc<FixedClock>) -> PltmEngine {
        PltmEngine::new(Arc::new(MemStore::new()), clock, None, PltmConfig::default())
    }

    fn input(subject: &str, predicate: &str, object: &str) -> StoreAtomInput {
        StoreAtomInput {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object: object.to_string(),
            atom_type: AtomType::Preference,
            provenance: Provenance::UserStated,
            confidence: None,
            contexts: vec![],
            source_user: None,
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn store_atom_then_find_triples_roundtrips() {
        let engine = engine_with(Arc::new(FixedClock::new(Utc::now())));
        engine.store_atom(input("user", "likes", "Python")).expect("store");

        let found = engine.find_triples("user", Some("likes"), None, false).expect("find");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].object, "Python");
    }

    #[test]
    fn decay_run_dissolves_weak_unsubstantiated_atoms() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let engine = engine_with(clock.clone());

        let mut weak = input("user", "used_to", "smoke");
        weak.atom_type = AtomType::Event;
        weak.provenance = Provenance::Extracted;
        weak.confidence = Some(0.01);
        engine.store_atom(weak).expect("store");

        clock.advance(Duration::days(365));
        let report = engine.decay_run().expect("decay");
        assert_eq!(report.dissolved, 1);
    }

    #[test]
    fn idle_trigger_only_fires_once_until_threshold_elapses_again() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let engine = engine_with(clock.clone());
        engine.mark_activity("user");

        let threshold = Duration::hours(1);
        assert!(engine.run_idle_if_due("user", threshold).expect("idle").is_none());

        clock.advance(Duration::hours(2));
        assert!(engine.run_idle_if_due("user", threshold).expect("idle").is_some());
        assert!(engine.run_idle_if_due("user", threshold).expect("idle").is_none());
    }

    #[test]
    fn epistemic_loop_through_engine() {
        let engine = engine_with(Arc::new(FixedClock::new(Utc::now())));
        let id = engine
            .log_claim("the sky is blue", 0.9, "general", EpistemicStatus::Inference, false)
            .expect("log");
        let (error, _) = engine.resolve_claim(id, true, None, None).expect("resolve");
        assert!((error - 0.1).abs() < 1e-9);
        assert!(engine.get_calibration("general").expect("get").is_some());
    }

    #[test]
    fn hash_export_import_roundtrip() {
        let engine = engine_with(Arc::new(FixedClock::new(Utc::now())));
        engine.store_atom(input("user", "likes", "tea")).expect("store");
        let hash_before = engine.hash().expect("hash");
        let bytes = engine.export().expect("export");

        let restored = engine_with(Arc::new(FixedClock::new(Utc::now())));
        restored.import(&bytes).expect("import");
        assert_eq!(restored.hash().expect("hash"), hash_before);
    }
}
