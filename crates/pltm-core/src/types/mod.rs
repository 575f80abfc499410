//! # Core Type Definitions
//!
//! The atom model: the single typed record the rest of the engine operates
//! on, plus the prediction-book row, the closed enums that classify an atom,
//! the metadata blob, and the error type.
//!
//! ## Determinism Guarantees
//!
//! `AtomId`/`ClaimId` use `Ord` for deterministic ordering in `BTreeMap`/
//! `BTreeSet`. `assertion_count`/`access_count` use saturating arithmetic.
//! `confidence` and `strength` are continuous-valued by specification (the
//! Ebbinghaus decay curve and cosine-similarity scoring require it) — see
//! `crate::decay` and DESIGN.md.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Unique, stable identifier for an atom, assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AtomId(pub u64);

/// Unique identifier for a prediction-book row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClaimId(pub u64);

/// Unique identifier for a logged epistemic intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InterventionId(pub u64);

// =============================================================================
// LENGTH LIMITS
// =============================================================================

pub const MAX_SUBJECT_LENGTH: usize = 200;
pub const MAX_PREDICATE_LENGTH: usize = 100;
pub const MAX_OBJECT_LENGTH: usize = 500;

// =============================================================================
// ATOM TYPE (ontology closed set)
// =============================================================================

/// The closed set of atom types. Each carries ontology rules in
/// `crate::ontology` (decay rate, exclusivity, contextuality, progression).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AtomType {
    Entity,
    Affiliation,
    Social,
    Skill,
    Preference,
    Belief,
    Event,
    State,
    Hypothesis,
    Invariant,
    /// Legacy generic bucket, liberal predicate admission. Prefer a more
    /// specific variant for new atoms; this one exists so data stored under
    /// it before a better type was chosen keeps working.
    Relation,
}

impl AtomType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entity => "ENTITY",
            Self::Affiliation => "AFFILIATION",
            Self::Social => "SOCIAL",
            Self::Skill => "SKILL",
            Self::Preference => "PREFERENCE",
            Self::Belief => "BELIEF",
            Self::Event => "EVENT",
            Self::State => "STATE",
            Self::Hypothesis => "HYPOTHESIS",
            Self::Invariant => "INVARIANT",
            Self::Relation => "RELATION",
        }
    }
}

impl std::fmt::Display for AtomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// PROVENANCE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Provenance {
    UserStated,
    Inferred,
    Extracted,
    External,
}

impl Provenance {
    /// Tie-break rank used by the reconciler: higher wins.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::UserStated => 3,
            Self::Extracted => 2,
            Self::Inferred => 1,
            Self::External => 0,
        }
    }

    /// The sub-graph a freshly-inserted atom of this provenance enters
    ///, absent an explicit override.
    #[must_use]
    pub const fn default_graph(self) -> GraphKind {
        match self {
            Self::UserStated => GraphKind::Substantiated,
            Self::Inferred | Self::Extracted | Self::External => GraphKind::Unsubstantiated,
        }
    }
}

// =============================================================================
// GRAPH KIND (the three sub-graphs)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GraphKind {
    Unsubstantiated,
    Substantiated,
    Historical,
}

// =============================================================================
// METADATA (tagged union over a closed vocabulary instead of untyped
// runtime reflection)
// =============================================================================

/// A constrained, recursive value type for the atom's free-form metadata
/// blob. Closed leaf vocabulary (text/number/bool), open nesting (list/map),
/// stored opaquely by the store — never interpreted by core logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataValue {
    Text(String),
    Number(f64),
    Bool(bool),
    List(Vec<MetadataValue>),
    Map(BTreeMap<String, MetadataValue>),
}

/// The metadata blob attached to an atom: source URL, quoted span, authors,
/// and any other free-form structured detail.
pub type Metadata = BTreeMap<String, MetadataValue>;

// =============================================================================
// CONTEXTS
// =============================================================================

/// Ordered set of short domain tags (e.g. `["military", "geopolitics"]`).
/// A `Vec` rather than a `BTreeSet`: insertion order is meaningful to callers
/// inspecting an atom (most-specific-first conventions), while membership
/// tests (disjointness, intersection) treat it as a set.
pub type Contexts = Vec<String>;

#[must_use]
pub fn contexts_disjoint(a: &Contexts, b: &Contexts) -> bool {
    !a.iter().any(|x| b.contains(x))
}

#[must_use]
pub fn contexts_intersect(a: &Contexts, domain: &str) -> bool {
    a.iter().any(|c| c == domain)
}

// =============================================================================
// ATOM
// =============================================================================

/// An atom is an immutable-by-convention record representing one claim.
/// Mutation is restricted to reconsolidation (confidence, `last_accessed`,
/// `access_count`), reinforcement (`assertion_count`), and graph transitions
/// performed by the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub id: AtomId,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub atom_type: AtomType,
    pub provenance: Provenance,
    pub graph: GraphKind,
    /// Current strength, mutated by reconsolidation and assertion. `[0,1]`.
    pub confidence: f64,
    /// Initial strength at creation, immutable thereafter. `[0,1]`.
    pub strength: f64,
    pub first_observed: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub assertion_count: u64,
    pub access_count: u64,
    pub contexts: Contexts,
    /// The subject owner, for multi-tenant isolation. Usually equal to
    /// `subject`, but kept distinct so a third party's claim about a
    /// subject can still be scoped to the owner who reported it.
    pub source_user: String,
    pub metadata: Metadata,
}

impl Atom {
    /// Validate the invariants that apply to any single atom in
    /// isolation (cross-atom invariants — uniqueness, exclusivity — are the
    /// store's and reconciler's job).
    pub fn validate(&self) -> Result<(), PltmError> {
        if self.subject.is_empty() || self.subject.len() > MAX_SUBJECT_LENGTH {
            return Err(PltmError::InvalidArgument(format!(
                "subject must be 1..={MAX_SUBJECT_LENGTH} chars, got {}",
                self.subject.len()
            )));
        }
        if self.predicate.is_empty() || self.predicate.len() > MAX_PREDICATE_LENGTH {
            return Err(PltmError::InvalidArgument(format!(
                "predicate must be 1..={MAX_PREDICATE_LENGTH} chars, got {}",
                self.predicate.len()
            )));
        }
        if self.object.len() > MAX_OBJECT_LENGTH {
            return Err(PltmError::InvalidArgument(format!(
                "object must be <= {MAX_OBJECT_LENGTH} chars, got {}",
                self.object.len()
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(PltmError::InvalidArgument(format!(
                "confidence out of range: {}",
                self.confidence
            )));
        }
        if !(0.0..=1.0).contains(&self.strength) {
            return Err(PltmError::InvalidArgument(format!(
                "strength out of range: {}",
                self.strength
            )));
        }
        if self.first_observed > self.last_accessed {
            return Err(PltmError::InvalidArgument(
                "first_observed must be <= last_accessed".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether this atom is visible to a default (non-historical) read.
    #[must_use]
    pub const fn is_default_visible(&self) -> bool {
        !matches!(self.graph, GraphKind::Historical)
    }
}

// =============================================================================
// PREDICTION BOOK
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EpistemicStatus {
    Verified,
    TrainingData,
    Inference,
    Speculation,
    Uncertain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub id: ClaimId,
    pub timestamp: DateTime<Utc>,
    pub claim: String,
    pub domain: String,
    pub felt_confidence: f64,
    pub epistemic_status: EpistemicStatus,
    pub has_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub actual_truth: Option<bool>,
    pub was_correct: Option<bool>,
    pub calibration_error: Option<f64>,
    pub correction_source: Option<String>,
    pub correction_detail: Option<String>,
}

impl PredictionRow {
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.was_correct.is_some()
    }
}

// =============================================================================
// CALIBRATION CACHE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationVerdict {
    WellCalibrated,
    Overconfident,
    SeverelyOverconfident,
    Underconfident,
    HighConfidenceFailures,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationCache {
    pub domain: String,
    pub total_claims: u64,
    pub verified_claims: u64,
    pub correct_claims: u64,
    pub accuracy_ratio: f64,
    pub avg_felt_confidence: f64,
    pub avg_calibration_error: f64,
    pub overconfidence_ratio: f64,
    pub last_updated: DateTime<Utc>,
}

impl CalibrationCache {
    #[must_use]
    pub fn baseline(domain: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            domain: domain.into(),
            total_claims: 0,
            verified_claims: 0,
            correct_claims: 0,
            accuracy_ratio: 0.6,
            avg_felt_confidence: 0.0,
            avg_calibration_error: 0.0,
            overconfidence_ratio: 0.3,
            last_updated: now,
        }
    }
}

// =============================================================================
// EPISTEMIC INTERVENTIONS (persisted audit row for pre-claim checks)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpistemicIntervention {
    pub id: InterventionId,
    pub timestamp: DateTime<Utc>,
    pub claim: String,
    pub domain: String,
    pub felt_confidence: f64,
    pub adjusted_confidence: f64,
    pub action_taken: String,
    pub should_have_verified: bool,
    pub did_verify: bool,
    pub outcome: String,
    pub metadata: Metadata,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the PLTM engine. Each variant carries a short
/// context string. The RPC boundary maps these to a stable code and never
/// forwards a raw `Display` of an underlying cause past that short message.
#[derive(Debug, Error)]
pub enum PltmError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("ontology violation: {0}")]
    OntologyViolation(String),

    #[error("conflict could not be resolved deterministically: {0}")]
    ConflictUnresolved(String),

    #[error("external backend failure: {0}")]
    External(String),

    #[error("deadline exceeded: {0}")]
    Timeout(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl PltmError {
    /// Stable short code for the RPC boundary.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::OntologyViolation(_) => "ONTOLOGY_VIOLATION",
            Self::ConflictUnresolved(_) => "CONFLICT_UNRESOLVED",
            Self::External(_) => "EXTERNAL",
            Self::Timeout(_) => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_atom(confidence: f64) -> Atom {
        let now = Utc::now();
        Atom {
            id: AtomId(1),
            subject: "user".into(),
            predicate: "likes".into(),
            object: "Python".into(),
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
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn valid_atom_passes() {
        assert!(sample_atom(0.9).validate().is_ok());
    }

    #[test]
    fn confidence_out_of_range_rejected() {
        assert!(sample_atom(1.5).validate().is_err());
        assert!(sample_atom(-0.1).validate().is_err());
    }

    #[test]
    fn empty_subject_rejected() {
        let mut atom = sample_atom(0.5);
        atom.subject.clear();
        assert!(matches!(
            atom.validate(),
            Err(PltmError::InvalidArgument(_))
        ));
    }

    #[test]
    fn first_observed_after_last_accessed_rejected() {
        let mut atom = sample_atom(0.5);
        atom.first_observed = atom.last_accessed + chrono::Duration::hours(1);
        assert!(atom.validate().is_err());
    }

    #[test]
    fn historical_atom_not_default_visible() {
        let mut atom = sample_atom(0.5);
        atom.graph = GraphKind::Historical;
        assert!(!atom.is_default_visible());
    }

    #[test]
    fn provenance_rank_ordering() {
        assert!(Provenance::UserStated.rank() > Provenance::Extracted.rank());
        assert!(Provenance::Extracted.rank() > Provenance::Inferred.rank());
        assert!(Provenance::Inferred.rank() > Provenance::External.rank());
    }

    #[test]
    fn provenance_default_graph() {
        assert_eq!(
            Provenance::UserStated.default_graph(),
            GraphKind::Substantiated
        );
        assert_eq!(
            Provenance::Inferred.default_graph(),
            GraphKind::Unsubstantiated
        );
    }

    #[test]
    fn contexts_disjoint_detection() {
        let a = vec!["data_science".to_string()];
        let b = vec!["web_dev".to_string()];
        assert!(contexts_disjoint(&a, &b));

        let c = vec!["data_science".to_string(), "web_dev".to_string()];
        assert!(!contexts_disjoint(&a, &c));
    }

    #[test]
    fn calibration_baseline_defaults() {
        let cache = CalibrationCache::baseline("dates", Utc::now());
        assert_eq!(cache.accuracy_ratio, 0.6);
        assert_eq!(cache.overconfidence_ratio, 0.3);
        assert_eq!(cache.total_claims, 0);
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(PltmError::NotFound("x".into()).code(), "NOT_FOUND");
        assert_eq!(PltmError::Cancelled.code(), "CANCELLED");
    }
}
