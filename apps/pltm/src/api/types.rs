//! # API Types
//!
//! Request/response DTOs for the PLTM HTTP surface. Most response
//! bodies simply wrap `pltm_core` types directly — `Atom`, `DecayRunReport`,
//! `CalibrationCache` already derive `Serialize`/`Deserialize` — so this
//! module only adds the request shapes and the few response envelopes the
//! engine's return types don't already cover (reconciliation outcomes,
//! the epistemic check result, error envelopes).

use pltm_core::{Atom, AtomType, CalibrationCache, CalibrationVerdict, EpistemicStatus, Metadata, Provenance};
use serde::{Deserialize, Serialize};

fn default_provenance() -> Provenance {
    Provenance::UserStated
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub unsubstantiated_count: u64,
    pub substantiated_count: u64,
    pub historical_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self { error: message.into(), code }
    }
}

// -- atoms -------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct StoreAtomRequest {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub atom_type: AtomType,
    #[serde(default = "default_provenance")]
    pub provenance: Provenance,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub contexts: Vec<String>,
    pub source_user: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Mirrors `pltm_core::reconciler::ReconcileOutcome` as a tagged JSON value
/// instead of an internal enum a client has no reason to pattern-match on.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome")]
pub enum StoreAtomResponse {
    Inserted { atom: Atom },
    Reinforced { atom: Atom },
    Promoted { winner: Atom, demoted: Vec<Atom> },
    Rejected { existing: Atom },
}

impl From<pltm_core::reconciler::ReconcileOutcome> for StoreAtomResponse {
    fn from(outcome: pltm_core::reconciler::ReconcileOutcome) -> Self {
        use pltm_core::reconciler::ReconcileOutcome as O;
        match outcome {
            O::Inserted(atom) => Self::Inserted { atom },
            O::Reinforced(atom) => Self::Reinforced { atom },
            O::Promoted { winner, demoted } => Self::Promoted { winner, demoted },
            O::Rejected { existing } => Self::Rejected { existing },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FindTriplesQuery {
    pub subject: String,
    pub predicate: Option<String>,
    pub object: Option<String>,
    #[serde(default)]
    pub include_historical: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AtomListResponse {
    pub atoms: Vec<Atom>,
}

// -- retrieval ----------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AttentionRetrieveRequest {
    pub subject: String,
    pub query_text: String,
    pub domain: Option<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// `[relevance, confidence, recency, stability]`; defaults to the
    /// server's configured weights when absent.
    pub weights: Option<[f64; 4]>,
}

fn default_top_k() -> usize {
    pltm_core::retriever::DEFAULT_TOP_K
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredJson {
    pub atom: Atom,
    pub score: f64,
}

impl From<pltm_core::retriever::Scored> for ScoredJson {
    fn from(scored: pltm_core::retriever::Scored) -> Self {
        Self { atom: scored.atom, score: scored.score }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredListResponse {
    pub results: Vec<ScoredJson>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttentionMultiheadRequest {
    pub subject: String,
    pub query_text: String,
    pub domain: Option<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MmrRetrieveRequest {
    pub subject: String,
    pub query_text: String,
    pub domain: Option<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    pub lambda: Option<f64>,
    pub min_dissim: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntropyRequest {
    pub subject: String,
    /// Required for `antipodal`, ignored for `random`/`temporal`.
    pub query_text: Option<String>,
    #[serde(default = "default_entropy_n")]
    pub n: usize,
}

fn default_entropy_n() -> usize {
    5
}

// -- decay ----------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct DecayStabilityResponse {
    pub atom_id: u64,
    pub stability: f64,
}

// -- epistemic --------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CheckBeforeClaimingRequest {
    pub claim: String,
    pub felt_confidence: f64,
    pub domain: String,
    #[serde(default)]
    pub has_verified: bool,
    #[serde(default = "default_epistemic_status")]
    pub epistemic_status: EpistemicStatus,
}

fn default_epistemic_status() -> EpistemicStatus {
    EpistemicStatus::Inference
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckBeforeClaimingResponse {
    pub proceed: bool,
    pub action: &'static str,
    pub adjusted_confidence: f64,
    pub recommended_status: EpistemicStatus,
    pub reasons: Vec<String>,
    pub suggested_hedges: Vec<String>,
}

impl From<pltm_core::epistemic::CheckResult> for CheckBeforeClaimingResponse {
    fn from(result: pltm_core::epistemic::CheckResult) -> Self {
        use pltm_core::epistemic::ClaimAction;
        Self {
            proceed: result.proceed,
            action: match result.action {
                ClaimAction::Proceed => "proceed",
                ClaimAction::VerifyFirst => "verify_first",
            },
            adjusted_confidence: result.adjusted_confidence,
            recommended_status: result.recommended_status,
            reasons: result.reasons,
            suggested_hedges: result.suggested_hedges,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogClaimRequest {
    pub claim: String,
    pub felt_confidence: f64,
    pub domain: String,
    #[serde(default = "default_epistemic_status")]
    pub epistemic_status: EpistemicStatus,
    #[serde(default)]
    pub has_verified: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogClaimResponse {
    pub claim_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveClaimRequest {
    pub was_correct: bool,
    pub source: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveClaimResponse {
    pub calibration_error: f64,
    pub verdict: CalibrationVerdict,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalibrationQuery {
    pub domain: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalibrationBucketJson {
    pub range_low: f64,
    pub range_high: f64,
    pub count: u64,
    pub accuracy: f64,
    pub gap: f64,
}

impl From<pltm_core::epistemic::CalibrationBucket> for CalibrationBucketJson {
    fn from(bucket: pltm_core::epistemic::CalibrationBucket) -> Self {
        Self {
            range_low: bucket.range.0,
            range_high: bucket.range.1,
            count: bucket.count,
            accuracy: bucket.accuracy,
            gap: bucket.gap,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CalibrationResponse {
    pub cache: Option<CalibrationCache>,
    pub curve: Vec<CalibrationBucketJson>,
}

// -- export / import ---------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ExportResponse {
    /// Base64-encoded canonical postcard bytes.
    pub data: String,
    pub checksum: u64,
}

impl ExportResponse {
    #[must_use]
    pub fn new(bytes: &[u8], checksum: u64) -> Self {
        use base64::Engine;
        Self {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            checksum,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportRequest {
    /// Base64-encoded canonical postcard bytes, as produced by `/export`.
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HashResponse {
    pub checksum: u64,
    /// BLAKE3 hex digest of the current state, present when `pltm-core`'s
    /// `crypto-hash` feature is enabled (it is, in this binary).
    pub hash: Option<String>,
    pub algorithm: Option<&'static str>,
}
