//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers, each a thin
//! translation from JSON request/path params into a `PltmEngine` call and
//! back, with `PltmError` mapped to HTTP status

use super::{
    AppState,
    types::{
        AtomListResponse, AttentionMultiheadRequest, AttentionRetrieveRequest, CalibrationBucketJson,
        CalibrationQuery, CalibrationResponse, CheckBeforeClaimingRequest, CheckBeforeClaimingResponse,
        DecayStabilityResponse, EntropyRequest, ErrorResponse, ExportResponse, FindTriplesQuery, HashResponse,
        HealthResponse, ImportRequest, LogClaimRequest, LogClaimResponse, MmrRetrieveRequest, ResolveClaimRequest,
        ResolveClaimResponse, ScoredJson, ScoredListResponse, StatusResponse, StoreAtomRequest, StoreAtomResponse,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use pltm_core::{AtomId, AtomStore, ClaimId, GraphKind, PltmError};

/// Map a `PltmError` to its HTTP status and JSON error body.
fn error_response(error: &PltmError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match error {
        PltmError::NotFound(_) => StatusCode::NOT_FOUND,
        PltmError::AlreadyExists(_) => StatusCode::CONFLICT,
        PltmError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        PltmError::OntologyViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PltmError::ConflictUnresolved(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PltmError::External(_) => StatusCode::BAD_GATEWAY,
        PltmError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        PltmError::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        PltmError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse::new(error.code(), error.to_string())))
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.engine.store();
    let counts = [GraphKind::Unsubstantiated, GraphKind::Substantiated, GraphKind::Historical]
        .map(|kind| store.ids_by_graph(kind).map(|ids| ids.len() as u64).unwrap_or(0));

    let response = StatusResponse {
        unsubstantiated_count: counts[0],
        substantiated_count: counts[1],
        historical_count: counts[2],
    };
    (StatusCode::OK, Json(response))
}

// =============================================================================
// ATOMS
// =============================================================================

pub async fn store_atom_handler(
    State(state): State<AppState>,
    Json(request): Json<StoreAtomRequest>,
) -> impl IntoResponse {
    let input = pltm_core::engine::StoreAtomInput {
        subject: request.subject,
        predicate: request.predicate,
        object: request.object,
        atom_type: request.atom_type,
        provenance: request.provenance,
        confidence: request.confidence,
        contexts: request.contexts,
        source_user: request.source_user,
        metadata: request.metadata,
    };

    match state.engine.store_atom(input) {
        Ok(outcome) => (StatusCode::OK, Json(StoreAtomResponse::from(outcome))).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

pub async fn get_atom_handler(State(state): State<AppState>, Path(id): Path<u64>) -> impl IntoResponse {
    match state.engine.get_atom(AtomId(id)) {
        Ok(atom) => (StatusCode::OK, Json(atom)).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

pub async fn delete_atom_handler(State(state): State<AppState>, Path(id): Path<u64>) -> impl IntoResponse {
    match state.engine.delete_atom(AtomId(id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

pub async fn find_triples_handler(
    State(state): State<AppState>,
    Query(query): Query<FindTriplesQuery>,
) -> impl IntoResponse {
    match state
        .engine
        .find_triples(&query.subject, query.predicate.as_deref(), query.object.as_deref(), query.include_historical)
    {
        Ok(atoms) => (StatusCode::OK, Json(AtomListResponse { atoms })).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

// =============================================================================
// RETRIEVAL
// =============================================================================

pub async fn attention_retrieve_handler(
    State(state): State<AppState>,
    Json(request): Json<AttentionRetrieveRequest>,
) -> impl IntoResponse {
    let weights = request.weights.map(|w| pltm_core::retriever::RetrievalWeights {
        relevance: w[0],
        confidence: w[1],
        recency: w[2],
        stability: w[3],
    });
    match state.engine.attention_retrieve(
        &request.subject,
        &request.query_text,
        request.domain.as_deref(),
        request.top_k,
        weights,
    ) {
        Ok(results) => {
            let results: Vec<ScoredJson> = results.into_iter().map(ScoredJson::from).collect();
            (StatusCode::OK, Json(ScoredListResponse { results })).into_response()
        }
        Err(e) => error_response(&e).into_response(),
    }
}

pub async fn attention_multihead_handler(
    State(state): State<AppState>,
    Json(request): Json<AttentionMultiheadRequest>,
) -> impl IntoResponse {
    match state.engine.attention_multihead(&request.subject, &request.query_text, request.domain.as_deref(), request.top_k) {
        Ok(results) => {
            let results: Vec<ScoredJson> = results.into_iter().map(ScoredJson::from).collect();
            (StatusCode::OK, Json(ScoredListResponse { results })).into_response()
        }
        Err(e) => error_response(&e).into_response(),
    }
}

pub async fn mmr_retrieve_handler(
    State(state): State<AppState>,
    Json(request): Json<MmrRetrieveRequest>,
) -> impl IntoResponse {
    match state.engine.mmr_retrieve(
        &request.subject,
        &request.query_text,
        request.domain.as_deref(),
        request.top_k,
        request.lambda,
        request.min_dissim,
    ) {
        Ok(atoms) => (StatusCode::OK, Json(AtomListResponse { atoms })).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

pub async fn inject_entropy_handler(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(request): Json<EntropyRequest>,
) -> impl IntoResponse {
    let result = match kind.as_str() {
        "random" => state.engine.inject_entropy_random(&request.subject, request.n),
        "temporal" => state.engine.inject_entropy_temporal(&request.subject, request.n),
        "antipodal" => {
            let Some(query_text) = request.query_text.as_deref() else {
                return error_response(&PltmError::InvalidArgument(
                    "antipodal entropy injection requires query_text".to_string(),
                ))
                .into_response();
            };
            state.engine.inject_entropy_antipodal(&request.subject, query_text, request.n)
        }
        other => {
            return error_response(&PltmError::InvalidArgument(format!("unknown entropy kind: {other}"))).into_response();
        }
    };

    match result {
        Ok(atoms) => (StatusCode::OK, Json(AtomListResponse { atoms })).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

// =============================================================================
// DECAY
// =============================================================================

pub async fn decay_stability_handler(State(state): State<AppState>, Path(id): Path<u64>) -> impl IntoResponse {
    match state.engine.decay_stability(AtomId(id)) {
        Ok(stability) => (StatusCode::OK, Json(DecayStabilityResponse { atom_id: id, stability })).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

pub async fn decay_run_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.decay_run() {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

// =============================================================================
// EPISTEMIC MONITOR
// =============================================================================

pub async fn check_before_claiming_handler(
    State(state): State<AppState>,
    Json(request): Json<CheckBeforeClaimingRequest>,
) -> impl IntoResponse {
    match state.engine.check_before_claiming(
        &request.claim,
        request.felt_confidence,
        &request.domain,
        request.has_verified,
        request.epistemic_status,
    ) {
        Ok(result) => (StatusCode::OK, Json(CheckBeforeClaimingResponse::from(result))).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

pub async fn log_claim_handler(
    State(state): State<AppState>,
    Json(request): Json<LogClaimRequest>,
) -> impl IntoResponse {
    match state.engine.log_claim(
        &request.claim,
        request.felt_confidence,
        &request.domain,
        request.epistemic_status,
        request.has_verified,
    ) {
        Ok(claim_id) => (StatusCode::OK, Json(LogClaimResponse { claim_id: claim_id.0 })).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

pub async fn resolve_claim_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<ResolveClaimRequest>,
) -> impl IntoResponse {
    match state
        .engine
        .resolve_claim(ClaimId(id), request.was_correct, request.source.as_deref(), request.detail.as_deref())
    {
        Ok((calibration_error, verdict)) => {
            (StatusCode::OK, Json(ResolveClaimResponse { calibration_error, verdict })).into_response()
        }
        Err(e) => error_response(&e).into_response(),
    }
}

pub async fn get_calibration_handler(
    State(state): State<AppState>,
    Query(query): Query<CalibrationQuery>,
) -> impl IntoResponse {
    let cache = match state.engine.get_calibration(&query.domain) {
        Ok(cache) => cache,
        Err(e) => return error_response(&e).into_response(),
    };
    let curve = match state.engine.calibration_curve(&query.domain) {
        Ok(curve) => curve.into_iter().map(CalibrationBucketJson::from).collect(),
        Err(e) => return error_response(&e).into_response(),
    };
    (StatusCode::OK, Json(CalibrationResponse { cache, curve })).into_response()
}

// =============================================================================
// HASH / METRICS
// =============================================================================

/// `pltm-core` is always built with `crypto-hash` enabled in this binary
/// (see `apps/pltm/Cargo.toml`), so both digests are always present.
pub async fn hash_handler(State(state): State<AppState>) -> impl IntoResponse {
    let checksum = match state.engine.hash() {
        Ok(checksum) => checksum,
        Err(e) => return error_response(&e).into_response(),
    };
    let hash = match state.engine.crypto_hash() {
        Ok(hash) => hash,
        Err(e) => return error_response(&e).into_response(),
    };

    (StatusCode::OK, Json(HashResponse { checksum, hash: Some(hash), algorithm: Some("blake3") })).into_response()
}

/// Prometheus-compatible metrics endpoint: atom counts by graph and the
/// canonical checksum.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.engine.store();
    let unsubstantiated = store.ids_by_graph(GraphKind::Unsubstantiated).map(|v| v.len()).unwrap_or(0);
    let substantiated = store.ids_by_graph(GraphKind::Substantiated).map(|v| v.len()).unwrap_or(0);
    let historical = store.ids_by_graph(GraphKind::Historical).map(|v| v.len()).unwrap_or(0);
    let checksum = state.engine.hash().unwrap_or(0);

    let body = format!(
        "# HELP pltm_atom_count_unsubstantiated Atoms in the unsubstantiated graph\n\
         # TYPE pltm_atom_count_unsubstantiated gauge\n\
         pltm_atom_count_unsubstantiated {unsubstantiated}\n\
         # HELP pltm_atom_count_substantiated Atoms in the substantiated graph\n\
         # TYPE pltm_atom_count_substantiated gauge\n\
         pltm_atom_count_substantiated {substantiated}\n\
         # HELP pltm_atom_count_historical Atoms in the historical graph\n\
         # TYPE pltm_atom_count_historical gauge\n\
         pltm_atom_count_historical {historical}\n\
         # HELP pltm_checksum Canonical checksum of current memory state\n\
         # TYPE pltm_checksum gauge\n\
         pltm_checksum {checksum}\n"
    );
    (StatusCode::OK, [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

// =============================================================================
// EXPORT / IMPORT
// =============================================================================

pub async fn export_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.export() {
        Ok(bytes) => {
            let checksum = state.engine.hash().unwrap_or(0);
            (StatusCode::OK, Json(ExportResponse::new(&bytes, checksum))).into_response()
        }
        Err(e) => error_response(&e).into_response(),
    }
}

pub async fn import_handler(State(state): State<AppState>, Json(request): Json<ImportRequest>) -> impl IntoResponse {
    use base64::Engine;
    let bytes = match base64::engine::general_purpose::STANDARD.decode(&request.data) {
        Ok(bytes) => bytes,
        Err(e) => {
            return error_response(&PltmError::InvalidArgument(format!("invalid base64: {e}"))).into_response();
        }
    };

    match state.engine.import(&bytes) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}
