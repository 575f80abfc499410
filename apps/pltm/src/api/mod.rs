//! # PLTM HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `POST /atoms` - store an atom (reconciled against existing memory)
//! - `GET /atoms/:id` - fetch an atom by id
//! - `GET /atoms` - find triples matching subject/predicate/object
//! - `DELETE /atoms/:id` - delete an atom
//! - `POST /retrieve/attention` - attention-weighted retrieval
//! - `POST /retrieve/attention_multihead` - multi-head attention retrieval
//! - `POST /retrieve/mmr` - MMR-diversified retrieval
//! - `POST /retrieve/entropy/:kind` - entropy injection (random/antipodal/temporal)
//! - `GET /decay/:id` - current stability of an atom
//! - `POST /decay/run` - trigger a decay pass
//! - `POST /epistemic/check` - check before claiming
//! - `POST /epistemic/claims` - log a claim
//! - `POST /epistemic/claims/:id/resolve` - resolve a claim
//! - `GET /epistemic/calibration` - calibration cache + curve for a domain
//! - `GET /health` - health check
//! - `GET /status` - atom counts per graph
//! - `GET /hash` - canonical checksum of current memory state
//! - `GET /metrics` - Prometheus metrics
//! - `POST /export` - export canonical snapshot
//! - `POST /import` - import canonical snapshot
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `PLTM_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `PLTM_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `PLTM_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::get_api_key_from_env;
pub use middleware::{create_rate_limiter, get_rate_limit_from_env};
#[allow(unused_imports)]
pub use handlers::{
    attention_multihead_handler, attention_retrieve_handler, check_before_claiming_handler, decay_run_handler,
    decay_stability_handler, delete_atom_handler, export_handler, find_triples_handler, get_atom_handler,
    get_calibration_handler, hash_handler, health_handler, inject_entropy_handler, import_handler, log_claim_handler,
    metrics_handler, mmr_retrieve_handler, resolve_claim_handler, status_handler, store_atom_handler,
};
#[allow(unused_imports)]
pub use types::*;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{delete, get, post},
};
use pltm_core::{PltmError, PltmEngine};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the PLTM engine.
///
/// `PltmEngine` is internally synchronized (its store is `Send + Sync`, and
/// reconciliation uses its own per-(subject, predicate) advisory locks), so
/// no outer lock is needed here.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PltmEngine>,
}

impl AppState {
    #[must_use]
    pub fn new(engine: Arc<PltmEngine>) -> Self {
        Self { engine }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from environment configuration.
///
/// Reads `PLTM_CORS_ORIGINS` environment variable:
/// - If "*": allows all origins (development mode - use with caution!)
/// - If not set: defaults to localhost only (restrictive default)
/// - Otherwise: parses comma-separated list of allowed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("PLTM_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (PLTM_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in PLTM_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            tracing::info!("CORS: No PLTM_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let localhost_origins = vec![
        "http://localhost:3000".parse::<HeaderValue>().ok(),
        "http://localhost:8080".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:3000".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:8080".parse::<HeaderValue>().ok(),
    ];
    let origins: Vec<HeaderValue> = localhost_origins.into_iter().flatten().collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. CORS - handles preflight requests
/// 2. Tracing - logs all requests
/// 3. Rate Limiting - protects against DoS (if enabled)
/// 4. Authentication - validates API key (if configured)
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();

    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - all endpoints are publicly accessible! \
             Set PLTM_API_KEY environment variable to enable authentication."
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/atoms", post(handlers::store_atom_handler))
        .route("/atoms", get(handlers::find_triples_handler))
        .route("/atoms/:id", get(handlers::get_atom_handler))
        .route("/atoms/:id", delete(handlers::delete_atom_handler))
        .route("/retrieve/attention", post(handlers::attention_retrieve_handler))
        .route("/retrieve/attention_multihead", post(handlers::attention_multihead_handler))
        .route("/retrieve/mmr", post(handlers::mmr_retrieve_handler))
        .route("/retrieve/entropy/:kind", post(handlers::inject_entropy_handler))
        .route("/decay/:id", get(handlers::decay_stability_handler))
        .route("/decay/run", post(handlers::decay_run_handler))
        .route("/epistemic/check", post(handlers::check_before_claiming_handler))
        .route("/epistemic/claims", post(handlers::log_claim_handler))
        .route("/epistemic/claims/:id/resolve", post(handlers::resolve_claim_handler))
        .route("/epistemic/calibration", get(handlers::get_calibration_handler))
        .route("/hash", get(handlers::hash_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/export", post(handlers::export_handler))
        .route("/import", post(handlers::import_handler));

    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(addr: &str, engine: Arc<PltmEngine>) -> Result<(), PltmError> {
    let state = AppState::new(engine);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| PltmError::Internal(format!("bind failed: {e}")))?;

    tracing::info!("pltm HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| PltmError::Internal(format!("server error: {e}")))
}
