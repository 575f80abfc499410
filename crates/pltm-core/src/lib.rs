//! # pltm-core
//!
//! The deterministic engine behind a procedural long-term memory store: a
//! content-addressable graph of fine-grained factual atoms, automatic
//! forgetting via an Ebbinghaus decay model, semantic conflict
//! reconciliation between a subject's Unsubstantiated/Substantiated/
//! Historical sub-graphs, and attention-weighted retrieval.
//!
//! ## Architectural Constraints
//!
//! - This crate is the ONLY place atom state lives; `apps/pltm` and
//!   `apps/pltm-mcp` are thin RPC/CLI/MCP surfaces over it.
//! - No network dependencies here — those live in the `apps/` binaries.
//! - `AtomStore` is the single seam between durable storage and engine
//!   logic, so the whole engine is testable against [`store::MemStore`]
//!   without a filesystem.

pub mod clock;
pub mod config;
pub mod decay;
pub mod engine;
pub mod epistemic;
pub mod export;
pub mod extractor;
pub mod ontology;
pub mod reconciler;
pub mod retriever;
pub mod similarity;
pub mod store;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::PltmConfig;
pub use engine::PltmEngine;
pub use epistemic::EpistemicMonitor;
pub use export::{CanonicalHeader, CanonicalSnapshot, export_snapshot, import_snapshot};
#[cfg(feature = "crypto-hash")]
pub use export::{canonical_crypto_hash, compute_blake3_hash, verify_crypto_hash};
pub use ontology::{OntologyRule, is_predicate_allowed, opposite_predicate, rule_for};
pub use reconciler::Reconciler;
pub use retriever::{RetrievalWeights, Retriever};
pub use store::{AtomStore, MemStore, RedbStore};
pub use types::{
    Atom, AtomId, AtomType, CalibrationCache, CalibrationVerdict, ClaimId, Contexts,
    EpistemicIntervention, EpistemicStatus, GraphKind, InterventionId, Metadata, MetadataValue,
    PltmError, PredictionRow, Provenance,
};
