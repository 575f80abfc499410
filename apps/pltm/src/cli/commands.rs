//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands. Each
//! command opens (or creates) a store, builds a short-lived `PltmEngine`
//! around it, runs one operation, and — for the non-`redb` backend, whose
//! `MemStore` holds no file handle — persists the canonical snapshot back
//! to disk before exiting.

use crate::api;
use pltm_core::{
    AtomId, AtomStore, AtomType, ClaimId, EpistemicStatus, MemStore, PltmConfig, PltmError, Provenance, SystemClock,
    engine::{PltmEngine, StoreAtomInput},
    export::{CanonicalSnapshot, export_snapshot, import_snapshot},
    store::RedbStore,
};
use std::path::PathBuf;
use std::sync::Arc;

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum file size for import (500 MB). Import files hold postcard-encoded
/// canonical snapshots, so this is generous relative to typical memory sizes.
const MAX_IMPORT_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &PathBuf, max_size: u64) -> Result<(), PltmError> {
    let metadata =
        std::fs::metadata(path).map_err(|e| PltmError::InvalidArgument(format!("cannot read file metadata: {e}")))?;

    if metadata.len() > max_size {
        return Err(PltmError::InvalidArgument(format!(
            "file size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Validate file path for security: canonicalize to resolve symlinks/`..`,
/// require the path to exist and be a regular file.
fn validate_file_path(path: &std::path::Path) -> Result<PathBuf, PltmError> {
    let canonical = path
        .canonicalize()
        .map_err(|e| PltmError::InvalidArgument(format!("invalid file path '{}': {e}", path.display())))?;

    if !canonical.is_file() {
        return Err(PltmError::InvalidArgument(format!("path '{}' is not a regular file", path.display())));
    }

    Ok(canonical)
}

/// Validate output path for security: the parent directory must exist and
/// be a directory; the canonical parent is joined back with the filename.
fn validate_output_path(path: &std::path::Path) -> Result<PathBuf, PltmError> {
    let parent = path.parent().unwrap_or(std::path::Path::new("."));

    let canonical_parent = parent
        .canonicalize()
        .map_err(|e| PltmError::InvalidArgument(format!("invalid output directory '{}': {e}", parent.display())))?;

    if !canonical_parent.is_dir() {
        return Err(PltmError::InvalidArgument(format!("output directory '{}' is not a valid directory", parent.display())));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| PltmError::InvalidArgument("output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn parse_atom_type(s: &str) -> Result<AtomType, PltmError> {
    match s.to_ascii_lowercase().as_str() {
        "entity" => Ok(AtomType::Entity),
        "affiliation" => Ok(AtomType::Affiliation),
        "social" => Ok(AtomType::Social),
        "skill" => Ok(AtomType::Skill),
        "preference" => Ok(AtomType::Preference),
        "belief" => Ok(AtomType::Belief),
        "event" => Ok(AtomType::Event),
        "state" => Ok(AtomType::State),
        "hypothesis" => Ok(AtomType::Hypothesis),
        "invariant" => Ok(AtomType::Invariant),
        "relation" => Ok(AtomType::Relation),
        other => Err(PltmError::InvalidArgument(format!("unknown atom type: {other}"))),
    }
}

// =============================================================================
// STORE / ENGINE SETUP
// =============================================================================

/// Open (or create) the atom store for `db_path`/`backend`.
///
/// `redb` opens the on-disk ACID store directly. Any other backend name
/// uses the in-memory store, restored from a canonical snapshot file at
/// `db_path` if one exists, using the canonical postcard format.
fn open_store(db_path: &PathBuf, backend: &str) -> Result<Arc<dyn AtomStore>, PltmError> {
    if backend == "redb" {
        return Ok(Arc::new(RedbStore::open(db_path)?));
    }

    let store = MemStore::new();
    if db_path.exists() {
        let bytes = std::fs::read(db_path).map_err(|e| PltmError::InvalidArgument(format!("read db: {e}")))?;
        let snapshot = import_snapshot(&bytes)?;
        snapshot.restore_into(&store)?;
    }
    Ok(Arc::new(store))
}

/// Persist the in-memory store back to `db_path` (no-op for `redb`, which
/// is already durable on every write).
fn save_store(store: &dyn AtomStore, db_path: &PathBuf, backend: &str) -> Result<(), PltmError> {
    if backend == "redb" {
        return Ok(());
    }
    let snapshot = CanonicalSnapshot::from_store(store)?;
    let bytes = export_snapshot(&snapshot)?;
    std::fs::write(db_path, &bytes).map_err(|e| PltmError::InvalidArgument(format!("write db: {e}")))?;
    Ok(())
}

fn build_engine(db_path: &PathBuf, backend: &str) -> Result<PltmEngine, PltmError> {
    let store = open_store(db_path, backend)?;
    let config = PltmConfig::from_env();
    Ok(PltmEngine::new(store, Arc::new(SystemClock), None, config))
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

pub async fn cmd_server(db_path: &PathBuf, backend: &str, host: &str, port: u16) -> Result<(), PltmError> {
    let engine = Arc::new(build_engine(db_path, backend)?);

    println!("pltm Procedural Long-Term Memory Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {host}");
    println!("  Port:     {port}");
    println!("  Backend:  {backend}");
    println!("  Database: {db_path:?}");
    println!();
    println!("Endpoints:");
    println!("  POST /atoms              - store an atom");
    println!("  GET  /atoms              - find triples");
    println!("  POST /retrieve/attention - attention-weighted retrieval");
    println!("  POST /decay/run          - run a decay pass");
    println!("  POST /epistemic/check    - check before claiming");
    println!("  GET  /health             - health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{host}:{port}");
    api::run_server(&addr, engine).await
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

pub fn cmd_status(db_path: &PathBuf, backend: &str, json_mode: bool) -> Result<(), PltmError> {
    let engine = build_engine(db_path, backend)?;
    let store = engine.store();
    let unsubstantiated = store.ids_by_graph(pltm_core::GraphKind::Unsubstantiated)?.len();
    let substantiated = store.ids_by_graph(pltm_core::GraphKind::Substantiated)?.len();
    let historical = store.ids_by_graph(pltm_core::GraphKind::Historical)?.len();

    if json_mode {
        let output = serde_json::json!({
            "database": db_path.to_string_lossy(),
            "backend": backend,
            "unsubstantiated_count": unsubstantiated,
            "substantiated_count": substantiated,
            "historical_count": historical,
        });
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
        return Ok(());
    }

    println!("pltm Memory Status");
    println!("===================");
    println!("Database: {db_path:?}");
    println!("Backend:  {backend}");
    println!();
    println!("Unsubstantiated: {unsubstantiated}");
    println!("Substantiated:   {substantiated}");
    println!("Historical:      {historical}");

    Ok(())
}

// =============================================================================
// ATOM COMMANDS
// =============================================================================

#[allow(clippy::too_many_arguments)]
pub fn cmd_store_atom(
    db_path: &PathBuf,
    backend: &str,
    json_mode: bool,
    subject: &str,
    predicate: &str,
    object: &str,
    atom_type: &str,
    confidence: Option<f64>,
) -> Result<(), PltmError> {
    let engine = build_engine(db_path, backend)?;
    let atom_type = parse_atom_type(atom_type)?;

    let outcome = engine.store_atom(StoreAtomInput {
        subject: subject.to_string(),
        predicate: predicate.to_string(),
        object: object.to_string(),
        atom_type,
        provenance: Provenance::UserStated,
        confidence,
        contexts: vec![],
        source_user: None,
        metadata: pltm_core::Metadata::new(),
    })?;

    save_store(engine.store(), db_path, backend)?;

    if json_mode {
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({"outcome": format!("{outcome:?}")})).unwrap_or_default());
    } else {
        println!("Stored: {subject} {predicate} {object} -> {outcome:?}");
    }
    Ok(())
}

pub fn cmd_get_atom(db_path: &PathBuf, backend: &str, json_mode: bool, id: u64) -> Result<(), PltmError> {
    let engine = build_engine(db_path, backend)?;
    let atom = engine.get_atom(AtomId(id))?;

    if json_mode {
        println!("{}", serde_json::to_string_pretty(&atom).unwrap_or_default());
    } else {
        println!("Atom #{}: {} {} {} (confidence {:.2}, graph {:?})", atom.id.0, atom.subject, atom.predicate, atom.object, atom.confidence, atom.graph);
    }
    Ok(())
}

pub fn cmd_find_triples(
    db_path: &PathBuf,
    backend: &str,
    json_mode: bool,
    subject: &str,
    predicate: Option<&str>,
    object: Option<&str>,
    include_historical: bool,
) -> Result<(), PltmError> {
    let engine = build_engine(db_path, backend)?;
    let atoms = engine.find_triples(subject, predicate, object, include_historical)?;

    if json_mode {
        println!("{}", serde_json::to_string_pretty(&atoms).unwrap_or_default());
    } else {
        println!("Found {} atom(s):", atoms.len());
        for atom in &atoms {
            println!("  #{} {} {} {} (confidence {:.2})", atom.id.0, atom.subject, atom.predicate, atom.object, atom.confidence);
        }
    }
    Ok(())
}

// =============================================================================
// RETRIEVAL COMMAND
// =============================================================================

pub fn cmd_retrieve(
    db_path: &PathBuf,
    backend: &str,
    json_mode: bool,
    subject: &str,
    query: &str,
    domain: Option<&str>,
    top_k: usize,
    mmr: bool,
) -> Result<(), PltmError> {
    let engine = build_engine(db_path, backend)?;

    if mmr {
        let atoms = engine.mmr_retrieve(subject, query, domain, top_k, None, None)?;
        if json_mode {
            println!("{}", serde_json::to_string_pretty(&atoms).unwrap_or_default());
        } else {
            println!("Retrieved {} atom(s) (MMR):", atoms.len());
            for atom in &atoms {
                println!("  #{} {} {} {}", atom.id.0, atom.subject, atom.predicate, atom.object);
            }
        }
    } else {
        let results = engine.attention_retrieve(subject, query, domain, top_k, None)?;
        if json_mode {
            let results: Vec<_> = results.iter().map(|r| serde_json::json!({"atom": r.atom, "score": r.score})).collect();
            println!("{}", serde_json::to_string_pretty(&results).unwrap_or_default());
        } else {
            println!("Retrieved {} atom(s):", results.len());
            for scored in &results {
                println!("  #{} {} {} {} (score {:.3})", scored.atom.id.0, scored.atom.subject, scored.atom.predicate, scored.atom.object, scored.score);
            }
        }
    }
    Ok(())
}

// =============================================================================
// DECAY COMMAND
// =============================================================================

pub fn cmd_decay_run(db_path: &PathBuf, backend: &str, json_mode: bool) -> Result<(), PltmError> {
    let engine = build_engine(db_path, backend)?;
    let report = engine.decay_run()?;
    save_store(engine.store(), db_path, backend)?;

    if json_mode {
        println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
    } else {
        println!("Decay run: scanned {}, dissolved {}, reconsolidated {}", report.scanned, report.dissolved, report.reconsolidated);
    }
    Ok(())
}

// =============================================================================
// EPISTEMIC MONITOR COMMANDS
// =============================================================================

pub fn cmd_check_claim(
    db_path: &PathBuf,
    backend: &str,
    json_mode: bool,
    claim: &str,
    felt_confidence: f64,
    domain: &str,
) -> Result<(), PltmError> {
    let engine = build_engine(db_path, backend)?;
    let result = engine.check_before_claiming(claim, felt_confidence, domain, false, EpistemicStatus::Inference)?;

    if json_mode {
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({
            "proceed": result.proceed,
            "adjusted_confidence": result.adjusted_confidence,
            "recommended_status": format!("{:?}", result.recommended_status),
            "reasons": result.reasons,
            "suggested_hedges": result.suggested_hedges,
        })).unwrap_or_default());
    } else {
        println!("Proceed: {}", result.proceed);
        println!("Adjusted confidence: {:.2}", result.adjusted_confidence);
        for reason in &result.reasons {
            println!("  - {reason}");
        }
    }
    Ok(())
}

pub fn cmd_log_claim(
    db_path: &PathBuf,
    backend: &str,
    json_mode: bool,
    claim: &str,
    felt_confidence: f64,
    domain: &str,
) -> Result<(), PltmError> {
    let engine = build_engine(db_path, backend)?;
    let claim_id = engine.log_claim(claim, felt_confidence, domain, EpistemicStatus::Inference, false)?;
    save_store(engine.store(), db_path, backend)?;

    if json_mode {
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({"claim_id": claim_id.0})).unwrap_or_default());
    } else {
        println!("Logged claim #{}", claim_id.0);
    }
    Ok(())
}

pub fn cmd_resolve_claim(db_path: &PathBuf, backend: &str, json_mode: bool, id: u64, was_correct: bool) -> Result<(), PltmError> {
    let engine = build_engine(db_path, backend)?;
    let (error, verdict) = engine.resolve_claim(ClaimId(id), was_correct, None, None)?;
    save_store(engine.store(), db_path, backend)?;

    if json_mode {
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({"calibration_error": error, "verdict": format!("{verdict:?}")})).unwrap_or_default());
    } else {
        println!("Calibration error: {error:.3}, verdict: {verdict:?}");
    }
    Ok(())
}

// =============================================================================
// EXPORT / IMPORT COMMANDS
// =============================================================================

pub fn cmd_export(db_path: &PathBuf, backend: &str, output: &std::path::Path) -> Result<(), PltmError> {
    let validated_output = validate_output_path(output)?;
    let engine = build_engine(db_path, backend)?;

    let bytes = engine.export()?;
    let checksum = engine.hash()?;
    println!("Checksum: {checksum}");

    std::fs::write(&validated_output, &bytes).map_err(|e| PltmError::InvalidArgument(format!("write file: {e}")))?;
    println!("Exported {} bytes to {validated_output:?}", bytes.len());

    Ok(())
}

pub fn cmd_import(db_path: &PathBuf, backend: &str, input: &std::path::Path) -> Result<(), PltmError> {
    let validated_path = validate_file_path(input)?;
    validate_file_size(&validated_path, MAX_IMPORT_FILE_SIZE)?;

    let data = std::fs::read(&validated_path).map_err(|e| PltmError::InvalidArgument(format!("read file: {e}")))?;

    let engine = build_engine(db_path, backend)?;
    engine.import(&data)?;
    save_store(engine.store(), db_path, backend)?;

    println!("Imported memory snapshot into {db_path:?}");
    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

pub fn cmd_init(db_path: &PathBuf, backend: &str, force: bool) -> Result<(), PltmError> {
    if db_path.exists() && !force {
        return Err(PltmError::AlreadyExists(format!("database already exists at {db_path:?}; use --force to overwrite")));
    }

    if backend == "redb" {
        let _store = RedbStore::open(db_path)?;
        println!("Initialized new redb database at {db_path:?}");
    } else {
        let store = MemStore::new();
        save_store(&store, db_path, backend)?;
        println!("Initialized new file-backed database at {db_path:?}");
    }

    Ok(())
}

// =============================================================================
// HASH COMMAND
// =============================================================================

pub fn cmd_hash(db_path: &PathBuf, backend: &str, json_mode: bool) -> Result<(), PltmError> {
    let engine = build_engine(db_path, backend)?;
    let checksum = engine.hash()?;

    if json_mode {
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({"checksum": checksum})).unwrap_or_default());
    } else {
        println!("Checksum: {checksum}");
    }
    Ok(())
}
