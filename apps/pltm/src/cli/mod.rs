//! # pltm CLI Module
//!
//! This module implements the CLI interface for pltm.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show atom counts per graph
//! - `store-atom` - Store a fact, reconciled against existing memory
//! - `get-atom` - Fetch an atom by id
//! - `find-triples` - Find atoms matching a triple pattern
//! - `retrieve` - Attention-weighted / MMR retrieval
//! - `decay-run` - Trigger a decay pass
//! - `check-claim` / `log-claim` / `resolve-claim` - epistemic monitor operations
//! - `export` - Export memory to a canonical snapshot file
//! - `import` - Import memory from a canonical snapshot file
//! - `init` - Initialize a new database
//! - `hash` - Compute the canonical checksum of current memory

mod commands;

use clap::{Parser, Subcommand};
use pltm_core::PltmError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// pltm - Procedural Long-Term Memory Server
///
/// A deterministic, auditable long-term memory substrate: fine-grained
/// factual atoms, automatic decay, conflict reconciliation, and an
/// epistemic monitor that tracks calibration over time.
#[derive(Parser, Debug)]
#[command(name = "pltm")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the memory database
    #[arg(short = 'D', long, global = true, default_value = "pltm.redb")]
    pub database: PathBuf,

    /// Storage backend: "mem" (in-process, canonical-file persisted) or "redb" (ACID database)
    #[arg(short = 'B', long, global = true, default_value = "redb")]
    pub backend: String,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Show atom counts per graph
    Status,

    /// Store an atom, reconciled against existing memory
    StoreAtom {
        #[arg(short, long)]
        subject: String,
        #[arg(short, long)]
        predicate: String,
        #[arg(short, long)]
        object: String,
        /// Atom type: entity, affiliation, social, skill, preference, belief,
        /// event, state, hypothesis, invariant, relation
        #[arg(short = 't', long)]
        atom_type: String,
        /// Confidence in [0, 1]; defaults to the rule-based extractor default
        #[arg(short, long)]
        confidence: Option<f64>,
    },

    /// Fetch an atom by id
    GetAtom {
        #[arg(long)]
        id: u64,
    },

    /// Find atoms matching a subject/predicate/object pattern
    FindTriples {
        #[arg(short, long)]
        subject: String,
        #[arg(short, long)]
        predicate: Option<String>,
        #[arg(short, long)]
        object: Option<String>,
        #[arg(long)]
        include_historical: bool,
    },

    /// Attention-weighted retrieval for a subject
    Retrieve {
        #[arg(short, long)]
        subject: String,
        #[arg(short, long)]
        query: String,
        #[arg(short, long)]
        domain: Option<String>,
        #[arg(long, default_value = "10")]
        top_k: usize,
        /// Use MMR diversification instead of plain attention ranking
        #[arg(long)]
        mmr: bool,
    },

    /// Run a decay pass over unsubstantiated atoms
    DecayRun,

    /// Check whether a claim should proceed or be hedged/verified first
    CheckClaim {
        #[arg(short, long)]
        claim: String,
        #[arg(short, long)]
        felt_confidence: f64,
        #[arg(short, long)]
        domain: String,
    },

    /// Log a claim for later calibration resolution
    LogClaim {
        #[arg(short, long)]
        claim: String,
        #[arg(short, long)]
        felt_confidence: f64,
        #[arg(short, long)]
        domain: String,
    },

    /// Resolve a previously logged claim
    ResolveClaim {
        #[arg(long)]
        id: u64,
        #[arg(long)]
        was_correct: bool,
    },

    /// Export memory in canonical format
    Export {
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Import memory from canonical format
    Import {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Initialize a new empty database
    Init {
        #[arg(short, long)]
        force: bool,
    },

    /// Compute the canonical checksum of current memory
    Hash,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), PltmError> {
    let backend = cli.backend.as_str();
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => cmd_server(&cli.database, backend, &host, port).await,
        Some(Commands::Status) => cmd_status(&cli.database, backend, json_mode),
        Some(Commands::StoreAtom { subject, predicate, object, atom_type, confidence }) => {
            cmd_store_atom(&cli.database, backend, json_mode, &subject, &predicate, &object, &atom_type, confidence)
        }
        Some(Commands::GetAtom { id }) => cmd_get_atom(&cli.database, backend, json_mode, id),
        Some(Commands::FindTriples { subject, predicate, object, include_historical }) => {
            cmd_find_triples(&cli.database, backend, json_mode, &subject, predicate.as_deref(), object.as_deref(), include_historical)
        }
        Some(Commands::Retrieve { subject, query, domain, top_k, mmr }) => {
            cmd_retrieve(&cli.database, backend, json_mode, &subject, &query, domain.as_deref(), top_k, mmr)
        }
        Some(Commands::DecayRun) => cmd_decay_run(&cli.database, backend, json_mode),
        Some(Commands::CheckClaim { claim, felt_confidence, domain }) => {
            cmd_check_claim(&cli.database, backend, json_mode, &claim, felt_confidence, &domain)
        }
        Some(Commands::LogClaim { claim, felt_confidence, domain }) => {
            cmd_log_claim(&cli.database, backend, json_mode, &claim, felt_confidence, &domain)
        }
        Some(Commands::ResolveClaim { id, was_correct }) => {
            cmd_resolve_claim(&cli.database, backend, json_mode, id, was_correct)
        }
        Some(Commands::Export { output }) => cmd_export(&cli.database, backend, &output),
        Some(Commands::Import { input }) => cmd_import(&cli.database, backend, &input),
        Some(Commands::Init { force }) => cmd_init(&cli.database, backend, force),
        Some(Commands::Hash) => cmd_hash(&cli.database, backend, json_mode),
        None => cmd_status(&cli.database, backend, json_mode),
    }
}
