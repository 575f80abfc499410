//! # pltm MCP Server
//!
//! Implements `ServerHandler` with MCP tools that proxy to the pltm HTTP API.

use crate::client::PltmClient;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router,
};
use serde::Deserialize;

// =============================================================================
// MCP SERVER
// =============================================================================

/// MCP server that bridges to a pltm HTTP API.
#[derive(Clone)]
pub struct PltmMcp {
    client: PltmClient,
    #[allow(dead_code)]
    tool_router: ToolRouter<Self>,
}

// =============================================================================
// TOOL PARAMETER STRUCTS
// =============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct StoreAtomParams {
    /// Subject of the triple.
    #[schemars(description = "Subject of the triple")]
    pub subject: String,
    /// Predicate of the triple.
    #[schemars(description = "Predicate of the triple")]
    pub predicate: String,
    /// Object of the triple.
    #[schemars(description = "Object of the triple")]
    pub object: String,
    /// Atom type: entity, affiliation, social, skill, preference, belief, event, state, hypothesis, invariant, relation.
    #[schemars(description = "Atom type: entity, affiliation, social, skill, preference, belief, event, state, hypothesis, invariant, relation")]
    pub atom_type: String,
    /// Confidence in [0, 1]; omit to use the rule-based extractor default.
    #[schemars(description = "Confidence in [0, 1]; omit to use the rule-based extractor default")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AtomIdParams {
    /// The atom id.
    #[schemars(description = "The atom id")]
    pub id: u64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FindTriplesParams {
    /// Subject to match.
    #[schemars(description = "Subject to match")]
    pub subject: String,
    /// Predicate to match; omit to match any.
    #[schemars(description = "Predicate to match; omit to match any")]
    pub predicate: Option<String>,
    /// Object to match; omit to match any.
    #[schemars(description = "Object to match; omit to match any")]
    pub object: Option<String>,
    /// Include atoms from the historical sub-graph.
    #[schemars(description = "Include atoms from the historical sub-graph")]
    pub include_historical: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RetrieveParams {
    /// Subject to retrieve atoms for.
    #[schemars(description = "Subject to retrieve atoms for")]
    pub subject: String,
    /// Free-text query used to score relevance.
    #[schemars(description = "Free-text query used to score relevance")]
    pub query_text: String,
    /// Restrict to atoms tagged with this domain context.
    #[schemars(description = "Restrict to atoms tagged with this domain context")]
    pub domain: Option<String>,
    /// Maximum number of atoms to return (default 10).
    #[schemars(description = "Maximum number of atoms to return (default 10)")]
    pub top_k: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct EntropyParams {
    /// Entropy injection kind: random, antipodal, or temporal.
    #[schemars(description = "Entropy injection kind: random, antipodal, or temporal")]
    pub kind: String,
    /// Subject to draw candidate atoms from.
    #[schemars(description = "Subject to draw candidate atoms from")]
    pub subject: String,
    /// Query text; required for the antipodal kind.
    #[schemars(description = "Query text; required for the antipodal kind")]
    pub query_text: Option<String>,
    /// Number of atoms to return (default 3).
    #[schemars(description = "Number of atoms to return (default 3)")]
    pub n: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CheckClaimParams {
    /// The claim text about to be asserted.
    #[schemars(description = "The claim text about to be asserted")]
    pub claim: String,
    /// Subjective confidence in the claim, in [0, 1].
    #[schemars(description = "Subjective confidence in the claim, in [0, 1]")]
    pub felt_confidence: f64,
    /// Domain the claim belongs to, for calibration bucketing.
    #[schemars(description = "Domain the claim belongs to, for calibration bucketing")]
    pub domain: String,
    /// Whether the claim has already been independently verified.
    #[schemars(description = "Whether the claim has already been independently verified")]
    pub has_verified: Option<bool>,
    /// Epistemic status: Verified, TrainingData, Inference, Speculation, or Uncertain (default Inference).
    #[schemars(description = "Epistemic status: Verified, TrainingData, Inference, Speculation, or Uncertain (default Inference)")]
    pub epistemic_status: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ResolveClaimParams {
    /// The claim id returned by log_claim.
    #[schemars(description = "The claim id returned by log_claim")]
    pub id: u64,
    /// Whether the claim turned out to be correct.
    #[schemars(description = "Whether the claim turned out to be correct")]
    pub was_correct: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CalibrationParams {
    /// Domain to fetch the calibration curve for.
    #[schemars(description = "Domain to fetch the calibration curve for")]
    pub domain: String,
}

// =============================================================================
// TOOL IMPLEMENTATIONS
// =============================================================================

#[tool_router]
impl PltmMcp {
    pub fn new(client: PltmClient) -> Self {
        Self {
            client,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Store a fact as (subject, predicate, object), reconciled against existing memory")]
    async fn pltm_store_atom(
        &self,
        params: Parameters<StoreAtomParams>,
    ) -> Result<CallToolResult, McpError> {
        let StoreAtomParams { subject, predicate, object, atom_type, confidence } = params.0;
        match self.client.store_atom(&subject, &predicate, &object, &atom_type, confidence).await {
            Ok(resp) => Ok(CallToolResult::success(vec![Content::text(pretty(&resp))])),
            Err(e) => Err(McpError::internal_error(format!("{e}"), None)),
        }
    }

    #[tool(description = "Fetch an atom by id")]
    async fn pltm_get_atom(&self, params: Parameters<AtomIdParams>) -> Result<CallToolResult, McpError> {
        match self.client.get_atom(params.0.id).await {
            Ok(resp) => Ok(CallToolResult::success(vec![Content::text(pretty(&resp))])),
            Err(e) => Err(McpError::internal_error(format!("{e}"), None)),
        }
    }

    #[tool(description = "Delete an atom by id")]
    async fn pltm_delete_atom(&self, params: Parameters<AtomIdParams>) -> Result<CallToolResult, McpError> {
        match self.client.delete_atom(params.0.id).await {
            Ok(resp) => Ok(CallToolResult::success(vec![Content::text(pretty(&resp))])),
            Err(e) => Err(McpError::internal_error(format!("{e}"), None)),
        }
    }

    #[tool(description = "Find atoms matching a subject/predicate/object pattern")]
    async fn pltm_find_triples(
        &self,
        params: Parameters<FindTriplesParams>,
    ) -> Result<CallToolResult, McpError> {
        let FindTriplesParams { subject, predicate, object, include_historical } = params.0;
        let result = self
            .client
            .find_triples(&subject, predicate.as_deref(), object.as_deref(), include_historical.unwrap_or(false))
            .await;
        match result {
            Ok(resp) => Ok(CallToolResult::success(vec![Content::text(pretty(&resp))])),
            Err(e) => Err(McpError::internal_error(format!("{e}"), None)),
        }
    }

    #[tool(description = "Attention-weighted retrieval of atoms relevant to a subject and query")]
    async fn pltm_attention_retrieve(
        &self,
        params: Parameters<RetrieveParams>,
    ) -> Result<CallToolResult, McpError> {
        let RetrieveParams { subject, query_text, domain, top_k } = params.0;
        let result = self
            .client
            .attention_retrieve(&subject, &query_text, domain.as_deref(), top_k.unwrap_or(10) as usize)
            .await;
        match result {
            Ok(resp) => Ok(CallToolResult::success(vec![Content::text(pretty(&resp))])),
            Err(e) => Err(McpError::internal_error(format!("{e}"), None)),
        }
    }

    #[tool(description = "Multi-head attention retrieval: runs relevance-, recency-, and confidence-heavy scoring passes and merges them, keeping each atom's best score")]
    async fn pltm_attention_multihead(
        &self,
        params: Parameters<RetrieveParams>,
    ) -> Result<CallToolResult, McpError> {
        let RetrieveParams { subject, query_text, domain, top_k } = params.0;
        let result = self
            .client
            .attention_multihead(&subject, &query_text, domain.as_deref(), top_k.unwrap_or(10) as usize)
            .await;
        match result {
            Ok(resp) => Ok(CallToolResult::success(vec![Content::text(pretty(&resp))])),
            Err(e) => Err(McpError::internal_error(format!("{e}"), None)),
        }
    }

    #[tool(description = "MMR-diversified retrieval of atoms relevant to a subject and query")]
    async fn pltm_mmr_retrieve(
        &self,
        params: Parameters<RetrieveParams>,
    ) -> Result<CallToolResult, McpError> {
        let RetrieveParams { subject, query_text, domain, top_k } = params.0;
        let result = self
            .client
            .mmr_retrieve(&subject, &query_text, domain.as_deref(), top_k.unwrap_or(10) as usize)
            .await;
        match result {
            Ok(resp) => Ok(CallToolResult::success(vec![Content::text(pretty(&resp))])),
            Err(e) => Err(McpError::internal_error(format!("{e}"), None)),
        }
    }

    #[tool(description = "Inject entropy into retrieval: random, antipodal, or temporal sampling of atoms")]
    async fn pltm_inject_entropy(
        &self,
        params: Parameters<EntropyParams>,
    ) -> Result<CallToolResult, McpError> {
        let EntropyParams { kind, subject, query_text, n } = params.0;
        let result = self
            .client
            .inject_entropy(&kind, &subject, query_text.as_deref(), n.unwrap_or(3) as usize)
            .await;
        match result {
            Ok(resp) => Ok(CallToolResult::success(vec![Content::text(pretty(&resp))])),
            Err(e) => Err(McpError::internal_error(format!("{e}"), None)),
        }
    }

    #[tool(description = "Get the current decay stability of an atom")]
    async fn pltm_decay_stability(&self, params: Parameters<AtomIdParams>) -> Result<CallToolResult, McpError> {
        match self.client.decay_stability(params.0.id).await {
            Ok(resp) => Ok(CallToolResult::success(vec![Content::text(pretty(&resp))])),
            Err(e) => Err(McpError::internal_error(format!("{e}"), None)),
        }
    }

    #[tool(description = "Run a decay pass over unsubstantiated atoms")]
    async fn pltm_decay_run(&self) -> Result<CallToolResult, McpError> {
        match self.client.decay_run().await {
            Ok(resp) => Ok(CallToolResult::success(vec![Content::text(pretty(&resp))])),
            Err(e) => Err(McpError::internal_error(format!("{e}"), None)),
        }
    }

    #[tool(description = "Check whether a claim should proceed as-is or be hedged/verified before asserting it")]
    async fn pltm_check_before_claiming(
        &self,
        params: Parameters<CheckClaimParams>,
    ) -> Result<CallToolResult, McpError> {
        let CheckClaimParams { claim, felt_confidence, domain, has_verified, epistemic_status } = params.0;
        let status = epistemic_status.unwrap_or_else(|| "Inference".to_string());
        match self.client.check_before_claiming(&claim, felt_confidence, &domain, has_verified.unwrap_or(false), &status).await {
            Ok(resp) => Ok(CallToolResult::success(vec![Content::text(pretty(&resp))])),
            Err(e) => Err(McpError::internal_error(format!("{e}"), None)),
        }
    }

    #[tool(description = "Log a claim for later calibration resolution")]
    async fn pltm_log_claim(
        &self,
        params: Parameters<CheckClaimParams>,
    ) -> Result<CallToolResult, McpError> {
        let CheckClaimParams { claim, felt_confidence, domain, has_verified, epistemic_status } = params.0;
        let status = epistemic_status.unwrap_or_else(|| "Inference".to_string());
        match self.client.log_claim(&claim, felt_confidence, &domain, has_verified.unwrap_or(false), &status).await {
            Ok(resp) => Ok(CallToolResult::success(vec![Content::text(pretty(&resp))])),
            Err(e) => Err(McpError::internal_error(format!("{e}"), None)),
        }
    }

    #[tool(description = "Resolve a previously logged claim as correct or incorrect")]
    async fn pltm_resolve_claim(
        &self,
        params: Parameters<ResolveClaimParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.client.resolve_claim(params.0.id, params.0.was_correct).await {
            Ok(resp) => Ok(CallToolResult::success(vec![Content::text(pretty(&resp))])),
            Err(e) => Err(McpError::internal_error(format!("{e}"), None)),
        }
    }

    #[tool(description = "Get the calibration cache and curve for a domain")]
    async fn pltm_get_calibration(
        &self,
        params: Parameters<CalibrationParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.client.get_calibration(&params.0.domain).await {
            Ok(resp) => Ok(CallToolResult::success(vec![Content::text(pretty(&resp))])),
            Err(e) => Err(McpError::internal_error(format!("{e}"), None)),
        }
    }

    #[tool(description = "Show atom counts per sub-graph (unsubstantiated/substantiated/historical)")]
    async fn pltm_status(&self) -> Result<CallToolResult, McpError> {
        match self.client.status().await {
            Ok(resp) => Ok(CallToolResult::success(vec![Content::text(pretty(&resp))])),
            Err(e) => Err(McpError::internal_error(format!("{e}"), None)),
        }
    }

    #[tool(description = "Compute the canonical checksum of current memory")]
    async fn pltm_hash(&self) -> Result<CallToolResult, McpError> {
        match self.client.hash().await {
            Ok(resp) => Ok(CallToolResult::success(vec![Content::text(pretty(&resp))])),
            Err(e) => Err(McpError::internal_error(format!("{e}"), None)),
        }
    }
}

// =============================================================================
// SERVER HANDLER
// =============================================================================

#[tool_handler]
impl ServerHandler for PltmMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "pltm procedural long-term memory server. Use tools to store and \
                 retrieve factual atoms, run decay passes, and check claims against \
                 the epistemic monitor before asserting them."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// =============================================================================
// RESPONSE FORMATTING
// =============================================================================

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
