//! # pltm HTTP Client
//!
//! Wrapper around the pltm REST API for use by the MCP server. One method
//! RPC operation, plus the ambient export/import/hash/health
//! endpoints.

use serde_json::Value;

/// Errors from the HTTP client layer.
#[derive(Debug)]
pub enum ClientError {
    /// Cannot reach the pltm server.
    ConnectionFailed(String),
    /// 401 Unauthorized - invalid or missing API key.
    Unauthorized,
    /// 429 Too Many Requests.
    RateLimited,
    /// Server returned a 4xx/5xx error with a `{code, error}` body.
    ServerError(u16, String),
    /// Failed to parse response body.
    ParseError(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionFailed(url) => write!(f, "cannot connect to pltm at {url}"),
            Self::Unauthorized => write!(f, "unauthorized: invalid or missing API key"),
            Self::RateLimited => write!(f, "rate limited: too many requests"),
            Self::ServerError(status, msg) => write!(f, "server error ({status}): {msg}"),
            Self::ParseError(msg) => write!(f, "parse error: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

/// HTTP client that wraps calls to the pltm REST API.
#[derive(Clone)]
pub struct PltmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[allow(dead_code)]
impl PltmClient {
    /// Create a new client pointing at the given pltm server URL.
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.request(method, &url);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    async fn handle_response(&self, resp: reqwest::Response) -> Result<Value, ClientError> {
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited);
        }
        if status.is_client_error() || status.is_server_error() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::ServerError(status.as_u16(), body));
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        resp.json::<Value>().await.map_err(|e| ClientError::ParseError(e.to_string()))
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, ClientError> {
        req.send().await.map_err(|e| ClientError::ConnectionFailed(format!("{}: {e}", self.base_url)))
    }

    async fn get(&self, path: &str) -> Result<Value, ClientError> {
        let req = self.request(reqwest::Method::GET, path);
        let resp = self.send(req).await?;
        self.handle_response(resp).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        let req = self.request(reqwest::Method::POST, path).json(&body);
        let resp = self.send(req).await?;
        self.handle_response(resp).await
    }

    async fn delete(&self, path: &str) -> Result<Value, ClientError> {
        let req = self.request(reqwest::Method::DELETE, path);
        let resp = self.send(req).await?;
        self.handle_response(resp).await
    }

    pub async fn health(&self) -> Result<Value, ClientError> {
        self.get("/health").await
    }

    pub async fn status(&self) -> Result<Value, ClientError> {
        self.get("/status").await
    }

    // -- atoms --------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn store_atom(
        &self,
        subject: &str,
        predicate: &str,
        object: &str,
        atom_type: &str,
        confidence: Option<f64>,
    ) -> Result<Value, ClientError> {
        let body = serde_json::json!({
            "subject": subject,
            "predicate": predicate,
            "object": object,
            "atom_type": atom_type,
            "confidence": confidence,
        });
        self.post("/atoms", body).await
    }

    pub async fn get_atom(&self, id: u64) -> Result<Value, ClientError> {
        self.get(&format!("/atoms/{id}")).await
    }

    pub async fn delete_atom(&self, id: u64) -> Result<Value, ClientError> {
        self.delete(&format!("/atoms/{id}")).await
    }

    pub async fn find_triples(
        &self,
        subject: &str,
        predicate: Option<&str>,
        object: Option<&str>,
        include_historical: bool,
    ) -> Result<Value, ClientError> {
        let mut path = format!("/atoms?subject={}", urlencode(subject));
        if let Some(p) = predicate {
            path.push_str(&format!("&predicate={}", urlencode(p)));
        }
        if let Some(o) = object {
            path.push_str(&format!("&object={}", urlencode(o)));
        }
        if include_historical {
            path.push_str("&include_historical=true");
        }
        self.get(&path).await
    }

    // -- retrieval ------------------------------------------------------------

    pub async fn attention_retrieve(&self, subject: &str, query_text: &str, domain: Option<&str>, top_k: usize) -> Result<Value, ClientError> {
        let body = serde_json::json!({"subject": subject, "query_text": query_text, "domain": domain, "top_k": top_k});
        self.post("/retrieve/attention", body).await
    }

    pub async fn mmr_retrieve(&self, subject: &str, query_text: &str, domain: Option<&str>, top_k: usize) -> Result<Value, ClientError> {
        let body = serde_json::json!({"subject": subject, "query_text": query_text, "domain": domain, "top_k": top_k});
        self.post("/retrieve/mmr", body).await
    }

    pub async fn attention_multihead(&self, subject: &str, query_text: &str, domain: Option<&str>, top_k: usize) -> Result<Value, ClientError> {
        let body = serde_json::json!({"subject": subject, "query_text": query_text, "domain": domain, "top_k": top_k});
        self.post("/retrieve/attention_multihead", body).await
    }

    pub async fn inject_entropy(&self, kind: &str, subject: &str, query_text: Option<&str>, n: usize) -> Result<Value, ClientError> {
        let body = serde_json::json!({"subject": subject, "query_text": query_text, "n": n});
        self.post(&format!("/retrieve/entropy/{kind}"), body).await
    }

    // -- decay ----------------------------------------------------------------

    pub async fn decay_stability(&self, id: u64) -> Result<Value, ClientError> {
        self.get(&format!("/decay/{id}")).await
    }

    pub async fn decay_run(&self) -> Result<Value, ClientError> {
        self.post("/decay/run", serde_json::json!({})).await
    }

    // -- epistemic monitor ----------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn check_before_claiming(
        &self,
        claim: &str,
        felt_confidence: f64,
        domain: &str,
        has_verified: bool,
        epistemic_status: &str,
    ) -> Result<Value, ClientError> {
        let body = serde_json::json!({
            "claim": claim,
            "felt_confidence": felt_confidence,
            "domain": domain,
            "has_verified": has_verified,
            "epistemic_status": epistemic_status,
        });
        self.post("/epistemic/check", body).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn log_claim(
        &self,
        claim: &str,
        felt_confidence: f64,
        domain: &str,
        has_verified: bool,
        epistemic_status: &str,
    ) -> Result<Value, ClientError> {
        let body = serde_json::json!({
            "claim": claim,
            "felt_confidence": felt_confidence,
            "domain": domain,
            "has_verified": has_verified,
            "epistemic_status": epistemic_status,
        });
        self.post("/epistemic/claims", body).await
    }

    pub async fn resolve_claim(&self, id: u64, was_correct: bool) -> Result<Value, ClientError> {
        let body = serde_json::json!({"was_correct": was_correct});
        self.post(&format!("/epistemic/claims/{id}/resolve"), body).await
    }

    pub async fn get_calibration(&self, domain: &str) -> Result<Value, ClientError> {
        self.get(&format!("/epistemic/calibration?domain={}", urlencode(domain))).await
    }

    // -- ambient --------------------------------------------------------------

    pub async fn hash(&self) -> Result<Value, ClientError> {
        self.get("/hash").await
    }

    pub async fn export(&self) -> Result<Value, ClientError> {
        self.post("/export", serde_json::json!({})).await
    }
}

/// Minimal percent-encoding for query string values; avoids a dependency
/// just for a handful of subject/predicate/object strings.
fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
