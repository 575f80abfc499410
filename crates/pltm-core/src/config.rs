//! # Configuration
//!
//! Every runtime tunable: decay scheduling/thresholds, reconciler similarity
//! thresholds, retrieval weights, the epistemic monitor's high-risk domain
//! list, and whether a vector backend is expected. Loadable from a TOML
//! file and overridable by `PLTM_*` environment variables (file first, env
//! as an override layer applied on top rather than a separate source of
//! truth).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::retriever::{DEFAULT_MMR_LAMBDA, DEFAULT_MMR_MIN_DISSIM};
use crate::types::PltmError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecayConfig {
    pub interval_hours: u64,
    pub dissolve_threshold: f64,
    pub reconsolidate_threshold: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            interval_hours: 6,
            dissolve_threshold: crate::decay::DEFAULT_DISSOLVE_THRESHOLD,
            reconsolidate_threshold: crate::decay::DEFAULT_RECONSOLIDATE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconcileConfig {
    pub similarity_threshold: f64,
    pub duplicate_threshold: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: crate::reconciler::DEFAULT_SIMILARITY_THRESHOLD,
            duplicate_threshold: crate::reconciler::DEFAULT_DUPLICATE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrieveConfig {
    /// `(relevance, confidence, recency, stability)` — the default
    /// attention weights.
    pub attention_weights: [f64; 4],
    pub mmr_lambda: f64,
    pub mmr_min_dissim: f64,
}

impl Default for RetrieveConfig {
    fn default() -> Self {
        Self {
            attention_weights: [0.5, 0.2, 0.15, 0.15],
            mmr_lambda: DEFAULT_MMR_LAMBDA,
            mmr_min_dissim: DEFAULT_MMR_MIN_DISSIM,
        }
    }
}

impl RetrieveConfig {
    #[must_use]
    pub fn weights(&self) -> crate::retriever::RetrievalWeights {
        crate::retriever::RetrievalWeights {
            relevance: self.attention_weights[0],
            confidence: self.attention_weights[1],
            recency: self.attention_weights[2],
            stability: self.attention_weights[3],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpistemicConfig {
    pub high_risk_domains: Vec<String>,
}

impl Default for EpistemicConfig {
    fn default() -> Self {
        Self {
            high_risk_domains: crate::epistemic::HIGH_RISK_DOMAINS.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    pub vector_enabled: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { vector_enabled: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PltmConfig {
    #[serde(default)]
    pub decay: DecayConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub retrieve: RetrieveConfig,
    #[serde(default)]
    pub epistemic: EpistemicConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl PltmConfig {
    /// Load from a TOML file, then apply `PLTM_*` environment overrides on
    /// top.
    pub fn load(path: &Path) -> Result<Self, PltmError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PltmError::InvalidArgument(format!("reading config file: {e}")))?;
        let mut config: Self =
            toml::from_str(&text).map_err(|e| PltmError::InvalidArgument(format!("parsing config file: {e}")))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults, then `PLTM_*` environment overrides — used when no config
    /// file is given.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_u64("PLTM_DECAY_INTERVAL_HOURS") {
            self.decay.interval_hours = v;
        }
        if let Some(v) = env_f64("PLTM_DECAY_DISSOLVE_THRESHOLD") {
            self.decay.dissolve_threshold = v;
        }
        if let Some(v) = env_f64("PLTM_DECAY_RECONSOLIDATE_THRESHOLD") {
            self.decay.reconsolidate_threshold = v;
        }
        if let Some(v) = env_f64("PLTM_RECONCILE_SIMILARITY_THRESHOLD") {
            self.reconcile.similarity_threshold = v;
        }
        if let Some(v) = env_f64("PLTM_RECONCILE_DUPLICATE_THRESHOLD") {
            self.reconcile.duplicate_threshold = v;
        }
        if let Some(v) = env_f64("PLTM_RETRIEVE_MMR_LAMBDA") {
            self.retrieve.mmr_lambda = v;
        }
        if let Some(v) = env_f64("PLTM_RETRIEVE_MMR_MIN_DISSIM") {
            self.retrieve.mmr_min_dissim = v;
        }
        if let Ok(v) = std::env::var("PLTM_EPISTEMIC_HIGH_RISK_DOMAINS") {
            let domains: Vec<String> = v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();
            if !domains.is_empty() {
                self.epistemic.high_risk_domains = domains;
            }
        }
        if let Some(v) = env_bool("PLTM_STORE_VECTOR_ENABLED") {
            self.store.vector_enabled = v;
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().and_then(|v| match v.to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = PltmConfig::default();
        assert_eq!(config.decay.interval_hours, 6);
        assert!((config.decay.dissolve_threshold - 0.1).abs() < 1e-9);
        assert!((config.decay.reconsolidate_threshold - 0.5).abs() < 1e-9);
        assert!((config.reconcile.similarity_threshold - 0.6).abs() < 1e-9);
        assert!((config.reconcile.duplicate_threshold - 0.9).abs() < 1e-9);
        assert_eq!(config.retrieve.attention_weights, [0.5, 0.2, 0.15, 0.15]);
        assert!((config.retrieve.mmr_lambda - 0.6).abs() < 1e-9);
        assert!((config.retrieve.mmr_min_dissim - 0.25).abs() < 1e-9);
        assert!(config.epistemic.high_risk_domains.contains(&"financial".to_string()));
        assert!(!config.store.vector_enabled);
    }

    #[test]
    fn load_from_toml_overrides_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pltm.toml");
        std::fs::write(
            &path,
            r#"
            [decay]
            interval_hours = 12
            dissolve_threshold = 0.2
            reconsolidate_threshold = 0.5

            [store]
            vector_enabled = true
            "#,
        )
        .expect("write");

        let config = PltmConfig::load(&path).expect("load");
        assert_eq!(config.decay.interval_hours, 12);
        assert!((config.decay.dissolve_threshold - 0.2).abs() < 1e-9);
        assert!(config.store.vector_enabled);
    }

    #[test]
    fn weights_maps_attention_weights_array() {
        let config = RetrieveConfig::default();
        let weights = config.weights();
        assert!((weights.relevance - 0.5).abs() < 1e-9);
        assert!((weights.stability - 0.15).abs() < 1e-9);
    }
}
