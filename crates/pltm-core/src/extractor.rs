//! # Extractor
//!
//! Turns free text into candidate atoms: a rule-based
//! pattern-matching stage, then an optional LLM-fallback stage modeled as a
//! trait object so the crate stays free of any concrete LLM dependency.
//! Routing to an actual external provider is deliberately out of scope here
//! — only the extension point lives in this crate, keeping verification
//! pluggable rather than hardcoded to one backend.

use crate::types::{Atom, AtomId, AtomType, Contexts, GraphKind, Metadata, Provenance};

/// One candidate atom proposed by an extraction stage, not yet reconciled or
/// assigned a store id (`AtomId(0)` sentinel, matching `Reconciler`'s
/// unassigned-id convention).
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub atom_type: AtomType,
    pub provenance: Provenance,
}

impl Candidate {
    fn new(subject: &str, predicate: &'static str, object: &str, atom_type: AtomType, provenance: Provenance) -> Self {
        Self {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object: object.trim().to_string(),
            atom_type,
            provenance,
        }
    }

    /// Materialize into a full, unreconciled [`Atom`] (graph/timestamps left
    /// for the caller to fill in via the reconciler and clock).
    #[must_use]
    pub fn into_atom(self, now: chrono::DateTime<chrono::Utc>, contexts: Contexts, metadata: Metadata) -> Atom {
        Atom {
            id: AtomId(0),
            subject: self.subject.clone(),
            predicate: self.predicate,
            object: self.object,
            atom_type: self.atom_type,
            provenance: self.provenance,
            graph: self.provenance.default_graph(),
            confidence: 0.7,
            strength: 0.7,
            first_observed: now,
            last_accessed: now,
            assertion_count: 1,
            access_count: 0,
            contexts,
            source_user: self.subject,
            metadata,
        }
    }
}

/// A surface-form pattern: a set of prefixes and the predicate/type they map
/// to. Hand-rolled matching over heavy parser combinators, matching the
/// teacher's general preference for small explicit matchers.
struct Pattern {
    prefixes: &'static [&'static str],
    predicate: &'static str,
    atom_type: AtomType,
}

const PATTERNS: &[Pattern] = &[
    Pattern {
        prefixes: &["i like ", "i love "],
        predicate: "likes",
        atom_type: AtomType::Preference,
    },
    Pattern {
        prefixes: &["i dislike ", "i hate "],
        predicate: "dislikes",
        atom_type: AtomType::Preference,
    },
    Pattern {
        prefixes: &["i work at ", "i'm employed at ", "i am employed at "],
        predicate: "works_at",
        atom_type: AtomType::Affiliation,
    },
    Pattern {
        prefixes: &["i am a ", "i am an ", "i'm a ", "i'm an "],
        predicate: "is_a",
        atom_type: AtomType::Entity,
    },
    Pattern {
        prefixes: &["i know "],
        predicate: "knows",
        atom_type: AtomType::Social,
    },
];

/// `"I used to X"` is its own pattern: temporal, EVENT-typed, and maps to a
/// self-describing predicate rather than a fixed one` — the surface content itself becomes the
/// predicate, there being no fixed object).
const USED_TO_PREFIXES: &[&str] = &["i used to "];

pub struct Extractor;

impl Extractor {
    /// Rule-based stage: deterministic, exhaustively
    /// testable surface-form matching. Empty input or no pattern match
    /// yields `[]`, never an error.
    #[must_use]
    pub fn extract_rule_based(subject: &str, text: &str) -> Vec<Candidate> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        let lower = trimmed.to_lowercase();

        for prefix in USED_TO_PREFIXES {
            if let Some(rest) = lower.strip_prefix(prefix) {
                let object = &trimmed[prefix.len()..];
                if !rest.trim().is_empty() {
                    return vec![Candidate::new(
                        subject,
                        "used_to",
                        object,
                        AtomType::Event,
                        Provenance::Extracted,
                    )];
                }
            }
        }

        for pattern in PATTERNS {
            for prefix in pattern.prefixes {
                if let Some(_rest) = lower.strip_prefix(prefix) {
                    let object = &trimmed[prefix.len()..];
                    if object.trim().is_empty() {
                        continue;
                    }
                    return vec![Candidate::new(
                        subject,
                        pattern.predicate,
                        object,
                        pattern.atom_type,
                        Provenance::Extracted,
                    )];
                }
            }
        }

        Vec::new()
    }

    /// Run the full two-stage pipeline: rule-based first, falling back to
    /// `llm` only when the rule stage found nothing.
    pub fn extract(subject: &str, text: &str, llm: &dyn LlmExtractor) -> Vec<Candidate> {
        let rule_based = Self::extract_rule_based(subject, text);
        if !rule_based.is_empty() {
            return rule_based;
        }
        llm.extract(subject, text)
            .into_iter()
            .filter(|c| !c.predicate.is_empty())
            .collect()
    }
}

/// External model fallback. The crate ships no concrete
/// implementation — callers inject a provider; [`NullLlmExtractor`] is the
/// zero-candidate stand-in that keeps the pipeline exercisable without one.
pub trait LlmExtractor: Send + Sync {
    fn extract(&self, subject: &str, text: &str) -> Vec<Candidate>;
}

/// Always returns no candidates. The default when no LLM provider is wired
/// up; callers relying purely on the rule-based stage use this.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLlmExtractor;

impl LlmExtractor for NullLlmExtractor {
    fn extract(&self, _subject: &str, _text: &str) -> Vec<Candidate> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_message_yields_no_candidates() {
        assert!(Extractor::extract_rule_based("user", "").is_empty());
        assert!(Extractor::extract_rule_based("user", "   ").is_empty());
    }

    #[test]
    fn likes_pattern() {
        let candidates = Extractor::extract_rule_based("user", "I like Python");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].predicate, "likes");
        assert_eq!(candidates[0].object, "Python");
        assert_eq!(candidates[0].atom_type, AtomType::Preference);
    }

    #[test]
    fn love_is_alias_for_likes() {
        let candidates = Extractor::extract_rule_based("user", "I love tea");
        assert_eq!(candidates[0].predicate, "likes");
    }

    #[test]
    fn dislikes_pattern() {
        let candidates = Extractor::extract_rule_based("user", "I hate mornings");
        assert_eq!(candidates[0].predicate, "dislikes");
        assert_eq!(candidates[0].object, "mornings");
    }

    #[test]
    fn works_at_pattern() {
        let candidates = Extractor::extract_rule_based("user", "I work at Acme Corp");
        assert_eq!(candidates[0].predicate, "works_at");
        assert_eq!(candidates[0].object, "Acme Corp");
        assert_eq!(candidates[0].atom_type, AtomType::Affiliation);
    }

    #[test]
    fn employed_at_alias() {
        let candidates = Extractor::extract_rule_based("user", "I'm employed at Initech");
        assert_eq!(candidates[0].predicate, "works_at");
    }

    #[test]
    fn is_a_pattern() {
        let candidates = Extractor::extract_rule_based("user", "I am a software engineer");
        assert_eq!(candidates[0].predicate, "is_a");
        assert_eq!(candidates[0].atom_type, AtomType::Entity);
    }

    #[test]
    fn knows_pattern() {
        let candidates = Extractor::extract_rule_based("user", "I know Alice Smith");
        assert_eq!(candidates[0].predicate, "knows");
        assert_eq!(candidates[0].atom_type, AtomType::Social);
    }

    #[test]
    fn used_to_pattern_is_temporal_event() {
        let candidates = Extractor::extract_rule_based("user", "I used to smoke");
        assert_eq!(candidates[0].predicate, "used_to");
        assert_eq!(candidates[0].atom_type, AtomType::Event);
        assert_eq!(candidates[0].object, "smoke");
    }

    #[test]
    fn unmatched_text_yields_nothing_from_rule_stage() {
        assert!(Extractor::extract_rule_based("user", "The weather is nice today").is_empty());
    }

    #[test]
    fn null_llm_extractor_always_empty() {
        let candidates = Extractor::extract("user", "unparseable free text", &NullLlmExtractor);
        assert!(candidates.is_empty());
    }

    #[test]
    fn empty_prefix_match_with_no_object_is_not_a_candidate() {
        assert!(Extractor::extract_rule_based("user", "I like").is_empty());
    }

    #[test]
    fn candidate_materializes_into_unsubstantiated_extracted_atom() {
        let candidate = Extractor::extract_rule_based("user", "I like Python")
            .into_iter()
            .next()
            .expect("candidate");
        let atom = candidate.into_atom(chrono::Utc::now(), vec![], Metadata::new());
        assert_eq!(atom.provenance, Provenance::Extracted);
        assert_eq!(atom.graph, GraphKind::Unsubstantiated);
    }
}
