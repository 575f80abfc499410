//! # Ontology
//!
//! The static rule table that maps an [`AtomType`] to its decay rate,
//! exclusivity, contextuality, progression, and allowed predicates, plus
//! the opposite-predicate involution used by the reconciler's conflict
//! detector.

use crate::types::AtomType;

/// Rules governing one atom type. A plain data table, not behavior — small
/// pure lookup functions over the ontology rather than a polymorphic trait
/// per type.
#[derive(Debug, Clone, Copy)]
pub struct OntologyRule {
    pub allowed_predicates: &'static [&'static str],
    pub decay_rate: f64,
    pub exclusive: bool,
    pub contextual: bool,
    pub progressive: bool,
    pub temporal: bool,
    pub immutable: bool,
    /// Ordered level sequence for progressive types (empty otherwise).
    pub progression_sequence: &'static [&'static str],
}

const ENTITY: OntologyRule = OntologyRule {
    allowed_predicates: &["is_a", "named", "identifies_as"],
    decay_rate: 0.01,
    exclusive: false,
    contextual: false,
    progressive: false,
    temporal: false,
    immutable: false,
    progression_sequence: &[],
};

const AFFILIATION: OntologyRule = OntologyRule {
    allowed_predicates: &["works_at", "member_of", "studies_at", "volunteers_at"],
    decay_rate: 0.03,
    exclusive: true,
    contextual: false,
    progressive: false,
    temporal: false,
    immutable: false,
    progression_sequence: &[],
};

const SOCIAL: OntologyRule = OntologyRule {
    allowed_predicates: &["knows", "reports_to", "married_to", "friends_with"],
    decay_rate: 0.05,
    exclusive: false,
    contextual: false,
    progressive: false,
    temporal: false,
    immutable: false,
    progression_sequence: &[],
};

const SKILL: OntologyRule = OntologyRule {
    allowed_predicates: &["skilled_in", "practices", "studies"],
    decay_rate: 0.02,
    exclusive: false,
    contextual: false,
    progressive: true,
    temporal: false,
    immutable: false,
    progression_sequence: &["learning", "proficient", "expert", "mastered"],
};

const PREFERENCE: OntologyRule = OntologyRule {
    allowed_predicates: &["likes", "dislikes", "prefers", "avoids"],
    decay_rate: 0.08,
    exclusive: false,
    contextual: true,
    progressive: false,
    temporal: false,
    immutable: false,
    progression_sequence: &[],
};

const BELIEF: OntologyRule = OntologyRule {
    allowed_predicates: &["trusts", "distrusts", "supports", "opposes", "believes"],
    decay_rate: 0.10,
    exclusive: false,
    contextual: false,
    progressive: false,
    temporal: false,
    immutable: false,
    progression_sequence: &[],
};

const EVENT: OntologyRule = OntologyRule {
    allowed_predicates: &["attended", "visited", "completed", "experienced", "used_to"],
    decay_rate: 0.06,
    exclusive: false,
    contextual: false,
    progressive: false,
    temporal: true,
    immutable: false,
    progression_sequence: &[],
};

const STATE: OntologyRule = OntologyRule {
    allowed_predicates: &["mood_is", "status_is", "feeling"],
    decay_rate: 0.50,
    exclusive: true,
    contextual: false,
    progressive: false,
    temporal: false,
    immutable: false,
    progression_sequence: &[],
};

const HYPOTHESIS: OntologyRule = OntologyRule {
    allowed_predicates: &["might_be", "could_indicate", "suggests"],
    decay_rate: 0.15,
    exclusive: false,
    contextual: false,
    progressive: false,
    temporal: false,
    immutable: false,
    progression_sequence: &[],
};

const INVARIANT: OntologyRule = OntologyRule {
    allowed_predicates: &["is_always", "never", "axiom"],
    decay_rate: 0.00,
    exclusive: false,
    contextual: false,
    progressive: false,
    temporal: false,
    immutable: true,
    progression_sequence: &[],
};

/// Legacy generic bucket: liberal admission, no decay-rate meaning beyond
/// the BELIEF-like default. `allowed_predicates` is empty, which
/// `is_predicate_allowed` interprets as "admit anything" for this one type.
const RELATION: OntologyRule = OntologyRule {
    allowed_predicates: &[],
    decay_rate: 0.10,
    exclusive: false,
    contextual: false,
    progressive: false,
    temporal: false,
    immutable: false,
    progression_sequence: &[],
};

/// Look up the ontology rule for an atom type.
#[must_use]
pub const fn rule_for(atom_type: AtomType) -> OntologyRule {
    match atom_type {
        AtomType::Entity => ENTITY,
        AtomType::Affiliation => AFFILIATION,
        AtomType::Social => SOCIAL,
        AtomType::Skill => SKILL,
        AtomType::Preference => PREFERENCE,
        AtomType::Belief => BELIEF,
        AtomType::Event => EVENT,
        AtomType::State => STATE,
        AtomType::Hypothesis => HYPOTHESIS,
        AtomType::Invariant => INVARIANT,
        AtomType::Relation => RELATION,
    }
}

/// Whether `predicate` is legal for `atom_type`.
/// The legacy `Relation` bucket admits any predicate.
#[must_use]
pub fn is_predicate_allowed(atom_type: AtomType, predicate: &str) -> bool {
    let rule = rule_for(atom_type);
    if matches!(atom_type, AtomType::Relation) {
        return true;
    }
    rule.allowed_predicates.contains(&predicate)
}

/// A partial involution on the predicate string set: `likes <-> dislikes`,
/// `trusts <-> distrusts`, `supports <-> opposes`, `prefers <-> avoids`.
/// `opposite(opposite(p)) == p` wherever defined.
const OPPOSITE_PAIRS: &[(&str, &str)] = &[
    ("likes", "dislikes"),
    ("trusts", "distrusts"),
    ("supports", "opposes"),
    ("prefers", "avoids"),
];

#[must_use]
pub fn opposite_predicate(predicate: &str) -> Option<&'static str> {
    for (a, b) in OPPOSITE_PAIRS {
        if predicate == *a {
            return Some(b);
        }
        if predicate == *b {
            return Some(a);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decay_rates_match_spec_table() {
        assert_eq!(rule_for(AtomType::Entity).decay_rate, 0.01);
        assert_eq!(rule_for(AtomType::Affiliation).decay_rate, 0.03);
        assert_eq!(rule_for(AtomType::Social).decay_rate, 0.05);
        assert_eq!(rule_for(AtomType::Skill).decay_rate, 0.02);
        assert_eq!(rule_for(AtomType::Preference).decay_rate, 0.08);
        assert_eq!(rule_for(AtomType::Belief).decay_rate, 0.10);
        assert_eq!(rule_for(AtomType::Event).decay_rate, 0.06);
        assert_eq!(rule_for(AtomType::State).decay_rate, 0.50);
        assert_eq!(rule_for(AtomType::Hypothesis).decay_rate, 0.15);
        assert_eq!(rule_for(AtomType::Invariant).decay_rate, 0.00);
    }

    #[test]
    fn invariant_is_immutable_and_never_decays() {
        let rule = rule_for(AtomType::Invariant);
        assert!(rule.immutable);
        assert_eq!(rule.decay_rate, 0.0);
    }

    #[test]
    fn exclusivity_matches_spec_table() {
        assert!(rule_for(AtomType::Affiliation).exclusive);
        assert!(rule_for(AtomType::State).exclusive);
        assert!(!rule_for(AtomType::Preference).exclusive);
    }

    #[test]
    fn preference_is_contextual() {
        assert!(rule_for(AtomType::Preference).contextual);
        assert!(!rule_for(AtomType::Belief).contextual);
    }

    #[test]
    fn opposite_is_involution() {
        assert_eq!(opposite_predicate("likes"), Some("dislikes"));
        assert_eq!(opposite_predicate("dislikes"), Some("likes"));
        assert_eq!(
            opposite_predicate(opposite_predicate("trusts").expect("trusts has an opposite")),
            Some("trusts")
        );
        assert_eq!(opposite_predicate("knows"), None);
    }

    #[test]
    fn relation_admits_any_predicate() {
        assert!(is_predicate_allowed(AtomType::Relation, "anything_goes"));
    }

    #[test]
    fn preference_rejects_unknown_predicate() {
        assert!(!is_predicate_allowed(AtomType::Preference, "works_at"));
        assert!(is_predicate_allowed(AtomType::Preference, "likes"));
    }

    #[test]
    fn skill_progression_sequence() {
        let rule = rule_for(AtomType::Skill);
        assert!(rule.progressive);
        assert_eq!(
            rule.progression_sequence,
            &["learning", "proficient", "expert", "mastered"]
        );
    }
}
