//! # Decay Engine
//!
//! Ebbinghaus-curve stability, reconsolidation-on-retrieval, and dissolution.
//! Pure functions taking `&Atom`, module-level threshold constants, and an
//! exhaustive edge-case test suite run for determinism.

use chrono::{DateTime, Utc};

use crate::ontology;
use crate::types::Atom;

pub const DEFAULT_DISSOLVE_THRESHOLD: f64 = 0.1;
pub const DEFAULT_RECONSOLIDATE_THRESHOLD: f64 = 0.5;
pub const DEFAULT_BOOST_FACTOR: f64 = 1.5;
pub const DEFAULT_RECONSOLIDATE_BOOST_FACTOR: f64 = 1.1;

/// Thresholds the predicted decay schedule solves for, highest first.
pub const SCHEDULE_THRESHOLDS: [(&str, f64); 5] = [
    ("90%", 0.9),
    ("75%", 0.75),
    ("50%", 0.5),
    ("25%", 0.25),
    ("10%", 0.1),
];

/// Hours-since-access scale factor baked into the strength parameter
/// (`d * c * 100`), matching the original's "scale to hours" comment.
const STRENGTH_SCALE: f64 = 100.0;

/// Compute the current retrieval-probability (stability) of `atom` at `now`.
///
/// `stability = exp(-t / (decay_rate * confidence * 100))`, clamped to
/// `[0, 1]`. INVARIANT atoms (`decay_rate == 0`) never decay. `confidence ==
/// 0` atoms are degenerate and immediately at `stability = 0`. A
/// `last_accessed` in the future (clock skew) is treated as `t = 0`.
#[must_use]
pub fn stability(atom: &Atom, now: DateTime<Utc>) -> f64 {
    let decay_rate = ontology::rule_for(atom.atom_type).decay_rate;

    if decay_rate <= 0.0 {
        return 1.0;
    }
    if atom.confidence <= 0.0 {
        return 0.0;
    }

    let hours_elapsed = now
        .signed_duration_since(atom.last_accessed)
        .num_milliseconds() as f64
        / 3_600_000.0;
    let hours_elapsed = hours_elapsed.max(0.0);

    let strength = decay_rate * atom.confidence * STRENGTH_SCALE;
    let raw = (-hours_elapsed / strength).exp();
    raw.clamp(0.0, 1.0)
}

/// Dissolution policy: only UNSUBSTANTIATED atoms below
/// `threshold` stability dissolve. SUBSTANTIATED and HISTORICAL atoms never
/// dissolve by decay.
#[must_use]
pub fn should_dissolve(atom: &Atom, now: DateTime<Utc>, threshold: f64) -> bool {
    if !matches!(atom.graph, crate::types::GraphKind::Unsubstantiated) {
        return false;
    }
    stability(atom, now) < threshold
}

/// Reconsolidate an atom in place: boost confidence (clamped at 1), reset
/// the access timer, and increment the access counter.
/// HISTORICAL atoms are frozen and must not be passed here — callers check
/// `graph` first; this function does not silently no-op so a caller bug is
/// visible.
pub fn reconsolidate(atom: &mut Atom, now: DateTime<Utc>, boost_factor: f64) {
    atom.confidence = (atom.confidence * boost_factor).min(1.0);
    atom.last_accessed = now;
    atom.access_count = atom.access_count.saturating_add(1);
}

/// Reinforce an atom on exact-triple re-insertion: bump the
/// assertion counter in addition to the ordinary reconsolidation effect.
pub fn reinforce(atom: &mut Atom, now: DateTime<Utc>, boost_factor: f64) {
    atom.assertion_count = atom.assertion_count.saturating_add(1);
    reconsolidate(atom, now, boost_factor);
}

/// Predicted decay schedule: the absolute timestamps at which
/// `stability` is projected to cross each of the standard thresholds,
/// solving `threshold = exp(-t / strength)` for `t`. INVARIANT atoms (and
/// any atom already below a threshold) map that threshold to `None`.
#[must_use]
pub fn decay_schedule(atom: &Atom, now: DateTime<Utc>) -> Vec<(&'static str, Option<DateTime<Utc>>)> {
    let decay_rate = ontology::rule_for(atom.atom_type).decay_rate;

    if decay_rate <= 0.0 || atom.confidence <= 0.0 {
        return SCHEDULE_THRESHOLDS
            .iter()
            .map(|(label, _)| (*label, None))
            .collect();
    }

    let strength = decay_rate * atom.confidence * STRENGTH_SCALE;
    let current = stability(atom, now);

    SCHEDULE_THRESHOLDS
        .iter()
        .map(|(label, threshold)| {
            if current < *threshold {
                // Already below this threshold; no future crossing time.
                (*label, None)
            } else {
                let hours = -threshold.ln() * strength;
                (*label, Some(atom.last_accessed + chrono::Duration::milliseconds((hours * 3_600_000.0) as i64)))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AtomId, AtomType, GraphKind, Provenance};

    fn atom_with(atom_type: AtomType, confidence: f64, graph: GraphKind, hours_ago: i64) -> Atom {
        let now = Utc::now();
        Atom {
            id: AtomId(1),
            subject: "user".into(),
            predicate: "likes".into(),
            object: "tea".into(),
            atom_type,
            provenance: Provenance::Inferred,
            graph,
            confidence,
            strength: confidence,
            first_observed: now - chrono::Duration::hours(hours_ago),
            last_accessed: now - chrono::Duration::hours(hours_ago),
            assertion_count: 1,
            access_count: 0,
            contexts: vec![],
            source_user: "user".into(),
            metadata: Default::default(),
        }
    }

    #[test]
    fn stability_at_t_zero_is_near_one() {
        let atom = atom_with(AtomType::Preference, 0.9, GraphKind::Unsubstantiated, 0);
        assert!(stability(&atom, Utc::now()) > 0.99);
    }

    #[test]
    fn stability_monotonically_decreases() {
        let atom1 = atom_with(AtomType::State, 0.8, GraphKind::Unsubstantiated, 1);
        let atom2 = atom_with(AtomType::State, 0.8, GraphKind::Unsubstantiated, 10);
        let now = Utc::now();
        assert!(stability(&atom1, now) > stability(&atom2, now));
    }

    #[test]
    fn invariant_never_decays() {
        let atom = atom_with(AtomType::Invariant, 0.9, GraphKind::Substantiated, 100_000);
        assert_eq!(stability(&atom, Utc::now()), 1.0);
    }

    #[test]
    fn zero_confidence_is_immediately_degenerate() {
        let atom = atom_with(AtomType::Preference, 0.0, GraphKind::Unsubstantiated, 0);
        assert_eq!(stability(&atom, Utc::now()), 0.0);
    }

    #[test]
    fn future_last_accessed_treated_as_t_zero() {
        let mut atom = atom_with(AtomType::Preference, 0.9, GraphKind::Unsubstantiated, 0);
        atom.last_accessed = Utc::now() + chrono::Duration::hours(5);
        assert!(stability(&atom, Utc::now()) > 0.99);
    }

    #[test]
    fn very_old_atom_clamps_to_zero() {
        let atom = atom_with(AtomType::State, 0.9, GraphKind::Unsubstantiated, 100_000);
        assert_eq!(stability(&atom, Utc::now()), 0.0);
    }

    #[test]
    fn substantiated_never_dissolves() {
        let atom = atom_with(AtomType::State, 0.1, GraphKind::Substantiated, 10_000);
        assert!(!should_dissolve(&atom, Utc::now(), DEFAULT_DISSOLVE_THRESHOLD));
    }

    #[test]
    fn historical_never_dissolves() {
        let atom = atom_with(AtomType::State, 0.1, GraphKind::Historical, 10_000);
        assert!(!should_dissolve(&atom, Utc::now(), DEFAULT_DISSOLVE_THRESHOLD));
    }

    #[test]
    fn unsubstantiated_dissolves_below_threshold() {
        // decay_rate=0.5 (STATE), confidence=0.5 -> strength=25h; after 168h stability << 0.1
        let atom = atom_with(AtomType::State, 0.5, GraphKind::Unsubstantiated, 168);
        assert!(should_dissolve(&atom, Utc::now(), DEFAULT_DISSOLVE_THRESHOLD));
    }

    #[test]
    fn reconsolidate_boosts_and_resets_timer() {
        let mut atom = atom_with(AtomType::Preference, 0.5, GraphKind::Substantiated, 10);
        let before_access_count = atom.access_count;
        let now = Utc::now();
        reconsolidate(&mut atom, now, DEFAULT_BOOST_FACTOR);
        assert_eq!(atom.confidence, 0.75);
        assert_eq!(atom.last_accessed, now);
        assert_eq!(atom.access_count, before_access_count + 1);
    }

    #[test]
    fn reconsolidate_clamps_at_one() {
        let mut atom = atom_with(AtomType::Preference, 0.9, GraphKind::Substantiated, 10);
        reconsolidate(&mut atom, Utc::now(), 3.0);
        assert_eq!(atom.confidence, 1.0);

        // Idempotent clamping: a second reconsolidation never exceeds 1.
        reconsolidate(&mut atom, Utc::now(), 3.0);
        assert_eq!(atom.confidence, 1.0);
    }

    #[test]
    fn reinforce_increments_assertion_count() {
        let mut atom = atom_with(AtomType::Preference, 0.5, GraphKind::Substantiated, 1);
        let before = atom.assertion_count;
        reinforce(&mut atom, Utc::now(), DEFAULT_BOOST_FACTOR);
        assert_eq!(atom.assertion_count, before + 1);
    }

    #[test]
    fn decay_schedule_invariant_is_all_none() {
        let atom = atom_with(AtomType::Invariant, 0.9, GraphKind::Substantiated, 0);
        let schedule = decay_schedule(&atom, Utc::now());
        assert!(schedule.iter().all(|(_, t)| t.is_none()));
    }

    #[test]
    fn decay_schedule_orders_thresholds_descending_in_time() {
        let atom = atom_with(AtomType::Preference, 0.9, GraphKind::Unsubstantiated, 0);
        let schedule = decay_schedule(&atom, Utc::now());
        let times: Vec<_> = schedule.iter().filter_map(|(_, t)| *t).collect();
        for window in times.windows(2) {
            assert!(window[0] <= window[1]);
        }
    }

    #[test]
    fn determinism_of_stability_computation() {
        let atom = atom_with(AtomType::Belief, 0.7, GraphKind::Unsubstantiated, 24);
        let now = Utc::now();
        let a = stability(&atom, now);
        let b = stability(&atom, now);
        let c = stability(&atom, now);
        assert_eq!(a, b);
        assert_eq!(b, c);
    }
}
