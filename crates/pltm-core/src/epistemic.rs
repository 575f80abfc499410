//! # Epistemic Monitor
//!
//! The prediction book / calibration loop: every factual claim is logged
//! with felt confidence, later resolved, and the resulting per-domain
//! calibration gates future claims.

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::store::AtomStore;
use crate::types::{
    CalibrationCache, CalibrationVerdict, ClaimId, EpistemicIntervention, EpistemicStatus, InterventionId, Metadata,
    PltmError, PredictionRow,
};

/// Below this many resolved data points, calibration falls back to the
/// baseline.
pub const MIN_DATA_POINTS: u64 = 3;
pub const BASELINE_ACCURACY_RATIO: f64 = 0.6;
pub const BASELINE_OVERCONFIDENCE_RATIO: f64 = 0.3;

const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.8;
const LOW_ADJUSTED_CONFIDENCE_THRESHOLD: f64 = 0.5;
const HISTORICAL_OVERCONFIDENCE_THRESHOLD: f64 = 0.4;
const HISTORICAL_OVERCONFIDENCE_MIN_POINTS: u64 = 5;

const WELL_CALIBRATED_GAP: f64 = 0.10;
const HIGH_FELT_THRESHOLD: f64 = 0.7;

/// Domains treated as intrinsically higher-risk for unverified claims:
/// time-sensitive facts, statistics, specs, legal/medical/financial advice.
pub const HIGH_RISK_DOMAINS: &[&str] = &[
    "current_events",
    "dates",
    "statistics",
    "technical_specs",
    "legal",
    "medical",
    "financial",
];

/// Small, fixed, overridable phrase list rather than an NLP classifier.
pub const OVERCONFIDENT_PHRASES: &[&str] = &[
    "definitely",
    "certainly",
    "always",
    "guaranteed",
    "100%",
    "no doubt",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimAction {
    Proceed,
    VerifyFirst,
}

/// Result of [`EpistemicMonitor::check_before_claiming`].
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub proceed: bool,
    pub action: ClaimAction,
    pub adjusted_confidence: f64,
    pub recommended_status: EpistemicStatus,
    pub reasons: Vec<String>,
    pub suggested_hedges: Vec<String>,
}

pub struct EpistemicMonitor;

impl EpistemicMonitor {
    /// Pre-claim check: look up (or default) the domain's
    /// calibration, adjust the felt confidence, collect verification
    /// reasons, and log the resulting intervention.
    pub fn check_before_claiming(
        store: &dyn AtomStore,
        clock: &dyn Clock,
        claim: &str,
        felt_confidence: f64,
        domain: &str,
        has_verified: bool,
        epistemic_status: EpistemicStatus,
    ) -> Result<CheckResult, PltmError> {
        let cache = store.get_calibration(domain)?;
        let (accuracy_ratio, overconfidence_ratio, total_claims) = cache
            .as_ref()
            .filter(|c| c.verified_claims >= MIN_DATA_POINTS)
            .map_or((BASELINE_ACCURACY_RATIO, BASELINE_OVERCONFIDENCE_RATIO, 0), |c| {
                (c.accuracy_ratio, c.overconfidence_ratio, c.total_claims)
            });

        let adjusted_confidence = (felt_confidence * accuracy_ratio).clamp(0.0, 1.0);

        let mut reasons = Vec::new();
        if HIGH_RISK_DOMAINS.contains(&domain) {
            reasons.push(format!("domain '{domain}' is high-risk"));
        }
        if felt_confidence > HIGH_CONFIDENCE_THRESHOLD && !has_verified {
            reasons.push("high felt confidence without verification".to_string());
        }
        if adjusted_confidence < LOW_ADJUSTED_CONFIDENCE_THRESHOLD {
            reasons.push("adjusted confidence is low".to_string());
        }
        if epistemic_status == EpistemicStatus::TrainingData {
            reasons.push("claim derives from training data, not live verification".to_string());
        }
        if overconfidence_ratio > HISTORICAL_OVERCONFIDENCE_THRESHOLD
            && total_claims >= HISTORICAL_OVERCONFIDENCE_MIN_POINTS
        {
            reasons.push("historical overconfidence in this domain".to_string());
        }
        let lowered = claim.to_lowercase();
        if OVERCONFIDENT_PHRASES.iter().any(|phrase| lowered.contains(phrase)) {
            reasons.push("claim uses an overconfident surface phrase".to_string());
        }

        let should_verify = !reasons.is_empty() && !has_verified;
        let action = if should_verify {
            ClaimAction::VerifyFirst
        } else {
            ClaimAction::Proceed
        };

        let recommended_status = if has_verified {
            EpistemicStatus::Verified
        } else if adjusted_confidence >= 0.7 {
            EpistemicStatus::TrainingData
        } else if adjusted_confidence >= 0.4 {
            EpistemicStatus::Inference
        } else if adjusted_confidence >= 0.2 {
            EpistemicStatus::Speculation
        } else {
            EpistemicStatus::Uncertain
        };

        let suggested_hedges = if should_verify {
            vec![
                "I believe, though I haven't verified this".to_string(),
                "based on my training data, which may be outdated".to_string(),
            ]
        } else {
            Vec::new()
        };

        let intervention = EpistemicIntervention {
            id: store.next_intervention_id()?,
            timestamp: clock.now(),
            claim: claim.to_string(),
            domain: domain.to_string(),
            felt_confidence,
            adjusted_confidence,
            action_taken: format!("{action:?}"),
            should_have_verified: should_verify,
            did_verify: has_verified,
            outcome: "pending".to_string(),
            metadata: Metadata::new(),
        };
        store.insert_intervention(&intervention)?;

        Ok(CheckResult {
            proceed: !should_verify,
            action,
            adjusted_confidence,
            recommended_status,
            reasons,
            suggested_hedges,
        })
    }

    /// Append a prediction-book row.
    pub fn log_claim(
        store: &dyn AtomStore,
        clock: &dyn Clock,
        claim: &str,
        felt_confidence: f64,
        domain: &str,
        epistemic_status: EpistemicStatus,
        has_verified: bool,
    ) -> Result<ClaimId, PltmError> {
        let id = store.next_claim_id()?;
        let row = PredictionRow {
            id,
            timestamp: clock.now(),
            claim: claim.to_string(),
            domain: domain.to_string(),
            felt_confidence,
            epistemic_status,
            has_verified,
            verified_at: None,
            actual_truth: None,
            was_correct: None,
            calibration_error: None,
            correction_source: None,
            correction_detail: None,
        };
        store.insert_prediction(&row)?;
        Ok(id)
    }

    /// Resolve a logged claim and rebuild its domain's calibration cache
    ///.
    pub fn resolve_claim(
        store: &dyn AtomStore,
        clock: &dyn Clock,
        claim_id: ClaimId,
        was_correct: bool,
        source: Option<&str>,
        detail: Option<&str>,
    ) -> Result<(f64, CalibrationVerdict), PltmError> {
        let mut row = store.get_prediction(claim_id)?;
        let now = clock.now();

        let actual = if was_correct { 1.0 } else { 0.0 };
        let calibration_error = (row.felt_confidence - actual).abs();

        row.verified_at = Some(now);
        row.actual_truth = Some(was_correct);
        row.was_correct = Some(was_correct);
        row.calibration_error = Some(calibration_error);
        row.correction_source = source.map(str::to_string);
        row.correction_detail = detail.map(str::to_string);
        store.update_prediction(&row)?;

        let cache = Self::rebuild_calibration(store, &row.domain, now)?;
        Ok((calibration_error, verdict(&cache)))
    }

    /// Recompute the domain's calibration cache from the full set of
    /// resolved prediction-book rows. Persisted so readers
    /// don't pay the scan cost on every `check_before_claiming` call.
    pub fn rebuild_calibration(store: &dyn AtomStore, domain: &str, now: DateTime<Utc>) -> Result<CalibrationCache, PltmError> {
        let mut total_claims: u64 = 0;
        let mut verified_claims: u64 = 0;
        let mut correct_claims: u64 = 0;
        let mut felt_sum = 0.0_f64;
        let mut error_sum = 0.0_f64;
        let mut error_count: u64 = 0;
        let mut high_felt_total: u64 = 0;
        let mut high_felt_wrong: u64 = 0;

        for id in store.ids_by_domain(domain)? {
            let row = store.get_prediction(id)?;
            total_claims += 1;
            felt_sum += row.felt_confidence;

            if let Some(correct) = row.was_correct {
                verified_claims += 1;
                if correct {
                    correct_claims += 1;
                }
                if let Some(err) = row.calibration_error {
                    error_sum += err;
                    error_count += 1;
                }
                if row.felt_confidence > HIGH_FELT_THRESHOLD {
                    high_felt_total += 1;
                    if !correct {
                        high_felt_wrong += 1;
                    }
                }
            }
        }

        let accuracy_ratio = if verified_claims > 0 {
            correct_claims as f64 / verified_claims as f64
        } else {
            BASELINE_ACCURACY_RATIO
        };
        let avg_felt_confidence = if total_claims > 0 { felt_sum / total_claims as f64 } else { 0.0 };
        let avg_calibration_error = if error_count > 0 { error_sum / error_count as f64 } else { 0.0 };
        let overconfidence_ratio = if high_felt_total > 0 {
            high_felt_wrong as f64 / high_felt_total as f64
        } else {
            BASELINE_OVERCONFIDENCE_RATIO
        };

        let cache = CalibrationCache {
            domain: domain.to_string(),
            total_claims,
            verified_claims,
            correct_claims,
            accuracy_ratio,
            avg_felt_confidence,
            avg_calibration_error,
            overconfidence_ratio,
            last_updated: now,
        };
        store.put_calibration(&cache)?;
        Ok(cache)
    }
}

const SEVERE_GAP: f64 = 0.3;
const OVERCONFIDENT_GAP: f64 = 0.15;

/// Derive the verdict label from a calibration cache. Large-gap cases are
/// checked first: a severe felt/actual gap is the dominant signal even when
/// `overconfidence_ratio` also happens to be high, matching the original's
/// `_calibration_verdict`, which only falls to the high-confidence-failures
/// branch once the gap itself is unremarkable.
#[must_use]
pub fn verdict(cache: &CalibrationCache) -> CalibrationVerdict {
    let signed_gap = cache.avg_felt_confidence - cache.accuracy_ratio;
    let gap = signed_gap.abs();

    if signed_gap > SEVERE_GAP {
        CalibrationVerdict::SeverelyOverconfident
    } else if signed_gap > OVERCONFIDENT_GAP {
        CalibrationVerdict::Overconfident
    } else if signed_gap < -OVERCONFIDENT_GAP {
        CalibrationVerdict::Underconfident
    } else if cache.overconfidence_ratio > 0.6 {
        CalibrationVerdict::HighConfidenceFailures
    } else if gap < WELL_CALIBRATED_GAP {
        CalibrationVerdict::WellCalibrated
    } else {
        CalibrationVerdict::Underconfident
    }
}

/// Bucketed calibration curve: buckets of width 0.2 over
/// `felt_confidence`, each reporting observed accuracy and the gap to felt
/// confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationBucket {
    pub range: (f64, f64),
    pub count: u64,
    pub accuracy: f64,
    pub gap: f64,
}

/// Compute the bucketed calibration curve for a domain directly from its
/// resolved prediction-book rows.
pub fn calibration_curve(store: &dyn AtomStore, domain: &str) -> Result<Vec<CalibrationBucket>, PltmError> {
    const BUCKET_WIDTH: f64 = 0.2;
    let mut buckets = vec![(0u64, 0u64, 0.0_f64); 5]; // (total, correct, felt_sum)

    for id in store.ids_by_domain(domain)? {
        let row = store.get_prediction(id)?;
        let Some(correct) = row.was_correct else { continue };
        let idx = ((row.felt_confidence / BUCKET_WIDTH) as usize).min(4);
        buckets[idx].0 += 1;
        if correct {
            buckets[idx].1 += 1;
        }
        buckets[idx].2 += row.felt_confidence;
    }

    Ok(buckets
        .into_iter()
        .enumerate()
        .map(|(idx, (total, correct, felt_sum))| {
            let lo = idx as f64 * BUCKET_WIDTH;
            let accuracy = if total > 0 { correct as f64 / total as f64 } else { 0.0 };
            let avg_felt = if total > 0 { felt_sum / total as f64 } else { lo + BUCKET_WIDTH / 2.0 };
            CalibrationBucket {
                range: (lo, lo + BUCKET_WIDTH),
                count: total,
                accuracy,
                gap: (avg_felt - accuracy).abs(),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::MemStore;
    use chrono::Utc;

    #[test]
    fn baseline_used_below_min_data_points() {
        let store = MemStore::new();
        let clock = FixedClock::new(Utc::now());
        let result = EpistemicMonitor::check_before_claiming(
            &store,
            &clock,
            "The sky is blue",
            0.9,
            "general",
            false,
            EpistemicStatus::Inference,
        )
        .expect("check");
        assert!((result.adjusted_confidence - 0.9 * BASELINE_ACCURACY_RATIO).abs() < 1e-9);
    }

    #[test]
    fn high_risk_domain_forces_verification() {
        let store = MemStore::new();
        let clock = FixedClock::new(Utc::now());
        let result = EpistemicMonitor::check_before_claiming(
            &store,
            &clock,
            "The stock will rise",
            0.5,
            "financial",
            false,
            EpistemicStatus::Inference,
        )
        .expect("check");
        assert_eq!(result.action, ClaimAction::VerifyFirst);
        assert!(!result.reasons.is_empty());
    }

    #[test]
    fn overconfident_phrase_triggers_reason() {
        let store = MemStore::new();
        let clock = FixedClock::new(Utc::now());
        let result = EpistemicMonitor::check_before_claiming(
            &store,
            &clock,
            "This is definitely correct",
            0.5,
            "general",
            false,
            EpistemicStatus::Inference,
        )
        .expect("check");
        assert!(result.reasons.iter().any(|r| r.contains("overconfident")));
    }

    #[test]
    fn calibration_loop_end_to_end() {
        let store = MemStore::new();
        let clock = FixedClock::new(Utc::now());

        let mut ids = Vec::new();
        for _ in 0..10 {
            let id = EpistemicMonitor::log_claim(
                &store,
                &clock,
                "claim",
                0.9,
                "dates",
                EpistemicStatus::Inference,
                false,
            )
            .expect("log");
            ids.push(id);
        }

        for (i, id) in ids.iter().enumerate() {
            let correct = i < 2;
            EpistemicMonitor::resolve_claim(&store, &clock, *id, correct, None, None).expect("resolve");
        }

        let cache = store.get_calibration("dates").expect("get").expect("some");
        assert!((cache.accuracy_ratio - 0.2).abs() < 1e-9);
        assert!((cache.avg_felt_confidence - 0.9).abs() < 1e-9);
        assert!((cache.overconfidence_ratio - 0.8).abs() < 1e-9);
        assert_eq!(verdict(&cache), CalibrationVerdict::SeverelyOverconfident);

        let check = EpistemicMonitor::check_before_claiming(
            &store,
            &clock,
            "another claim",
            0.9,
            "dates",
            false,
            EpistemicStatus::Inference,
        )
        .expect("check");
        assert_eq!(check.action, ClaimAction::VerifyFirst);
        assert!((check.adjusted_confidence - 0.18).abs() < 1e-9);
    }

    #[test]
    fn resolve_claim_computes_calibration_error() {
        let store = MemStore::new();
        let clock = FixedClock::new(Utc::now());
        let id = EpistemicMonitor::log_claim(&store, &clock, "x", 0.8, "general", EpistemicStatus::Inference, false)
            .expect("log");
        let (error, _) = EpistemicMonitor::resolve_claim(&store, &clock, id, false, Some("user"), None).expect("resolve");
        assert!((error - 0.8).abs() < 1e-9);
    }
}
