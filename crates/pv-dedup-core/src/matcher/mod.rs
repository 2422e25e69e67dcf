//! Case matching engine for duplicate adverse-event detection.
//!
//! Scoring weights (default):
//! - Drug identity: 40%
//! - Symptom narrative similarity: 40%
//! - Demographics (age/gender): 15%
//! - Reporting recency: 5%
//!
//! The engine is pure: no I/O, no state between calls. Candidate lookup and
//! persistence of decisions belong to [`crate::db`] and [`crate::dedup`].

mod normalizer;
mod similarity;

pub use normalizer::*;
pub use similarity::*;

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{
    CaseRecord, ComponentBreakdown, ComponentWeights, ConfidenceLabel, Gender, MatchReport,
    MatchResult, NewCaseInput, Recommendation,
};

/// Version stamped on linkage decisions.
pub const ALGORITHM_VERSION: &str = "1.0.0";

/// Allowed drift of the weight sum from 1.0.
const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Score for missing or mismatched demographic data.
const NEUTRAL_SCORE: f64 = 0.5;

/// Recency score for candidates outside the window.
const STALE_RECENCY_SCORE: f64 = 0.2;

/// Top score at which a REVIEW reason reads "Likely duplicate".
const LIKELY_DUPLICATE_SCORE: f64 = 0.80;

/// Oldest plausible patient age.
pub const MAX_AGE_YEARS: u32 = 150;

/// Matcher errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatcherError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Invalid case input: {0}")]
    Validation(String),
}

pub type MatcherResult<T> = Result<T, MatcherError>;

/// Fields the engine compares, shared by new and stored cases.
pub trait CaseFacts {
    fn drug_name(&self) -> &str;
    fn symptom_text(&self) -> Option<&str>;
    fn age(&self) -> Option<u32>;
    fn gender(&self) -> Option<&Gender>;
    /// Evaluation time for new cases, `reported_at` for stored ones
    fn timestamp(&self) -> DateTime<Utc>;
}

impl CaseFacts for NewCaseInput {
    fn drug_name(&self) -> &str {
        &self.drug_name
    }

    fn symptom_text(&self) -> Option<&str> {
        self.symptom_text.as_deref()
    }

    fn age(&self) -> Option<u32> {
        self.age
    }

    fn gender(&self) -> Option<&Gender> {
        self.gender.as_ref()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.evaluated_at
    }
}

impl CaseFacts for CaseRecord {
    fn drug_name(&self) -> &str {
        &self.drug_name
    }

    fn symptom_text(&self) -> Option<&str> {
        self.symptom_text.as_deref()
    }

    fn age(&self) -> Option<u32> {
        self.age
    }

    fn gender(&self) -> Option<&Gender> {
        self.gender.as_ref()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.reported_at
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatcherConfig {
    /// Minimum score for a candidate to be reported as a match
    pub threshold: f64,
    /// Score at or above which the engine recommends DISCARD
    pub auto_discard_threshold: f64,
    /// Age difference beyond which age similarity is neutral
    pub age_window_years: u32,
    /// Window over which recency decays linearly
    pub recency_window_days: u32,
    pub weights: ComponentWeights,
    pub symptom_metric: SymptomMetric,
    /// Cap on reported matches (None = all)
    pub max_matches: Option<usize>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: 0.75,
            auto_discard_threshold: 0.90,
            age_window_years: 10,
            recency_window_days: 30,
            weights: ComponentWeights::default(),
            symptom_metric: SymptomMetric::default(),
            max_matches: None,
        }
    }
}

impl MatcherConfig {
    /// Reject configurations that would produce meaningless scores.
    pub fn validate(&self) -> MatcherResult<()> {
        if !self.weights.all_valid() {
            return Err(MatcherError::Configuration(format!(
                "weights must be finite and non-negative: {:?}",
                self.weights
            )));
        }

        let sum = self.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(MatcherError::Configuration(format!(
                "weights must sum to 1.0, got {}",
                sum
            )));
        }

        check_unit_interval("threshold", self.threshold)?;
        check_unit_interval("auto_discard_threshold", self.auto_discard_threshold)?;

        if self.age_window_years == 0 {
            return Err(MatcherError::Configuration(
                "age_window_years must be at least 1".into(),
            ));
        }
        if self.recency_window_days == 0 {
            return Err(MatcherError::Configuration(
                "recency_window_days must be at least 1".into(),
            ));
        }
        if self.max_matches == Some(0) {
            return Err(MatcherError::Configuration(
                "max_matches must be at least 1 when set".into(),
            ));
        }

        Ok(())
    }
}

fn check_unit_interval(name: &str, value: f64) -> MatcherResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(MatcherError::Configuration(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

/// Weighted multi-factor duplicate detector.
#[derive(Debug, Clone)]
pub struct CaseMatchingEngine {
    config: MatcherConfig,
}

impl Default for CaseMatchingEngine {
    fn default() -> Self {
        Self {
            config: MatcherConfig::default(),
        }
    }
}

impl CaseMatchingEngine {
    /// Create an engine, validating the configuration.
    pub fn new(config: MatcherConfig) -> MatcherResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Copy of this engine with a different match threshold.
    pub fn with_threshold(&self, threshold: f64) -> MatcherResult<Self> {
        Self::new(MatcherConfig {
            threshold,
            ..self.config.clone()
        })
    }

    /// Find existing cases that are likely duplicates of `new_case`.
    ///
    /// Candidates are expected to be pre-filtered by the caller (same drug,
    /// status policy); the engine scores every one it is given.
    pub fn find_matching_cases(
        &self,
        new_case: &NewCaseInput,
        candidates: &[CaseRecord],
    ) -> MatcherResult<MatchReport> {
        validate_input(new_case)?;

        if candidates.is_empty() {
            return Ok(MatchReport {
                matches: Vec::new(),
                total_matches: 0,
                has_exact_match: false,
                recommendation: Recommendation::Accept,
                reason: "No existing cases to match".into(),
            });
        }

        let mut matches: Vec<MatchResult> = candidates
            .iter()
            .map(|candidate| self.score_candidate(new_case, candidate))
            .filter(|result| result.is_match)
            .collect();

        matches.sort_by(rank_order);

        let total_matches = matches.len();
        if let Some(limit) = self.config.max_matches {
            matches.truncate(limit);
        }

        let has_exact_match = matches
            .iter()
            .any(|m| m.similarity_score >= self.config.auto_discard_threshold);
        let (recommendation, reason) = self.recommend(matches.first());

        info!(
            drug = %new_case.drug_name,
            candidates = candidates.len(),
            total_matches,
            recommendation = recommendation.as_str(),
            "Case screening complete"
        );

        Ok(MatchReport {
            matches,
            total_matches,
            has_exact_match,
            recommendation,
            reason,
        })
    }

    /// Score one candidate against the new case.
    pub fn score_candidate(&self, new_case: &NewCaseInput, candidate: &CaseRecord) -> MatchResult {
        let (similarity_score, component_breakdown) =
            self.calculate_case_similarity(new_case, candidate);

        debug!(
            case_id = %candidate.case_id,
            score = similarity_score,
            drug = component_breakdown.drug,
            symptoms = component_breakdown.symptoms,
            demographics = component_breakdown.demographics,
            recency = component_breakdown.recency,
            "Scored candidate"
        );

        MatchResult {
            case_id: candidate.case_id.clone(),
            similarity_score,
            component_breakdown,
            confidence_label: ConfidenceLabel::from_score(similarity_score),
            is_match: similarity_score >= self.config.threshold,
            reported_at: candidate.reported_at,
            drug_name: candidate.drug_name.clone(),
            symptom_text: candidate.symptom_text.clone(),
            age: candidate.age,
            gender: candidate.gender.clone(),
        }
    }

    /// Weighted similarity of two cases and its component breakdown.
    ///
    /// Every component is order-independent, so swapping the arguments
    /// yields the same score.
    pub fn calculate_case_similarity<A, B>(&self, a: &A, b: &B) -> (f64, ComponentBreakdown)
    where
        A: CaseFacts + ?Sized,
        B: CaseFacts + ?Sized,
    {
        let breakdown = ComponentBreakdown {
            drug: self.score_drug(a.drug_name(), b.drug_name()),
            symptoms: self.score_symptoms(a.symptom_text(), b.symptom_text()),
            demographics: self.score_demographics(a, b),
            recency: self.score_recency(a.timestamp(), b.timestamp()),
        };

        let score = breakdown
            .weighted_score(&self.config.weights)
            .clamp(0.0, 1.0);

        (score, breakdown)
    }

    /// Drug identity (0.0 or 1.0). No partial credit.
    fn score_drug(&self, a: &str, b: &str) -> f64 {
        if drug_key(a) == drug_key(b) {
            1.0
        } else {
            0.0
        }
    }

    /// Symptom narrative similarity (0.0 - 1.0). Empty text scores 0.0.
    fn score_symptoms(&self, a: Option<&str>, b: Option<&str>) -> f64 {
        let a = normalize_text(a.unwrap_or_default());
        let b = normalize_text(b.unwrap_or_default());
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        self.config.symptom_metric.ratio(&a, &b)
    }

    /// Mean of age and gender similarity (0.0 - 1.0).
    fn score_demographics<A, B>(&self, a: &A, b: &B) -> f64
    where
        A: CaseFacts + ?Sized,
        B: CaseFacts + ?Sized,
    {
        let age = self.score_age(a.age(), b.age());
        let gender = score_gender(a.gender(), b.gender());
        (age + gender) / 2.0
    }

    /// Linear decay inside the window; neutral when missing or far apart.
    fn score_age(&self, a: Option<u32>, b: Option<u32>) -> f64 {
        match (a, b) {
            (Some(a), Some(b)) => {
                let diff = a.abs_diff(b);
                let window = self.config.age_window_years;
                if diff <= window {
                    1.0 - diff as f64 / (2.0 * window as f64)
                } else {
                    NEUTRAL_SCORE
                }
            }
            _ => NEUTRAL_SCORE,
        }
    }

    /// Linear decay over the recency window; stale candidates keep a floor.
    fn score_recency(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
        let days = (a - b).num_days().unsigned_abs();
        let window = u64::from(self.config.recency_window_days);
        if days <= window {
            1.0 - days as f64 / window as f64
        } else {
            STALE_RECENCY_SCORE
        }
    }

    fn recommend(&self, top: Option<&MatchResult>) -> (Recommendation, String) {
        let Some(top) = top else {
            return (Recommendation::Accept, "No matching cases found".into());
        };

        let score = top.similarity_score;
        let percent = score * 100.0;

        if score >= self.config.auto_discard_threshold {
            (
                Recommendation::Discard,
                format!(
                    "Very likely duplicate: {:.1}% similarity with case {}",
                    percent, top.case_id
                ),
            )
        } else if score >= LIKELY_DUPLICATE_SCORE {
            (
                Recommendation::Review,
                format!(
                    "Likely duplicate: {:.1}% similarity with case {} - manual review recommended",
                    percent, top.case_id
                ),
            )
        } else {
            (
                Recommendation::Review,
                format!(
                    "Possible duplicate: {:.1}% similarity with case {} - manual review recommended",
                    percent, top.case_id
                ),
            )
        }
    }
}

/// Gender similarity: equal 1.0, different or unknown 0.5.
fn score_gender(a: Option<&Gender>, b: Option<&Gender>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) if a == b => 1.0,
        _ => NEUTRAL_SCORE,
    }
}

/// Best score first; ties go to the more recent report, then case ID.
fn rank_order(a: &MatchResult, b: &MatchResult) -> Ordering {
    b.similarity_score
        .partial_cmp(&a.similarity_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.reported_at.cmp(&a.reported_at))
        .then_with(|| a.case_id.cmp(&b.case_id))
}

fn validate_input(new_case: &NewCaseInput) -> MatcherResult<()> {
    if new_case.drug_name.trim().is_empty() {
        return Err(MatcherError::Validation("drug_name must not be empty".into()));
    }
    if let Some(age) = new_case.age {
        if age > MAX_AGE_YEARS {
            return Err(MatcherError::Validation(format!(
                "age {} exceeds {} years",
                age, MAX_AGE_YEARS
            )));
        }
    }
    Ok(())
}
