//! Duplicate screening against the case store.
//!
//! Pipeline: Candidate Lookup → Similarity Scoring → Recommendation → Linkage Decision

mod writer;

pub use writer::*;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::db::{CandidateQuery, Database};
use crate::matcher::{CaseMatchingEngine, MatcherError};
use crate::models::{CaseRecord, CaseStatus, MatchReport, NewCaseInput};

/// Deduplication errors.
#[derive(Error, Debug)]
pub enum DedupError {
    #[error("Database error: {0}")]
    Database(#[from] crate::db::DbError),

    #[error("Matcher error: {0}")]
    Matcher(#[from] MatcherError),

    #[error("Case not found: {0}")]
    CaseNotFound(String),

    #[error("Case {case_id} is not among the screened matches")]
    NotInReport { case_id: String },

    #[error("Case {case_id} is {status} and cannot be {action}")]
    InvalidTransition {
        case_id: String,
        status: &'static str,
        action: &'static str,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type DedupResult<T> = Result<T, DedupError>;

/// Widest candidate window accepted from settings (about a century).
pub const MAX_WINDOW_DAYS: u32 = 36_500;

/// Which stored cases are eligible as duplicate candidates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CandidatePolicy {
    /// Cases already linked to a parent stay matchable
    pub include_linked: bool,
    pub include_discarded: bool,
    /// Only cases reported within this many days of the evaluation time
    pub window_days: Option<u32>,
    /// Upper bound on candidates handed to the engine
    pub limit: usize,
}

impl Default for CandidatePolicy {
    fn default() -> Self {
        Self {
            include_linked: true,
            include_discarded: false,
            window_days: None,
            limit: 200,
        }
    }
}

impl CandidatePolicy {
    /// Store query for a case evaluated at `input.evaluated_at`.
    ///
    /// Fails when the window reaches outside the representable date range.
    pub fn to_query(&self, input: &NewCaseInput) -> DedupResult<CandidateQuery> {
        let mut statuses = vec![CaseStatus::Active];
        if self.include_linked {
            statuses.push(CaseStatus::Linked);
        }
        if self.include_discarded {
            statuses.push(CaseStatus::Discarded);
        }

        let reported_since = match self.window_days {
            Some(days) => Some(
                Duration::try_days(i64::from(days))
                    .and_then(|window| input.evaluated_at.checked_sub_signed(window))
                    .ok_or_else(|| {
                        DedupError::InvalidRequest(format!(
                            "candidate window of {} days is out of range",
                            days
                        ))
                    })?,
            ),
            None => None,
        };

        Ok(CandidateQuery {
            statuses,
            reported_since,
            exclude_case_id: None,
            limit: self.limit,
        })
    }
}

/// Outcome of a screening that is not allowed to fail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Screening {
    /// The engine produced a report
    Evaluated(MatchReport),
    /// The engine could not run; a human must screen the case
    ManualReview { reason: String },
}

impl Screening {
    pub fn report(&self) -> Option<&MatchReport> {
        match self {
            Screening::Evaluated(report) => Some(report),
            Screening::ManualReview { .. } => None,
        }
    }

    pub fn needs_manual_review(&self) -> bool {
        matches!(self, Screening::ManualReview { .. })
    }
}

/// Screens new cases against the store.
pub struct Deduplicator<'a> {
    db: &'a Database,
    engine: CaseMatchingEngine,
    policy: CandidatePolicy,
}

impl<'a> Deduplicator<'a> {
    /// Create a deduplicator.
    pub fn new(db: &'a Database, engine: CaseMatchingEngine, policy: CandidatePolicy) -> Self {
        Self { db, engine, policy }
    }

    /// Default engine and candidate policy.
    pub fn with_defaults(db: &'a Database) -> Self {
        Self::new(db, CaseMatchingEngine::default(), CandidatePolicy::default())
    }

    pub fn engine(&self) -> &CaseMatchingEngine {
        &self.engine
    }

    pub fn policy(&self) -> &CandidatePolicy {
        &self.policy
    }

    /// Stored cases eligible to be duplicates of `input`.
    pub fn candidates_for(&self, input: &NewCaseInput) -> DedupResult<Vec<CaseRecord>> {
        let query = self.policy.to_query(input)?;
        let candidates = self.db.find_candidates(&input.drug_name, &query)?;
        debug!(
            drug = %input.drug_name,
            candidates = candidates.len(),
            "Loaded duplicate candidates"
        );
        Ok(candidates)
    }

    /// Screen a new case.
    pub fn screen(&self, input: &NewCaseInput) -> DedupResult<MatchReport> {
        let candidates = self.candidates_for(input)?;
        Ok(self.engine.find_matching_cases(input, &candidates)?)
    }

    /// Screen a new case; any failure routes the case to manual review.
    pub fn screen_or_manual_review(&self, input: &NewCaseInput) -> Screening {
        match self.screen(input) {
            Ok(report) => Screening::Evaluated(report),
            Err(err) => {
                warn!(
                    drug = %input.drug_name,
                    error = %err,
                    "Duplicate screening failed, routing case to manual review"
                );
                Screening::ManualReview {
                    reason: format!("Automatic duplicate screening failed: {}", err),
                }
            }
        }
    }

    /// Re-screen a stored case. The case never matches itself.
    pub fn screen_stored(&self, case_id: &str) -> DedupResult<MatchReport> {
        let stored = self
            .db
            .get_case(case_id)?
            .ok_or_else(|| DedupError::CaseNotFound(case_id.to_string()))?;
        let record = stored.record;

        let input = NewCaseInput {
            drug_name: record.drug_name,
            symptom_text: record.symptom_text,
            age: record.age,
            gender: record.gender,
            evaluated_at: record.reported_at,
        };

        let mut query = self.policy.to_query(&input)?;
        query.exclude_case_id = Some(record.case_id);

        let candidates = self.db.find_candidates(&input.drug_name, &query)?;
        Ok(self.engine.find_matching_cases(&input, &candidates)?)
    }
}
