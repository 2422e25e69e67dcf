//! Persists linkage decisions made on screened cases.
//!
//! Each decision updates the case row and appends to the linking log in a
//! single transaction. Link and discard re-score the case against its target
//! from the stored records; the client's report only names the target.

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use super::{DedupError, DedupResult};
use crate::db::{CaseLinkage, Database};
use crate::matcher::CaseMatchingEngine;
use crate::models::{
    CaseRecord, CaseStatus, LinkageAction, LinkageLogEntry, MatchReport, NewCaseInput, StoredCase,
};

/// Attempts at drawing an unused case ID before giving up.
const CASE_ID_ATTEMPTS: usize = 8;

/// Generate a case ID of the form `PV-YYYYMMDD-XXXXX`.
pub fn generate_case_id(at: DateTime<Utc>) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .to_uppercase()
        .chars()
        .take(5)
        .collect();
    format!("PV-{}-{}", at.format("%Y%m%d"), suffix)
}

/// Writes case dispositions and their audit trail.
pub struct LinkageWriter<'a> {
    db: &'a Database,
    engine: CaseMatchingEngine,
}

impl<'a> LinkageWriter<'a> {
    /// Writer that verifies duplicates with the default engine.
    pub fn new(db: &'a Database) -> Self {
        Self::with_engine(db, CaseMatchingEngine::default())
    }

    pub fn with_engine(db: &'a Database, engine: CaseMatchingEngine) -> Self {
        Self { db, engine }
    }

    /// Store `input` as a new active case.
    ///
    /// `report` is the screening that preceded the decision, if any.
    pub fn accept(
        &self,
        input: &NewCaseInput,
        report: Option<&MatchReport>,
        decided_by: &str,
    ) -> DedupResult<StoredCase> {
        if input.drug_name.trim().is_empty() {
            return Err(DedupError::InvalidRequest("drug_name must not be empty".into()));
        }

        self.db.with_transaction(|db| {
            let case_id = self.unused_case_id(db, input.evaluated_at)?;
            db.insert_case(&CaseRecord::from_input(case_id.clone(), input))?;

            let mut entry = LinkageLogEntry::new(case_id.as_str(), LinkageAction::Accept, decided_by);
            entry.recommendation = report.map(|r| r.recommendation);
            entry.match_score = report.and_then(|r| r.top_match()).map(|m| m.similarity_score);
            db.insert_linking_log(&entry)?;

            info!(case_id = %case_id, decided_by, "Accepted new case");
            load(db, &case_id)
        })
    }

    /// Link an active case to one of its screened matches.
    pub fn link(
        &self,
        case_id: &str,
        target_case_id: &str,
        report: &MatchReport,
        notes: Option<&str>,
        decided_by: &str,
    ) -> DedupResult<StoredCase> {
        self.resolve_duplicate(
            LinkageAction::Link,
            case_id,
            target_case_id,
            report,
            notes,
            decided_by,
        )
    }

    /// Discard an active case as a duplicate of one of its screened matches.
    pub fn discard(
        &self,
        case_id: &str,
        target_case_id: &str,
        report: &MatchReport,
        notes: Option<&str>,
        decided_by: &str,
    ) -> DedupResult<StoredCase> {
        self.resolve_duplicate(
            LinkageAction::Discard,
            case_id,
            target_case_id,
            report,
            notes,
            decided_by,
        )
    }

    /// Reviewer links a case to any stored case, regardless of screening.
    pub fn override_link(
        &self,
        case_id: &str,
        target_case_id: &str,
        reason: &str,
        decided_by: &str,
    ) -> DedupResult<StoredCase> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DedupError::InvalidRequest(
                "an override requires a reason".into(),
            ));
        }

        self.db.with_transaction(|db| {
            load(db, case_id)?;
            check_target(db, case_id, target_case_id)?;

            let match_notes = format!("Manually linked to case {}: {}", target_case_id, reason);
            db.update_case_linkage(
                case_id,
                &CaseLinkage {
                    status: CaseStatus::Linked,
                    linked_case_id: Some(target_case_id),
                    match_score: None,
                    match_notes: Some(&match_notes),
                },
            )?;

            let mut entry = LinkageLogEntry::new(case_id, LinkageAction::Override, decided_by);
            entry.linked_case_id = Some(target_case_id.to_string());
            entry.notes = Some(reason.to_string());
            db.insert_linking_log(&entry)?;

            info!(case_id, target = target_case_id, decided_by, "Linkage overridden");
            load(db, case_id)
        })
    }

    fn resolve_duplicate(
        &self,
        action: LinkageAction,
        case_id: &str,
        target_case_id: &str,
        report: &MatchReport,
        notes: Option<&str>,
        decided_by: &str,
    ) -> DedupResult<StoredCase> {
        if report.find(target_case_id).is_none() {
            return Err(DedupError::NotInReport {
                case_id: target_case_id.to_string(),
            });
        }

        let (status, verb) = match action {
            LinkageAction::Discard => (CaseStatus::Discarded, "discarded"),
            _ => (CaseStatus::Linked, "linked"),
        };

        self.db.with_transaction(|db| {
            let current = load(db, case_id)?;
            if current.record.case_status != CaseStatus::Active {
                return Err(DedupError::InvalidTransition {
                    case_id: case_id.to_string(),
                    status: current.record.case_status.as_str(),
                    action: verb,
                });
            }
            check_target(db, case_id, target_case_id)?;
            let score = self.verified_score(&current.record, &load(db, target_case_id)?.record)?;

            let match_notes = match action {
                LinkageAction::Discard => discard_notes(target_case_id, notes),
                _ => link_notes(target_case_id, score, notes),
            };
            db.update_case_linkage(
                case_id,
                &CaseLinkage {
                    status,
                    linked_case_id: Some(target_case_id),
                    match_score: Some(score),
                    match_notes: Some(&match_notes),
                },
            )?;

            let mut entry = LinkageLogEntry::new(case_id, action, decided_by);
            entry.linked_case_id = Some(target_case_id.to_string());
            entry.match_score = Some(score);
            entry.recommendation = Some(report.recommendation);
            entry.notes = notes.map(str::to_string);
            db.insert_linking_log(&entry)?;

            info!(
                case_id,
                target = target_case_id,
                score,
                action = action.as_str(),
                decided_by,
                "Linkage decision recorded"
            );
            load(db, case_id)
        })
    }

    /// Score of `record` against `target`, which must be a same-drug match.
    fn verified_score(&self, record: &CaseRecord, target: &CaseRecord) -> DedupResult<f64> {
        let input = NewCaseInput {
            drug_name: record.drug_name.clone(),
            symptom_text: record.symptom_text.clone(),
            age: record.age,
            gender: record.gender.clone(),
            evaluated_at: record.reported_at,
        };
        let result = self.engine.score_candidate(&input, target);
        if !result.is_match || result.component_breakdown.drug < 1.0 {
            warn!(
                case_id = %record.case_id,
                target = %target.case_id,
                score = result.similarity_score,
                "Linkage target does not match the stored case"
            );
            return Err(DedupError::NotInReport {
                case_id: target.case_id.clone(),
            });
        }
        Ok(result.similarity_score)
    }

    fn unused_case_id(&self, db: &Database, at: DateTime<Utc>) -> DedupResult<String> {
        for _ in 0..CASE_ID_ATTEMPTS {
            let candidate = generate_case_id(at);
            if !db.case_exists(&candidate)? {
                return Ok(candidate);
            }
        }
        Err(DedupError::InvalidRequest(format!(
            "no unused case ID after {} attempts",
            CASE_ID_ATTEMPTS
        )))
    }
}

fn load(db: &Database, case_id: &str) -> DedupResult<StoredCase> {
    db.get_case(case_id)?
        .ok_or_else(|| DedupError::CaseNotFound(case_id.to_string()))
}

/// Target must exist, differ from the case, and not already descend from it.
fn check_target(db: &Database, case_id: &str, target_case_id: &str) -> DedupResult<()> {
    if case_id == target_case_id {
        return Err(DedupError::InvalidRequest(format!(
            "case {} cannot be linked to itself",
            case_id
        )));
    }
    if !db.case_exists(target_case_id)? {
        return Err(DedupError::CaseNotFound(target_case_id.to_string()));
    }
    if db.root_case(target_case_id)? == case_id {
        return Err(DedupError::InvalidRequest(format!(
            "linking {} to {} would create a cycle",
            case_id, target_case_id
        )));
    }
    Ok(())
}

fn link_notes(target_case_id: &str, score: f64, notes: Option<&str>) -> String {
    let base = format!("Linked to case {}. Score: {:.3}.", target_case_id, score);
    match notes.map(str::trim).filter(|n| !n.is_empty()) {
        Some(extra) => format!("{} {}", base, extra),
        None => base,
    }
}

fn discard_notes(target_case_id: &str, notes: Option<&str>) -> String {
    let base = format!("Discarded as duplicate of {}", target_case_id);
    match notes.map(str::trim).filter(|n| !n.is_empty()) {
        Some(extra) => format!("{}: {}", base, extra),
        None => base,
    }
}
