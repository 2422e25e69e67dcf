//! PV-Dedup Core Library
//!
//! Duplicate detection for pharmacovigilance adverse-event reports.
//!
//! # Architecture
//!
//! ```text
//! Submission JSON → Intake validation → Candidate lookup (same drug)
//!                                               │
//!                                  Weighted similarity scoring
//!                        drug 40% · symptoms 40% · demographics 15% · recency 5%
//!                                               │
//!                               MatchReport + recommendation
//!                                 ACCEPT / REVIEW / DISCARD
//!                                               │
//!                                       Reviewer decision
//!                                               │
//!                          ┌────────────────────▼────────────────────┐
//!                          │  cases row updated + linking log entry  │
//!                          │          (single transaction)           │
//!                          └─────────────────────────────────────────┘
//! ```
//!
//! # Core Principle
//!
//! **The engine only recommends.** Linking, discarding and overriding are
//! explicit decisions recorded with who made them.
//!
//! # Modules
//!
//! - [`matcher`]: Pure scoring engine (normalizer + sequence similarity)
//! - [`models`]: Domain types (CaseRecord, MatchReport, LinkageLogEntry, etc.)
//! - [`db`]: SQLite case store and append-only linking log
//! - [`dedup`]: Screening against the store and linkage decisions
//! - [`intake`]: Submission parsing
//! - [`config`]: YAML settings with environment overrides
//! - [`cli`]: `pv-dedup` command-line interface

pub mod cli;
pub mod config;
pub mod db;
pub mod dedup;
pub mod intake;
pub mod matcher;
pub mod models;

// Re-export commonly used types
pub use config::Settings;
pub use db::Database;
pub use dedup::{CandidatePolicy, Deduplicator, LinkageWriter, Screening};
pub use matcher::{CaseMatchingEngine, MatcherConfig};
pub use models::{
    CaseRecord, CaseStatus, ComponentBreakdown, ConfidenceLabel, Gender, LinkageAction,
    LinkageLogEntry, MatchReport, MatchResult, NewCaseInput, Recommendation, StoredCase,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::path::Path;
use std::sync::{Arc, Mutex};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum PvDedupError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<db::DbError> for PvDedupError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(what) => PvDedupError::NotFound(what),
            other => PvDedupError::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for PvDedupError {
    fn from(e: serde_json::Error) -> Self {
        PvDedupError::SerializationError(e.to_string())
    }
}

impl From<matcher::MatcherError> for PvDedupError {
    fn from(e: matcher::MatcherError) -> Self {
        match e {
            matcher::MatcherError::Configuration(msg) => PvDedupError::ConfigurationError(msg),
            matcher::MatcherError::Validation(msg) => PvDedupError::InvalidInput(msg),
        }
    }
}

impl From<intake::IntakeError> for PvDedupError {
    fn from(e: intake::IntakeError) -> Self {
        PvDedupError::InvalidInput(e.to_string())
    }
}

impl From<config::ConfigError> for PvDedupError {
    fn from(e: config::ConfigError) -> Self {
        PvDedupError::ConfigurationError(e.to_string())
    }
}

impl From<dedup::DedupError> for PvDedupError {
    fn from(e: dedup::DedupError) -> Self {
        match e {
            dedup::DedupError::Database(e) => e.into(),
            dedup::DedupError::Matcher(e) => e.into(),
            dedup::DedupError::CaseNotFound(id) => PvDedupError::NotFound(format!("Case {}", id)),
            other => PvDedupError::InvalidInput(other.to_string()),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for PvDedupError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        PvDedupError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path.
///
/// Settings come from `config_path` (YAML) when given, then `PV_*` environment overrides.
#[uniffi::export]
pub fn open_database(
    path: String,
    config_path: Option<String>,
) -> Result<Arc<PvDedupCore>, PvDedupError> {
    let settings = Settings::load(config_path.as_deref().map(Path::new))?;
    Ok(PvDedupCore::new(Database::open(&path)?, settings))
}

/// Create an in-memory database with default settings (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<PvDedupCore>, PvDedupError> {
    Ok(PvDedupCore::new(Database::open_in_memory()?, Settings::default()))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database wrapper for FFI.
#[derive(uniffi::Object)]
pub struct PvDedupCore {
    db: Arc<Mutex<Database>>,
    settings: Settings,
}

impl PvDedupCore {
    /// Wrap an open database with already resolved settings.
    pub fn new(db: Database, settings: Settings) -> Arc<Self> {
        Arc::new(Self {
            db: Arc::new(Mutex::new(db)),
            settings,
        })
    }

    fn engine(&self, threshold: Option<f64>) -> Result<CaseMatchingEngine, PvDedupError> {
        let engine = CaseMatchingEngine::new(self.settings.matcher.clone())?;
        Ok(match threshold {
            Some(threshold) => engine.with_threshold(threshold)?,
            None => engine,
        })
    }
}

#[uniffi::export]
impl PvDedupCore {
    // =========================================================================
    // Screening
    // =========================================================================

    /// Screen a submission against stored cases.
    ///
    /// Malformed submissions are rejected; failures after validation route
    /// the case to manual review instead of erroring.
    pub fn screen_case(&self, submission_json: String) -> Result<FfiScreening, PvDedupError> {
        let submission = intake::parse_submission(&submission_json)?;
        let engine = self.engine(submission.threshold)?;

        let db = self.db.lock()?;
        let dedup = Deduplicator::new(&db, engine, self.settings.candidates.clone());
        FfiScreening::try_from(dedup.screen_or_manual_review(&submission.case))
    }

    /// Re-screen a stored case against the rest of the store.
    pub fn rescreen_case(&self, case_id: String) -> Result<FfiMatchReport, PvDedupError> {
        let db = self.db.lock()?;
        let dedup = Deduplicator::new(&db, self.engine(None)?, self.settings.candidates.clone());
        Ok(dedup.screen_stored(&case_id)?.into())
    }

    // =========================================================================
    // Linkage Decisions
    // =========================================================================

    /// Store a submission as a new active case.
    pub fn accept_case(
        &self,
        submission_json: String,
        report_json: Option<String>,
        decided_by: String,
    ) -> Result<FfiCase, PvDedupError> {
        let submission = intake::parse_submission(&submission_json)?;
        let report = report_json
            .map(|json| serde_json::from_str::<MatchReport>(&json))
            .transpose()?;

        let db = self.db.lock()?;
        let stored = LinkageWriter::new(&db).accept(&submission.case, report.as_ref(), &decided_by)?;
        Ok(stored.into())
    }

    /// Link a case to one of the matches in its screening report.
    pub fn link_case(
        &self,
        case_id: String,
        target_case_id: String,
        report_json: String,
        notes: Option<String>,
        decided_by: String,
    ) -> Result<FfiCase, PvDedupError> {
        let report: MatchReport = serde_json::from_str(&report_json)?;

        let db = self.db.lock()?;
        let stored = LinkageWriter::with_engine(&db, self.engine(None)?).link(
            &case_id,
            &target_case_id,
            &report,
            notes.as_deref(),
            &decided_by,
        )?;
        Ok(stored.into())
    }

    /// Discard a case as a duplicate of one of the matches in its screening report.
    pub fn discard_case(
        &self,
        case_id: String,
        target_case_id: String,
        report_json: String,
        notes: Option<String>,
        decided_by: String,
    ) -> Result<FfiCase, PvDedupError> {
        let report: MatchReport = serde_json::from_str(&report_json)?;

        let db = self.db.lock()?;
        let stored = LinkageWriter::with_engine(&db, self.engine(None)?).discard(
            &case_id,
            &target_case_id,
            &report,
            notes.as_deref(),
            &decided_by,
        )?;
        Ok(stored.into())
    }

    /// Reviewer override: link a case to any stored case.
    pub fn override_link(
        &self,
        case_id: String,
        target_case_id: String,
        reason: String,
        decided_by: String,
    ) -> Result<FfiCase, PvDedupError> {
        let db = self.db.lock()?;
        let stored =
            LinkageWriter::new(&db).override_link(&case_id, &target_case_id, &reason, &decided_by)?;
        Ok(stored.into())
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Get a case by ID.
    pub fn get_case(&self, case_id: String) -> Result<Option<FfiCase>, PvDedupError> {
        let db = self.db.lock()?;
        Ok(db.get_case(&case_id)?.map(|c| c.into()))
    }

    /// Root of the duplicate chain a case belongs to.
    pub fn root_case(&self, case_id: String) -> Result<String, PvDedupError> {
        let db = self.db.lock()?;
        Ok(db.root_case(&case_id)?)
    }

    /// Linkage decisions for a case, oldest first.
    pub fn linking_history(&self, case_id: String) -> Result<Vec<FfiLinkageLogEntry>, PvDedupError> {
        let db = self.db.lock()?;
        let entries = db.linking_history(&case_id)?;
        Ok(entries.into_iter().map(|e| e.into()).collect())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe screening outcome.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiScreening {
    pub needs_manual_review: bool,
    /// Report reason, or why screening fell back to manual review
    pub reason: String,
    pub report: Option<FfiMatchReport>,
    /// Report as JSON, to hand back to `link_case`/`discard_case`
    pub report_json: Option<String>,
}

impl TryFrom<Screening> for FfiScreening {
    type Error = PvDedupError;

    fn try_from(screening: Screening) -> Result<Self, Self::Error> {
        match screening {
            Screening::Evaluated(report) => Ok(Self {
                needs_manual_review: false,
                reason: report.reason.clone(),
                report_json: Some(serde_json::to_string(&report)?),
                report: Some(report.into()),
            }),
            Screening::ManualReview { reason } => Ok(Self {
                needs_manual_review: true,
                reason,
                report: None,
                report_json: None,
            }),
        }
    }
}

/// FFI-safe match report.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMatchReport {
    pub matches: Vec<FfiMatchResult>,
    pub total_matches: u64,
    pub has_exact_match: bool,
    pub recommendation: String,
    pub reason: String,
}

impl From<MatchReport> for FfiMatchReport {
    fn from(report: MatchReport) -> Self {
        Self {
            matches: report.matches.into_iter().map(|m| m.into()).collect(),
            total_matches: report.total_matches as u64,
            has_exact_match: report.has_exact_match,
            recommendation: report.recommendation.as_str().to_string(),
            reason: report.reason,
        }
    }
}

/// FFI-safe match result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMatchResult {
    pub case_id: String,
    pub similarity_score: f64,
    pub drug_score: f64,
    pub symptom_score: f64,
    pub demographic_score: f64,
    pub recency_score: f64,
    pub confidence_label: String,
    pub reported_at: String,
    pub drug_name: String,
    pub symptom_text: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
}

impl From<MatchResult> for FfiMatchResult {
    fn from(result: MatchResult) -> Self {
        Self {
            case_id: result.case_id,
            similarity_score: result.similarity_score,
            drug_score: result.component_breakdown.drug,
            symptom_score: result.component_breakdown.symptoms,
            demographic_score: result.component_breakdown.demographics,
            recency_score: result.component_breakdown.recency,
            confidence_label: result.confidence_label.as_str().to_string(),
            reported_at: result.reported_at.to_rfc3339(),
            drug_name: result.drug_name,
            symptom_text: result.symptom_text,
            age: result.age,
            gender: result.gender.map(|g| g.as_str().to_string()),
        }
    }
}

/// FFI-safe stored case.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCase {
    pub case_id: String,
    pub drug_name: String,
    pub symptom_text: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub reported_at: String,
    pub case_status: String,
    pub linked_case_id: Option<String>,
    pub match_score: Option<f64>,
    pub match_notes: Option<String>,
}

impl From<StoredCase> for FfiCase {
    fn from(case: StoredCase) -> Self {
        let record = case.record;
        Self {
            case_id: record.case_id,
            drug_name: record.drug_name,
            symptom_text: record.symptom_text,
            age: record.age,
            gender: record.gender.map(|g| g.as_str().to_string()),
            reported_at: record.reported_at.to_rfc3339(),
            case_status: record.case_status.as_str().to_string(),
            linked_case_id: case.linked_case_id,
            match_score: case.match_score,
            match_notes: case.match_notes,
        }
    }
}

/// FFI-safe linking log entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLinkageLogEntry {
    pub id: Option<i64>,
    pub case_id: String,
    pub action: String,
    pub linked_case_id: Option<String>,
    pub match_score: Option<f64>,
    pub recommendation: Option<String>,
    pub notes: Option<String>,
    pub decided_by: String,
    pub algorithm_version: String,
    pub created_at: String,
}

impl From<LinkageLogEntry> for FfiLinkageLogEntry {
    fn from(entry: LinkageLogEntry) -> Self {
        Self {
            id: entry.id,
            case_id: entry.case_id,
            action: entry.action.as_str().to_string(),
            linked_case_id: entry.linked_case_id,
            match_score: entry.match_score,
            recommendation: entry.recommendation.map(|r| r.as_str().to_string()),
            notes: entry.notes,
            decided_by: entry.decided_by,
            algorithm_version: entry.algorithm_version,
            created_at: entry.created_at.to_rfc3339(),
        }
    }
}
