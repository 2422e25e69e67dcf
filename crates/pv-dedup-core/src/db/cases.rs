//! Case store database operations.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, types::Value, OptionalExtension, Row};

use super::{decode_ts, encode_ts, Database, DbError, DbResult};
use crate::matcher::drug_key;
use crate::models::{CaseRecord, CaseStatus, Gender, StoredCase};

const CASE_COLUMNS: &str = r#"
    case_id, drug_name, symptom_text, age, gender, reported_at, case_status,
    linked_case_id, match_score, match_notes, created_at, updated_at
"#;

/// Filters for a candidate lookup. The drug is always an exact key match.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateQuery {
    /// Statuses eligible for matching; empty means no candidates
    pub statuses: Vec<CaseStatus>,
    /// Only cases reported at or after this instant
    pub reported_since: Option<DateTime<Utc>>,
    /// Never return this case (re-screening a stored case)
    pub exclude_case_id: Option<String>,
    pub limit: usize,
}

impl Default for CandidateQuery {
    fn default() -> Self {
        Self {
            statuses: vec![CaseStatus::Active, CaseStatus::Linked],
            reported_since: None,
            exclude_case_id: None,
            limit: 200,
        }
    }
}

/// New linkage state for a stored case.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseLinkage<'a> {
    pub status: CaseStatus,
    pub linked_case_id: Option<&'a str>,
    pub match_score: Option<f64>,
    pub match_notes: Option<&'a str>,
}

impl Database {
    /// Insert a new case. Linkage columns start empty.
    pub fn insert_case(&self, case: &CaseRecord) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO cases (
                case_id, drug_name, drug_name_normalized, symptom_text,
                age, gender, reported_at, case_status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            "#,
            params![
                case.case_id,
                case.drug_name,
                drug_key(&case.drug_name),
                case.symptom_text,
                case.age,
                case.gender.as_ref().map(Gender::as_str),
                encode_ts(&case.reported_at),
                case.case_status.as_str(),
                encode_ts(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    /// Get a case by ID.
    pub fn get_case(&self, case_id: &str) -> DbResult<Option<StoredCase>> {
        let sql = format!("SELECT {} FROM cases WHERE case_id = ?", CASE_COLUMNS);
        self.conn
            .query_row(&sql, [case_id], case_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Whether a case with this ID exists.
    pub fn case_exists(&self, case_id: &str) -> DbResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM cases WHERE case_id = ?",
            [case_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// List cases by status, newest report first.
    pub fn list_cases_by_status(&self, status: CaseStatus) -> DbResult<Vec<StoredCase>> {
        let sql = format!(
            "SELECT {} FROM cases WHERE case_status = ? ORDER BY reported_at DESC, case_id",
            CASE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([status.as_str()], case_row)?;

        let mut cases = Vec::new();
        for row in rows {
            cases.push(row?.try_into()?);
        }
        Ok(cases)
    }

    /// Cases sharing the drug key of `drug_name`, newest report first.
    pub fn find_candidates(
        &self,
        drug_name: &str,
        query: &CandidateQuery,
    ) -> DbResult<Vec<CaseRecord>> {
        if query.statuses.is_empty() || query.limit == 0 {
            return Ok(Vec::new());
        }

        let mut sql = format!(
            "SELECT {} FROM cases WHERE drug_name_normalized = ?",
            CASE_COLUMNS
        );
        let mut values: Vec<Value> = vec![Value::Text(drug_key(drug_name))];

        let placeholders = vec!["?"; query.statuses.len()].join(", ");
        sql.push_str(&format!(" AND case_status IN ({})", placeholders));
        values.extend(
            query
                .statuses
                .iter()
                .map(|s| Value::Text(s.as_str().to_string())),
        );

        if let Some(since) = &query.reported_since {
            sql.push_str(" AND reported_at >= ?");
            values.push(Value::Text(encode_ts(since)));
        }

        if let Some(excluded) = &query.exclude_case_id {
            sql.push_str(" AND case_id <> ?");
            values.push(Value::Text(excluded.clone()));
        }

        sql.push_str(" ORDER BY reported_at DESC, case_id LIMIT ?");
        values.push(Value::Integer(i64::try_from(query.limit).unwrap_or(i64::MAX)));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), case_row)?;

        let mut cases = Vec::new();
        for row in rows {
            let stored: StoredCase = row?.try_into()?;
            cases.push(stored.record);
        }
        Ok(cases)
    }

    /// Overwrite the linkage state of a case.
    pub fn update_case_linkage(&self, case_id: &str, linkage: &CaseLinkage<'_>) -> DbResult<bool> {
        if linkage.linked_case_id == Some(case_id) {
            return Err(DbError::Constraint(format!(
                "Case {} cannot be linked to itself",
                case_id
            )));
        }

        let rows_affected = self.conn.execute(
            r#"
            UPDATE cases SET
                case_status = ?2,
                linked_case_id = ?3,
                match_score = ?4,
                match_notes = ?5,
                updated_at = ?6
            WHERE case_id = ?1
            "#,
            params![
                case_id,
                linkage.status.as_str(),
                linkage.linked_case_id,
                linkage.match_score,
                linkage.match_notes,
                encode_ts(&Utc::now()),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Follow `linked_case_id` to the first case that is not itself linked.
    pub fn root_case(&self, case_id: &str) -> DbResult<String> {
        let mut current = case_id.to_string();
        let mut seen = HashSet::new();

        loop {
            if !seen.insert(current.clone()) {
                return Err(DbError::Constraint(format!(
                    "Linkage cycle detected at case {}",
                    current
                )));
            }

            let parent: Option<Option<String>> = self
                .conn
                .query_row(
                    "SELECT linked_case_id FROM cases WHERE case_id = ?",
                    [&current],
                    |row| row.get(0),
                )
                .optional()?;

            match parent {
                None => return Err(DbError::NotFound(format!("Case {}", current))),
                Some(None) => return Ok(current),
                Some(Some(next)) => current = next,
            }
        }
    }
}

fn case_row(row: &Row<'_>) -> rusqlite::Result<CaseRow> {
    Ok(CaseRow {
        case_id: row.get(0)?,
        drug_name: row.get(1)?,
        symptom_text: row.get(2)?,
        age: row.get(3)?,
        gender: row.get(4)?,
        reported_at: row.get(5)?,
        case_status: row.get(6)?,
        linked_case_id: row.get(7)?,
        match_score: row.get(8)?,
        match_notes: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

/// Intermediate row struct for database mapping.
struct CaseRow {
    case_id: String,
    drug_name: String,
    symptom_text: Option<String>,
    age: Option<i64>,
    gender: Option<String>,
    reported_at: String,
    case_status: String,
    linked_case_id: Option<String>,
    match_score: Option<f64>,
    match_notes: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<CaseRow> for StoredCase {
    type Error = DbError;

    fn try_from(row: CaseRow) -> Result<Self, Self::Error> {
        let case_status = CaseStatus::parse(&row.case_status).ok_or_else(|| {
            DbError::Constraint(format!("Unknown case status: {}", row.case_status))
        })?;
        let age = row
            .age
            .map(u32::try_from)
            .transpose()
            .map_err(|_| DbError::Constraint(format!("Invalid age on case {}", row.case_id)))?;

        Ok(StoredCase {
            record: CaseRecord {
                case_id: row.case_id,
                drug_name: row.drug_name,
                symptom_text: row.symptom_text,
                age,
                gender: row.gender.as_deref().and_then(Gender::from_stored),
                reported_at: decode_ts(&row.reported_at)?,
                case_status,
            },
            linked_case_id: row.linked_case_id,
            match_score: row.match_score,
            match_notes: row.match_notes,
            created_at: decode_ts(&row.created_at)?,
            updated_at: decode_ts(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn case(id: &str, drug: &str, days_ago: i64) -> CaseRecord {
        CaseRecord::new(
            id,
            drug,
            Some("headache".into()),
            Utc::now() - Duration::days(days_ago),
        )
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup_db();
        let record = case("PV-1", "Aspirin", 0)
            .with_age(45)
            .with_gender(Gender::Female);
        db.insert_case(&record).unwrap();

        let stored = db.get_case("PV-1").unwrap().unwrap();
        assert_eq!(stored.record, record);
        assert_eq!(stored.created_at, stored.updated_at);
        assert!(!stored.is_duplicate());
        assert!(db.get_case("PV-2").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let db = setup_db();
        db.insert_case(&case("PV-1", "aspirin", 0)).unwrap();
        assert!(db.insert_case(&case("PV-1", "ibuprofen", 0)).is_err());
    }

    #[test]
    fn test_find_candidates_matches_drug_key() {
        let db = setup_db();
        db.insert_case(&case("PV-1", "Aspirin", 3)).unwrap();
        db.insert_case(&case("PV-2", " ASPIRIN ", 1)).unwrap();
        db.insert_case(&case("PV-3", "Ibuprofen", 1)).unwrap();

        let found = db
            .find_candidates("aspirin", &CandidateQuery::default())
            .unwrap();
        let ids: Vec<_> = found.iter().map(|c| c.case_id.as_str()).collect();

        // Newest first
        assert_eq!(ids, vec!["PV-2", "PV-1"]);
    }

    #[test]
    fn test_find_candidates_status_filter() {
        let db = setup_db();
        db.insert_case(&case("PV-1", "aspirin", 1)).unwrap();
        db.insert_case(&case("PV-2", "aspirin", 2).with_status(CaseStatus::Linked))
            .unwrap();
        db.insert_case(&case("PV-3", "aspirin", 3).with_status(CaseStatus::Discarded))
            .unwrap();

        let default = db
            .find_candidates("aspirin", &CandidateQuery::default())
            .unwrap();
        assert_eq!(default.len(), 2);
        assert!(default.iter().all(|c| c.case_status != CaseStatus::Discarded));

        let active_only = CandidateQuery {
            statuses: vec![CaseStatus::Active],
            ..Default::default()
        };
        assert_eq!(db.find_candidates("aspirin", &active_only).unwrap().len(), 1);

        let none = CandidateQuery {
            statuses: vec![],
            ..Default::default()
        };
        assert!(db.find_candidates("aspirin", &none).unwrap().is_empty());
    }

    #[test]
    fn test_find_candidates_window_limit_and_exclusion() {
        let db = setup_db();
        for (i, days) in [1, 5, 40, 400].iter().enumerate() {
            db.insert_case(&case(&format!("PV-{}", i), "aspirin", *days))
                .unwrap();
        }

        let windowed = CandidateQuery {
            reported_since: Some(Utc::now() - Duration::days(30)),
            ..Default::default()
        };
        assert_eq!(db.find_candidates("aspirin", &windowed).unwrap().len(), 2);

        let limited = CandidateQuery {
            limit: 3,
            exclude_case_id: Some("PV-0".into()),
            ..Default::default()
        };
        let ids: Vec<_> = db
            .find_candidates("aspirin", &limited)
            .unwrap()
            .into_iter()
            .map(|c| c.case_id)
            .collect();
        assert_eq!(ids, vec!["PV-1", "PV-2", "PV-3"]);
    }

    #[test]
    fn test_update_linkage_and_root() {
        let db = setup_db();
        db.insert_case(&case("PV-1", "aspirin", 3)).unwrap();
        db.insert_case(&case("PV-2", "aspirin", 2)).unwrap();
        db.insert_case(&case("PV-3", "aspirin", 1)).unwrap();

        let linkage = CaseLinkage {
            status: CaseStatus::Linked,
            linked_case_id: Some("PV-1"),
            match_score: Some(0.87),
            match_notes: Some("Linked to case PV-1. Score: 0.870."),
        };
        assert!(db.update_case_linkage("PV-2", &linkage).unwrap());

        let linkage = CaseLinkage {
            linked_case_id: Some("PV-2"),
            ..linkage
        };
        assert!(db.update_case_linkage("PV-3", &linkage).unwrap());

        let stored = db.get_case("PV-2").unwrap().unwrap();
        assert!(stored.updated_at >= stored.created_at);
        assert_eq!(stored.record.case_status, CaseStatus::Linked);
        assert_eq!(stored.linked_case_id.as_deref(), Some("PV-1"));
        assert_eq!(stored.match_score, Some(0.87));

        assert_eq!(db.root_case("PV-3").unwrap(), "PV-1");
        assert_eq!(db.root_case("PV-1").unwrap(), "PV-1");
        assert!(matches!(db.root_case("PV-404"), Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_self_link_rejected() {
        let db = setup_db();
        db.insert_case(&case("PV-1", "aspirin", 0)).unwrap();

        let linkage = CaseLinkage {
            status: CaseStatus::Linked,
            linked_case_id: Some("PV-1"),
            match_score: None,
            match_notes: None,
        };
        assert!(matches!(
            db.update_case_linkage("PV-1", &linkage),
            Err(DbError::Constraint(_))
        ));
    }

    #[test]
    fn test_list_by_status() {
        let db = setup_db();
        db.insert_case(&case("PV-1", "aspirin", 1)).unwrap();
        db.insert_case(&case("PV-2", "ibuprofen", 2).with_status(CaseStatus::Discarded))
            .unwrap();

        let active = db.list_cases_by_status(CaseStatus::Active).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].record.case_id, "PV-1");
        assert!(db.case_exists("PV-2").unwrap());
        assert!(!db.case_exists("PV-3").unwrap());
    }
}
