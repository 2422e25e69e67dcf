//! Linking log database operations.

use rusqlite::params;

use super::{decode_ts, encode_ts, Database, DbError, DbResult};
use crate::models::{LinkageAction, LinkageLogEntry, Recommendation};

impl Database {
    /// Append a decision to the linking log. Returns the new row ID.
    pub fn insert_linking_log(&self, entry: &LinkageLogEntry) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO case_linking_log (
                case_id, action, linked_case_id, match_score, recommendation,
                notes, decided_by, algorithm_version, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                entry.case_id,
                entry.action.as_str(),
                entry.linked_case_id,
                entry.match_score,
                entry.recommendation.map(|r| r.as_str()),
                entry.notes,
                entry.decided_by,
                entry.algorithm_version,
                encode_ts(&entry.created_at),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All decisions for a case, oldest first.
    pub fn linking_history(&self, case_id: &str) -> DbResult<Vec<LinkageLogEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, case_id, action, linked_case_id, match_score, recommendation,
                   notes, decided_by, algorithm_version, created_at
            FROM case_linking_log
            WHERE case_id = ?
            ORDER BY id
            "#,
        )?;

        let rows = stmt.query_map([case_id], |row| {
            Ok(LinkingLogRow {
                id: row.get(0)?,
                case_id: row.get(1)?,
                action: row.get(2)?,
                linked_case_id: row.get(3)?,
                match_score: row.get(4)?,
                recommendation: row.get(5)?,
                notes: row.get(6)?,
                decided_by: row.get(7)?,
                algorithm_version: row.get(8)?,
                created_at: row.get(9)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.try_into()?);
        }
        Ok(entries)
    }
}

/// Intermediate row struct for database mapping.
struct LinkingLogRow {
    id: i64,
    case_id: String,
    action: String,
    linked_case_id: Option<String>,
    match_score: Option<f64>,
    recommendation: Option<String>,
    notes: Option<String>,
    decided_by: String,
    algorithm_version: String,
    created_at: String,
}

impl TryFrom<LinkingLogRow> for LinkageLogEntry {
    type Error = DbError;

    fn try_from(row: LinkingLogRow) -> Result<Self, Self::Error> {
        let action = LinkageAction::parse(&row.action)
            .ok_or_else(|| DbError::Constraint(format!("Unknown linkage action: {}", row.action)))?;
        let recommendation = row
            .recommendation
            .map(|r| {
                Recommendation::parse(&r)
                    .ok_or_else(|| DbError::Constraint(format!("Unknown recommendation: {}", r)))
            })
            .transpose()?;

        Ok(LinkageLogEntry {
            id: Some(row.id),
            case_id: row.case_id,
            action,
            linked_case_id: row.linked_case_id,
            match_score: row.match_score,
            recommendation,
            notes: row.notes,
            decided_by: row.decided_by,
            algorithm_version: row.algorithm_version,
            created_at: decode_ts(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CaseRecord;
    use chrono::Utc;

    fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.insert_case(&CaseRecord::new("PV-1", "aspirin", None, Utc::now()))
            .unwrap();
        db.insert_case(&CaseRecord::new("PV-2", "aspirin", None, Utc::now()))
            .unwrap();
        db
    }

    #[test]
    fn test_insert_and_read_history() {
        let db = setup_db();

        let accept = LinkageLogEntry::new("PV-2", LinkageAction::Accept, "intake");
        let mut link = LinkageLogEntry::new("PV-2", LinkageAction::Link, "reviewer");
        link.linked_case_id = Some("PV-1".into());
        link.match_score = Some(0.82);
        link.recommendation = Some(Recommendation::Review);
        link.notes = Some("Same reporter".into());

        let first = db.insert_linking_log(&accept).unwrap();
        let second = db.insert_linking_log(&link).unwrap();
        assert!(second > first);

        let history = db.linking_history("PV-2").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action, LinkageAction::Accept);
        assert_eq!(history[1].id, Some(second));
        assert_eq!(history[1].linked_case_id.as_deref(), Some("PV-1"));
        assert_eq!(history[1].recommendation, Some(Recommendation::Review));
        assert_eq!(history[1].match_score, Some(0.82));
        assert_eq!(history[0].created_at, accept.created_at);

        assert!(db.linking_history("PV-1").unwrap().is_empty());
    }

    #[test]
    fn test_log_requires_existing_case() {
        let db = setup_db();
        let entry = LinkageLogEntry::new("PV-404", LinkageAction::Accept, "intake");
        assert!(db.insert_linking_log(&entry).is_err());
    }
}
