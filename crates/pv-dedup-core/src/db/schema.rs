//! SQLite schema definition.

/// Complete database schema for pv-dedup.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- Timestamps are RFC 3339 UTC. The store writes them with nanoseconds;
-- column defaults only cover rows inserted by hand.

-- ============================================================================
-- Adverse-Event Cases
-- ============================================================================

CREATE TABLE IF NOT EXISTS cases (
    case_id TEXT PRIMARY KEY,
    drug_name TEXT NOT NULL,
    drug_name_normalized TEXT NOT NULL,           -- trimmed, lowercased
    symptom_text TEXT,
    age INTEGER CHECK (age IS NULL OR (age >= 0 AND age <= 150)),
    gender TEXT,
    reported_at TEXT NOT NULL,                    -- RFC 3339, UTC, nanoseconds
    case_status TEXT NOT NULL DEFAULT 'active'
        CHECK (case_status IN ('active', 'linked', 'discarded')),
    linked_case_id TEXT REFERENCES cases(case_id),
    match_score REAL CHECK (match_score IS NULL OR (match_score >= 0.0 AND match_score <= 1.0)),
    match_notes TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CHECK (linked_case_id IS NULL OR linked_case_id <> case_id)
);

CREATE INDEX IF NOT EXISTS idx_cases_drug ON cases(drug_name_normalized, reported_at);
CREATE INDEX IF NOT EXISTS idx_cases_status ON cases(case_status);
CREATE INDEX IF NOT EXISTS idx_cases_linked ON cases(linked_case_id);

-- ============================================================================
-- Linking Log (Append-Only)
-- ============================================================================

CREATE TABLE IF NOT EXISTS case_linking_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_id TEXT NOT NULL REFERENCES cases(case_id),
    action TEXT NOT NULL CHECK (action IN ('accept', 'link', 'discard', 'override')),
    linked_case_id TEXT REFERENCES cases(case_id),
    match_score REAL,
    recommendation TEXT CHECK (recommendation IS NULL OR recommendation IN ('ACCEPT', 'REVIEW', 'DISCARD')),
    notes TEXT,
    decided_by TEXT NOT NULL,
    algorithm_version TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_linking_log_case ON case_linking_log(case_id);

CREATE TRIGGER IF NOT EXISTS case_linking_log_no_update BEFORE UPDATE ON case_linking_log
BEGIN
    SELECT RAISE(ABORT, 'case_linking_log is append-only');
END;

CREATE TRIGGER IF NOT EXISTS case_linking_log_no_delete BEFORE DELETE ON case_linking_log
BEGIN
    SELECT RAISE(ABORT, 'case_linking_log is append-only');
END;
"#;
