//! End-to-end screening and linkage through the FFI object.

use pv_dedup_core::{
    open_database, open_database_in_memory, Database, PvDedupCore, PvDedupError, Settings,
};

const PARENT: &str = r#"{
    "drugName": "Aspirin",
    "symptoms": "severe headache and dizziness",
    "age": 45,
    "gender": "Female"
}"#;

const FOLLOW_UP: &str = r#"{
    "drugName": "aspirin",
    "symptoms": "headache and vertigo",
    "age": 44,
    "gender": "F"
}"#;

#[test]
fn test_first_report_is_accepted() {
    let core = open_database_in_memory().unwrap();

    let screening = core.screen_case(PARENT.into()).unwrap();
    assert!(!screening.needs_manual_review);
    let report = screening.report.unwrap();
    assert!(report.matches.is_empty());
    assert_eq!(report.recommendation, "ACCEPT");
    assert_eq!(report.reason, "No existing cases to match");

    let stored = core
        .accept_case(PARENT.into(), screening.report_json, "intake".into())
        .unwrap();
    assert_eq!(stored.case_status, "active");
    assert!(stored.case_id.starts_with("PV-"));
    assert_eq!(stored.gender.as_deref(), Some("female"));

    let history = core.linking_history(stored.case_id.clone()).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, "accept");
    assert_eq!(history[0].recommendation.as_deref(), Some("ACCEPT"));
}

#[test]
fn test_follow_up_report_linked_to_parent() {
    let core = open_database_in_memory().unwrap();
    let parent = core
        .accept_case(PARENT.into(), None, "intake".into())
        .unwrap();

    let screening = core.screen_case(FOLLOW_UP.into()).unwrap();
    let report = screening.report.clone().unwrap();
    assert_eq!(report.recommendation, "REVIEW");
    assert_eq!(report.matches.len(), 1);
    assert_eq!(report.matches[0].case_id, parent.case_id);
    assert_eq!(report.matches[0].confidence_label, "High");
    assert_eq!(report.matches[0].drug_name, "Aspirin");
    assert_eq!(report.matches[0].age, Some(45));
    let score = report.matches[0].similarity_score;

    let report_json = screening.report_json.unwrap();
    let child = core
        .accept_case(FOLLOW_UP.into(), Some(report_json.clone()), "reviewer".into())
        .unwrap();
    let linked = core
        .link_case(
            child.case_id.clone(),
            parent.case_id.clone(),
            report_json,
            Some("Same reporter, follow-up call".into()),
            "reviewer".into(),
        )
        .unwrap();

    assert_eq!(linked.case_status, "linked");
    assert_eq!(linked.linked_case_id.as_deref(), Some(parent.case_id.as_str()));
    assert!((linked.match_score.unwrap() - score).abs() < 1e-12);
    assert!(linked
        .match_notes
        .unwrap()
        .starts_with(&format!("Linked to case {}. Score: ", parent.case_id)));

    assert_eq!(core.root_case(child.case_id.clone()).unwrap(), parent.case_id);

    let actions: Vec<_> = core
        .linking_history(child.case_id)
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(actions, vec!["accept", "link"]);
}

#[test]
fn test_exact_resubmission_discarded() {
    let core = open_database_in_memory().unwrap();
    let parent = core
        .accept_case(PARENT.into(), None, "intake".into())
        .unwrap();

    let screening = core.screen_case(PARENT.into()).unwrap();
    let report = screening.report.unwrap();
    assert_eq!(report.recommendation, "DISCARD");
    assert!(report.has_exact_match);

    let report_json = screening.report_json.unwrap();
    let dup = core
        .accept_case(PARENT.into(), Some(report_json.clone()), "intake".into())
        .unwrap();
    let discarded = core
        .discard_case(dup.case_id.clone(), parent.case_id.clone(), report_json, None, "intake".into())
        .unwrap();

    assert_eq!(discarded.case_status, "discarded");
    assert_eq!(
        discarded.match_notes.as_deref(),
        Some(format!("Discarded as duplicate of {}", parent.case_id).as_str())
    );

    // Discarded cases are not offered as candidates again
    let rescreen = core.screen_case(PARENT.into()).unwrap().report.unwrap();
    assert_eq!(rescreen.matches.len(), 1);
    assert_eq!(rescreen.matches[0].case_id, parent.case_id);
}

#[test]
fn test_report_cannot_link_a_different_case() {
    let core = open_database_in_memory().unwrap();
    let parent = core
        .accept_case(PARENT.into(), None, "intake".into())
        .unwrap();
    let unrelated = core
        .accept_case(
            r#"{"drugName": "Ibuprofen", "symptoms": "kidney failure", "age": 80, "gender": "M"}"#
                .into(),
            None,
            "intake".into(),
        )
        .unwrap();

    // A valid report, but produced for the aspirin follow-up
    let report_json = core.screen_case(FOLLOW_UP.into()).unwrap().report_json.unwrap();

    let err = core
        .link_case(
            unrelated.case_id.clone(),
            parent.case_id.clone(),
            report_json.clone(),
            None,
            "reviewer".into(),
        )
        .unwrap_err();
    assert!(matches!(err, PvDedupError::InvalidInput(_)));
    let err = core
        .discard_case(unrelated.case_id.clone(), parent.case_id, report_json, None, "reviewer".into())
        .unwrap_err();
    assert!(matches!(err, PvDedupError::InvalidInput(_)));

    let stored = core.get_case(unrelated.case_id.clone()).unwrap().unwrap();
    assert_eq!(stored.case_status, "active");
    assert!(stored.linked_case_id.is_none());
    assert_eq!(core.linking_history(unrelated.case_id).unwrap().len(), 1);
}

#[test]
fn test_threshold_override_in_submission() {
    let core = open_database_in_memory().unwrap();
    core.accept_case(PARENT.into(), None, "intake".into())
        .unwrap();

    let strict = FOLLOW_UP.replace("\"gender\": \"F\"", "\"gender\": \"F\", \"threshold\": 0.95");
    let report = core.screen_case(strict).unwrap().report.unwrap();
    assert!(report.matches.is_empty());
    assert_eq!(report.recommendation, "ACCEPT");
    assert_eq!(report.reason, "No matching cases found");
}

#[test]
fn test_invalid_submission_rejected() {
    let core = open_database_in_memory().unwrap();

    let err = core
        .screen_case(r#"{"drugName": "aspirin", "age": "forty"}"#.into())
        .unwrap_err();
    assert!(matches!(err, PvDedupError::InvalidInput(_)));

    let err = core.screen_case("not json".into()).unwrap_err();
    assert!(matches!(err, PvDedupError::InvalidInput(_)));
}

#[test]
fn test_decision_errors() {
    let core = open_database_in_memory().unwrap();
    let parent = core
        .accept_case(PARENT.into(), None, "intake".into())
        .unwrap();

    let err = core
        .override_link("PV-404".into(), parent.case_id.clone(), "typo".into(), "qa".into())
        .unwrap_err();
    assert!(matches!(err, PvDedupError::NotFound(_)));

    let err = core
        .link_case(parent.case_id.clone(), parent.case_id.clone(), "{}".into(), None, "qa".into())
        .unwrap_err();
    assert!(matches!(err, PvDedupError::SerializationError(_)));

    assert!(core.get_case("PV-404".into()).unwrap().is_none());
}

#[test]
fn test_file_database_with_settings() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("cases.db");
    let config_path = dir.path().join("settings.yaml");
    std::fs::write(&config_path, "matcher:\n  threshold: 0.5\n").unwrap();

    // No environment overrides, whatever the test process has set
    let settings = Settings::load_with(Some(config_path.as_path()), |_| None).unwrap();
    assert_eq!(settings.matcher.threshold, 0.5);
    let core = PvDedupCore::new(Database::open(&db_path).unwrap(), settings);
    core.accept_case(PARENT.into(), None, "intake".into())
        .unwrap();

    // Unrelated reaction scores ~0.67: a match only under the lowered threshold
    let unrelated = r#"{"drugName": "Aspirin", "symptoms": "rash", "age": 45, "gender": "female"}"#;
    let report = core.screen_case(unrelated.into()).unwrap().report.unwrap();
    assert_eq!(report.matches.len(), 1);
    assert_eq!(report.recommendation, "REVIEW");
    assert!(report.reason.starts_with("Possible duplicate"));

    drop(core);
    let reopened = PvDedupCore::new(Database::open(&db_path).unwrap(), Settings::default());
    let report = reopened.screen_case(unrelated.into()).unwrap().report.unwrap();
    assert!(report.matches.is_empty());
}

#[test]
fn test_bad_settings_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("settings.yaml");
    // Not fixable by any environment override
    std::fs::write(&config_path, "candidates:\n  limit: 0\n").unwrap();

    let result = open_database(
        dir.path().join("cases.db").to_string_lossy().into_owned(),
        Some(config_path.to_string_lossy().into_owned()),
    );
    assert!(matches!(result, Err(PvDedupError::ConfigurationError(_))));
}
