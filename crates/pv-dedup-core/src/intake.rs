//! Case submission parsing.
//!
//! Accepts the JSON body of a screening request:
//!
//! ```json
//! { "drugName": "Aspirin", "symptoms": "headache", "age": 45, "gender": "Female", "threshold": 0.8 }
//! ```
//!
//! Snake-case keys (`drug_name`, `symptom_text`) are accepted too. Field types
//! are checked explicitly so a malformed value is reported against its field
//! instead of being coerced.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::matcher::{Normalizer, MAX_AGE_YEARS};
use crate::models::NewCaseInput;

/// Intake errors.
#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

pub type IntakeResult<T> = Result<T, IntakeError>;

/// A validated screening request.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseSubmission {
    pub case: NewCaseInput,
    /// Per-request match threshold override
    pub threshold: Option<f64>,
}

/// Untyped request body; every field is checked by hand.
#[derive(Debug, Deserialize)]
struct RawSubmission {
    #[serde(default, alias = "drugName")]
    drug_name: Option<Value>,
    #[serde(default, alias = "symptoms")]
    symptom_text: Option<Value>,
    #[serde(default)]
    age: Option<Value>,
    #[serde(default)]
    gender: Option<Value>,
    #[serde(default)]
    threshold: Option<Value>,
}

/// Parse and validate a submission body.
pub fn parse_submission(json: &str) -> IntakeResult<CaseSubmission> {
    let raw: RawSubmission = serde_json::from_str(json)?;
    let normalizer = Normalizer::new();

    let drug_name = match optional_string("drug_name", raw.drug_name)? {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => return Err(invalid("drug_name", "is required")),
    };

    let symptom_text = optional_string("symptom_text", raw.symptom_text)?
        .filter(|text| !text.trim().is_empty());

    let age = parse_age(raw.age)?;

    let gender = optional_string("gender", raw.gender)?
        .and_then(|value| normalizer.parse_gender(&value));

    let threshold = parse_threshold(raw.threshold)?;

    let mut case = NewCaseInput::new(drug_name, symptom_text);
    case.age = age;
    case.gender = gender;

    Ok(CaseSubmission { case, threshold })
}

fn invalid(field: &'static str, reason: impl Into<String>) -> IntakeError {
    IntakeError::InvalidField {
        field,
        reason: reason.into(),
    }
}

fn optional_string(field: &'static str, value: Option<Value>) -> IntakeResult<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(invalid(field, format!("expected a string, got {}", other))),
    }
}

fn parse_age(value: Option<Value>) -> IntakeResult<Option<u32>> {
    let number = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n,
        Some(other) => {
            return Err(invalid("age", format!("expected a whole number, got {}", other)))
        }
    };

    match number.as_u64() {
        Some(age) if age <= u64::from(MAX_AGE_YEARS) => Ok(Some(age as u32)),
        Some(age) => Err(invalid(
            "age",
            format!("{} exceeds {} years", age, MAX_AGE_YEARS),
        )),
        None => Err(invalid(
            "age",
            format!("expected a non-negative whole number, got {}", number),
        )),
    }
}

fn parse_threshold(value: Option<Value>) -> IntakeResult<Option<f64>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(t) if (0.0..=1.0).contains(&t) => Ok(Some(t)),
            _ => Err(invalid("threshold", format!("must be within [0, 1], got {}", n))),
        },
        Some(other) => Err(invalid(
            "threshold",
            format!("expected a number, got {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Gender;

    #[test]
    fn test_parse_camel_case_submission() {
        let json = r#"{"drugName": " Aspirin ", "symptoms": "severe headache", "age": 45, "gender": "F", "threshold": 0.8}"#;
        let submission = parse_submission(json).unwrap();

        assert_eq!(submission.case.drug_name, "Aspirin");
        assert_eq!(submission.case.symptom_text.as_deref(), Some("severe headache"));
        assert_eq!(submission.case.age, Some(45));
        assert_eq!(submission.case.gender, Some(Gender::Female));
        assert_eq!(submission.threshold, Some(0.8));
    }

    #[test]
    fn test_parse_snake_case_minimal() {
        let json = r#"{"drug_name": "ibuprofen"}"#;
        let submission = parse_submission(json).unwrap();

        assert_eq!(submission.case.drug_name, "ibuprofen");
        assert!(submission.case.symptom_text.is_none());
        assert!(submission.case.age.is_none());
        assert!(submission.case.gender.is_none());
        assert!(submission.threshold.is_none());
    }

    #[test]
    fn test_blank_optional_fields_are_unknown() {
        let json = r#"{"drugName": "aspirin", "symptoms": "  ", "gender": "", "age": null}"#;
        let submission = parse_submission(json).unwrap();

        assert!(submission.case.symptom_text.is_none());
        assert!(submission.case.gender.is_none());
        assert!(submission.case.age.is_none());
    }

    #[test]
    fn test_missing_drug_rejected() {
        for json in [r#"{"symptoms": "rash"}"#, r#"{"drugName": "   "}"#] {
            let err = parse_submission(json).unwrap_err();
            assert!(
                matches!(err, IntakeError::InvalidField { field: "drug_name", .. }),
                "{}",
                err
            );
        }
    }

    #[test]
    fn test_non_string_drug_rejected() {
        let err = parse_submission(r#"{"drugName": 42}"#).unwrap_err();
        assert!(matches!(err, IntakeError::InvalidField { field: "drug_name", .. }));
    }

    #[test]
    fn test_non_numeric_age_rejected() {
        for age in [r#""forty""#, r#""45""#, "45.5", "-3", "151", "true"] {
            let json = format!(r#"{{"drugName": "aspirin", "age": {}}}"#, age);
            let err = parse_submission(&json).unwrap_err();
            assert!(
                matches!(err, IntakeError::InvalidField { field: "age", .. }),
                "age {} gave {}",
                age,
                err
            );
        }
    }

    #[test]
    fn test_bad_threshold_rejected() {
        for threshold in ["1.5", "-0.1", r#""high""#] {
            let json = format!(r#"{{"drugName": "aspirin", "threshold": {}}}"#, threshold);
            let err = parse_submission(&json).unwrap_err();
            assert!(matches!(err, IntakeError::InvalidField { field: "threshold", .. }));
        }
    }

    #[test]
    fn test_malformed_json() {
        let err = parse_submission("{not json").unwrap_err();
        assert!(matches!(err, IntakeError::JsonParse(_)));
    }
}
