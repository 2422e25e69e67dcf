//! Adverse-event case models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a stored case.
///
/// The engine only reads this; transitions are made by the linkage writer
/// after a human or policy decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CaseStatus {
    /// Accepted as a distinct real-world event
    Active,
    /// Judged a duplicate and linked to a parent case
    Linked,
    /// Judged a duplicate and discarded
    Discarded,
}

impl CaseStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Active => "active",
            CaseStatus::Linked => "linked",
            CaseStatus::Discarded => "discarded",
        }
    }

    /// Parse the storage representation (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" => Some(CaseStatus::Active),
            "linked" => Some(CaseStatus::Linked),
            "discarded" => Some(CaseStatus::Discarded),
            _ => None,
        }
    }
}

/// Patient gender as reported.
///
/// Unknown gender is `None` at the use site, never a variant here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Female,
    Male,
    /// Any other reported value, lowercased
    Other(String),
}

impl Gender {
    /// Storage representation.
    pub fn as_str(&self) -> &str {
        match self {
            Gender::Female => "female",
            Gender::Male => "male",
            Gender::Other(value) => value,
        }
    }

    /// Parse the storage representation (case-insensitive). Blank means unknown.
    pub fn from_stored(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "" => None,
            "female" => Some(Gender::Female),
            "male" => Some(Gender::Male),
            other => Some(Gender::Other(other.to_string())),
        }
    }
}

/// A previously stored adverse-event report (read-only input to the engine).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseRecord {
    /// Opaque stable identifier
    pub case_id: String,
    /// Free-text drug name as reported
    pub drug_name: String,
    /// Observed reaction(s)
    pub symptom_text: Option<String>,
    /// Patient age in years
    pub age: Option<u32>,
    /// Patient gender
    pub gender: Option<Gender>,
    /// When the case was recorded
    pub reported_at: DateTime<Utc>,
    /// Lifecycle state
    pub case_status: CaseStatus,
}

impl CaseRecord {
    /// Create an active case with the required fields.
    pub fn new(
        case_id: impl Into<String>,
        drug_name: impl Into<String>,
        symptom_text: Option<String>,
        reported_at: DateTime<Utc>,
    ) -> Self {
        Self {
            case_id: case_id.into(),
            drug_name: drug_name.into(),
            symptom_text,
            age: None,
            gender: None,
            reported_at,
            case_status: CaseStatus::Active,
        }
    }

    /// Build the stored form of an accepted submission.
    pub fn from_input(case_id: impl Into<String>, input: &NewCaseInput) -> Self {
        Self {
            case_id: case_id.into(),
            drug_name: input.drug_name.trim().to_string(),
            symptom_text: input.symptom_text.clone(),
            age: input.age,
            gender: input.gender.clone(),
            reported_at: input.evaluated_at,
            case_status: CaseStatus::Active,
        }
    }

    pub fn with_age(mut self, age: u32) -> Self {
        self.age = Some(age);
        self
    }

    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.gender = Some(gender);
        self
    }

    pub fn with_status(mut self, status: CaseStatus) -> Self {
        self.case_status = status;
        self
    }
}

/// The case under evaluation. Not stored; `evaluated_at` is its effective "now".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewCaseInput {
    /// Free-text drug name as submitted
    pub drug_name: String,
    /// Observed reaction(s)
    pub symptom_text: Option<String>,
    /// Patient age in years
    pub age: Option<u32>,
    /// Patient gender
    pub gender: Option<Gender>,
    /// Evaluation time, compared against candidate `reported_at`
    pub evaluated_at: DateTime<Utc>,
}

impl NewCaseInput {
    /// Create an input evaluated at the current time.
    pub fn new(drug_name: impl Into<String>, symptom_text: Option<String>) -> Self {
        Self {
            drug_name: drug_name.into(),
            symptom_text,
            age: None,
            gender: None,
            evaluated_at: Utc::now(),
        }
    }

    pub fn with_age(mut self, age: u32) -> Self {
        self.age = Some(age);
        self
    }

    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.gender = Some(gender);
        self
    }

    /// Pin the evaluation time (deterministic tests, backfills).
    pub fn evaluated_at(mut self, at: DateTime<Utc>) -> Self {
        self.evaluated_at = at;
        self
    }
}

/// A stored case together with the linkage fields owned by the writer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredCase {
    pub record: CaseRecord,
    /// Parent case if this one was judged a duplicate
    pub linked_case_id: Option<String>,
    /// Similarity with the linked case (0.0 - 1.0)
    pub match_score: Option<f64>,
    /// Reason for linkage/discarding
    pub match_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredCase {
    pub fn is_duplicate(&self) -> bool {
        self.linked_case_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_strings() {
        for status in [CaseStatus::Active, CaseStatus::Linked, CaseStatus::Discarded] {
            assert_eq!(CaseStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CaseStatus::parse(" Discarded "), Some(CaseStatus::Discarded));
        assert_eq!(CaseStatus::parse("merged"), None);
    }

    #[test]
    fn test_gender_from_stored_ignores_case() {
        assert_eq!(Gender::from_stored("Female"), Some(Gender::Female));
        assert_eq!(Gender::from_stored(" MALE "), Some(Gender::Male));
        assert_eq!(
            Gender::from_stored("Unspecified"),
            Some(Gender::Other("unspecified".into()))
        );
        assert_eq!(Gender::from_stored("  "), None);

        let odd = Gender::Other("Female".into());
        assert_eq!(Gender::from_stored(odd.as_str()), Some(Gender::Female));
    }

    #[test]
    fn test_record_from_input() {
        let input = NewCaseInput::new("  Aspirin ", Some("rash".into()))
            .with_age(30)
            .with_gender(Gender::Female);
        let record = CaseRecord::from_input("PV-1", &input);

        assert_eq!(record.drug_name, "Aspirin");
        assert_eq!(record.reported_at, input.evaluated_at);
        assert_eq!(record.case_status, CaseStatus::Active);
        assert_eq!(record.age, Some(30));
    }
}
