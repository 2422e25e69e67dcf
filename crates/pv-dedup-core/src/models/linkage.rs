//! Linkage decision audit models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::matching::Recommendation;

/// What was done with a case after screening.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LinkageAction {
    /// Stored as a new active case
    Accept,
    /// Linked to a matching parent case
    Link,
    /// Discarded as a duplicate of a matching case
    Discard,
    /// Human relinked the case outside the screening result
    Override,
}

impl LinkageAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkageAction::Accept => "accept",
            LinkageAction::Link => "link",
            LinkageAction::Discard => "discard",
            LinkageAction::Override => "override",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "accept" => Some(LinkageAction::Accept),
            "link" => Some(LinkageAction::Link),
            "discard" => Some(LinkageAction::Discard),
            "override" => Some(LinkageAction::Override),
            _ => None,
        }
    }
}

/// One row of the append-only linking log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkageLogEntry {
    /// Row ID (None until stored)
    pub id: Option<i64>,
    /// The case the decision applies to
    pub case_id: String,
    pub action: LinkageAction,
    /// Parent case for link/discard/override
    pub linked_case_id: Option<String>,
    /// Score of the chosen match, if any
    pub match_score: Option<f64>,
    /// What the engine suggested at the time
    pub recommendation: Option<Recommendation>,
    pub notes: Option<String>,
    /// Reviewer identifier
    pub decided_by: String,
    /// Matching algorithm version at decision time
    pub algorithm_version: String,
    pub created_at: DateTime<Utc>,
}

impl LinkageLogEntry {
    pub fn new(case_id: impl Into<String>, action: LinkageAction, decided_by: impl Into<String>) -> Self {
        Self {
            id: None,
            case_id: case_id.into(),
            action,
            linked_case_id: None,
            match_score: None,
            recommendation: None,
            notes: None,
            decided_by: decided_by.into(),
            algorithm_version: crate::matcher::ALGORITHM_VERSION.to_string(),
            created_at: Utc::now(),
        }
    }
}
