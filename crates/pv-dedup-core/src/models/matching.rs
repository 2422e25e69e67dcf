//! Match scoring models produced by the matching engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::case::Gender;

/// Weights applied to the four similarity components.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ComponentWeights {
    pub drug: f64,
    pub symptoms: f64,
    pub demographics: f64,
    pub recency: f64,
}

impl Default for ComponentWeights {
    fn default() -> Self {
        Self {
            drug: 0.40,
            symptoms: 0.40,
            demographics: 0.15,
            recency: 0.05,
        }
    }
}

impl ComponentWeights {
    pub fn sum(&self) -> f64 {
        self.drug + self.symptoms + self.demographics + self.recency
    }

    fn as_array(&self) -> [f64; 4] {
        [self.drug, self.symptoms, self.demographics, self.recency]
    }

    /// All weights finite and non-negative.
    pub fn all_valid(&self) -> bool {
        self.as_array().iter().all(|w| w.is_finite() && *w >= 0.0)
    }
}

/// Breakdown of how a candidate was scored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ComponentBreakdown {
    /// Drug identity (0.0 or 1.0)
    pub drug: f64,
    /// Symptom narrative similarity (0.0 - 1.0)
    pub symptoms: f64,
    /// Mean of age and gender similarity (0.0 - 1.0)
    pub demographics: f64,
    /// Reporting-time proximity (0.0 - 1.0)
    pub recency: f64,
}

impl ComponentBreakdown {
    /// Calculate weighted similarity score.
    pub fn weighted_score(&self, weights: &ComponentWeights) -> f64 {
        self.drug * weights.drug
            + self.symptoms * weights.symptoms
            + self.demographics * weights.demographics
            + self.recency * weights.recency
    }
}

/// Display/triage bucket derived from a similarity score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfidenceLabel {
    #[serde(rename = "Very Low")]
    VeryLow,
    #[serde(rename = "Low")]
    Low,
    #[serde(rename = "Medium")]
    Medium,
    #[serde(rename = "High")]
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl ConfidenceLabel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.90 {
            ConfidenceLabel::VeryHigh
        } else if score >= 0.75 {
            ConfidenceLabel::High
        } else if score >= 0.60 {
            ConfidenceLabel::Medium
        } else if score >= 0.40 {
            ConfidenceLabel::Low
        } else {
            ConfidenceLabel::VeryLow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLabel::VeryHigh => "Very High",
            ConfidenceLabel::High => "High",
            ConfidenceLabel::Medium => "Medium",
            ConfidenceLabel::Low => "Low",
            ConfidenceLabel::VeryLow => "Very Low",
        }
    }
}

/// Suggested disposition for a new case.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Accept,
    Review,
    Discard,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Accept => "ACCEPT",
            Recommendation::Review => "REVIEW",
            Recommendation::Discard => "DISCARD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACCEPT" => Some(Recommendation::Accept),
            "REVIEW" => Some(Recommendation::Review),
            "DISCARD" => Some(Recommendation::Discard),
            _ => None,
        }
    }
}

/// Similarity of one candidate to the new case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchResult {
    /// The existing case compared against
    pub case_id: String,
    /// Weighted score (0.0 - 1.0)
    pub similarity_score: f64,
    /// Unweighted component scores
    #[serde(rename = "breakdown")]
    pub component_breakdown: ComponentBreakdown,
    pub confidence_label: ConfidenceLabel,
    /// Score cleared the engine threshold
    pub is_match: bool,
    /// When the candidate was recorded
    pub reported_at: DateTime<Utc>,
    /// Candidate facts, so a reviewer can compare without another lookup
    #[serde(default)]
    pub drug_name: String,
    #[serde(default)]
    pub symptom_text: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<Gender>,
}

/// Engine output for one evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchReport {
    /// Matches, best first
    pub matches: Vec<MatchResult>,
    /// Number of candidates that cleared the threshold, before any cap
    pub total_matches: usize,
    pub has_exact_match: bool,
    pub recommendation: Recommendation,
    pub reason: String,
}

impl MatchReport {
    pub fn top_match(&self) -> Option<&MatchResult> {
        self.matches.first()
    }

    /// Look up a match by candidate case ID.
    pub fn find(&self, case_id: &str) -> Option<&MatchResult> {
        self.matches.iter().find(|m| m.case_id == case_id)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
