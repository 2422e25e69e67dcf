//! Case field normalizer.
//!
//! Handles:
//! - Drug name keys (trim + case-fold, no aliasing)
//! - Symptom narrative cleanup (lowercase, trim, collapse whitespace)
//! - Gender synonyms (f/woman→female, m/man→male)

use std::collections::HashMap;

use crate::models::Gender;

/// Comparison key for a drug name.
///
/// Two reports concern the same drug iff their keys are equal.
pub fn drug_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Normalize free text for sequence comparison.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalizer for reported demographic values.
#[derive(Debug, Clone)]
pub struct Normalizer {
    /// Gender aliases: reported value → canonical gender
    gender_aliases: HashMap<String, Gender>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    /// Create a new normalizer with default mappings.
    pub fn new() -> Self {
        Self {
            gender_aliases: Self::default_gender_aliases(),
        }
    }

    /// Parse a reported gender. Blank input is unknown, not an error.
    pub fn parse_gender(&self, raw: &str) -> Option<Gender> {
        let key = normalize_text(raw);
        if key.is_empty() {
            return None;
        }
        Some(
            self.gender_aliases
                .get(&key)
                .cloned()
                .unwrap_or(Gender::Other(key)),
        )
    }

    /// Add a custom gender alias.
    pub fn add_gender_alias(&mut self, alias: &str, gender: Gender) {
        self.gender_aliases.insert(normalize_text(alias), gender);
    }

    fn default_gender_aliases() -> HashMap<String, Gender> {
        let mut map = HashMap::new();

        map.insert("f".into(), Gender::Female);
        map.insert("female".into(), Gender::Female);
        map.insert("woman".into(), Gender::Female);
        map.insert("girl".into(), Gender::Female);

        map.insert("m".into(), Gender::Male);
        map.insert("male".into(), Gender::Male);
        map.insert("man".into(), Gender::Male);
        map.insert("boy".into(), Gender::Male);

        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drug_key() {
        assert_eq!(drug_key("Aspirin"), "aspirin");
        assert_eq!(drug_key("  ASPIRIN \t"), "aspirin");
        // No aliasing: brand names stay distinct
        assert_ne!(drug_key("Tylenol"), drug_key("paracetamol"));
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(
            normalize_text("  Severe   Headache\nand\tDizziness "),
            "severe headache and dizziness"
        );
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn test_parse_gender() {
        let normalizer = Normalizer::new();

        assert_eq!(normalizer.parse_gender("Female"), Some(Gender::Female));
        assert_eq!(normalizer.parse_gender(" F "), Some(Gender::Female));
        assert_eq!(normalizer.parse_gender("MALE"), Some(Gender::Male));
        assert_eq!(normalizer.parse_gender("m"), Some(Gender::Male));
        assert_eq!(
            normalizer.parse_gender("Non-Binary"),
            Some(Gender::Other("non-binary".into()))
        );
        assert_eq!(normalizer.parse_gender(""), None);
        assert_eq!(normalizer.parse_gender("  "), None);
    }

    #[test]
    fn test_custom_gender_alias() {
        let mut normalizer = Normalizer::new();
        normalizer.add_gender_alias("W", Gender::Female);

        assert_eq!(normalizer.parse_gender("w"), Some(Gender::Female));
    }
}
