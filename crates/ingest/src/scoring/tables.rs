//! Scoring tables.
//!
//! Ordered `(term, weight)` lists. Order matters for the event-type keyword
//! fallback, which uses the first matching keyword rather than the highest.

use serde::{Deserialize, Serialize};

/// Risk keywords matched as case-insensitive substrings.
pub const RISK_KEYWORDS: [(&str, f64); 24] = [
    ("powershell", 0.4),
    ("cmd.exe", 0.3),
    ("mimikatz", 0.9),
    ("credential", 0.5),
    ("password", 0.4),
    ("admin", 0.3),
    ("root", 0.3),
    ("sudo", 0.3),
    ("exec", 0.3),
    ("remote", 0.3),
    ("rdp", 0.4),
    ("ssh", 0.3),
    ("login", 0.2),
    ("failed", 0.2),
    ("denied", 0.2),
    ("transfer", 0.3),
    ("download", 0.2),
    ("upload", 0.3),
    ("exploit", 0.8),
    ("payload", 0.7),
    ("shell", 0.4),
    ("backdoor", 0.9),
    ("trojan", 0.9),
    ("malware", 0.9),
];

/// Event categories checked against the lower-cased event type.
pub const EVENT_TYPE_SCORES: [(&str, f64); 7] = [
    ("powershell_exec", 0.4),
    ("remote_login", 0.3),
    ("admin_login", 0.4),
    ("file_transfer", 0.3),
    ("service_start", 0.1),
    ("process_creation", 0.2),
    ("network_connection", 0.2),
];

pub const PRIVILEGED_USERS: [&str; 5] = ["admin", "administrator", "root", "system", "nt authority"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedTerm {
    pub term: String,
    pub weight: f64,
}

impl WeightedTerm {
    pub fn new(term: impl Into<String>, weight: f64) -> Self {
        Self {
            term: term.into(),
            weight,
        }
    }
}

fn weighted(table: &[(&str, f64)]) -> Vec<WeightedTerm> {
    table.iter().map(|(t, w)| WeightedTerm::new(*t, *w)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringTables {
    /// Applied to a risk keyword found in the event type
    pub event_type_keyword_factor: f64,
    /// Event-type score when nothing matches
    pub base_event_type_score: f64,
    pub privileged_user_score: f64,
    pub off_hours_score: f64,
    /// Off-hours window `[start, end)` in UTC hours, wrapping midnight
    pub off_hours_start: u32,
    pub off_hours_end: u32,

    // Arrays of tables must follow scalars in TOML output
    pub privileged_users: Vec<String>,
    pub risk_keywords: Vec<WeightedTerm>,
    pub event_type_scores: Vec<WeightedTerm>,
}

impl Default for ScoringTables {
    fn default() -> Self {
        Self {
            risk_keywords: weighted(&RISK_KEYWORDS),
            event_type_scores: weighted(&EVENT_TYPE_SCORES),
            privileged_users: PRIVILEGED_USERS.iter().map(|u| u.to_string()).collect(),
            event_type_keyword_factor: 0.8,
            base_event_type_score: 0.1,
            privileged_user_score: 0.3,
            off_hours_score: 0.1,
            off_hours_start: 22,
            off_hours_end: 6,
        }
    }
}

impl ScoringTables {
    /// Parse tables from TOML. Omitted keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Validate weights and hours.
    pub fn validate(&self) -> Result<(), String> {
        let weights = self
            .risk_keywords
            .iter()
            .chain(self.event_type_scores.iter())
            .map(|t| (t.term.as_str(), t.weight))
            .chain([
                ("event_type_keyword_factor", self.event_type_keyword_factor),
                ("base_event_type_score", self.base_event_type_score),
                ("privileged_user_score", self.privileged_user_score),
                ("off_hours_score", self.off_hours_score),
            ]);

        for (name, weight) in weights {
            if !(0.0..=1.0).contains(&weight) {
                return Err(format!("weight for '{}' must be between 0.0 and 1.0, got {}", name, weight));
            }
        }

        if let Some(empty) = self.risk_keywords.iter().chain(self.event_type_scores.iter()).find(|t| t.term.trim().is_empty()) {
            return Err(format!("empty term with weight {}", empty.weight));
        }

        if self.off_hours_start > 23 || self.off_hours_end > 24 {
            return Err(format!(
                "off-hours window {}-{} is not a valid hour range",
                self.off_hours_start, self.off_hours_end
            ));
        }
        Ok(())
    }

    /// Copy with every term lower-cased, so matching only lower-cases input.
    pub(crate) fn normalized(mut self) -> Self {
        for term in self.risk_keywords.iter_mut().chain(self.event_type_scores.iter_mut()) {
            term.term = term.term.to_lowercase();
        }
        for user in self.privileged_users.iter_mut() {
            *user = user.to_lowercase();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let tables = ScoringTables::default();
        assert!(tables.validate().is_ok());
        assert_eq!(tables.risk_keywords.len(), 24);
        assert_eq!(tables.risk_keywords[0].term, "powershell");
        assert_eq!(tables.event_type_scores.len(), 7);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let tables = ScoringTables::from_toml_str(
            r#"
            off_hours_score = 0.2

            [[risk_keywords]]
            term = "Cobalt"
            weight = 0.9
            "#,
        )
        .unwrap();
        assert_eq!(tables.off_hours_score, 0.2);
        assert_eq!(tables.risk_keywords, vec![WeightedTerm::new("Cobalt", 0.9)]);
        assert_eq!(tables.event_type_scores.len(), 7);
        assert_eq!(tables.normalized().risk_keywords[0].term, "cobalt");
    }

    #[test]
    fn test_validate_rejects_out_of_range_weight() {
        let mut tables = ScoringTables::default();
        tables.risk_keywords.push(WeightedTerm::new("boom", 1.5));
        let err = tables.validate().unwrap_err();
        assert!(err.contains("boom"));
    }

    #[test]
    fn test_validate_rejects_bad_hours_and_empty_terms() {
        let mut tables = ScoringTables::default();
        tables.off_hours_start = 24;
        assert!(tables.validate().is_err());

        let mut tables = ScoringTables::default();
        tables.event_type_scores.push(WeightedTerm::new("  ", 0.1));
        assert!(tables.validate().is_err());
    }
}
