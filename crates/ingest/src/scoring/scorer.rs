use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::tables::ScoringTables;
use crate::parser::NormalizedEvent;

/// Threshold used by archive filters when the analyst has not chosen one.
pub const DEFAULT_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLabel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLabel {
    pub const ALL: [RiskLabel; 4] = [RiskLabel::Low, RiskLabel::Medium, RiskLabel::High, RiskLabel::Critical];

    /// Inclusive lower bounds: 0.8 CRITICAL, 0.6 HIGH, 0.3 MEDIUM.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            RiskLabel::Critical
        } else if confidence >= 0.6 {
            RiskLabel::High
        } else if confidence >= 0.3 {
            RiskLabel::Medium
        } else {
            RiskLabel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::Low => "LOW",
            RiskLabel::Medium => "MEDIUM",
            RiskLabel::High => "HIGH",
            RiskLabel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(RiskLabel::Low),
            "MEDIUM" => Ok(RiskLabel::Medium),
            "HIGH" => Ok(RiskLabel::High),
            "CRITICAL" => Ok(RiskLabel::Critical),
            other => Err(format!("unknown risk label: {}", other)),
        }
    }
}

/// Per-signal contributions, as computed before the total is clamped.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureScores {
    pub event_type: f64,
    pub keywords: f64,
    pub user: f64,
    pub temporal: f64,
}

impl FeatureScores {
    /// Unclamped sum. May exceed the reported confidence.
    pub fn total(&self) -> f64 {
        self.event_type + self.keywords + self.user + self.temporal
    }

    pub fn entries(&self) -> [(&'static str, f64); 4] {
        [
            ("event_type", self.event_type),
            ("keywords", self.keywords),
            ("user", self.user),
            ("temporal", self.temporal),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub confidence: f64,
    pub risk_label: RiskLabel,
    pub feature_scores: FeatureScores,
}

/// The fields the scorer reads. Missing optional data is simply empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreInput<'a> {
    pub event_type: &'a str,
    pub raw_message: &'a str,
    pub user: &'a str,
    pub timestamp: Option<DateTime<Utc>>,
}

impl<'a> From<&'a NormalizedEvent> for ScoreInput<'a> {
    fn from(event: &'a NormalizedEvent) -> Self {
        Self {
            event_type: &event.event_type,
            raw_message: &event.raw_message,
            user: &event.user,
            timestamp: Some(event.timestamp),
        }
    }
}

/// Heuristic risk scorer.
///
/// Four independent signals are summed and the sum is clamped to 1.0. The
/// per-signal values are reported unclamped. Scoring is pure: the same
/// input always gives the same output, and the wall clock is never read.
#[derive(Debug, Clone)]
pub struct RiskScorer {
    tables: Arc<ScoringTables>,
}

impl RiskScorer {
    pub fn new() -> Self {
        Self::with_tables(ScoringTables::default())
    }

    pub fn with_tables(tables: ScoringTables) -> Self {
        Self {
            tables: Arc::new(tables.normalized()),
        }
    }

    pub fn tables(&self) -> &ScoringTables {
        &self.tables
    }

    pub fn score(&self, event: &NormalizedEvent) -> RiskAssessment {
        self.score_input(ScoreInput::from(event))
    }

    pub fn score_input(&self, input: ScoreInput<'_>) -> RiskAssessment {
        let feature_scores = FeatureScores {
            event_type: self.score_event_type(input.event_type),
            keywords: self.score_keywords(input.raw_message),
            user: self.score_user(input.user),
            temporal: self.score_temporal(input.timestamp),
        };

        let confidence = feature_scores.total().min(1.0);
        RiskAssessment {
            confidence,
            risk_label: RiskLabel::from_confidence(confidence),
            feature_scores,
        }
    }

    /// Category table first, then the first risk keyword at reduced weight,
    /// then the base score.
    pub fn score_event_type(&self, event_type: &str) -> f64 {
        let lower = event_type.to_lowercase();
        let t = &self.tables;

        if let Some(category) = t.event_type_scores.iter().find(|s| lower.contains(&s.term)) {
            return category.weight;
        }
        if let Some(keyword) = t.risk_keywords.iter().find(|k| lower.contains(&k.term)) {
            return keyword.weight * t.event_type_keyword_factor;
        }
        t.base_event_type_score
    }

    /// Highest weight among risk keywords found in the message.
    pub fn score_keywords(&self, message: &str) -> f64 {
        let lower = message.to_lowercase();
        self.tables
            .risk_keywords
            .iter()
            .filter(|k| lower.contains(&k.term))
            .map(|k| k.weight)
            .fold(0.0, f64::max)
    }

    pub fn score_user(&self, user: &str) -> f64 {
        let lower = user.to_lowercase();
        if self.tables.privileged_users.iter().any(|p| lower.contains(p.as_str())) {
            self.tables.privileged_user_score
        } else {
            0.0
        }
    }

    /// Off-hours bonus, judged on the UTC hour.
    pub fn score_temporal(&self, timestamp: Option<DateTime<Utc>>) -> f64 {
        let Some(ts) = timestamp else {
            return 0.0;
        };
        let hour = ts.hour();
        let (start, end) = (self.tables.off_hours_start, self.tables.off_hours_end);
        let off_hours = if start <= end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        };
        if off_hours {
            self.tables.off_hours_score
        } else {
            0.0
        }
    }
}

impl Default for RiskScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// `confidence >= threshold`
pub fn meets_threshold(confidence: f64, threshold: f64) -> bool {
    confidence >= threshold
}

/// A normalized event with its derived score.
///
/// The event itself is never modified; rescoring replaces the score fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEvent {
    pub event: NormalizedEvent,
    pub confidence: f64,
    pub risk_label: RiskLabel,
    pub feature_scores: FeatureScores,
    #[serde(default)]
    pub archived: bool,
}

impl ScoredEvent {
    pub fn new(event: NormalizedEvent, assessment: RiskAssessment) -> Self {
        Self {
            event,
            confidence: assessment.confidence,
            risk_label: assessment.risk_label,
            feature_scores: assessment.feature_scores,
            archived: false,
        }
    }

    pub fn assessment(&self) -> RiskAssessment {
        RiskAssessment {
            confidence: self.confidence,
            risk_label: self.risk_label,
            feature_scores: self.feature_scores,
        }
    }

    /// Replace the score fields. The archive flag is kept.
    pub fn apply(&mut self, assessment: RiskAssessment) {
        self.confidence = assessment.confidence;
        self.risk_label = assessment.risk_label;
        self.feature_scores = assessment.feature_scores;
    }

    pub fn meets_threshold(&self, threshold: f64) -> bool {
        meets_threshold(self.confidence, threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::tables::WeightedTerm;
    use chrono::TimeZone;

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 12, hour, 30, 0).unwrap()
    }

    fn input<'a>(event_type: &'a str, raw: &'a str, user: &'a str, hour: u32) -> ScoreInput<'a> {
        ScoreInput {
            event_type,
            raw_message: raw,
            user,
            timestamp: Some(at_hour(hour)),
        }
    }

    #[test]
    fn test_label_boundaries_are_exact() {
        assert_eq!(RiskLabel::from_confidence(0.8), RiskLabel::Critical);
        assert_eq!(RiskLabel::from_confidence(0.79999), RiskLabel::High);
        assert_eq!(RiskLabel::from_confidence(0.6), RiskLabel::High);
        assert_eq!(RiskLabel::from_confidence(0.3), RiskLabel::Medium);
        assert_eq!(RiskLabel::from_confidence(0.29999), RiskLabel::Low);
        assert_eq!(RiskLabel::from_confidence(0.0), RiskLabel::Low);
        assert_eq!(RiskLabel::from_confidence(1.0), RiskLabel::Critical);
    }

    #[test]
    fn test_event_type_cascade() {
        let scorer = RiskScorer::new();
        assert_eq!(scorer.score_event_type("ADMIN_LOGIN"), 0.4);
        // `login` is the first risk keyword found in "login failed"
        assert!((scorer.score_event_type("login failed") - 0.16).abs() < 1e-9);
        // `exploit` is listed after `exec`; first match wins, not highest
        assert!((scorer.score_event_type("exec_exploit") - 0.24).abs() < 1e-9);
        assert_eq!(scorer.score_event_type("WEB_ACCESS"), 0.1);
        assert_eq!(scorer.score_event_type(""), 0.1);
    }

    #[test]
    fn test_keyword_score_is_max_not_sum() {
        let scorer = RiskScorer::new();
        assert_eq!(scorer.score_keywords("Failed login via SSH with mimikatz"), 0.9);
        assert_eq!(scorer.score_keywords("PowerShell download"), 0.4);
        assert_eq!(scorer.score_keywords("nothing to see"), 0.0);
    }

    #[test]
    fn test_user_and_temporal_signals() {
        let scorer = RiskScorer::new();
        assert_eq!(scorer.score_user("NT AUTHORITY\\SYSTEM"), 0.3);
        assert_eq!(scorer.score_user("sysadmin"), 0.3);
        assert_eq!(scorer.score_user("alice"), 0.0);
        assert_eq!(scorer.score_user(""), 0.0);

        assert_eq!(scorer.score_temporal(Some(at_hour(22))), 0.1);
        assert_eq!(scorer.score_temporal(Some(at_hour(5))), 0.1);
        assert_eq!(scorer.score_temporal(Some(at_hour(6))), 0.0);
        assert_eq!(scorer.score_temporal(Some(at_hour(21))), 0.0);
        assert_eq!(scorer.score_temporal(None), 0.0);
    }

    #[test]
    fn test_sum_is_clamped_but_features_are_raw() {
        let scorer = RiskScorer::new();
        let result = scorer.score_input(input("POWERSHELL_EXEC", "mimikatz backdoor", "root", 23));
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.risk_label, RiskLabel::Critical);
        assert!(result.feature_scores.total() > 1.0);
        assert_eq!(result.feature_scores.keywords, 0.9);
        assert_eq!(result.feature_scores.user, 0.3);
        assert_eq!(result.feature_scores.temporal, 0.1);
    }

    #[test]
    fn test_empty_input_is_in_range() {
        let scorer = RiskScorer::new();
        let result = scorer.score_input(ScoreInput::default());
        assert!((0.0..=1.0).contains(&result.confidence));
        assert_eq!(result.confidence, 0.1);
        assert_eq!(result.risk_label, RiskLabel::Low);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let scorer = RiskScorer::new();
        let mut event = NormalizedEvent::new(at_hour(2), "remote_login", "ssh session from 10.0.0.1", 1);
        event.user = "administrator".into();
        assert_eq!(scorer.score(&event), scorer.score(&event));
    }

    #[test]
    fn test_custom_tables() {
        let mut tables = ScoringTables::default();
        tables.risk_keywords = vec![WeightedTerm::new("Cobalt Strike", 0.95)];
        tables.off_hours_start = 0;
        tables.off_hours_end = 0;
        let scorer = RiskScorer::with_tables(tables);
        assert_eq!(scorer.score_keywords("beacon from COBALT STRIKE"), 0.95);
        assert_eq!(scorer.score_temporal(Some(at_hour(23))), 0.0);
    }

    #[test]
    fn test_label_names_round_trip() {
        for label in RiskLabel::ALL {
            assert_eq!(label.as_str().parse::<RiskLabel>().unwrap(), label);
        }
        assert!("severe".parse::<RiskLabel>().is_err());
        assert_eq!(serde_json::to_string(&RiskLabel::High).unwrap(), "\"HIGH\"");
    }

    #[test]
    fn test_scored_event_rescoring_keeps_archive_flag() {
        let scorer = RiskScorer::new();
        let event = NormalizedEvent::new(at_hour(12), "LOG_ENTRY", "hello", 1);
        let mut scored = ScoredEvent::new(event, scorer.score_input(ScoreInput::default()));
        scored.archived = true;
        scored.apply(scorer.score_input(input("x", "mimikatz", "", 12)));
        assert!(scored.archived);
        assert!((scored.confidence - 1.0).abs() < 1e-9);
        assert!(scored.meets_threshold(DEFAULT_THRESHOLD));
    }
}
