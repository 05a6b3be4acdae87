//! Attack story assembly.
//!
//! Collects the high-confidence events of a case into a timeline, hands a
//! prompt to a [`NarrativeGenerator`], and tags the resulting narrative with
//! an attack phase. Text generation itself lives behind the trait.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::scoring::ScoredEvent;

/// Default number of timeline entries placed in a prompt
pub const TIMELINE_LIMIT: usize = 20;

const TITLE_MAX_CHARS: usize = 60;
const TITLE_KEEP_CHARS: usize = 57;

#[derive(Debug, Error)]
pub enum StoryError {
    #[error("narrative generation failed: {0}")]
    Generation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttackPhase {
    InitialAccess,
    Persistence,
    PrivilegeEscalation,
    LateralMovement,
    Execution,
    Exfiltration,
    Unknown,
}

/// Checked in order; the first phase with any keyword in the narrative wins.
const PHASE_KEYWORDS: [(AttackPhase, &[&str]); 6] = [
    (
        AttackPhase::InitialAccess,
        &["initial access", "login", "remote", "exploit", "entry point"],
    ),
    (
        AttackPhase::Persistence,
        &["persistence", "scheduled task", "startup", "registry"],
    ),
    (
        AttackPhase::PrivilegeEscalation,
        &["privilege", "escalation", "admin", "root", "elevation"],
    ),
    (
        AttackPhase::LateralMovement,
        &["lateral", "movement", "rdp", "psexec", "smb"],
    ),
    (
        AttackPhase::Execution,
        &["execution", "powershell", "command", "script", "payload"],
    ),
    (
        AttackPhase::Exfiltration,
        &["exfiltration", "data transfer", "upload", "copy", "steal"],
    ),
];

impl AttackPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttackPhase::InitialAccess => "INITIAL_ACCESS",
            AttackPhase::Persistence => "PERSISTENCE",
            AttackPhase::PrivilegeEscalation => "PRIVILEGE_ESCALATION",
            AttackPhase::LateralMovement => "LATERAL_MOVEMENT",
            AttackPhase::Execution => "EXECUTION",
            AttackPhase::Exfiltration => "EXFILTRATION",
            AttackPhase::Unknown => "UNKNOWN",
        }
    }

    pub fn identify(narrative: &str) -> Self {
        let lower = narrative.to_lowercase();
        PHASE_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
            .map(|(phase, _)| *phase)
            .unwrap_or(AttackPhase::Unknown)
    }
}

impl fmt::Display for AttackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The events a story is written about, oldest first.
#[derive(Debug, Clone)]
pub struct StoryInput<'a> {
    events: Vec<&'a ScoredEvent>,
    timeline_limit: usize,
}

impl<'a> StoryInput<'a> {
    /// Active events at or above `threshold`, by timestamp, capped at `limit`.
    pub fn collect<I>(events: I, threshold: f64, limit: usize) -> Self
    where
        I: IntoIterator<Item = &'a ScoredEvent>,
    {
        let mut selected: Vec<&ScoredEvent> = events
            .into_iter()
            .filter(|e| !e.archived && e.meets_threshold(threshold))
            .collect();
        // Stable sort keeps file order for equal timestamps
        selected.sort_by_key(|e| e.event.timestamp);
        selected.truncate(limit);

        Self {
            events: selected,
            timeline_limit: TIMELINE_LIMIT,
        }
    }

    pub fn with_timeline_limit(mut self, limit: usize) -> Self {
        self.timeline_limit = limit;
        self
    }

    pub fn events(&self) -> &[&'a ScoredEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// One numbered line per event, at most `limit` lines.
    pub fn timeline(&self, limit: usize) -> String {
        let mut out = String::new();
        for (i, scored) in self.events.iter().take(limit).enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let _ = write!(
                out,
                "{}. [{}] {} (confidence: {:.2})",
                i + 1,
                scored.event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                scored.event.event_type,
                scored.confidence
            );
        }
        out
    }

    pub fn prompt(&self) -> String {
        format!(
            "You are a cybersecurity forensic analyst. Analyze these security events and create a coherent attack narrative.\n\
             \n\
             TIMELINE OF EVENTS:\n\
             {}\n\
             \n\
             Task: Write a clear, plain-English story that explains:\n\
             1. What happened (initial access, actions taken, potential objectives)\n\
             2. Which attack phase this represents (Initial Access, Lateral Movement, etc.)\n\
             3. Why these events are suspicious together\n\
             4. Potential impact\n\
             \n\
             Write 2-3 paragraphs. Be specific but executive-friendly. Focus on the story, not individual log entries.",
            self.timeline(self.timeline_limit)
        )
    }

    fn avg_confidence(&self) -> f64 {
        if self.events.is_empty() {
            return 0.0;
        }
        self.events.iter().map(|e| e.confidence).sum::<f64>() / self.events.len() as f64
    }

    fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.events.first()?;
        let last = self.events.last()?;
        Some((first.event.timestamp, last.event.timestamp))
    }
}

/// Turns a prompt into narrative text.
pub trait NarrativeGenerator: Send + Sync {
    fn generate(&self, prompt: &str, input: &StoryInput<'_>) -> Result<String, StoryError>;
}

/// Offline generator that summarizes the events without a language model.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

impl NarrativeGenerator for TemplateGenerator {
    fn generate(&self, _prompt: &str, input: &StoryInput<'_>) -> Result<String, StoryError> {
        let Some((start, end)) = input.time_span() else {
            return Err(StoryError::Generation("no events to describe".into()));
        };

        let mut types: BTreeMap<&str, usize> = BTreeMap::new();
        let mut hosts: Vec<&str> = Vec::new();
        let mut users: Vec<&str> = Vec::new();
        for scored in input.events() {
            *types.entry(scored.event.event_type.as_str()).or_default() += 1;
            let ev = &scored.event;
            if !ev.host.is_empty() && !hosts.contains(&ev.host.as_str()) {
                hosts.push(&ev.host);
            }
            if !ev.user.is_empty() && !users.contains(&ev.user.as_str()) {
                users.push(&ev.user);
            }
        }

        let mut ranked: Vec<(&str, usize)> = types.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        let activity = ranked
            .iter()
            .map(|(t, n)| format!("{} ({})", t.to_lowercase().replace('_', " "), n))
            .collect::<Vec<_>>()
            .join(", ");

        let mut narrative = format!(
            "{} suspicious events were recorded between {} and {}. Observed activity: {}.",
            input.len(),
            start.format("%Y-%m-%d %H:%M:%S"),
            end.format("%Y-%m-%d %H:%M:%S"),
            activity
        );
        if !hosts.is_empty() {
            let _ = write!(narrative, " Hosts involved: {}.", hosts.join(", "));
        }
        if !users.is_empty() {
            let _ = write!(narrative, " Accounts involved: {}.", users.join(", "));
        }
        Ok(narrative)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Story {
    pub title: String,
    pub narrative: String,
    pub attack_phase: AttackPhase,
    pub avg_confidence: f64,
    pub event_count: usize,
    pub time_span_start: DateTime<Utc>,
    pub time_span_end: DateTime<Utc>,
}

/// First sentence of the narrative, shortened to fit a heading.
pub fn title_from(narrative: &str) -> String {
    let first = narrative.split('.').next().unwrap_or_default();
    if first.chars().count() > TITLE_MAX_CHARS {
        let mut title: String = first.chars().take(TITLE_KEEP_CHARS).collect();
        title.push_str("...");
        title
    } else {
        first.to_string()
    }
}

pub fn synthesize(input: &StoryInput<'_>, generator: &dyn NarrativeGenerator) -> Story {
    let Some((start, end)) = input.time_span() else {
        let now = Utc::now();
        return Story {
            title: "No Events".into(),
            narrative: "No events available for story synthesis".into(),
            attack_phase: AttackPhase::Unknown,
            avg_confidence: 0.0,
            event_count: 0,
            time_span_start: now,
            time_span_end: now,
        };
    };

    let prompt = input.prompt();
    debug!(events = input.len(), prompt_len = prompt.len(), "Generating story narrative");

    match generator.generate(&prompt, input) {
        Ok(narrative) => Story {
            title: title_from(&narrative),
            attack_phase: AttackPhase::identify(&narrative),
            avg_confidence: input.avg_confidence(),
            event_count: input.len(),
            time_span_start: start,
            time_span_end: end,
            narrative,
        },
        Err(e) => {
            warn!(error = %e, "Story generation failed");
            Story {
                title: "Story Generation Failed".into(),
                narrative: format!("Error: {}", e),
                attack_phase: AttackPhase::Unknown,
                avg_confidence: 0.0,
                event_count: input.len(),
                time_span_start: start,
                time_span_end: end,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::NormalizedEvent;
    use crate::scoring::{FeatureScores, RiskAssessment, RiskLabel};
    use chrono::TimeZone;

    fn scored(minute: u32, event_type: &str, confidence: f64) -> ScoredEvent {
        let ts = Utc.with_ymd_and_hms(2026, 1, 12, 10, minute, 0).unwrap();
        let mut event = NormalizedEvent::new(ts, event_type, "raw", 1);
        event.host = "10.0.0.5".into();
        ScoredEvent::new(
            event,
            RiskAssessment {
                confidence,
                risk_label: RiskLabel::from_confidence(confidence),
                feature_scores: FeatureScores::default(),
            },
        )
    }

    struct Fixed(&'static str);

    impl NarrativeGenerator for Fixed {
        fn generate(&self, _prompt: &str, _input: &StoryInput<'_>) -> Result<String, StoryError> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    impl NarrativeGenerator for Failing {
        fn generate(&self, _prompt: &str, _input: &StoryInput<'_>) -> Result<String, StoryError> {
            Err(StoryError::Generation("provider unavailable".into()))
        }
    }

    #[test]
    fn test_collect_filters_sorts_and_limits() {
        let mut events = vec![
            scored(30, "LATE", 0.9),
            scored(10, "EARLY", 0.8),
            scored(20, "LOW", 0.2),
            scored(5, "HIDDEN", 0.95),
        ];
        events[3].archived = true;

        let input = StoryInput::collect(&events, 0.7, 100);
        let types: Vec<_> = input.events().iter().map(|e| e.event.event_type.as_str()).collect();
        assert_eq!(types, vec!["EARLY", "LATE"]);

        assert_eq!(StoryInput::collect(&events, 0.7, 1).len(), 1);
    }

    #[test]
    fn test_timeline_format() {
        let events = vec![scored(0, "LOGIN_FAILURE", 0.756), scored(1, "ADMIN_ACCESS", 0.8)];
        let input = StoryInput::collect(&events, 0.0, 10);
        assert_eq!(
            input.timeline(10),
            "1. [2026-01-12 10:00:00] LOGIN_FAILURE (confidence: 0.76)\n\
             2. [2026-01-12 10:01:00] ADMIN_ACCESS (confidence: 0.80)"
        );
        assert_eq!(input.timeline(1).lines().count(), 1);
        assert!(input.prompt().contains("TIMELINE OF EVENTS:\n1. [2026-01-12 10:00:00]"));
    }

    #[test]
    fn test_phase_identification_order() {
        assert_eq!(AttackPhase::identify("Attacker gained Initial Access"), AttackPhase::InitialAccess);
        // "login" (initial access) is checked before "admin"
        assert_eq!(AttackPhase::identify("admin login"), AttackPhase::InitialAccess);
        assert_eq!(AttackPhase::identify("Used PsExec over SMB"), AttackPhase::LateralMovement);
        assert_eq!(AttackPhase::identify("nothing notable"), AttackPhase::Unknown);
    }

    #[test]
    fn test_title_truncation() {
        assert_eq!(title_from("Short title. Then more."), "Short title");
        let long = "a".repeat(61);
        let title = title_from(&long);
        assert_eq!(title.chars().count(), 60);
        assert!(title.ends_with("..."));
        assert_eq!(title_from(&"b".repeat(60)), "b".repeat(60));
    }

    #[test]
    fn test_synthesize_with_generator() {
        let events = vec![scored(0, "LOGIN_FAILURE", 0.8), scored(9, "ADMIN_ACCESS", 0.9)];
        let input = StoryInput::collect(&events, 0.7, 100);
        let story = synthesize(&input, &Fixed("Brute force against the portal. Then escalation."));

        assert_eq!(story.title, "Brute force against the portal");
        assert_eq!(story.attack_phase, AttackPhase::PrivilegeEscalation);
        assert_eq!(story.event_count, 2);
        assert!((story.avg_confidence - 0.85).abs() < 1e-9);
        assert_eq!(story.time_span_start, events[0].event.timestamp);
        assert_eq!(story.time_span_end, events[1].event.timestamp);
    }

    #[test]
    fn test_synthesize_empty_and_failure() {
        let events: Vec<ScoredEvent> = Vec::new();
        let story = synthesize(&StoryInput::collect(&events, 0.7, 100), &Fixed("unused"));
        assert_eq!(story.title, "No Events");
        assert_eq!(story.event_count, 0);

        let events = vec![scored(0, "X", 0.9)];
        let story = synthesize(&StoryInput::collect(&events, 0.7, 100), &Failing);
        assert_eq!(story.title, "Story Generation Failed");
        assert!(story.narrative.contains("provider unavailable"));
        assert_eq!(story.attack_phase, AttackPhase::Unknown);
        assert_eq!(story.event_count, 1);
    }

    #[test]
    fn test_template_generator() {
        let events = vec![scored(0, "LOGIN_FAILURE", 0.8), scored(1, "LOGIN_FAILURE", 0.8)];
        let input = StoryInput::collect(&events, 0.7, 100);
        let story = synthesize(&input, &TemplateGenerator);
        assert!(story.narrative.contains("login failure (2)"));
        assert!(story.narrative.contains("10.0.0.5"));
        assert_eq!(story.attack_phase, AttackPhase::InitialAccess);
        assert!(story.title.starts_with("2 suspicious events were recorded"));
        assert!(story.title.ends_with("..."));
    }
}
