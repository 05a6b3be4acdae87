//! Analyst threshold filter.
//!
//! Archiving is a view over scores: it never changes a confidence or label,
//! and events below the threshold come back as soon as the threshold drops.

use serde::Serialize;

use super::scorer::{RiskLabel, ScoredEvent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ThresholdOutcome {
    pub archived: usize,
    pub restored: usize,
}

/// Archive events below `threshold`, restore those at or above it.
///
/// Only flag changes are counted.
pub fn apply_threshold(events: &mut [ScoredEvent], threshold: f64) -> ThresholdOutcome {
    let mut outcome = ThresholdOutcome::default();
    for event in events.iter_mut() {
        let keep = event.meets_threshold(threshold);
        if !keep && !event.archived {
            event.archived = true;
            outcome.archived += 1;
        } else if keep && event.archived {
            event.archived = false;
            outcome.restored += 1;
        }
    }
    outcome
}

/// Restore every archived event. Returns how many were restored.
pub fn reset_filters(events: &mut [ScoredEvent]) -> usize {
    let mut restored = 0;
    for event in events.iter_mut().filter(|e| e.archived) {
        event.archived = false;
        restored += 1;
    }
    restored
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterState {
    pub total: usize,
    pub archived: usize,
    pub active: usize,
}

pub fn filter_state(events: &[ScoredEvent]) -> FilterState {
    let archived = events.iter().filter(|e| e.archived).count();
    FilterState {
        total: events.len(),
        archived,
        active: events.len() - archived,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfidenceBuckets {
    #[serde(rename = "0.0-0.3")]
    pub low: usize,
    #[serde(rename = "0.3-0.6")]
    pub medium: usize,
    #[serde(rename = "0.6-0.8")]
    pub high: usize,
    #[serde(rename = "0.8-1.0")]
    pub critical: usize,
}

/// Label and confidence histograms over active (non-archived) events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RiskDistribution {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
    pub buckets: ConfidenceBuckets,
    pub archived: usize,
    pub active: usize,
}

impl RiskDistribution {
    pub fn from_events(events: &[ScoredEvent]) -> Self {
        let mut dist = Self::default();
        for event in events {
            dist.record(event);
        }
        dist
    }

    /// Add one event to the running totals.
    pub fn record(&mut self, event: &ScoredEvent) {
        if event.archived {
            self.archived += 1;
            return;
        }
        self.active += 1;

        match event.risk_label {
            RiskLabel::Low => self.low += 1,
            RiskLabel::Medium => self.medium += 1,
            RiskLabel::High => self.high += 1,
            RiskLabel::Critical => self.critical += 1,
        }

        let c = event.confidence;
        let bucket = if c < 0.3 {
            &mut self.buckets.low
        } else if c < 0.6 {
            &mut self.buckets.medium
        } else if c < 0.8 {
            &mut self.buckets.high
        } else {
            &mut self.buckets.critical
        };
        *bucket += 1;
    }

    pub fn count(&self, label: RiskLabel) -> usize {
        match label {
            RiskLabel::Low => self.low,
            RiskLabel::Medium => self.medium,
            RiskLabel::High => self.high,
            RiskLabel::Critical => self.critical,
        }
    }
}
