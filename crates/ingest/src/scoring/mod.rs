//! Heuristic risk scoring of normalized events.

pub mod scorer;
pub mod tables;
pub mod threshold;

pub use scorer::{
    meets_threshold, FeatureScores, RiskAssessment, RiskLabel, RiskScorer, ScoreInput, ScoredEvent,
    DEFAULT_THRESHOLD,
};
pub use tables::{ScoringTables, WeightedTerm};
pub use threshold::{
    apply_threshold, filter_state, reset_filters, ConfidenceBuckets, FilterState, RiskDistribution,
    ThresholdOutcome,
};
