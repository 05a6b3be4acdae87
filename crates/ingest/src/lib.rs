// Log normalization and risk scoring pipeline.

// Core
pub mod parser;
pub mod scoring;

// Supporting services
pub mod hashing;
pub mod story;

// Orchestration
pub mod conf;
pub mod pipeline;
pub mod runtime;
