//! Validation layer for extracted records

pub mod quality_scorer;

pub use quality_scorer::{QualityReport, QualityScorer};
