//! Anomaly scoring against a stored snapshot.

mod engine;

pub use engine::{anomaly_rate, AnomalyResult, AnomalyScorer, ModelDetails};
