//! Applies a stored snapshot to a new batch and summarizes the flagged transactions.

use crate::error::Result;
use crate::model::{Label, ModelSnapshot};
use crate::records::TransactionBatch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDetails {
    pub model_type: String,
    pub contamination_rate: f64,
    pub n_estimators: usize,
}

/// Outcome of one scoring run. Recomputed every time, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub timestamp: DateTime<Utc>,
    pub total_transactions: usize,
    pub anomalous_transactions: usize,
    /// Percentage, two decimal places
    pub anomaly_rate: f64,
    pub anomaly_ids: Vec<String>,
    /// Seconds
    pub execution_time: f64,
    pub model_details: ModelDetails,
}

pub struct AnomalyScorer;

impl AnomalyScorer {
    pub fn score(batch: &TransactionBatch, snapshot: &ModelSnapshot) -> Result<AnomalyResult> {
        let timestamp = Utc::now();
        let started = Instant::now();

        let encoded = snapshot.encoding.transform(batch)?;
        let labels = snapshot.model.predict(&encoded.matrix)?;
        let anomaly_ids: Vec<String> = encoded
            .transaction_ids
            .into_iter()
            .zip(labels)
            .filter(|(_, l)| *l == Label::Anomalous)
            .map(|(id, _)| id)
            .collect();

        let total = batch.len();
        let flagged = anomaly_ids.len();
        let params = snapshot.model.params();
        let result = AnomalyResult {
            timestamp,
            total_transactions: total,
            anomalous_transactions: flagged,
            anomaly_rate: anomaly_rate(flagged, total),
            anomaly_ids,
            execution_time: started.elapsed().as_secs_f64(),
            model_details: ModelDetails {
                model_type: "Isolation Forest".to_string(),
                contamination_rate: params.contamination,
                n_estimators: params.n_estimators,
            },
        };
        info!(
            total,
            flagged,
            rate = result.anomaly_rate,
            "batch scored"
        );
        Ok(result)
    }
}

/// Flagged share as a percentage rounded to two decimals.
pub fn anomaly_rate(flagged: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (flagged as f64 / total as f64 * 100.0 * 100.0).round() / 100.0
}
