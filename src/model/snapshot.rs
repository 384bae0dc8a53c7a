//! The persisted unit: model, feature space and training population travel together.

use super::isolation_forest::{ForestParams, IsolationForest};
use crate::error::{Result, SentinelError};
use crate::features::{CategoricalEncoder, FeatureEncoder, FittedEncoding, Scaler};
use crate::records::{TransactionBatch, TransactionRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub timestamp: DateTime<Utc>,
    pub total_transactions: usize,
    pub categorical_columns: Vec<String>,
    /// Seconds spent encoding and fitting
    pub training_time: f64,
    pub model_params: ForestParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub model: IsolationForest,
    pub encoding: FittedEncoding,
    /// Raw training rows, used as the reference population when explaining
    pub training_records: Vec<TransactionRecord>,
    pub metadata: TrainingMetadata,
}

impl ModelSnapshot {
    /// Fit the encoding and the forest on `batch` and bundle them with its rows.
    pub fn fit(batch: &TransactionBatch, params: ForestParams) -> Result<Self> {
        let timestamp = Utc::now();
        let started = Instant::now();

        let mut encoder = FeatureEncoder::new();
        let encoded = encoder.encode(batch)?;
        let encoding = encoder
            .into_fitted()
            .ok_or_else(|| SentinelError::DataFormat("encoder was not fitted".into()))?;
        let model = IsolationForest::fit(params.clone(), &encoded.matrix)?;

        Ok(Self {
            model,
            metadata: TrainingMetadata {
                timestamp,
                total_transactions: batch.len(),
                categorical_columns: encoding.categorical_columns(),
                training_time: started.elapsed().as_secs_f64(),
                model_params: params,
            },
            encoding,
            training_records: batch.records().to_vec(),
        })
    }

    pub fn scaler(&self) -> &Scaler {
        &self.encoding.scaler
    }

    pub fn encoders(&self) -> &BTreeMap<String, CategoricalEncoder> {
        &self.encoding.encoders
    }

    /// Training population as a batch in the fitted column order.
    pub fn training_batch(&self) -> Result<TransactionBatch> {
        TransactionBatch::from_records(
            &self.encoding.id_column,
            self.encoding.columns.clone(),
            self.training_records.clone(),
        )
    }
}
