//! Encoding pipeline: records → categorical codes / standardized numbers → matrix.

use super::{CategoricalEncoder, EncodedBatch, Scaler};
use crate::error::{Result, SentinelError};
use crate::records::{FieldValue, TransactionBatch};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

/// Fitted feature space: column order, kinds, encoders and scaler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedEncoding {
    pub id_column: String,
    pub columns: Vec<String>,
    pub kinds: Vec<ColumnKind>,
    pub encoders: BTreeMap<String, CategoricalEncoder>,
    /// One entry per numeric column, in column order
    pub scaler: Scaler,
}

impl FittedEncoding {
    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    pub fn kind_of(&self, column: &str) -> Option<ColumnKind> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.kinds[i])
    }

    pub fn categorical_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .zip(&self.kinds)
            .filter(|(_, k)| **k == ColumnKind::Categorical)
            .map(|(c, _)| c.clone())
            .collect()
    }

    /// The batch must carry exactly the fitted columns under the fitted identifier.
    pub(crate) fn check_alignment(&self, batch: &TransactionBatch) -> Result<()> {
        if batch.id_column() != self.id_column {
            return Err(SentinelError::DataFormat(format!(
                "identifier column '{}' does not match trained '{}'",
                batch.id_column(),
                self.id_column
            )));
        }
        let trained: HashSet<&str> = self.columns.iter().map(String::as_str).collect();
        let given: HashSet<&str> = batch.columns().iter().map(String::as_str).collect();
        let mut missing: Vec<&str> = trained.difference(&given).copied().collect();
        let mut extra: Vec<&str> = given.difference(&trained).copied().collect();
        if missing.is_empty() && extra.is_empty() {
            return Ok(());
        }
        missing.sort_unstable();
        extra.sort_unstable();
        Err(SentinelError::DataFormat(format!(
            "columns do not match trained feature space (missing: {:?}, unexpected: {:?})",
            missing, extra
        )))
    }

    /// Encode a batch against this fitted state. Never mutates encoders.
    pub fn transform(&self, batch: &TransactionBatch) -> Result<EncodedBatch> {
        if batch.is_empty() {
            return Err(SentinelError::EmptyInput("transaction batch has no rows".into()));
        }
        self.check_alignment(batch)?;

        let mut matrix = Array2::<f64>::zeros((batch.len(), self.columns.len()));
        let mut imputed = 0usize;
        let mut numeric_idx = 0usize;
        for (j, (column, kind)) in self.columns.iter().zip(&self.kinds).enumerate() {
            match kind {
                ColumnKind::Categorical => {
                    let enc = self.encoders.get(column).ok_or_else(|| {
                        SentinelError::DataFormat(format!("no encoder for column '{}'", column))
                    })?;
                    for (i, record) in batch.records().iter().enumerate() {
                        matrix[[i, j]] = enc.encode(&record.get(column).category_key()) as f64;
                    }
                }
                ColumnKind::Numeric => {
                    for (i, record) in batch.records().iter().enumerate() {
                        matrix[[i, j]] = match record.get(column) {
                            FieldValue::Number { value, .. } => {
                                self.scaler.transform_value(numeric_idx, *value)
                            }
                            FieldValue::Missing => {
                                imputed += 1;
                                0.0
                            }
                            FieldValue::Text(t) => {
                                return Err(SentinelError::DataFormat(format!(
                                    "non-numeric value '{}' in numeric column '{}' (transaction {})",
                                    t, column, record.id
                                )))
                            }
                        };
                    }
                    numeric_idx += 1;
                }
            }
        }
        if imputed > 0 {
            warn!(imputed, "missing numeric values imputed to the training mean");
        }

        Ok(EncodedBatch {
            columns: self.columns.clone(),
            transaction_ids: batch.records().iter().map(|r| r.id.clone()).collect(),
            matrix,
        })
    }
}

/// Fit mode when constructed empty, transform mode once it holds a [`FittedEncoding`].
#[derive(Debug, Clone, Default)]
pub struct FeatureEncoder {
    fitted: Option<FittedEncoding>,
}

impl FeatureEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fitted(fitted: FittedEncoding) -> Self {
        Self {
            fitted: Some(fitted),
        }
    }

    pub fn fitted(&self) -> Option<&FittedEncoding> {
        self.fitted.as_ref()
    }

    pub fn into_fitted(self) -> Option<FittedEncoding> {
        self.fitted
    }

    /// Fit on first use, transform afterwards.
    pub fn encode(&mut self, batch: &TransactionBatch) -> Result<EncodedBatch> {
        if let Some(fitted) = &self.fitted {
            return fitted.transform(batch);
        }
        let fitted = Self::fit(batch)?;
        let encoded = fitted.transform(batch)?;
        self.fitted = Some(fitted);
        Ok(encoded)
    }

    fn fit(batch: &TransactionBatch) -> Result<FittedEncoding> {
        if batch.is_empty() {
            return Err(SentinelError::EmptyInput("transaction batch has no rows".into()));
        }
        if batch.columns().is_empty() {
            return Err(SentinelError::DataFormat("batch has no feature columns".into()));
        }

        let mut kinds = Vec::with_capacity(batch.columns().len());
        let mut encoders = BTreeMap::new();
        let mut numeric_values = Vec::new();
        for column in batch.columns() {
            // A missing value becomes the text placeholder, which makes the column categorical.
            let numbers: Option<Vec<f64>> = batch
                .records()
                .iter()
                .map(|r| r.get(column).as_number())
                .collect();
            match numbers {
                Some(values) => {
                    kinds.push(ColumnKind::Numeric);
                    numeric_values.push(values);
                }
                None => {
                    let keys: Vec<String> = batch
                        .records()
                        .iter()
                        .map(|r| r.get(column).category_key().into_owned())
                        .collect();
                    let enc = CategoricalEncoder::fit(keys.iter().map(String::as_str));
                    debug!(column = %column, classes = enc.len(), "categorical column");
                    kinds.push(ColumnKind::Categorical);
                    encoders.insert(column.clone(), enc);
                }
            }
        }

        Ok(FittedEncoding {
            id_column: batch.id_column().to_string(),
            columns: batch.columns().to_vec(),
            kinds,
            encoders,
            scaler: Scaler::fit(&numeric_values)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::UNKNOWN_CODE;

    fn batch(rows: &[(&str, &str, &str)]) -> TransactionBatch {
        let header: Vec<String> = ["Transaction ID", "Amount", "Channel"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = rows
            .iter()
            .map(|(id, a, c)| vec![id.to_string(), a.to_string(), c.to_string()])
            .collect();
        TransactionBatch::from_rows("Transaction ID", &header, rows).unwrap()
    }

    #[test]
    fn fit_detects_column_kinds() {
        let mut enc = FeatureEncoder::new();
        let out = enc
            .encode(&batch(&[("T1", "10", "web"), ("T2", "30", "atm")]))
            .unwrap();
        let fitted = enc.fitted().unwrap();
        assert_eq!(fitted.kinds, vec![ColumnKind::Numeric, ColumnKind::Categorical]);
        assert_eq!(out.matrix[[0, 0]], -1.0);
        assert_eq!(out.matrix[[1, 0]], 1.0);
        assert_eq!(out.matrix[[0, 1]], 1.0);
    }

    #[test]
    fn missing_value_makes_column_categorical_at_fit() {
        let mut enc = FeatureEncoder::new();
        enc.encode(&batch(&[("T1", "10", "web"), ("T2", "", "atm")]))
            .unwrap();
        let fitted = enc.fitted().unwrap();
        assert_eq!(fitted.kind_of("Amount"), Some(ColumnKind::Categorical));
        assert!(fitted.encoders["Amount"]
            .classes()
            .contains(&"Unknown".to_string()));
    }

    #[test]
    fn transform_is_deterministic() {
        let mut enc = FeatureEncoder::new();
        enc.encode(&batch(&[("T1", "10", "web"), ("T2", "30", "atm"), ("T3", "20", "pos")]))
            .unwrap();
        let fitted = enc.into_fitted().unwrap();
        let held_out = batch(&[("N1", "25", "pos"), ("N2", "5", "crypto")]);
        let a = fitted.transform(&held_out).unwrap();
        let b = fitted.transform(&held_out).unwrap();
        assert_eq!(a.vectors(), b.vectors());
    }

    #[test]
    fn unseen_category_maps_to_sentinel() {
        let mut enc = FeatureEncoder::new();
        enc.encode(&batch(&[("T1", "10", "web"), ("T2", "30", "atm")]))
            .unwrap();
        let fitted = enc.fitted().unwrap().clone();
        let out = fitted.transform(&batch(&[("N1", "10", "crypto")])).unwrap();
        assert_eq!(out.matrix[[0, 1]], UNKNOWN_CODE as f64);
        assert_eq!(fitted.encoders["Channel"].len(), 2);
    }

    #[test]
    fn column_mismatch_is_data_format() {
        let mut enc = FeatureEncoder::new();
        enc.encode(&batch(&[("T1", "10", "web")])).unwrap();
        let header: Vec<String> = ["Transaction ID", "Amount", "Country"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let other = TransactionBatch::from_rows(
            "Transaction ID",
            &header,
            vec![vec!["N1".into(), "1".into(), "FR".into()]],
        )
        .unwrap();
        let err = enc.encode(&other).unwrap_err();
        assert!(matches!(err, SentinelError::DataFormat(_)));
    }

    #[test]
    fn text_in_numeric_column_is_rejected_and_missing_is_imputed() {
        let mut enc = FeatureEncoder::new();
        enc.encode(&batch(&[("T1", "10", "web"), ("T2", "30", "atm")]))
            .unwrap();
        let imputed = enc.encode(&batch(&[("N1", "", "web")])).unwrap();
        assert_eq!(imputed.matrix[[0, 0]], 0.0);
        let err = enc.encode(&batch(&[("N2", "ten", "web")])).unwrap_err();
        assert!(matches!(err, SentinelError::DataFormat(_)));
    }

    #[test]
    fn empty_batch_is_empty_input() {
        let mut enc = FeatureEncoder::new();
        let err = enc.encode(&batch(&[])).unwrap_err();
        assert!(matches!(err, SentinelError::EmptyInput(_)));
    }
}
