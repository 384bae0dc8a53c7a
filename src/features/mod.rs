//! Feature encoding: raw transaction records → fixed-width numeric vectors.

mod encoder;
mod pipeline;
mod scaler;

pub use encoder::{CategoricalEncoder, UNKNOWN_CODE};
pub use pipeline::{ColumnKind, FeatureEncoder, FittedEncoding};
pub use scaler::{ColumnStats, Scaler};
pub(crate) use scaler::moments;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Encoded values for one transaction, in fitted column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedVector {
    pub transaction_id: String,
    pub values: Vec<f64>,
}

impl EncodedVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}

/// A whole encoded batch: one matrix row per transaction.
#[derive(Debug, Clone)]
pub struct EncodedBatch {
    pub columns: Vec<String>,
    pub transaction_ids: Vec<String>,
    pub matrix: Array2<f64>,
}

impl EncodedBatch {
    pub fn len(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.nrows() == 0
    }

    pub fn vectors(&self) -> Vec<EncodedVector> {
        self.transaction_ids
            .iter()
            .zip(self.matrix.rows())
            .map(|(id, row)| EncodedVector {
                transaction_id: id.clone(),
                values: row.to_vec(),
            })
            .collect()
    }
}
