//! Standard scaling of numeric columns.

use crate::error::{Result, SentinelError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub mean: f64,
    /// Population standard deviation; 1.0 when the column is constant
    pub scale: f64,
}

/// Mean and standard deviation (`ddof` 0 for population, 1 for sample). Values are divided by
/// their largest magnitude first, so finite inputs near `f64::MAX` do not overflow.
pub(crate) fn moments(values: &[f64], ddof: usize) -> Option<(f64, f64)> {
    let n = values.len();
    if n == 0 || n <= ddof {
        return None;
    }
    let peak = values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if peak == 0.0 {
        return Some((0.0, 0.0));
    }
    let mean = values.iter().map(|v| v / peak).sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v / peak - mean).powi(2)).sum::<f64>() / (n - ddof) as f64;
    Some((mean * peak, var.sqrt() * peak))
}

/// Per-column (mean, std), fitted once and reused verbatim at scoring time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    stats: Vec<ColumnStats>,
}

impl Scaler {
    /// Fit one [`ColumnStats`] per column slice. Non-finite statistics are rejected.
    pub fn fit(columns: &[Vec<f64>]) -> Result<Self> {
        let stats = columns
            .iter()
            .enumerate()
            .map(|(i, values)| {
                let (mean, std) = moments(values, 0).unwrap_or((0.0, 0.0));
                if !mean.is_finite() || !std.is_finite() {
                    return Err(SentinelError::DataFormat(format!(
                        "numeric column {} has no finite mean/std",
                        i
                    )));
                }
                Ok(ColumnStats {
                    mean,
                    scale: if std > f64::EPSILON { std } else { 1.0 },
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { stats })
    }

    pub fn transform_value(&self, column: usize, value: f64) -> f64 {
        let s = self.stats[column];
        value / s.scale - s.mean / s.scale
    }

    pub fn stats(&self) -> &[ColumnStats] {
        &self.stats
    }

    pub fn n_columns(&self) -> usize {
        self.stats.len()
    }
}
