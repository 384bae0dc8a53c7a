//! Annotated report output: a flat CSV and a highlighted XLSX built from the same rows.

mod spreadsheet;
mod tabular;

pub use spreadsheet::{plan_sheet, write_xlsx, SheetCell, SheetRow, FAILED_RULE_PREFIX};
pub use tabular::write_csv;

use crate::error::Result;
use crate::records::{TransactionBatch, TransactionRecord};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use tracing::info;

pub const ANOMALY_COLUMN: &str = "Anomaly";
pub const REASON_COLUMN: &str = "Reason";

/// A batch row plus its explanation and anomaly flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedRecord {
    pub record: TransactionRecord,
    pub is_anomaly: bool,
    /// Explanation for flagged rows with a matching entry, otherwise empty
    pub reason: String,
}

pub fn annotate(
    batch: &TransactionBatch,
    flagged_ids: &[String],
    explanations: &BTreeMap<String, String>,
) -> Vec<AnnotatedRecord> {
    let flagged: HashSet<&str> = flagged_ids.iter().map(String::as_str).collect();
    batch
        .records()
        .iter()
        .map(|r| {
            let is_anomaly = flagged.contains(r.id.as_str());
            let reason = if is_anomaly {
                explanations.get(&r.id).cloned().unwrap_or_default()
            } else {
                String::new()
            };
            AnnotatedRecord {
                record: r.clone(),
                is_anomaly,
                reason,
            }
        })
        .collect()
}

/// Output header shared by both formats.
pub fn header(batch: &TransactionBatch) -> Vec<String> {
    std::iter::once(batch.id_column().to_string())
        .chain(batch.columns().iter().cloned())
        .chain([ANOMALY_COLUMN.to_string(), REASON_COLUMN.to_string()])
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportPaths {
    pub csv: PathBuf,
    pub xlsx: PathBuf,
}

pub struct ReportWriter {
    paths: ReportPaths,
}

impl ReportWriter {
    pub fn new(paths: ReportPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ReportPaths {
        &self.paths
    }

    /// Overwrite both reports. Returns the rows that were written.
    pub fn write(
        &self,
        batch: &TransactionBatch,
        flagged_ids: &[String],
        explanations: &BTreeMap<String, String>,
    ) -> Result<Vec<AnnotatedRecord>> {
        let rows = annotate(batch, flagged_ids, explanations);
        write_csv(&self.paths.csv, batch, &rows)?;
        write_xlsx(&self.paths.xlsx, batch, &rows)?;
        info!(
            csv = %self.paths.csv.display(),
            xlsx = %self.paths.xlsx.display(),
            rows = rows.len(),
            flagged = rows.iter().filter(|r| r.is_anomaly).count(),
            "reports written"
        );
        Ok(rows)
    }
}
