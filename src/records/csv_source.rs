//! CSV transaction source.

use super::TransactionBatch;
use crate::error::Result;
use std::io::Read;
use std::path::Path;
use tracing::debug;

impl TransactionBatch {
    pub fn from_csv_path(path: &Path, id_column: &str) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            crate::error::SentinelError::DataFormat(format!("cannot open {}: {}", path.display(), e))
        })?;
        let batch = Self::from_csv_reader(file, id_column)?;
        debug!(path = %path.display(), rows = batch.len(), "loaded transactions");
        Ok(batch)
    }

    pub fn from_csv_reader<R: Read>(reader: R, id_column: &str) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);
        let header: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let mut rows = Vec::new();
        for rec in rdr.records() {
            let rec = rec?;
            rows.push(rec.iter().map(str::to_string).collect());
        }
        Self::from_rows(id_column, &header, rows)
    }
}
