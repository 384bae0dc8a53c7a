//! Flat CSV report.

use super::{header, AnnotatedRecord};
use crate::error::Result;
use crate::records::TransactionBatch;
use crate::storage::replace_file;
use std::path::Path;

pub fn write_csv(path: &Path, batch: &TransactionBatch, rows: &[AnnotatedRecord]) -> Result<()> {
    replace_file(path, |file| {
        let mut w = csv::Writer::from_writer(file);
        w.write_record(header(batch))?;
        for row in rows {
            let mut out = Vec::with_capacity(batch.columns().len() + 3);
            out.push(row.record.id.clone());
            out.extend(batch.columns().iter().map(|c| row.record.get(c).to_string()));
            out.push(if row.is_anomaly { "1" } else { "0" }.to_string());
            out.push(row.reason.clone());
            w.write_record(&out)?;
        }
        w.flush()?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::annotate;
    use std::collections::BTreeMap;

    #[test]
    fn writes_header_and_blank_missing_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let header: Vec<String> = ["Transaction ID", "Amount", "Note"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let batch = TransactionBatch::from_rows(
            "Transaction ID",
            &header,
            vec![vec!["T1".into(), "12.5".into(), "".into()]],
        )
        .unwrap();
        let rows = annotate(&batch, &[], &BTreeMap::new());
        write_csv(&path, &batch, &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Transaction ID,Amount,Note,Anomaly,Reason\nT1,12.5,,0,\n");
    }

    #[test]
    fn numbers_are_written_as_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let data = "Transaction ID,Amount,Fee\nT1,10.00,1e3\n";
        let batch = TransactionBatch::from_csv_reader(data.as_bytes(), "Transaction ID").unwrap();
        let rows = annotate(&batch, &[], &BTreeMap::new());
        write_csv(&path, &batch, &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Transaction ID,Amount,Fee,Anomaly,Reason\nT1,10.00,1e3,0,\n");
    }
}
