//! Styled XLSX report: flagged rows highlighted, last cell replaced by a failed-rule note.

use super::{header, AnnotatedRecord};
use crate::error::{Result, SentinelError};
use crate::records::{FieldValue, TransactionBatch};
use crate::storage::replace_bytes;
use rust_xlsxwriter::{Color, Format, FormatPattern, Workbook};
use std::path::Path;

pub const FAILED_RULE_PREFIX: &str = "Failed rule: ";
const SHEET_NAME: &str = "Analysed Transactions";

#[derive(Debug, Clone, PartialEq)]
pub enum SheetCell {
    Text(String),
    Number(f64),
    Blank,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub transaction_id: String,
    pub cells: Vec<SheetCell>,
    pub highlighted: bool,
}

/// Cell layout for every data row, before any styling is applied.
pub fn plan_sheet(batch: &TransactionBatch, rows: &[AnnotatedRecord]) -> Vec<SheetRow> {
    rows.iter()
        .map(|row| {
            let mut cells = Vec::with_capacity(batch.columns().len() + 3);
            cells.push(SheetCell::Text(row.record.id.clone()));
            for column in batch.columns() {
                cells.push(match row.record.get(column) {
                    FieldValue::Number { value, .. } => SheetCell::Number(*value),
                    FieldValue::Text(t) => SheetCell::Text(t.clone()),
                    FieldValue::Missing => SheetCell::Blank,
                });
            }
            cells.push(SheetCell::Number(if row.is_anomaly { 1.0 } else { 0.0 }));
            let last = if row.is_anomaly {
                let reason = if row.reason.is_empty() {
                    "anomaly detected"
                } else {
                    row.reason.as_str()
                };
                SheetCell::Text(format!("{}{}", FAILED_RULE_PREFIX, reason))
            } else if row.reason.is_empty() {
                SheetCell::Blank
            } else {
                SheetCell::Text(row.reason.clone())
            };
            cells.push(last);
            SheetRow {
                transaction_id: row.record.id.clone(),
                cells,
                highlighted: row.is_anomaly,
            }
        })
        .collect()
}

fn col_index(i: usize) -> Result<u16> {
    u16::try_from(i).map_err(|_| SentinelError::DataFormat(format!("too many columns ({})", i)))
}

fn row_index(i: usize) -> Result<u32> {
    u32::try_from(i).map_err(|_| SentinelError::DataFormat(format!("too many rows ({})", i)))
}

pub fn write_xlsx(path: &Path, batch: &TransactionBatch, rows: &[AnnotatedRecord]) -> Result<()> {
    let header_format = Format::new().set_bold();
    let highlight = Format::new()
        .set_pattern(FormatPattern::Solid)
        .set_background_color(Color::Yellow);
    let plain = Format::new();

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (c, title) in header(batch).iter().enumerate() {
        sheet.write_string_with_format(0, col_index(c)?, title.as_str(), &header_format)?;
    }
    for (r, row) in plan_sheet(batch, rows).iter().enumerate() {
        let r = row_index(r + 1)?;
        let format = if row.highlighted { &highlight } else { &plain };
        for (c, cell) in row.cells.iter().enumerate() {
            let c = col_index(c)?;
            match cell {
                SheetCell::Text(t) => {
                    sheet.write_string_with_format(r, c, t.as_str(), format)?;
                }
                SheetCell::Number(n) => {
                    sheet.write_number_with_format(r, c, *n, format)?;
                }
                SheetCell::Blank => {
                    if row.highlighted {
                        sheet.write_blank(r, c, format)?;
                    }
                }
            }
        }
    }
    sheet.set_freeze_panes(1, 0)?;

    let bytes = workbook.save_to_buffer()?;
    replace_bytes(path, &bytes)
}
